//! Document store capability boundary.
//!
//! The store is a remote JSON document database reached over the network. It
//! owns ids, server timestamps, and snapshot ordering; this crate never
//! re-derives any of that locally.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::ScanResult;

/// Opaque id assigned by the store on creation.
pub type RecordId = String;

/// Per-user scope under which history records live.
pub fn history_namespace(user_id: &str) -> String {
    format!("users/{user_id}/history")
}

/// A record to be created. `id` and `created_at` are assigned server-side.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub fields: serde_json::Value,
}

/// A record as delivered by the store.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    pub fields: serde_json::Value,
}

/// A complete ordered list of records at one point in time (not a diff).
pub type Snapshot = Vec<StoredRecord>;

/// Push channel for a live subscription. Each delivery is either a full
/// snapshot or a stream-level error; the stream ends when the store closes it
/// or the receiver is dropped.
pub type SnapshotReceiver = mpsc::Receiver<ScanResult<Snapshot>>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Durably create a record under `namespace`. Returns the server-assigned
    /// id; `created_at` is stamped server-side.
    async fn create(&self, namespace: &str, record: NewRecord) -> ScanResult<RecordId>;

    /// Delete one record from `namespace`. Deleting an already-absent record
    /// succeeds.
    async fn delete(&self, namespace: &str, record_id: &str) -> ScanResult<()>;

    /// Open a push subscription over `namespace`, ordered `created_at`
    /// descending. The first delivery is the current snapshot; subsequent
    /// deliveries follow every change. Dropping the receiver tears the
    /// subscription down.
    async fn subscribe(&self, namespace: &str) -> ScanResult<SnapshotReceiver>;
}
