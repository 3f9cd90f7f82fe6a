//! In-memory fakes for the external capabilities, shared across test modules.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;

use crate::capture::{CaptureFrame, FrameSource, PermissionStatus};
use crate::error::{ScanError, ScanResult};
use crate::history::HistoryEntry;
use crate::identity::{IdentityProvider, UserId};
use crate::inference::InferenceClient;
use crate::store::{DocumentStore, NewRecord, RecordId, Snapshot, SnapshotReceiver, StoredRecord};

pub(crate) fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Await the published history list satisfying `predicate`, with a timeout.
pub(crate) async fn wait_for_entries(
    rx: &mut watch::Receiver<Vec<HistoryEntry>>,
    predicate: impl Fn(&[HistoryEntry]) -> bool,
) -> Vec<HistoryEntry> {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            {
                let current = rx.borrow_and_update();
                if predicate(&current) {
                    return current.clone();
                }
            }
            rx.changed().await.expect("entry channel closed");
        }
    })
    .await
    .expect("timed out waiting for published entries")
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

pub(crate) struct FakeIdentity {
    tx: watch::Sender<Option<UserId>>,
}

impl FakeIdentity {
    pub(crate) fn signed_in(user: &str) -> Arc<Self> {
        let (tx, _) = watch::channel(Some(user.to_string()));
        Arc::new(Self { tx })
    }

    pub(crate) fn signed_out() -> Arc<Self> {
        let (tx, _) = watch::channel(None);
        Arc::new(Self { tx })
    }

    pub(crate) fn set_identity(&self, user: Option<&str>) {
        self.tx.send_replace(user.map(str::to_string));
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    fn current_identity(&self) -> Option<UserId> {
        self.tx.borrow().clone()
    }

    fn watch_identity(&self) -> watch::Receiver<Option<UserId>> {
        self.tx.subscribe()
    }

    async fn sign_in(&self, email: &str, _password: &str) -> ScanResult<UserId> {
        let user_id = format!("user-{email}");
        self.tx.send_replace(Some(user_id.clone()));
        Ok(user_id)
    }

    async fn sign_up(&self, email: &str, password: &str) -> ScanResult<UserId> {
        self.sign_in(email, password).await
    }

    async fn sign_out(&self) -> ScanResult<()> {
        self.tx.send_replace(None);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Document store
// ---------------------------------------------------------------------------

const SNAPSHOT_CHANNEL_CAPACITY: usize = 32;

struct MemoryStoreInner {
    records: HashMap<String, Vec<StoredRecord>>,
    subscribers: HashMap<String, Vec<mpsc::Sender<ScanResult<Snapshot>>>>,
    fail_writes: bool,
    fail_delete_ids: HashSet<RecordId>,
    creates: usize,
    seq: i64,
    base: DateTime<Utc>,
}

/// In-memory document store with push snapshots, standing in for the vendor
/// database. Every successful write re-broadcasts the full ordered snapshot
/// to live subscribers, newest first.
pub(crate) struct MemoryStore {
    inner: StdMutex<MemoryStoreInner>,
}

impl MemoryStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: StdMutex::new(MemoryStoreInner {
                records: HashMap::new(),
                subscribers: HashMap::new(),
                fail_writes: false,
                fail_delete_ids: HashSet::new(),
                creates: 0,
                seq: 0,
                base: Utc::now(),
            }),
        })
    }

    pub(crate) fn create_count(&self) -> usize {
        self.inner.lock().unwrap().creates
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_writes = fail;
    }

    pub(crate) fn fail_delete_of(&self, record_id: &str) {
        self.inner
            .lock()
            .unwrap()
            .fail_delete_ids
            .insert(record_id.to_string());
    }

    /// Build a record with a deterministic timestamp, for hand-crafted
    /// snapshots.
    pub(crate) fn raw_record(&self, id: &str, fields: serde_json::Value) -> StoredRecord {
        let mut inner = self.inner.lock().unwrap();
        inner.seq += 1;
        StoredRecord {
            id: id.to_string(),
            created_at: inner.base + chrono::Duration::milliseconds(inner.seq),
            fields,
        }
    }

    /// Inject a delivery on every live subscription of `namespace`, bypassing
    /// the stored records. Used to simulate malformed records, stream errors,
    /// and late deliveries.
    pub(crate) fn push_snapshot(&self, namespace: &str, delivery: ScanResult<Snapshot>) {
        let inner = self.inner.lock().unwrap();
        if let Some(senders) = inner.subscribers.get(namespace) {
            for sender in senders {
                let payload = match &delivery {
                    Ok(snapshot) => Ok(snapshot.clone()),
                    Err(err) => Err(ScanError::transport(anyhow!("{err}"))),
                };
                let _ = sender.try_send(payload);
            }
        }
    }

    pub(crate) fn live_subscriber_count(&self, namespace: &str) -> usize {
        let mut inner = self.inner.lock().unwrap();
        match inner.subscribers.get_mut(namespace) {
            Some(senders) => {
                senders.retain(|sender| !sender.is_closed());
                senders.len()
            }
            None => 0,
        }
    }

    fn snapshot_of(inner: &MemoryStoreInner, namespace: &str) -> Snapshot {
        let mut snapshot = inner
            .records
            .get(namespace)
            .cloned()
            .unwrap_or_default();
        snapshot.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        snapshot
    }

    fn broadcast(inner: &mut MemoryStoreInner, namespace: &str) {
        let snapshot = Self::snapshot_of(inner, namespace);
        if let Some(senders) = inner.subscribers.get_mut(namespace) {
            senders.retain(|sender| !sender.is_closed());
            for sender in senders.iter() {
                let _ = sender.try_send(Ok(snapshot.clone()));
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, namespace: &str, record: NewRecord) -> ScanResult<RecordId> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_writes {
            return Err(ScanError::transport(anyhow!("store unreachable")));
        }

        inner.creates += 1;
        inner.seq += 1;
        let created_at = inner.base + chrono::Duration::milliseconds(inner.seq);
        let id = Uuid::new_v4().to_string();
        inner
            .records
            .entry(namespace.to_string())
            .or_default()
            .push(StoredRecord {
                id: id.clone(),
                created_at,
                fields: record.fields,
            });

        Self::broadcast(&mut inner, namespace);
        Ok(id)
    }

    async fn delete(&self, namespace: &str, record_id: &str) -> ScanResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_writes || inner.fail_delete_ids.contains(record_id) {
            return Err(ScanError::transport(anyhow!("store unreachable")));
        }

        if let Some(records) = inner.records.get_mut(namespace) {
            records.retain(|record| record.id != record_id);
        }

        Self::broadcast(&mut inner, namespace);
        Ok(())
    }

    async fn subscribe(&self, namespace: &str) -> ScanResult<SnapshotReceiver> {
        let mut inner = self.inner.lock().unwrap();
        let (tx, rx) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);

        let initial = Self::snapshot_of(&inner, namespace);
        let _ = tx.try_send(Ok(initial));

        inner
            .subscribers
            .entry(namespace.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}

// ---------------------------------------------------------------------------
// Camera frames
// ---------------------------------------------------------------------------

pub(crate) struct FakeFrames {
    status: StdMutex<PermissionStatus>,
    grant_on_request: bool,
    frames: Mutex<mpsc::Receiver<CaptureFrame>>,
}

impl FakeFrames {
    fn with_status(
        status: PermissionStatus,
        grant_on_request: bool,
    ) -> (Arc<Self>, mpsc::Sender<CaptureFrame>) {
        let (tx, rx) = mpsc::channel(8);
        let source = Arc::new(Self {
            status: StdMutex::new(status),
            grant_on_request,
            frames: Mutex::new(rx),
        });
        (source, tx)
    }

    pub(crate) fn granted() -> (Arc<Self>, mpsc::Sender<CaptureFrame>) {
        Self::with_status(PermissionStatus::Granted, false)
    }

    pub(crate) fn denied() -> (Arc<Self>, mpsc::Sender<CaptureFrame>) {
        Self::with_status(PermissionStatus::Undetermined, false)
    }

    pub(crate) fn undetermined_then_granted() -> (Arc<Self>, mpsc::Sender<CaptureFrame>) {
        Self::with_status(PermissionStatus::Undetermined, true)
    }
}

#[async_trait]
impl FrameSource for FakeFrames {
    fn permission_status(&self) -> PermissionStatus {
        *self.status.lock().unwrap()
    }

    async fn request_permission(&self) -> PermissionStatus {
        let granted = if self.grant_on_request {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        };
        *self.status.lock().unwrap() = granted;
        granted
    }

    async fn next_frame(&self) -> anyhow::Result<CaptureFrame> {
        self.frames
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| anyhow!("frame source closed"))
    }
}

/// A tiny valid 2x2 PNG.
pub(crate) fn test_png() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([200, 120, 40, 255]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("encoding a 2x2 PNG cannot fail");
    bytes
}

pub(crate) fn test_frame() -> CaptureFrame {
    CaptureFrame::from_png_bytes(test_png()).expect("test PNG should decode")
}

// ---------------------------------------------------------------------------
// Inference
// ---------------------------------------------------------------------------

pub(crate) struct FakeInference {
    response: String,
    fail: StdMutex<bool>,
    prompts: StdMutex<Vec<String>>,
}

impl FakeInference {
    pub(crate) fn responding(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: response.to_string(),
            fail: StdMutex::new(false),
            prompts: StdMutex::new(Vec::new()),
        })
    }

    pub(crate) fn fail_next(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceClient for FakeInference {
    async fn analyze(&self, image_png: &[u8], prompt: &str) -> ScanResult<String> {
        assert!(!image_png.is_empty(), "analyze called without image bytes");
        self.prompts.lock().unwrap().push(prompt.to_string());
        if *self.fail.lock().unwrap() {
            return Err(ScanError::transport(anyhow!("inference endpoint down")));
        }
        Ok(self.response.clone())
    }
}
