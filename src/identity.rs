//! Identity capability boundary.
//!
//! The core only depends on "current user id, or none" plus a change channel;
//! the actual vendor (token refresh, credential storage, etc.) lives behind
//! this trait.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::ScanResult;

/// Opaque id issued by the identity vendor. Source of truth for namespace
/// scoping and authorization checks.
pub type UserId = String;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The currently authenticated user, if any.
    fn current_identity(&self) -> Option<UserId>;

    /// Change channel carrying the latest identity. The receiver observes
    /// sign-in and sign-out transitions; intermediate states may be skipped
    /// (watch semantics).
    fn watch_identity(&self) -> watch::Receiver<Option<UserId>>;

    async fn sign_in(&self, email: &str, password: &str) -> ScanResult<UserId>;

    async fn sign_up(&self, email: &str, password: &str) -> ScanResult<UserId>;

    async fn sign_out(&self) -> ScanResult<()>;
}
