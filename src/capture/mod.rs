//! Capture session: one live camera feed, one captured frame.

mod controller;
mod frame;
mod loop_worker;

pub use controller::{CaptureController, CaptureState};
pub use frame::CaptureFrame;

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Undetermined,
    Granted,
    Denied,
}

/// Camera hardware seam. The source owns the platform session and decode
/// pipeline; the controller only pulls decoded frames from it.
#[async_trait]
pub trait FrameSource: Send + Sync {
    fn permission_status(&self) -> PermissionStatus;

    /// Prompt the platform permission dialog. Returns the resulting status.
    async fn request_permission(&self) -> PermissionStatus;

    /// Await the next decoded frame from the hardware pipeline.
    async fn next_frame(&self) -> anyhow::Result<CaptureFrame>;
}
