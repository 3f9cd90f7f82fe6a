use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::frame::CaptureFrame;
use super::loop_worker::capture_loop;
use super::{FrameSource, PermissionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureState {
    Idle,
    Running,
    /// Camera permission denied; consumers show a placeholder instead of a
    /// hard failure.
    Unavailable,
}

struct CaptureWorker {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the single live camera session. One instance per process; `start` and
/// `stop` bracket the session, `capture_current_frame` freezes the live frame
/// for the scan flow.
pub struct CaptureController {
    source: Arc<dyn FrameSource>,
    state_tx: watch::Sender<CaptureState>,
    live_tx: watch::Sender<Option<CaptureFrame>>,
    captured_tx: watch::Sender<Option<CaptureFrame>>,
    snapshot_dir: Option<PathBuf>,
    worker: Mutex<Option<CaptureWorker>>,
}

impl CaptureController {
    pub fn new(source: Arc<dyn FrameSource>, snapshot_dir: Option<PathBuf>) -> Self {
        let (state_tx, _) = watch::channel(CaptureState::Idle);
        let (live_tx, _) = watch::channel(None);
        let (captured_tx, _) = watch::channel(None);
        Self {
            source,
            state_tx,
            live_tx,
            captured_tx,
            snapshot_dir,
            worker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> CaptureState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<CaptureState> {
        self.state_tx.subscribe()
    }

    pub fn live_frame(&self) -> Option<CaptureFrame> {
        self.live_tx.borrow().clone()
    }

    pub fn watch_live_frame(&self) -> watch::Receiver<Option<CaptureFrame>> {
        self.live_tx.subscribe()
    }

    pub fn captured_frame(&self) -> Option<CaptureFrame> {
        self.captured_tx.borrow().clone()
    }

    pub fn watch_captured_frame(&self) -> watch::Receiver<Option<CaptureFrame>> {
        self.captured_tx.subscribe()
    }

    /// Start the camera session. Requests permission when undetermined;
    /// no-op when already running. Denial is reported to the log and parks
    /// the controller in `Unavailable` rather than failing the caller.
    pub async fn start(&self) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return;
        }

        let status = match self.source.permission_status() {
            PermissionStatus::Undetermined => self.source.request_permission().await,
            status => status,
        };

        if status != PermissionStatus::Granted {
            error!("camera permission not granted; capture unavailable");
            self.state_tx.send_replace(CaptureState::Unavailable);
            return;
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(capture_loop(
            Arc::clone(&self.source),
            self.live_tx.clone(),
            cancel_token.clone(),
        ));

        *worker = Some(CaptureWorker {
            cancel_token,
            handle,
        });
        self.state_tx.send_replace(CaptureState::Running);
    }

    /// Halt the session. Safe when already stopped, and safe concurrently
    /// with an in-flight frame decode: the loop is joined before the live
    /// frame is cleared, so a late frame is dropped, never resurfaced.
    pub async fn stop(&self) {
        let mut worker = self.worker.lock().await;
        if let Some(active) = worker.take() {
            active.cancel_token.cancel();
            if let Err(err) = active.handle.await {
                error!("capture loop failed to join: {err}");
            }
            self.live_tx.send_replace(None);
            self.state_tx.send_replace(CaptureState::Idle);
            info!("capture session stopped");
        }
    }

    /// Freeze the live frame into the captured slot. With no live frame yet
    /// this is a no-op returning `None`; the caller treats that as retryable.
    /// A best-effort PNG snapshot is written to the snapshot directory off
    /// the async context; write failures are logged, never surfaced.
    pub fn capture_current_frame(&self) -> Option<CaptureFrame> {
        let frame = self.live_tx.borrow().clone()?;
        self.captured_tx.send_replace(Some(frame.clone()));

        if let Some(dir) = self.snapshot_dir.clone() {
            let bytes = frame.shared_png();
            let path = dir.join(format!("scan-{}.png", Uuid::new_v4()));
            tokio::task::spawn_blocking(move || {
                let result = std::fs::create_dir_all(&dir)
                    .and_then(|_| std::fs::write(&path, bytes.as_slice()));
                if let Err(err) = result {
                    warn!("failed to write capture snapshot {}: {err}", path.display());
                }
            });
        }

        Some(frame)
    }
}
