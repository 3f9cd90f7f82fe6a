use std::sync::Arc;

use log::{info, warn};
use tokio::sync::watch;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use super::frame::CaptureFrame;
use super::FrameSource;

const FRAME_ERROR_BACKOFF_MS: u64 = 250;

/// Pulls decoded frames from the source and replaces the live frame until
/// cancelled. Delivery is lossy: the watch channel always holds the latest
/// frame, never a backlog.
pub(crate) async fn capture_loop(
    source: Arc<dyn FrameSource>,
    live_tx: watch::Sender<Option<CaptureFrame>>,
    cancel_token: CancellationToken,
) {
    info!("capture loop started");
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("capture loop shutting down");
                break;
            }
            next = source.next_frame() => match next {
                Ok(frame) => {
                    live_tx.send_replace(Some(frame));
                }
                Err(err) => {
                    warn!("frame delivery failed: {err}");
                    tokio::time::sleep(Duration::from_millis(FRAME_ERROR_BACKOFF_MS)).await;
                }
            }
        }
    }
}
