//! platelens: service core for a food photo analysis app.
//!
//! The crate owns the stateful glue between a UI shell and three external
//! vendors (identity, document store, model inference) plus the camera
//! session. All vendor access goes through capability traits; observable
//! state is exposed via `tokio::sync::watch` channels.

pub mod capture;
pub mod error;
pub mod history;
pub mod identity;
pub mod inference;
pub mod settings;
pub mod store;

#[cfg(test)]
pub(crate) mod fixtures;

use std::path::Path;
use std::sync::Arc;

use log::info;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use capture::{CaptureController, CaptureFrame, CaptureState, FrameSource, PermissionStatus};
pub use error::{ScanError, ScanResult};
pub use history::{ClearOutcome, HistoryEntry, HistorySynchronizer};
pub use identity::{IdentityProvider, UserId};
pub use inference::InferenceClient;
pub use settings::{AnalysisSettings, SettingsStore};
pub use store::{DocumentStore, NewRecord, RecordId, StoredRecord};

use inference::derive_label;

/// Result of one completed scan: the saved entry id plus what was derived
/// from the model response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub entry_id: RecordId,
    pub label: Option<String>,
    pub analysis_text: String,
}

/// Process-wide service aggregate: constructed once at startup with the
/// vendor capabilities injected, torn down once at shutdown. A UI shell binds
/// to the watch channels of `history` and `capture` and drives the scan flow
/// through [`analyze_captured_frame`](AppServices::analyze_captured_frame).
pub struct AppServices {
    identity: Arc<dyn IdentityProvider>,
    inference: Arc<dyn InferenceClient>,
    pub history: Arc<HistorySynchronizer>,
    pub capture: CaptureController,
    pub settings: SettingsStore,
    shutdown_token: CancellationToken,
    identity_watcher: Mutex<Option<JoinHandle<()>>>,
}

impl AppServices {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn DocumentStore>,
        inference: Arc<dyn InferenceClient>,
        frames: Arc<dyn FrameSource>,
        data_dir: &Path,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let settings = SettingsStore::new(data_dir.join("settings.json"))?;
        let history = Arc::new(HistorySynchronizer::new(
            Arc::clone(&identity),
            Arc::clone(&store),
        ));
        let capture = CaptureController::new(frames, Some(data_dir.join("snapshots")));

        let shutdown_token = CancellationToken::new();
        let watcher = Arc::clone(&history).spawn_identity_watcher(shutdown_token.child_token());

        info!("platelens services initialized");
        Ok(Self {
            identity,
            inference,
            history,
            capture,
            settings,
            shutdown_token,
            identity_watcher: Mutex::new(Some(watcher)),
        })
    }

    /// Run the captured frame through the model and save the result as a
    /// history entry for the current identity. Fails with `InvalidArgument`
    /// when no frame has been captured and `Unauthorized` when signed out;
    /// inference or write failures surface as `Transport`.
    pub async fn analyze_captured_frame(&self) -> ScanResult<ScanOutcome> {
        let Some(frame) = self.capture.captured_frame() else {
            return Err(ScanError::invalid_argument("no captured frame"));
        };
        let Some(user_id) = self.identity.current_identity() else {
            return Err(ScanError::unauthorized("no signed-in user"));
        };

        let prompt = self.settings.analysis().prompt;
        let analysis_text = self.inference.analyze(frame.png_bytes(), &prompt).await?;
        let label = derive_label(&analysis_text);

        let entry_id = self
            .history
            .create(&user_id, label.clone(), &analysis_text)
            .await?;

        Ok(ScanOutcome {
            entry_id,
            label,
            analysis_text,
        })
    }

    /// Tear everything down: identity watcher, history subscription, camera
    /// session. Terminal state is fully idle; safe to call once at process
    /// end.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        if let Some(handle) = self.identity_watcher.lock().await.take() {
            let _ = handle.await;
        }
        self.history.unsubscribe().await;
        self.capture.stop().await;
        info!("platelens services shut down");
    }
}
