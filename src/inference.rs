//! Remote inference capability: one request/response call to a hosted model.

use async_trait::async_trait;

use crate::error::ScanResult;

#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Analyze one PNG image with the given prompt. No streaming; the full
    /// response text comes back in one piece.
    async fn analyze(&self, image_png: &[u8], prompt: &str) -> ScanResult<String>;
}

const MAX_LABEL_CHARS: usize = 80;

/// Derive a short label from the model response: first non-empty line,
/// truncated. `None` when the response has no usable line.
pub fn derive_label(analysis: &str) -> Option<String> {
    let line = analysis.lines().map(str::trim).find(|line| !line.is_empty())?;
    Some(line.chars().take(MAX_LABEL_CHARS).collect())
}
