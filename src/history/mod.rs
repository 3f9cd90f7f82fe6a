pub mod models;
pub mod sync;

pub use models::{HistoryDraft, HistoryEntry};
pub use sync::{ClearOutcome, HistorySynchronizer};
