//! History entry models and their record encoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ScanError, ScanResult};
use crate::identity::UserId;
use crate::store::{NewRecord, RecordId, StoredRecord};

/// One persisted scan. Immutable after creation; the only lifecycle
/// transitions are created and deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: RecordId,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub analysis_text: String,
}

/// The client-side half of an entry, before the store assigns `id` and
/// `created_at`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDraft {
    pub owner_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub analysis_text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordFields {
    owner_id: UserId,
    #[serde(default)]
    label: Option<String>,
    analysis_text: String,
}

impl HistoryDraft {
    pub fn into_record(self) -> ScanResult<NewRecord> {
        let fields = serde_json::to_value(&self)
            .map_err(|err| ScanError::Decode(format!("failed to encode history draft: {err}")))?;
        Ok(NewRecord { fields })
    }
}

impl HistoryEntry {
    /// Decode one store record. A malformed record yields `Decode` so the
    /// caller can drop it without failing the rest of the snapshot.
    pub fn decode(record: &StoredRecord) -> ScanResult<Self> {
        let fields: RecordFields = serde_json::from_value(record.fields.clone())
            .map_err(|err| ScanError::Decode(format!("record {}: {err}", record.id)))?;

        if fields.analysis_text.trim().is_empty() {
            return Err(ScanError::Decode(format!(
                "record {}: analysisText is empty",
                record.id
            )));
        }

        Ok(Self {
            id: record.id.clone(),
            owner_id: fields.owner_id,
            created_at: record.created_at,
            label: fields.label,
            analysis_text: fields.analysis_text,
        })
    }
}
