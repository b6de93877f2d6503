//! The persisted sample record.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::normalize::Sequence;

/// A labeled, persisted gesture sequence. Never mutated after creation.
///
/// This is also the export unit: each archive entry is one `Sample` serialized as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub label: String,
    /// Unix epoch, milliseconds.
    pub created_at: u64,
    pub frames: Sequence,
    /// `<label>_<ordinal>.json`; unique within the store.
    pub filename: String,
}

impl Sample {
    pub fn new(label: &str, created_at: u64, frames: Sequence, ordinal: u64) -> Self {
        Self {
            label: label.to_string(),
            created_at,
            frames,
            filename: sample_filename(label, ordinal),
        }
    }
}

/// Filename for the `ordinal`-th (1-based) sample of `label`.
pub fn sample_filename(label: &str, ordinal: u64) -> String {
    format!("{label}_{ordinal}.json")
}

/// Current wall-clock time as unix epoch milliseconds (0 if the clock is before 1970).
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
