//! Collector configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_DATASET_PATH, LANDMARK_IPC_NAME};

/// Tunables for a capture deployment. Every field has a default, so a config file only
/// needs to mention what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// On-disk location of the sled sample store.
    pub dataset_path: PathBuf,
    /// Directory exported archives are written to.
    pub export_dir: PathBuf,
    /// Local socket the detector process connects to.
    pub ipc_name: String,
    pub frame_interval_ms: u64,
    /// Pause between two samples of a batch so the user can reposition their hand.
    pub sample_pause_ms: u64,
    /// How long a finished batch stays in the `Completed` state before returning to idle.
    pub completed_linger_ms: u64,
    /// Largest accepted batch size.
    pub max_batch: u32,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from(DEFAULT_DATASET_PATH),
            export_dir: PathBuf::from("."),
            ipc_name: LANDMARK_IPC_NAME.to_string(),
            frame_interval_ms: 33,
            sample_pause_ms: 150,
            completed_linger_ms: 600,
            max_batch: 500,
        }
    }
}

impl CollectorConfig {
    /// Reads a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let raw = std::fs::read(path)?;
        serde_json::from_slice(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn sample_pause(&self) -> Duration {
        Duration::from_millis(self.sample_pause_ms)
    }

    pub fn completed_linger(&self) -> Duration {
        Duration::from_millis(self.completed_linger_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector.json");
        std::fs::write(&path, r#"{ "max_batch": 50, "export_dir": "/tmp/out" }"#).unwrap();

        let config = CollectorConfig::from_json_file(&path).unwrap();
        assert_eq!(config.max_batch, 50);
        assert_eq!(config.export_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.frame_interval(), Duration::from_millis(33));
        assert_eq!(config.sample_pause(), Duration::from_millis(150));
        assert_eq!(config.dataset_path, PathBuf::from(DEFAULT_DATASET_PATH));
    }

    #[test]
    fn malformed_file_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector.json");
        std::fs::write(&path, "not json").unwrap();

        let err = CollectorConfig::from_json_file(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
