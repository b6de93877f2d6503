//! Gesture dataset collector core.
//!
//! This crate turns a live hand-landmark stream into a labeled dataset:
//! - [`SequenceSampler`]: polls the latest detector snapshot at a fixed cadence and
//!   produces fixed-length [`Sequence`]s of normalized frames.
//! - [`normalize_frame`]: makes a frame wrist-relative and scale-free.
//! - [`SampleStore`]: durable, append-only sled storage with per-label ordinals.
//! - [`BatchController`]: runs capture sessions of N samples and reports progress.
//! - [`ArchiveExporter`]: packs every stored sample into one zip archive.
//! - [`LandmarkFeed`]: receives snapshots from an out-of-process detector.

pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod feed;
pub mod landmarks;
pub mod normalize;
pub mod sample;
pub mod sampler;
pub mod store;

// Re-export for hosts that want to open the dataset DB themselves without declaring a
// direct dependency on `sled`.
pub use sled;

pub use config::CollectorConfig;
pub use controller::{BatchController, BatchSummary, CaptureReport, SessionState};
pub use error::{CollectorError, StorageError};
pub use export::{ArchiveExporter, ExportedArchive};
pub use feed::LandmarkFeed;
pub use landmarks::{LandmarkPoint, LandmarkSnapshot, LandmarkSource, SnapshotCell};
pub use normalize::{normalize_frame, NormalizedFrame, Sequence};
pub use sample::Sample;
pub use sampler::{SequenceCapture, SequenceSampler};
pub use store::SampleStore;

/// Landmarks per detected hand. Index 0 is the wrist.
pub const LANDMARK_COUNT: usize = 21;

/// Values per normalized frame (x, y, z for every landmark).
pub const FRAME_WIDTH: usize = LANDMARK_COUNT * 3;

/// Frames per captured sequence.
pub const FRAME_COUNT: usize = 32;

/// Default on-disk dataset location (sled).
pub const DEFAULT_DATASET_PATH: &str = "gesture_dataset_db";

/// Default local socket the detector process connects to.
///
/// On Unix this is a filesystem-backed socket in `/tmp` so the detector can discover it.
#[cfg(unix)]
pub const LANDMARK_IPC_NAME: &str = "/tmp/gesture_landmarks.sock";

/// Default local socket the detector process connects to (non-Unix platforms).
#[cfg(not(unix))]
pub const LANDMARK_IPC_NAME: &str = "gesture_landmarks";
