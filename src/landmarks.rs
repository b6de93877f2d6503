//! Hand landmark primitives and the single-slot snapshot cell.
//!
//! The hand detector is an external collaborator. It refreshes the "current
//! snapshot" at its own cadence; the capture pipeline only ever polls it.

use std::sync::Arc;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::LANDMARK_COUNT;

/// A detector-reported 3D point on a tracked hand.
///
/// Internally uses [`nalgebra::Vector3<f64>`]; on the wire it is an `{x, y, z}` object,
/// which is the shape hand trackers emit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "WirePoint", into = "WirePoint")]
pub struct LandmarkPoint(pub Vector3<f64>);

#[derive(Serialize, Deserialize)]
struct WirePoint {
    x: f64,
    y: f64,
    z: f64,
}

impl From<WirePoint> for LandmarkPoint {
    fn from(p: WirePoint) -> Self {
        Self::new(p.x, p.y, p.z)
    }
}

impl From<LandmarkPoint> for WirePoint {
    fn from(p: LandmarkPoint) -> Self {
        WirePoint {
            x: p.x(),
            y: p.y(),
            z: p.z(),
        }
    }
}

impl LandmarkPoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self(Vector3::new(x, y, z))
    }

    pub fn x(&self) -> f64 {
        self.0.x
    }

    pub fn y(&self) -> f64 {
        self.0.y
    }

    pub fn z(&self) -> f64 {
        self.0.z
    }
}

/// The full set of 21 landmarks for one detected hand. Index 0 is the wrist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSnapshot([LandmarkPoint; LANDMARK_COUNT]);

impl LandmarkSnapshot {
    pub fn new(points: [LandmarkPoint; LANDMARK_COUNT]) -> Self {
        Self(points)
    }

    /// Builds a snapshot from a slice, returning `None` unless it holds exactly 21 points.
    pub fn from_slice(points: &[LandmarkPoint]) -> Option<Self> {
        let points: [LandmarkPoint; LANDMARK_COUNT] = points.try_into().ok()?;
        Some(Self(points))
    }

    pub fn wrist(&self) -> LandmarkPoint {
        self.0[0]
    }

    pub fn points(&self) -> &[LandmarkPoint; LANDMARK_COUNT] {
        &self.0
    }

    /// False when any coordinate is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|p| p.0.iter().all(|c| c.is_finite()))
    }
}

/// Read side of the detector: a point-in-time, non-blocking view of the latest snapshot.
pub trait LandmarkSource: Send + Sync {
    /// Latest known landmarks, or `None` when no hand is currently detected.
    fn current_snapshot(&self) -> Option<LandmarkSnapshot>;
}

/// Single-slot shared cell holding the most recent snapshot.
///
/// Writers overwrite (last write wins); readers never wait. There is no queueing and no
/// backpressure, so a sampler always sees whatever was published last.
#[derive(Debug, Clone)]
pub struct SnapshotCell {
    slot: Arc<watch::Sender<Option<LandmarkSnapshot>>>,
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCell {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Replaces the current snapshot. `None` means the hand was lost.
    pub fn publish(&self, snapshot: Option<LandmarkSnapshot>) {
        self.slot.send_replace(snapshot);
    }

    /// Change notifications for consumers that want to follow the stream (e.g. an overlay).
    pub fn subscribe(&self) -> watch::Receiver<Option<LandmarkSnapshot>> {
        self.slot.subscribe()
    }
}

impl LandmarkSource for SnapshotCell {
    fn current_snapshot(&self) -> Option<LandmarkSnapshot> {
        self.slot.borrow().clone()
    }
}
