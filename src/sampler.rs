//! Fixed-cadence sampling of the landmark stream into sequences.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::landmarks::LandmarkSource;
use crate::normalize::{normalize_frame, Sequence};
use crate::FRAME_COUNT;

/// Default gap between two polls of the landmark source (~30 fps).
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Anything that can record one gesture performance.
///
/// The batch controller is written against this contract so hosts can swap in
/// recorded or synthetic captures.
#[async_trait]
pub trait SequenceCapture: Send + Sync {
    /// Records one full sequence. Never fails and never returns a partial sequence.
    async fn capture_sequence(&self) -> Sequence;
}

/// Polls a [`LandmarkSource`] [`FRAME_COUNT`] times, `interval` apart.
///
/// The loop runs for `FRAME_COUNT * interval` regardless of how often the detector
/// actually updates. Polls that find no hand contribute a zero frame.
pub struct SequenceSampler {
    source: Arc<dyn LandmarkSource>,
    interval: Duration,
}

impl std::fmt::Debug for SequenceSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceSampler")
            .field("interval", &self.interval)
            .field("frame_count", &FRAME_COUNT)
            .finish()
    }
}

impl SequenceSampler {
    pub fn new(source: Arc<dyn LandmarkSource>, interval: Duration) -> Self {
        Self { source, interval }
    }

    pub fn with_default_interval(source: Arc<dyn LandmarkSource>) -> Self {
        Self::new(source, DEFAULT_FRAME_INTERVAL)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl SequenceCapture for SequenceSampler {
    async fn capture_sequence(&self) -> Sequence {
        let mut frames = Vec::with_capacity(FRAME_COUNT);
        let mut missing = 0usize;

        for _ in 0..FRAME_COUNT {
            let snapshot = self.source.current_snapshot();
            if snapshot.is_none() {
                missing += 1;
            }
            frames.push(normalize_frame(snapshot.as_ref()));
            tokio::time::sleep(self.interval).await;
        }

        debug!(frames = FRAME_COUNT, missing, "sequence sampled");
        Sequence::from_sampled(frames)
    }
}
