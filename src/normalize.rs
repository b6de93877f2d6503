//! Frame normalization and the fixed-length sequence type.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::landmarks::LandmarkSnapshot;
use crate::{FRAME_COUNT, FRAME_WIDTH};

/// Lower bound on the scale divisor. A hand whose points all coincide with the wrist
/// therefore normalizes to all zeros instead of dividing by zero.
pub const SCALE_FLOOR: f64 = 1e-6;

/// 63 finite values (21 points x 3 coords), wrist-relative and scaled so the farthest
/// point from the wrist sits at distance 1. All zeros when no usable hand was present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct NormalizedFrame(Vec<f64>);

impl NormalizedFrame {
    pub fn zeroed() -> Self {
        Self(vec![0.0; FRAME_WIDTH])
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    /// Coordinates of landmark `index` as `[x, y, z]`, or `None` past the last landmark.
    pub fn point(&self, index: usize) -> Option<[f64; 3]> {
        let base = index.checked_mul(3)?;
        match self.0.get(base..base.checked_add(3)?)? {
            [x, y, z] => Some([*x, *y, *z]),
            _ => None,
        }
    }
}

impl TryFrom<Vec<f64>> for NormalizedFrame {
    type Error = String;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        if values.len() != FRAME_WIDTH {
            return Err(format!(
                "frame must hold {FRAME_WIDTH} values, got {}",
                values.len()
            ));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err("frame values must be finite".to_string());
        }
        Ok(Self(values))
    }
}

impl From<NormalizedFrame> for Vec<f64> {
    fn from(frame: NormalizedFrame) -> Self {
        frame.0
    }
}

/// One gesture performance: exactly [`FRAME_COUNT`] frames in capture order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<NormalizedFrame>", into = "Vec<NormalizedFrame>")]
pub struct Sequence(Vec<NormalizedFrame>);

impl Sequence {
    /// Wraps frames produced by the sampler loop, which always yields [`FRAME_COUNT`].
    pub(crate) fn from_sampled(frames: Vec<NormalizedFrame>) -> Self {
        debug_assert_eq!(frames.len(), FRAME_COUNT);
        Self(frames)
    }

    pub fn frames(&self) -> &[NormalizedFrame] {
        &self.0
    }

    /// Number of frames captured while no hand was visible.
    pub fn empty_frames(&self) -> usize {
        self.0.iter().filter(|f| f.is_zero()).count()
    }
}

impl TryFrom<Vec<NormalizedFrame>> for Sequence {
    type Error = String;

    fn try_from(frames: Vec<NormalizedFrame>) -> Result<Self, Self::Error> {
        if frames.len() != FRAME_COUNT {
            return Err(format!(
                "sequence must hold {FRAME_COUNT} frames, got {}",
                frames.len()
            ));
        }
        Ok(Self(frames))
    }
}

impl From<Sequence> for Vec<NormalizedFrame> {
    fn from(sequence: Sequence) -> Self {
        sequence.0
    }
}

/// Euclidean length computed like `hypot`: components are scaled by the largest one
/// before squaring, so large finite coordinates do not overflow.
fn stable_norm(v: &Vector3<f64>) -> f64 {
    let largest = v.amax();
    if largest == 0.0 || !largest.is_finite() {
        return largest;
    }
    largest * (v / largest).norm()
}

/// Maps a snapshot (or its absence) to a translation- and scale-invariant frame.
///
/// Every point is shifted so the wrist sits at the origin, then divided by
/// `max(SCALE_FLOOR, max point-to-wrist distance)`. A snapshot with any NaN or infinite
/// coordinate is treated like a missing hand and yields a zero frame.
pub fn normalize_frame(snapshot: Option<&LandmarkSnapshot>) -> NormalizedFrame {
    let Some(snapshot) = snapshot.filter(|s| s.is_finite()) else {
        return NormalizedFrame::zeroed();
    };

    let wrist = snapshot.wrist().0;
    let centered: Vec<_> = snapshot.points().iter().map(|p| p.0 - wrist).collect();
    let scale = centered.iter().map(stable_norm).fold(SCALE_FLOOR, f64::max);
    if !scale.is_finite() {
        // Points spread wider than f64 can represent relative to the wrist.
        return NormalizedFrame::zeroed();
    }

    NormalizedFrame(
        centered
            .iter()
            .flat_map(|v| {
                let v = v / scale;
                [v.x, v.y, v.z]
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::LandmarkPoint;

    const EPS: f64 = 1e-9;

    fn hand() -> LandmarkSnapshot {
        LandmarkSnapshot::new(std::array::from_fn(|i| {
            let t = i as f64;
            LandmarkPoint::new(0.4 + 0.01 * t, 0.6 - 0.015 * t, -0.02 * (t % 4.0))
        }))
    }

    fn translated(snapshot: &LandmarkSnapshot, dx: f64, dy: f64, dz: f64) -> LandmarkSnapshot {
        LandmarkSnapshot::new(std::array::from_fn(|i| {
            let p = snapshot.points()[i];
            LandmarkPoint::new(p.x() + dx, p.y() + dy, p.z() + dz)
        }))
    }

    fn max_norm(frame: &NormalizedFrame) -> f64 {
        (0..crate::LANDMARK_COUNT)
            .map(|i| {
                let [x, y, z] = frame.point(i).unwrap();
                (x * x + y * y + z * z).sqrt()
            })
            .fold(0.0, f64::max)
    }

    #[test]
    fn absent_hand_is_all_zero() {
        let frame = normalize_frame(None);
        assert_eq!(frame.values().len(), FRAME_WIDTH);
        assert!(frame.is_zero());
    }

    #[test]
    fn wrist_maps_to_origin() {
        let frame = normalize_frame(Some(&hand()));
        assert_eq!(frame.point(0), Some([0.0, 0.0, 0.0]));
    }

    #[test]
    fn farthest_point_has_unit_norm() {
        let frame = normalize_frame(Some(&hand()));
        assert!((max_norm(&frame) - 1.0).abs() < EPS);
    }

    #[test]
    fn translation_does_not_change_output() {
        let base = normalize_frame(Some(&hand()));
        let moved = normalize_frame(Some(&translated(&hand(), 0.3, -0.2, 0.05)));
        for (a, b) in base.values().iter().zip(moved.values()) {
            assert!((a - b).abs() < EPS, "{a} vs {b}");
        }
    }

    #[test]
    fn uniform_scaling_does_not_change_output() {
        let small = hand();
        let big = LandmarkSnapshot::new(std::array::from_fn(|i| {
            LandmarkPoint(small.points()[i].0 * 3.0)
        }));
        let a = normalize_frame(Some(&small));
        let b = normalize_frame(Some(&big));
        for (x, y) in a.values().iter().zip(b.values()) {
            assert!((x - y).abs() < EPS);
        }
    }

    #[test]
    fn collapsed_hand_normalizes_to_zero() {
        let collapsed = LandmarkSnapshot::new([LandmarkPoint::new(0.5, 0.5, 0.1); 21]);
        assert!(normalize_frame(Some(&collapsed)).is_zero());
    }

    #[test]
    fn non_finite_hand_counts_as_absent() {
        let mut points = *hand().points();
        points[4] = LandmarkPoint::new(f64::NAN, 0.5, 0.0);
        assert!(normalize_frame(Some(&LandmarkSnapshot::new(points))).is_zero());

        points[4] = LandmarkPoint::new(0.5, f64::NEG_INFINITY, 0.0);
        assert!(normalize_frame(Some(&LandmarkSnapshot::new(points))).is_zero());
    }

    #[test]
    fn large_coordinates_still_reach_unit_norm() {
        let huge = LandmarkSnapshot::new(std::array::from_fn(|i| {
            LandmarkPoint::new(i as f64 * 1e19, 0.0, 0.0)
        }));
        let frame = normalize_frame(Some(&huge));
        assert!(!frame.is_zero());
        assert!((max_norm(&frame) - 1.0).abs() < EPS);
        assert!((frame.point(20).unwrap()[0] - 1.0).abs() < EPS);

        let extreme = LandmarkSnapshot::new(std::array::from_fn(|i| {
            LandmarkPoint::new(i as f64 * 1e200, -(i as f64) * 1e200, 0.0)
        }));
        let frame = normalize_frame(Some(&extreme));
        assert!((max_norm(&frame) - 1.0).abs() < EPS);
    }

    #[test]
    fn point_past_the_last_landmark_is_none() {
        let frame = NormalizedFrame::zeroed();
        assert!(frame.point(20).is_some());
        assert!(frame.point(21).is_none());
        assert!(frame.point(usize::MAX).is_none());
    }

    #[test]
    fn frame_deserialization_rejects_null_values() {
        let mut values = vec![serde_json::json!(0.0); FRAME_WIDTH];
        values[10] = serde_json::Value::Null;
        assert!(serde_json::from_value::<NormalizedFrame>(serde_json::Value::Array(values)).is_err());
    }

    #[test]
    fn sequence_rejects_wrong_frame_count() {
        let frames = vec![NormalizedFrame::zeroed(); FRAME_COUNT - 1];
        assert!(Sequence::try_from(frames).is_err());
    }

    #[test]
    fn frame_deserialization_checks_width() {
        let short = serde_json::json!([0.0, 1.0, 2.0]);
        assert!(serde_json::from_value::<NormalizedFrame>(short).is_err());
    }
}
