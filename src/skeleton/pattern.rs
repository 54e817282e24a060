//! Rigid marker pattern oriented from pairs of segments

use crate::algorithms::basis::{guarded_cross, look_rotation};
use crate::processing::aggregator::SegmentFrame;
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Direction between two segments, `to - from`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentPair {
    pub from: String,
    pub to: String,
}

impl SegmentPair {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    fn direction(&self, segments: &SegmentFrame) -> Option<Vector3<f64>> {
        Some(segments.position(&self.to)? - segments.position(&self.from)?)
    }
}

/// Where the pattern's up axis comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpSource {
    /// Up taken directly from a segment pair
    Up(SegmentPair),
    /// Up is `right x forward` with right from a segment pair
    Right(SegmentPair),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternOrientation {
    pub forward: SegmentPair,
    pub up: UpSource,
}

/// Generic pattern settings. Without an orientation, segment rotations are
/// whatever the markers supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub orientation: Option<PatternOrientation>,
}

impl PatternConfig {
    /// Segments the orientation pairs reference
    pub fn required_segments(&self) -> Vec<String> {
        let Some(orientation) = &self.orientation else {
            return Vec::new();
        };
        let up = match &orientation.up {
            UpSource::Up(pair) | UpSource::Right(pair) => pair,
        };
        vec![
            orientation.forward.from.clone(),
            orientation.forward.to.clone(),
            up.from.clone(),
            up.to.clone(),
        ]
    }

    /// Orient every segment with the pattern basis. Returns the rotation
    /// applied, or `None` when the basis was unusable this frame.
    pub fn process_segments(&self, segments: &mut SegmentFrame) -> Option<UnitQuaternion<f64>> {
        let orientation = self.orientation.as_ref()?;
        let forward = orientation.forward.direction(segments)?;
        let up = match &orientation.up {
            UpSource::Up(pair) => pair.direction(segments)?,
            UpSource::Right(pair) => guarded_cross(&pair.direction(segments)?, &forward)?,
        };

        let Some(rotation) = look_rotation(&forward, &up) else {
            debug!("pattern basis degenerate, rotations left unchanged");
            return None;
        };
        for segment in segments.iter_mut() {
            segment.rotation = rotation;
        }
        Some(rotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Segment;

    fn frame() -> SegmentFrame {
        let mut frame = SegmentFrame::new(0.0);
        for (name, p) in [
            ("back", [0.0, 0.0, 0.0]),
            ("front", [0.0, 0.0, 50.0]),
            ("left", [-20.0, 0.0, 10.0]),
            ("right", [20.0, 0.0, 10.0]),
            ("top", [0.0, 30.0, 10.0]),
        ] {
            frame.insert(Segment {
                name: name.to_string(),
                position: Vector3::from(p),
                rotation: UnitQuaternion::identity(),
                resolved: true,
            });
        }
        frame
    }

    #[test]
    fn test_right_pair_orientation() {
        let config = PatternConfig {
            orientation: Some(PatternOrientation {
                forward: SegmentPair::new("back", "front"),
                up: UpSource::Right(SegmentPair::new("left", "right")),
            }),
        };
        let mut segments = frame();
        let rotation = config.process_segments(&mut segments).unwrap();

        assert!((rotation * Vector3::z() - Vector3::z()).norm() < 1e-9);
        // right (+x) crossed with forward (+z) gives -y
        assert!((rotation * Vector3::y() + Vector3::y()).norm() < 1e-9);
        assert!(segments.iter().all(|s| s.rotation == rotation));
    }

    #[test]
    fn test_up_pair_orientation() {
        let config = PatternConfig {
            orientation: Some(PatternOrientation {
                forward: SegmentPair::new("back", "front"),
                up: UpSource::Up(SegmentPair::new("back", "top")),
            }),
        };
        let mut segments = frame();
        let rotation = config.process_segments(&mut segments).unwrap();
        assert!((rotation * Vector3::y() - Vector3::y()).norm() < 1e-9);
    }

    #[test]
    fn test_degenerate_basis_leaves_rotations() {
        let config = PatternConfig {
            orientation: Some(PatternOrientation {
                forward: SegmentPair::new("back", "front"),
                up: UpSource::Up(SegmentPair::new("back", "front")),
            }),
        };
        let mut segments = frame();
        assert!(config.process_segments(&mut segments).is_none());
        assert!(segments.iter().all(|s| s.rotation == UnitQuaternion::identity()));
    }

    #[test]
    fn test_without_orientation() {
        let mut segments = frame();
        assert!(PatternConfig::default().process_segments(&mut segments).is_none());
        assert!(PatternConfig::default().required_segments().is_empty());
    }
}
