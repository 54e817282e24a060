//! Core data types for the marker reconstruction pipeline

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One marker observation as delivered by the capture source.
///
/// `position` is kept in the source axis order; the remap into output axes
/// happens in the aggregator. An all-zero position is the "not observed"
/// sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerSample {
    /// Position in capture units, source axis order (x, y, z)
    pub position: Vector3<f64>,
    /// Orientation, when the source supplies one
    pub rotation: Option<UnitQuaternion<f64>>,
}

impl MarkerSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Vector3::new(x, y, z),
            rotation: None,
        }
    }

    pub fn with_rotation(mut self, rotation: UnitQuaternion<f64>) -> Self {
        self.rotation = Some(rotation);
        self
    }

    /// The "not observed this frame" sentinel
    pub fn missing() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: None,
        }
    }

    /// Build a sample from the source's flat list layout:
    /// `[x, y, z]` or `[x, y, z, qx, qy, qz, qw]`.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.len() < 3 {
            return None;
        }
        let mut sample = Self::new(values[0], values[1], values[2]);
        if values.len() >= 7 {
            let q = Quaternion::new(values[6], values[3], values[4], values[5]);
            if q.norm() > 0.0 {
                sample.rotation = Some(UnitQuaternion::from_quaternion(q));
            }
        }
        Some(sample)
    }

    /// True when the sample carries the zero sentinel
    pub fn is_missing(&self) -> bool {
        self.position == Vector3::zeros()
    }
}

#[derive(Debug, Clone)]
struct MarkerEntry {
    name: String,
    sample: MarkerSample,
}

/// Marker samples for one subject at one instant, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Capture timestamp in seconds
    pub timestamp: f64,
    entries: Vec<MarkerEntry>,
    index: HashMap<String, usize>,
}

impl Frame {
    pub fn new(timestamp: f64) -> Self {
        Self {
            timestamp,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Insert or replace a marker sample. Replacing keeps the original
    /// arrival position.
    pub fn insert(&mut self, marker: impl Into<String>, sample: MarkerSample) {
        let marker = marker.into();
        if let Some(&slot) = self.index.get(&marker) {
            self.entries[slot].sample = sample;
            return;
        }
        self.index.insert(marker.clone(), self.entries.len());
        self.entries.push(MarkerEntry { name: marker, sample });
    }

    pub fn with_marker(mut self, marker: impl Into<String>, sample: MarkerSample) -> Self {
        self.insert(marker, sample);
        self
    }

    pub fn get(&self, marker: &str) -> Option<&MarkerSample> {
        self.index.get(marker).map(|&slot| &self.entries[slot].sample)
    }

    /// Sample for `marker`, with absent markers read as the zero sentinel
    pub fn sample_or_missing(&self, marker: &str) -> MarkerSample {
        self.get(marker).copied().unwrap_or_else(MarkerSample::missing)
    }

    pub fn contains(&self, marker: &str) -> bool {
        self.index.contains_key(marker)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MarkerSample)> {
        self.entries.iter().map(|e| (e.name.as_str(), &e.sample))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Policy for markers that report the zero sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GapFillingStrategy {
    /// Pass samples through as received, zeros included
    #[default]
    UseRemote,
    /// Invalidate the whole group when any marker is missing
    Ignore,
    /// Substitute the marker's most recent valid sample
    UsePrevious,
    /// Salvage from group peers, then reconstruct from the kinematic chain
    FillRelative,
    /// Time-compensated source; reconstructs like `UseRemote`
    ReTimed,
}

impl GapFillingStrategy {
    /// Strategies under which a zero segment freezes its bone instead of
    /// snapping it to the origin
    pub fn freezes_unresolved(&self) -> bool {
        matches!(self, GapFillingStrategy::Ignore | GapFillingStrategy::FillRelative)
    }
}

/// Static mapping from a segment to the markers averaged into it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentGroup {
    pub name: String,
    pub markers: Vec<String>,
}

impl SegmentGroup {
    pub fn new<S: Into<String>>(name: impl Into<String>, markers: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            markers: markers.into_iter().map(Into::into).collect(),
        }
    }
}

/// One row of the kinematic chain table. Rows are independent: a segment's
/// child need not list it as parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    pub segment: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub child: Option<String>,
}

/// Per-frame result for one segment group
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub name: String,
    /// Position in capture units, output axis order
    pub position: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    /// False when no usable data backed this segment this frame
    pub resolved: bool,
}

impl Segment {
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            resolved: false,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.position == Vector3::zeros()
    }
}

/// Final pose handed to the skeleton sink for one bone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Position in output units
    pub position: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

impl Pose {
    pub fn new(position: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Local +Y axis in world space
    pub fn up(&self) -> Vector3<f64> {
        self.rotation * Vector3::y()
    }

    /// Local +Z axis in world space
    pub fn forward(&self) -> Vector3<f64> {
        self.rotation * Vector3::z()
    }

    /// Local +X axis in world space
    pub fn right(&self) -> Vector3<f64> {
        self.rotation * Vector3::x()
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Hand side for articulated-hand subjects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Handedness {
    Left,
    #[default]
    Right,
}

impl Handedness {
    /// Prefix used by the capture source for this side's names
    pub fn prefix(&self) -> &'static str {
        match self {
            Handedness::Left => "L",
            Handedness::Right => "R",
        }
    }
}
