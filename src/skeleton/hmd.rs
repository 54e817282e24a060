//! Head-worn device tracked by a rigid marker cluster

use crate::algorithms::basis::{is_degenerate, look_rotation, try_normalize};
use crate::core::{Pose, SegmentGroup};
use crate::processing::aggregator::SegmentFrame;
use crate::processing::filter::{AdaptiveLowPassFilter, FilterConfig};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Segment names of the standard headset cluster
pub const HEADSET_SEGMENTS: [&str; 5] = ["base1", "base2", "base3", "base4", "base5"];

/// Headset profile settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadsetConfig {
    /// Segment the device position is taken from; also the forward tail
    pub origin: String,
    /// Forward axis head
    pub forward_to: String,
    /// Right axis tail and head
    pub right_from: String,
    pub right_to: String,
    /// Offset from the origin marker to the device centre (capture units,
    /// x along right, y along up, z along forward)
    pub position_offset: [f64; 3],
    /// Rotation post-multiplied onto the marker basis, `[x, y, z, w]`
    pub rotation_offset: [f64; 4],
    pub position_filter: Option<FilterConfig>,
    pub rotation_filter: Option<FilterConfig>,
}

impl Default for HeadsetConfig {
    fn default() -> Self {
        Self {
            origin: "base1".to_string(),
            forward_to: "base2".to_string(),
            right_from: "base4".to_string(),
            right_to: "base3".to_string(),
            position_offset: [0.0; 3],
            rotation_offset: [0.0, 0.0, 0.0, 1.0],
            position_filter: None,
            rotation_filter: None,
        }
    }
}

impl HeadsetConfig {
    /// Filter parameters used for headset tracking when a filter is enabled
    /// without explicit settings
    pub fn default_filter() -> FilterConfig {
        FilterConfig {
            min_cutoff: 0.1,
            beta: 50.0,
            ..FilterConfig::default()
        }
    }

    /// One single-marker group per cluster marker
    pub fn standard_groups() -> Vec<SegmentGroup> {
        HEADSET_SEGMENTS
            .iter()
            .map(|name| SegmentGroup::new(*name, [*name]))
            .collect()
    }

    pub fn required_segments(&self) -> Vec<String> {
        vec![
            self.origin.clone(),
            self.forward_to.clone(),
            self.right_from.clone(),
            self.right_to.clone(),
        ]
    }

    fn rotation_offset(&self) -> UnitQuaternion<f64> {
        let [x, y, z, w] = self.rotation_offset;
        let q = Quaternion::new(w, x, y, z);
        if q.norm() > 0.0 {
            UnitQuaternion::from_quaternion(q)
        } else {
            UnitQuaternion::identity()
        }
    }
}

/// Runtime state of the headset profile
#[derive(Debug, Clone)]
pub struct HeadsetProfile {
    config: HeadsetConfig,
    rotation_offset: UnitQuaternion<f64>,
    position_filter: Option<AdaptiveLowPassFilter<Vector3<f64>>>,
    rotation_filter: Option<AdaptiveLowPassFilter<UnitQuaternion<f64>>>,
}

impl HeadsetProfile {
    pub fn new(config: HeadsetConfig) -> Self {
        Self {
            rotation_offset: config.rotation_offset(),
            position_filter: config.position_filter.map(AdaptiveLowPassFilter::from_config),
            rotation_filter: config.rotation_filter.map(AdaptiveLowPassFilter::from_config),
            config,
        }
    }

    pub fn config(&self) -> &HeadsetConfig {
        &self.config
    }

    /// Derive the device pose from the cluster. Every segment takes the
    /// device rotation and the origin segment moves to the device centre.
    /// Returns the device pose in output units, or `None` when the cluster
    /// basis is degenerate this frame.
    pub fn process_segments(&mut self, segments: &mut SegmentFrame, unit_scale: f64) -> Option<Pose> {
        let origin = segments.position(&self.config.origin)?;
        let forward = segments.position(&self.config.forward_to)? - origin;
        let right = segments.position(&self.config.right_to)? - segments.position(&self.config.right_from)?;
        let up = forward.cross(&right);
        if is_degenerate(&forward) || is_degenerate(&up) {
            return None;
        }

        let mut rotation = look_rotation(&forward, &up)?;
        let mut centre = origin;
        let timestamp = segments.timestamp;
        if let Some(filter) = self.position_filter.as_mut() {
            centre = filter.filter(centre, timestamp);
        }
        if let Some(filter) = self.rotation_filter.as_mut() {
            rotation = filter.filter(rotation, timestamp);
        }
        rotation *= self.rotation_offset;

        let [dx, dy, dz] = self.config.position_offset;
        let along = |axis: &Vector3<f64>, distance: f64| {
            try_normalize(axis).map_or_else(Vector3::zeros, |unit| unit * distance)
        };
        centre += along(&forward, dz) + along(&up, dy) + along(&right, dx);

        for segment in segments.iter_mut() {
            segment.rotation = rotation;
        }
        if let Some(segment) = segments.get_mut(&self.config.origin) {
            segment.position = centre;
        }

        Some(Pose::new(centre * unit_scale, rotation))
    }

    pub fn reset(&mut self) {
        if let Some(filter) = self.position_filter.as_mut() {
            filter.reset();
        }
        if let Some(filter) = self.rotation_filter.as_mut() {
            filter.reset();
        }
    }
}
