//! Subject kinds: per-frame basis derivation and quality test

use crate::core::{Frame, Pose, Segment};
use crate::processing::aggregator::SegmentFrame;
use crate::skeleton::hand::{HandConfig, HandProfile, PALM_BASE};
use crate::skeleton::hmd::{HeadsetConfig, HeadsetProfile};
use crate::skeleton::pattern::PatternConfig;
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Subject kind selected in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfileConfig {
    GenericPattern(PatternConfig),
    ArticulatedHand(HandConfig),
    HeadWornDevice(HeadsetConfig),
}

impl Default for ProfileConfig {
    fn default() -> Self {
        ProfileConfig::GenericPattern(PatternConfig::default())
    }
}

/// Vectors derived by the profile for the current frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedBasis {
    /// Orientation of the subject root, when the profile derives one
    pub root_rotation: Option<UnitQuaternion<f64>>,
    /// Hand palm vector (capture units)
    pub palm: Option<Vector3<f64>>,
    /// Hand palm normal (capture units)
    pub normal: Option<Vector3<f64>>,
    /// Head-worn device pose (output units) for an external device
    pub device_pose: Option<Pose>,
}

/// Runtime profile of one subject
#[derive(Debug, Clone)]
pub enum SubjectProfile {
    GenericPattern(PatternConfig),
    ArticulatedHand(HandProfile),
    HeadWornDevice(HeadsetProfile),
}

impl SubjectProfile {
    pub fn from_config(config: &ProfileConfig) -> Self {
        match config {
            ProfileConfig::GenericPattern(pattern) => SubjectProfile::GenericPattern(pattern.clone()),
            ProfileConfig::ArticulatedHand(hand) => SubjectProfile::ArticulatedHand(HandProfile::new(hand.clone())),
            ProfileConfig::HeadWornDevice(headset) => {
                SubjectProfile::HeadWornDevice(HeadsetProfile::new(headset.clone()))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SubjectProfile::GenericPattern(_) => "generic pattern",
            SubjectProfile::ArticulatedHand(_) => "articulated hand",
            SubjectProfile::HeadWornDevice(_) => "head-worn device",
        }
    }

    /// Segments this profile reads; must exist among the marker groups
    pub fn required_segments(&self) -> Vec<String> {
        match self {
            SubjectProfile::GenericPattern(pattern) => pattern.required_segments(),
            SubjectProfile::ArticulatedHand(hand) => hand.required_segments(),
            SubjectProfile::HeadWornDevice(headset) => headset.config().required_segments(),
        }
    }

    /// Segments the profile adds on its own
    pub fn derived_segments(&self) -> &'static [&'static str] {
        match self {
            SubjectProfile::ArticulatedHand(_) => &[PALM_BASE],
            _ => &[],
        }
    }

    /// Derive the subject basis from the aggregated segments, updating
    /// segment rotations (and derived segments) in place
    pub fn process_segments(&mut self, segments: &mut SegmentFrame, raw: &Frame, unit_scale: f64) -> DerivedBasis {
        match self {
            SubjectProfile::GenericPattern(pattern) => DerivedBasis {
                root_rotation: pattern.process_segments(segments),
                ..DerivedBasis::default()
            },
            SubjectProfile::ArticulatedHand(hand) => {
                let basis = hand.process_segments(segments, raw);
                DerivedBasis {
                    root_rotation: basis.root_rotation,
                    palm: Some(basis.palm),
                    normal: Some(basis.normal),
                    device_pose: None,
                }
            }
            SubjectProfile::HeadWornDevice(headset) => {
                let device_pose = headset.process_segments(segments, unit_scale);
                DerivedBasis {
                    root_rotation: device_pose.map(|pose| pose.rotation),
                    device_pose,
                    ..DerivedBasis::default()
                }
            }
        }
    }

    /// Whether the segments look plausible enough to show the subject
    pub fn test_quality(&self, segments: &SegmentFrame) -> bool {
        match self {
            SubjectProfile::ArticulatedHand(hand) => hand.test_quality(segments),
            _ => true,
        }
    }

    /// Pose for one bone backed by `segment`
    pub fn bone_pose(
        &self,
        bone: &str,
        segment: &Segment,
        segments: &SegmentFrame,
        parent: Option<&Pose>,
        previous: Option<&Pose>,
        unit_scale: f64,
    ) -> Option<Pose> {
        match self {
            SubjectProfile::ArticulatedHand(hand) => {
                hand.bone_pose(bone, segment, segments, parent, previous, unit_scale)
            }
            _ => Some(Pose::new(segment.position * unit_scale, segment.rotation)),
        }
    }

    pub fn reset(&mut self) {
        match self {
            SubjectProfile::GenericPattern(_) => {}
            SubjectProfile::ArticulatedHand(hand) => hand.reset(),
            SubjectProfile::HeadWornDevice(headset) => headset.reset(),
        }
    }
}
