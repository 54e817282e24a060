//! Articulated hand: standard marker layout, palm basis, finger bone poses

use crate::algorithms::basis::{guarded_cross, is_degenerate, look_rotation, try_normalize};
use crate::core::{ChainLink, Frame, Handedness, Pose, Segment, SegmentGroup};
use crate::processing::aggregator::{to_output_axes, SegmentFrame};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

pub const ARM: &str = "Arm";
pub const HAND: &str = "Hand";
/// Derived segment carrying the palm normal
pub const PALM_BASE: &str = "PalmBase";

pub const FINGER_COUNT: usize = 5;
pub const JOINTS_PER_FINGER: usize = 4;

/// Hand profile settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandConfig {
    pub handedness: Handedness,
    /// Marker-to-skin offset along each bone's forward axis (output units)
    pub skin_offset: f64,
    /// Per-finger adjustment of `skin_offset` in percent, thumb first
    pub finger_offset_percent: [f64; FINGER_COUNT],
    /// How far the palm base bone sits behind and below its parent (output units)
    pub palm_base_offset: f64,
}

impl Default for HandConfig {
    fn default() -> Self {
        Self {
            handedness: Handedness::Right,
            skin_offset: 0.001,
            finger_offset_percent: [-10.0, 0.0, 8.0, 13.0, 20.0],
            palm_base_offset: 0.02,
        }
    }
}

impl HandConfig {
    pub fn for_hand(handedness: Handedness) -> Self {
        Self {
            handedness,
            ..Self::default()
        }
    }

    /// Skin offset for `finger` (1 = thumb); `None` is a non-finger bone
    pub fn offset_for(&self, finger: Option<usize>) -> f64 {
        match finger {
            Some(f) if (1..=FINGER_COUNT).contains(&f) => {
                self.skin_offset * (1.0 + self.finger_offset_percent[f - 1] / 100.0)
            }
            _ => self.skin_offset,
        }
    }
}

/// Marker names per finger joint, before the side prefix. The thumb's
/// third joint carries two markers.
const FINGER_MARKERS: [[&[&str]; JOINTS_PER_FINGER]; FINGER_COUNT] = [
    [&["TH1"], &["TH2"], &["TH3", "TH3P"], &["TH4"]],
    [&["H2"], &["IF1"], &["IF2"], &["IF3"]],
    [&["H3"], &["TF1"], &["TF2"], &["TF3"]],
    [&["H4"], &["RF2"], &["RF3"], &["RF4"]],
    [&["H5"], &["PF1"], &["PF2"], &["PF3"]],
];

const ARM_MARKERS: [&str; 2] = ["FA2", "FA1"];
const HAND_MARKERS: [&str; 2] = ["WRB", "WRA"];

/// Segment groups, chain table and bone hierarchy of a standard hand
#[derive(Debug, Clone, PartialEq)]
pub struct HandLayout {
    pub handedness: Handedness,
    pub groups: Vec<SegmentGroup>,
    pub chain: Vec<ChainLink>,
}

impl HandLayout {
    pub fn standard(handedness: Handedness) -> Self {
        let prefix = handedness.prefix();
        let marker = |name: &str| format!("{}{}", prefix, name);

        let mut groups = vec![
            SegmentGroup::new(ARM, ARM_MARKERS.iter().copied().map(marker)),
            SegmentGroup::new(HAND, HAND_MARKERS.iter().copied().map(marker)),
        ];
        for (finger, joints) in FINGER_MARKERS.iter().enumerate() {
            for (joint, markers) in joints.iter().enumerate() {
                groups.push(SegmentGroup::new(
                    finger_segment(handedness, finger + 1, joint + 1),
                    markers.iter().copied().map(marker),
                ));
            }
        }

        // Only the middle finger base hangs off the hand in the chain
        let middle_base = finger_segment(handedness, 3, 1);
        let mut chain = vec![
            ChainLink {
                segment: ARM.to_string(),
                parent: None,
                child: Some(HAND.to_string()),
            },
            ChainLink {
                segment: HAND.to_string(),
                parent: Some(ARM.to_string()),
                child: Some(middle_base.clone()),
            },
        ];
        for finger in 1..=FINGER_COUNT {
            for joint in 1..=JOINTS_PER_FINGER {
                let segment = finger_segment(handedness, finger, joint);
                let parent = if joint > 1 {
                    Some(finger_segment(handedness, finger, joint - 1))
                } else if segment == middle_base {
                    Some(HAND.to_string())
                } else {
                    None
                };
                let child = (joint < JOINTS_PER_FINGER).then(|| finger_segment(handedness, finger, joint + 1));
                chain.push(ChainLink { segment, parent, child });
            }
        }

        Self {
            handedness,
            groups,
            chain,
        }
    }

    /// Skeleton hierarchy rows `(bone, parent)`, parents first. Every finger
    /// base and the palm base hang off the hand bone.
    pub fn bones(&self) -> Vec<(String, Option<String>)> {
        let mut bones = vec![
            (ARM.to_string(), None),
            (HAND.to_string(), Some(ARM.to_string())),
            (PALM_BASE.to_string(), Some(HAND.to_string())),
        ];
        for finger in 1..=FINGER_COUNT {
            for joint in 1..=JOINTS_PER_FINGER {
                let parent = if joint == 1 {
                    HAND.to_string()
                } else {
                    finger_segment(self.handedness, finger, joint - 1)
                };
                bones.push((finger_segment(self.handedness, finger, joint), Some(parent)));
            }
        }
        bones
    }

    pub fn segment_names(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.name.clone()).collect()
    }
}

/// `R3D1` style segment name
pub fn finger_segment(handedness: Handedness, finger: usize, joint: usize) -> String {
    format!("{}{}D{}", handedness.prefix(), finger, joint)
}

/// Finger number (1 = thumb) encoded in a finger segment name
pub fn finger_of(handedness: Handedness, segment: &str) -> Option<usize> {
    let rest = segment.strip_prefix(handedness.prefix())?;
    let mut chars = rest.chars();
    let finger = chars.next()?.to_digit(10)? as usize;
    if chars.next()? != 'D' {
        return None;
    }
    chars.next()?.to_digit(10)?;
    if chars.next().is_some() || !(1..=FINGER_COUNT).contains(&finger) {
        return None;
    }
    Some(finger)
}

fn joint_of(segment: &str) -> Option<usize> {
    segment.chars().last()?.to_digit(10).map(|d| d as usize)
}

/// Per-frame palm basis in capture units
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HandBasis {
    /// Hand minus middle finger base
    pub palm: Vector3<f64>,
    /// Palm normal, sign-corrected for the hand side
    pub normal: Vector3<f64>,
    /// `look_rotation(-normal, -palm)` when both are usable
    pub root_rotation: Option<UnitQuaternion<f64>>,
}

impl HandBasis {
    /// False when the palm vector collapsed (hand not tracked)
    pub fn has_hand(&self) -> bool {
        self.palm != Vector3::zeros()
    }
}

/// Runtime state of the articulated hand profile
#[derive(Debug, Clone)]
pub struct HandProfile {
    config: HandConfig,
    /// Last usable `child(nD1) - nD1` per finger
    base_vectors: [Option<Vector3<f64>>; FINGER_COUNT],
    /// Thumb lateral axis from the two third-joint markers
    thumb_right: Option<Vector3<f64>>,
    basis: HandBasis,
}

impl HandProfile {
    pub fn new(config: HandConfig) -> Self {
        Self {
            config,
            base_vectors: [None; FINGER_COUNT],
            thumb_right: None,
            basis: HandBasis::default(),
        }
    }

    pub fn config(&self) -> &HandConfig {
        &self.config
    }

    pub fn handedness(&self) -> Handedness {
        self.config.handedness
    }

    pub fn basis(&self) -> &HandBasis {
        &self.basis
    }

    pub fn base_vector(&self, finger: usize) -> Option<Vector3<f64>> {
        finger
            .checked_sub(1)
            .and_then(|i| self.base_vectors.get(i).copied().flatten())
    }

    pub fn thumb_right(&self) -> Option<Vector3<f64>> {
        self.thumb_right
    }

    fn segment(&self, finger: usize, joint: usize) -> String {
        finger_segment(self.config.handedness, finger, joint)
    }

    /// Segments the hand basis cannot do without
    pub fn required_segments(&self) -> Vec<String> {
        let mut required = vec![HAND.to_string(), ARM.to_string()];
        for finger in 1..=FINGER_COUNT {
            required.push(self.segment(finger, 1));
            required.push(self.segment(finger, 2));
        }
        required
    }

    /// Derive the palm basis, finger base vectors and thumb axis, add the
    /// palm base segment and orient the arm.
    pub fn process_segments(&mut self, segments: &mut SegmentFrame, raw: &Frame) -> HandBasis {
        let position = |name: &str| segments.position(name).unwrap_or_else(Vector3::zeros);
        let middle_base = position(&self.segment(3, 1));
        let ring_base = position(&self.segment(4, 1));

        let palm = position(HAND) - middle_base;
        let raw_normal = palm.cross(&(ring_base - middle_base));
        let normal = match self.config.handedness {
            Handedness::Right => raw_normal,
            Handedness::Left => -raw_normal,
        };

        for finger in 1..=FINGER_COUNT {
            let base = segments.known_position(&self.segment(finger, 1));
            let child = segments.known_position(&self.segment(finger, 2));
            if let (Some(base), Some(child)) = (base, child) {
                self.base_vectors[finger - 1] = Some(child - base);
            }
        }

        self.update_thumb_right(raw, &raw_normal);

        segments.insert(Segment {
            name: PALM_BASE.to_string(),
            position: normal,
            rotation: UnitQuaternion::identity(),
            resolved: normal != Vector3::zeros(),
        });

        let root_rotation = look_rotation(&-normal, &-palm);
        if let (Some(rotation), Some(arm)) = (root_rotation, segments.get_mut(ARM)) {
            arm.rotation = rotation;
        }

        self.basis = HandBasis {
            palm,
            normal,
            root_rotation,
        };
        self.basis
    }

    /// The third thumb joint carries a main and a secondary marker; the
    /// vector between them is the thumb's lateral axis. Markers can swap
    /// when tracking is poor, so the axis is flipped to point along the
    /// uncorrected palm normal. Kept from the last frame both were seen.
    fn update_thumb_right(&mut self, raw: &Frame, raw_normal: &Vector3<f64>) {
        let prefix = self.config.handedness.prefix();
        let secondary = raw.get(&format!("{}TH3P", prefix));
        let main = raw.get(&format!("{}TH3", prefix));
        let (Some(secondary), Some(main)) = (secondary, main) else {
            return;
        };
        if secondary.is_missing() || main.is_missing() {
            return;
        }

        let mut axis = to_output_axes(&main.position) - to_output_axes(&secondary.position);
        if is_degenerate(&axis) {
            return;
        }
        if axis.dot(raw_normal) < 0.0 {
            axis = -axis;
        }
        self.thumb_right = Some(axis);
    }

    /// Palm orientation sanity check: the little and index fingers must
    /// spread the same way at the base and the third joint. Passes when any
    /// of the four segments is absent.
    pub fn test_quality(&self, segments: &SegmentFrame) -> bool {
        let lookup = |finger, joint| segments.position(&self.segment(finger, joint));
        match (lookup(5, 3), lookup(2, 3), lookup(5, 1), lookup(2, 1)) {
            (Some(little_3), Some(index_3), Some(little_1), Some(index_1)) => {
                (little_3 - index_3).dot(&(little_1 - index_1)) > 0.0
            }
            _ => true,
        }
    }

    /// Pose for one hand bone. `previous` is the pose applied last time,
    /// `parent` the pose applied to the parent bone this traversal.
    pub fn bone_pose(
        &self,
        bone: &str,
        segment: &Segment,
        segments: &SegmentFrame,
        parent: Option<&Pose>,
        previous: Option<&Pose>,
        unit_scale: f64,
    ) -> Option<Pose> {
        if bone == PALM_BASE {
            return self.palm_base_pose(segment, parent, previous);
        }

        let finger = finger_of(self.config.handedness, bone);
        let rotation = match finger {
            Some(finger) => self
                .finger_rotation(bone, finger, segment, segments)
                .or_else(|| previous.map(|p| p.rotation))
                .unwrap_or(segment.rotation),
            None => self
                .basis
                .root_rotation
                .or_else(|| previous.map(|p| p.rotation))
                .unwrap_or(segment.rotation),
        };

        let mut pose = Pose::new(segment.position * unit_scale, rotation);
        let forward = pose.forward();
        pose.position += forward * self.config.offset_for(finger);
        Some(pose)
    }

    /// Finger bones point up their own segment towards the next joint;
    /// `right` comes from the thumb axis or the palm normal crossed with the
    /// finger's base vector.
    fn finger_rotation(
        &self,
        bone: &str,
        finger: usize,
        segment: &Segment,
        segments: &SegmentFrame,
    ) -> Option<UnitQuaternion<f64>> {
        let joint = joint_of(bone)?;
        if joint >= JOINTS_PER_FINGER {
            return None;
        }
        let child = segments.known_position(&self.segment(finger, joint + 1))?;
        let base = self.base_vector(finger)?;

        let up = child - segment.position;
        if is_degenerate(&up) {
            return None;
        }
        let right = if finger == 1 {
            self.thumb_right?
        } else {
            self.basis.normal.cross(&base)
        };
        let forward = guarded_cross(&up, &right)?;
        look_rotation(&forward, &up)
    }

    fn palm_base_pose(&self, segment: &Segment, parent: Option<&Pose>, previous: Option<&Pose>) -> Option<Pose> {
        let parent = parent?;
        let derived = if self.basis.has_hand() && !segment.is_zero() {
            try_normalize(&segment.position).and_then(|normal| look_rotation(&-normal, &-self.basis.palm))
        } else {
            None
        };
        let rotation = derived
            .or_else(|| previous.map(|p| p.rotation))
            .unwrap_or(parent.rotation);

        let offset = self.config.palm_base_offset;
        let mut pose = Pose::new(parent.position, rotation);
        let behind = pose.forward() * offset + pose.up() * offset;
        pose.position -= behind;
        Some(pose)
    }

    pub fn reset(&mut self) {
        self.base_vectors = [None; FINGER_COUNT];
        self.thumb_right = None;
        self.basis = HandBasis::default();
    }
}
