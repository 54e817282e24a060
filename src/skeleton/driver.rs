//! Visibility state machine and per-bone pose application

use crate::core::{GapFillingStrategy, Pose};
use crate::processing::aggregator::SegmentFrame;
use crate::processing::filter::{FilterConfig, PoseFilter};
use crate::skeleton::profile::SubjectProfile;
use crate::skeleton::sink::{SkeletonSink, SubjectEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Subject visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Visibility {
    Hidden,
    #[default]
    Visible,
}

/// Applies segment poses to the host skeleton and tracks visibility.
///
/// Hide/show notifications fire on transitions only. Bones whose segment
/// is unresolved keep their last applied pose when the gap strategy
/// freezes unresolved segments.
#[derive(Debug)]
pub struct SkeletonDriver {
    subject: String,
    strategy: GapFillingStrategy,
    /// Capture units to output units
    unit_scale: f64,
    root_segment: String,
    visibility: Visibility,
    /// Last pose handed to the sink per bone
    applied: HashMap<String, Pose>,
    smoothing: Option<FilterConfig>,
    filters: HashMap<String, PoseFilter>,
}

impl SkeletonDriver {
    pub fn new(
        subject: impl Into<String>,
        strategy: GapFillingStrategy,
        unit_scale: f64,
        root_segment: impl Into<String>,
        initial_visibility: Visibility,
    ) -> Self {
        Self {
            subject: subject.into(),
            strategy,
            unit_scale,
            root_segment: root_segment.into(),
            visibility: initial_visibility,
            applied: HashMap::new(),
            smoothing: None,
            filters: HashMap::new(),
        }
    }

    /// Smooth every applied bone with its own filter pair
    pub fn with_smoothing(mut self, config: Option<FilterConfig>) -> Self {
        self.smoothing = config;
        self
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_hidden(&self) -> bool {
        self.visibility == Visibility::Hidden
    }

    pub fn root_segment(&self) -> &str {
        &self.root_segment
    }

    /// Move to `target`, notifying the sink on an actual transition.
    /// Returns true when the state changed.
    pub fn set_visibility(&mut self, target: Visibility, zero_segments: usize, sink: &mut dyn SkeletonSink) -> bool {
        if self.visibility == target {
            return false;
        }
        self.visibility = target;
        info!(
            subject = %self.subject,
            visibility = ?target,
            zero_segments,
            "subject visibility changed"
        );
        match target {
            Visibility::Hidden => sink.on_hiding(&SubjectEvent::Hidden {
                subject: self.subject.clone(),
                zero_segments,
            }),
            Visibility::Visible => sink.on_showing(&SubjectEvent::Shown {
                subject: self.subject.clone(),
                zero_segments,
            }),
        }
        true
    }

    pub fn hide(&mut self, zero_segments: usize, sink: &mut dyn SkeletonSink) -> bool {
        self.set_visibility(Visibility::Hidden, zero_segments, sink)
    }

    pub fn show(&mut self, zero_segments: usize, sink: &mut dyn SkeletonSink) -> bool {
        self.set_visibility(Visibility::Visible, zero_segments, sink)
    }

    /// Walk the sink's skeleton from the root segment and pose every bone
    /// backed by a segment. Returns the number of bones posed.
    pub fn apply(&mut self, segments: &SegmentFrame, profile: &SubjectProfile, sink: &mut dyn SkeletonSink) -> usize {
        let root = self.root_segment.clone();
        let mut posed = 0;
        sink.traverse(&root, &mut |bone, parent| {
            let pose = self.resolve_bone(bone, parent, segments, profile);
            if pose.is_some() {
                posed += 1;
            }
            pose
        });
        posed
    }

    /// Pose for `bone`, or `None` to leave it untouched this frame
    pub fn resolve_bone(
        &mut self,
        bone: &str,
        parent: Option<&str>,
        segments: &SegmentFrame,
        profile: &SubjectProfile,
    ) -> Option<Pose> {
        let segment = segments.get(bone)?;
        if self.strategy.freezes_unresolved() && segment.is_zero() {
            return None;
        }

        let parent_pose = parent.and_then(|name| self.applied.get(name)).copied();
        let previous = self.applied.get(bone).copied();
        let mut pose = profile.bone_pose(
            bone,
            segment,
            segments,
            parent_pose.as_ref(),
            previous.as_ref(),
            self.unit_scale,
        )?;

        if let Some(config) = self.smoothing {
            let filter = self
                .filters
                .entry(bone.to_string())
                .or_insert_with(|| PoseFilter::from_config(config));
            pose.position = filter.position.filter(pose.position, segments.timestamp);
            pose.rotation = filter.rotation.filter(pose.rotation, segments.timestamp);
        }

        self.applied.insert(bone.to_string(), pose);
        Some(pose)
    }

    pub fn applied_pose(&self, bone: &str) -> Option<&Pose> {
        self.applied.get(bone)
    }

    pub fn applied_poses(&self) -> impl Iterator<Item = (&str, &Pose)> {
        self.applied.iter().map(|(name, pose)| (name.as_str(), pose))
    }

    pub fn reset(&mut self) {
        self.applied.clear();
        self.filters.clear();
    }
}
