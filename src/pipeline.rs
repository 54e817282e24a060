//! Per-subject frame pipeline

use crate::algorithms::relative::{RelativePositionReconstructor, SegmentChain};
use crate::core::{Frame, GapFillingStrategy, Handedness, Pose};
use crate::processing::aggregator::{SegmentAggregator, SegmentFrame};
use crate::processing::gap_fill::GapFiller;
use crate::processing::history::SegmentHistory;
use crate::skeleton::driver::{SkeletonDriver, Visibility};
use crate::skeleton::profile::{DerivedBasis, SubjectProfile};
use crate::skeleton::sink::SkeletonSink;
use crate::utils::config::PipelineConfig;
use crate::validation::{PipelineError, PipelineResult};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Everything computed for the last processed frame
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub timestamp: f64,
    /// Segments after gap filling, reconstruction and profile derivation
    pub segments: SegmentFrame,
    pub derived: DerivedBasis,
    /// Segments rebuilt from their chain neighbours this frame
    pub reconstructed: Vec<String>,
    pub visibility: Visibility,
    /// Bones the sink received a pose for
    pub bones_posed: usize,
}

/// Result of one capture tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A new frame went through the pipeline
    Processed,
    /// No frame this tick; the previous pose stands
    Skipped,
}

/// Gap filling, aggregation, reconstruction and skeleton driving for one
/// subject. Owns all per-subject history; independent of other subjects.
#[derive(Debug)]
pub struct SubjectPipeline {
    config: PipelineConfig,
    gap_filler: GapFiller,
    aggregator: SegmentAggregator,
    reconstructor: RelativePositionReconstructor,
    segment_history: SegmentHistory,
    profile: SubjectProfile,
    driver: SkeletonDriver,
    last_output: Option<FrameOutput>,
}

impl SubjectPipeline {
    /// Validate `config` and build the pipeline. Any configuration error is
    /// returned here; per-frame processing never fails.
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        let warnings = config.validate().into_result()?;
        for warning in &warnings {
            warn!(subject = %config.subject_name, "{}", warning);
        }

        let driver = SkeletonDriver::new(
            config.subject_name.clone(),
            config.strategy,
            config.unit_scale,
            config.root_segment.clone(),
            config.initial_visibility,
        )
        .with_smoothing(config.smoothing);

        Ok(Self {
            gap_filler: GapFiller::new(config.strategy, config.previous_data_limit),
            aggregator: SegmentAggregator::new(config.data_quality_threshold),
            reconstructor: RelativePositionReconstructor::new(SegmentChain::from_links(&config.chain)),
            segment_history: SegmentHistory::new(),
            profile: SubjectProfile::from_config(&config.profile),
            driver,
            last_output: None,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.subject_name
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn profile(&self) -> &SubjectProfile {
        &self.profile
    }

    /// Side of an articulated-hand subject
    pub fn handedness(&self) -> Option<Handedness> {
        match &self.profile {
            SubjectProfile::ArticulatedHand(hand) => Some(hand.handedness()),
            _ => None,
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.driver.visibility()
    }

    pub fn gap_filler(&self) -> &GapFiller {
        &self.gap_filler
    }

    pub fn segment_history(&self) -> &SegmentHistory {
        &self.segment_history
    }

    pub fn last_output(&self) -> Option<&FrameOutput> {
        self.last_output.as_ref()
    }

    pub fn applied_pose(&self, bone: &str) -> Option<&Pose> {
        self.driver.applied_pose(bone)
    }

    /// Fail fast when `frame` lacks a marker some group expects
    pub fn check_frame_coverage(&self, frame: &Frame) -> PipelineResult<()> {
        for group in &self.config.segments {
            if let Some(marker) = group.markers.iter().find(|m| !frame.contains(m)) {
                return Err(PipelineError::MarkerNeverObserved {
                    marker: marker.clone(),
                    segment: group.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Run one capture tick. Without a frame nothing is recomputed and the
    /// skeleton keeps its previous pose.
    pub fn tick(&mut self, frame: Option<&Frame>, sink: &mut dyn SkeletonSink) -> TickOutcome {
        match frame {
            Some(frame) => {
                self.process(frame, sink);
                TickOutcome::Processed
            }
            None => {
                debug!(subject = %self.config.subject_name, "no frame this tick");
                TickOutcome::Skipped
            }
        }
    }

    /// Push `frame` through the whole pipeline and drive `sink`
    pub fn process(&mut self, frame: &Frame, sink: &mut dyn SkeletonSink) -> &FrameOutput {
        let groups = self.gap_filler.fill(frame, &self.config.segments);
        let mut segments = self.aggregator.aggregate(&groups, frame.timestamp);

        // The gate counts zeros before any reconstruction
        let zero_segments = segments.zero_segments;
        let quality_exceeded = segments.quality_exceeded;

        let reconstructed = if self.config.strategy == GapFillingStrategy::FillRelative {
            self.reconstructor.fill_frame(&mut segments, &self.segment_history)
        } else {
            Vec::new()
        };

        let derived = self.profile.process_segments(&mut segments, frame, self.config.unit_scale);

        if quality_exceeded {
            self.driver.hide(zero_segments, sink);
        } else if self.config.drive_skeleton {
            if self.profile.test_quality(&segments) {
                self.driver.show(zero_segments, sink);
            } else {
                self.driver.hide(zero_segments, sink);
            }
        }

        let bones_posed = if self.config.drive_skeleton && !self.driver.is_hidden() {
            self.driver.apply(&segments, &self.profile, sink)
        } else {
            0
        };

        for segment in segments.iter() {
            self.segment_history.remember(&segment.name, segment.position);
        }

        self.last_output.insert(FrameOutput {
            timestamp: frame.timestamp,
            segments,
            derived,
            reconstructed,
            visibility: self.driver.visibility(),
            bones_posed,
        })
    }

    /// Snapshot of the last processed frame for external logging
    pub fn pose_snapshot(&self) -> Option<PoseSnapshot> {
        let output = self.last_output.as_ref()?;
        let input = output
            .segments
            .iter()
            .map(|segment| (segment.name.clone(), vector_array(&segment.position)))
            .collect();
        let bones = self
            .driver
            .applied_poses()
            .map(|(name, pose)| (name.to_string(), BoneSnapshot::from_pose(pose)))
            .collect();

        Some(PoseSnapshot {
            subject: self.config.subject_name.clone(),
            timestamp: output.timestamp,
            visibility: output.visibility,
            input,
            bones,
            device: output.derived.device_pose.as_ref().map(BoneSnapshot::from_pose),
        })
    }

    /// Forget all history and applied poses
    pub fn reset(&mut self) {
        self.gap_filler.reset();
        self.segment_history.clear();
        self.profile.reset();
        self.driver.reset();
        self.last_output = None;
    }
}

fn vector_array(v: &Vector3<f64>) -> [f64; 3] {
    [v.x, v.y, v.z]
}

/// Final pose of one bone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneSnapshot {
    pub position: [f64; 3],
    pub up: [f64; 3],
    pub forward: [f64; 3],
}

impl BoneSnapshot {
    pub fn from_pose(pose: &Pose) -> Self {
        Self {
            position: vector_array(&pose.position),
            up: vector_array(&pose.up()),
            forward: vector_array(&pose.forward()),
        }
    }
}

/// Per-frame record of segment inputs and applied bone poses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseSnapshot {
    pub subject: String,
    pub timestamp: f64,
    pub visibility: Visibility,
    /// Segment positions in capture units, output axes
    pub input: BTreeMap<String, [f64; 3]>,
    /// Last applied pose per bone, output units
    pub bones: BTreeMap<String, BoneSnapshot>,
    pub device: Option<BoneSnapshot>,
}

impl PoseSnapshot {
    pub fn to_json(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChainLink, MarkerSample, SegmentGroup};
    use crate::skeleton::hand::HandLayout;
    use crate::skeleton::sink::{BoneTree, SubjectEvent};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingSink {
        tree: BoneTree,
        hidden: usize,
        shown: usize,
    }

    impl SkeletonSink for RecordingSink {
        fn traverse(&mut self, root: &str, resolve: &mut dyn FnMut(&str, Option<&str>) -> Option<Pose>) {
            self.tree.traverse(root, resolve);
        }

        fn on_hiding(&mut self, _event: &SubjectEvent) {
            self.hidden += 1;
        }

        fn on_showing(&mut self, _event: &SubjectEvent) {
            self.shown += 1;
        }
    }

    fn single_group_config(strategy: GapFillingStrategy, markers: usize) -> PipelineConfig {
        PipelineConfig {
            subject_name: "wand".to_string(),
            strategy,
            root_segment: "body".to_string(),
            segments: vec![SegmentGroup::new("body", (1..=markers).map(|i| format!("m{}", i)))],
            ..PipelineConfig::default()
        }
    }

    fn five_marker_frame(timestamp: f64, missing: Option<usize>) -> Frame {
        let mut frame = Frame::new(timestamp);
        for i in 1..=5 {
            let sample = if Some(i) == missing {
                MarkerSample::missing()
            } else {
                MarkerSample::new(100.0 * i as f64, 50.0 + timestamp * 1000.0, 20.0 * i as f64)
            };
            frame.insert(format!("m{}", i), sample);
        }
        frame
    }

    #[test]
    fn test_ignore_freezes_bone_through_gap() {
        let mut pipeline = SubjectPipeline::new(single_group_config(GapFillingStrategy::Ignore, 5)).unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&events);
        let mut tree = BoneTree::from_edges([("body", None)]);
        tree.on_event(Box::new(move |event| seen.lock().unwrap().push(event)));

        let mut resolved = Vec::new();
        let mut positions = Vec::new();
        for (t, missing) in [(0.0, None), (0.011, Some(3)), (0.022, None)] {
            let output = pipeline.process(&five_marker_frame(t, missing), &mut tree);
            resolved.push(output.segments.get("body").unwrap().resolved);
            positions.push(tree.pose("body").unwrap().position);
        }

        assert_eq!(resolved, vec![true, false, true]);
        assert_eq!(positions[1], positions[0]);
        assert!((positions[2] - positions[0]).norm() > 1e-6);
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(pipeline.visibility(), Visibility::Visible);
    }

    #[test]
    fn test_quality_gate_fires_once_per_edge() {
        let names: Vec<String> = (0..10).map(|i| format!("s{}", i)).collect();
        let config = PipelineConfig {
            subject_name: "cloud".to_string(),
            root_segment: "s0".to_string(),
            segments: names.iter().map(|n| SegmentGroup::new(n.clone(), [n.clone()])).collect(),
            data_quality_threshold: 5,
            ..PipelineConfig::default()
        };
        let mut pipeline = SubjectPipeline::new(config).unwrap();
        let mut sink = RecordingSink::default();

        let frame_with_zeros = |zeros: usize, t: f64| {
            let mut frame = Frame::new(t);
            for (i, name) in names.iter().enumerate() {
                let sample = if i < zeros {
                    MarkerSample::missing()
                } else {
                    MarkerSample::new(10.0 + i as f64, 20.0, 30.0)
                };
                frame.insert(name.clone(), sample);
            }
            frame
        };

        pipeline.process(&frame_with_zeros(6, 0.0), &mut sink);
        pipeline.process(&frame_with_zeros(6, 0.011), &mut sink);
        assert_eq!((sink.hidden, sink.shown), (1, 0));
        assert_eq!(pipeline.visibility(), Visibility::Hidden);

        pipeline.process(&frame_with_zeros(4, 0.022), &mut sink);
        pipeline.process(&frame_with_zeros(4, 0.033), &mut sink);
        assert_eq!((sink.hidden, sink.shown), (1, 1));
        assert_eq!(pipeline.visibility(), Visibility::Visible);
    }

    #[test]
    fn test_hidden_subject_is_not_posed() {
        let mut config = single_group_config(GapFillingStrategy::UseRemote, 1);
        config.data_quality_threshold = 0;
        let mut pipeline = SubjectPipeline::new(config).unwrap();
        let mut sink = RecordingSink {
            tree: BoneTree::from_edges([("body", None)]),
            ..RecordingSink::default()
        };

        let frame = Frame::new(0.0).with_marker("m1", MarkerSample::missing());
        let output = pipeline.process(&frame, &mut sink);
        assert_eq!(output.bones_posed, 0);
        assert!(sink.tree.pose("body").is_none());
        assert_eq!(sink.hidden, 1);
    }

    #[test]
    fn test_axis_remap_and_scale() {
        let mut pipeline = SubjectPipeline::new(single_group_config(GapFillingStrategy::UseRemote, 1)).unwrap();
        let mut tree = BoneTree::from_edges([("body", None)]);

        let frame = Frame::new(0.0).with_marker("m1", MarkerSample::new(1000.0, 2000.0, 3000.0));
        pipeline.process(&frame, &mut tree);

        let position = tree.pose("body").unwrap().position;
        assert!((position - Vector3::new(1.0, 3.0, 2.0)).norm() < 1e-12);
    }

    #[test]
    fn test_use_previous_substitutes_last_sample() {
        let mut pipeline = SubjectPipeline::new(single_group_config(GapFillingStrategy::UsePrevious, 1)).unwrap();
        let mut tree = BoneTree::from_edges([("body", None)]);

        pipeline.process(&Frame::new(0.0).with_marker("m1", MarkerSample::new(10.0, 20.0, 30.0)), &mut tree);
        let output = pipeline.process(&Frame::new(0.011).with_marker("m1", MarkerSample::missing()), &mut tree);

        assert_eq!(output.segments.position("body"), Some(Vector3::new(10.0, 30.0, 20.0)));
    }

    #[test]
    fn test_fill_relative_rebuilds_from_chain() {
        let config = PipelineConfig {
            subject_name: "finger".to_string(),
            strategy: GapFillingStrategy::FillRelative,
            root_segment: "base".to_string(),
            segments: vec![
                SegmentGroup::new("base", ["b"]),
                SegmentGroup::new("mid", ["m"]),
                SegmentGroup::new("tip", ["t"]),
            ],
            chain: vec![
                ChainLink {
                    segment: "mid".to_string(),
                    parent: Some("base".to_string()),
                    child: Some("tip".to_string()),
                },
            ],
            ..PipelineConfig::default()
        };
        let mut pipeline = SubjectPipeline::new(config).unwrap();
        let mut tree = BoneTree::from_edges([("base", None), ("mid", Some("base")), ("tip", Some("mid"))]);

        let mid = MarkerSample::new(30.0, 40.0, 15.0);
        let first = Frame::new(0.0)
            .with_marker("b", MarkerSample::new(10.0, 40.0, 0.0))
            .with_marker("m", mid)
            .with_marker("t", MarkerSample::new(50.0, 40.0, 0.0));
        pipeline.process(&first, &mut tree);

        let second = Frame::new(0.011)
            .with_marker("b", MarkerSample::new(10.0, 40.0, 0.0))
            .with_marker("m", MarkerSample::missing())
            .with_marker("t", MarkerSample::new(50.0, 40.0, 0.0));
        let output = pipeline.process(&second, &mut tree);

        assert_eq!(output.reconstructed, vec!["mid".to_string()]);
        let segment = output.segments.get("mid").unwrap();
        assert!(segment.resolved);
        let expected = Vector3::new(30.0, 15.0, 40.0);
        assert!((segment.position - expected).norm() < 1e-9);
    }

    #[test]
    fn test_skipped_tick_keeps_state() {
        let mut pipeline = SubjectPipeline::new(single_group_config(GapFillingStrategy::UseRemote, 1)).unwrap();
        let mut tree = BoneTree::from_edges([("body", None)]);

        let frame = Frame::new(0.5).with_marker("m1", MarkerSample::new(1.0, 2.0, 3.0));
        assert_eq!(pipeline.tick(Some(&frame), &mut tree), TickOutcome::Processed);
        let before = *tree.pose("body").unwrap();

        assert_eq!(pipeline.tick(None, &mut tree), TickOutcome::Skipped);
        assert_eq!(tree.pose("body"), Some(&before));
        assert_eq!(pipeline.last_output().unwrap().timestamp, 0.5);
        assert_eq!(pipeline.gap_filler().history().len("m1"), 1);
    }

    #[test]
    fn test_invalid_config_fails_construction() {
        let mut config = single_group_config(GapFillingStrategy::UseRemote, 1);
        config.root_segment = "nowhere".to_string();
        let err = SubjectPipeline::new(config).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, PipelineError::UnknownSegment { .. }));
    }

    #[test]
    fn test_frame_coverage() {
        let pipeline = SubjectPipeline::new(single_group_config(GapFillingStrategy::UseRemote, 2)).unwrap();
        let partial = Frame::new(0.0).with_marker("m1", MarkerSample::new(1.0, 1.0, 1.0));
        assert_eq!(
            pipeline.check_frame_coverage(&partial),
            Err(PipelineError::MarkerNeverObserved {
                marker: "m2".to_string(),
                segment: "body".to_string(),
            })
        );

        let full = partial.with_marker("m2", MarkerSample::missing());
        assert!(pipeline.check_frame_coverage(&full).is_ok());
    }

    /// Source frame for a flat right hand; output (x, y, z) is sent as (x, z, y)
    fn flat_hand_frame(timestamp: f64) -> Frame {
        let layout = HandLayout::standard(Handedness::Right);
        let mut frame = Frame::new(timestamp);
        for group in &layout.groups {
            let output = match group.name.as_str() {
                "Arm" => Vector3::new(0.0, 0.0, -100.0),
                "Hand" => Vector3::new(0.0, 0.0, -10.0),
                name => {
                    let finger = name[1..2].parse::<f64>().unwrap();
                    let joint = name[3..4].parse::<f64>().unwrap();
                    Vector3::new(-45.0 + 15.0 * finger, 0.0, 80.0 + 20.0 * joint)
                }
            };
            for (i, marker) in group.markers.iter().enumerate() {
                let lift = if i == 1 && marker.ends_with("TH3P") { 5.0 } else { 0.0 };
                frame.insert(marker.clone(), MarkerSample::new(output.x, output.z, output.y + lift));
            }
        }
        frame
    }

    #[test]
    fn test_hand_subject_end_to_end() {
        let config = PipelineConfig::for_hand("right_hand", Handedness::Right);
        let layout = HandLayout::standard(Handedness::Right);
        let mut pipeline = SubjectPipeline::new(config).unwrap();
        let mut tree = BoneTree::from_edges(
            layout
                .bones()
                .iter()
                .map(|(bone, parent)| (bone.as_str(), parent.as_deref()))
                .collect::<Vec<_>>(),
        );

        let frame = flat_hand_frame(0.0);
        assert!(pipeline.check_frame_coverage(&frame).is_ok());
        let output = pipeline.process(&frame, &mut tree);

        assert_eq!(output.bones_posed, 23);
        assert_eq!(output.visibility, Visibility::Visible);
        assert!(output.derived.normal.is_some());
        assert!(tree.pose("PalmBase").is_some());
        assert_eq!(pipeline.handedness(), Some(Handedness::Right));

        let snapshot = pipeline.pose_snapshot().unwrap();
        assert_eq!(snapshot.bones.len(), 23);
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"subject\":\"right_hand\""));
        assert!(json.contains("R2D2"));
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut pipeline = SubjectPipeline::new(single_group_config(GapFillingStrategy::UsePrevious, 1)).unwrap();
        let mut tree = BoneTree::from_edges([("body", None)]);
        pipeline.process(&Frame::new(0.0).with_marker("m1", MarkerSample::new(1.0, 2.0, 3.0)), &mut tree);

        pipeline.reset();
        assert!(pipeline.last_output().is_none());
        assert!(pipeline.segment_history().previous("body").is_none());
        assert!(pipeline.pose_snapshot().is_none());
    }
}
