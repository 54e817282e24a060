//! Reduction of resolved marker samples into one segment per group

use crate::core::{Segment, DEFAULT_DATA_QUALITY_THRESHOLD};
use crate::processing::gap_fill::ResolvedGroup;
use nalgebra::{UnitQuaternion, Vector3};
use std::collections::HashMap;

/// Swap source (x, y, z) into output (x, z, y). The capture source and the
/// output space disagree on which axis is vertical.
pub fn to_output_axes(source: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(source.x, source.z, source.y)
}

/// Segments computed for one frame, in group order, plus any derived
/// segments a subject profile adds.
#[derive(Debug, Clone, Default)]
pub struct SegmentFrame {
    /// Capture timestamp in seconds
    pub timestamp: f64,
    segments: Vec<Segment>,
    index: HashMap<String, usize>,
    /// Segments whose position is exactly zero after aggregation
    pub zero_segments: usize,
    /// Zero count exceeded the data-quality threshold
    pub quality_exceeded: bool,
}

impl SegmentFrame {
    pub fn new(timestamp: f64) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }

    /// Add or replace a segment by name
    pub fn insert(&mut self, segment: Segment) {
        if let Some(&slot) = self.index.get(&segment.name) {
            self.segments[slot] = segment;
            return;
        }
        self.index.insert(segment.name.clone(), self.segments.len());
        self.segments.push(segment);
    }

    pub fn get(&self, name: &str) -> Option<&Segment> {
        self.index.get(name).map(|&slot| &self.segments[slot])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Segment> {
        self.index.get(name).map(|&slot| &mut self.segments[slot])
    }

    /// Position of `name`, if the segment exists (zero included)
    pub fn position(&self, name: &str) -> Option<Vector3<f64>> {
        self.get(name).map(|segment| segment.position)
    }

    /// Position of `name` when it exists and is non-zero
    pub fn known_position(&self, name: &str) -> Option<Vector3<f64>> {
        self.position(name).filter(|p| *p != Vector3::zeros())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Segment> {
        self.segments.iter_mut()
    }

    pub fn names(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Averages each group's markers into a segment and applies the zero-count
/// data-quality gate.
#[derive(Debug, Clone)]
pub struct SegmentAggregator {
    data_quality_threshold: usize,
}

impl SegmentAggregator {
    pub fn new(data_quality_threshold: usize) -> Self {
        Self { data_quality_threshold }
    }

    pub fn data_quality_threshold(&self) -> usize {
        self.data_quality_threshold
    }

    pub fn aggregate(&self, groups: &[ResolvedGroup], timestamp: f64) -> SegmentFrame {
        let mut frame = SegmentFrame::new(timestamp);
        for group in groups {
            frame.insert(Self::reduce(group));
        }
        frame.zero_segments = frame.iter().filter(|s| s.is_zero()).count();
        frame.quality_exceeded = frame.zero_segments > self.data_quality_threshold;
        frame
    }

    fn reduce(group: &ResolvedGroup) -> Segment {
        if !group.data_valid || group.samples.is_empty() {
            return Segment::unresolved(group.segment.clone());
        }

        let sum = group
            .samples
            .iter()
            .fold(Vector3::zeros(), |acc, sample| acc + to_output_axes(&sample.position));
        let position = sum / group.samples.len() as f64;
        let rotation = group
            .samples
            .iter()
            .find_map(|sample| sample.rotation)
            .unwrap_or_else(UnitQuaternion::identity);

        Segment {
            name: group.segment.clone(),
            position,
            rotation,
            resolved: position != Vector3::zeros(),
        }
    }
}

impl Default for SegmentAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_QUALITY_THRESHOLD)
    }
}
