use crate::core::MarkerSample;
use nalgebra::Vector3;
use std::collections::{HashMap, VecDeque};

/// Bounded per-marker history of recent samples.
///
/// Only valid (non-zero) samples enter through [`MarkerHistory::record`].
/// The gap filler may also push zero placeholders to keep markers of one
/// group aligned frame-for-frame; [`MarkerHistory::latest`] skips those.
#[derive(Debug, Clone)]
pub struct MarkerHistory {
    /// Maximum entries kept per marker
    capacity: usize,
    queues: HashMap<String, VecDeque<MarkerSample>>,
}

impl MarkerHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queues: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a valid sample, evicting the oldest entry when full.
    /// Zero samples are ignored; returns whether the sample was kept.
    pub fn record(&mut self, marker: &str, sample: MarkerSample) -> bool {
        if sample.is_missing() {
            return false;
        }
        self.push(marker, sample);
        true
    }

    /// Most recent valid sample for `marker`
    pub fn latest(&self, marker: &str) -> Option<MarkerSample> {
        self.queues
            .get(marker)?
            .iter()
            .rev()
            .find(|sample| !sample.is_missing())
            .copied()
    }

    /// Entry `offset_from_end` places back from the newest (0 = newest),
    /// placeholders included
    pub fn at(&self, marker: &str, offset_from_end: usize) -> Option<MarkerSample> {
        let queue = self.queues.get(marker)?;
        let len = queue.len();
        if offset_from_end >= len {
            return None;
        }
        queue.get(len - 1 - offset_from_end).copied()
    }

    /// Number of entries held for `marker`
    pub fn len(&self, marker: &str) -> usize {
        self.queues.get(marker).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.queues.values().all(VecDeque::is_empty)
    }

    pub fn clear(&mut self) {
        self.queues.clear();
    }

    /// Push a zero entry so this marker stays index-aligned with its group
    pub(crate) fn push_placeholder(&mut self, marker: &str) {
        self.push(marker, MarkerSample::missing());
    }

    /// Overwrite the newest entry (used when a placeholder gets salvaged)
    pub(crate) fn replace_latest(&mut self, marker: &str, sample: MarkerSample) {
        if let Some(last) = self.queues.get_mut(marker).and_then(|q| q.back_mut()) {
            *last = sample;
        }
    }

    /// Remove and return the newest entry
    pub(crate) fn pop_latest(&mut self, marker: &str) -> Option<MarkerSample> {
        self.queues.get_mut(marker)?.pop_back()
    }

    fn push(&mut self, marker: &str, sample: MarkerSample) {
        let capacity = self.capacity;
        let queue = self
            .queues
            .entry(marker.to_string())
            .or_insert_with(|| VecDeque::with_capacity(capacity));
        if queue.len() == capacity {
            queue.pop_front();
        }
        queue.push_back(sample);
    }
}

impl Default for MarkerHistory {
    fn default() -> Self {
        Self::new(crate::core::DEFAULT_PREVIOUS_DATA_LIMIT)
    }
}

/// One-slot "last known non-zero position" per segment, used by the
/// relative reconstructor.
#[derive(Debug, Clone, Default)]
pub struct SegmentHistory {
    last_known: HashMap<String, Vector3<f64>>,
}

impl SegmentHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a segment position; zero positions leave the slot untouched
    pub fn remember(&mut self, segment: &str, position: Vector3<f64>) {
        if position == Vector3::zeros() {
            return;
        }
        self.last_known.insert(segment.to_string(), position);
    }

    pub fn previous(&self, segment: &str) -> Option<Vector3<f64>> {
        self.last_known.get(segment).copied()
    }

    pub fn clear(&mut self) {
        self.last_known.clear();
    }
}
