//! Per-marker gap filling for one frame

use crate::core::{Frame, GapFillingStrategy, MarkerSample, SegmentGroup};
use crate::processing::history::MarkerHistory;
use tracing::debug;

/// Resolved samples for one segment group
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedGroup {
    /// Segment this group feeds
    pub segment: String,
    /// Samples in group order, after substitution
    pub samples: Vec<MarkerSample>,
    /// False when the group must be reported unresolved this frame
    pub data_valid: bool,
    /// Markers whose raw sample was the zero sentinel
    pub missing_markers: usize,
    /// True when missing markers were recovered from a valid peer
    pub salvaged: bool,
}

/// Applies the configured [`GapFillingStrategy`] marker by marker and owns
/// the marker history that strategy draws on.
#[derive(Debug, Clone)]
pub struct GapFiller {
    strategy: GapFillingStrategy,
    history: MarkerHistory,
}

impl GapFiller {
    pub fn new(strategy: GapFillingStrategy, previous_data_limit: usize) -> Self {
        Self {
            strategy,
            history: MarkerHistory::new(previous_data_limit),
        }
    }

    pub fn strategy(&self) -> GapFillingStrategy {
        self.strategy
    }

    pub fn history(&self) -> &MarkerHistory {
        &self.history
    }

    /// Resolve every group against `frame`, in group order
    pub fn fill(&mut self, frame: &Frame, groups: &[SegmentGroup]) -> Vec<ResolvedGroup> {
        groups.iter().map(|group| self.fill_group(frame, group)).collect()
    }

    /// Drop all marker history
    pub fn reset(&mut self) {
        self.history.clear();
    }

    fn fill_group(&mut self, frame: &Frame, group: &SegmentGroup) -> ResolvedGroup {
        let mut samples = Vec::with_capacity(group.markers.len());
        let mut data_valid = true;
        let mut missing_markers = 0;
        // Slots holding an aligned placeholder in history (FillRelative only)
        let mut invalid_slots = Vec::new();
        let multi_marker = group.markers.len() > 1;

        for (slot, marker) in group.markers.iter().enumerate() {
            let raw = frame.sample_or_missing(marker);
            if !raw.is_missing() {
                self.history.record(marker, raw);
                samples.push(raw);
                continue;
            }

            missing_markers += 1;
            let resolved = match self.strategy {
                GapFillingStrategy::UseRemote | GapFillingStrategy::ReTimed => raw,
                GapFillingStrategy::UsePrevious => self.history.latest(marker).unwrap_or(raw),
                GapFillingStrategy::Ignore => {
                    data_valid = false;
                    raw
                }
                GapFillingStrategy::FillRelative => {
                    data_valid = false;
                    if multi_marker {
                        self.history.push_placeholder(marker);
                        invalid_slots.push(slot);
                    }
                    raw
                }
            };
            samples.push(resolved);
        }

        let mut salvaged = false;
        if !invalid_slots.is_empty() {
            if self.salvage(group, &mut samples, &invalid_slots) {
                data_valid = true;
                salvaged = true;
            } else {
                for &slot in &invalid_slots {
                    self.history.pop_latest(&group.markers[slot]);
                }
                debug!(segment = %group.name, missing = invalid_slots.len(), "gap salvage rolled back");
            }
        }

        ResolvedGroup {
            segment: group.name.clone(),
            samples,
            data_valid,
            missing_markers,
            salvaged,
        }
    }

    /// Project each missing marker's previous sample forward by the
    /// frame-to-frame translation of the first valid marker in the group.
    fn salvage(&mut self, group: &SegmentGroup, samples: &mut [MarkerSample], invalid_slots: &[usize]) -> bool {
        let reference = group
            .markers
            .iter()
            .enumerate()
            .find(|(slot, _)| !invalid_slots.contains(slot))
            .map(|(_, marker)| marker.as_str());
        let Some(reference) = reference else {
            return false;
        };
        if self.history.len(reference) <= 1 {
            return false;
        }
        let (Some(current), Some(previous)) = (self.history.at(reference, 0), self.history.at(reference, 1)) else {
            return false;
        };
        if previous.is_missing() {
            return false;
        }
        let delta = current.position - previous.position;

        let mut estimates = Vec::with_capacity(invalid_slots.len());
        for &slot in invalid_slots {
            match self.history.at(&group.markers[slot], 1) {
                Some(before) if !before.is_missing() => estimates.push((
                    slot,
                    MarkerSample {
                        position: before.position + delta,
                        rotation: before.rotation,
                    },
                )),
                _ => return false,
            }
        }

        for (slot, estimate) in estimates {
            self.history.replace_latest(&group.markers[slot], estimate);
            samples[slot] = estimate;
        }
        debug!(segment = %group.name, reference, recovered = invalid_slots.len(), "salvaged missing markers");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn groups() -> Vec<SegmentGroup> {
        vec![
            SegmentGroup::new("Hand", ["WRA", "WRB"]),
            SegmentGroup::new("Tip", ["IF3"]),
        ]
    }

    fn frame(wra: [f64; 3], wrb: [f64; 3], tip: [f64; 3]) -> Frame {
        Frame::new(0.0)
            .with_marker("WRA", MarkerSample::new(wra[0], wra[1], wra[2]))
            .with_marker("WRB", MarkerSample::new(wrb[0], wrb[1], wrb[2]))
            .with_marker("IF3", MarkerSample::new(tip[0], tip[1], tip[2]))
    }

    #[test]
    fn test_use_remote_passes_zero_through() {
        for strategy in [GapFillingStrategy::UseRemote, GapFillingStrategy::ReTimed] {
            let mut filler = GapFiller::new(strategy, 3);
            let resolved = filler.fill(&frame([1.0, 2.0, 3.0], [0.0; 3], [4.0, 5.0, 6.0]), &groups());
            assert!(resolved[0].data_valid);
            assert!(resolved[0].samples[1].is_missing());
            assert_eq!(resolved[0].missing_markers, 1);
        }
    }

    #[test]
    fn test_use_previous_substitutes_latest() {
        let mut filler = GapFiller::new(GapFillingStrategy::UsePrevious, 3);
        filler.fill(&frame([1.0, 2.0, 3.0], [7.0, 8.0, 9.0], [4.0, 5.0, 6.0]), &groups());
        let resolved = filler.fill(&frame([1.0, 2.0, 3.0], [0.0; 3], [0.0; 3]), &groups());

        assert!(resolved[0].data_valid);
        assert_eq!(resolved[0].samples[1].position, Vector3::new(7.0, 8.0, 9.0));
        assert_eq!(resolved[1].samples[0].position, Vector3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_use_previous_without_history_leaves_zero() {
        let mut filler = GapFiller::new(GapFillingStrategy::UsePrevious, 3);
        let resolved = filler.fill(&frame([1.0, 2.0, 3.0], [0.0; 3], [4.0, 5.0, 6.0]), &groups());
        assert!(resolved[0].samples[1].is_missing());
    }

    #[test]
    fn test_ignore_invalidates_group() {
        let mut filler = GapFiller::new(GapFillingStrategy::Ignore, 3);
        let resolved = filler.fill(&frame([1.0, 2.0, 3.0], [0.0; 3], [4.0, 5.0, 6.0]), &groups());
        assert!(!resolved[0].data_valid);
        assert!(resolved[1].data_valid);
        // Ignore never writes zeros into history
        assert_eq!(filler.history().len("WRB"), 0);
    }

    #[test]
    fn test_fill_relative_salvage_is_exact() {
        let mut filler = GapFiller::new(GapFillingStrategy::FillRelative, 3);
        let a_prev = [10.5, -3.25, 7.0];
        let b_prev = [12.75, 1.5, -4.0];
        let a_curr = [11.125, -2.0, 9.5];

        filler.fill(&frame(a_prev, b_prev, [1.0; 3]), &groups());
        let resolved = filler.fill(&frame(a_curr, [0.0; 3], [1.0; 3]), &groups());

        let expected = Vector3::from(b_prev) + (Vector3::from(a_curr) - Vector3::from(a_prev));
        assert!(resolved[0].data_valid);
        assert!(resolved[0].salvaged);
        assert_eq!(resolved[0].samples[1].position, expected);
        // The estimate replaces the aligned placeholder
        assert_eq!(filler.history().at("WRB", 0).unwrap().position, expected);
    }

    #[test]
    fn test_fill_relative_rolls_back_when_all_missing() {
        let mut filler = GapFiller::new(GapFillingStrategy::FillRelative, 3);
        filler.fill(&frame([1.0, 1.0, 1.0], [2.0, 2.0, 2.0], [1.0; 3]), &groups());
        let resolved = filler.fill(&frame([0.0; 3], [0.0; 3], [1.0; 3]), &groups());

        assert!(!resolved[0].data_valid);
        assert_eq!(filler.history().len("WRA"), 1);
        assert_eq!(filler.history().len("WRB"), 1);
    }

    #[test]
    fn test_fill_relative_rolls_back_without_reference_history() {
        let mut filler = GapFiller::new(GapFillingStrategy::FillRelative, 3);
        let resolved = filler.fill(&frame([1.0, 1.0, 1.0], [0.0; 3], [1.0; 3]), &groups());

        assert!(!resolved[0].data_valid);
        assert!(!resolved[0].salvaged);
        assert_eq!(filler.history().len("WRB"), 0);
    }

    #[test]
    fn test_fill_relative_single_marker_group_stays_invalid() {
        let mut filler = GapFiller::new(GapFillingStrategy::FillRelative, 3);
        filler.fill(&frame([1.0; 3], [2.0; 3], [3.0; 3]), &groups());
        let resolved = filler.fill(&frame([1.0; 3], [2.0; 3], [0.0; 3]), &groups());

        assert!(!resolved[1].data_valid);
        assert_eq!(filler.history().len("IF3"), 1);
    }
}
