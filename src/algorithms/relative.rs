//! Closed-form reconstruction of a segment from its chain neighbours

use crate::algorithms::basis::{guarded_cross, is_degenerate, try_normalize};
use crate::core::ChainLink;
use crate::processing::aggregator::SegmentFrame;
use crate::processing::history::SegmentHistory;
use nalgebra::Vector3;
use std::collections::HashMap;
use tracing::debug;

/// Parent/child lookup built from the chain table, taken as configured
/// (no symmetry is inferred).
#[derive(Debug, Clone, Default)]
pub struct SegmentChain {
    parents: HashMap<String, String>,
    children: HashMap<String, String>,
}

impl SegmentChain {
    pub fn from_links(links: &[ChainLink]) -> Self {
        let mut chain = Self::default();
        for link in links {
            if let Some(parent) = &link.parent {
                chain.parents.insert(link.segment.clone(), parent.clone());
            }
            if let Some(child) = &link.child {
                chain.children.insert(link.segment.clone(), child.clone());
            }
        }
        chain
    }

    pub fn parent(&self, segment: &str) -> Option<&str> {
        self.parents.get(segment).map(String::as_str)
    }

    pub fn child(&self, segment: &str) -> Option<&str> {
        self.children.get(segment).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty() && self.children.is_empty()
    }
}

/// Rebuilds an unresolved segment from the current positions of its chain
/// parent and child and its own last known position, assuming the local
/// triangle stayed rigid since that position was seen.
#[derive(Debug, Clone, Default)]
pub struct RelativePositionReconstructor {
    chain: SegmentChain,
}

impl RelativePositionReconstructor {
    pub fn new(chain: SegmentChain) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &SegmentChain {
        &self.chain
    }

    /// Reconstruct `segment`, or `None` when a precondition fails or the
    /// geometry is degenerate
    pub fn reconstruct(&self, segment: &str, current: &SegmentFrame, history: &SegmentHistory) -> Option<Vector3<f64>> {
        let segment_prev = history.previous(segment)?;

        let child = self.chain.child(segment)?;
        let child_curr = current.known_position(child)?;
        history.previous(child)?;

        let parent = self.chain.parent(segment)?;
        let parent_curr = current.known_position(parent)?;
        history.previous(parent)?;

        let result = triangulate(&segment_prev, &parent_curr, &child_curr);
        if result.is_none() {
            debug!(segment, parent, child, "degenerate triangle, segment left unresolved");
        }
        result
    }

    /// Fill every zero-position segment that can be reconstructed. Returns
    /// the names that were filled.
    pub fn fill_frame(&self, frame: &mut SegmentFrame, history: &SegmentHistory) -> Vec<String> {
        let mut filled = Vec::new();
        for name in frame.names() {
            let is_zero = frame.get(&name).map_or(false, |s| s.is_zero());
            if !is_zero {
                continue;
            }
            if let Some(position) = self.reconstruct(&name, frame, history) {
                if let Some(segment) = frame.get_mut(&name) {
                    segment.position = position;
                    segment.resolved = true;
                }
                debug!(segment = %name, "reconstructed from chain neighbours");
                filled.push(name);
            }
        }
        filled
    }
}

/// Place a point relative to the current parent→child edge so that it
/// keeps its previous distance to the parent, splitting the edge by the
/// previous parent/child distance ratio and offsetting within the previous
/// triangle's plane.
pub fn triangulate(
    segment_prev: &Vector3<f64>,
    parent_curr: &Vector3<f64>,
    child_curr: &Vector3<f64>,
) -> Option<Vector3<f64>> {
    let to_child = child_curr - segment_prev;
    let to_parent = parent_curr - segment_prev;
    let d_child = to_child.norm();
    let d_parent = to_parent.norm();
    if is_degenerate(&to_child) || is_degenerate(&to_parent) {
        return None;
    }

    let normal = guarded_cross(&to_child, &to_parent)?;

    let parent_to_child = child_curr - parent_curr;
    if is_degenerate(&parent_to_child) {
        return None;
    }
    let projection = parent_to_child * d_parent / (d_parent + d_child);
    let offset = (d_parent * d_parent - projection.norm_squared()).max(0.0).sqrt();
    let direction = try_normalize(&parent_to_child.cross(&normal))?;

    let position = parent_curr + projection + direction * offset;
    if position.iter().all(|c| c.is_finite()) {
        Some(position)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Segment;
    use nalgebra::UnitQuaternion;

    fn segment(name: &str, position: Vector3<f64>) -> Segment {
        Segment {
            name: name.to_string(),
            position,
            rotation: UnitQuaternion::identity(),
            resolved: position != Vector3::zeros(),
        }
    }

    fn chain() -> SegmentChain {
        SegmentChain::from_links(&[ChainLink {
            segment: "R2D2".to_string(),
            parent: Some("R2D1".to_string()),
            child: Some("R2D3".to_string()),
        }])
    }

    #[test]
    fn test_static_triangle_is_exact() {
        // Equal legs: the split point is the perpendicular foot
        let parent = Vector3::new(10.0, 40.0, -5.0);
        let child = Vector3::new(50.0, 40.0, -5.0);
        let truth = Vector3::new(30.0, 55.0, -5.0);

        let position = triangulate(&truth, &parent, &child).unwrap();
        assert!((position - truth).norm() < 1e-9, "got {:?}", position);
    }

    #[test]
    fn test_static_triangle_out_of_plane() {
        let parent = Vector3::new(0.0, 0.0, 0.0);
        let child = Vector3::new(0.0, 6.0, 8.0);
        let truth = Vector3::new(7.0, 3.0, 4.0);

        let position = triangulate(&truth, &parent, &child).unwrap();
        assert!((position - truth).norm() < 1e-9, "got {:?}", position);
    }

    #[test]
    fn test_keeps_parent_distance_when_edge_moves() {
        let segment_prev = Vector3::new(1.0, 1.0, 0.0);
        let parent = Vector3::new(0.0, 0.0, 0.0);
        let child = Vector3::new(2.5, 0.5, 0.0);

        let position = triangulate(&segment_prev, &parent, &child).unwrap();
        let d_parent = (parent - segment_prev).norm();
        assert!(((position - parent).norm() - d_parent).abs() < 1e-9);
    }

    #[test]
    fn test_collinear_history_is_unresolved() {
        let parent = Vector3::new(0.0, 0.0, 0.0);
        let child = Vector3::new(2.0, 0.0, 0.0);
        let segment_prev = Vector3::new(1.0, 0.0, 0.0);

        assert!(triangulate(&segment_prev, &parent, &child).is_none());
        assert!(triangulate(&parent, &parent, &child).is_none());
        assert!(triangulate(&segment_prev, &parent, &parent).is_none());
    }

    #[test]
    fn test_reconstruct_requires_history() {
        let reconstructor = RelativePositionReconstructor::new(chain());
        let mut frame = SegmentFrame::new(0.0);
        frame.insert(segment("R2D1", Vector3::new(10.0, 0.0, 0.0)));
        frame.insert(segment("R2D2", Vector3::zeros()));
        frame.insert(segment("R2D3", Vector3::new(30.0, 0.0, 0.0)));

        let mut history = SegmentHistory::new();
        assert!(reconstructor.reconstruct("R2D2", &frame, &history).is_none());

        history.remember("R2D1", Vector3::new(10.0, 0.0, 0.0));
        history.remember("R2D2", Vector3::new(20.0, 10.0, 0.0));
        assert!(reconstructor.reconstruct("R2D2", &frame, &history).is_none());

        history.remember("R2D3", Vector3::new(30.0, 0.0, 0.0));
        let position = reconstructor.reconstruct("R2D2", &frame, &history).unwrap();
        assert!((position - Vector3::new(20.0, 10.0, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn test_fill_frame_marks_resolved() {
        let reconstructor = RelativePositionReconstructor::new(chain());
        let mut frame = SegmentFrame::new(0.0);
        frame.insert(segment("R2D1", Vector3::new(10.0, 0.0, 0.0)));
        frame.insert(segment("R2D2", Vector3::zeros()));
        frame.insert(segment("R2D3", Vector3::new(30.0, 0.0, 0.0)));

        let mut history = SegmentHistory::new();
        for (name, p) in [("R2D1", [10.0, 0.0, 0.0]), ("R2D2", [20.0, 10.0, 0.0]), ("R2D3", [30.0, 0.0, 0.0])] {
            history.remember(name, Vector3::from(p));
        }

        let filled = reconstructor.fill_frame(&mut frame, &history);
        assert_eq!(filled, vec!["R2D2".to_string()]);
        assert!(frame.get("R2D2").unwrap().resolved);
    }
}
