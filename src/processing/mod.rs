//! Per-frame marker processing: history, gap filling, aggregation, smoothing

pub mod history;
pub mod gap_fill;
pub mod aggregator;
pub mod filter;

pub use history::{MarkerHistory, SegmentHistory};
pub use gap_fill::{GapFiller, ResolvedGroup};
pub use aggregator::{SegmentAggregator, SegmentFrame};
pub use filter::{AdaptiveLowPassFilter, FilterConfig, PoseFilter};
