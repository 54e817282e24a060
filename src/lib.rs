//! Motion Capture Reconstruction Pipeline
//!
//! Turns per-frame marker samples from an optical motion-capture source
//! into segment poses for a skeleton: gap filling over per-marker history,
//! centroid aggregation with a data-quality gate, closed-form relative
//! reconstruction along a kinematic chain, subject-specific orientation
//! (marker patterns, articulated hands, head-worn devices) and adaptive
//! low-pass smoothing.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod skeleton;
pub mod validation;
pub mod utils;
pub mod pipeline;
pub mod registry;

// Re-export commonly used types
pub use crate::core::{
    ChainLink, Frame, GapFillingStrategy, Handedness, MarkerSample, Pose, Segment, SegmentGroup,
    DEFAULT_UNIT_SCALE,
};
pub use algorithms::relative::{RelativePositionReconstructor, SegmentChain};
pub use processing::{
    AdaptiveLowPassFilter, FilterConfig, GapFiller, MarkerHistory, PoseFilter, SegmentAggregator, SegmentFrame,
};
pub use skeleton::{
    BoneTree, HandConfig, HandLayout, HeadsetConfig, PatternConfig, ProfileConfig, SkeletonDriver, SkeletonSink,
    SubjectEvent, Visibility,
};
pub use validation::{PipelineError, PipelineResult, ValidationResult};
pub use utils::PipelineConfig;
pub use pipeline::{FrameOutput, PoseSnapshot, SubjectPipeline, TickOutcome};
pub use registry::SubjectRegistry;
