//! Skeleton driving: sink seam, visibility, subject profiles

pub mod sink;
pub mod driver;
pub mod profile;
pub mod hand;
pub mod hmd;
pub mod pattern;

pub use sink::{BoneTree, SkeletonSink, SubjectEvent};
pub use driver::{SkeletonDriver, Visibility};
pub use profile::{DerivedBasis, ProfileConfig, SubjectProfile};
pub use hand::{HandConfig, HandLayout};
pub use hmd::HeadsetConfig;
pub use pattern::{PatternConfig, PatternOrientation, SegmentPair, UpSource};
