//! Reconstruction geometry

pub mod basis;
pub mod relative;

pub use basis::look_rotation;
pub use relative::{RelativePositionReconstructor, SegmentChain};
