//! Core types and constants for the marker reconstruction pipeline

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;
