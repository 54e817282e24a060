//! Error taxonomy and configuration validation results

pub mod error;

pub use error::{PipelineError, PipelineResult, ValidationResult};
