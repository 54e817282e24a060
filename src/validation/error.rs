use thiserror::Error;

/// Errors raised while building or registering a subject pipeline.
///
/// Per-frame conditions (missing markers, unresolvable segments, degenerate
/// geometry) are carried as data on the frame output and never surface here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// A configuration value is out of range
    #[error("invalid {parameter} = {value}: {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
    /// A chain, root or profile entry names a segment with no marker group
    #[error("{context} references unknown segment '{segment}'")]
    UnknownSegment { segment: String, context: String },
    /// A segment group lists no markers
    #[error("segment group '{segment}' has no markers")]
    EmptySegmentGroup { segment: String },
    /// Two groups share a segment name
    #[error("segment '{segment}' is defined more than once")]
    DuplicateSegment { segment: String },
    /// The subject profile needs a segment the groups do not provide
    #[error("{profile} profile requires segment '{segment}'")]
    MissingProfileSegment { profile: String, segment: String },
    /// A frame does not carry a marker some group expects
    #[error("marker '{marker}' of segment '{segment}' is absent from the frame")]
    MarkerNeverObserved { marker: String, segment: String },
    /// The registry already holds an entry for this key
    #[error("registry conflict for {key}: already held by '{holder}'")]
    RegistryConflict { key: String, holder: String },
    /// No pipeline is registered under this name
    #[error("no subject named '{subject}'")]
    UnknownSubject { subject: String },
    /// Configuration file could not be read or written
    #[error("config I/O error: {message}")]
    Io { message: String },
    /// Configuration could not be (de)serialized
    #[error("config serialization error: {message}")]
    Serialization { message: String },
}

/// Result type for pipeline construction and configuration
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Whether the host should abort startup on this error
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PipelineError::RegistryConflict { .. } | PipelineError::UnknownSubject { .. }
        )
    }

    pub(crate) fn invalid(parameter: &str, value: impl ToString, reason: &str) -> Self {
        PipelineError::InvalidParameter {
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(error: std::io::Error) -> Self {
        PipelineError::Io {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(error: serde_json::Error) -> Self {
        PipelineError::Serialization {
            message: error.to_string(),
        }
    }
}

/// Outcome of a configuration validation pass
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Whether configuration is valid
    pub is_valid: bool,
    /// Validation errors
    pub errors: Vec<PipelineError>,
    /// Validation warnings
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub(crate) fn from_parts(errors: Vec<PipelineError>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// First error, if any, for fail-fast callers
    pub fn into_result(self) -> PipelineResult<Vec<String>> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(self.warnings),
        }
    }
}
