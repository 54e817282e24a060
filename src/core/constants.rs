//! Pipeline defaults

/// Capture units (millimetres) to output units (metres)
pub const DEFAULT_UNIT_SCALE: f64 = 0.001;

/// Number of valid samples kept per marker for gap filling
pub const DEFAULT_PREVIOUS_DATA_LIMIT: usize = 3;

/// Zero-position segments tolerated before a subject is hidden
pub const DEFAULT_DATA_QUALITY_THRESHOLD: usize = 5;

/// Expected sample rate of the capture source (Hz)
pub const DEFAULT_EXPECTED_RATE_HZ: f64 = 90.0;

/// Cutoff used when smoothing the derivative inside the adaptive filter (Hz)
pub const DEFAULT_DERIVATIVE_CUTOFF_HZ: f64 = 1.0;

/// Below this length a vector is treated as zero by the geometry guards
pub const GEOMETRY_EPSILON: f64 = 1e-12;
