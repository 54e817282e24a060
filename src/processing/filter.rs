use crate::core::{DEFAULT_DERIVATIVE_CUTOFF_HZ, DEFAULT_EXPECTED_RATE_HZ};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A sample type the adaptive filter can smooth.
///
/// `Rate` is the per-second rate of change between two samples. Rotations
/// use a scalar angular speed and blend along the shortest arc.
pub trait Smoothable: Copy {
    type Rate: Copy;

    fn zero_rate() -> Self::Rate;
    /// Rate of change from `previous` to `current` at `frequency` Hz
    fn rate(previous: &Self, current: &Self, frequency: f64) -> Self::Rate;
    fn blend_rate(previous: &Self::Rate, current: &Self::Rate, alpha: f64) -> Self::Rate;
    fn rate_magnitude(rate: &Self::Rate) -> f64;
    /// Move `alpha` of the way from `previous` towards `current`
    fn blend(previous: &Self, current: &Self, alpha: f64) -> Self;
}

impl Smoothable for f64 {
    type Rate = f64;

    fn zero_rate() -> f64 {
        0.0
    }

    fn rate(previous: &f64, current: &f64, frequency: f64) -> f64 {
        (current - previous) * frequency
    }

    fn blend_rate(previous: &f64, current: &f64, alpha: f64) -> f64 {
        previous + alpha * (current - previous)
    }

    fn rate_magnitude(rate: &f64) -> f64 {
        rate.abs()
    }

    fn blend(previous: &f64, current: &f64, alpha: f64) -> f64 {
        previous + alpha * (current - previous)
    }
}

impl Smoothable for Vector3<f64> {
    type Rate = Vector3<f64>;

    fn zero_rate() -> Vector3<f64> {
        Vector3::zeros()
    }

    fn rate(previous: &Self, current: &Self, frequency: f64) -> Vector3<f64> {
        (current - previous) * frequency
    }

    fn blend_rate(previous: &Vector3<f64>, current: &Vector3<f64>, alpha: f64) -> Vector3<f64> {
        previous.lerp(current, alpha)
    }

    fn rate_magnitude(rate: &Vector3<f64>) -> f64 {
        rate.norm()
    }

    fn blend(previous: &Self, current: &Self, alpha: f64) -> Self {
        previous.lerp(current, alpha)
    }
}

impl Smoothable for UnitQuaternion<f64> {
    type Rate = f64;

    fn zero_rate() -> f64 {
        0.0
    }

    fn rate(previous: &Self, current: &Self, frequency: f64) -> f64 {
        previous.angle_to(current) * frequency
    }

    fn blend_rate(previous: &f64, current: &f64, alpha: f64) -> f64 {
        previous + alpha * (current - previous)
    }

    fn rate_magnitude(rate: &f64) -> f64 {
        rate.abs()
    }

    fn blend(previous: &Self, current: &Self, alpha: f64) -> Self {
        // try_slerp flips to the shortest arc; it only declines when the two
        // rotations are numerically identical. Small-angle slerps drift off
        // unit norm, so the result is renormalized.
        let blended = previous.try_slerp(current, alpha, 1.0e-9).unwrap_or(*current);
        UnitQuaternion::new_normalize(blended.into_inner())
    }
}

/// Filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Expected sample rate (Hz), used until two timestamps are seen
    pub frequency_hz: f64,
    /// Minimum cutoff frequency (Hz); lower is smoother at rest
    pub min_cutoff: f64,
    /// Speed coefficient; higher lags less during fast motion
    pub beta: f64,
    /// Cutoff for the derivative estimate (Hz)
    pub derivative_cutoff: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_EXPECTED_RATE_HZ,
            min_cutoff: 1.0,
            beta: 0.0,
            derivative_cutoff: DEFAULT_DERIVATIVE_CUTOFF_HZ,
        }
    }
}

/// Adaptive (one-euro style) low-pass filter over irregular timestamps.
///
/// Smooth at rest, responsive when the signal moves fast. The first sample
/// after construction or [`reset`](Self::reset) passes through unchanged.
#[derive(Debug, Clone)]
pub struct AdaptiveLowPassFilter<T: Smoothable> {
    config: FilterConfig,
    /// Current sample-rate estimate (Hz)
    frequency: f64,
    last_raw: Option<T>,
    last_filtered: Option<T>,
    last_rate: Option<T::Rate>,
    last_timestamp: Option<f64>,
}

/// alpha = 1 / (1 + tau/Te), tau = 1/(2*pi*fc)
fn smoothing_factor(frequency: f64, cutoff: f64) -> f64 {
    let r = 2.0 * PI * cutoff / frequency;
    r / (r + 1.0)
}

impl<T: Smoothable> AdaptiveLowPassFilter<T> {
    pub fn new(frequency_hz: f64, min_cutoff: f64, beta: f64) -> Self {
        Self::from_config(FilterConfig {
            frequency_hz,
            min_cutoff,
            beta,
            ..FilterConfig::default()
        })
    }

    pub fn from_config(config: FilterConfig) -> Self {
        Self {
            config,
            frequency: config.frequency_hz,
            last_raw: None,
            last_filtered: None,
            last_rate: None,
            last_timestamp: None,
        }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Smooth `sample` taken at `timestamp` (seconds)
    pub fn filter(&mut self, sample: T, timestamp: f64) -> T {
        let (Some(last_raw), Some(last_filtered)) = (self.last_raw, self.last_filtered) else {
            self.last_raw = Some(sample);
            self.last_filtered = Some(sample);
            self.last_rate = Some(T::zero_rate());
            self.last_timestamp = Some(timestamp);
            return sample;
        };

        // Non-increasing timestamps keep the previous rate estimate
        if let Some(last_timestamp) = self.last_timestamp {
            let dt = timestamp - last_timestamp;
            if dt > 0.0 && dt.is_finite() {
                self.frequency = 1.0 / dt;
            }
        }
        self.last_timestamp = Some(timestamp);

        let rate = T::rate(&last_raw, &sample, self.frequency);
        let previous_rate = self.last_rate.unwrap_or_else(T::zero_rate);
        let smoothed_rate = T::blend_rate(
            &previous_rate,
            &rate,
            smoothing_factor(self.frequency, self.config.derivative_cutoff),
        );

        let cutoff = self.config.min_cutoff + self.config.beta * T::rate_magnitude(&smoothed_rate);
        let filtered = T::blend(&last_filtered, &sample, smoothing_factor(self.frequency, cutoff));

        self.last_raw = Some(sample);
        self.last_filtered = Some(filtered);
        self.last_rate = Some(smoothed_rate);
        filtered
    }

    /// Forget all state; the next sample passes through
    pub fn reset(&mut self) {
        self.frequency = self.config.frequency_hz;
        self.last_raw = None;
        self.last_filtered = None;
        self.last_rate = None;
        self.last_timestamp = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.last_filtered.is_some()
    }
}

/// Position and rotation filters for one pose stream
#[derive(Debug, Clone)]
pub struct PoseFilter {
    pub position: AdaptiveLowPassFilter<Vector3<f64>>,
    pub rotation: AdaptiveLowPassFilter<UnitQuaternion<f64>>,
}

impl PoseFilter {
    pub fn from_config(config: FilterConfig) -> Self {
        Self {
            position: AdaptiveLowPassFilter::from_config(config),
            rotation: AdaptiveLowPassFilter::from_config(config),
        }
    }

    pub fn reset(&mut self) {
        self.position.reset();
        self.rotation.reset();
    }
}
