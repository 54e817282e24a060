use crate::core::{
    ChainLink, GapFillingStrategy, Handedness, SegmentGroup, DEFAULT_DATA_QUALITY_THRESHOLD,
    DEFAULT_PREVIOUS_DATA_LIMIT, DEFAULT_UNIT_SCALE,
};
use crate::processing::filter::FilterConfig;
use crate::skeleton::driver::Visibility;
use crate::skeleton::hand::{HandConfig, HandLayout, ARM};
use crate::skeleton::hmd::HeadsetConfig;
use crate::skeleton::profile::{ProfileConfig, SubjectProfile};
use crate::validation::{PipelineError, PipelineResult, ValidationResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Previous-data depth above which validation warns
const DEEP_HISTORY_WARNING: usize = 64;

/// Configuration of one subject pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Subject name as reported by the capture source
    pub subject_name: String,
    /// Policy for markers reporting the zero sentinel
    pub strategy: GapFillingStrategy,
    /// Capture units to output units (mm to m by default)
    pub unit_scale: f64,
    /// Zero segments tolerated before the subject is hidden
    pub data_quality_threshold: usize,
    /// Samples kept per marker
    pub previous_data_limit: usize,
    /// Whether poses are pushed to the skeleton sink at all
    pub drive_skeleton: bool,
    /// Segment the skeleton walk starts from
    pub root_segment: String,
    /// Visibility before the first quality evaluation
    pub initial_visibility: Visibility,
    /// Segment groups, in output order
    pub segments: Vec<SegmentGroup>,
    /// Kinematic chain rows used by relative reconstruction
    pub chain: Vec<ChainLink>,
    /// Per-bone smoothing, disabled when absent
    pub smoothing: Option<FilterConfig>,
    pub profile: ProfileConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            subject_name: String::new(),
            strategy: GapFillingStrategy::default(),
            unit_scale: DEFAULT_UNIT_SCALE,
            data_quality_threshold: DEFAULT_DATA_QUALITY_THRESHOLD,
            previous_data_limit: DEFAULT_PREVIOUS_DATA_LIMIT,
            drive_skeleton: true,
            root_segment: String::new(),
            initial_visibility: Visibility::default(),
            segments: Vec::new(),
            chain: Vec::new(),
            smoothing: None,
            profile: ProfileConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Standard articulated hand rooted at the arm
    pub fn for_hand(subject_name: impl Into<String>, handedness: Handedness) -> Self {
        let layout = HandLayout::standard(handedness);
        Self {
            subject_name: subject_name.into(),
            root_segment: ARM.to_string(),
            segments: layout.groups,
            chain: layout.chain,
            profile: ProfileConfig::ArticulatedHand(HandConfig::for_hand(handedness)),
            ..Self::default()
        }
    }

    /// Standard five-marker headset cluster
    pub fn for_headset(subject_name: impl Into<String>) -> Self {
        let headset = HeadsetConfig::default();
        Self {
            subject_name: subject_name.into(),
            root_segment: headset.origin.clone(),
            segments: HeadsetConfig::standard_groups(),
            profile: ProfileConfig::HeadWornDevice(headset),
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> PipelineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load from a JSON file. The result is not validated; pipelines
    /// validate on construction.
    pub fn from_file<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = fs::read_to_string(&path).map_err(|e| PipelineError::Io {
            message: format!("Failed to read config file '{}': {}", path_str, e),
        })?;
        serde_json::from_str(&content).map_err(|e| PipelineError::Serialization {
            message: format!("Failed to parse config file '{}': {}", path_str, e),
        })
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> PipelineResult<()> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = self.to_json()?;
        fs::write(&path, content).map_err(|e| PipelineError::Io {
            message: format!("Failed to write config file '{}': {}", path_str, e),
        })
    }

    /// Check every construction-time rule, collecting all errors
    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if !(self.unit_scale.is_finite() && self.unit_scale > 0.0) {
            errors.push(PipelineError::invalid(
                "unit_scale",
                self.unit_scale,
                "must be positive and finite",
            ));
        }

        if self.previous_data_limit == 0 {
            errors.push(PipelineError::invalid(
                "previous_data_limit",
                self.previous_data_limit,
                "at least one sample must be kept",
            ));
        } else if self.strategy == GapFillingStrategy::FillRelative && self.previous_data_limit < 2 {
            errors.push(PipelineError::invalid(
                "previous_data_limit",
                self.previous_data_limit,
                "relative filling needs the current and the previous sample",
            ));
        } else if self.previous_data_limit > DEEP_HISTORY_WARNING {
            warnings.push(format!(
                "previous_data_limit {} is deeper than gap filling ever reads",
                self.previous_data_limit
            ));
        }

        if self.segments.is_empty() {
            warnings.push("no segment groups configured".to_string());
        }

        let mut names = HashSet::new();
        for group in &self.segments {
            if group.markers.is_empty() {
                errors.push(PipelineError::EmptySegmentGroup {
                    segment: group.name.clone(),
                });
            }
            if !names.insert(group.name.as_str()) {
                errors.push(PipelineError::DuplicateSegment {
                    segment: group.name.clone(),
                });
            }
        }

        let profile = SubjectProfile::from_config(&self.profile);
        let derived = profile.derived_segments();
        let known = |segment: &str| names.contains(segment) || derived.iter().any(|d| *d == segment);

        for link in &self.chain {
            let referenced = std::iter::once(&link.segment)
                .chain(link.parent.iter())
                .chain(link.child.iter());
            for segment in referenced {
                if !known(segment.as_str()) {
                    errors.push(PipelineError::UnknownSegment {
                        segment: segment.clone(),
                        context: format!("chain row '{}'", link.segment),
                    });
                }
            }
        }

        if self.drive_skeleton && !self.segments.is_empty() && !known(self.root_segment.as_str()) {
            errors.push(PipelineError::UnknownSegment {
                segment: self.root_segment.clone(),
                context: "root segment".to_string(),
            });
        }

        for segment in profile.required_segments() {
            if !names.contains(segment.as_str()) {
                errors.push(PipelineError::MissingProfileSegment {
                    profile: profile.name().to_string(),
                    segment,
                });
            }
        }

        if let Some(smoothing) = &self.smoothing {
            validate_filter("smoothing", smoothing, &mut errors);
        }
        if let ProfileConfig::HeadWornDevice(headset) = &self.profile {
            if let Some(filter) = &headset.position_filter {
                validate_filter("profile.position_filter", filter, &mut errors);
            }
            if let Some(filter) = &headset.rotation_filter {
                validate_filter("profile.rotation_filter", filter, &mut errors);
            }
        }

        if self.chain.is_empty() && self.strategy == GapFillingStrategy::FillRelative {
            warnings.push("relative filling without a chain only salvages within groups".to_string());
        }

        ValidationResult::from_parts(errors, warnings)
    }
}

fn validate_filter(parameter: &str, config: &FilterConfig, errors: &mut Vec<PipelineError>) {
    let checks = [
        ("frequency_hz", config.frequency_hz),
        ("min_cutoff", config.min_cutoff),
        ("derivative_cutoff", config.derivative_cutoff),
    ];
    for (field, value) in checks {
        if !(value.is_finite() && value > 0.0) {
            errors.push(PipelineError::invalid(
                &format!("{}.{}", parameter, field),
                value,
                "must be positive",
            ));
        }
    }
    if !(config.beta.is_finite() && config.beta >= 0.0) {
        errors.push(PipelineError::invalid(
            &format!("{}.beta", parameter),
            config.beta,
            "must be non-negative",
        ));
    }
}
