//! Error and diagnostic types.
//!
//! Two kinds of failure exist in gait processing:
//! - Hard errors ([`GaitError`]): the input breaks its contract (mismatched
//!   channel lengths, missing sensor, invalid configuration). These surface
//!   as `Err` to the caller.
//! - Soft findings ([`TrialFlags`]): the input is well-formed but the trial
//!   does not support some parameter (no walking period, every stride touches
//!   a turn). These never abort; affected parameters become NaN and a flag is
//!   raised on the trial.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::SensorLocation;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, GaitError>;

/// Hard failures of a processing stage.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GaitError {
    /// A configuration value is outside its valid range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input series is empty where data is required.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Channels of one trial disagree on sample count.
    #[error("Length mismatch in {context}: expected {expected}, got {actual}")]
    LengthMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// A required body-worn sensor has no data.
    #[error("Missing sensor: {0:?}")]
    MissingSensor(SensorLocation),

    /// A required marker label is absent from the trajectory set.
    #[error("Missing marker: {0}")]
    MissingMarker(String),

    /// Too few events to derive the requested quantity.
    #[error("Insufficient events for {context}: need {required}, found {found}")]
    InsufficientEvents {
        context: String,
        required: usize,
        found: usize,
    },

    /// Numerical routine could not produce a result.
    #[error("Numerical failure: {0}")]
    Numerical(String),
}

impl GaitError {
    /// Convenience constructor for configuration errors.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether the error reflects expected missing data rather than a
    /// computation fault. Expected-missing errors downgrade to a
    /// `no_walking_period` flag in the trial pipeline.
    pub fn is_missing_data(&self) -> bool {
        matches!(
            self,
            Self::EmptyInput(_) | Self::InsufficientEvents { .. } | Self::MissingSensor(_)
        )
    }
}

/// Soft per-trial findings accumulated during processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialFlags {
    /// No walking period could be established; event-derived parameters are NaN.
    pub no_walking_period: bool,
    /// Very slow apparent walking combined with very high double support.
    /// Usually a misconfigured sample rate. Not corrected.
    pub implausible_sample_rate: bool,
    /// All strides touch a turn; gait speed fell back to all strides.
    pub no_steady_state_gait: bool,
    /// Processed as a transfer trial but no sit-to-stand transfer was found.
    pub trial_type_mismatch: bool,
    /// The recording reported a high amount of missing samples.
    pub high_missing_samples: bool,
}

impl TrialFlags {
    /// True when no flag is raised.
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }

    /// Names of the raised flags, in declaration order.
    pub fn raised(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.no_walking_period {
            out.push("No walking period");
        }
        if self.implausible_sample_rate {
            out.push("Wrong sample frequency");
        }
        if self.no_steady_state_gait {
            out.push("No steady state gait");
        }
        if self.trial_type_mismatch {
            out.push("Trial type");
        }
        if self.high_missing_samples {
            out.push("High amount missing samples");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flags_are_clean() {
        let flags = TrialFlags::default();
        assert!(flags.is_clean());
        assert!(flags.raised().is_empty());
    }

    #[test]
    fn test_raised_flag_names() {
        let flags = TrialFlags {
            no_steady_state_gait: true,
            implausible_sample_rate: true,
            ..Default::default()
        };
        assert!(!flags.is_clean());
        assert_eq!(flags.raised(), vec!["Wrong sample frequency", "No steady state gait"]);
    }

    #[test]
    fn test_missing_data_classification() {
        assert!(GaitError::EmptyInput("gyro".into()).is_missing_data());
        assert!(GaitError::MissingSensor(SensorLocation::Lumbar).is_missing_data());
        assert!(!GaitError::config("cutoff above nyquist").is_missing_data());
        assert!(!GaitError::Numerical("singular".into()).is_missing_data());
    }

    #[test]
    fn test_error_display() {
        let err = GaitError::LengthMismatch {
            context: "left foot gyroscope".into(),
            expected: 100,
            actual: 99,
        };
        assert_eq!(
            err.to_string(),
            "Length mismatch in left foot gyroscope: expected 100, got 99"
        );
    }
}
