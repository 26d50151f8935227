//! Model-load progress samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest fraction an unconfirmed load may report.
///
/// Only the backend's `model_loaded` flag may move progress to 1.0.
pub const ESTIMATE_CEILING: f64 = 0.95;

/// Point-in-time estimate of model-load completion.
///
/// Advisory UI feedback only: readiness is decided by the health endpoint,
/// never by this number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSample {
    /// Completion in `0.0..=1.0`.
    pub fraction: f64,
    /// Human-readable description.
    pub message: String,
    /// When the sample was taken.
    pub sampled_at: DateTime<Utc>,
    /// `true` when synthesized locally rather than reported by the backend.
    pub estimated: bool,
}

impl ProgressSample {
    /// Create a sample; the fraction is clamped into `0.0..=1.0`.
    pub fn new(fraction: f64, message: impl Into<String>, estimated: bool) -> Self {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        Self {
            fraction,
            message: message.into(),
            sampled_at: Utc::now(),
            estimated,
        }
    }

    /// Sample marking a confirmed, completed load.
    pub fn complete() -> Self {
        Self::new(1.0, "Model loaded", false)
    }

    /// Whether the load is confirmed complete.
    pub fn is_complete(&self) -> bool {
        self.fraction >= 1.0
    }

    /// Copy of this sample with the fraction raised to at least `floor`.
    #[must_use]
    pub fn at_least(mut self, floor: f64) -> Self {
        if self.fraction < floor {
            self.fraction = floor.clamp(0.0, 1.0);
        }
        self
    }

    /// Fraction as a whole percentage, for display.
    pub fn percent(&self) -> u8 {
        // fraction is clamped to 0..=1, so the product fits in a u8
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let pct = (self.fraction * 100.0).round() as u8;
        pct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_is_clamped() {
        assert!((ProgressSample::new(1.7, "x", true).fraction - 1.0).abs() < f64::EPSILON);
        assert!(ProgressSample::new(-0.3, "x", true).fraction.abs() < f64::EPSILON);
        assert!(ProgressSample::new(f64::NAN, "x", true).fraction.abs() < f64::EPSILON);
    }

    #[test]
    fn at_least_never_lowers() {
        let sample = ProgressSample::new(0.6, "x", false).at_least(0.4);
        assert!((sample.fraction - 0.6).abs() < f64::EPSILON);
        let sample = ProgressSample::new(0.2, "x", false).at_least(0.4);
        assert!((sample.fraction - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn percent_rounds() {
        assert_eq!(ProgressSample::new(0.426, "x", true).percent(), 43);
        assert_eq!(ProgressSample::complete().percent(), 100);
    }
}
