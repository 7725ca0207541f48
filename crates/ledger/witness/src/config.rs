use serde::{Deserialize, Serialize};

use crate::error::{WitnessError, WitnessResult};

/// Thresholds for collusion detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollusionConfig {
    /// Number of most recent breaches considered (default: 10).
    pub window_size: usize,
    /// A pair is suspended when its correlation is strictly above this
    /// (default: 0.8).
    pub correlation_threshold: f64,
    /// Minimum breaches in the window before any pair is judged (default: 5).
    pub min_breaches: usize,
}

impl Default for CollusionConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            correlation_threshold: 0.8,
            min_breaches: 5,
        }
    }
}

impl CollusionConfig {
    pub fn validate(&self) -> WitnessResult<()> {
        if self.window_size == 0 {
            return Err(WitnessError::InvalidConfig("window_size must be positive".into()));
        }
        if self.min_breaches == 0 || self.min_breaches > self.window_size {
            return Err(WitnessError::InvalidConfig(format!(
                "min_breaches must be within 1..={}",
                self.window_size
            )));
        }
        if !(self.correlation_threshold > 0.0 && self.correlation_threshold < 1.0) {
            return Err(WitnessError::InvalidConfig(
                "correlation_threshold must be within (0, 1)".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        CollusionConfig::default().validate().unwrap();
    }

    #[test]
    fn min_breaches_cannot_exceed_window() {
        let config = CollusionConfig {
            min_breaches: 11,
            ..CollusionConfig::default()
        };
        assert!(matches!(config.validate(), Err(WitnessError::InvalidConfig(_))));
    }
}
