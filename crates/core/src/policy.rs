//! Tunable knobs for scoring, transitions and question strategy.
//!
//! Engagement scoring comes in two presets, `balanced` (the default) and
//! `lenient`, selectable by profile name.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engagement scoring parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementPolicy {
    /// Average utterance length (in characters) that maps to a full baseline score.
    pub length_divisor: f64,
    pub trend_min: f64,
    pub trend_max: f64,
    /// How many trailing lengths the trend term looks at.
    pub trend_window: usize,
    /// How many trailing utterances are sent to the oracle.
    pub oracle_window: usize,
    /// Oracle scores are clamped into `[oracle_score_min, 1.0]`.
    pub oracle_score_min: f64,
    pub baseline_weight: f64,
    pub oracle_weight: f64,
    pub floor: f64,
    pub ceiling: f64,
    /// Score used when the oracle fails or times out.
    pub fallback_score: f64,
    /// Consecutive oracle failures after which the deterministic baseline
    /// replaces the neutral fallback score.
    #[serde(default = "default_baseline_after_failures")]
    pub baseline_after_failures: u32,
}

fn default_baseline_after_failures() -> u32 {
    2
}

impl EngagementPolicy {
    /// Divisor 200, trend in [-0.5, 0.5], equal weighting, full [0, 1] range.
    pub fn balanced() -> Self {
        Self {
            length_divisor: 200.0,
            trend_min: -0.5,
            trend_max: 0.5,
            trend_window: 3,
            oracle_window: 3,
            oracle_score_min: 0.0,
            baseline_weight: 1.0,
            oracle_weight: 1.0,
            floor: 0.0,
            ceiling: 1.0,
            fallback_score: 0.5,
            baseline_after_failures: default_baseline_after_failures(),
        }
    }

    /// Divisor 150, trend in [-0.2, 0.4], oracle weighted 2:1, floor 0.3.
    pub fn lenient() -> Self {
        Self {
            length_divisor: 150.0,
            trend_min: -0.2,
            trend_max: 0.4,
            oracle_score_min: 0.2,
            oracle_weight: 2.0,
            floor: 0.3,
            ..Self::balanced()
        }
    }

    pub fn from_profile(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "balanced" => Some(Self::balanced()),
            "lenient" => Some(Self::lenient()),
            _ => None,
        }
    }

    pub fn clamp(&self, score: f64) -> f64 {
        score.clamp(self.floor, self.ceiling)
    }
}

impl Default for EngagementPolicy {
    fn default() -> Self {
        Self::balanced()
    }
}

/// Thresholds for the topic exhaustion predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionPolicy {
    pub low_score: f64,
    /// A low score only counts once the topic has run longer than this.
    pub min_length_for_low_score: u32,
    pub max_length: u32,
    pub max_repetitions: u32,
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self {
            low_score: 0.3,
            min_length_for_low_score: 5,
            max_length: 15,
            max_repetitions: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPolicy {
    pub low_engagement: f64,
    pub segue_depth: u32,
}

impl Default for StrategyPolicy {
    fn default() -> Self {
        Self {
            low_engagement: 0.4,
            segue_depth: 2,
        }
    }
}

/// Everything a session actor needs to make its decisions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionPolicy {
    pub engagement: EngagementPolicy,
    pub transition: TransitionPolicy,
    pub strategy: StrategyPolicy,
    pub oracle_timeout: OracleTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OracleTimeout(pub Duration);

impl Default for OracleTimeout {
    fn default() -> Self {
        Self(Duration::from_secs(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles() {
        let lenient = EngagementPolicy::from_profile("Lenient").unwrap();
        assert_eq!(lenient.length_divisor, 150.0);
        assert_eq!(lenient.floor, 0.3);
        assert_eq!(lenient.trend_window, 3);
        assert!(EngagementPolicy::from_profile("strict").is_none());
        assert_eq!(lenient.clamp(0.1), 0.3);
        assert_eq!(EngagementPolicy::default().clamp(1.7), 1.0);
    }
}
