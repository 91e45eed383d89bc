//! Engagement scoring.
//!
//! A cheap length-based baseline is blended with the engagement oracle's
//! judgment. The oracle is optional in practice: when it fails the scorer
//! returns the configured neutral score instead of stalling the turn, and
//! once it keeps failing the baseline alone drives the score.

use crate::error::CoreError;
use crate::oracle::{self, OracleOutcome};
use crate::policy::{EngagementPolicy, OracleTimeout};
use crate::reviewer::{EngagementAnalysis, Reviewer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreSource {
    Combined,
    /// Single oracle failure: the neutral score.
    Fallback,
    /// Repeated oracle failures: the length baseline alone.
    Baseline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementReport {
    pub depth: Option<f64>,
    pub relevance: Option<f64>,
    pub complexity: Option<f64>,
    pub average_length: f64,
    pub length_trend: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngagementResult {
    pub score: f64,
    pub baseline: f64,
    pub metrics: EngagementReport,
    pub patterns: BTreeMap<String, bool>,
    pub recommendation: String,
    pub source: ScoreSource,
}

pub struct EngagementScorer {
    policy: EngagementPolicy,
    timeout: OracleTimeout,
    consecutive_failures: AtomicU32,
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

impl EngagementScorer {
    pub fn new(policy: EngagementPolicy, timeout: OracleTimeout) -> Self {
        Self {
            policy,
            timeout,
            consecutive_failures: AtomicU32::new(0),
        }
    }

    fn trend_window<'a>(&self, lengths: &'a [usize]) -> &'a [usize] {
        let start = lengths.len().saturating_sub(self.policy.trend_window.max(1));
        &lengths[start..]
    }

    /// Deterministic score in [0, 1] from utterance lengths alone.
    pub fn baseline(&self, lengths: &[usize]) -> f64 {
        if lengths.is_empty() {
            return 0.0;
        }
        let average = lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;
        let length_score = (average / self.policy.length_divisor).min(1.0);

        let window = self.trend_window(lengths);
        let trend = match (window.first(), window.last()) {
            (Some(&first), Some(&last)) if window.len() >= 2 && first > 0 => {
                ((last as f64 - first as f64) / first as f64)
                    .clamp(self.policy.trend_min, self.policy.trend_max)
            }
            _ => 0.0,
        };

        (length_score + trend).clamp(0.0, 1.0)
    }

    fn combine(&self, baseline: f64, analysis: &EngagementAnalysis) -> Option<f64> {
        if !analysis.score.is_finite() {
            return None;
        }
        let oracle_score = analysis.score.clamp(self.policy.oracle_score_min, 1.0);
        let total_weight = self.policy.baseline_weight + self.policy.oracle_weight;
        let blended = if total_weight > 0.0 {
            (self.policy.baseline_weight * baseline + self.policy.oracle_weight * oracle_score)
                / total_weight
        } else {
            baseline
        };
        Some(self.policy.clamp(blended))
    }

    /// Scores the recent response window for the given topic.
    ///
    /// An empty window is a caller bug and is rejected. Oracle failures are
    /// not: they produce a fallback result.
    pub async fn score<R: Reviewer + ?Sized>(
        &self,
        reviewer: &R,
        responses: &[String],
        topic_label: &str,
    ) -> Result<EngagementResult, CoreError> {
        if responses.is_empty() {
            return Err(CoreError::EmptyResponses);
        }

        let lengths: Vec<usize> = responses.iter().map(|r| char_len(r)).collect();
        let baseline = self.baseline(&lengths);
        let average_length = lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;
        let length_trend = self.trend_window(&lengths).to_vec();

        let start = responses.len().saturating_sub(self.policy.oracle_window.max(1));
        let recent = &responses[start..];
        let outcome = oracle::consult(
            "engagement",
            self.timeout,
            reviewer.analyze_engagement(recent, topic_label),
        )
        .await;

        let combined = match outcome {
            OracleOutcome::Success(analysis) => match self.combine(baseline, &analysis) {
                Some(score) => Some((score, analysis)),
                None => {
                    tracing::warn!("Engagement oracle returned a non-finite score");
                    None
                }
            },
            OracleOutcome::Failure(_) => None,
        };

        let result = match combined {
            Some((score, analysis)) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                EngagementResult {
                    score,
                    baseline,
                    metrics: EngagementReport {
                        depth: Some(analysis.metrics.depth),
                        relevance: Some(analysis.metrics.relevance),
                        complexity: Some(analysis.metrics.complexity),
                        average_length,
                        length_trend,
                    },
                    patterns: analysis.patterns,
                    recommendation: analysis.recommendation,
                    source: ScoreSource::Combined,
                }
            }
            None => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                self.fallback(failures, baseline, average_length, length_trend)
            }
        };

        tracing::debug!(
            score = result.score,
            baseline = result.baseline,
            source = ?result.source,
            "Engagement scored"
        );
        Ok(result)
    }

    fn fallback(
        &self,
        failures: u32,
        baseline: f64,
        average_length: f64,
        length_trend: Vec<usize>,
    ) -> EngagementResult {
        let (score, source) = if failures >= self.policy.baseline_after_failures {
            (baseline, ScoreSource::Baseline)
        } else {
            (self.policy.fallback_score, ScoreSource::Fallback)
        };
        EngagementResult {
            score: self.policy.clamp(score),
            baseline,
            metrics: EngagementReport {
                depth: None,
                relevance: None,
                complexity: None,
                average_length,
                length_trend,
            },
            patterns: BTreeMap::new(),
            recommendation: String::new(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngagementIndicator {
    pub level: EngagementLevel,
    pub message: &'static str,
}

/// Quick per-utterance label for display alongside the transcript.
pub fn engagement_indicator(text: &str) -> EngagementIndicator {
    let length = char_len(text);
    let words = text.split_whitespace().count().max(1);
    let avg_word_length = length as f64 / words as f64;

    if length > 200 && avg_word_length > 4.0 {
        EngagementIndicator {
            level: EngagementLevel::High,
            message: "Detailed and engaged response",
        }
    } else if length > 100 || (length > 50 && avg_word_length > 5.0) {
        EngagementIndicator {
            level: EngagementLevel::Medium,
            message: "Moderate engagement",
        }
    } else {
        EngagementIndicator {
            level: EngagementLevel::Low,
            message: "Brief or limited response",
        }
    }
}

/// Percentage of a topic's expected length already discussed (five turns is 100%).
pub fn topic_progress(discussion_length: u32) -> u8 {
    ((discussion_length as f64 / 5.0) * 100.0).min(100.0).round() as u8
}
