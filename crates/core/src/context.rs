//! Conversation context and per-topic insights.
//!
//! `ConversationState` is owned by the session and shares its lifecycle.
//! Oracle analysis is merged here: scalar context fields are latest-wins,
//! insight lists only ever grow.

use crate::oracle::{self, OracleOutcome};
use crate::policy::{OracleTimeout, StrategyPolicy};
use crate::reviewer::{ResponseAnalysis, Reviewer};
use crate::topic::Topic;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Followup,
    Transition,
    Clarification,
    Initial,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    pub recent_keywords: Vec<String>,
    pub topic_history: Vec<String>,
    pub contextual_quotes: Vec<String>,
    pub current_depth: u32,
    /// `None` until the first question strategy is chosen.
    pub last_question_type: Option<QuestionType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicInsights {
    pub key_points: Vec<String>,
    pub user_interests: Vec<String>,
    pub uncovered_aspects: Vec<String>,
}

/// Which insight list a new entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightKind {
    KeyPoint,
    UserInterest,
    UncoveredAspect,
}

impl TopicInsights {
    pub fn add(&mut self, kind: InsightKind, text: &str) {
        let list = match kind {
            InsightKind::KeyPoint => &mut self.key_points,
            InsightKind::UserInterest => &mut self.user_interests,
            InsightKind::UncoveredAspect => &mut self.uncovered_aspects,
        };
        let text = text.trim();
        // Exact repeats carry no new information.
        if !text.is_empty() && !list.iter().any(|existing| existing == text) {
            list.push(text.to_string());
        }
    }

    /// How far the topic has been explored: key points plus user interests.
    pub fn depth(&self) -> u32 {
        (self.key_points.len() + self.user_interests.len()) as u32
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    pub(crate) context: ConversationContext,
    pub(crate) insights: HashMap<String, TopicInsights>,
}

impl ConversationState {
    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn insights(&self) -> &HashMap<String, TopicInsights> {
        &self.insights
    }

    pub fn insights_for(&self, topic_id: &str) -> Option<&TopicInsights> {
        self.insights.get(topic_id)
    }

    pub fn add_insight(&mut self, topic_id: &str, kind: InsightKind, text: &str) {
        self.insights
            .entry(topic_id.to_string())
            .or_default()
            .add(kind, text);
    }

    pub fn topic_depth(&self, topic_id: &str) -> u32 {
        self.insights_for(topic_id).map_or(0, TopicInsights::depth)
    }

    pub fn apply_analysis(&mut self, topic_id: &str, analysis: ResponseAnalysis) {
        self.context.recent_keywords = analysis.keywords;
        self.context.contextual_quotes = analysis.relevant_quotes;
        self.context.current_depth = analysis.depth.max(0.0).round() as u32;

        for point in &analysis.key_points {
            self.add_insight(topic_id, InsightKind::KeyPoint, point);
        }
        for interest in &analysis.user_interests {
            self.add_insight(topic_id, InsightKind::UserInterest, interest);
        }
        for aspect in &analysis.uncovered_aspects {
            self.add_insight(topic_id, InsightKind::UncoveredAspect, aspect);
        }
    }

    pub(crate) fn set_last_question_type(&mut self, kind: QuestionType) {
        self.context.last_question_type = Some(kind);
    }

    pub(crate) fn record_completion(&mut self, topic_id: &str) {
        self.context.topic_history.push(topic_id.to_string());
    }

    pub(crate) fn record_transition(&mut self, completed_id: &str, next_id: Option<&str>) {
        self.record_completion(completed_id);
        self.context.last_question_type = Some(QuestionType::Transition);
        self.context.current_depth = next_id.map_or(0, |id| self.topic_depth(id));
    }
}

/// Consults the response-analysis oracle for one user turn.
///
/// Insights are best-effort: any failure is logged by the oracle boundary and
/// yields `None`, leaving the conversation state untouched.
pub async fn analyze_response<R: Reviewer + ?Sized>(
    reviewer: &R,
    timeout: OracleTimeout,
    response: &str,
    topic: &Topic,
    context: &ConversationContext,
) -> Option<ResponseAnalysis> {
    match oracle::consult(
        "response-analysis",
        timeout,
        reviewer.analyze_response(response, context),
    )
    .await
    {
        OracleOutcome::Success(analysis) => {
            tracing::debug!(
                topic = %topic.id,
                key_points = analysis.key_points.len(),
                "response analyzed"
            );
            Some(analysis)
        }
        OracleOutcome::Failure(_) => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionStrategy {
    pub kind: QuestionType,
    pub suggestion: String,
}

/// Picks what the host should do next when the topic is not being left.
///
/// First matching rule wins: low engagement, then uncovered aspects, then
/// user interests, then the scripted opener.
pub fn next_question_strategy(
    topic: &Topic,
    insights: Option<&TopicInsights>,
    context: &ConversationContext,
    engagement_score: f64,
    policy: &StrategyPolicy,
) -> QuestionStrategy {
    if engagement_score < policy.low_engagement {
        if context.current_depth > policy.segue_depth {
            let suggestion = if topic.segue_to_next.trim().is_empty() {
                "Let's explore a different aspect...".to_string()
            } else {
                topic.segue_to_next.clone()
            };
            return QuestionStrategy {
                kind: QuestionType::Transition,
                suggestion,
            };
        }
        return QuestionStrategy {
            kind: QuestionType::Clarification,
            suggestion: "Could you elaborate on that point?".to_string(),
        };
    }

    if let Some(aspect) = insights.and_then(|i| i.uncovered_aspects.first()) {
        return QuestionStrategy {
            kind: QuestionType::Followup,
            suggestion: format!("Let's explore {aspect}..."),
        };
    }

    if let Some(interest) = insights.and_then(|i| i.user_interests.first()) {
        return QuestionStrategy {
            kind: QuestionType::Followup,
            suggestion: format!("You mentioned {interest}. Can you tell me more about that?"),
        };
    }

    QuestionStrategy {
        kind: QuestionType::Initial,
        suggestion: topic.first_question().to_string(),
    }
}
