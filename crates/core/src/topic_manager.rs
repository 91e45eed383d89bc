use crate::context::ConversationContext;
use crate::oracle::{self, OracleOutcome};
use crate::policy::{OracleTimeout, TransitionPolicy};
use crate::reviewer::Reviewer;
use crate::topic::{Topic, TopicList};
use serde::Serialize;

/// Outcome of evaluating whether the active topic should be left.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionDecision {
    pub should_transition: bool,
    /// `None` on a transition means every topic has been covered.
    pub next_topic_id: Option<String>,
    pub strategy: Option<String>,
}

impl TransitionDecision {
    pub fn stay() -> Self {
        Self::default()
    }
}

/// Decides when a topic is exhausted and what comes next.
pub struct TopicManager {
    policy: TransitionPolicy,
    timeout: OracleTimeout,
}

impl TopicManager {
    pub fn new(policy: TransitionPolicy, timeout: OracleTimeout) -> Self {
        Self { policy, timeout }
    }

    /// Any one signal is enough. A low score alone does not count until the
    /// topic has run for a while, so a single bad turn never ends it.
    pub fn is_exhausted(&self, engagement_score: f64, discussion_length: u32, repetitions: u32) -> bool {
        let disengaged = engagement_score < self.policy.low_score
            && discussion_length > self.policy.min_length_for_low_score;
        disengaged
            || discussion_length > self.policy.max_length
            || repetitions > self.policy.max_repetitions
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn evaluate_transition<R: Reviewer + ?Sized>(
        &self,
        reviewer: &R,
        current: &Topic,
        topics: &TopicList,
        context: &ConversationContext,
        engagement_score: f64,
        discussion_length: u32,
        repetitions: u32,
    ) -> TransitionDecision {
        if !self.is_exhausted(engagement_score, discussion_length, repetitions) {
            return TransitionDecision::stay();
        }

        let strategy = match oracle::consult(
            "topic-suggestion",
            self.timeout,
            reviewer.suggest_topics(current, context, engagement_score),
        )
        .await
        {
            OracleOutcome::Success(suggestion) => {
                tracing::debug!(
                    rationale = %suggestion.rationale,
                    suggested = ?suggestion.suggested_topics,
                    "Topic suggestion received"
                );
                Some(suggestion.transition_strategy).filter(|s| !s.trim().is_empty())
            }
            OracleOutcome::Failure(_) => None,
        };

        let next_topic_id = topics.next_after(&current.id).map(|t| t.id.clone());
        tracing::info!(
            topic = %current.id,
            next = ?next_topic_id,
            engagement_score,
            discussion_length,
            repetitions,
            "Topic exhausted"
        );

        TransitionDecision {
            should_transition: true,
            next_topic_id,
            strategy,
        }
    }

    /// Asks the question oracle for a follow-up, falling back to the topic's
    /// first scripted question.
    pub async fn suggest_follow_up_question<R: Reviewer + ?Sized>(
        &self,
        reviewer: &R,
        topic: &Topic,
        context: &ConversationContext,
        depth: u32,
    ) -> String {
        match oracle::consult(
            "question-suggestion",
            self.timeout,
            reviewer.suggest_question(topic, context, depth),
        )
        .await
        {
            OracleOutcome::Success(suggestion) if !suggestion.question.trim().is_empty() => {
                suggestion.question
            }
            _ => topic.first_question().to_string(),
        }
    }
}
