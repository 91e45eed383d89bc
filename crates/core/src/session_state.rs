use crate::context::{
    ConversationContext, ConversationState, QuestionType, TopicInsights,
};
use crate::engagement::topic_progress;
use crate::error::CoreError;
use crate::reviewer::ResponseAnalysis;
use crate::topic::{Topic, TopicList, TopicStatus};
use crate::topic_manager::TransitionDecision;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// How many recent utterances feed the engagement scorer.
pub const RESPONSE_WINDOW: usize = 5;

/// Key used for turns that arrive while no topic is active.
pub const UNATTRIBUTED_TOPIC: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementMetrics {
    pub score: f64,
    pub response_lengths: Vec<usize>,
    pub last_responses: VecDeque<String>,
    /// Every user turn attributed to a topic, whatever the topic's status.
    pub topic_repetitions: HashMap<String, u32>,
}

impl Default for EngagementMetrics {
    fn default() -> Self {
        // Optimistic until the user shows otherwise.
        Self {
            score: 1.0,
            response_lengths: Vec::new(),
            last_responses: VecDeque::with_capacity(RESPONSE_WINDOW),
            topic_repetitions: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub text: String,
    pub is_agent: bool,
    pub timestamp: DateTime<Utc>,
}

/// Result of committing a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub completed: String,
    pub activated: Option<Topic>,
}

/// Serializable view of a session, for the runtimes and for persistence.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub document_namespace: Option<String>,
    pub topics: TopicList,
    pub current_topic_id: Option<String>,
    pub engagement_metrics: EngagementMetrics,
    pub context: ConversationContext,
    pub topic_insights: HashMap<String, TopicInsights>,
    /// Percentage of each topic's expected length already discussed.
    pub topic_progress: BTreeMap<String, u8>,
    pub generation: u64,
}

/// All state of one podcast session.
///
/// Mutations are plain functions of the prior state and their inputs. Topic
/// status changes are routed through `TopicList`, and completing a topic
/// always appends it to the conversation's topic history.
#[derive(Debug, Clone)]
pub struct PodcastSession {
    document_namespace: Option<String>,
    topics: TopicList,
    current_topic_id: Option<String>,
    metrics: EngagementMetrics,
    conversation: ConversationState,
    transcript: Vec<TranscriptEntry>,
    generation: u64,
    score_floor: f64,
    score_ceiling: f64,
}

impl Default for PodcastSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PodcastSession {
    pub fn new() -> Self {
        Self {
            document_namespace: None,
            topics: TopicList::default(),
            current_topic_id: None,
            metrics: EngagementMetrics::default(),
            conversation: ConversationState::default(),
            transcript: Vec::new(),
            generation: 0,
            score_floor: 0.0,
            score_ceiling: 1.0,
        }
    }

    /// Bounds every later score update. The initial 1.0 is kept as-is.
    pub fn with_score_bounds(mut self, floor: f64, ceiling: f64) -> Self {
        self.score_floor = floor;
        self.score_ceiling = ceiling;
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True when a result started under `generation` may still be applied.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn document_namespace(&self) -> Option<&str> {
        self.document_namespace.as_deref()
    }

    pub fn set_document_namespace(&mut self, namespace: impl Into<String>) {
        self.document_namespace = Some(namespace.into());
    }

    pub fn topics(&self) -> &TopicList {
        &self.topics
    }

    pub fn current_topic_id(&self) -> Option<&str> {
        self.current_topic_id.as_deref()
    }

    pub fn current_topic(&self) -> Option<&Topic> {
        self.current_topic_id
            .as_deref()
            .and_then(|id| self.topics.get(id))
    }

    pub fn metrics(&self) -> &EngagementMetrics {
        &self.metrics
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// The sliding window handed to the engagement scorer.
    pub fn response_window(&self) -> Vec<String> {
        self.metrics.last_responses.iter().cloned().collect()
    }

    pub fn repetitions(&self, topic_id: &str) -> u32 {
        self.metrics
            .topic_repetitions
            .get(topic_id)
            .copied()
            .unwrap_or(0)
    }

    /// Turns spent on a topic outside its active window, i.e. the user
    /// coming back to it before or after it was the focus.
    pub fn revisits(&self, topic_id: &str) -> u32 {
        let active_turns = self
            .topics
            .get(topic_id)
            .map_or(0, |t| t.discussion_length);
        self.repetitions(topic_id).saturating_sub(active_turns)
    }

    /// Replaces the topic list wholesale. Used once, when the document's
    /// topics arrive.
    ///
    /// In-flight results for the previous topics become stale.
    pub fn set_topics(&mut self, topics: Vec<Topic>) -> Result<(), CoreError> {
        let topics = TopicList::new(topics)?;
        self.current_topic_id = topics.active().map(|t| t.id.clone());
        self.conversation = ConversationState::default();
        for topic in topics.iter().filter(|t| t.status == TopicStatus::Completed) {
            self.conversation.record_completion(&topic.id);
        }
        self.topics = topics;
        self.generation += 1;
        tracing::info!(count = self.topics.len(), "Topics loaded");
        Ok(())
    }

    /// Makes `topic_id` the current topic and flips it to active.
    pub fn set_current_topic(&mut self, topic_id: &str) -> Result<(), CoreError> {
        self.topics.activate(topic_id)?;
        self.current_topic_id = Some(topic_id.to_string());
        self.conversation.context.current_depth = self.conversation.topic_depth(topic_id);
        Ok(())
    }

    pub fn update_topic_status(&mut self, topic_id: &str, status: TopicStatus) -> Result<(), CoreError> {
        if status == TopicStatus::Active {
            return self.set_current_topic(topic_id);
        }
        let before = self.topics.get(topic_id).map(|t| t.status);
        self.topics.set_status(topic_id, status)?;
        if before == Some(status) {
            return Ok(());
        }
        match status {
            TopicStatus::Completed => {
                self.conversation.record_completion(topic_id);
                if self.current_topic_id.as_deref() == Some(topic_id) {
                    self.current_topic_id = None;
                }
            }
            TopicStatus::Active | TopicStatus::Pending => {}
        }
        Ok(())
    }

    /// Records one user utterance against `topic_id` (or against no topic).
    ///
    /// The repetition counter moves for every attributed turn. The topic's
    /// discussion length only moves while the topic is active.
    pub fn record_response(&mut self, text: &str, topic_id: Option<&str>) {
        self.metrics.response_lengths.push(text.chars().count());
        self.metrics.last_responses.push_back(text.to_string());
        while self.metrics.last_responses.len() > RESPONSE_WINDOW {
            self.metrics.last_responses.pop_front();
        }

        let key = topic_id.unwrap_or(UNATTRIBUTED_TOPIC);
        *self
            .metrics
            .topic_repetitions
            .entry(key.to_string())
            .or_insert(0) += 1;
        if let Some(id) = topic_id {
            self.topics.record_turn(id);
        }

        self.push_transcript(text, false);
    }

    pub fn record_agent_utterance(&mut self, text: &str) {
        self.push_transcript(text, true);
    }

    fn push_transcript(&mut self, text: &str, is_agent: bool) {
        self.transcript.push(TranscriptEntry {
            text: text.to_string(),
            is_agent,
            timestamp: Utc::now(),
        });
    }

    /// Replaces the engagement score, clamped into the session's bounds.
    pub fn update_engagement_score(&mut self, score: f64) {
        if !score.is_finite() {
            tracing::warn!("Ignoring non-finite engagement score");
            return;
        }
        self.metrics.score = score.clamp(self.score_floor, self.score_ceiling);
    }

    pub fn apply_response_analysis(&mut self, topic_id: &str, analysis: ResponseAnalysis) {
        self.conversation.apply_analysis(topic_id, analysis);
    }

    pub fn record_question_type(&mut self, kind: QuestionType) {
        self.conversation.set_last_question_type(kind);
    }

    /// Applies a transition decision to `current_id` in one step.
    ///
    /// With no next topic the current one is completed and the session is
    /// left with no active topic.
    pub fn commit_transition(
        &mut self,
        current_id: &str,
        decision: &TransitionDecision,
    ) -> Result<TransitionOutcome, CoreError> {
        let next_id = decision.next_topic_id.as_deref();
        self.topics.advance(current_id, next_id)?;
        self.conversation.record_transition(current_id, next_id);
        self.current_topic_id = next_id.map(str::to_string);

        tracing::info!(completed = current_id, activated = ?next_id, "Topic transition committed");
        Ok(TransitionOutcome {
            completed: current_id.to_string(),
            activated: next_id.and_then(|id| self.topics.get(id)).cloned(),
        })
    }

    /// The transcript as alternating `AI:` / `User:` paragraphs.
    pub fn full_transcript(&self) -> String {
        self.transcript
            .iter()
            .map(|entry| {
                let speaker = if entry.is_agent { "AI" } else { "User" };
                format!("{speaker}: {}", entry.text)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Wipes the session back to its initial state and invalidates any
    /// in-flight oracle results.
    pub fn reset(&mut self) {
        let generation = self.generation + 1;
        *self = Self {
            generation,
            score_floor: self.score_floor,
            score_ceiling: self.score_ceiling,
            ..Self::new()
        };
        tracing::info!(generation, "Session reset");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            document_namespace: self.document_namespace.clone(),
            topics: self.topics.clone(),
            current_topic_id: self.current_topic_id.clone(),
            engagement_metrics: self.metrics.clone(),
            context: self.conversation.context.clone(),
            topic_insights: self.conversation.insights().clone(),
            topic_progress: self
                .topics
                .iter()
                .map(|t| (t.id.clone(), topic_progress(t.discussion_length)))
                .collect(),
            generation: self.generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::InsightKind;
    use crate::topic::sample_topics;

    fn started() -> PodcastSession {
        let mut session = PodcastSession::new();
        session.set_topics(sample_topics()).unwrap();
        session.set_current_topic("a").unwrap();
        session
    }

    fn active_count(session: &PodcastSession) -> usize {
        session.topics().count_with_status(TopicStatus::Active)
    }

    #[test]
    fn test_window_evicts_oldest_but_lengths_keep_everything() {
        let mut session = started();
        for i in 1..=5 {
            session.record_response(&format!("response {i}"), Some("a"));
        }
        assert_eq!(session.metrics().last_responses.len(), 5);

        session.record_response("response 6", Some("a"));

        let window = session.response_window();
        assert_eq!(window.len(), 5);
        assert_eq!(window.first().unwrap(), "response 2");
        assert_eq!(window.last().unwrap(), "response 6");
        assert_eq!(session.metrics().response_lengths.len(), 6);
        assert_eq!(session.repetitions("a"), 6);
        assert_eq!(session.current_topic().unwrap().discussion_length, 6);
    }

    #[test]
    fn test_unattributed_turns_only_count_repetitions() {
        let mut session = PodcastSession::new();
        session.set_topics(sample_topics()).unwrap();
        session.record_response("hello?", None);
        session.record_response("about the legacy", Some("c"));

        assert_eq!(session.repetitions(UNATTRIBUTED_TOPIC), 1);
        assert_eq!(session.repetitions("c"), 1);
        assert_eq!(session.topics().get("c").unwrap().discussion_length, 0);
        assert_eq!(session.revisits("c"), 1);

        session.set_current_topic("c").unwrap();
        session.record_response("and what remains", Some("c"));
        assert_eq!(session.repetitions("c"), 2);
        assert_eq!(session.revisits("c"), 1);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut session = started();
        session.set_document_namespace("podcast_123");
        session.record_response("something thoughtful", Some("a"));
        session.update_engagement_score(0.4);
        let generation = session.generation();

        session.reset();

        let metrics = session.metrics();
        assert_eq!(metrics.score, 1.0);
        assert!(metrics.response_lengths.is_empty());
        assert!(metrics.topic_repetitions.is_empty());
        assert!(metrics.last_responses.is_empty());
        assert!(session.topics().is_empty());
        assert!(session.current_topic_id().is_none());
        assert!(session.document_namespace().is_none());
        assert!(session.transcript().is_empty());
        assert!(session.conversation().context().topic_history.is_empty());
        assert!(!session.is_current(generation));
    }

    #[test]
    fn test_score_updates_are_clamped() {
        let mut session = PodcastSession::new().with_score_bounds(0.3, 1.0);
        session.update_engagement_score(0.05);
        assert_eq!(session.metrics().score, 0.3);
        session.update_engagement_score(4.0);
        assert_eq!(session.metrics().score, 1.0);
        session.update_engagement_score(f64::NAN);
        assert_eq!(session.metrics().score, 1.0);
    }

    #[test]
    fn test_set_current_topic_guards_single_active() {
        let mut session = started();
        let err = session.set_current_topic("b").unwrap_err();
        assert!(matches!(err, CoreError::TopicAlreadyActive { .. }));
        assert_eq!(session.current_topic_id(), Some("a"));
        assert_eq!(active_count(&session), 1);
    }

    #[test]
    fn test_commit_transition_keeps_history_in_step() {
        let mut session = started();
        let decision = TransitionDecision {
            should_transition: true,
            next_topic_id: Some("b".to_string()),
            strategy: None,
        };
        let outcome = session.commit_transition("a", &decision).unwrap();
        assert_eq!(outcome.completed, "a");
        assert_eq!(outcome.activated.unwrap().id, "b");
        assert_eq!(session.current_topic_id(), Some("b"));
        assert_eq!(active_count(&session), 1);

        let context = session.conversation().context();
        assert_eq!(context.topic_history, vec!["a".to_string()]);
        assert_eq!(context.last_question_type, Some(QuestionType::Transition));
        assert_eq!(
            context.topic_history.len(),
            session.topics().count_with_status(TopicStatus::Completed)
        );

        // A stale decision for the already completed topic is refused.
        let err = session.commit_transition("a", &decision).unwrap_err();
        assert_eq!(err, CoreError::NotActive("a".to_string()));
        assert_eq!(session.conversation().context().topic_history.len(), 1);
    }

    #[test]
    fn test_commit_final_transition_leaves_no_active_topic() {
        let mut session = started();
        session.update_topic_status("a", TopicStatus::Completed).unwrap();
        session.set_current_topic("b").unwrap();
        session
            .commit_transition("b", &TransitionDecision {
                should_transition: true,
                next_topic_id: Some("c".to_string()),
                strategy: None,
            })
            .unwrap();
        session
            .commit_transition("c", &TransitionDecision {
                should_transition: true,
                next_topic_id: None,
                strategy: None,
            })
            .unwrap();

        assert_eq!(active_count(&session), 0);
        assert!(session.current_topic_id().is_none());
        assert_eq!(
            session.conversation().context().topic_history,
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn test_update_topic_status_rejects_backward_moves() {
        let mut session = started();
        let err = session
            .update_topic_status("a", TopicStatus::Pending)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidStatusTransition { .. }));
        let err = session
            .update_topic_status("c", TopicStatus::Completed)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidStatusTransition { .. }));
        assert!(session.conversation().context().topic_history.is_empty());
    }

    #[test]
    fn test_activating_by_status_tracks_topic_depth() {
        let mut session = started();
        session
            .conversation
            .add_insight("b", InsightKind::KeyPoint, "Presses spread along trade routes");
        session
            .conversation
            .add_insight("b", InsightKind::UserInterest, "censorship");

        session.update_topic_status("a", TopicStatus::Completed).unwrap();
        session.update_topic_status("b", TopicStatus::Active).unwrap();

        assert_eq!(session.current_topic_id(), Some("b"));
        assert_eq!(session.conversation().context().current_depth, 2);
        assert_eq!(active_count(&session), 1);

        // A second active topic is still refused.
        let err = session
            .update_topic_status("c", TopicStatus::Active)
            .unwrap_err();
        assert!(matches!(err, CoreError::TopicAlreadyActive { .. }));
        assert_eq!(session.current_topic_id(), Some("b"));
    }

    #[test]
    fn test_full_transcript_labels_speakers() {
        let mut session = started();
        session.record_agent_utterance("Welcome to the show.");
        session.record_response("Glad to be here.", Some("a"));
        assert_eq!(
            session.full_transcript(),
            "AI: Welcome to the show.\n\nUser: Glad to be here."
        );
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut session = started();
        session.record_response("first", Some("a"));
        session.record_response("second", Some("a"));
        let json = serde_json::to_value(session.snapshot()).unwrap();
        assert_eq!(json["currentTopicId"], "a");
        assert_eq!(json["engagementMetrics"]["score"], 1.0);
        assert_eq!(json["topics"][0]["status"], "active");
        assert_eq!(json["topics"][0]["segueToNext"], "That brings us to the turning point.");
        assert_eq!(json["topicProgress"]["a"], 40);
        assert_eq!(json["topicProgress"]["b"], 0);
    }
}
