//! The per-session actor.
//!
//! Transcript events are processed one at a time by a [`TurnProcessor`]
//! running on its own task. Session state sits behind a shared mutex that is
//! only held for synchronous mutations, never across an oracle call, so a
//! [`SessionHandle`] can reset or inspect the session while a turn is in
//! flight. Every write after an oracle call is checked against the session
//! generation the turn started under, and queued events carry the generation
//! they were submitted under so a reset also drops the backlog.

use crate::context::{QuestionType, analyze_response, next_question_strategy};
use crate::engagement::EngagementScorer;
use crate::oracle;
use crate::policy::{OracleTimeout, SessionPolicy, StrategyPolicy};
use crate::reviewer::Reviewer;
use crate::session_state::{PodcastSession, SessionSnapshot};
use crate::topic::{Topic, TopicStatus};
use crate::topic_manager::{TopicManager, TransitionDecision};
use crate::{Command, TranscriptEvent};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

const EVENT_BUFFER: usize = 32;
const COMMAND_BUFFER: usize = 32;

/// Spoken when every topic is covered and no summary could be produced.
pub const CLOSING_MESSAGE: &str =
    "That wraps up everything we planned to cover. Thanks for joining the conversation!";

/// A transcript event waiting for the actor, stamped with the session
/// generation it was submitted under.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEvent {
    pub event: TranscriptEvent,
    pub generation: u64,
}

/// What a single transcript event led to.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Ignored,
    AgentRecorded,
    /// Recorded, but no topic was active so nothing was decided.
    Unattributed,
    /// The session was reset or reloaded after the event was queued or
    /// while the turn was in flight.
    Stale,
    Continued(QuestionType),
    Transitioned { from: String, to: String },
    Finished,
}

pub struct TurnProcessor<R: Reviewer + ?Sized> {
    state: Arc<Mutex<PodcastSession>>,
    reviewer: Arc<R>,
    scorer: EngagementScorer,
    manager: TopicManager,
    strategy: StrategyPolicy,
    timeout: OracleTimeout,
    commands: mpsc::Sender<Command>,
}

fn transition_speech(lead: &str, next: &Topic) -> String {
    let lead = lead.trim();
    if lead.is_empty() {
        next.first_question().to_string()
    } else {
        format!("{lead} {}", next.first_question())
    }
}

impl<R: Reviewer + ?Sized> TurnProcessor<R> {
    pub fn new(
        state: Arc<Mutex<PodcastSession>>,
        reviewer: Arc<R>,
        policy: &SessionPolicy,
        commands: mpsc::Sender<Command>,
    ) -> Self {
        Self {
            state,
            reviewer,
            scorer: EngagementScorer::new(policy.engagement.clone(), policy.oracle_timeout),
            manager: TopicManager::new(policy.transition.clone(), policy.oracle_timeout),
            strategy: policy.strategy.clone(),
            timeout: policy.oracle_timeout,
            commands,
        }
    }

    /// Consumes transcript events until every sender is gone.
    pub async fn run(self, mut events: mpsc::Receiver<QueuedEvent>) {
        while let Some(queued) = events.recv().await {
            match self.process_queued(queued).await {
                Ok(outcome) => tracing::debug!(?outcome, "Turn processed"),
                Err(e) => tracing::error!("Failed to process transcript event: {:#}", e),
            }
        }
        tracing::info!("Transcript stream closed, session actor stopping");
    }

    /// Processes an event against whatever session is current.
    pub async fn process(&self, event: TranscriptEvent) -> Result<TurnOutcome> {
        self.handle(event, None).await
    }

    /// Processes an event only if the session has not been reset or
    /// reloaded since it was submitted.
    pub async fn process_queued(&self, queued: QueuedEvent) -> Result<TurnOutcome> {
        self.handle(queued.event, Some(queued.generation)).await
    }

    async fn handle(&self, event: TranscriptEvent, submitted: Option<u64>) -> Result<TurnOutcome> {
        let text = event.text.trim();
        if text.is_empty() {
            return Ok(TurnOutcome::Ignored);
        }
        if event.is_agent {
            let mut state = self.state.lock().await;
            if submitted.is_some_and(|g| !state.is_current(g)) {
                return Ok(TurnOutcome::Stale);
            }
            state.record_agent_utterance(text);
            return Ok(TurnOutcome::AgentRecorded);
        }
        self.user_turn(text, event.topic_id.as_deref(), submitted).await
    }

    /// Runs `apply` against the session only if it is still on `generation`.
    async fn guarded<T>(&self, generation: u64, apply: impl FnOnce(&mut PodcastSession) -> T) -> Option<T> {
        let mut state = self.state.lock().await;
        if !state.is_current(generation) {
            tracing::info!(
                started = generation,
                current = state.generation(),
                "Discarding result for a stale session"
            );
            return None;
        }
        Some(apply(&mut *state))
    }

    async fn send(&self, command: Command) {
        if let Err(e) = self.commands.send(command).await {
            tracing::error!("Failed to send command to runtime: {}", e);
        }
    }

    async fn user_turn(
        &self,
        text: &str,
        topic_hint: Option<&str>,
        submitted: Option<u64>,
    ) -> Result<TurnOutcome> {
        let (generation, topic, insight_topic, window, context) = {
            let mut state = self.state.lock().await;
            if submitted.is_some_and(|g| !state.is_current(g)) {
                tracing::info!(
                    submitted = ?submitted,
                    current = state.generation(),
                    "Dropping transcript queued before a reset"
                );
                return Ok(TurnOutcome::Stale);
            }
            let current = state.current_topic().cloned();
            let attributed = topic_hint
                .filter(|id| state.topics().get(id).is_some())
                .map(str::to_string)
                .or_else(|| current.as_ref().map(|t| t.id.clone()));
            state.record_response(text, attributed.as_deref());

            let Some(topic) = current else {
                tracing::info!("No active topic, response recorded without a decision");
                return Ok(TurnOutcome::Unattributed);
            };
            let insight_topic = attributed.unwrap_or_else(|| topic.id.clone());
            (
                state.generation(),
                topic,
                insight_topic,
                state.response_window(),
                state.conversation().context().clone(),
            )
        };

        // --- Engagement ---
        let engagement = self
            .scorer
            .score(self.reviewer.as_ref(), &window, &topic.title)
            .await?;
        let Some(score) = self
            .guarded(generation, |s| {
                s.update_engagement_score(engagement.score);
                s.metrics().score
            })
            .await
        else {
            return Ok(TurnOutcome::Stale);
        };

        // --- Insights ---
        let analysis =
            analyze_response(self.reviewer.as_ref(), self.timeout, text, &topic, &context).await;
        let refreshed = self
            .guarded(generation, |s| {
                if let Some(analysis) = analysis {
                    s.apply_response_analysis(&insight_topic, analysis);
                }
                let current = s.topics().get(&topic.id).cloned()?;
                Some((
                    current,
                    s.topics().clone(),
                    s.conversation().context().clone(),
                    s.revisits(&topic.id),
                ))
            })
            .await
            .flatten();
        let Some((current, topics, context, revisits)) = refreshed else {
            return Ok(TurnOutcome::Stale);
        };

        // --- Transition ---
        let decision = self
            .manager
            .evaluate_transition(
                self.reviewer.as_ref(),
                &current,
                &topics,
                &context,
                score,
                current.discussion_length,
                revisits,
            )
            .await;

        if decision.should_transition {
            self.transition(generation, &current, &decision).await
        } else {
            self.continue_topic(generation, &current, score).await
        }
    }

    async fn transition(
        &self,
        generation: u64,
        current: &Topic,
        decision: &TransitionDecision,
    ) -> Result<TurnOutcome> {
        let lead = decision
            .strategy
            .clone()
            .unwrap_or_else(|| current.segue_to_next.clone());
        let committed = self
            .guarded(generation, |s| {
                let outcome = s.commit_transition(&current.id, decision)?;
                let speech = outcome.activated.as_ref().map(|next| {
                    let speech = transition_speech(&lead, next);
                    s.record_agent_utterance(&speech);
                    s.record_question_type(QuestionType::Initial);
                    (next.id.clone(), speech)
                });
                Ok::<_, crate::error::CoreError>(speech)
            })
            .await;

        match committed {
            None => Ok(TurnOutcome::Stale),
            Some(Err(e)) => Err(e).context("Failed to commit topic transition"),
            Some(Ok(Some((next_id, speech)))) => {
                self.send(Command::TopicChanged {
                    from: current.id.clone(),
                    to: Some(next_id.clone()),
                })
                .await;
                self.send(Command::SpeakText(speech)).await;
                Ok(TurnOutcome::Transitioned {
                    from: current.id.clone(),
                    to: next_id,
                })
            }
            Some(Ok(None)) => self.finish(generation, current).await,
        }
    }

    async fn finish(&self, generation: u64, last: &Topic) -> Result<TurnOutcome> {
        let Some(transcript) = self.guarded(generation, |s| s.full_transcript()).await else {
            return Ok(TurnOutcome::Stale);
        };

        let message = oracle::consult(
            "session-summary",
            self.timeout,
            self.reviewer.summarize_session(&transcript),
        )
        .await
        .ok()
        .map_or_else(|| CLOSING_MESSAGE.to_string(), |summary| summary.to_spoken());

        if self
            .guarded(generation, |s| s.record_agent_utterance(&message))
            .await
            .is_none()
        {
            return Ok(TurnOutcome::Stale);
        }

        tracing::info!(last_topic = %last.id, "All topics covered, session complete");
        self.send(Command::TopicChanged {
            from: last.id.clone(),
            to: None,
        })
        .await;
        self.send(Command::SessionComplete(message)).await;
        Ok(TurnOutcome::Finished)
    }

    async fn continue_topic(&self, generation: u64, current: &Topic, score: f64) -> Result<TurnOutcome> {
        let Some((strategy, context)) = self
            .guarded(generation, |s| {
                let context = s.conversation().context().clone();
                let insights = s.conversation().insights_for(&current.id);
                let strategy = next_question_strategy(current, insights, &context, score, &self.strategy);
                (strategy, context)
            })
            .await
        else {
            return Ok(TurnOutcome::Stale);
        };

        // The scripted opener was already asked when the topic started, so
        // ask the question oracle for something new instead.
        let (kind, question) = match strategy.kind {
            QuestionType::Initial => {
                let question = self
                    .manager
                    .suggest_follow_up_question(
                        self.reviewer.as_ref(),
                        current,
                        &context,
                        context.current_depth,
                    )
                    .await;
                let kind = if question == current.first_question() {
                    QuestionType::Initial
                } else {
                    QuestionType::Followup
                };
                (kind, question)
            }
            kind => (kind, strategy.suggestion),
        };

        if self
            .guarded(generation, |s| {
                s.record_question_type(kind);
                s.record_agent_utterance(&question);
            })
            .await
            .is_none()
        {
            return Ok(TurnOutcome::Stale);
        }

        self.send(Command::SpeakText(question)).await;
        Ok(TurnOutcome::Continued(kind))
    }
}

/// The runtime's grip on one session actor.
///
/// Transcript events are queued for the actor. `start`, `reset` and
/// `snapshot` act on the shared state directly, so they take effect even
/// while a turn is waiting on an oracle.
#[derive(Clone)]
pub struct SessionHandle {
    state: Arc<Mutex<PodcastSession>>,
    events: mpsc::Sender<QueuedEvent>,
    commands: mpsc::Sender<Command>,
}

impl SessionHandle {
    async fn stamp(&self, event: TranscriptEvent) -> QueuedEvent {
        QueuedEvent {
            event,
            generation: self.state.lock().await.generation(),
        }
    }

    /// Queues an event, waiting for room if the actor is behind.
    pub async fn submit(&self, event: TranscriptEvent) -> Result<()> {
        let queued = self.stamp(event).await;
        self.events
            .send(queued)
            .await
            .context("Session actor has stopped")
    }

    /// Queues an event without waiting. Fails when the queue is full.
    pub async fn try_submit(&self, event: TranscriptEvent) -> Result<()> {
        let queued = self.stamp(event).await;
        match self.events.try_send(queued) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(anyhow::anyhow!("Session is busy, transcript dropped"))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(anyhow::anyhow!("Session actor has stopped"))
            }
        }
    }

    /// Loads the document's topics, opens the first one and asks its first
    /// scripted question.
    pub async fn start(&self, topics: Vec<Topic>, namespace: Option<String>) -> Result<()> {
        let opener = {
            let mut state = self.state.lock().await;
            state.set_topics(topics)?;
            if let Some(namespace) = namespace {
                state.set_document_namespace(namespace);
            }
            let first = state
                .topics()
                .active()
                .or_else(|| {
                    state
                        .topics()
                        .iter()
                        .find(|t| t.status == TopicStatus::Pending)
                })
                .cloned()
                .context("Document has no topics left to discuss")?;
            state.set_current_topic(&first.id)?;
            state.record_question_type(QuestionType::Initial);
            let opener = first.first_question().to_string();
            state.record_agent_utterance(&opener);
            tracing::info!(topic = %first.id, "Session started");
            opener
        };

        self.commands
            .send(Command::SpeakText(opener))
            .await
            .context("Runtime stopped listening for commands")
    }

    pub async fn reset(&self) {
        self.state.lock().await.reset();
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn transcript(&self) -> String {
        self.state.lock().await.full_transcript()
    }
}

/// Starts a session actor on the current runtime.
///
/// Returns the handle, the stream of commands for the runtime to carry out,
/// and the actor's task. The actor stops once every handle is dropped.
pub fn spawn_session<R>(
    reviewer: Arc<R>,
    policy: SessionPolicy,
) -> (SessionHandle, mpsc::Receiver<Command>, JoinHandle<()>)
where
    R: Reviewer + ?Sized + 'static,
{
    let state = Arc::new(Mutex::new(
        PodcastSession::new().with_score_bounds(policy.engagement.floor, policy.engagement.ceiling),
    ));
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);

    let processor = TurnProcessor::new(state.clone(), reviewer, &policy, command_tx.clone());
    let task = tokio::spawn(processor.run(event_rx));

    let handle = SessionHandle {
        state,
        events: event_tx,
        commands: command_tx,
    };
    (handle, command_rx, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reviewer::{
        EngagementAnalysis, EngagementQuality, MockReviewer, QuestionSuggestion, ResponseAnalysis,
        SessionSummary,
    };
    use crate::topic::sample_topics;
    use std::collections::BTreeMap;

    fn engagement(score: f64) -> EngagementAnalysis {
        EngagementAnalysis {
            score,
            metrics: EngagementQuality {
                depth: 1.0,
                relevance: 0.5,
                complexity: 0.2,
            },
            patterns: BTreeMap::new(),
            recommendation: "Try a personal angle".to_string(),
        }
    }

    fn started_state() -> Arc<Mutex<PodcastSession>> {
        let mut session = PodcastSession::new();
        session.set_topics(sample_topics()).unwrap();
        session.set_current_topic("a").unwrap();
        Arc::new(Mutex::new(session))
    }

    fn processor(
        state: Arc<Mutex<PodcastSession>>,
        reviewer: MockReviewer,
    ) -> (TurnProcessor<MockReviewer>, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(16);
        let processor = TurnProcessor::new(state, Arc::new(reviewer), &SessionPolicy::default(), tx);
        (processor, rx)
    }

    #[tokio::test]
    async fn test_low_engagement_clarifies_then_transitions() {
        // --- 1. Arrange ---
        let mut mock_reviewer = MockReviewer::new();
        mock_reviewer
            .expect_analyze_engagement()
            .returning(|_, _| Ok(engagement(0.0)));
        mock_reviewer
            .expect_analyze_response()
            .returning(|_, _| Err(anyhow::anyhow!("service unavailable")));
        mock_reviewer
            .expect_suggest_topics()
            .returning(|_, _, _| Err(anyhow::anyhow!("service unavailable")))
            .once();
        mock_reviewer.expect_suggest_question().never();

        let state = started_state();
        let (processor, mut rx) = processor(state.clone(), mock_reviewer);

        // --- 2. Act & Assert ---
        for _ in 0..5 {
            let outcome = processor.process(TranscriptEvent::user("no")).await.unwrap();
            assert_eq!(outcome, TurnOutcome::Continued(QuestionType::Clarification));
            assert_eq!(
                rx.try_recv().unwrap(),
                Command::SpeakText("Could you elaborate on that point?".to_string())
            );
        }

        let outcome = processor.process(TranscriptEvent::user("no")).await.unwrap();
        assert_eq!(
            outcome,
            TurnOutcome::Transitioned {
                from: "a".to_string(),
                to: "b".to_string()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Command::TopicChanged {
                from: "a".to_string(),
                to: Some("b".to_string())
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Command::SpeakText("That brings us to the turning point. What changed?".to_string())
        );

        let session = state.lock().await;
        assert!(session.metrics().score < 0.3);
        assert_eq!(session.current_topic_id(), Some("b"));
        assert_eq!(session.topics().count_with_status(TopicStatus::Active), 1);
        assert_eq!(
            session.conversation().context().topic_history,
            vec!["a".to_string()]
        );
    }

    #[tokio::test]
    async fn test_reset_during_oracle_call_discards_result() {
        // --- 1. Arrange ---
        let state = started_state();
        let state_for_mock = state.clone();

        let mut mock_reviewer = MockReviewer::new();
        mock_reviewer
            .expect_analyze_engagement()
            .returning(move |_, _| {
                // The runtime resets the session while the oracle is thinking.
                state_for_mock.try_lock().unwrap().reset();
                Ok(engagement(0.1))
            });
        mock_reviewer.expect_analyze_response().never();
        mock_reviewer.expect_suggest_topics().never();

        let (processor, mut rx) = processor(state.clone(), mock_reviewer);

        // --- 2. Act ---
        let outcome = processor
            .process(TranscriptEvent::user("I'm not sure this is interesting"))
            .await
            .unwrap();

        // --- 3. Assert ---
        assert_eq!(outcome, TurnOutcome::Stale);
        assert!(rx.try_recv().is_err());
        let session = state.lock().await;
        assert_eq!(session.metrics().score, 1.0);
        assert!(session.metrics().response_lengths.is_empty());
        assert!(session.topics().is_empty());
    }

    #[tokio::test]
    async fn test_user_interest_drives_follow_up() {
        let mut mock_reviewer = MockReviewer::new();
        mock_reviewer
            .expect_analyze_engagement()
            .returning(|_, _| Ok(engagement(0.9)));
        mock_reviewer.expect_analyze_response().returning(|_, _| {
            Ok(ResponseAnalysis {
                keywords: vec!["workshops".to_string()],
                depth: 1.0,
                key_points: vec![],
                relevant_quotes: vec![],
                user_interests: vec!["the guilds".to_string()],
                uncovered_aspects: vec![],
            })
        });
        mock_reviewer.expect_suggest_question().never();

        let state = started_state();
        let (processor, mut rx) = processor(state.clone(), mock_reviewer);

        let outcome = processor
            .process(TranscriptEvent::user(
                "It began in small workshops, and honestly the guilds fascinate me.",
            ))
            .await
            .unwrap();

        assert_eq!(outcome, TurnOutcome::Continued(QuestionType::Followup));
        assert_eq!(
            rx.try_recv().unwrap(),
            Command::SpeakText("You mentioned the guilds. Can you tell me more about that?".to_string())
        );
        let session = state.lock().await;
        assert_eq!(session.conversation().topic_depth("a"), 1);
        assert_eq!(
            session.conversation().context().last_question_type,
            Some(QuestionType::Followup)
        );
    }

    #[tokio::test]
    async fn test_engaged_without_insights_asks_question_oracle() {
        let mut mock_reviewer = MockReviewer::new();
        mock_reviewer
            .expect_analyze_engagement()
            .returning(|_, _| Ok(engagement(1.0)));
        mock_reviewer
            .expect_analyze_response()
            .returning(|_, _| Err(anyhow::anyhow!("malformed payload")));
        mock_reviewer
            .expect_suggest_question()
            .withf(|topic, _, _| topic.id == "a")
            .returning(|_, _, _| {
                Ok(QuestionSuggestion {
                    question: "Who paid for the first presses?".to_string(),
                    kind: QuestionType::Followup,
                    rationale: "money shapes history".to_string(),
                })
            })
            .once();

        let (processor, mut rx) = processor(started_state(), mock_reviewer);
        let outcome = processor
            .process(TranscriptEvent::user(
                "It started with a goldsmith who needed a faster way to make indulgences.",
            ))
            .await
            .unwrap();

        assert_eq!(outcome, TurnOutcome::Continued(QuestionType::Followup));
        assert_eq!(
            rx.try_recv().unwrap(),
            Command::SpeakText("Who paid for the first presses?".to_string())
        );
    }

    #[tokio::test]
    async fn test_last_topic_ends_session_with_summary() {
        // --- 1. Arrange ---
        let mut session = PodcastSession::new();
        session
            .set_topics(vec![Topic::new(
                "solo",
                "The only topic",
                vec!["What stood out?".to_string()],
            )])
            .unwrap();
        session.set_current_topic("solo").unwrap();
        for _ in 0..6 {
            session.record_response("no", Some("solo"));
        }
        let state = Arc::new(Mutex::new(session));

        let mut mock_reviewer = MockReviewer::new();
        mock_reviewer
            .expect_analyze_engagement()
            .returning(|_, _| Ok(engagement(0.0)));
        mock_reviewer
            .expect_analyze_response()
            .returning(|_, _| Err(anyhow::anyhow!("timeout")));
        mock_reviewer
            .expect_suggest_topics()
            .returning(|_, _, _| Err(anyhow::anyhow!("timeout")));
        mock_reviewer
            .expect_summarize_session()
            .withf(|transcript| transcript.starts_with("User: no"))
            .returning(|_| {
                Ok(SessionSummary {
                    main_points: vec!["not much".to_string()],
                    key_takeaways: vec![],
                    overall_engagement: 0.1,
                })
            })
            .once();

        let (processor, mut rx) = processor(state.clone(), mock_reviewer);

        // --- 2. Act ---
        let outcome = processor.process(TranscriptEvent::user("no")).await.unwrap();

        // --- 3. Assert ---
        assert_eq!(outcome, TurnOutcome::Finished);
        assert_eq!(
            rx.try_recv().unwrap(),
            Command::TopicChanged {
                from: "solo".to_string(),
                to: None
            }
        );
        match rx.try_recv().unwrap() {
            Command::SessionComplete(message) => assert!(message.contains("We talked about not much.")),
            other => panic!("expected SessionComplete, got {other:?}"),
        }

        let session = state.lock().await;
        assert_eq!(session.topics().count_with_status(TopicStatus::Active), 0);
        assert!(session.current_topic_id().is_none());
        assert_eq!(session.conversation().context().topic_history.len(), 1);

        drop(session);
        let outcome = processor.process(TranscriptEvent::user("hello?")).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Unattributed);
    }

    #[tokio::test]
    async fn test_failed_summary_uses_closing_message() {
        let mut session = PodcastSession::new();
        session.set_topics(sample_topics()).unwrap();
        session.set_current_topic("a").unwrap();
        let state = Arc::new(Mutex::new(session));

        let mut mock_reviewer = MockReviewer::new();
        mock_reviewer.expect_summarize_session().returning(|_| Err(anyhow::anyhow!("offline")));
        let (processor, mut rx) = processor(state.clone(), mock_reviewer);

        let last = state.lock().await.topics().get("a").cloned().unwrap();
        state
            .lock()
            .await
            .commit_transition("a", &TransitionDecision::default())
            .unwrap();
        let generation = state.lock().await.generation();
        let outcome = processor.finish(generation, &last).await.unwrap();

        assert_eq!(outcome, TurnOutcome::Finished);
        rx.try_recv().unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Command::SessionComplete(CLOSING_MESSAGE.to_string())
        );
    }

    #[tokio::test]
    async fn test_agent_and_blank_events_skip_the_oracles() {
        let state = started_state();
        let (processor, mut rx) = processor(state.clone(), MockReviewer::new());

        let outcome = processor
            .process(TranscriptEvent::agent("Welcome back to the show."))
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::AgentRecorded);
        let outcome = processor.process(TranscriptEvent::user("   ")).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Ignored);

        assert!(rx.try_recv().is_err());
        let session = state.lock().await;
        assert_eq!(session.full_transcript(), "AI: Welcome back to the show.");
        assert!(session.metrics().response_lengths.is_empty());
    }

    #[tokio::test]
    async fn test_handle_start_and_reset() {
        let (handle, mut commands, _task) =
            spawn_session(Arc::new(MockReviewer::new()), SessionPolicy::default());

        handle
            .start(sample_topics(), Some("podcast_42".to_string()))
            .await
            .unwrap();
        assert_eq!(
            commands.recv().await.unwrap(),
            Command::SpeakText("How did it start?".to_string())
        );

        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.current_topic_id.as_deref(), Some("a"));
        assert_eq!(snapshot.document_namespace.as_deref(), Some("podcast_42"));
        assert_eq!(
            snapshot.context.last_question_type,
            Some(QuestionType::Initial)
        );
        assert_eq!(handle.transcript().await, "AI: How did it start?");

        handle.reset().await;
        let snapshot = handle.snapshot().await;
        assert!(snapshot.topics.is_empty());
        assert!(snapshot.document_namespace.is_none());
        assert_eq!(snapshot.engagement_metrics.score, 1.0);
        assert_eq!(snapshot.generation, 2);

        let err = handle.start(Vec::new(), None).await.unwrap_err();
        assert!(err.to_string().contains("no topics"));
    }

    #[tokio::test]
    async fn test_events_queued_before_reset_are_dropped() {
        // --- 1. Arrange ---
        let state = started_state();
        let (event_tx, mut event_rx) = mpsc::channel(4);
        let (command_tx, _command_rx) = mpsc::channel(4);
        let handle = SessionHandle {
            state: state.clone(),
            events: event_tx,
            commands: command_tx.clone(),
        };

        let mut mock_reviewer = MockReviewer::new();
        mock_reviewer.expect_analyze_engagement().never();
        mock_reviewer.expect_analyze_response().never();
        let processor = TurnProcessor::new(
            state.clone(),
            Arc::new(mock_reviewer),
            &SessionPolicy::default(),
            command_tx,
        );

        handle
            .submit(TranscriptEvent::user("This was queued before the reset"))
            .await
            .unwrap();
        handle
            .submit(TranscriptEvent::agent("So was this"))
            .await
            .unwrap();

        // --- 2. Act ---
        handle.reset().await;
        let user = processor.process_queued(event_rx.recv().await.unwrap()).await.unwrap();
        let agent = processor.process_queued(event_rx.recv().await.unwrap()).await.unwrap();

        // --- 3. Assert ---
        assert_eq!(user, TurnOutcome::Stale);
        assert_eq!(agent, TurnOutcome::Stale);
        let session = state.lock().await;
        assert!(session.metrics().response_lengths.is_empty());
        assert!(session.metrics().last_responses.is_empty());
        assert!(session.metrics().topic_repetitions.is_empty());
        assert!(session.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_events_queued_before_start_do_not_count_for_new_topics() {
        let state = Arc::new(Mutex::new(PodcastSession::new()));
        let (event_tx, mut event_rx) = mpsc::channel(4);
        let (command_tx, mut command_rx) = mpsc::channel(4);
        let handle = SessionHandle {
            state: state.clone(),
            events: event_tx,
            commands: command_tx.clone(),
        };
        let processor = TurnProcessor::new(
            state.clone(),
            Arc::new(MockReviewer::new()),
            &SessionPolicy::default(),
            command_tx,
        );

        handle.submit(TranscriptEvent::user("early words")).await.unwrap();
        handle.start(sample_topics(), None).await.unwrap();
        command_rx.recv().await.unwrap();

        let outcome = processor.process_queued(event_rx.recv().await.unwrap()).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Stale);
        let session = state.lock().await;
        assert_eq!(session.topics().get("a").unwrap().discussion_length, 0);
        assert_eq!(session.repetitions("a"), 0);
    }

    #[tokio::test]
    async fn test_try_submit_reports_a_full_queue() {
        let (event_tx, _event_rx) = mpsc::channel(1);
        let (command_tx, _command_rx) = mpsc::channel(1);
        let handle = SessionHandle {
            state: started_state(),
            events: event_tx,
            commands: command_tx,
        };

        handle.try_submit(TranscriptEvent::user("first")).await.unwrap();
        let err = handle.try_submit(TranscriptEvent::user("second")).await.unwrap_err();
        assert!(err.to_string().contains("busy"));

        // Reset still goes straight to the state.
        handle.reset().await;
        assert!(handle.snapshot().await.topics.is_empty());
    }
}
