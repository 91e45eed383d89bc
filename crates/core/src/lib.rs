pub mod context;
pub mod engagement;
pub mod error;
pub mod heuristic_reviewer;
pub mod oracle;
pub mod orchestrator;
pub mod policy;
pub mod reviewer;
pub mod session_state;
pub mod topic;
pub mod topic_manager;

/// Commands the session actor issues to its runtime.
///
/// The core only decides what should happen next. Speaking, rendering and
/// transport are the runtime's job.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Speak the given text to the user.
    SpeakText(String),
    /// The active topic changed. `to` is `None` once every topic is covered.
    TopicChanged { from: String, to: Option<String> },
    /// The session is over, with a closing message to speak.
    SessionComplete(String),
}

/// One transcribed utterance fed into a session.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_agent: bool,
    /// Attributes the turn to a specific topic instead of the active one.
    pub topic_id: Option<String>,
}

impl TranscriptEvent {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_agent: false,
            topic_id: None,
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_agent: true,
            topic_id: None,
        }
    }

    pub fn for_topic(mut self, topic_id: impl Into<String>) -> Self {
        self.topic_id = Some(topic_id.into());
        self
    }
}
