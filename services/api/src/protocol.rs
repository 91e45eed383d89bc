//! JSON messages exchanged over the `/ws` socket.

use podcast_core::Command;
use podcast_core::TranscriptEvent;
use podcast_core::engagement::{EngagementIndicator, engagement_indicator};
use podcast_core::orchestrator::SessionHandle;
use podcast_core::session_state::SessionSnapshot;
use podcast_core::topic::Topic;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Load the document's topics and open the first one.
    Start {
        topics: Vec<Topic>,
        #[serde(default)]
        namespace: Option<String>,
    },
    /// One transcribed utterance.
    Transcript {
        text: String,
        #[serde(default)]
        is_agent: bool,
        #[serde(default)]
        topic_id: Option<String>,
    },
    Reset,
    Snapshot,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Speak { text: String },
    TopicChanged { from: String, to: Option<String> },
    SessionComplete { message: String },
    Snapshot { snapshot: SessionSnapshot },
    /// Display label for the user utterance just received.
    Engagement { indicator: EngagementIndicator },
    Error { message: String },
}

impl From<Command> for ServerMessage {
    fn from(command: Command) -> Self {
        match command {
            Command::SpeakText(text) => ServerMessage::Speak { text },
            Command::TopicChanged { from, to } => ServerMessage::TopicChanged { from, to },
            Command::SessionComplete(message) => ServerMessage::SessionComplete { message },
        }
    }
}

/// Applies one raw client message to the session. Returns the direct reply,
/// if the message has one.
pub async fn handle_client_message(handle: &SessionHandle, raw: &str) -> Option<ServerMessage> {
    let message = match serde_json::from_str::<ClientMessage>(raw) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Rejected malformed client message: {}", e);
            return Some(ServerMessage::Error {
                message: format!("Malformed message: {e}"),
            });
        }
    };

    let result = match message {
        ClientMessage::Start { topics, namespace } => handle.start(topics, namespace).await,
        ClientMessage::Transcript {
            text,
            is_agent,
            topic_id,
        } => {
            let indicator = (!is_agent).then(|| engagement_indicator(&text));
            let event = TranscriptEvent {
                text,
                is_agent,
                topic_id,
            };
            match (handle.try_submit(event).await, indicator) {
                (Ok(()), Some(indicator)) => return Some(ServerMessage::Engagement { indicator }),
                (result, _) => result,
            }
        }
        ClientMessage::Reset => {
            handle.reset().await;
            Ok(())
        }
        ClientMessage::Snapshot => {
            return Some(ServerMessage::Snapshot {
                snapshot: handle.snapshot().await,
            });
        }
    };

    result.err().map(|e| ServerMessage::Error {
        message: format!("{e:#}"),
    })
}
