//! Error types for the orchestration core.
//!
//! Only contract and invariant violations surface as `CoreError`. Oracle
//! failures never do: they are turned into `OracleOutcome::Failure` at the
//! boundary and replaced by documented defaults.

use crate::topic::TopicStatus;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("response window is empty")]
    EmptyResponses,
    #[error("topic {0} has no questions")]
    TopicWithoutQuestions(String),
    #[error("duplicate topic id: {0}")]
    DuplicateTopicId(String),
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    #[error("topic {active} is already active, cannot activate {requested}")]
    TopicAlreadyActive { active: String, requested: String },
    #[error("topic {id} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        id: String,
        from: TopicStatus,
        to: TopicStatus,
    },
    #[error("topic {0} is not the active topic")]
    NotActive(String),
}
