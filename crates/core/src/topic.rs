use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicStatus {
    #[default]
    Pending,
    Active,
    Completed,
}

impl TopicStatus {
    /// Topics only ever move forward one step: pending -> active -> completed.
    pub fn can_advance_to(self, next: TopicStatus) -> bool {
        matches!(
            (self, next),
            (TopicStatus::Pending, TopicStatus::Active)
                | (TopicStatus::Active, TopicStatus::Completed)
        )
    }
}

impl fmt::Display for TopicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TopicStatus::Pending => "pending",
            TopicStatus::Active => "active",
            TopicStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// A unit of discussion extracted from the uploaded document.
///
/// Both `segueToNext` and the snake_case `segue_to_next` spelling are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: TopicStatus,
    pub questions: Vec<String>,
    #[serde(default)]
    pub excerpts: Vec<String>,
    #[serde(default, alias = "segue_to_next")]
    pub segue_to_next: String,
    #[serde(default, alias = "discussion_length")]
    pub discussion_length: u32,
}

impl Topic {
    pub fn new(id: impl Into<String>, title: impl Into<String>, questions: Vec<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: TopicStatus::Pending,
            questions,
            excerpts: Vec::new(),
            segue_to_next: String::new(),
            discussion_length: 0,
        }
    }

    pub fn with_segue(mut self, segue: impl Into<String>) -> Self {
        self.segue_to_next = segue.into();
        self
    }

    /// The highest-priority scripted question. Never empty once inside a `TopicList`.
    pub fn first_question(&self) -> &str {
        self.questions.first().map(String::as_str).unwrap_or_default()
    }
}

/// Ordered, id-indexed topic collection.
///
/// All status changes go through this type so the single-active and
/// forward-only invariants are checked before anything is mutated.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct TopicList {
    topics: Vec<Topic>,
}

impl TopicList {
    pub fn new(topics: Vec<Topic>) -> Result<Self, CoreError> {
        let mut seen = HashSet::new();
        let mut active = None::<&str>;
        for topic in &topics {
            if !seen.insert(topic.id.as_str()) {
                return Err(CoreError::DuplicateTopicId(topic.id.clone()));
            }
            if topic.questions.iter().all(|q| q.trim().is_empty()) {
                return Err(CoreError::TopicWithoutQuestions(topic.id.clone()));
            }
            if topic.status == TopicStatus::Active {
                if let Some(existing) = active {
                    return Err(CoreError::TopicAlreadyActive {
                        active: existing.to_string(),
                        requested: topic.id.clone(),
                    });
                }
                active = Some(topic.id.as_str());
            }
        }
        Ok(Self { topics })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Topic> {
        self.topics.iter()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.topics.iter().position(|t| t.id == id)
    }

    pub fn active(&self) -> Option<&Topic> {
        self.topics
            .iter()
            .find(|t| t.status == TopicStatus::Active)
    }

    /// The structurally next topic in document order, if any.
    pub fn next_after(&self, id: &str) -> Option<&Topic> {
        self.position(id).and_then(|idx| self.topics.get(idx + 1))
    }

    pub fn count_with_status(&self, status: TopicStatus) -> usize {
        self.topics.iter().filter(|t| t.status == status).count()
    }

    fn index_of(&self, id: &str) -> Result<usize, CoreError> {
        self.position(id)
            .ok_or_else(|| CoreError::UnknownTopic(id.to_string()))
    }

    fn check_step(&self, idx: usize, to: TopicStatus) -> Result<(), CoreError> {
        let topic = &self.topics[idx];
        if !topic.status.can_advance_to(to) {
            return Err(CoreError::InvalidStatusTransition {
                id: topic.id.clone(),
                from: topic.status,
                to,
            });
        }
        Ok(())
    }

    /// Activates a pending topic. Re-activating the active topic is a no-op.
    pub fn activate(&mut self, id: &str) -> Result<(), CoreError> {
        let idx = self.index_of(id)?;
        if self.topics[idx].status == TopicStatus::Active {
            return Ok(());
        }
        if let Some(active) = self.active() {
            return Err(CoreError::TopicAlreadyActive {
                active: active.id.clone(),
                requested: id.to_string(),
            });
        }
        self.check_step(idx, TopicStatus::Active)?;
        self.topics[idx].status = TopicStatus::Active;
        Ok(())
    }

    pub fn complete(&mut self, id: &str) -> Result<(), CoreError> {
        let idx = self.index_of(id)?;
        self.check_step(idx, TopicStatus::Completed)?;
        self.topics[idx].status = TopicStatus::Completed;
        Ok(())
    }

    pub fn set_status(&mut self, id: &str, status: TopicStatus) -> Result<(), CoreError> {
        match status {
            TopicStatus::Active => self.activate(id),
            TopicStatus::Completed => self.complete(id),
            TopicStatus::Pending => {
                let idx = self.index_of(id)?;
                if self.topics[idx].status == TopicStatus::Pending {
                    Ok(())
                } else {
                    self.check_step(idx, TopicStatus::Pending)
                }
            }
        }
    }

    /// Completes `current` and activates `next` as one step.
    ///
    /// Both moves are validated before either is applied, so a failed call
    /// leaves the list untouched.
    pub fn advance(&mut self, current: &str, next: Option<&str>) -> Result<(), CoreError> {
        let cur = self.index_of(current)?;
        if self.topics[cur].status != TopicStatus::Active {
            return Err(CoreError::NotActive(current.to_string()));
        }
        let nxt = match next {
            Some(id) => {
                let idx = self.index_of(id)?;
                self.check_step(idx, TopicStatus::Active)?;
                Some(idx)
            }
            None => None,
        };

        self.topics[cur].status = TopicStatus::Completed;
        if let Some(idx) = nxt {
            self.topics[idx].status = TopicStatus::Active;
        }
        Ok(())
    }

    /// Counts a user turn against the topic. Returns false when the topic is
    /// not active, in which case its discussion length stays frozen.
    pub(crate) fn record_turn(&mut self, id: &str) -> bool {
        match self.topics.iter_mut().find(|t| t.id == id) {
            Some(topic) if topic.status == TopicStatus::Active => {
                topic.discussion_length += 1;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_topics() -> Vec<Topic> {
    vec![
        Topic::new("a", "Origins", vec!["How did it start?".to_string()])
            .with_segue("That brings us to the turning point."),
        Topic::new("b", "Turning point", vec!["What changed?".to_string()]),
        Topic::new("c", "Legacy", vec!["What remains today?".to_string()]),
    ]
}
