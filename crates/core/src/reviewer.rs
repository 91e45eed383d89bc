use crate::context::{ConversationContext, QuestionType};
use crate::topic::Topic;
use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Prompt template names, one Markdown file each in the prompts directory.
pub const PROMPT_KEYS: [&str; 5] = [
    "analyze_engagement",
    "analyze_response",
    "suggest_topics",
    "suggest_question",
    "summarize_session",
];

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub content: String,
}

// --- Oracle payloads ---
//
// Every field without `#[serde(default)]` is required. A payload that omits
// one fails to deserialize and is treated as an oracle failure, never as an
// empty or zero value.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementQuality {
    pub depth: f64,
    pub relevance: f64,
    pub complexity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementAnalysis {
    pub score: f64,
    pub metrics: EngagementQuality,
    pub patterns: BTreeMap<String, bool>,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseAnalysis {
    pub keywords: Vec<String>,
    pub depth: f64,
    pub key_points: Vec<String>,
    pub relevant_quotes: Vec<String>,
    pub user_interests: Vec<String>,
    #[serde(default)]
    pub uncovered_aspects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSuggestion {
    pub transition_strategy: String,
    pub suggested_topics: Vec<String>,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSuggestion {
    pub question: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub main_points: Vec<String>,
    pub key_takeaways: Vec<String>,
    pub overall_engagement: f64,
}

impl SessionSummary {
    /// Renders the summary as something the host can say out loud.
    pub fn to_spoken(&self) -> String {
        let mut out = String::from("That wraps up everything we planned to cover.");
        if !self.main_points.is_empty() {
            out.push_str(" We talked about ");
            out.push_str(&self.main_points.join("; "));
            out.push('.');
        }
        if !self.key_takeaways.is_empty() {
            out.push_str(" Key takeaways: ");
            out.push_str(&self.key_takeaways.join("; "));
            out.push('.');
        }
        out
    }
}

/// Parses an oracle's JSON message body into its typed payload.
pub fn parse_payload<T: DeserializeOwned>(content: &str) -> Result<T> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str(trimmed)
        .with_context(|| format!("Malformed oracle payload: {}", content))
}

// The `Reviewer` trait is the single seam to the generative analysis service.
// The session logic depends only on this trait, so tests can drive it with
// `MockReviewer` and the runtimes can pick a provider at startup.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Reviewer: Send + Sync {
    /// Judges engagement over the last few user utterances.
    async fn analyze_engagement(
        &self,
        responses: &[String],
        topic_label: &str,
    ) -> Result<EngagementAnalysis>;

    async fn analyze_response(
        &self,
        response: &str,
        context: &ConversationContext,
    ) -> Result<ResponseAnalysis>;

    async fn suggest_topics(
        &self,
        topic: &Topic,
        context: &ConversationContext,
        engagement_score: f64,
    ) -> Result<TopicSuggestion>;

    async fn suggest_question(
        &self,
        topic: &Topic,
        context: &ConversationContext,
        depth: u32,
    ) -> Result<QuestionSuggestion>;

    async fn summarize_session(&self, transcript: &str) -> Result<SessionSummary>;
}

pub struct ReviewerClient {
    client: Client,
    api_key: String,
    model: String,
    prompts: HashMap<String, String>,
}

impl ReviewerClient {
    pub fn new(api_key: String, model: String, prompts: HashMap<String, String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            prompts,
        }
    }

    fn prompt(&self, key: &str) -> Result<&str> {
        self.prompts
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| anyhow::anyhow!("Missing prompt template: {key}"))
    }

    async fn complete_json<T: DeserializeOwned>(&self, prompt_key: &str, user: String) -> Result<T> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.prompt(prompt_key)? },
                { "role": "user", "content": user }
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.2
        });

        let resp = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<LlmResponse>()
            .await?;

        let answer = &resp
            .choices
            .first()
            .ok_or_else(|| anyhow::anyhow!("No response from LLM"))?
            .message
            .content;
        parse_payload(answer)
    }
}

#[async_trait]
impl Reviewer for ReviewerClient {
    async fn analyze_engagement(
        &self,
        responses: &[String],
        topic_label: &str,
    ) -> Result<EngagementAnalysis> {
        let user = format!(
            "Recent responses: {}\nCurrent topic: {topic_label}",
            serde_json::to_string(responses)?
        );
        self.complete_json("analyze_engagement", user).await
    }

    async fn analyze_response(
        &self,
        response: &str,
        context: &ConversationContext,
    ) -> Result<ResponseAnalysis> {
        let user = format!(
            "Context: {}\n\nResponse: {response}",
            serde_json::to_string(context)?
        );
        self.complete_json("analyze_response", user).await
    }

    async fn suggest_topics(
        &self,
        topic: &Topic,
        context: &ConversationContext,
        engagement_score: f64,
    ) -> Result<TopicSuggestion> {
        let user = format!(
            "Current Topic: {}\nContext: {}\nEngagement Score: {engagement_score:.2}",
            topic.title,
            serde_json::to_string(context)?
        );
        self.complete_json("suggest_topics", user).await
    }

    async fn suggest_question(
        &self,
        topic: &Topic,
        context: &ConversationContext,
        depth: u32,
    ) -> Result<QuestionSuggestion> {
        let user = format!(
            "Topic: {}\nContext: {}\nDiscussion Depth: {depth}",
            serde_json::to_string(topic)?,
            serde_json::to_string(context)?
        );
        self.complete_json("suggest_question", user).await
    }

    async fn summarize_session(&self, transcript: &str) -> Result<SessionSummary> {
        if transcript.trim().is_empty() {
            return Err(anyhow::anyhow!("Cannot summarize an empty transcript"));
        }
        self.complete_json("summarize_session", transcript.to_string())
            .await
    }
}
