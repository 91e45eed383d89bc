use crate::context::{ConversationContext, QuestionType};
use crate::reviewer::{
    EngagementAnalysis, EngagementQuality, QuestionSuggestion, ResponseAnalysis, Reviewer,
    SessionSummary, TopicSuggestion,
};
use crate::topic::Topic;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

const MAX_KEYWORDS: usize = 5;
const MIN_KEYWORD_LEN: usize = 7;

/// An offline `Reviewer` built from text heuristics.
///
/// It makes no network calls and always answers the same way for the same
/// input. It lets the service run without an API key and gives the runtimes
/// something deterministic to demo against.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicReviewer;

fn sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn keywords(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        let word = word.to_lowercase();
        if word.chars().count() >= MIN_KEYWORD_LEN && !out.contains(&word) {
            out.push(word);
        }
        if out.len() == MAX_KEYWORDS {
            break;
        }
    }
    out
}

/// Phrases like "interested in X" or "curious about X", up to the next
/// punctuation mark.
fn interests(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    ["interested in ", "curious about ", "love "]
        .iter()
        .filter_map(|marker| {
            let start = lower.find(marker)? + marker.len();
            let phrase: String = lower[start..]
                .chars()
                .take_while(|c| !matches!(c, '.' | ',' | '!' | '?' | ';'))
                .collect();
            let phrase = phrase.trim().to_string();
            (!phrase.is_empty()).then_some(phrase)
        })
        .collect()
}

fn average_len(responses: &[String]) -> f64 {
    if responses.is_empty() {
        return 0.0;
    }
    responses.iter().map(|r| r.chars().count()).sum::<usize>() as f64 / responses.len() as f64
}

#[async_trait]
impl Reviewer for HeuristicReviewer {
    async fn analyze_engagement(
        &self,
        responses: &[String],
        _topic_label: &str,
    ) -> Result<EngagementAnalysis> {
        let average = average_len(responses);
        let asks_questions = responses.iter().any(|r| r.contains('?'));
        let personal = responses.iter().any(|r| {
            let lower = format!(" {} ", r.to_lowercase());
            lower.contains(" i ") || lower.contains(" my ")
        });

        let mut score = (average / 150.0).min(0.8);
        if asks_questions {
            score += 0.1;
        }
        if personal {
            score += 0.1;
        }
        let score = score.min(1.0);

        let depth = responses
            .iter()
            .map(|r| sentences(r).len())
            .max()
            .unwrap_or(0) as f64;

        let recommendation = if score < 0.4 {
            "Ask a simpler, more personal question"
        } else {
            "Keep following the user's lead"
        };

        Ok(EngagementAnalysis {
            score,
            metrics: EngagementQuality {
                depth: depth.min(5.0),
                relevance: if average > 0.0 { 0.7 } else { 0.0 },
                complexity: (average / 300.0).min(1.0),
            },
            patterns: BTreeMap::from([
                ("elaboration".to_string(), average > 100.0),
                ("personalExamples".to_string(), personal),
                ("questions".to_string(), asks_questions),
            ]),
            recommendation: recommendation.to_string(),
        })
    }

    async fn analyze_response(
        &self,
        response: &str,
        _context: &ConversationContext,
    ) -> Result<ResponseAnalysis> {
        let parts = sentences(response);
        let key_points = parts
            .iter()
            .filter(|s| s.chars().count() > 40)
            .take(2)
            .map(|s| s.to_string())
            .collect();
        let relevant_quotes = parts
            .iter()
            .find(|s| s.chars().count() > 60)
            .map(|s| vec![format!("\"{s}\"")])
            .unwrap_or_default();

        Ok(ResponseAnalysis {
            keywords: keywords(response),
            depth: parts.len().min(5) as f64,
            key_points,
            relevant_quotes,
            user_interests: interests(response),
            uncovered_aspects: Vec::new(),
        })
    }

    async fn suggest_topics(
        &self,
        topic: &Topic,
        _context: &ConversationContext,
        engagement_score: f64,
    ) -> Result<TopicSuggestion> {
        let transition_strategy = if topic.segue_to_next.trim().is_empty() {
            format!("We've covered a lot on {}. Let's see where this leads next.", topic.title)
        } else {
            topic.segue_to_next.clone()
        };
        Ok(TopicSuggestion {
            transition_strategy,
            suggested_topics: Vec::new(),
            rationale: format!("Engagement at {engagement_score:.2} on {}", topic.title),
        })
    }

    async fn suggest_question(
        &self,
        topic: &Topic,
        context: &ConversationContext,
        depth: u32,
    ) -> Result<QuestionSuggestion> {
        if let Some(keyword) = context.recent_keywords.first() {
            return Ok(QuestionSuggestion {
                question: format!("What makes {keyword} matter so much here?"),
                kind: QuestionType::Followup,
                rationale: "Builds on the user's own words".to_string(),
            });
        }
        let scripted: Vec<&String> = topic.questions.iter().filter(|q| !q.trim().is_empty()).collect();
        let question = match scripted.len() {
            0 => anyhow::bail!("Topic {} has no questions to draw from", topic.id),
            n => scripted[depth as usize % n].clone(),
        };
        Ok(QuestionSuggestion {
            question,
            kind: QuestionType::Followup,
            rationale: format!("Scripted question at depth {depth}"),
        })
    }

    async fn summarize_session(&self, transcript: &str) -> Result<SessionSummary> {
        let user_lines: Vec<&str> = transcript
            .split("\n\n")
            .filter_map(|block| block.strip_prefix("User: "))
            .collect();
        if user_lines.is_empty() {
            anyhow::bail!("Transcript has no user turns to summarize");
        }

        let mut by_length = user_lines.clone();
        by_length.sort_by_key(|line| std::cmp::Reverse(line.chars().count()));
        let main_points = by_length
            .iter()
            .take(3)
            .filter_map(|line| sentences(line).first().map(|s| s.to_string()))
            .collect();
        let key_takeaways = keywords(&user_lines.join(" "))
            .into_iter()
            .take(3)
            .collect();
        let lines: Vec<String> = user_lines.iter().map(|l| l.to_string()).collect();

        Ok(SessionSummary {
            main_points,
            key_takeaways,
            overall_engagement: (average_len(&lines) / 200.0).min(1.0),
        })
    }
}
