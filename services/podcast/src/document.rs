use anyhow::{Context, Result};
use podcast_core::topic::Topic;
use serde::Deserialize;
use std::path::Path;

/// Topics extracted from an uploaded document, as produced by the document
/// processing step.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentAnalysis {
    #[serde(default)]
    pub summary: Option<String>,
    pub topics: Vec<Topic>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TopicsFile {
    Analysis(DocumentAnalysis),
    Bare(Vec<Topic>),
}

/// Parses either a full `{ "summary", "topics" }` analysis or a bare topic array.
pub fn parse_document(json: &str) -> Result<DocumentAnalysis> {
    let parsed: TopicsFile = serde_json::from_str(json).context("Topics file is not valid JSON")?;
    Ok(match parsed {
        TopicsFile::Analysis(analysis) => analysis,
        TopicsFile::Bare(topics) => DocumentAnalysis {
            summary: None,
            topics,
        },
    })
}

pub fn load_document(path: &Path) -> Result<DocumentAnalysis> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read topics file: {}", path.display()))?;
    parse_document(&json)
}
