//! Paper records and the annotations produced by scoring.
//!
//! A [`Paper`] is what a source connector returns. Scoring never mutates it;
//! the result of scoring lives in an [`Annotation`] carried next to the paper
//! in a [`ScoredPaper`].

use crate::llm_scorer::LlmVerdict;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of title characters used as identity when a paper has no identifier
pub const TITLE_KEY_CHARS: usize = 50;

/// A candidate publication as returned by a source connector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paper {
    pub title: String,
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Canonical landing page
    pub link: String,
    pub pdf_link: Option<String>,
    pub published: DateTime<Utc>,
    /// Subject classification tags (arXiv categories, fields of study, concepts)
    pub categories: Vec<String>,
    pub primary_category: String,
    /// Source-scoped identifier, may be empty
    pub identifier: String,
    pub citation_count: u64,
    /// Name of the connector that produced the record
    pub source: String,
}

impl Paper {
    /// Identity key used for deduplication and history.
    ///
    /// The source identifier when present, otherwise the first 50 characters of
    /// the lower-cased title. The title fallback is weak: two distinct papers
    /// sharing a long common title prefix collapse into one.
    pub fn identity_key(&self) -> String {
        let id = self.identifier.trim();
        if !id.is_empty() {
            return id.to_string();
        }
        self.title
            .trim()
            .to_lowercase()
            .chars()
            .take(TITLE_KEY_CHARS)
            .collect()
    }
}

/// Match strength of a paper against a keyword block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    None,
    Extended,
    Core,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Core => "core",
            Tier::Extended => "extended",
            Tier::None => "none",
        };
        f.write_str(s)
    }
}

/// Scoring output for one paper
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub score: f64,
    /// Matched keywords, core hits first, in taxonomy order
    pub matched: Vec<String>,
    pub tier: Tier,
    /// Keyword block the paper was attributed to
    pub block: Option<String>,
}

/// A paper together with its annotation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPaper {
    pub paper: Paper,
    pub annotation: Annotation,
    /// Verdict of the optional LLM scoring stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmVerdict>,
}

impl ScoredPaper {
    pub fn new(paper: Paper, annotation: Annotation) -> Self {
        Self {
            paper,
            annotation,
            llm: None,
        }
    }

    pub fn score(&self) -> f64 {
        self.annotation.score
    }

    pub fn tier(&self) -> Tier {
        self.annotation.tier
    }

    pub fn block_name(&self) -> &str {
        self.annotation.block.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
pub(crate) fn sample_paper(identifier: &str, title: &str) -> Paper {
    Paper {
        title: title.to_string(),
        authors: vec!["A. Author".to_string()],
        abstract_text: String::new(),
        link: format!("https://arxiv.org/abs/{identifier}"),
        identifier: identifier.to_string(),
        source: "test".to_string(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_key_prefers_identifier() {
        let paper = sample_paper("2401.00001", "Market Structure in Airline Pricing");
        assert_eq!(paper.identity_key(), "2401.00001");
    }

    #[test]
    fn test_identity_key_title_fallback() {
        let title = "A Very Long Title About Carbon Emission Policy In International Shipping Markets";
        let paper = sample_paper("", title);
        let key = paper.identity_key();
        assert_eq!(key.chars().count(), TITLE_KEY_CHARS);
        assert!(key.starts_with("a very long title about carbon"));
    }

    #[test]
    fn test_identity_key_counts_characters_not_bytes() {
        let title = "北极航道".repeat(20);
        let paper = sample_paper("  ", &title);
        assert_eq!(paper.identity_key().chars().count(), TITLE_KEY_CHARS);
    }

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Core > Tier::Extended);
        assert!(Tier::Extended > Tier::None);
        assert_eq!(Tier::Core.to_string(), "core");
    }

    #[test]
    fn test_paper_deserializes_with_defaults() {
        let json = r#"{"title": "Demand Estimation", "abstract": "BLP model"}"#;
        let paper: Paper = serde_json::from_str(json).unwrap();
        assert_eq!(paper.abstract_text, "BLP model");
        assert!(paper.identifier.is_empty());
        assert_eq!(paper.citation_count, 0);
    }
}
