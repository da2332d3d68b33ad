//! Run configuration.
//!
//! Resolution order, later wins: built-in defaults, the JSON config file,
//! environment variables, command line flags. The file is looked up at
//! `--config PATH`, else `./paperwatch.json`, else
//! `<config_dir>/paperwatch/config.json`; no file at all means defaults.

use crate::citations::SS_API_BASE;
use crate::error::{PaperwatchError, Result};
use crate::llm_scorer::LlmConfig;
use crate::scorer::ScoringConfig;
use crate::selector::{SelectionConfig, SelectionPolicy};
use crate::sources::arxiv::ARXIV_API_BASE;
use crate::sources::openalex::OPENALEX_API_BASE;
use crate::sources::KNOWN_SOURCES;
use crate::taxonomy::{MissingKeywords, TaxonomyMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};
use url::Url;

/// Config file name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "paperwatch.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub keywords_file: PathBuf,
    pub taxonomy_mode: TaxonomyMode,
    pub on_missing_keywords: MissingKeywords,
    /// Recency window in days
    pub days_back: u32,
    pub max_results_per_query: usize,
    pub history_file: PathBuf,
    pub output_dir: PathBuf,
    /// Connectors to query, in merge priority order
    pub sources: Vec<String>,
    pub query_interval_ms: u64,
    pub citations_enabled: bool,
    pub citation_interval_ms: u64,
    #[serde(skip_serializing)]
    pub semantic_scholar_api_key: Option<String>,
    pub openalex_email: Option<String>,
    pub arxiv_url: String,
    pub semantic_scholar_url: String,
    pub openalex_url: String,
    pub scoring: ScoringConfig,
    pub selection: SelectionConfig,
    pub llm: LlmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keywords_file: PathBuf::from("keywords.txt"),
            taxonomy_mode: TaxonomyMode::default(),
            on_missing_keywords: MissingKeywords::default(),
            days_back: 30,
            max_results_per_query: 100,
            history_file: PathBuf::from("paper_history.json"),
            output_dir: PathBuf::from("daily_papers"),
            sources: vec!["arxiv".to_string()],
            query_interval_ms: 1000,
            citations_enabled: true,
            citation_interval_ms: 300,
            semantic_scholar_api_key: None,
            openalex_email: None,
            arxiv_url: ARXIV_API_BASE.to_string(),
            semantic_scholar_url: SS_API_BASE.to_string(),
            openalex_url: OPENALEX_API_BASE.to_string(),
            scoring: ScoringConfig::default(),
            selection: SelectionConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    /// Load a config file; the file must exist
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PaperwatchError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| PaperwatchError::Config(format!("Invalid config {}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Per-user config file location
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("paperwatch").join("config.json"))
    }

    /// Load from an explicit path, or the first config file found, or defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let candidates = std::iter::once(PathBuf::from(CONFIG_FILE_NAME)).chain(Self::user_config_path());
        for candidate in candidates {
            if candidate.is_file() {
                return Self::load(&candidate);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any variable lookup. Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("DAYS_BACK") {
            self.days_back = parse_env("DAYS_BACK", &v)?;
        }
        if let Some(v) = get("CORE_LIMIT") {
            self.selection.core_limit = parse_env("CORE_LIMIT", &v)?;
        }
        if let Some(v) = get("EXTENDED_LIMIT") {
            self.selection.extended_limit = parse_env("EXTENDED_LIMIT", &v)?;
        }
        if let Some(v) = get("SEMANTIC_SCHOLAR_API_KEY") {
            self.semantic_scholar_api_key = Some(v);
        }
        if let Some(v) = get("OPENALEX_EMAIL") {
            self.openalex_email = Some(v);
        }
        if let Some(v) = get("LLM_ENABLED") {
            self.llm.enabled = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(v) = get("LLM_API_KEY") {
            self.llm.api_key = v;
        }
        if let Some(v) = get("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("LLM_API_URL") {
            self.llm.api_url = v;
        }
        Ok(())
    }

    /// Reject settings that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.selection.policy == SelectionPolicy::PerBlock
            && (self.selection.core_limit == 0 && self.selection.extended_limit == 0)
        {
            return Err(PaperwatchError::Validation(
                "per-block selection needs a non-zero core_limit or extended_limit".to_string(),
            ));
        }
        if self.selection.policy == SelectionPolicy::Global && self.selection.max_total == 0 {
            return Err(PaperwatchError::Validation("max_total must be positive".to_string()));
        }
        if self.selection.threshold < 0.0 || !self.selection.threshold.is_finite() {
            return Err(PaperwatchError::Validation(format!(
                "threshold must be a non-negative number, got {}",
                self.selection.threshold
            )));
        }
        if self.max_results_per_query == 0 {
            return Err(PaperwatchError::Validation("max_results_per_query must be positive".to_string()));
        }
        if self.sources.is_empty() {
            return Err(PaperwatchError::Validation("at least one source is required".to_string()));
        }
        if let Some(unknown) = self.sources.iter().find(|s| !KNOWN_SOURCES.contains(&s.as_str())) {
            return Err(PaperwatchError::Validation(format!(
                "unknown source '{}', expected one of {:?}",
                unknown, KNOWN_SOURCES
            )));
        }

        for (name, value) in [
            ("arxiv_url", &self.arxiv_url),
            ("semantic_scholar_url", &self.semantic_scholar_url),
            ("openalex_url", &self.openalex_url),
        ] {
            Url::parse(value).map_err(|e| PaperwatchError::Validation(format!("{} '{}': {}", name, value, e)))?;
        }
        if self.llm.enabled {
            Url::parse(&self.llm.endpoint())
                .map_err(|e| PaperwatchError::Validation(format!("llm.api_url '{}': {}", self.llm.api_url, e)))?;
            if !(0.0..=10.0).contains(&self.llm.min_score) {
                return Err(PaperwatchError::Validation(format!(
                    "llm.min_score must be within 0-10, got {}",
                    self.llm.min_score
                )));
            }
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| PaperwatchError::Config(format!("{} must be a non-negative integer, got '{}'", key, value)))
}
