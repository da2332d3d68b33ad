//! # paperwatch
//!
//! Daily paper watch: keyword-scored digests of new arXiv, Semantic Scholar
//! and OpenAlex papers.
//!
//! ## Modules
//!
//! - [`taxonomy`] - Keyword file parsing into core/extended topic blocks
//! - [`scorer`] - Substring relevance scoring against the taxonomy
//! - [`dedup`] - Cross-source merge and seen-history filtering
//! - [`selector`] - Thresholds, per-block caps and citation-aware ranking
//! - [`history`] - Cross-run memory of processed papers
//! - [`sources`] - arXiv, Semantic Scholar and OpenAlex connectors
//! - [`citations`] - Citation count enrichment
//! - [`llm_scorer`] - Optional LLM relevance rating
//! - [`report`] - CSV report and notifier
//! - [`pipeline`] - The end-to-end daily run
//!
//! ## Usage
//!
//! ```rust,no_run
//! use paperwatch::{config::Config, pipeline::Pipeline, taxonomy::Taxonomy};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let taxonomy = Taxonomy::load(&config.keywords_file, config.taxonomy_mode, config.on_missing_keywords)?;
//!     let summary = Pipeline::from_config(&config, true)?
//!         .run(&taxonomy, chrono::Utc::now())
//!         .await?;
//!     println!("Selected {} papers", summary.selected.len());
//!     Ok(())
//! }
//! ```

pub mod citations;
pub mod config;
pub mod dedup;
pub mod error;
pub mod history;
pub mod llm_scorer;
pub mod paper;
pub mod pipeline;
pub mod prompts;
pub mod rate_limit;
pub mod report;
pub mod scorer;
pub mod selector;
pub mod sources;
pub mod taxonomy;
pub mod translations;

pub use error::{PaperwatchError, Result};
