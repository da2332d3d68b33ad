//! Candidate source connectors.
//!
//! Every connector answers the same question: papers matching a query string,
//! published within the last `window_days`, at most `max_results` of them.
//! Scoring and deduplication never look at which connector produced a paper.

pub mod arxiv;
pub mod openalex;
pub mod semanticscholar;

pub use arxiv::ArxivSource;
pub use openalex::OpenAlexSource;
pub use semanticscholar::SemanticScholarSource;

use crate::dedup;
use crate::error::Result;
use crate::paper::Paper;
use crate::rate_limit::RateLimiter;
use async_trait::async_trait;
use tracing::{info, warn};

/// Names accepted in the `sources` configuration list
pub const KNOWN_SOURCES: &[&str] = &["arxiv", "semantic_scholar", "openalex"];

#[async_trait]
pub trait CandidateSource: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, window_days: u32, max_results: usize) -> Result<Vec<Paper>>;
}

/// Queries several sources in order and merges their results.
///
/// A failing source contributes nothing; the others still run. On identity
/// collisions the earlier source wins.
pub struct MultiSource {
    sources: Vec<Box<dyn CandidateSource>>,
}

impl MultiSource {
    pub fn new(sources: Vec<Box<dyn CandidateSource>>) -> Self {
        Self { sources }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl CandidateSource for MultiSource {
    fn name(&self) -> &str {
        "multi"
    }

    async fn search(&self, query: &str, window_days: u32, max_results: usize) -> Result<Vec<Paper>> {
        let mut batches = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            match source.search(query, window_days, max_results).await {
                Ok(papers) => {
                    info!(source = source.name(), query = query, count = papers.len(), "Source results");
                    batches.push(papers);
                }
                Err(e) => {
                    warn!(source = source.name(), query = query, error = %e, "Source failed");
                }
            }
        }

        Ok(dedup::merge(batches))
    }
}

/// Runs every query through one source, one at a time
#[derive(Debug, Clone, Copy)]
pub struct Collector {
    pub window_days: u32,
    pub max_results: usize,
}

impl Collector {
    pub fn new(window_days: u32, max_results: usize) -> Self {
        Self {
            window_days,
            max_results,
        }
    }

    /// One batch per query, in query order.
    ///
    /// A failed query yields an empty batch and the remaining queries still run.
    pub async fn collect(
        &self,
        source: &dyn CandidateSource,
        limiter: &dyn RateLimiter,
        queries: &[String],
    ) -> Vec<Vec<Paper>> {
        let mut batches = Vec::with_capacity(queries.len());

        for (idx, query) in queries.iter().enumerate() {
            limiter.acquire().await;
            info!(
                query = %query,
                progress = format!("{}/{}", idx + 1, queries.len()),
                source = source.name(),
                "Searching"
            );

            match source.search(query, self.window_days, self.max_results).await {
                Ok(papers) => {
                    info!(query = %query, count = papers.len(), "Query complete");
                    batches.push(papers);
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "Query failed, continuing");
                    batches.push(Vec::new());
                }
            }
        }

        batches
    }
}
