//! Citation count enrichment via the Semantic Scholar Graph API.
//!
//! API Details:
//! - Single paper endpoint: GET /graph/v1/paper/{id}?fields=citationCount
//! - Ids may be prefixed: `arXiv:2401.00001`, `DOI:10.1000/xyz`
//! - Rate limit: 1 req/s (unauthenticated), higher with API key
//!
//! Lookups never fail: any error, timeout or non-200 status is a count of 0.

use crate::error::Result;
use crate::paper::{ScoredPaper, Tier};
use crate::rate_limit::RateLimiter;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Semantic Scholar API base URL
pub const SS_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

/// Per-request timeout for citation lookups
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

static ARXIV_NEW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}\.\d{4,5}(v\d+)?$").expect("valid regex"));
static ARXIV_OLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z\-]*(\.[A-Z]{2})?/\d{7}(v\d+)?$").expect("valid regex"));
static DOI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^10\.\d{4,9}/\S+$").expect("valid regex"));
static S2_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-f]{40}$").expect("valid regex"));

/// External citation count lookup
#[async_trait]
pub trait CitationSource: Send + Sync {
    /// Citation count for a source identifier, 0 when unknown
    async fn citation_count(&self, identifier: &str) -> u64;
}

/// Resolve a source identifier into a Semantic Scholar paper key.
///
/// Returns `None` for empty or unrecognised identifiers.
pub fn lookup_key(identifier: &str) -> Option<String> {
    let id = identifier.trim();
    if id.is_empty() {
        return None;
    }

    let doi = id
        .strip_prefix("https://doi.org/")
        .or_else(|| id.strip_prefix("doi:"))
        .unwrap_or(id);

    if ARXIV_NEW_RE.is_match(id) || ARXIV_OLD_RE.is_match(id) {
        Some(format!("arXiv:{}", id))
    } else if DOI_RE.is_match(doi) {
        Some(format!("DOI:{}", doi))
    } else if S2_ID_RE.is_match(id) {
        Some(id.to_string())
    } else {
        None
    }
}

#[derive(Debug, Deserialize)]
struct SSCitationResponse {
    #[serde(rename = "citationCount")]
    citation_count: Option<u64>,
}

/// Semantic Scholar citation client
#[derive(Debug, Clone)]
pub struct SemanticScholarCitations {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarCitations {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(LOOKUP_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: SS_API_BASE.to_string(),
            api_key,
        })
    }

    /// Point the client at another host (tests, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch(&self, key: &str) -> Result<Option<u64>> {
        let url = format!("{}/paper/{}?fields=citationCount", self.base_url, key);
        debug!(url = %url, "Fetching citation count");

        let mut request = self.client.get(&url);
        if let Some(api_key) = &self.api_key {
            request = request.header("x-api-key", api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            debug!(key = key, status = status.as_u16(), "Citation lookup returned non-success");
            return Ok(None);
        }

        let body: SSCitationResponse = response.json().await?;
        Ok(body.citation_count)
    }
}

#[async_trait]
impl CitationSource for SemanticScholarCitations {
    async fn citation_count(&self, identifier: &str) -> u64 {
        let Some(key) = lookup_key(identifier) else {
            return 0;
        };

        match self.fetch(&key).await {
            Ok(count) => count.unwrap_or(0),
            Err(e) => {
                warn!(identifier = identifier, error = %e, "Citation lookup failed");
                0
            }
        }
    }
}

/// Fill in citation counts for every paper that matched a keyword tier.
///
/// Lookups run one at a time, each behind the limiter. Papers without a
/// resolvable identifier are skipped without consuming a permit. The larger of
/// the source-provided and looked-up count is kept.
pub async fn enrich_citations(papers: &mut [ScoredPaper], source: &dyn CitationSource, limiter: &dyn RateLimiter) {
    let mut looked_up = 0usize;

    for scored in papers.iter_mut().filter(|p| p.tier() != Tier::None) {
        if lookup_key(&scored.paper.identifier).is_none() {
            continue;
        }

        limiter.acquire().await;
        let count = source.citation_count(&scored.paper.identifier).await;
        looked_up += 1;

        debug!(identifier = %scored.paper.identifier, citations = count, "Citation count");
        scored.paper.citation_count = scored.paper.citation_count.max(count);
    }

    info!(looked_up = looked_up, "Citation enrichment complete");
}
