//! OpenAlex API connector
//!
//! API Best Practices (per OpenAlex docs):
//! - Use `mailto:email` parameter for polite pool (10 req/s vs 1 req/s)
//! - Use `per-page=200` for maximum results per page
//! - Abstracts are only served as an inverted index

use super::CandidateSource;
use crate::error::{PaperwatchError, Result};
use crate::paper::Paper;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// OpenAlex API base URL
pub const OPENALEX_API_BASE: &str = "https://api.openalex.org";

/// Maximum results per page (OpenAlex limit)
const MAX_PER_PAGE: usize = 200;

/// Concepts kept as classification tags
const MAX_CONCEPTS: usize = 5;

/// DataCite prefix arXiv registers its DOIs under
const ARXIV_DOI_PREFIX: &str = "10.48550/arxiv.";

const SELECT_FIELDS: &str =
    "id,display_name,title,publication_date,doi,cited_by_count,abstract_inverted_index,authorships,primary_location,open_access,concepts";

#[derive(Debug, Deserialize)]
struct OpenAlexResponse {
    #[serde(default)]
    results: Vec<OpenAlexWork>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexWork {
    id: Option<String>,
    title: Option<String>,
    display_name: Option<String>,
    publication_date: Option<String>,
    doi: Option<String>,
    cited_by_count: Option<u64>,
    #[serde(rename = "abstract_inverted_index")]
    abstract_index: Option<serde_json::Value>,
    authorships: Option<Vec<OpenAlexAuthorship>>,
    primary_location: Option<OpenAlexLocation>,
    open_access: Option<OpenAlexOpenAccess>,
    concepts: Option<Vec<OpenAlexConcept>>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthorship {
    author: Option<OpenAlexAuthor>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthor {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexLocation {
    landing_page_url: Option<String>,
    pdf_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexOpenAccess {
    is_oa: Option<bool>,
    oa_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexConcept {
    display_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenAlexSource {
    client: Client,
    base_url: String,
    email: Option<String>,
}

impl OpenAlexSource {
    pub fn new(email: Option<String>) -> Result<Self> {
        let user_agent = match &email {
            Some(email) => format!("paperwatch/0.1 (mailto:{})", email),
            None => "paperwatch/0.1".to_string(),
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: OPENALEX_API_BASE.to_string(),
            email,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build the works search URL
    fn build_search_url(&self, query: &str, from_date: NaiveDate, max_results: usize) -> String {
        let mut url = format!(
            "{}/works?search={}&filter=from_publication_date:{}&sort=relevance_score:desc&per-page={}",
            self.base_url,
            urlencoding::encode(query),
            from_date.format("%Y-%m-%d"),
            max_results.clamp(1, MAX_PER_PAGE),
        );
        if let Some(email) = &self.email {
            url.push_str(&format!("&mailto={}", urlencoding::encode(email)));
        }
        url.push_str("&select=");
        url.push_str(SELECT_FIELDS);
        url
    }
}

#[async_trait]
impl CandidateSource for OpenAlexSource {
    fn name(&self) -> &str {
        "openalex"
    }

    async fn search(&self, query: &str, window_days: u32, max_results: usize) -> Result<Vec<Paper>> {
        let from_date = (Utc::now() - ChronoDuration::days(i64::from(window_days))).date_naive();
        let url = self.build_search_url(query, from_date, max_results);
        debug!(url = %url, "Fetching OpenAlex works");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(query = query, "OpenAlex rate limited");
            return Err(PaperwatchError::RateLimited(60));
        }
        if !status.is_success() {
            return Err(PaperwatchError::Api {
                code: status.as_u16() as i32,
                message: format!("OpenAlex API error: {}", status),
            });
        }

        let body = response.text().await?;
        let papers = parse_response(&body)?;
        info!(query = query, count = papers.len(), "OpenAlex query complete");
        Ok(papers)
    }
}

/// Parse OpenAlex API response
fn parse_response(json_str: &str) -> Result<Vec<Paper>> {
    let response: OpenAlexResponse = serde_json::from_str(json_str)
        .map_err(|e| PaperwatchError::Parse(format!("Failed to parse OpenAlex response: {}", e)))?;

    let papers = response
        .results
        .into_iter()
        .filter_map(|work| {
            let title = work.display_name.or(work.title).filter(|t| !t.trim().is_empty())?;
            let Some(published) = parse_date(work.publication_date.as_deref()) else {
                debug!(title = %title, "Dropping work without publication date");
                return None;
            };
            let openalex_id = work.id.unwrap_or_default();
            let doi = work
                .doi
                .map(|d| d.replace("https://doi.org/", ""))
                .filter(|d| !d.is_empty());

            // DOI first so the citation lookup can resolve it; arXiv DOIs
            // collapse to the bare arXiv id other sources key on
            let identifier = doi
                .as_deref()
                .map(arxiv_id_from_doi)
                .unwrap_or_else(|| openalex_id.rsplit('/').next().unwrap_or_default().to_string());

            let authors = work
                .authorships
                .unwrap_or_default()
                .into_iter()
                .filter_map(|a| a.author.and_then(|a| a.display_name))
                .collect();

            let (landing, location_pdf) = work
                .primary_location
                .map(|l| (l.landing_page_url, l.pdf_url))
                .unwrap_or_default();
            let oa_pdf = work
                .open_access
                .filter(|oa| oa.is_oa.unwrap_or(false))
                .and_then(|oa| oa.oa_url);

            let link = landing
                .or_else(|| doi.as_ref().map(|d| format!("https://doi.org/{}", d)))
                .unwrap_or_else(|| openalex_id.clone());

            let categories: Vec<String> = work
                .concepts
                .unwrap_or_default()
                .into_iter()
                .filter_map(|c| c.display_name)
                .take(MAX_CONCEPTS)
                .collect();

            Some(Paper {
                title,
                authors,
                abstract_text: work
                    .abstract_index
                    .as_ref()
                    .map(reconstruct_abstract)
                    .unwrap_or_default(),
                link,
                pdf_link: location_pdf.or(oa_pdf),
                published,
                primary_category: categories.first().cloned().unwrap_or_default(),
                categories,
                identifier,
                citation_count: work.cited_by_count.unwrap_or(0),
                source: "openalex".to_string(),
            })
        })
        .collect();

    Ok(papers)
}

/// Publication date at midnight UTC
fn parse_date(date: Option<&str>) -> Option<DateTime<Utc>> {
    date.and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

/// `10.48550/arXiv.2401.00001` -> `2401.00001`; other DOIs are returned as is
fn arxiv_id_from_doi(doi: &str) -> String {
    let is_arxiv = doi
        .get(..ARXIV_DOI_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(ARXIV_DOI_PREFIX));
    if is_arxiv {
        doi[ARXIV_DOI_PREFIX.len()..].to_string()
    } else {
        doi.to_string()
    }
}

/// Reconstruct abstract text from inverted index
fn reconstruct_abstract(inverted_index: &serde_json::Value) -> String {
    let Some(obj) = inverted_index.as_object() else {
        return String::new();
    };

    let mut words: Vec<(i64, &str)> = Vec::new();
    for (word, positions) in obj {
        if let Some(pos_array) = positions.as_array() {
            for pos in pos_array.iter().filter_map(|p| p.as_i64()) {
                words.push((pos, word.as_str()));
            }
        }
    }

    words.sort_by_key(|(pos, _)| *pos);
    words.iter().map(|(_, w)| *w).collect::<Vec<_>>().join(" ")
}
