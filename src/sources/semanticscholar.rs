//! Semantic Scholar search connector
//!
//! API Details:
//! - Search endpoint: GET /graph/v1/paper/search
//! - Max 100 papers per request
//! - `publicationDateOrYear=<from>:` filters server-side; papers with only a
//!   year are matched at year precision
//! - Rate limit: 1 req/s (unauthenticated), higher with API key

use super::CandidateSource;
use crate::citations::SS_API_BASE;
use crate::error::{PaperwatchError, Result};
use crate::paper::Paper;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Maximum papers per search request
const MAX_LIMIT: usize = 100;

const SEARCH_FIELDS: &str =
    "title,authors,year,publicationDate,abstract,citationCount,externalIds,url,openAccessPdf,fieldsOfStudy";

#[derive(Debug, Deserialize)]
struct SSSearchResponse {
    #[serde(default)]
    data: Vec<SSPaper>,
}

#[derive(Debug, Deserialize)]
struct SSPaper {
    #[serde(rename = "paperId")]
    paper_id: Option<String>,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    year: Option<i32>,
    #[serde(rename = "publicationDate")]
    publication_date: Option<String>,
    #[serde(rename = "citationCount")]
    citation_count: Option<u64>,
    url: Option<String>,
    #[serde(default)]
    authors: Vec<SSAuthor>,
    #[serde(rename = "openAccessPdf")]
    oa_pdf: Option<SSOpenAccessPdf>,
    #[serde(rename = "externalIds")]
    external_ids: Option<SSExternalIds>,
    #[serde(rename = "fieldsOfStudy")]
    fields_of_study: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SSAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SSOpenAccessPdf {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SSExternalIds {
    #[serde(rename = "ArXiv")]
    arxiv: Option<String>,
    #[serde(rename = "DOI")]
    doi: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SemanticScholarSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarSource {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: SS_API_BASE.to_string(),
            api_key,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl CandidateSource for SemanticScholarSource {
    fn name(&self) -> &str {
        "semantic_scholar"
    }

    async fn search(&self, query: &str, window_days: u32, max_results: usize) -> Result<Vec<Paper>> {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(window_days));
        let url = format!("{}/paper/search", self.base_url);
        let limit = max_results.min(MAX_LIMIT).to_string();
        let from_date = format!("{}:", cutoff.format("%Y-%m-%d"));

        debug!(url = %url, query = query, "Searching Semantic Scholar");

        let mut request = self.client.get(&url).query(&[
            ("query", query),
            ("fields", SEARCH_FIELDS),
            ("limit", limit.as_str()),
            ("publicationDateOrYear", from_date.as_str()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(query = query, "Semantic Scholar rate limited");
            return Err(PaperwatchError::RateLimited(60));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PaperwatchError::Api {
                code: status.as_u16() as i32,
                message: format!("Semantic Scholar API error: {} - {}", status, error_text),
            });
        }

        let body = response.text().await?;
        let papers = parse_response(&body, cutoff)?;
        info!(query = query, count = papers.len(), "Semantic Scholar query complete");
        Ok(papers)
    }
}

/// Parse a search response, dropping papers published before `cutoff`.
///
/// A full publication date is compared by day; a bare year only has to be
/// no earlier than the cutoff's year.
fn parse_response(json_str: &str, cutoff: DateTime<Utc>) -> Result<Vec<Paper>> {
    let response: SSSearchResponse = serde_json::from_str(json_str)
        .map_err(|e| PaperwatchError::Parse(format!("Failed to parse Semantic Scholar response: {}", e)))?;

    let papers = response
        .data
        .into_iter()
        .filter_map(|p| {
            let title = p.title.filter(|t| !t.trim().is_empty())?;
            let (published, exact) = publication_time(p.publication_date.as_deref(), p.year)?;
            let in_window = if exact {
                published >= cutoff
            } else {
                published.year() >= cutoff.year()
            };
            if !in_window {
                debug!(title = %title, published = %published, "Dropping paper outside window");
                return None;
            }

            let (arxiv, doi) = p
                .external_ids
                .map(|ids| (ids.arxiv, ids.doi))
                .unwrap_or_default();
            let identifier = arxiv
                .filter(|s| !s.is_empty())
                .or(doi.filter(|s| !s.is_empty()))
                .or(p.paper_id)
                .unwrap_or_default();

            let categories = p.fields_of_study.unwrap_or_default();
            Some(Paper {
                title,
                authors: p.authors.into_iter().filter_map(|a| a.name).collect(),
                abstract_text: p.abstract_text.unwrap_or_default(),
                link: p.url.unwrap_or_default(),
                pdf_link: p.oa_pdf.and_then(|pdf| pdf.url).filter(|u| !u.is_empty()),
                published,
                primary_category: categories.first().cloned().unwrap_or_default(),
                categories,
                identifier,
                citation_count: p.citation_count.unwrap_or(0),
                source: "semantic_scholar".to_string(),
            })
        })
        .collect();

    Ok(papers)
}

/// Full date when known (flagged exact), otherwise the first of January of the year
fn publication_time(date: Option<&str>, year: Option<i32>) -> Option<(DateTime<Utc>, bool)> {
    let (day, exact) = match date.and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()) {
        Some(day) => (day, true),
        None => (NaiveDate::from_ymd_opt(year?, 1, 1)?, false),
    };
    Some((day.and_hms_opt(0, 0, 0)?.and_utc(), exact))
}
