//! arXiv API connector
//!
//! API Details:
//! - Endpoint: GET /api/query?search_query=all:{q}&sortBy=submittedDate
//! - Response: Atom 1.0 feed with `arxiv:` extension elements
//! - Politeness: one request every few seconds, no API key

use super::CandidateSource;
use crate::error::{PaperwatchError, Result};
use crate::paper::Paper;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use reqwest::Client;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// arXiv API query endpoint
pub const ARXIV_API_BASE: &str = "http://export.arxiv.org/api/query";

static VERSION_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"v\d+$").expect("valid regex"));

#[derive(Debug, Clone)]
pub struct ArxivSource {
    client: Client,
    base_url: String,
}

impl ArxivSource {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("paperwatch/0.1")
            .build()?;
        Ok(Self {
            client,
            base_url: ARXIV_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl CandidateSource for ArxivSource {
    fn name(&self) -> &str {
        "arxiv"
    }

    async fn search(&self, query: &str, window_days: u32, max_results: usize) -> Result<Vec<Paper>> {
        let search_query = format!("all:{}", query);
        let max_results = max_results.to_string();
        let params = [
            ("search_query", search_query.as_str()),
            ("start", "0"),
            ("max_results", max_results.as_str()),
            ("sortBy", "submittedDate"),
            ("sortOrder", "descending"),
        ];

        debug!(query = query, "Fetching arXiv feed");
        let response = self.client.get(&self.base_url).query(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PaperwatchError::Api {
                code: status.as_u16() as i32,
                message: format!("arXiv API error: {}", status),
            });
        }

        let body = response.text().await?;
        let papers = parse_feed(&body)?;
        let total = papers.len();
        let recent = within_window(papers, window_days, Utc::now());

        info!(query = query, fetched = total, recent = recent.len(), "arXiv query complete");
        Ok(recent)
    }
}

/// Drop papers published before `now - window_days`
pub fn within_window(papers: Vec<Paper>, window_days: u32, now: DateTime<Utc>) -> Vec<Paper> {
    let cutoff = now - ChronoDuration::days(i64::from(window_days));
    papers.into_iter().filter(|p| p.published >= cutoff).collect()
}

/// arXiv id from an abs URL, without the version suffix
pub fn arxiv_id_from_url(url: &str) -> Option<String> {
    let (_, tail) = url.split_once("/abs/")?;
    let id = VERSION_SUFFIX_RE.replace(tail.trim_end_matches('/'), "");
    (!id.is_empty()).then(|| id.to_string())
}

#[derive(Debug, Default)]
struct Entry {
    id_url: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    categories: Vec<String>,
    primary_category: String,
    pdf_link: Option<String>,
}

impl Entry {
    fn into_paper(self) -> Option<Paper> {
        let published = match DateTime::parse_from_rfc3339(&self.published) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                warn!(id = %self.id_url, published = %self.published, error = %e, "Skipping entry with bad date");
                return None;
            }
        };

        Some(Paper {
            identifier: arxiv_id_from_url(&self.id_url).unwrap_or_default(),
            title: self.title,
            authors: self.authors,
            abstract_text: self.summary,
            link: self.id_url,
            pdf_link: self.pdf_link,
            published,
            categories: self.categories,
            primary_category: self.primary_category,
            citation_count: 0,
            source: "arxiv".to_string(),
        })
    }

    /// Attributes carried by `link`, `category` and `arxiv:primary_category`
    fn apply_attributes(&mut self, element: &BytesStart) {
        let mut rel = String::new();
        let mut kind = String::new();
        let mut href = String::new();
        let mut term = String::new();

        for attr in element.attributes().flatten() {
            let value = attr.unescape_value().map(|v| v.to_string()).unwrap_or_default();
            match attr.key.local_name().as_ref() {
                b"rel" => rel = value,
                b"type" => kind = value,
                b"href" => href = value,
                b"term" => term = value,
                _ => {}
            }
        }

        match element.local_name().as_ref() {
            b"link" if kind == "application/pdf" || (rel == "related" && href.contains("/pdf/")) => {
                self.pdf_link = Some(href);
            }
            b"category" if !term.trim().is_empty() => self.categories.push(term),
            b"primary_category" => self.primary_category = term,
            _ => {}
        }
    }
}

/// Collapse runs of whitespace, as titles and abstracts arrive hard-wrapped
fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse an arXiv Atom feed into papers
pub fn parse_feed(xml: &str) -> Result<Vec<Paper>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut papers = Vec::new();
    let mut entry: Option<Entry> = None;
    let mut in_author = false;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                text.clear();
                match e.local_name().as_ref() {
                    b"entry" => entry = Some(Entry::default()),
                    b"author" => in_author = true,
                    _ => {
                        if let Some(current) = entry.as_mut() {
                            current.apply_attributes(&e);
                        }
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(current) = entry.as_mut() {
                    current.apply_attributes(&e);
                }
            }
            Ok(Event::Text(t)) => {
                let chunk = t
                    .unescape()
                    .map_err(|e| PaperwatchError::Parse(format!("Bad text in arXiv feed: {}", e)))?;
                text.push_str(&chunk);
            }
            Ok(Event::CData(t)) => {
                text.push_str(&String::from_utf8_lossy(&t));
            }
            Ok(Event::End(e)) => {
                let local = e.local_name();
                let name = local.as_ref();
                if name == b"entry" {
                    if let Some(paper) = entry.take().and_then(Entry::into_paper) {
                        papers.push(paper);
                    }
                } else if name == b"author" {
                    in_author = false;
                } else if let Some(current) = entry.as_mut() {
                    let value = normalize_ws(&text);
                    match name {
                        b"id" => current.id_url = value,
                        b"title" => current.title = value,
                        b"summary" => current.summary = value,
                        b"published" => current.published = value,
                        b"name" if in_author && !value.is_empty() => current.authors.push(value),
                        _ => {}
                    }
                }
                text.clear();
            }
            Err(e) => {
                return Err(PaperwatchError::Parse(format!(
                    "arXiv feed error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(papers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query: search_query=all:pricing</title>
  <entry>
    <id>http://arxiv.org/abs/2401.00001v2</id>
    <updated>2024-01-15T09:00:00Z</updated>
    <published>2024-01-14T09:00:00Z</published>
    <title>Market Structure in
      Airline Pricing</title>
    <summary>We estimate demand &amp; supply
      for airline routes.</summary>
    <author><name>Jane Doe</name></author>
    <author><name>John Roe</name><arxiv:affiliation>MIT</arxiv:affiliation></author>
    <link href="http://arxiv.org/abs/2401.00001v2" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2401.00001v2" rel="related" type="application/pdf"/>
    <arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="econ.GN" scheme="http://arxiv.org/schemas/atom"/>
    <category term="econ.GN" scheme="http://arxiv.org/schemas/atom"/>
    <category term="q-fin.EC" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/hep-th/9901001v1</id>
    <published>2023-06-01T00:00:00Z</published>
    <title>Old Paper</title>
    <summary>Old.</summary>
    <author><name>A. Physicist</name></author>
    <category term="hep-th" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed() -> Result<()> {
        let papers = parse_feed(FEED)?;
        assert_eq!(papers.len(), 2);

        let p = &papers[0];
        assert_eq!(p.identifier, "2401.00001");
        assert_eq!(p.title, "Market Structure in Airline Pricing");
        assert_eq!(p.abstract_text, "We estimate demand & supply for airline routes.");
        assert_eq!(p.authors, vec!["Jane Doe", "John Roe"]);
        assert_eq!(p.pdf_link.as_deref(), Some("http://arxiv.org/pdf/2401.00001v2"));
        assert_eq!(p.categories, vec!["econ.GN", "q-fin.EC"]);
        assert_eq!(p.primary_category, "econ.GN");
        assert_eq!(p.published, Utc.with_ymd_and_hms(2024, 1, 14, 9, 0, 0).unwrap());
        assert_eq!(p.source, "arxiv");

        assert_eq!(papers[1].identifier, "hep-th/9901001");
        assert!(papers[1].pdf_link.is_none());
        Ok(())
    }

    #[test]
    fn test_parse_malformed_feed() {
        assert!(parse_feed("<feed><entry><title>x</entry></feed>").is_err());
    }

    #[test]
    fn test_arxiv_id_from_url() {
        assert_eq!(arxiv_id_from_url("http://arxiv.org/abs/2401.12345v10").as_deref(), Some("2401.12345"));
        assert_eq!(arxiv_id_from_url("http://arxiv.org/abs/2401.12345").as_deref(), Some("2401.12345"));
        assert_eq!(arxiv_id_from_url("http://example.com/paper"), None);
    }

    #[test]
    fn test_within_window() -> Result<()> {
        let now = Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap();
        let papers = within_window(parse_feed(FEED)?, 30, now);
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].identifier, "2401.00001");
        Ok(())
    }

    #[tokio::test]
    async fn test_search_sends_query() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("search_query", "all:market structure"))
            .and(query_param("sortBy", "submittedDate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .expect(1)
            .mount(&server)
            .await;

        let source = ArxivSource::new()?.with_base_url(format!("{}/api/query", server.uri()));
        // both fixture entries are years old
        let papers = source.search("market structure", 30, 10).await?;
        assert!(papers.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_search_error_status() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = ArxivSource::new()?.with_base_url(server.uri());
        assert!(source.search("pricing", 30, 10).await.is_err());
        Ok(())
    }
}
