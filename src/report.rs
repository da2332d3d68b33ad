//! Report rendering and delivery.
//!
//! The pipeline hands the final selection to a [`ReportRenderer`], which
//! produces an artifact on disk, and then to a [`Notifier`], which announces
//! it. Both are traits so the binary and tests can swap them.

use crate::error::Result;
use crate::paper::ScoredPaper;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Flat report row, one per selected paper
#[derive(Debug, Serialize)]
pub struct ReportRow {
    pub block: String,
    pub tier: String,
    pub score: String,
    pub llm_score: String,
    pub citations: u64,
    pub title: String,
    pub authors: String,
    pub published: String,
    pub category: String,
    pub matched_keywords: String,
    pub link: String,
    pub pdf_link: String,
    pub source: String,
}

/// CSV column order for the report
pub const REPORT_COLUMNS: &[&str] = &[
    "block",
    "tier",
    "score",
    "llm_score",
    "citations",
    "title",
    "authors",
    "published",
    "category",
    "matched_keywords",
    "link",
    "pdf_link",
    "source",
];

impl From<&ScoredPaper> for ReportRow {
    fn from(p: &ScoredPaper) -> Self {
        let category = if p.paper.primary_category.is_empty() {
            p.paper.categories.first().cloned().unwrap_or_default()
        } else {
            p.paper.primary_category.clone()
        };

        Self {
            block: p.block_name().to_string(),
            tier: p.tier().to_string(),
            score: format!("{:.1}", p.score()),
            llm_score: p.llm.as_ref().map(|v| format!("{:.1}", v.score)).unwrap_or_default(),
            citations: p.paper.citation_count,
            title: p.paper.title.clone(),
            authors: p.paper.authors.join(", "),
            published: p.paper.published.format("%Y-%m-%d").to_string(),
            category,
            matched_keywords: p.annotation.matched.join(", "),
            link: p.paper.link.clone(),
            pdf_link: p.paper.pdf_link.clone().unwrap_or_default(),
            source: p.paper.source.clone(),
        }
    }
}

/// Turns a selection into an artifact
pub trait ReportRenderer: Send + Sync {
    /// Render and return the artifact path
    fn render(&self, papers: &[ScoredPaper], date: &str) -> Result<PathBuf>;
}

/// Writes `<output_dir>/papers_<date>.csv`
#[derive(Debug, Clone)]
pub struct CsvReport {
    output_dir: PathBuf,
}

impl CsvReport {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl ReportRenderer for CsvReport {
    fn render(&self, papers: &[ScoredPaper], date: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(format!("papers_{}.csv", date));

        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_path(&path)?;
        wtr.write_record(REPORT_COLUMNS)?;
        for paper in papers {
            wtr.serialize(ReportRow::from(paper))?;
        }
        wtr.flush()?;

        info!(path = %path.display(), count = papers.len(), "Saved report");
        Ok(path)
    }
}

/// Announces a rendered report
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns true when delivery succeeded
    async fn notify(&self, papers: &[ScoredPaper], artifact: &Path, date: &str) -> bool;
}

/// Logs a per-block summary
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, papers: &[ScoredPaper], artifact: &Path, date: &str) -> bool {
        let mut per_block: BTreeMap<&str, usize> = BTreeMap::new();
        for paper in papers {
            *per_block.entry(paper.block_name()).or_default() += 1;
        }

        for (block, count) in &per_block {
            info!(date = date, block = %block, count = count, "Block summary");
        }
        info!(
            date = date,
            total = papers.len(),
            artifact = %artifact.display(),
            "Daily papers ready"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_scorer::LlmVerdict;
    use crate::paper::{sample_paper, Annotation, Tier};
    use tempfile::tempdir;

    fn selection() -> Vec<ScoredPaper> {
        let mut paper = sample_paper("2401.00001", "Market Structure in Airline Pricing");
        paper.authors = vec!["Jane Doe".to_string(), "John Roe".to_string()];
        paper.categories = vec!["econ.GN".to_string()];
        paper.citation_count = 4;
        let mut scored = ScoredPaper::new(
            paper,
            Annotation {
                score: 7.0,
                matched: vec!["market structure".to_string(), "pricing".to_string()],
                tier: Tier::Core,
                block: Some("Industrial Organization".to_string()),
            },
        );
        scored.llm = Some(LlmVerdict {
            score: 8.0,
            reason: "fits".to_string(),
        });
        vec![scored]
    }

    #[test]
    fn test_csv_report() -> Result<()> {
        let dir = tempdir()?;
        let report = CsvReport::new(dir.path().join("daily_papers"));
        let path = report.render(&selection(), "2024-01-15")?;

        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("papers_2024-01-15.csv"));

        let mut reader = csv::Reader::from_path(&path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        assert_eq!(headers, REPORT_COLUMNS);

        let rows: Vec<csv::StringRecord> = reader.records().collect::<std::result::Result<_, _>>()?;
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "Industrial Organization");
        assert_eq!(&rows[0][1], "core");
        assert_eq!(&rows[0][2], "7.0");
        assert_eq!(&rows[0][3], "8.0");
        assert_eq!(&rows[0][6], "Jane Doe, John Roe");
        assert_eq!(&rows[0][8], "econ.GN");
        assert_eq!(&rows[0][9], "market structure, pricing");
        Ok(())
    }

    #[test]
    fn test_empty_report_has_header() -> Result<()> {
        let dir = tempdir()?;
        let path = CsvReport::new(dir.path()).render(&[], "2024-01-15")?;
        let content = std::fs::read_to_string(path)?;
        assert!(content.starts_with("block,tier,score"));
        assert_eq!(content.lines().count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_log_notifier() {
        assert!(LogNotifier.notify(&selection(), Path::new("x.csv"), "2024-01-15").await);
    }
}
