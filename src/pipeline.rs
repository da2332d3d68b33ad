//! End-to-end daily run.
//!
//! Phases run strictly in order: queries from the taxonomy, collection,
//! cross-source merge, history filter, scoring, citation enrichment,
//! selection, optional LLM scoring, report, notification, history save.
//! Every collaborator is injected so tests can run the whole thing offline.

use crate::citations::{enrich_citations, CitationSource, SemanticScholarCitations};
use crate::config::Config;
use crate::dedup;
use crate::error::{PaperwatchError, Result};
use crate::history::{load_or_empty, HistoryStore, JsonHistoryStore};
use crate::llm_scorer::{LlmScorer, TokenUsage};
use crate::paper::{Paper, ScoredPaper, Tier};
use crate::rate_limit::{IntervalLimiter, RateLimiter, Unthrottled};
use crate::report::{CsvReport, LogNotifier, Notifier, ReportRenderer};
use crate::scorer::{Scorer, ScoringConfig};
use crate::selector::{select, SelectionConfig};
use crate::sources::{ArxivSource, CandidateSource, Collector, MultiSource, OpenAlexSource, SemanticScholarSource};
use crate::taxonomy::{MissingKeywords, Taxonomy, TaxonomyMode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// Outcome of one run
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub date: String,
    pub queries: usize,
    /// Papers returned by all queries, duplicates included
    pub collected: usize,
    pub unique: usize,
    /// Unique papers not seen in earlier runs
    pub unseen: usize,
    /// Unseen papers that matched a keyword tier
    pub matched: usize,
    pub selected: Vec<ScoredPaper>,
    pub report: Option<PathBuf>,
    pub notified: bool,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

pub struct Pipeline {
    source: Box<dyn CandidateSource>,
    history: Box<dyn HistoryStore>,
    renderer: Box<dyn ReportRenderer>,
    query_limiter: Box<dyn RateLimiter>,
    citations: Option<(Box<dyn CitationSource>, Box<dyn RateLimiter>)>,
    notifier: Option<Box<dyn Notifier>>,
    llm: Option<(LlmScorer, Box<dyn RateLimiter>)>,
    scorer: Scorer,
    selection: SelectionConfig,
    collector: Collector,
}

impl Pipeline {
    /// Pipeline with default scoring and selection, no throttling, no
    /// citation lookups, no notifier and no LLM stage
    pub fn new(
        source: Box<dyn CandidateSource>,
        history: Box<dyn HistoryStore>,
        renderer: Box<dyn ReportRenderer>,
    ) -> Self {
        Self {
            source,
            history,
            renderer,
            query_limiter: Box::new(Unthrottled),
            citations: None,
            notifier: None,
            llm: None,
            scorer: Scorer::default(),
            selection: SelectionConfig::default(),
            collector: Collector::new(30, 100),
        }
    }

    /// Wire up the real connectors described by a config
    pub fn from_config(config: &Config, notify: bool) -> Result<Self> {
        let source = build_source(config)?;
        let history = Box::new(JsonHistoryStore::new(&config.history_file));
        let renderer = Box::new(CsvReport::new(&config.output_dir));

        let mut pipeline = Self::new(source, history, renderer)
            .with_query_limiter(Box::new(IntervalLimiter::from_millis(config.query_interval_ms)))
            .with_scorer(Scorer::new(config.scoring.clone()))
            .with_selection(config.selection.clone())
            .with_collector(Collector::new(config.days_back, config.max_results_per_query));

        if config.citations_enabled {
            let client = SemanticScholarCitations::new(config.semantic_scholar_api_key.clone())?
                .with_base_url(&config.semantic_scholar_url);
            pipeline = pipeline.with_citations(
                Box::new(client),
                Box::new(IntervalLimiter::from_millis(config.citation_interval_ms)),
            );
        }
        if notify {
            pipeline = pipeline.with_notifier(Box::new(LogNotifier));
        }
        if config.llm.enabled {
            let scorer = LlmScorer::new(config.llm.clone())?;
            pipeline = pipeline.with_llm(scorer, Box::new(IntervalLimiter::from_millis(config.llm.delay_ms)));
        }

        Ok(pipeline)
    }

    pub fn with_query_limiter(mut self, limiter: Box<dyn RateLimiter>) -> Self {
        self.query_limiter = limiter;
        self
    }

    pub fn with_citations(mut self, source: Box<dyn CitationSource>, limiter: Box<dyn RateLimiter>) -> Self {
        self.citations = Some((source, limiter));
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_llm(mut self, scorer: LlmScorer, limiter: Box<dyn RateLimiter>) -> Self {
        self.llm = Some((scorer, limiter));
        self
    }

    pub fn with_scorer(mut self, scorer: Scorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_selection(mut self, selection: SelectionConfig) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_collector(mut self, collector: Collector) -> Self {
        self.collector = collector;
        self
    }

    /// Execute one run against a taxonomy.
    ///
    /// The history is written once, at the end, and only if every earlier
    /// phase succeeded. It is written even when nothing was selected.
    pub async fn run(&self, taxonomy: &Taxonomy, now: DateTime<Utc>) -> Result<RunSummary> {
        if taxonomy.is_empty() {
            return Err(PaperwatchError::Taxonomy("taxonomy has no keyword blocks".to_string()));
        }

        let date = now.format("%Y-%m-%d").to_string();
        let queries = taxonomy.queries();
        info!(date = %date, blocks = taxonomy.blocks().len(), queries = queries.len(), "Starting run");

        let mut history = load_or_empty(self.history.as_ref());

        let batches = self
            .collector
            .collect(self.source.as_ref(), self.query_limiter.as_ref(), &queries)
            .await;
        let collected = batches.iter().map(Vec::len).sum();

        let merged = dedup::merge(batches);
        let unique = merged.len();
        let unseen = dedup::filter_unseen(merged, &mut history);
        let unseen_count = unseen.len();

        let mut scored = self.scorer.score_all(unseen, taxonomy, now);
        let matched = scored.iter().filter(|p| p.tier() != Tier::None).count();
        info!(unseen = unseen_count, matched = matched, "Scoring complete");

        if let Some((source, limiter)) = &self.citations {
            enrich_citations(&mut scored, source.as_ref(), limiter.as_ref()).await;
        }

        let mut selected = select(scored, &self.selection);

        let mut usage = TokenUsage::default();
        if let Some((llm, limiter)) = &self.llm {
            let keywords = taxonomy.keywords();
            let (kept, llm_usage) = llm.filter(selected, &keywords, limiter.as_ref()).await;
            selected = kept;
            usage = llm_usage;
        }

        let mut report = None;
        let mut notified = false;
        if selected.is_empty() {
            warn!(date = %date, "No papers selected, skipping report");
        } else {
            let path = self.renderer.render(&selected, &date)?;
            if let Some(notifier) = &self.notifier {
                notified = notifier.notify(&selected, &path, &date).await;
                if !notified {
                    warn!(path = %path.display(), "Notification failed");
                }
            }
            report = Some(path);
        }

        history.touch(now);
        self.history.save(&history)?;

        info!(
            date = %date,
            collected = collected,
            unique = unique,
            unseen = unseen_count,
            selected = selected.len(),
            "Run complete"
        );

        Ok(RunSummary {
            date,
            queries: queries.len(),
            collected,
            unique,
            unseen: unseen_count,
            matched,
            selected,
            report,
            notified,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
    }
}

/// Score papers against keyword text without touching sources or history.
///
/// Results are ordered by descending score. Keyword text that yields no block
/// is an error.
pub fn score_offline(
    keywords: &str,
    papers: Vec<Paper>,
    mode: TaxonomyMode,
    scoring: ScoringConfig,
    now: DateTime<Utc>,
) -> Result<Vec<ScoredPaper>> {
    let taxonomy = Taxonomy::resolve(Some(keywords), mode, MissingKeywords::Fail)?;
    let mut scored = Scorer::new(scoring).score_all(papers, &taxonomy, now);
    scored.sort_by(|a, b| b.score().total_cmp(&a.score()));
    Ok(scored)
}

/// One connector, or a merging wrapper when several are configured
fn build_source(config: &Config) -> Result<Box<dyn CandidateSource>> {
    let mut sources: Vec<Box<dyn CandidateSource>> = Vec::new();

    for name in &config.sources {
        let source: Box<dyn CandidateSource> = match name.as_str() {
            "arxiv" => Box::new(ArxivSource::new()?.with_base_url(&config.arxiv_url)),
            "semantic_scholar" => Box::new(
                SemanticScholarSource::new(config.semantic_scholar_api_key.clone())?
                    .with_base_url(&config.semantic_scholar_url),
            ),
            "openalex" => Box::new(
                OpenAlexSource::new(config.openalex_email.clone())?.with_base_url(&config.openalex_url),
            ),
            other => {
                return Err(PaperwatchError::Config(format!("unknown source '{}'", other)));
            }
        };
        sources.push(source);
    }

    if sources.len() == 1 {
        if let Some(only) = sources.pop() {
            return Ok(only);
        }
    }
    Ok(Box::new(MultiSource::new(sources)))
}
