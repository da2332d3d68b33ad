//! paperwatch - Daily keyword-scored paper digests
//!
//! Collects recent papers from arXiv, Semantic Scholar and OpenAlex, scores
//! them against a two-tier keyword file, and writes a per-topic report.
//!
//! ## Usage
//!
//! ### CLI Mode
//! ```bash
//! paperwatch run --config paperwatch.json
//! paperwatch score --keywords keywords.txt --papers papers.json
//! paperwatch taxonomy --keywords keywords.txt
//! paperwatch history show
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! paperwatch serve --port 3000
//! ```

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use paperwatch::config::Config;
use paperwatch::history::{HistoryStore, JsonHistoryStore};
use paperwatch::paper::{Paper, ScoredPaper};
use paperwatch::pipeline::{score_offline, Pipeline};
use paperwatch::scorer::{GatePolicy, ScoringConfig};
use paperwatch::selector::SelectionPolicy;
use paperwatch::taxonomy::{MissingKeywords, Taxonomy, TaxonomyMode};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Daily keyword-scored paper digests
#[derive(Parser)]
#[command(name = "paperwatch")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (default: ./paperwatch.json, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full daily pipeline
    Run {
        /// Keyword file (overrides config)
        #[arg(short, long)]
        keywords: Option<PathBuf>,

        /// Recency window in days
        #[arg(long)]
        days: Option<u32>,

        /// Core-tier papers kept per block
        #[arg(long)]
        core_limit: Option<usize>,

        /// Extended-tier papers kept per block
        #[arg(long)]
        extended_limit: Option<usize>,

        /// Selection policy
        #[arg(long, value_parser = ["per_block", "global"])]
        policy: Option<String>,

        /// Skip the notifier
        #[arg(long)]
        no_notify: bool,
    },

    /// Score a JSON array of papers against a keyword file, offline
    Score {
        /// Keyword file
        #[arg(short, long)]
        keywords: PathBuf,

        /// JSON file holding an array of papers
        #[arg(short, long)]
        papers: PathBuf,

        /// Extended keywords cannot qualify a paper on their own
        #[arg(long)]
        strict: bool,

        /// Merge all blocks into one
        #[arg(long)]
        flat: bool,
    },

    /// Print parsed keyword blocks and derived search queries
    Taxonomy {
        /// Keyword file (overrides config)
        #[arg(short, long)]
        keywords: Option<PathBuf>,

        /// Merge all blocks into one
        #[arg(long)]
        flat: bool,
    },

    /// Inspect or reset the seen-paper history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Run as HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Show history size and last update
    Show {
        /// Also list every stored id
        #[arg(long)]
        ids: bool,
    },
    /// Show history file path
    Path,
    /// Delete the history file
    Clear,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.json_logs {
        fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        fmt().with_env_filter(filter).with_target(true).with_thread_ids(false).init();
    }

    let mut config = Config::discover(cli.config.as_deref()).context("Failed to load config")?;
    config.apply_env().context("Invalid environment override")?;

    match cli.command {
        Commands::Run {
            keywords,
            days,
            core_limit,
            extended_limit,
            policy,
            no_notify,
        } => {
            if let Some(keywords) = keywords {
                config.keywords_file = keywords;
            }
            if let Some(days) = days {
                config.days_back = days;
            }
            if let Some(limit) = core_limit {
                config.selection.core_limit = limit;
            }
            if let Some(limit) = extended_limit {
                config.selection.extended_limit = limit;
            }
            if let Some(policy) = policy {
                config.selection.policy = match policy.as_str() {
                    "global" => SelectionPolicy::Global,
                    _ => SelectionPolicy::PerBlock,
                };
            }
            run_pipeline(config, !no_notify).await
        }
        Commands::Score {
            keywords,
            papers,
            strict,
            flat,
        } => score_file(&config, &keywords, &papers, strict, flat),
        Commands::Taxonomy { keywords, flat } => {
            let path = keywords.unwrap_or_else(|| config.keywords_file.clone());
            let mode = if flat { TaxonomyMode::Flat } else { config.taxonomy_mode };
            print_taxonomy(&path, mode, config.on_missing_keywords)
        }
        Commands::History { action } => handle_history(&config, action),
        Commands::Serve { port, host } => run_server(host, port, config.scoring).await,
    }
}

// ============================================================================
// Pipeline
// ============================================================================

async fn run_pipeline(config: Config, notify: bool) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let taxonomy = Taxonomy::load(&config.keywords_file, config.taxonomy_mode, config.on_missing_keywords)
        .with_context(|| format!("Failed to load keywords from {:?}", config.keywords_file))?;

    let pipeline = Pipeline::from_config(&config, notify)?;
    let summary = pipeline.run(&taxonomy, Utc::now()).await?;

    println!();
    println!("=== paperwatch {} ===", summary.date);
    println!("Queries:   {}", summary.queries);
    println!("Collected: {} ({} unique, {} new)", summary.collected, summary.unique, summary.unseen);
    println!("Matched:   {}", summary.matched);
    println!("Selected:  {}", summary.selected.len());
    if summary.prompt_tokens > 0 {
        println!(
            "LLM tokens: {} prompt / {} completion",
            summary.prompt_tokens, summary.completion_tokens
        );
    }
    match &summary.report {
        Some(path) => println!("Report:    {:?}", path),
        None => println!("Report:    none (nothing selected)"),
    }
    Ok(())
}

fn score_file(config: &Config, keywords: &Path, papers: &Path, strict: bool, flat: bool) -> Result<()> {
    let keyword_text =
        std::fs::read_to_string(keywords).with_context(|| format!("Failed to read {:?}", keywords))?;
    let paper_json = std::fs::read_to_string(papers).with_context(|| format!("Failed to read {:?}", papers))?;
    let papers: Vec<Paper> = serde_json::from_str(&paper_json).context("Papers file must be a JSON array")?;

    let mut scoring = config.scoring.clone();
    if strict {
        scoring.gate = GatePolicy::Strict;
    }
    let mode = if flat { TaxonomyMode::Flat } else { config.taxonomy_mode };

    let scored = score_offline(&keyword_text, papers, mode, scoring, Utc::now())?;
    println!("{}", serde_json::to_string_pretty(&scored)?);
    Ok(())
}

fn print_taxonomy(path: &Path, mode: TaxonomyMode, missing: MissingKeywords) -> Result<()> {
    let taxonomy = Taxonomy::load(path, mode, missing)?;

    for block in taxonomy.blocks() {
        println!("[{}]", block.name);
        println!("  core:     {}", block.core.join(", "));
        println!("  extended: {}", block.extended.join(", "));
        println!("  queries:  {}", block.queries().join(" | "));
    }
    println!();
    println!("{} blocks, {} queries", taxonomy.blocks().len(), taxonomy.queries().len());
    Ok(())
}

// ============================================================================
// History Management
// ============================================================================

fn handle_history(config: &Config, action: HistoryAction) -> Result<()> {
    let store = JsonHistoryStore::new(&config.history_file);

    match action {
        HistoryAction::Show { ids } => {
            let history = store.load().context("Failed to read history")?;
            println!("History file: {:?}", store.path());
            println!("Papers seen:  {}", history.len());
            match history.last_update() {
                Some(ts) => println!("Last update:  {}", ts.to_rfc3339()),
                None => println!("Last update:  never"),
            }
            if ids {
                for id in history.ids() {
                    println!("{}", id);
                }
            }
        }
        HistoryAction::Path => {
            println!("History file: {:?}", store.path());
        }
        HistoryAction::Clear => {
            store.clear()?;
            println!("History cleared.");
        }
    }

    Ok(())
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(host: String, port: u16, scoring: ScoringConfig) -> Result<()> {
    info!(host = %host, port = port, "Starting HTTP server");
    println!("Starting server at http://{}:{}", host, port);

    let app_state = Arc::new(AppState { scoring });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/score", post(score_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

struct AppState {
    scoring: ScoringConfig,
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Score request body
#[derive(Debug, Deserialize)]
struct ScoreRequest {
    /// Keyword file contents
    keywords: String,
    papers: Vec<Paper>,
    gate: Option<GatePolicy>,
    mode: Option<TaxonomyMode>,
}

/// Score response
#[derive(Debug, Serialize)]
struct ScoreResponse {
    status: String,
    count: usize,
    results: Vec<ScoredPaper>,
}

/// Score endpoint handler
async fn score_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScoreRequest>,
) -> (StatusCode, Json<ScoreResponse>) {
    info!(papers = req.papers.len(), "Score request");

    let mut scoring = state.scoring.clone();
    if let Some(gate) = req.gate {
        scoring.gate = gate;
    }
    let mode = req.mode.unwrap_or_default();

    match score_offline(&req.keywords, req.papers, mode, scoring, Utc::now()) {
        Ok(results) => (
            StatusCode::OK,
            Json(ScoreResponse {
                status: "success".to_string(),
                count: results.len(),
                results,
            }),
        ),
        Err(e) => {
            error!(error = %e, "Score request rejected");
            (
                StatusCode::BAD_REQUEST,
                Json(ScoreResponse {
                    status: format!("error: {}", e),
                    count: 0,
                    results: vec![],
                }),
            )
        }
    }
}
