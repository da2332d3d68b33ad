//! Keyword taxonomy: topic blocks split into core and extended keywords.
//!
//! A keyword file is a plain-text document. Blank lines separate topic
//! blocks; the first line of a block is its title unless it is itself a
//! section header. Header lines containing "keywords"/"关键词" open the core
//! section, lines containing "extended"/"expanded"/"扩展" switch the rest of the
//! block to the extended section.
//!
//! ```text
//! Industrial Organization
//! Core keywords: "market structure", demand estimation
//! 市场结构、需求估计
//! Extended keywords
//! pricing, oligopoly
//! ```

use crate::error::{PaperwatchError, Result};
use crate::translations::translate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{info, warn};

/// Markers that switch a block to its extended section
const EXTENDED_MARKERS: &[&str] = &["extended", "expanded", "扩展"];

/// Markers of a (core) keyword section header
const KEYWORD_MARKERS: &[&str] = &["keywords", "关键词"];

/// Queries used when a block derives no searchable query at all
pub const FALLBACK_QUERIES: &[&str] = &["industrial organization", "market structure"];

/// Name of the single block produced in flat mode
pub const FLAT_BLOCK_NAME: &str = "All Topics";

/// Quoted phrase, or a run of characters that are not separators
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"]+)"|[^\s,，、·;；"]+"#).expect("token regex")
});

/// How the keyword universe is partitioned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxonomyMode {
    /// One keyword block per topic, each with its own caps
    #[default]
    Blocks,
    /// All topics merged into a single keyword universe
    Flat,
}

/// What to do when the keyword file is absent or empty
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingKeywords {
    /// Abort with a taxonomy error
    #[default]
    Fail,
    /// Substitute the demonstration blocks and warn
    Defaults,
}

/// A named topic with core and extended keywords
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordBlock {
    pub name: String,
    pub core: Vec<String>,
    pub extended: Vec<String>,
    queries: Vec<String>,
}

impl KeywordBlock {
    /// Build a block, case-folding and deduplicating keywords.
    ///
    /// A keyword listed as core is dropped from the extended list so it never
    /// counts twice. Search queries are derived once here.
    pub fn new<S: AsRef<str>>(name: impl Into<String>, core: &[S], extended: &[S]) -> Self {
        let mut seen = HashSet::new();
        let core = normalize_keywords(core, &mut seen);
        let extended = normalize_keywords(extended, &mut seen);
        let queries = derive_queries(core.iter().chain(extended.iter()));

        Self {
            name: name.into(),
            core,
            extended,
            queries,
        }
    }

    /// Search queries derived from the keywords
    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    /// Core keywords followed by extended keywords
    pub fn keywords(&self) -> impl Iterator<Item = &String> {
        self.core.iter().chain(self.extended.iter())
    }
}

fn normalize_keywords<S: AsRef<str>>(raw: &[S], seen: &mut HashSet<String>) -> Vec<String> {
    raw.iter()
        .map(|k| k.as_ref().trim().to_lowercase())
        .filter(|k| k.chars().count() > 1)
        .filter(|k| seen.insert(k.clone()))
        .collect()
}

/// ASCII tokens are used verbatim, others go through the translation table.
fn derive_queries<'a>(keywords: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut queries: Vec<String> = Vec::new();

    for keyword in keywords {
        let query = if keyword.is_ascii() {
            Some(keyword.to_lowercase())
        } else {
            translate(keyword).map(str::to_string)
        };

        if let Some(query) = query {
            if !queries.contains(&query) {
                queries.push(query);
            }
        }
    }

    if queries.is_empty() {
        queries = FALLBACK_QUERIES.iter().map(|q| q.to_string()).collect();
    }
    queries
}

/// Parsed keyword taxonomy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Taxonomy {
    blocks: Vec<KeywordBlock>,
}

impl Taxonomy {
    pub fn from_blocks(blocks: Vec<KeywordBlock>) -> Self {
        Self { blocks }
    }

    /// Parse keyword file text. Blocks without any keyword are skipped,
    /// so the result may be empty.
    pub fn parse(text: &str, mode: TaxonomyMode) -> Self {
        let mut blocks: Vec<KeywordBlock> = Vec::new();

        for lines in split_blocks(text) {
            if let Some(block) = parse_block(&lines, blocks.len() + 1) {
                info!(
                    block = %block.name,
                    core = block.core.len(),
                    extended = block.extended.len(),
                    queries = ?block.queries,
                    "Loaded keyword block"
                );
                blocks.push(block);
            }
        }

        Self::from_blocks(blocks).with_mode(mode)
    }

    /// Resolve a taxonomy from an optional keyword text, applying the
    /// missing-keywords policy when the text is absent or yields nothing.
    pub fn resolve(text: Option<&str>, mode: TaxonomyMode, missing: MissingKeywords) -> Result<Self> {
        let parsed = text
            .map(|t| Self::parse(t, mode))
            .filter(|t| !t.is_empty());

        match (parsed, missing) {
            (Some(taxonomy), _) => Ok(taxonomy),
            (None, MissingKeywords::Fail) => Err(PaperwatchError::Taxonomy(
                "keyword file is missing or contains no keywords".to_string(),
            )),
            (None, MissingKeywords::Defaults) => {
                warn!("No keyword blocks found, using default demonstration blocks");
                Ok(Self::defaults().with_mode(mode))
            }
        }
    }

    /// Load a keyword file
    pub fn load(path: &Path, mode: TaxonomyMode, missing: MissingKeywords) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Keyword file not found");
                None
            }
            Err(e) => return Err(e.into()),
        };
        Self::resolve(text.as_deref(), mode, missing)
    }

    /// Demonstration taxonomy used by the lenient missing-keywords policy
    pub fn defaults() -> Self {
        Self::from_blocks(vec![
            KeywordBlock::new(
                "Industrial Organization",
                &["market structure", "industrial organization"],
                &["pricing"],
            ),
            KeywordBlock::new(
                "Shipping & Environment",
                &["shipping", "carbon emission"],
                &["maritime"],
            ),
        ])
    }

    fn with_mode(self, mode: TaxonomyMode) -> Self {
        match mode {
            TaxonomyMode::Blocks => self,
            TaxonomyMode::Flat => self.flattened(),
        }
    }

    /// Merge every block into a single keyword universe
    pub fn flattened(&self) -> Self {
        if self.blocks.is_empty() {
            return self.clone();
        }
        let core: Vec<&String> = self.blocks.iter().flat_map(|b| b.core.iter()).collect();
        let extended: Vec<&String> = self.blocks.iter().flat_map(|b| b.extended.iter()).collect();
        Self::from_blocks(vec![KeywordBlock::new(FLAT_BLOCK_NAME, &core, &extended)])
    }

    pub fn blocks(&self) -> &[KeywordBlock] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Union of all block queries, first occurrence order
    pub fn queries(&self) -> Vec<String> {
        let mut queries: Vec<String> = Vec::new();
        for query in self.blocks.iter().flat_map(|b| b.queries.iter()) {
            if !queries.contains(query) {
                queries.push(query.clone());
            }
        }
        queries
    }

    /// All keywords, core before extended within each block
    pub fn keywords(&self) -> Vec<String> {
        let mut keywords: Vec<String> = Vec::new();
        for keyword in self.blocks.iter().flat_map(|b| b.keywords()) {
            if !keywords.contains(keyword) {
                keywords.push(keyword.clone());
            }
        }
        keywords
    }
}

/// Group non-blank lines into blocks separated by blank lines
fn split_blocks(text: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn contains_marker(line: &str, markers: &[&str]) -> bool {
    let lower = line.to_lowercase();
    markers.iter().any(|m| lower.contains(m))
}

fn is_extended_header(line: &str) -> bool {
    contains_marker(header_part(line), EXTENDED_MARKERS)
}

fn is_keyword_header(line: &str) -> bool {
    contains_marker(header_part(line), KEYWORD_MARKERS)
}

fn is_header(line: &str) -> bool {
    is_extended_header(line) || is_keyword_header(line)
}

/// Text before the first colon, or the whole line
fn header_part(line: &str) -> &str {
    line.split([':', '：']).next().unwrap_or(line)
}

/// Text after the first colon of a header line
fn header_payload(line: &str) -> &str {
    line.split_once([':', '：']).map(|(_, rest)| rest).unwrap_or("")
}

fn parse_block(lines: &[&str], ordinal: usize) -> Option<KeywordBlock> {
    let first = lines.first()?;

    let (name, keyword_lines) = if is_header(first) {
        (format!("Topic Block {ordinal}"), lines)
    } else {
        (clean_title(first), &lines[1..])
    };

    let mut core: Vec<String> = Vec::new();
    let mut extended: Vec<String> = Vec::new();
    let mut in_extended = false;

    for &line in keyword_lines {
        let content = if is_extended_header(line) {
            in_extended = true;
            header_payload(line)
        } else if is_keyword_header(line) {
            header_payload(line)
        } else {
            line
        };

        let target = if in_extended { &mut extended } else { &mut core };
        target.extend(tokenize(content));
    }

    if core.is_empty() && extended.is_empty() {
        return None;
    }
    Some(KeywordBlock::new(name, &core, &extended))
}

fn clean_title(line: &str) -> String {
    line.trim_start_matches('#')
        .trim()
        .trim_end_matches([':', '：'])
        .trim()
        .to_string()
}

/// Split a line into case-folded keyword tokens, dropping single characters
pub fn tokenize(line: &str) -> Vec<String> {
    TOKEN_RE
        .captures_iter(line)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
        .map(|m| m.as_str().trim().to_lowercase())
        .filter(|t| t.chars().count() > 1)
        .collect()
}
