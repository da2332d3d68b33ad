//! Thresholding, per-block caps and final ordering.

use crate::paper::{ScoredPaper, Tier};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// How the final list is assembled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Independent core and extended caps inside every keyword block
    #[default]
    PerBlock,
    /// One ranked list with a single total cap
    Global,
}

/// Primary ranking key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankBy {
    /// Citation count first, score breaks ties
    #[default]
    Citations,
    /// Score first, citation count breaks ties
    Score,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub policy: SelectionPolicy,
    pub rank_by: RankBy,
    /// Minimum keyword score for a paper to be eligible
    pub threshold: f64,
    /// Core-tier papers kept per block
    pub core_limit: usize,
    /// Extended-tier papers kept per block
    pub extended_limit: usize,
    /// Total cap under the global policy
    pub max_total: usize,
    /// Global policy: when nothing clears the threshold, take this many by raw score
    pub fallback_top_k: Option<usize>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            policy: SelectionPolicy::default(),
            rank_by: RankBy::default(),
            threshold: 0.0,
            core_limit: 30,
            extended_limit: 10,
            max_total: 50,
            fallback_top_k: Some(5),
        }
    }
}

/// Descending order by the configured ranking key
pub fn rank_cmp(a: &ScoredPaper, b: &ScoredPaper, rank_by: RankBy) -> Ordering {
    let by_citations = b.paper.citation_count.cmp(&a.paper.citation_count);
    let by_score = b.score().total_cmp(&a.score());
    match rank_by {
        RankBy::Citations => by_citations.then(by_score),
        RankBy::Score => by_score.then(by_citations),
    }
}

fn is_eligible(paper: &ScoredPaper, threshold: f64) -> bool {
    paper.tier() != Tier::None && paper.score() >= threshold
}

/// Apply the configured policy to a scored batch
pub fn select(papers: Vec<ScoredPaper>, config: &SelectionConfig) -> Vec<ScoredPaper> {
    let candidates = papers.len();
    let selected = match config.policy {
        SelectionPolicy::Global => select_global(papers, config),
        SelectionPolicy::PerBlock => select_per_block(papers, config),
    };

    info!(
        candidates = candidates,
        selected = selected.len(),
        policy = ?config.policy,
        rank_by = ?config.rank_by,
        "Selection complete"
    );
    selected
}

/// Rank, threshold and truncate as one list.
///
/// If nothing clears the threshold but candidates exist, the top
/// `fallback_top_k` papers by raw score are returned instead.
pub fn select_global(papers: Vec<ScoredPaper>, config: &SelectionConfig) -> Vec<ScoredPaper> {
    let (mut eligible, mut rest): (Vec<_>, Vec<_>) =
        papers.into_iter().partition(|p| is_eligible(p, config.threshold));

    if eligible.is_empty() {
        if let Some(k) = config.fallback_top_k.filter(|k| *k > 0 && !rest.is_empty()) {
            warn!(
                threshold = config.threshold,
                fallback = k,
                "No paper cleared the threshold, falling back to top scores"
            );
            rest.sort_by(|a, b| rank_cmp(a, b, RankBy::Score));
            rest.truncate(k);
            return rest;
        }
        return Vec::new();
    }

    eligible.sort_by(|a, b| rank_cmp(a, b, config.rank_by));
    eligible.truncate(config.max_total);
    eligible
}

/// Cap core and extended tiers independently inside every block.
///
/// The result is ordered by block name, then by the ranking key.
pub fn select_per_block(papers: Vec<ScoredPaper>, config: &SelectionConfig) -> Vec<ScoredPaper> {
    let mut by_block: BTreeMap<String, (Vec<ScoredPaper>, Vec<ScoredPaper>)> = BTreeMap::new();

    for paper in papers.into_iter().filter(|p| is_eligible(p, config.threshold)) {
        let entry = by_block.entry(paper.block_name().to_string()).or_default();
        match paper.tier() {
            Tier::Core => entry.0.push(paper),
            _ => entry.1.push(paper),
        }
    }

    let mut selected = Vec::new();
    for (block, (mut core, mut extended)) in by_block {
        core.sort_by(|a, b| rank_cmp(a, b, config.rank_by));
        extended.sort_by(|a, b| rank_cmp(a, b, config.rank_by));
        core.truncate(config.core_limit);
        extended.truncate(config.extended_limit);

        debug!(block = %block, core = core.len(), extended = extended.len(), "Block selection");

        let mut block_papers: Vec<ScoredPaper> = core.into_iter().chain(extended).collect();
        block_papers.sort_by(|a, b| rank_cmp(a, b, config.rank_by));
        selected.extend(block_papers);
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::{sample_paper, Annotation};

    fn scored(id: &str, block: &str, tier: Tier, score: f64, citations: u64) -> ScoredPaper {
        let mut paper = sample_paper(id, id);
        paper.citation_count = citations;
        ScoredPaper::new(
            paper,
            Annotation {
                score,
                matched: Vec::new(),
                tier,
                block: Some(block.to_string()),
            },
        )
    }

    fn ids(papers: &[ScoredPaper]) -> Vec<&str> {
        papers.iter().map(|p| p.paper.identifier.as_str()).collect()
    }

    #[test]
    fn test_global_threshold_scenario() {
        let config = SelectionConfig {
            policy: SelectionPolicy::Global,
            rank_by: RankBy::Score,
            threshold: 2.0,
            fallback_top_k: None,
            ..Default::default()
        };
        let papers = vec![
            scored("a", "B", Tier::Core, 5.0, 0),
            scored("b", "B", Tier::Extended, 1.5, 0),
            scored("c", "B", Tier::None, 0.0, 0),
        ];
        let selected = select(papers, &config);
        assert_eq!(ids(&selected), vec!["a"]);
    }

    #[test]
    fn test_global_fallback_top_k() {
        let config = SelectionConfig {
            policy: SelectionPolicy::Global,
            threshold: 100.0,
            fallback_top_k: Some(2),
            ..Default::default()
        };
        let papers = vec![
            scored("low", "B", Tier::Extended, 0.5, 0),
            scored("high", "B", Tier::Core, 7.0, 0),
            scored("mid", "B", Tier::None, 2.0, 0),
        ];
        assert_eq!(ids(&select(papers, &config)), vec!["high", "mid"]);
    }

    #[test]
    fn test_global_fallback_empty_input() {
        let config = SelectionConfig {
            policy: SelectionPolicy::Global,
            ..Default::default()
        };
        assert!(select(Vec::new(), &config).is_empty());
    }

    #[test]
    fn test_global_citation_ranking_and_cap() {
        let config = SelectionConfig {
            policy: SelectionPolicy::Global,
            max_total: 2,
            ..Default::default()
        };
        let papers = vec![
            scored("a", "B", Tier::Core, 9.0, 1),
            scored("b", "B", Tier::Core, 3.0, 50),
            scored("c", "B", Tier::Core, 4.0, 50),
        ];
        assert_eq!(ids(&select(papers, &config)), vec!["c", "b"]);
    }

    #[test]
    fn test_per_block_caps() {
        let config = SelectionConfig {
            core_limit: 2,
            extended_limit: 1,
            ..Default::default()
        };
        let mut papers = Vec::new();
        for i in 0..5 {
            papers.push(scored(&format!("io-core-{i}"), "IO", Tier::Core, 5.0, i));
            papers.push(scored(&format!("io-ext-{i}"), "IO", Tier::Extended, 2.0, i));
            papers.push(scored(&format!("ship-core-{i}"), "Shipping", Tier::Core, 5.0, i));
        }

        let selected = select(papers, &config);
        for block in ["IO", "Shipping"] {
            let core = selected
                .iter()
                .filter(|p| p.block_name() == block && p.tier() == Tier::Core)
                .count();
            let extended = selected
                .iter()
                .filter(|p| p.block_name() == block && p.tier() == Tier::Extended)
                .count();
            assert!(core <= config.core_limit);
            assert!(extended <= config.extended_limit);
        }
        assert_eq!(
            ids(&selected),
            vec!["io-core-4", "io-ext-4", "io-core-3", "ship-core-4", "ship-core-3"]
        );
    }

    #[test]
    fn test_per_block_drops_unmatched() {
        let papers = vec![
            scored("none", "IO", Tier::None, 3.0, 100),
            scored("core", "IO", Tier::Core, 5.0, 0),
        ];
        assert_eq!(ids(&select(papers, &SelectionConfig::default())), vec!["core"]);
    }

    #[test]
    fn test_rank_by_score() {
        let config = SelectionConfig {
            rank_by: RankBy::Score,
            ..Default::default()
        };
        let papers = vec![
            scored("cited", "IO", Tier::Core, 5.0, 100),
            scored("relevant", "IO", Tier::Core, 9.0, 0),
        ];
        assert_eq!(ids(&select(papers, &config)), vec!["relevant", "cited"]);
    }
}
