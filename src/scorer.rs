//! Keyword relevance scoring.
//!
//! Matching is plain case-insensitive substring containment over
//! `title + " " + abstract`. Substrings inside longer words count as hits
//! ("pricing" matches "repricing"); there is no tokenisation.
//!
//! Weights are additive and uncapped:
//!
//! | signal | weight |
//! |---|---|
//! | core keyword in title | 5.0 |
//! | core keyword in abstract only | 2.0 |
//! | core keyword only after removing whitespace | 1.0 |
//! | extended keyword in title | 2.0 |
//! | extended keyword in abstract only | 0.5 |
//! | each classification tag with a recognised prefix | 0.5 |
//! | published within 1 day / 3 days | 2.0 / 1.0 |

use crate::paper::{Annotation, Paper, ScoredPaper, Tier};
use crate::taxonomy::{KeywordBlock, Taxonomy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CORE_TITLE_WEIGHT: f64 = 5.0;
pub const CORE_BODY_WEIGHT: f64 = 2.0;
pub const CORE_LOOSE_WEIGHT: f64 = 1.0;
pub const EXTENDED_TITLE_WEIGHT: f64 = 2.0;
pub const EXTENDED_BODY_WEIGHT: f64 = 0.5;
pub const CATEGORY_BONUS: f64 = 0.5;
pub const RECENT_DAY_BONUS: f64 = 2.0;
pub const RECENT_DAYS_BONUS: f64 = 1.0;

/// Whether extended keywords can qualify a paper on their own
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePolicy {
    /// Extended-only matches qualify at the extended tier
    #[default]
    Lenient,
    /// No core hit means score 0 and tier none
    Strict,
}

/// Scoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub gate: GatePolicy,
    /// Classification tag prefixes that earn the category bonus
    pub category_prefixes: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            gate: GatePolicy::default(),
            category_prefixes: ["econ", "q-fin", "stat", "cs.CY", "physics.soc-ph", "physics.ao-ph"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// Scores papers against keyword blocks
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score one paper against one block
    pub fn score(&self, paper: &Paper, block: &KeywordBlock, now: DateTime<Utc>) -> Annotation {
        let title = paper.title.to_lowercase();
        let haystack = format!("{} {}", title, paper.abstract_text.to_lowercase());
        let compact_haystack = strip_whitespace(&haystack);

        let mut score = 0.0;
        let mut matched: Vec<String> = Vec::new();

        for keyword in &block.core {
            let needle = keyword.to_lowercase();
            if haystack.contains(&needle) {
                matched.push(keyword.clone());
                score += if title.contains(&needle) {
                    CORE_TITLE_WEIGHT
                } else {
                    CORE_BODY_WEIGHT
                };
            } else {
                let compact = strip_whitespace(&needle);
                if !compact.is_empty() && compact_haystack.contains(&compact) {
                    score += CORE_LOOSE_WEIGHT;
                }
            }
        }
        let core_hits = matched.len();

        if core_hits == 0 && self.config.gate == GatePolicy::Strict {
            return Annotation {
                score: 0.0,
                matched: Vec::new(),
                tier: Tier::None,
                block: Some(block.name.clone()),
            };
        }

        for keyword in &block.extended {
            if matched.contains(keyword) {
                continue;
            }
            let needle = keyword.to_lowercase();
            if haystack.contains(&needle) {
                matched.push(keyword.clone());
                score += if title.contains(&needle) {
                    EXTENDED_TITLE_WEIGHT
                } else {
                    EXTENDED_BODY_WEIGHT
                };
            }
        }

        score += self.category_bonus(paper);
        score += recency_bonus(paper.published, now);

        let tier = if core_hits > 0 {
            Tier::Core
        } else if matched.len() > core_hits {
            Tier::Extended
        } else {
            Tier::None
        };

        Annotation {
            score,
            matched,
            tier,
            block: Some(block.name.clone()),
        }
    }

    /// Score against every block and keep the best attribution.
    ///
    /// Higher tier wins, then higher score; ties go to the earlier block.
    pub fn score_best(&self, paper: &Paper, taxonomy: &Taxonomy, now: DateTime<Utc>) -> Annotation {
        let mut best: Option<Annotation> = None;

        for block in taxonomy.blocks() {
            let candidate = self.score(paper, block, now);
            let better = match &best {
                None => true,
                Some(current) => (candidate.tier, candidate.score) > (current.tier, current.score),
            };
            if better {
                best = Some(candidate);
            }
        }

        best.unwrap_or_default()
    }

    /// Score a batch of papers
    pub fn score_all(&self, papers: Vec<Paper>, taxonomy: &Taxonomy, now: DateTime<Utc>) -> Vec<ScoredPaper> {
        papers
            .into_iter()
            .map(|paper| {
                let annotation = self.score_best(&paper, taxonomy, now);
                debug!(
                    title = %paper.title.chars().take(50).collect::<String>(),
                    score = annotation.score,
                    tier = %annotation.tier,
                    block = ?annotation.block,
                    "Scored paper"
                );
                ScoredPaper::new(paper, annotation)
            })
            .collect()
    }

    /// Flat bonus per classification tag starting with a recognised prefix
    fn category_bonus(&self, paper: &Paper) -> f64 {
        let hits = paper
            .categories
            .iter()
            .filter(|tag| {
                self.config
                    .category_prefixes
                    .iter()
                    .any(|prefix| tag.starts_with(prefix.as_str()))
            })
            .count();
        hits as f64 * CATEGORY_BONUS
    }
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Bonus for papers published within the last one or three whole days
pub fn recency_bonus(published: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let days = (now - published).num_days();
    if days <= 1 {
        RECENT_DAY_BONUS
    } else if days <= 3 {
        RECENT_DAYS_BONUS
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn paper(title: &str, abstract_text: &str) -> Paper {
        Paper {
            title: title.to_string(),
            abstract_text: abstract_text.to_string(),
            published: now() - Duration::days(30),
            ..Default::default()
        }
    }

    fn block() -> KeywordBlock {
        KeywordBlock::new("IO", &["market structure", "demand estimation"], &["pricing", "welfare"])
    }

    #[test]
    fn test_core_hit_in_title_scenario() {
        let p = paper("Market Structure in Airline Pricing", "We study fares.");
        let a = Scorer::default().score(&p, &block(), now());
        assert_eq!(a.tier, Tier::Core);
        assert!(a.matched.contains(&"market structure".to_string()));
        // core in title 5.0 + extended "pricing" in title 2.0
        assert_eq!(a.score, 7.0);
        assert_eq!(a.block.as_deref(), Some("IO"));
    }

    #[test]
    fn test_core_hit_in_abstract_only() {
        let p = paper("Airlines", "A model of demand estimation with welfare effects.");
        let a = Scorer::default().score(&p, &block(), now());
        assert_eq!(a.tier, Tier::Core);
        assert_eq!(a.matched, vec!["demand estimation", "welfare"]);
        assert_eq!(a.score, CORE_BODY_WEIGHT + EXTENDED_BODY_WEIGHT);
    }

    #[test]
    fn test_substring_inside_longer_word_counts() {
        let p = paper("Dynamic repricing of seats", "");
        let a = Scorer::default().score(&p, &block(), now());
        assert_eq!(a.matched, vec!["pricing"]);
        assert_eq!(a.tier, Tier::Extended);
    }

    #[test]
    fn test_loose_match_adds_weight_without_tier() {
        let p = paper("Marketstructure and entry", "");
        let a = Scorer::default().score(&p, &block(), now());
        assert_eq!(a.score, CORE_LOOSE_WEIGHT);
        assert!(a.matched.is_empty());
        assert_eq!(a.tier, Tier::None);
    }

    #[test]
    fn test_strict_gate_zeroes_extended_only() {
        let scorer = Scorer::new(ScoringConfig {
            gate: GatePolicy::Strict,
            ..Default::default()
        });
        let mut p = paper("Optimal pricing of welfare programs", "");
        p.categories = vec!["econ.GN".to_string()];
        p.published = now();
        let a = scorer.score(&p, &block(), now());
        assert_eq!(a.score, 0.0);
        assert_eq!(a.tier, Tier::None);
        assert!(a.matched.is_empty());
    }

    #[test]
    fn test_strict_gate_keeps_extended_bonus_after_core() {
        let scorer = Scorer::new(ScoringConfig {
            gate: GatePolicy::Strict,
            ..Default::default()
        });
        let p = paper("Market structure", "and pricing");
        let a = scorer.score(&p, &block(), now());
        assert_eq!(a.tier, Tier::Core);
        assert_eq!(a.score, CORE_TITLE_WEIGHT + EXTENDED_BODY_WEIGHT);
    }

    #[test]
    fn test_lenient_extended_only_qualifies() {
        let p = paper("Welfare", "");
        let a = Scorer::default().score(&p, &block(), now());
        assert_eq!(a.tier, Tier::Extended);
        assert_eq!(a.score, EXTENDED_TITLE_WEIGHT);
    }

    #[test]
    fn test_category_bonus_once_per_tag() {
        let mut p = paper("Market structure", "");
        p.categories = vec!["econ.GN".to_string(), "econ.EM".to_string(), "cs.LG".to_string()];
        let a = Scorer::default().score(&p, &block(), now());
        assert_eq!(a.score, CORE_TITLE_WEIGHT + 2.0 * CATEGORY_BONUS);
    }

    #[test]
    fn test_recency_bonus() {
        assert_eq!(recency_bonus(now(), now()), RECENT_DAY_BONUS);
        assert_eq!(recency_bonus(now() - Duration::hours(47), now()), RECENT_DAY_BONUS);
        assert_eq!(recency_bonus(now() - Duration::days(3), now()), RECENT_DAYS_BONUS);
        assert_eq!(recency_bonus(now() - Duration::days(4), now()), 0.0);
    }

    #[test]
    fn test_case_insensitive() {
        let p = paper("DEMAND ESTIMATION for EVs", "");
        let a = Scorer::default().score(&p, &block(), now());
        assert_eq!(a.tier, Tier::Core);
        assert_eq!(a.score, CORE_TITLE_WEIGHT);
    }

    #[test]
    fn test_score_best_attribution() {
        let taxonomy = Taxonomy::from_blocks(vec![
            KeywordBlock::new("IO", &["market structure"], &["shipping"]),
            KeywordBlock::new("Shipping", &["shipping"], &["carbon"]),
        ]);
        let p = paper("Shipping markets", "");
        let a = Scorer::default().score_best(&p, &taxonomy, now());
        // core tier in the second block beats extended tier in the first
        assert_eq!(a.block.as_deref(), Some("Shipping"));
        assert_eq!(a.tier, Tier::Core);
    }

    #[test]
    fn test_score_best_tie_keeps_first_block() {
        let taxonomy = Taxonomy::from_blocks(vec![
            KeywordBlock::new("A", &["carbon"], &[] as &[&str]),
            KeywordBlock::new("B", &["carbon"], &[] as &[&str]),
        ]);
        let a = Scorer::default().score_best(&paper("Carbon", ""), &taxonomy, now());
        assert_eq!(a.block.as_deref(), Some("A"));
    }

    #[test]
    fn test_score_best_empty_taxonomy() {
        let a = Scorer::default().score_best(&paper("x", ""), &Taxonomy::default(), now());
        assert_eq!(a.tier, Tier::None);
        assert!(a.block.is_none());
    }

    #[test]
    fn test_core_tier_implies_substring() {
        let scorer = Scorer::default();
        let b = block();
        for (title, abs) in [
            ("Market structure", ""),
            ("x", "demandestimation"),
            ("Prices", "market\nstructure"),
            ("welfare", "pricing"),
        ] {
            let p = paper(title, abs);
            let a = scorer.score(&p, &b, now());
            if a.tier == Tier::Core {
                let text = format!("{title} {abs}").to_lowercase();
                assert!(b.core.iter().any(|k| text.contains(k.as_str())));
            }
        }
    }
}
