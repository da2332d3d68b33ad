//! Cross-query and cross-source deduplication.

use crate::history::SeenHistory;
use crate::paper::Paper;
use std::collections::HashSet;
use tracing::info;

/// Merge candidate batches into a list unique by identity key.
///
/// First occurrence wins; later duplicates are dropped whole, never merged
/// field by field.
pub fn merge<I>(batches: I) -> Vec<Paper>
where
    I: IntoIterator<Item = Vec<Paper>>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();
    let mut total = 0usize;

    for batch in batches {
        for paper in batch {
            total += 1;
            if seen.insert(paper.identity_key()) {
                merged.push(paper);
            }
        }
    }

    info!(total = total, unique = merged.len(), "Merged candidate batches");
    merged
}

/// Drop papers already recorded in the history, and record the rest.
///
/// Every returned paper is marked seen immediately, before any scoring or
/// thresholding. A paper that is later rejected by the selector is still
/// never offered again: each distinct paper is evaluated once over the
/// lifetime of the history store.
pub fn filter_unseen(papers: Vec<Paper>, history: &mut SeenHistory) -> Vec<Paper> {
    let before = papers.len();
    let unseen: Vec<Paper> = papers
        .into_iter()
        .filter(|paper| history.insert(paper.identity_key()))
        .collect();

    info!(
        candidates = before,
        unseen = unseen.len(),
        history = history.len(),
        "Filtered previously seen papers"
    );
    unseen
}
