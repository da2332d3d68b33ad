//! Cross-run memory of already processed papers.
//!
//! The history is a flat set of identity keys plus the time it was last
//! written. It only grows. The JSON file store keeps the format readable
//! across runs:
//!
//! ```json
//! { "paper_ids": ["2401.00001", "..."], "last_update": "2024-01-15T09:00:00Z" }
//! ```

use crate::error::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Set of previously seen identity keys
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeenHistory {
    #[serde(rename = "paper_ids", default)]
    ids: BTreeSet<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    last_update: Option<DateTime<Utc>>,
}

/// Accept RFC 3339 timestamps and the naive ISO timestamps older files carry
fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

impl SeenHistory {
    pub fn contains(&self, key: &str) -> bool {
        self.ids.contains(key)
    }

    /// Record a key; returns true when it was not seen before
    pub fn insert(&mut self, key: String) -> bool {
        self.ids.insert(key)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.ids.iter()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_update = Some(now);
    }
}

/// Persistence for [`SeenHistory`]
pub trait HistoryStore: Send + Sync {
    fn load(&self) -> Result<SeenHistory>;
    fn save(&self, history: &SeenHistory) -> Result<()>;
}

/// Load a history, treating any failure as an empty history.
///
/// The worst case of a lost history is re-surfacing old papers, which is
/// preferable to aborting the run.
pub fn load_or_empty(store: &dyn HistoryStore) -> SeenHistory {
    match store.load() {
        Ok(history) => history,
        Err(e) => {
            warn!(error = %e, "Failed to load history, starting empty");
            SeenHistory::default()
        }
    }
}

/// History stored as a JSON file
#[derive(Debug, Clone)]
pub struct JsonHistoryStore {
    path: PathBuf,
}

impl JsonHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the history file
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            info!(path = %self.path.display(), "Cleared history");
        }
        Ok(())
    }
}

impl HistoryStore for JsonHistoryStore {
    /// A missing file is an empty history; a corrupt one is an error.
    fn load(&self) -> Result<SeenHistory> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "History file not found");
            return Ok(SeenHistory::default());
        }

        let content = std::fs::read_to_string(&self.path)?;
        let history: SeenHistory = serde_json::from_str(&content)?;
        info!(count = history.len(), path = %self.path.display(), "Loaded history");
        Ok(history)
    }

    /// Write to a sibling temp file and rename over the target.
    fn save(&self, history: &SeenHistory) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(history)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        info!(count = history.len(), path = %self.path.display(), "Saved history");
        Ok(())
    }
}

/// In-memory store for tests and one-off runs
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    inner: Mutex<SeenHistory>,
}

impl MemoryHistoryStore {
    pub fn new(history: SeenHistory) -> Self {
        Self {
            inner: Mutex::new(history),
        }
    }

    pub fn snapshot(&self) -> SeenHistory {
        self.guard().clone()
    }

    // The stored set is replaced whole, so a poisoned lock still guards valid data
    fn guard(&self) -> MutexGuard<'_, SeenHistory> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn load(&self) -> Result<SeenHistory> {
        Ok(self.snapshot())
    }

    fn save(&self, history: &SeenHistory) -> Result<()> {
        *self.guard() = history.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::filter_unseen;
    use crate::paper::sample_paper;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty() -> Result<()> {
        let store = JsonHistoryStore::new("/nonexistent/dir/history.json");
        assert!(store.load()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonHistoryStore::new(dir.path().join("nested").join("history.json"));

        let mut history = SeenHistory::default();
        history.insert("2401.00001".to_string());
        history.touch(Utc::now());
        store.save(&history)?;

        let loaded = store.load()?;
        assert_eq!(loaded, history);
        assert!(!dir.path().join("nested").join("history.json.tmp").exists());
        Ok(())
    }

    #[test]
    fn test_reads_legacy_format() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("paper_history.json");
        std::fs::write(
            &path,
            r#"{"paper_ids": ["a", "b"], "last_update": "2024-01-15T09:00:00.123456"}"#,
        )?;
        let store = JsonHistoryStore::new(&path);
        let loaded = store.load()?;
        assert_eq!(loaded.len(), 2);
        assert!(loaded.last_update().is_some());

        std::fs::write(&path, r#"{"paper_ids": ["a", "b"]}"#)?;
        let loaded = store.load()?;
        assert!(loaded.contains("a") && loaded.contains("b"));
        assert!(loaded.last_update().is_none());
        Ok(())
    }

    #[test]
    fn test_corrupt_file_degrades() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{not json")?;
        let store = JsonHistoryStore::new(&path);
        assert!(load_or_empty(&store).is_empty());
        Ok(())
    }

    #[test]
    fn test_one_shot_across_runs() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonHistoryStore::new(dir.path().join("history.json"));

        // run N: the paper is unseen, then rejected later; history still persisted
        let mut run_n = load_or_empty(&store);
        let unseen = filter_unseen(vec![sample_paper("2401.00009", "Rejected later")], &mut run_n);
        assert_eq!(unseen.len(), 1);
        store.save(&run_n)?;

        // run N+1
        let mut run_n1 = load_or_empty(&store);
        let unseen = filter_unseen(vec![sample_paper("2401.00009", "Rejected later")], &mut run_n1);
        assert!(unseen.is_empty());
        Ok(())
    }

    #[test]
    fn test_memory_store() -> Result<()> {
        let store = MemoryHistoryStore::default();
        let mut history = store.load()?;
        history.insert("k".to_string());
        store.save(&history)?;
        assert!(store.snapshot().contains("k"));
        Ok(())
    }

    #[test]
    fn test_memory_store_survives_poisoned_lock() -> Result<()> {
        let store = MemoryHistoryStore::default();
        std::thread::scope(|s| {
            let handle = s.spawn(|| {
                let _held = store.inner.lock();
                panic!("writer died");
            });
            assert!(handle.join().is_err());
        });
        assert!(store.inner.is_poisoned());

        let mut history = SeenHistory::default();
        history.insert("2401.00001".to_string());
        store.save(&history)?;
        assert!(store.load()?.contains("2401.00001"));
        Ok(())
    }

    #[test]
    fn test_clear() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonHistoryStore::new(dir.path().join("history.json"));
        store.save(&SeenHistory::default())?;
        assert!(store.path().exists());
        store.clear()?;
        assert!(!store.path().exists());
        Ok(())
    }
}
