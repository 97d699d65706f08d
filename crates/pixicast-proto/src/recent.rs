//! Recently issued channel searches, most recent first.

use chrono::Utc;
use tracing::warn;

use crate::protocol::RecentSearchEntry;
use crate::store::KeyValueStore;

/// Store key for the recent-search list.
pub const RECENT_SEARCHES_KEY: &str = "pixicast_recent_searches";
pub const DEFAULT_CAPACITY: usize = 5;
/// Queries shorter than this are never remembered.
pub const MIN_QUERY_CHARS: usize = 2;

pub struct RecentSearches<S> {
    store: S,
    capacity: usize,
}

impl<S: KeyValueStore> RecentSearches<S> {
    pub fn new(store: S) -> Self {
        Self::with_capacity(store, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(store: S, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
        }
    }

    /// Stored entries, most recent first. Missing or malformed data reads as empty.
    pub fn list(&self) -> Vec<RecentSearchEntry> {
        self.store
            .get(RECENT_SEARCHES_KEY)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// Move `query` to the front, dropping anything beyond capacity.
    pub fn add(&self, query: &str) {
        let trimmed = query.trim();
        if trimmed.chars().count() < MIN_QUERY_CHARS {
            return;
        }

        let mut entries = self.list();
        entries.retain(|e| e.query != trimmed);
        entries.insert(
            0,
            RecentSearchEntry {
                query: trimmed.to_string(),
                timestamp: Utc::now().timestamp_millis(),
            },
        );
        entries.truncate(self.capacity);

        let value = match serde_json::to_value(&entries) {
            Ok(v) => v,
            Err(e) => {
                warn!("recent searches: encode failed: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.set(RECENT_SEARCHES_KEY, value) {
            warn!("recent searches: persist failed: {}", e);
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.remove(RECENT_SEARCHES_KEY) {
            warn!("recent searches: clear failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn queries<S: KeyValueStore>(recent: &RecentSearches<S>) -> Vec<String> {
        recent.list().into_iter().map(|e| e.query).collect()
    }

    #[test]
    fn test_short_queries_are_ignored() {
        let recent = RecentSearches::new(MemoryStore::new());
        recent.add("a");
        recent.add("  b ");
        recent.add("");
        assert!(recent.list().is_empty());
    }

    #[test]
    fn test_sixth_entry_evicts_oldest() {
        let recent = RecentSearches::new(MemoryStore::new());
        for q in ["q1", "q2", "q3", "q4", "q5"] {
            recent.add(q);
        }
        assert_eq!(queries(&recent), ["q5", "q4", "q3", "q2", "q1"]);

        recent.add("q6");
        assert_eq!(queries(&recent), ["q6", "q5", "q4", "q3", "q2"]);
    }

    #[test]
    fn test_readding_moves_to_front() {
        let recent = RecentSearches::new(MemoryStore::new());
        for q in ["q1", "q2", "q3", "q4", "q5"] {
            recent.add(q);
        }
        recent.add("q2");
        assert_eq!(queries(&recent), ["q2", "q5", "q4", "q3", "q1"]);
    }

    #[test]
    fn test_query_is_trimmed_and_deduped_exactly() {
        let recent = RecentSearches::new(MemoryStore::new());
        recent.add("  lofi ");
        recent.add("lofi");
        recent.add("Lofi");
        assert_eq!(queries(&recent), ["Lofi", "lofi"]);
    }

    #[test]
    fn test_two_char_multibyte_query_is_kept() {
        let recent = RecentSearches::new(MemoryStore::new());
        recent.add("ラジ");
        assert_eq!(queries(&recent), ["ラジ"]);
    }

    #[test]
    fn test_clear_and_malformed_blob() {
        let store = MemoryStore::new();
        store
            .set(RECENT_SEARCHES_KEY, serde_json::json!({"not": "a list"}))
            .unwrap();
        let recent = RecentSearches::new(store);
        assert!(recent.list().is_empty());

        recent.add("news");
        assert_eq!(recent.list().len(), 1);
        recent.clear();
        assert!(recent.list().is_empty());
    }

    #[test]
    fn test_write_then_read_through_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let recent = RecentSearches::new(crate::store::JsonFileStore::open(&path));
        recent.add("podcast");
        assert_eq!(queries(&recent), ["podcast"]);

        let reopened = RecentSearches::new(crate::store::JsonFileStore::open(&path));
        assert_eq!(queries(&reopened), ["podcast"]);
    }
}
