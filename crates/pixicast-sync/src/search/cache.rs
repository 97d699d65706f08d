//! Short-lived cache of settled search responses.

use std::collections::HashMap;
use std::time::Duration;

use pixicast_proto::protocol::{Platform, SearchChannelsResponse};
use tokio::time::Instant;

pub const DEFAULT_CACHE_CAPACITY: usize = 32;

struct Entry {
    stored_at: Instant,
    response: SearchChannelsResponse,
}

/// Keyed by `platform:query`; entries older than `ttl` are treated as absent.
pub struct ResultCache {
    ttl: Duration,
    capacity: usize,
    entries: HashMap<String, Entry>,
}

impl ResultCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            entries: HashMap::new(),
        }
    }

    pub fn key(platform: Option<Platform>, query: &str) -> String {
        format!("{}:{}", platform.map_or("all", |p| p.as_str()), query)
    }

    pub fn get(&mut self, platform: Option<Platform>, query: &str) -> Option<SearchChannelsResponse> {
        let key = Self::key(platform, query);
        let fresh = self
            .entries
            .get(&key)
            .map(|e| e.stored_at.elapsed() < self.ttl)?;
        if !fresh {
            self.entries.remove(&key);
            return None;
        }
        self.entries.get(&key).map(|e| e.response.clone())
    }

    pub fn insert(&mut self, platform: Option<Platform>, query: &str, response: SearchChannelsResponse) {
        if self.capacity == 0 || self.ttl.is_zero() {
            return;
        }
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.stored_at.elapsed() < ttl);

        let key = Self::key(platform, query);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.stored_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            key,
            Entry {
                stored_at: Instant::now(),
                response,
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::search_response;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let mut cache = ResultCache::new(Duration::from_secs(300), 4);
        cache.insert(None, "lofi", search_response(&["a"], None));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get(None, "lofi").is_some());
        assert!(cache.get(Some(Platform::Twitch), "lofi").is_none());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get(None, "lofi").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cache_evicts_oldest() {
        let mut cache = ResultCache::new(Duration::from_secs(300), 2);
        cache.insert(None, "one", search_response(&["1"], None));
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert(None, "two", search_response(&["2"], None));
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert(None, "three", search_response(&["3"], None));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(None, "one").is_none());
        assert!(cache.get(None, "three").is_some());
    }

    #[test]
    fn test_key_names_platform() {
        assert_eq!(ResultCache::key(None, "ab"), "all:ab");
        assert_eq!(ResultCache::key(Some(Platform::Youtube), "ab"), "youtube:ab");
    }
}
