//! Debounced Search Coordinator.
//!
//! Turns keystroke-level input into at most one authoritative request per
//! settled query. Each input change restarts the debounce timer; when it
//! fires, the previous request task is aborted and a new one is spawned
//! under a fresh `request_generation`. A completion only lands if its
//! generation is still current.

mod cache;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use pixicast_proto::config::SearchConfig;
use pixicast_proto::protocol::{
    ChannelSearchResult, Platform, RecentSearchEntry, SearchChannelsResponse,
};
use pixicast_proto::recent::{RecentSearches, MIN_QUERY_CHARS};
use pixicast_proto::store::KeyValueStore;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

pub use cache::{ResultCache, DEFAULT_CACHE_CAPACITY};

use crate::api::ChannelSearch;
use crate::auth::TokenProvider;
use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SearchPhase {
    #[default]
    Idle,
    /// IME composition in progress; the timer is suspended.
    Composing,
    Debouncing,
    InFlight,
    Settled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum SearchError {
    #[error("that looks like a channel URL; add it as a subscription instead")]
    UrlDetected,
    #[error("not signed in")]
    AuthUnavailable,
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchState {
    pub query: String,
    pub platform: Option<Platform>,
    pub results: Vec<ChannelSearchResult>,
    pub popular: Vec<ChannelSearchResult>,
    pub loading: bool,
    pub error: Option<SearchError>,
    /// Advisory; empty when the server sent none.
    pub quota_warning: String,
    pub composing: bool,
    pub phase: SearchPhase,
    pub request_generation: u64,
}

impl SearchState {
    fn settle(&mut self, response: SearchChannelsResponse) {
        self.results = response.results;
        self.quota_warning = response.quota_warning.unwrap_or_default();
        self.error = None;
        self.loading = false;
        self.phase = self.resting_phase();
    }

    fn fail(&mut self, error: SyncError) {
        self.error = Some(match error {
            SyncError::AuthUnavailable => SearchError::AuthUnavailable,
            SyncError::Api(e) if e.body().is_some_and(|b| b.is_url_detected()) => {
                SearchError::UrlDetected
            }
            SyncError::Api(e) => SearchError::Failed(e.to_string()),
        });
        self.results.clear();
        self.quota_warning.clear();
        self.loading = false;
        self.phase = self.resting_phase();
    }

    fn resting_phase(&self) -> SearchPhase {
        if self.composing {
            SearchPhase::Composing
        } else {
            SearchPhase::Settled
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub debounce: Duration,
    pub min_query_chars: usize,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub popular_limit: u32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(400),
            min_query_chars: MIN_QUERY_CHARS,
            cache_ttl: Duration::from_secs(300),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            popular_limit: 10,
        }
    }
}

impl From<&SearchConfig> for SearchSettings {
    fn from(config: &SearchConfig) -> Self {
        Self {
            debounce: config.debounce(),
            min_query_chars: config.min_query_chars.max(MIN_QUERY_CHARS),
            cache_ttl: config.cache_ttl(),
            popular_limit: config.popular_limit,
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct Tasks {
    debounce: Option<AbortHandle>,
    request: Option<AbortHandle>,
}

impl Tasks {
    fn abort_all(&mut self) {
        for handle in [self.debounce.take(), self.request.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }
}

struct Inner<B, T, S> {
    backend: B,
    tokens: T,
    recent: RecentSearches<S>,
    settings: SearchSettings,
    state: watch::Sender<SearchState>,
    tasks: Mutex<Tasks>,
    cache: Mutex<ResultCache>,
}

/// Search input owner for one search surface.
///
/// Input methods spawn onto the current tokio runtime and must be called
/// from within one. Dropping the coordinator aborts the timer and any
/// in-flight request.
pub struct SearchCoordinator<B, T, S> {
    inner: Arc<Inner<B, T, S>>,
}

impl<B, T, S> SearchCoordinator<B, T, S>
where
    B: ChannelSearch,
    T: TokenProvider,
    S: KeyValueStore + 'static,
{
    pub fn new(backend: B, tokens: T, recent: RecentSearches<S>, settings: SearchSettings) -> Self {
        let (state, _) = watch::channel(SearchState::default());
        let cache = ResultCache::new(settings.cache_ttl, settings.cache_capacity);
        Self {
            inner: Arc::new(Inner {
                backend,
                tokens,
                recent,
                settings,
                state,
                tasks: Mutex::new(Tasks::default()),
                cache: Mutex::new(cache),
            }),
        }
    }

    pub fn snapshot(&self) -> SearchState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.inner.state.subscribe()
    }

    pub fn set_query(&self, query: impl Into<String>) {
        let query = query.into();
        self.inner.state.send_modify(|s| s.query = query);
        self.inner.input_changed();
    }

    pub fn set_platform(&self, platform: Option<Platform>) {
        self.inner.state.send_modify(|s| s.platform = platform);
        self.inner.input_changed();
    }

    pub fn composition_start(&self) {
        self.inner.cancel_debounce();
        self.inner.state.send_modify(|s| {
            s.composing = true;
            if matches!(s.phase, SearchPhase::Debouncing | SearchPhase::Settled) {
                s.phase = SearchPhase::Composing;
            }
        });
    }

    pub fn composition_end(&self) {
        self.inner.state.send_modify(|s| s.composing = false);
        self.inner.input_changed();
    }

    /// Search for the current input right away, skipping the debounce.
    pub fn retry(&self) {
        self.inner.cancel_debounce();
        self.inner.fire();
    }

    /// Wait until the current input has settled (or gone idle).
    ///
    /// Composition holds the phase at `Composing`, so this keeps waiting
    /// until composition ends and the follow-up search settles.
    pub async fn settled(&self) -> SearchState {
        let mut rx = self.subscribe();
        let result = rx
            .wait_for(|s| matches!(s.phase, SearchPhase::Idle | SearchPhase::Settled))
            .await
            .map(|s| s.clone());
        result.unwrap_or_else(|_| self.snapshot())
    }

    /// Fill `popular`. A failure is logged and leaves the previous list.
    pub async fn load_popular(&self) -> Vec<ChannelSearchResult> {
        let Some(token) = self.inner.tokens.id_token().await else {
            debug!("search: popular skipped, not signed in");
            return self.snapshot().popular;
        };
        match self
            .inner
            .backend
            .popular_channels(&token, self.inner.settings.popular_limit)
            .await
        {
            Ok(response) => {
                info!("search: {} popular channels", response.results.len());
                self.inner
                    .state
                    .send_modify(|s| s.popular = response.results);
            }
            Err(e) => warn!("search: popular channels failed: {}", e),
        }
        self.snapshot().popular
    }

    /// Forget cached responses, e.g. after the subscription set changed.
    pub fn invalidate_cache(&self) {
        self.inner.cache().clear();
    }

    pub fn recent_searches(&self) -> Vec<RecentSearchEntry> {
        self.inner.recent.list()
    }

    pub fn clear_recent_searches(&self) {
        self.inner.recent.clear();
    }

    /// End the session: abort everything and reset to empty.
    pub fn close(&self) {
        self.inner.shutdown();
    }
}

impl<B, T, S> Drop for SearchCoordinator<B, T, S> {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl<B, T, S> Inner<B, T, S> {
    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cache(&self) -> MutexGuard<'_, ResultCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cancel_debounce(&self) {
        if let Some(handle) = self.tasks().debounce.take() {
            handle.abort();
        }
    }

    fn shutdown(&self) {
        self.tasks().abort_all();
        self.state.send_modify(|s| {
            *s = SearchState {
                request_generation: s.request_generation + 1,
                ..SearchState::default()
            };
        });
    }
}

impl<B, T, S> Inner<B, T, S>
where
    B: ChannelSearch,
    T: TokenProvider,
    S: KeyValueStore + 'static,
{
    /// Trimmed query and platform, or `None` when the query is too short.
    fn current_input(&self) -> Option<(String, Option<Platform>)> {
        let s = self.state.borrow();
        let query = s.query.trim();
        (query.chars().count() >= self.settings.min_query_chars)
            .then(|| (query.to_string(), s.platform))
    }

    fn input_changed(self: &Arc<Self>) {
        self.cancel_debounce();
        if self.current_input().is_none() {
            self.go_idle();
            return;
        }
        if self.state.borrow().composing {
            self.state.send_modify(|s| s.phase = SearchPhase::Composing);
            return;
        }

        self.state.send_modify(|s| s.phase = SearchPhase::Debouncing);
        let inner = Arc::clone(self);
        let delay = self.settings.debounce;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire();
        });
        self.tasks().debounce = Some(timer.abort_handle());
    }

    /// Supersede and abort any request; clear results.
    fn go_idle(&self) {
        self.state.send_modify(|s| {
            s.request_generation += 1;
            s.results.clear();
            s.error = None;
            s.quota_warning.clear();
            s.loading = false;
            s.phase = SearchPhase::Idle;
        });
        if let Some(handle) = self.tasks().request.take() {
            debug!("search: query too short, aborting request");
            handle.abort();
        }
    }

    fn fire(self: &Arc<Self>) {
        let Some((query, platform)) = self.current_input() else {
            self.go_idle();
            return;
        };

        let cached = self.cache().get(platform, &query);
        if let Some(response) = cached {
            debug!("search: cache hit for {:?}", query);
            self.state.send_modify(|s| {
                s.request_generation += 1;
                s.settle(response);
            });
            if let Some(handle) = self.tasks().request.take() {
                handle.abort();
            }
            self.recent.add(&query);
            return;
        }

        let mut generation = 0;
        self.state.send_modify(|s| {
            s.request_generation += 1;
            generation = s.request_generation;
            s.loading = true;
            s.phase = SearchPhase::InFlight;
        });
        debug!("search: firing {:?} (gen {})", query, generation);

        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            let result = inner.request(&query, platform).await;
            inner.commit(generation, &query, platform, result);
        });

        let mut tasks = self.tasks();
        if self.state.borrow().request_generation != generation {
            task.abort();
            return;
        }
        if let Some(previous) = tasks.request.replace(task.abort_handle()) {
            previous.abort();
        }
    }

    async fn request(
        &self,
        query: &str,
        platform: Option<Platform>,
    ) -> Result<SearchChannelsResponse, SyncError> {
        let token = self
            .tokens
            .id_token()
            .await
            .ok_or(SyncError::AuthUnavailable)?;
        Ok(self.backend.search_channels(&token, query, platform).await?)
    }

    fn commit(
        &self,
        generation: u64,
        query: &str,
        platform: Option<Platform>,
        result: Result<SearchChannelsResponse, SyncError>,
    ) {
        let current = |s: &SearchState| {
            let current = s.request_generation == generation;
            if !current {
                debug!("search: dropping superseded result for {:?}", query);
            }
            current
        };
        match result {
            Ok(response) => {
                let settled = self.state.send_if_modified(|s| {
                    if !current(s) {
                        return false;
                    }
                    s.settle(response.clone());
                    true
                });
                if settled {
                    info!("search: {:?} -> {} results", query, response.results.len());
                    self.recent.add(query);
                    self.cache().insert(platform, query, response);
                }
            }
            Err(e) => {
                self.state.send_if_modified(|s| {
                    if !current(s) {
                        return false;
                    }
                    warn!("search: {:?} failed: {}", query, e);
                    s.fail(e);
                    true
                });
            }
        }
    }
}
