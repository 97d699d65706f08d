//! Timeline Aggregator.
//!
//! Owns the merged program list for one channel scope and extends it page by
//! page, walking backwards in time.
//!
//! State lives in a `watch` channel; every transition is a single
//! `send_modify` / `send_if_modified`, so the "am I allowed to fetch?" check
//! and the flag that records the fetch happen atomically. Each scope load
//! bumps `generation`. Work started under an older generation is aborted
//! (dropping the request future closes the connection) and, if it still
//! manages to complete, its result is discarded on commit.
//!
//! ```text
//!  load_initial ──► loading ──► settled ──near_bottom/load_more──► loading_more
//!        ▲                         ▲                                    │
//!        │                         └──────── merged / restored ─────────┘
//!   set_scope / refresh (new generation, aborts everything in flight)
//! ```

mod merge;

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Local, NaiveDate};
use pixicast_proto::protocol::{Program, TimelinePage, TimelineRequest};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

pub use merge::{date_key, group_by_date, merge_programs, sort_descending, DateGroup, UNKNOWN_DATE_KEY};

use crate::api::{ChannelDirectory, TimelineSource};
use crate::auth::TokenProvider;
use crate::error::SyncError;

pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Which channels the timeline covers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum ChannelScope {
    /// Every enabled subscription of the signed-in user.
    #[default]
    AllSubscriptions,
    /// One pinned channel id.
    Channel(String),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TimelineState {
    /// Newest first by effective time, unique by id.
    pub items: Vec<Program>,
    /// Derived from `items`; never edited on its own.
    pub grouped_by_date: Vec<DateGroup>,
    pub cursor: Option<String>,
    pub has_more: bool,
    pub scope: ChannelScope,
    pub scope_channel_ids: Vec<String>,
    pub as_of: Option<NaiveDate>,
    pub loading: bool,
    pub loading_more: bool,
    /// Last initial-load failure; cleared by the next successful load.
    pub error: Option<String>,
    /// Scope load that produced this state.
    pub generation: u64,
}

impl TimelineState {
    fn empty(scope: ChannelScope, as_of: NaiveDate, generation: u64) -> Self {
        Self {
            scope,
            as_of: Some(as_of),
            generation,
            ..Self::default()
        }
    }

    fn set_items(&mut self, items: Vec<Program>) {
        self.grouped_by_date = group_by_date(&items, &Local);
        self.items = items;
    }
}

/// Everything a page-2+ fetch needs, captured when the slot is claimed.
#[derive(Debug)]
struct MoreTicket {
    generation: u64,
    cursor: String,
    as_of: NaiveDate,
    channel_ids: Vec<String>,
}

#[derive(Clone, Copy)]
enum Slot {
    Initial,
    More,
}

#[derive(Default)]
struct Tasks {
    initial: Option<AbortHandle>,
    more: Option<AbortHandle>,
}

impl Tasks {
    fn slot(&mut self, slot: Slot) -> &mut Option<AbortHandle> {
        match slot {
            Slot::Initial => &mut self.initial,
            Slot::More => &mut self.more,
        }
    }

    fn abort_all(&mut self) {
        for handle in [self.initial.take(), self.more.take()].into_iter().flatten() {
            handle.abort();
        }
    }
}

struct Inner<B, T> {
    backend: B,
    tokens: T,
    page_size: u32,
    state: watch::Sender<TimelineState>,
    tasks: Mutex<Tasks>,
}

pub struct TimelineAggregator<B, T> {
    inner: Arc<Inner<B, T>>,
}

impl<B, T> TimelineAggregator<B, T>
where
    B: ChannelDirectory + TimelineSource,
    T: TokenProvider,
{
    pub fn new(backend: B, tokens: T) -> Self {
        Self::with_page_size(backend, tokens, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(backend: B, tokens: T, page_size: u32) -> Self {
        let (state, _) = watch::channel(TimelineState::default());
        Self {
            inner: Arc::new(Inner {
                backend,
                tokens,
                page_size: page_size.max(1),
                state,
                tasks: Mutex::new(Tasks::default()),
            }),
        }
    }

    pub fn snapshot(&self) -> TimelineState {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<TimelineState> {
        self.inner.state.subscribe()
    }

    /// Replace the timeline with page 1 of `scope`.
    ///
    /// Never fails: a missing identity or a fetch failure leaves an empty,
    /// settled state. If a newer load supersedes this one, the newer state is
    /// returned.
    pub async fn load_initial(&self, scope: ChannelScope, as_of: NaiveDate) -> TimelineState {
        let generation = self.inner.begin(scope.clone(), as_of);
        info!("timeline: loading {:?} as of {} (gen {})", scope, as_of, generation);

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = inner.fetch_first_page(&scope, as_of).await;
            inner.commit_initial(generation, result);
        });
        self.inner.track(generation, Slot::Initial, task.abort_handle());

        if let Err(e) = task.await {
            if e.is_cancelled() {
                debug!("timeline: load gen {} superseded", generation);
            } else {
                error!("timeline: load task failed: {}", e);
                self.inner.state.send_if_modified(|s| {
                    if s.generation != generation || !s.loading {
                        return false;
                    }
                    s.loading = false;
                    s.error = Some(e.to_string());
                    true
                });
            }
        }
        self.snapshot()
    }

    /// Fetch the next older page and merge it.
    ///
    /// Returns the current state untouched if a load is already running,
    /// there is nothing more, or no cursor is known.
    pub async fn load_more(&self) -> TimelineState {
        let Some(ticket) = self.inner.claim_more() else {
            return self.snapshot();
        };
        let generation = ticket.generation;
        if let Err(e) = self.inner.spawn_more(ticket).await {
            if e.is_cancelled() {
                debug!("timeline: load more superseded");
            } else {
                error!("timeline: load more task failed: {}", e);
                self.inner.state.send_if_modified(|s| {
                    let stuck = s.generation == generation && s.loading_more;
                    s.loading_more &= !stuck;
                    stuck
                });
            }
        }
        self.snapshot()
    }

    /// The list end came into view.
    ///
    /// Safe to call on every scroll event: only starts a fetch when nothing is
    /// loading and more pages exist. Returns whether a fetch was started.
    /// Must be called from within a tokio runtime.
    pub fn near_bottom(&self) -> bool {
        match self.inner.claim_more() {
            Some(ticket) => {
                self.inner.spawn_more(ticket);
                true
            }
            None => false,
        }
    }

    /// Switch to another scope, discarding anything in flight.
    pub async fn set_scope(&self, scope: ChannelScope) -> TimelineState {
        let as_of = self.current_as_of();
        self.load_initial(scope, as_of).await
    }

    /// Reload page 1 of the current scope.
    pub async fn refresh(&self) -> TimelineState {
        let scope = self.inner.state.borrow().scope.clone();
        let as_of = self.current_as_of();
        self.load_initial(scope, as_of).await
    }

    fn current_as_of(&self) -> NaiveDate {
        self.inner
            .state
            .borrow()
            .as_of
            .unwrap_or_else(|| Local::now().date_naive())
    }
}

impl<B, T> Drop for TimelineAggregator<B, T> {
    fn drop(&mut self) {
        self.inner.tasks().abort_all();
    }
}

impl<B, T> Inner<B, T> {
    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<B, T> Inner<B, T>
where
    B: ChannelDirectory + TimelineSource,
    T: TokenProvider,
{
    /// Start a new generation: publish the loading state and abort older work.
    fn begin(&self, scope: ChannelScope, as_of: NaiveDate) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|s| {
            generation = s.generation + 1;
            *s = TimelineState {
                loading: true,
                ..TimelineState::empty(scope, as_of, generation)
            };
        });
        self.tasks().abort_all();
        generation
    }

    fn track(&self, generation: u64, slot: Slot, handle: AbortHandle) {
        let mut tasks = self.tasks();
        if self.state.borrow().generation != generation {
            // A newer load started between spawn and here.
            handle.abort();
            return;
        }
        *tasks.slot(slot) = Some(handle);
    }

    async fn fetch_first_page(
        &self,
        scope: &ChannelScope,
        as_of: NaiveDate,
    ) -> Result<(Vec<String>, TimelinePage), SyncError> {
        let token = self
            .tokens
            .id_token()
            .await
            .ok_or(SyncError::AuthUnavailable)?;

        let channel_ids: Vec<String> = match scope {
            ChannelScope::AllSubscriptions => self
                .backend
                .list_subscriptions(&token)
                .await?
                .into_iter()
                .filter(|s| s.enabled)
                .map(|s| s.channel_id)
                .collect(),
            ChannelScope::Channel(id) => vec![id.clone()],
        };
        if channel_ids.is_empty() {
            debug!("timeline: scope resolved to no channels");
            return Ok((channel_ids, TimelinePage::default()));
        }

        let request = TimelineRequest {
            date: as_of.format("%Y-%m-%d").to_string(),
            youtube_channel_ids: channel_ids.clone(),
            before_time: String::new(),
            limit: self.page_size,
        };
        let page = self.backend.get_timeline(&token, &request).await?;
        Ok((channel_ids, page))
    }

    fn commit_initial(
        &self,
        generation: u64,
        result: Result<(Vec<String>, TimelinePage), SyncError>,
    ) {
        self.state.send_if_modified(|s| {
            if s.generation != generation {
                debug!("timeline: dropping stale page 1 (gen {})", generation);
                return false;
            }
            s.loading = false;
            match result {
                Ok((channel_ids, page)) => {
                    info!(
                        "timeline: page 1 has {} programs, has_more={}",
                        page.programs.len(),
                        page.has_more
                    );
                    s.set_items(merge_programs(Vec::new(), page.programs));
                    s.cursor = page.next_cursor;
                    s.has_more = page.has_more;
                    s.scope_channel_ids = channel_ids;
                    s.error = None;
                }
                Err(SyncError::AuthUnavailable) => {
                    info!("timeline: not signed in");
                    *s = TimelineState::empty(s.scope.clone(), s.as_of.unwrap_or_default(), generation);
                }
                Err(SyncError::Api(e)) => {
                    warn!("timeline: initial load failed: {}", e);
                    *s = TimelineState {
                        error: Some(e.to_string()),
                        ..TimelineState::empty(
                            s.scope.clone(),
                            s.as_of.unwrap_or_default(),
                            generation,
                        )
                    };
                }
            }
            true
        });
    }

    /// Claim the loading-more slot if the guards allow a fetch.
    fn claim_more(&self) -> Option<MoreTicket> {
        let mut ticket = None;
        self.state.send_if_modified(|s| {
            if s.loading || s.loading_more || !s.has_more {
                return false;
            }
            let Some(cursor) = s.cursor.clone() else {
                return false;
            };
            s.loading_more = true;
            ticket = Some(MoreTicket {
                generation: s.generation,
                cursor,
                as_of: s.as_of.unwrap_or_else(|| Local::now().date_naive()),
                channel_ids: s.scope_channel_ids.clone(),
            });
            true
        });
        ticket
    }

    fn spawn_more(self: &Arc<Self>, ticket: MoreTicket) -> JoinHandle<()> {
        let generation = ticket.generation;
        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            let result = inner.fetch_more(&ticket).await;
            inner.commit_more(ticket.generation, result);
        });
        self.track(generation, Slot::More, task.abort_handle());
        task
    }

    async fn fetch_more(&self, ticket: &MoreTicket) -> Result<TimelinePage, SyncError> {
        let token = self
            .tokens
            .id_token()
            .await
            .ok_or(SyncError::AuthUnavailable)?;
        let request = TimelineRequest {
            date: ticket.as_of.format("%Y-%m-%d").to_string(),
            youtube_channel_ids: ticket.channel_ids.clone(),
            before_time: ticket.cursor.clone(),
            limit: self.page_size,
        };
        Ok(self.backend.get_timeline(&token, &request).await?)
    }

    fn commit_more(&self, generation: u64, result: Result<TimelinePage, SyncError>) {
        self.state.send_if_modified(|s| {
            if s.generation != generation || !s.loading_more {
                debug!("timeline: dropping stale page (gen {})", generation);
                return false;
            }
            s.loading_more = false;
            match result {
                Ok(page) => {
                    debug!(
                        "timeline: merging {} programs onto {}",
                        page.programs.len(),
                        s.items.len()
                    );
                    let items = merge_programs(std::mem::take(&mut s.items), page.programs);
                    s.set_items(items);
                    s.cursor = page.next_cursor;
                    s.has_more = page.has_more;
                }
                Err(SyncError::AuthUnavailable) => {
                    debug!("timeline: load more skipped, not signed in");
                }
                Err(SyncError::Api(e)) => {
                    warn!("timeline: load more failed, keeping current page set: {}", e);
                }
            }
            true
        });
    }
}
