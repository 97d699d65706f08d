//! Scripted in-process backend for exercising the aggregator and coordinator.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use pixicast_proto::protocol::{
    ChannelSearchResult, ErrorBody, Platform, PopularChannelsResponse, Program,
    SearchChannelsResponse, Subscription, TimelinePage, TimelineRequest,
};
use tokio::sync::oneshot;

use crate::api::{ChannelDirectory, ChannelSearch, TimelineSource};
use crate::auth::TokenProvider;
use crate::error::ApiError;

pub type Reply<R> = Result<R, ApiError>;

/// One scripted endpoint: records every call and answers either from a queue
/// or, while holding, through a responder the test releases by call index.
pub struct Script<Q, R> {
    calls: Mutex<Vec<Q>>,
    queued: Mutex<VecDeque<Reply<R>>>,
    held: Mutex<Vec<Option<oneshot::Sender<Reply<R>>>>>,
    hold: AtomicBool,
    cancelled: Arc<AtomicUsize>,
}

impl<Q: Clone, R> Default for Script<Q, R> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            queued: Mutex::new(VecDeque::new()),
            held: Mutex::new(Vec::new()),
            hold: AtomicBool::new(false),
            cancelled: Arc::new(AtomicUsize::new(0)),
        }
    }
}

struct CancelGuard {
    done: bool,
    cancelled: Arc<AtomicUsize>,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.done {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl<Q: Clone, R> Script<Q, R> {
    pub fn push(&self, reply: Reply<R>) {
        self.queued.lock().unwrap().push_back(reply);
    }

    /// Park every following call until [`Script::release`].
    pub fn hold(&self, on: bool) {
        self.hold.store(on, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Q> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Calls dropped before they produced a reply.
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Answer held call `index`. Returns false if the caller already went away.
    pub fn release(&self, index: usize, reply: Reply<R>) -> bool {
        let sender = self
            .held
            .lock()
            .unwrap()
            .get_mut(index)
            .and_then(Option::take);
        match sender {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    /// Wait (in runtime time) until at least `n` calls were recorded.
    pub async fn wait_for_calls(&self, n: usize) {
        for _ in 0..500 {
            if self.call_count() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("expected {} calls, saw {}", n, self.call_count());
    }

    pub async fn wait_for_cancelled(&self, n: usize) {
        for _ in 0..500 {
            if self.cancelled() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("expected {} cancelled calls, saw {}", n, self.cancelled());
    }

    async fn call(&self, request: Q) -> Reply<R> {
        let mut guard = CancelGuard {
            done: false,
            cancelled: Arc::clone(&self.cancelled),
        };
        let rx = self.register(request);
        let reply = match rx {
            Some(rx) => rx.await.expect("held reply dropped by test"),
            None => self.next_queued(),
        };
        guard.done = true;
        reply
    }

    fn register(&self, request: Q) -> Option<oneshot::Receiver<Reply<R>>> {
        self.calls.lock().unwrap().push(request);
        let mut held = self.held.lock().unwrap();
        if self.hold.load(Ordering::SeqCst) {
            let (tx, rx) = oneshot::channel();
            held.push(Some(tx));
            Some(rx)
        } else {
            held.push(None);
            None
        }
    }

    fn next_queued(&self) -> Reply<R> {
        self.queued
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted call")
    }
}

/// Token source the test can sign out mid-run.
#[derive(Clone)]
pub struct SwitchToken(Arc<Mutex<Option<String>>>);

impl SwitchToken {
    pub fn new(token: &str) -> Self {
        Self(Arc::new(Mutex::new(Some(token.to_string()))))
    }

    pub fn sign_out(&self) {
        *self.0.lock().unwrap() = None;
    }
}

impl TokenProvider for SwitchToken {
    async fn id_token(&self) -> Option<String> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchCall {
    pub token: String,
    pub query: String,
    pub platform: Option<Platform>,
}

#[derive(Default)]
pub struct MockBackend {
    pub subscriptions: Script<String, Vec<Subscription>>,
    pub timeline: Script<TimelineRequest, TimelinePage>,
    pub search: Script<SearchCall, SearchChannelsResponse>,
    pub popular: Script<u32, PopularChannelsResponse>,
}

impl ChannelDirectory for Arc<MockBackend> {
    async fn list_subscriptions(&self, token: &str) -> Result<Vec<Subscription>, ApiError> {
        self.subscriptions.call(token.to_string()).await
    }
}

impl TimelineSource for Arc<MockBackend> {
    async fn get_timeline(
        &self,
        _token: &str,
        request: &TimelineRequest,
    ) -> Result<TimelinePage, ApiError> {
        self.timeline.call(request.clone()).await
    }
}

impl ChannelSearch for Arc<MockBackend> {
    async fn search_channels(
        &self,
        token: &str,
        query: &str,
        platform: Option<Platform>,
    ) -> Result<SearchChannelsResponse, ApiError> {
        self.search
            .call(SearchCall {
                token: token.to_string(),
                query: query.to_string(),
                platform,
            })
            .await
    }

    async fn popular_channels(
        &self,
        _token: &str,
        limit: u32,
    ) -> Result<PopularChannelsResponse, ApiError> {
        self.popular.call(limit).await
    }
}

// ── fixtures ──────────────────────────────────────────────────────────────────

fn ts(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn program(id: &str, start_at: &str) -> Program {
    Program {
        id: id.to_string(),
        title: format!("program {}", id),
        start_at: Some(ts(start_at)),
        platform_name: "youtube".to_string(),
        ..Program::default()
    }
}

pub fn published_program(id: &str, published_at: &str) -> Program {
    Program {
        id: id.to_string(),
        title: format!("episode {}", id),
        published_at: Some(ts(published_at)),
        platform_name: "podcast".to_string(),
        ..Program::default()
    }
}

pub fn untimed_program(id: &str) -> Program {
    Program {
        id: id.to_string(),
        ..Program::default()
    }
}

/// `count` programs an hour apart, newest first, ids `{prefix}{n}`.
pub fn hourly_programs(prefix: &str, start: &str, count: usize) -> Vec<Program> {
    let start = ts(start);
    (0..count)
        .map(|n| Program {
            id: format!("{}{}", prefix, n),
            title: format!("{} #{}", prefix, n),
            start_at: Some(start - chrono::Duration::hours(n as i64)),
            platform_name: "twitch".to_string(),
            ..Program::default()
        })
        .collect()
}

pub fn page(programs: Vec<Program>, next_cursor: Option<&str>) -> TimelinePage {
    TimelinePage {
        programs,
        has_more: next_cursor.is_some(),
        next_cursor: next_cursor.map(str::to_string),
    }
}

pub fn subscription(channel_id: &str, enabled: bool) -> Subscription {
    Subscription {
        platform: "youtube".to_string(),
        channel_id: channel_id.to_string(),
        display_name: format!("channel {}", channel_id),
        enabled,
        ..Subscription::default()
    }
}

pub fn channel(external_id: &str) -> ChannelSearchResult {
    ChannelSearchResult {
        id: format!("src-{}", external_id),
        platform_id: "youtube".to_string(),
        external_id: external_id.to_string(),
        display_name: format!("Channel {}", external_id),
        source: "api".to_string(),
        ..ChannelSearchResult::default()
    }
}

pub fn search_response(ids: &[&str], quota_warning: Option<&str>) -> SearchChannelsResponse {
    SearchChannelsResponse {
        results: ids.iter().map(|id| channel(id)).collect(),
        total_count: ids.len() as u32,
        source: "api".to_string(),
        quota_warning: quota_warning.map(str::to_string),
    }
}

pub fn status_error(status: u16, error: &str, hint: Option<&str>) -> ApiError {
    ApiError::Status {
        status,
        body: ErrorBody {
            error: error.to_string(),
            hint: hint.map(str::to_string),
            code: None,
        },
    }
}
