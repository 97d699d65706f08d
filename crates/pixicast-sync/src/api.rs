//! Pixicast API client.
//!
//! The aggregator and coordinator only see the traits below; `ApiClient` is
//! the reqwest implementation used by the binary.

use std::future::Future;

use pixicast_proto::config::ApiConfig;
use pixicast_proto::protocol::{
    CreateSubscriptionRequest, CreateSubscriptionResponse, ErrorBody, FavoriteRequest, PlanInfo,
    Platform, PopularChannelsResponse, SearchChannelsResponse, Subscription, SubscriptionList,
    TimelinePage, TimelineRequest, GET_TIMELINE_PATH,
};
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ApiError;

/// Subscription listing for scope resolution.
pub trait ChannelDirectory: Send + Sync + 'static {
    fn list_subscriptions(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Vec<Subscription>, ApiError>> + Send;
}

/// Paged timeline fetch.
pub trait TimelineSource: Send + Sync + 'static {
    fn get_timeline(
        &self,
        token: &str,
        request: &TimelineRequest,
    ) -> impl Future<Output = Result<TimelinePage, ApiError>> + Send;
}

/// Channel search and discovery.
pub trait ChannelSearch: Send + Sync + 'static {
    fn search_channels(
        &self,
        token: &str,
        query: &str,
        platform: Option<Platform>,
    ) -> impl Future<Output = Result<SearchChannelsResponse, ApiError>> + Send;

    fn popular_channels(
        &self,
        token: &str,
        limit: u32,
    ) -> impl Future<Output = Result<PopularChannelsResponse, ApiError>> + Send;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("pixicast-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `POST /v1/subscriptions`: follow a channel by URL, handle, or id.
    pub async fn add_subscription(
        &self,
        token: &str,
        platform: Platform,
        input: &str,
    ) -> Result<Subscription, ApiError> {
        let url = self.endpoint(&["v1", "subscriptions"])?;
        let body = CreateSubscriptionRequest {
            platform,
            input: input.trim().to_string(),
        };
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let created: CreateSubscriptionResponse = decode(response).await?;
        Ok(created.subscription)
    }

    /// `DELETE /v1/subscriptions/{channel_id}`.
    pub async fn remove_subscription(&self, token: &str, channel_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["v1", "subscriptions", channel_id])?;
        let response = self.http.delete(url).bearer_auth(token).send().await?;
        expect_success(response).await
    }

    /// `POST /v1/subscriptions/{channel_id}/favorite`.
    pub async fn set_favorite(
        &self,
        token: &str,
        channel_id: &str,
        is_favorite: bool,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["v1", "subscriptions", channel_id, "favorite"])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&FavoriteRequest { is_favorite })
            .send()
            .await?;
        expect_success(response).await
    }

    /// `GET /v1/me`: account and plan details.
    pub async fn plan_info(&self, token: &str) -> Result<PlanInfo, ApiError> {
        let url = self.endpoint(&["v1", "me"])?;
        let response = self.http.get(url).bearer_auth(token).send().await?;
        decode(response).await
    }
}

impl ChannelDirectory for ApiClient {
    async fn list_subscriptions(&self, token: &str) -> Result<Vec<Subscription>, ApiError> {
        let url = self.endpoint(&["v1", "subscriptions"])?;
        let response = self.http.get(url).bearer_auth(token).send().await?;
        let list: SubscriptionList = decode(response).await?;
        Ok(list.subscriptions)
    }
}

impl TimelineSource for ApiClient {
    async fn get_timeline(
        &self,
        token: &str,
        request: &TimelineRequest,
    ) -> Result<TimelinePage, ApiError> {
        let segments: Vec<&str> = GET_TIMELINE_PATH.split('/').collect();
        let url = self.endpoint(&segments)?;
        debug!(
            "GetTimeline date={} channels={} before={:?} limit={}",
            request.date,
            request.youtube_channel_ids.len(),
            request.before_time,
            request.limit
        );
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .header("Connect-Protocol-Version", "1")
            .json(request)
            .send()
            .await?;
        decode(response).await
    }
}

impl ChannelSearch for ApiClient {
    async fn search_channels(
        &self,
        token: &str,
        query: &str,
        platform: Option<Platform>,
    ) -> Result<SearchChannelsResponse, ApiError> {
        let mut url = self.endpoint(&["v1", "channels", "search"])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", query);
            if let Some(p) = platform {
                pairs.append_pair("platform", p.as_str());
            }
        }
        let response = self.http.get(url).bearer_auth(token).send().await?;
        decode(response).await
    }

    async fn popular_channels(
        &self,
        token: &str,
        limit: u32,
    ) -> Result<PopularChannelsResponse, ApiError> {
        let mut url = self.endpoint(&["v1", "channels", "popular"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        let response = self.http.get(url).bearer_auth(token).send().await?;
        decode(response).await
    }
}

async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, ApiError> {
    let status = response.status();
    let bytes = response.bytes().await?;
    if !status.is_success() {
        return Err(status_error(status, &bytes));
    }
    Ok(serde_json::from_slice(&bytes)?)
}

async fn expect_success(response: reqwest::Response) -> Result<(), ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let bytes = response.bytes().await?;
    Err(status_error(status, &bytes))
}

fn status_error(status: reqwest::StatusCode, bytes: &[u8]) -> ApiError {
    let body = serde_json::from_slice::<ErrorBody>(bytes).unwrap_or_else(|_| ErrorBody {
        error: String::from_utf8_lossy(bytes).trim().to_string(),
        ..ErrorBody::default()
    });
    ApiError::Status {
        status: status.as_u16(),
        body,
    }
}
