use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Fully-qualified Connect RPC path of the timeline procedure.
pub const GET_TIMELINE_PATH: &str = "pixicast.v1.TimelineService/GetTimeline";

/// Hint the search endpoint returns when the query looks like a channel URL.
pub const HINT_URL_DETECTED: &str = "url_detected";

/// Content platform a channel lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Twitch,
    Podcast,
    Radiko,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Youtube,
        Platform::Twitch,
        Platform::Podcast,
        Platform::Radiko,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Twitch => "twitch",
            Self::Podcast => "podcast",
            Self::Radiko => "radiko",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unsupported platform: {}", s))
    }
}

/// One timeline entry (video, stream, episode, broadcast).
///
/// Decoded from Connect JSON: camelCase keys, default values omitted,
/// timestamps as RFC 3339 strings and int64 as either a string or a number.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Program {
    pub id: String,
    pub title: String,
    #[serde(deserialize_with = "timestamp_or_empty")]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "timestamp_or_empty")]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "timestamp_or_empty")]
    pub published_at: Option<DateTime<Utc>>,
    pub platform_name: String,
    pub channel_title: String,
    pub channel_thumbnail_url: String,
    pub image_url: String,
    pub link_url: String,
    pub description: String,
    #[serde(deserialize_with = "string_or_empty")]
    pub duration: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub view_count: i64,
    pub is_live: bool,
}

impl Program {
    /// Display timestamp: scheduled start, falling back to publish time.
    pub fn effective_time(&self) -> Option<DateTime<Utc>> {
        self.start_at.or(self.published_at)
    }
}

/// Request body for `GetTimeline`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineRequest {
    /// Calendar date the view is anchored to (`YYYY-MM-DD`).
    pub date: String,
    pub youtube_channel_ids: Vec<String>,
    /// Opaque cursor from a previous page; empty for the first page.
    pub before_time: String,
    pub limit: u32,
}

/// One page of the timeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimelinePage {
    pub programs: Vec<Program>,
    pub has_more: bool,
    #[serde(deserialize_with = "string_or_empty")]
    pub next_cursor: Option<String>,
}

/// A channel the signed-in user follows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Subscription {
    pub user_id: i64,
    pub platform: String,
    pub source_id: String,
    pub channel_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub enabled: bool,
    pub is_favorite: bool,
}

/// `GET /v1/subscriptions`. The server encodes an empty list as `null`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionList {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub subscriptions: Vec<Subscription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub platform: Platform,
    /// Channel URL, `@handle`, or raw channel id.
    pub input: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionResponse {
    pub subscription: Subscription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoriteRequest {
    pub is_favorite: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSearchResult {
    pub id: String,
    pub platform_id: String,
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriber_count: Option<i64>,
    pub is_subscribed: bool,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchChannelsResponse {
    #[serde(deserialize_with = "null_as_empty")]
    pub results: Vec<ChannelSearchResult>,
    pub total_count: u32,
    pub source: String,
    #[serde(
        deserialize_with = "string_or_empty",
        skip_serializing_if = "Option::is_none"
    )]
    pub quota_warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PopularChannelsResponse {
    #[serde(deserialize_with = "null_as_empty")]
    pub results: Vec<ChannelSearchResult>,
    pub total_count: u32,
}

/// Error payload of a non-2xx response.
///
/// REST handlers send `{ error, hint? }`; Connect errors send
/// `{ code, message }`, so `message` is accepted as `error`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorBody {
    #[serde(alias = "message")]
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorBody {
    pub fn is_url_detected(&self) -> bool {
        self.hint.as_deref() == Some(HINT_URL_DETECTED)
    }
}

/// Account / plan details from `GET /v1/me`.
///
/// Plan limits are enforced server-side; this is display data only.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_channels: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_count: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One remembered search query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentSearchEntry {
    pub query: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

// ── serde helpers ─────────────────────────────────────────────────────────────

fn timestamp_or_empty<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc)))
}

fn string_or_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()))
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
        Null,
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(n) => Ok(n),
        Raw::Float(f) => Ok(f as i64),
        Raw::Text(s) if s.trim().is_empty() => Ok(0),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        Raw::Null => Ok(0),
    }
}
