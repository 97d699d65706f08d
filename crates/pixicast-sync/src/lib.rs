//! Client-side sync core for Pixicast: the paged timeline and the debounced
//! channel search, each driven over the HTTP API.

pub mod api;
pub mod auth;
pub mod error;
pub mod search;
pub mod timeline;

#[cfg(test)]
mod testing;

pub use api::ApiClient;
pub use error::{ApiError, SyncError};
pub use search::{SearchCoordinator, SearchError, SearchPhase, SearchState};
pub use timeline::{ChannelScope, TimelineAggregator, TimelineState};
