use pixicast_proto::protocol::ErrorBody;

/// Failure talking to the Pixicast API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error("server returned {status}: {}", .body.error)]
    Status { status: u16, body: ErrorBody },
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Transport(e)
        }
    }
}

impl ApiError {
    /// Error body of a non-2xx response, if that is what this is.
    pub fn body(&self) -> Option<&ErrorBody> {
        match self {
            ApiError::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Failure of a core operation before it is folded into component state.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("not signed in")]
    AuthUnavailable,
    #[error(transparent)]
    Api(#[from] ApiError),
}
