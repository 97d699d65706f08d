//! Identity token sources.

use std::future::Future;

/// Supplies the signed-in user's ID token.
///
/// `None` means not signed in (or sign-in still pending); callers degrade to
/// an empty state instead of failing.
pub trait TokenProvider: Send + Sync + 'static {
    fn id_token(&self) -> impl Future<Output = Option<String>> + Send;
}

/// A fixed token, or none at all.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn signed_out() -> Self {
        Self(None)
    }
}

impl TokenProvider for StaticToken {
    async fn id_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Reads the token from an environment variable on every call.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl TokenProvider for EnvToken {
    async fn id_token(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}
