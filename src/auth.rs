//! Bearer-credential seam.
//!
//! Token acquisition and refresh live outside this crate; callers inject an
//! implementation of [`TokenProvider`] and every outgoing call asks it for
//! the current token.

use async_trait::async_trait;

use crate::error::DirectoryError;

/// Supplies the bearer token attached to every directory call.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a token valid for the next request.
    ///
    /// Failures surface as [`DirectoryError::Token`] on the operation that
    /// needed the token.
    async fn bearer_token(&self) -> Result<String, DirectoryError>;
}

/// A fixed token, for tests and short-lived tooling.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Wrap an already-acquired token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> Result<String, DirectoryError> {
        Ok(self.token.clone())
    }
}
