//! Cancellation and deadline carried by every outbound call.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::SiteError;

/// Shared cancellation signal plus an optional deadline.
///
/// Cloning shares the same token. [`RequestContext::child`] derives a context
/// that is cancelled with its parent but can also be cancelled on its own.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// Creates a context with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Derives a child context sharing this context's deadline.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancels this context and every child.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Underlying token, for callers that select on it directly.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Runs `fut` until it completes, the context is cancelled, or the deadline passes.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Cancelled`] or [`SiteError::Timeout`] (naming `url`)
    /// when the context wins the race, otherwise `fut`'s own result.
    pub async fn guard<T, F>(&self, url: &str, fut: F) -> Result<T, SiteError>
    where
        F: Future<Output = Result<T, SiteError>>,
    {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(SiteError::Cancelled),
            () = deadline_elapsed(self.deadline) => {
                Err(SiteError::Timeout { url: url.to_string() })
            }
            result = fut => result,
        }
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
