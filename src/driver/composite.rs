//! Critical plus best-effort concurrent fetches.
//!
//! A composite fetch runs one critical sub-fetch and any number of optional
//! ones concurrently under a shared child [`RequestContext`]. A failed
//! critical fetch cancels the group and its error is returned; optional
//! failures are logged and dropped. Cancelling the caller's context cancels
//! every sub-fetch and fails the whole call.

use futures_util::future::{BoxFuture, join_all};
use tracing::{debug, warn};

use crate::error::SiteError;
use crate::request::RequestContext;

/// One named sub-fetch. Results are written by the future itself into state
/// it shares with its siblings (typically a `tokio::sync::Mutex`).
pub struct SubFetch<'a> {
    name: &'static str,
    future: BoxFuture<'a, Result<(), SiteError>>,
}

impl<'a> SubFetch<'a> {
    #[must_use]
    pub fn new(name: &'static str, future: BoxFuture<'a, Result<(), SiteError>>) -> Self {
        Self { name, future }
    }
}

/// Runs `critical` and `optional` concurrently.
///
/// `group` must be the context the sub-fetch futures were built with,
/// derived from the caller's context with [`RequestContext::child`].
///
/// # Errors
///
/// Returns the critical fetch's error, or [`SiteError::Cancelled`] when the
/// group was cancelled from outside.
pub async fn join_critical(
    group: &RequestContext,
    critical: SubFetch<'_>,
    optional: Vec<SubFetch<'_>>,
) -> Result<(), SiteError> {
    let SubFetch {
        name: critical_name,
        future: critical_future,
    } = critical;
    let critical = async move {
        let result = critical_future.await;
        if let Err(error) = &result {
            debug!(
                fetch = critical_name,
                error = %error,
                "critical fetch failed, cancelling group"
            );
            group.cancel();
        }
        result
    };

    let optional = join_all(optional.into_iter().map(|fetch| async move {
        match fetch.future.await {
            Ok(()) => debug!(fetch = fetch.name, "optional fetch completed"),
            Err(SiteError::Cancelled) => debug!(fetch = fetch.name, "optional fetch cancelled"),
            Err(error) => warn!(
                fetch = fetch.name,
                error = %error,
                "optional fetch failed; fields left at zero"
            ),
        }
    }));

    let (result, _) = tokio::join!(critical, optional);
    result?;
    if group.is_cancelled() {
        return Err(SiteError::Cancelled);
    }
    Ok(())
}
