//! Multi-URL failover.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{info, warn};

use super::RequestContext;
use crate::error::SiteError;

/// Candidate base URLs for one site, remembering the last one that worked.
#[derive(Debug)]
pub struct FailoverUrls {
    site: String,
    urls: Vec<String>,
    preferred: AtomicUsize,
}

impl FailoverUrls {
    /// Creates the candidate set. Blank and repeated URLs are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Config`] when no usable URL remains.
    pub fn new(site: &str, urls: impl IntoIterator<Item = String>) -> Result<Self, SiteError> {
        let mut unique: Vec<String> = Vec::new();
        for url in urls {
            let url = url.trim().to_string();
            if !url.is_empty() && !unique.contains(&url) {
                unique.push(url);
            }
        }
        if unique.is_empty() {
            return Err(SiteError::config(site, "no base URL configured"));
        }
        Ok(Self {
            site: site.to_string(),
            urls: unique,
            preferred: AtomicUsize::new(0),
        })
    }

    /// Number of candidate URLs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Always false; construction rejects empty sets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// The URL the next call tries first.
    #[must_use]
    pub fn current(&self) -> &str {
        let index = self.preferred.load(Ordering::Relaxed);
        self.urls.get(index).map_or("", String::as_str)
    }

    /// Runs `attempt` against each URL, last-known-good first, then the rest
    /// in declared order. Each URL is tried at most once.
    ///
    /// # Errors
    ///
    /// Returns the first terminal error (credentials, cancellation) at once,
    /// otherwise the last attempt's error when every URL fails.
    pub async fn execute<T, F, Fut>(
        &self,
        ctx: &RequestContext,
        mut attempt: F,
    ) -> Result<T, SiteError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, SiteError>>,
    {
        let start = self.preferred.load(Ordering::Relaxed);
        let order = std::iter::once(start).chain((0..self.urls.len()).filter(|&i| i != start));
        let mut last_error = None;

        for index in order {
            if ctx.is_cancelled() {
                return Err(SiteError::Cancelled);
            }
            let Some(base) = self.urls.get(index) else {
                continue;
            };
            match attempt(base.clone()).await {
                Ok(value) => {
                    if index != start {
                        info!(site = %self.site, url = %base, "switched to alternate URL");
                        self.preferred.store(index, Ordering::Relaxed);
                    }
                    return Ok(value);
                }
                Err(error) if error.is_terminal() => return Err(error),
                Err(error) => {
                    warn!(
                        site = %self.site,
                        url = %base,
                        error = %error,
                        "request failed, trying next URL"
                    );
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SiteError::config(&self.site, "no base URL configured")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn urls(list: &[&str]) -> FailoverUrls {
        FailoverUrls::new("demo", list.iter().map(ToString::to_string)).unwrap()
    }

    fn down(url: &str) -> SiteError {
        SiteError::HttpStatus {
            url: url.to_string(),
            status: 502,
        }
    }

    #[tokio::test]
    async fn test_first_success_wins_and_is_remembered() {
        let failover = urls(&["https://a", "https://b", "https://c"]);
        let tried = Mutex::new(Vec::new());

        let value = failover
            .execute(&RequestContext::new(), |base| {
                tried.lock().unwrap().push(base.clone());
                async move {
                    if base == "https://b" { Ok(base) } else { Err(down(&base)) }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, "https://b");
        assert_eq!(*tried.lock().unwrap(), vec!["https://a", "https://b"]);
        assert_eq!(failover.current(), "https://b");

        tried.lock().unwrap().clear();
        failover
            .execute(&RequestContext::new(), |base| {
                tried.lock().unwrap().push(base.clone());
                async move { Ok::<_, SiteError>(base) }
            })
            .await
            .unwrap();
        assert_eq!(*tried.lock().unwrap(), vec!["https://b"], "last-known-good goes first");
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let failover = urls(&["https://a", "https://b"]);
        let attempts = Mutex::new(0);
        let err = failover
            .execute(&RequestContext::new(), |base| {
                *attempts.lock().unwrap() += 1;
                async move { Err::<(), _>(down(&base)) }
            })
            .await
            .unwrap_err();
        assert_eq!(*attempts.lock().unwrap(), 2, "bounded by the URL count");
        assert!(matches!(err, SiteError::HttpStatus { url, .. } if url == "https://b"));
    }

    #[tokio::test]
    async fn test_invalid_credentials_short_circuit() {
        let failover = urls(&["https://a", "https://b"]);
        let attempts = Mutex::new(0);
        let err = failover
            .execute(&RequestContext::new(), |_| {
                *attempts.lock().unwrap() += 1;
                async {
                    Err::<(), _>(SiteError::InvalidCredentials {
                        site: "demo".to_string(),
                        status: 401,
                    })
                }
            })
            .await
            .unwrap_err();
        assert_eq!(*attempts.lock().unwrap(), 1);
        assert!(matches!(err, SiteError::InvalidCredentials { .. }));
    }

    #[test]
    fn test_new_dedupes_and_rejects_empty() {
        assert_eq!(urls(&["https://a", " https://a ", "", "https://b"]).len(), 2);
        assert!(FailoverUrls::new("demo", Vec::new()).is_err());
    }
}
