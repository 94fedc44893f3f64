//! Resilient request layer.
//!
//! Drivers describe requests as [`SiteRequest`]s relative to the site's base
//! URL. A [`SiteRequester`] resolves them against the configured base URLs
//! (with failover when more than one is configured), applies the site's rate
//! limit and default headers, sends them through a [`SiteTransport`], and maps
//! HTTP status codes onto [`SiteError`].

mod context;
mod failover;
mod rate_limiter;
mod transport;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub use context::RequestContext;
pub use failover::FailoverUrls;
pub use rate_limiter::RateLimiter;
pub use transport::{HttpTimeouts, ReqwestTransport, SiteTransport, TransportRequest, encode_form};

use crate::error::SiteError;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Method {
    #[default]
    #[serde(rename = "GET", alias = "get")]
    Get,
    #[serde(rename = "POST", alias = "post")]
    Post,
}

/// Request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded` pairs.
    Form(Vec<(String, String)>),
    /// JSON document.
    Json(Value),
}

/// A request relative to a site's base URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteRequest {
    pub method: Method,
    /// Path (optionally with a query string) relative to the base URL, or an absolute URL.
    pub path: String,
    /// Extra query parameters appended to `path`.
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub headers: Vec<(String, String)>,
}

impl SiteRequest {
    /// GET request for `path`.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// POST request with a JSON body.
    #[must_use]
    pub fn post_json(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(RequestBody::Json(body)),
            ..Self::default()
        }
    }

    /// POST request with a form body.
    #[must_use]
    pub fn post_form(path: impl Into<String>, pairs: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(RequestBody::Form(pairs)),
            ..Self::default()
        }
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Resolves this request against `base` into an absolute URL.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Config`] naming `site` when the result is not a valid URL.
    pub fn url_for(&self, site: &str, base: &str) -> Result<String, SiteError> {
        let joined = join_url(base, &self.path);
        let mut url = url::Url::parse(&joined)
            .map_err(|e| SiteError::config(site, format!("invalid request URL '{joined}': {e}")))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url.to_string())
    }
}

/// Joins a base URL and a relative path. Absolute `path`s are returned as-is.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let path = path.trim_start_matches("./").trim_start_matches('/');
    format!("{}/{path}", base.trim_end_matches('/'))
}

/// Response as returned by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes [`SiteRequest`]s for one site.
pub struct SiteRequester {
    site: String,
    urls: FailoverUrls,
    transport: Arc<dyn SiteTransport>,
    limiter: Arc<RateLimiter>,
    default_headers: Vec<(String, String)>,
}

impl SiteRequester {
    /// Creates a requester over `urls` (primary first).
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Config`] when `urls` holds no usable URL.
    pub fn new(
        site: &str,
        urls: impl IntoIterator<Item = String>,
        transport: Arc<dyn SiteTransport>,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, SiteError> {
        Ok(Self {
            site: site.to_string(),
            urls: FailoverUrls::new(site, urls)?,
            transport,
            limiter,
            default_headers: Vec::new(),
        })
    }

    /// Adds a header sent with every request (cookie, API key).
    #[must_use]
    pub fn with_default_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn site(&self) -> &str {
        &self.site
    }

    /// Base URL the next request tries first.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.urls.current()
    }

    /// Executes `request`, failing over across base URLs when several are configured.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::InvalidCredentials`] on 401/403, [`SiteError::HttpStatus`]
    /// on other non-2xx statuses, or the transport error. With failover, the
    /// last attempt's error.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        request: &SiteRequest,
    ) -> Result<RawResponse, SiteError> {
        if self.urls.len() == 1 {
            return self.attempt(ctx, self.urls.current(), request).await;
        }
        self.urls
            .execute(ctx, |base| async move { self.attempt(ctx, &base, request).await })
            .await
    }

    /// Fetches an absolute URL (for example a signed download link) without failover.
    ///
    /// # Errors
    ///
    /// Same status mapping as [`SiteRequester::execute`].
    pub async fn fetch_absolute(
        &self,
        ctx: &RequestContext,
        url: &str,
    ) -> Result<RawResponse, SiteError> {
        self.attempt(ctx, "", &SiteRequest::get(url)).await
    }

    async fn attempt(
        &self,
        ctx: &RequestContext,
        base: &str,
        request: &SiteRequest,
    ) -> Result<RawResponse, SiteError> {
        let url = request.url_for(&self.site, base)?;
        ctx.guard(&url, async {
            self.limiter.acquire(&self.site).await;
            Ok(())
        })
        .await?;

        let mut headers = self.default_headers.clone();
        headers.extend(request.headers.iter().cloned());
        debug!(site = %self.site, method = ?request.method, url = %url, "sending request");

        let response = self
            .transport
            .send(
                ctx,
                TransportRequest {
                    method: request.method,
                    url,
                    body: request.body.clone(),
                    headers,
                },
            )
            .await?;
        check_status(&self.site, response)
    }
}

impl std::fmt::Debug for SiteRequester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteRequester")
            .field("site", &self.site)
            .field("urls", &self.urls)
            .finish_non_exhaustive()
    }
}

/// Maps HTTP status onto the error taxonomy.
///
/// # Errors
///
/// 401/403 become [`SiteError::InvalidCredentials`]; any other non-2xx status
/// becomes [`SiteError::HttpStatus`].
pub fn check_status(site: &str, response: RawResponse) -> Result<RawResponse, SiteError> {
    match response.status {
        401 | 403 => Err(SiteError::InvalidCredentials {
            site: site.to_string(),
            status: response.status,
        }),
        _ if response.is_success() => Ok(response),
        status => Err(SiteError::HttpStatus {
            url: response.url,
            status,
        }),
    }
}
