//! Site HTTP transport.
//!
//! [`SiteTransport`] is the only seam through which the core touches the
//! network. [`ReqwestTransport`] is the production implementation; tests can
//! substitute their own.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Proxy};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Method, RawResponse, RequestBody, RequestContext};
use crate::error::SiteError;
use crate::user_agent;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 30;

/// Connect and read timeouts for the HTTP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpTimeouts {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        }
    }
}

/// A fully resolved outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    /// Absolute URL, query string included.
    pub url: String,
    pub body: Option<RequestBody>,
    pub headers: Vec<(String, String)>,
}

/// Site HTTP client capability: send a request, get back status and body.
///
/// Implementations must honour `ctx` cancellation and deadline.
#[async_trait]
pub trait SiteTransport: Send + Sync {
    /// Sends `request` and returns the raw response, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Network`], [`SiteError::Timeout`] or
    /// [`SiteError::Cancelled`]. HTTP status codes are not errors here.
    async fn send(
        &self,
        ctx: &RequestContext,
        request: TransportRequest,
    ) -> Result<RawResponse, SiteError>;

    /// Convenience GET.
    async fn get(
        &self,
        ctx: &RequestContext,
        url: &str,
        headers: Vec<(String, String)>,
    ) -> Result<RawResponse, SiteError> {
        self.send(
            ctx,
            TransportRequest {
                method: Method::Get,
                url: url.to_string(),
                body: None,
                headers,
            },
        )
        .await
    }

    /// Convenience POST.
    async fn post(
        &self,
        ctx: &RequestContext,
        url: &str,
        body: RequestBody,
        headers: Vec<(String, String)>,
    ) -> Result<RawResponse, SiteError> {
        self.send(
            ctx,
            TransportRequest {
                method: Method::Post,
                url: url.to_string(),
                body: Some(body),
                headers,
            },
        )
        .await
    }
}

/// [`SiteTransport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Builds a transport with the project User-Agent, gzip and `timeouts`.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Config`] when the HTTP client cannot be constructed.
    pub fn new(timeouts: HttpTimeouts) -> Result<Self, SiteError> {
        let user_agent = user_agent::default_user_agent();
        let client = match try_build_client(&user_agent, timeouts, false) {
            Ok(client) => client,
            Err(BuildClientFailure::Panic) => {
                // Some sandboxed environments panic when reading system proxy
                // settings; env proxies still apply on the fallback builder.
                warn!("HTTP client hit system proxy panic; using env-proxy fallback builder");
                try_build_client(&user_agent, timeouts, true)
                    .map_err(|failure| failure.into_error())?
            }
            Err(failure) => return Err(failure.into_error()),
        };
        Ok(Self { client })
    }
}

#[async_trait]
impl SiteTransport for ReqwestTransport {
    #[tracing::instrument(
        skip(self, ctx, request),
        fields(method = ?request.method, url = %request.url)
    )]
    async fn send(
        &self,
        ctx: &RequestContext,
        request: TransportRequest,
    ) -> Result<RawResponse, SiteError> {
        let url = request.url.clone();
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };
        let mut builder = self.client.request(method, url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Form(pairs)) => builder
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(encode_form(&pairs)),
            None => builder,
        };

        let target = url.as_str();
        ctx.guard(target, async move {
            let response = builder.send().await.map_err(|e| network_error(target, e))?;
            let status = response.status().as_u16();
            let final_url = response.url().to_string();
            let body = response.bytes().await.map_err(|e| network_error(target, e))?;
            debug!(status, bytes = body.len(), "response received");
            Ok(RawResponse {
                status,
                url: final_url,
                body: body.to_vec(),
            })
        })
        .await
    }
}

/// Encodes form pairs as `application/x-www-form-urlencoded`.
#[must_use]
pub fn encode_form(pairs: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

fn network_error(url: &str, source: reqwest::Error) -> SiteError {
    if source.is_timeout() {
        SiteError::Timeout { url: url.to_string() }
    } else {
        SiteError::Network {
            url: url.to_string(),
            source,
        }
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

impl BuildClientFailure {
    fn into_error(self) -> SiteError {
        match self {
            Self::Panic => SiteError::config("transport", "HTTP client construction panicked"),
            Self::Build(error) => {
                SiteError::config("transport", format!("HTTP client construction failed: {error}"))
            }
        }
    }
}

fn try_build_client(
    user_agent: &str,
    timeouts: HttpTimeouts,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    let user_agent = user_agent.to_string();
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(user_agent, timeouts);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(user_agent: String, timeouts: HttpTimeouts) -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(timeouts.connect_timeout_secs))
        .timeout(Duration::from_secs(timeouts.read_timeout_secs))
        .user_agent(user_agent)
        .gzip(true)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    for (scheme, names) in [
        ("https", ["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        ("http", ["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
    ] {
        let Some(proxy) = names.iter().find_map(|name| {
            std::env::var(name)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        }) else {
            continue;
        };
        let resolved = if scheme == "https" {
            Proxy::https(&proxy)
        } else {
            Proxy::http(&proxy)
        };
        if let Ok(resolved) = resolved {
            builder = builder.proxy(resolved);
        }
    }
    builder
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_form_escapes_values() {
        let pairs = vec![
            ("keyword".to_string(), "a b&c".to_string()),
            ("page".to_string(), "1".to_string()),
        ];
        assert_eq!(encode_form(&pairs), "keyword=a+b%26c&page=1");
    }

    #[test]
    fn test_default_timeouts() {
        let timeouts = HttpTimeouts::default();
        assert_eq!(timeouts.connect_timeout_secs, 10);
        assert_eq!(timeouts.read_timeout_secs, 30);
    }

    #[tokio::test]
    async fn test_cancelled_context_short_circuits_send() {
        let transport = ReqwestTransport::new(HttpTimeouts::default()).unwrap();
        let ctx = RequestContext::new();
        ctx.cancel();
        let err = transport
            .get(&ctx, "http://127.0.0.1:9/never", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::Cancelled));
    }
}
