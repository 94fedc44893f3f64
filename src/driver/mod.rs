//! Site drivers.
//!
//! A [`Driver`] adapts one schema family to the normalized model. Every
//! operation follows the same shape: `prepare_*` builds a [`SiteRequest`],
//! [`Driver::execute`] sends it through the site's [`SiteRequester`], and
//! `parse_*` turns the raw response into [`TorrentItem`]s or a [`UserInfo`].
//!
//! # Architecture
//!
//! - [`Driver`] - async trait implemented per schema
//! - [`DriverRegistry`] - schema name to constructor, built once at startup
//! - [`NexusPhpDriver`] - HTML sites described by a
//!   [`SiteDefinition`](crate::definition::SiteDefinition)
//! - [`MTorrentDriver`] - JSON API sites
//! - [`join_critical`] - one critical and several best-effort fetches run concurrently

mod composite;
mod flex;
mod mtorrent;
mod nexusphp;
mod registry;

pub use composite::{SubFetch, join_critical};
pub use flex::{FlexInt, FlexString};
pub use mtorrent::MTorrentDriver;
pub use nexusphp::NexusPhpDriver;
pub use registry::{DriverFactory, DriverRegistry, DriverResources, build_default_driver_registry};

use async_trait::async_trait;
use tracing::debug;

use crate::error::SiteError;
use crate::model::{TorrentItem, UserInfo};
use crate::request::{RawResponse, RequestContext, SiteRequest, SiteRequester};
use crate::units::now_unix;

/// A generic search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub keyword: String,
    /// Zero-based page.
    pub page: u32,
    pub page_size: u32,
}

impl SearchQuery {
    #[must_use]
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            page: 0,
            page_size: 100,
        }
    }
}

/// What a download response resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    /// The `.torrent` payload itself.
    Bytes(Vec<u8>),
    /// A follow-up absolute URL serving the payload.
    Url(String),
}

/// Schema adapter for one site.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Configured site id.
    fn site_id(&self) -> &str;

    /// Schema family name.
    fn schema(&self) -> &'static str;

    /// Requester bound to the site's base URLs.
    fn requester(&self) -> &SiteRequester;

    /// Builds the search request.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Unsupported`] when the site has no search.
    fn prepare_search(&self, query: &SearchQuery) -> Result<SiteRequest, SiteError>;

    /// Parses a search response.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Parse`] or [`SiteError::UpstreamApi`].
    fn parse_search(&self, response: &RawResponse) -> Result<Vec<TorrentItem>, SiteError>;

    /// Builds the primary user-info request.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Unsupported`] when the site exposes no account data.
    fn prepare_user_info(&self) -> Result<SiteRequest, SiteError>;

    /// Parses the primary user-info response.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Parse`], [`SiteError::UpstreamApi`] or an extraction error.
    fn parse_user_info(&self, response: &RawResponse) -> Result<UserInfo, SiteError>;

    /// Builds the download request for torrent `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Unsupported`] when downloads are not offered.
    fn prepare_download(&self, id: &str) -> Result<SiteRequest, SiteError>;

    /// Parses a download response.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Parse`] when the body is neither a torrent nor a link.
    fn parse_download(&self, response: RawResponse) -> Result<DownloadTarget, SiteError>;

    /// Fetches and parses one torrent's details.
    async fn get_torrent_detail(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<TorrentItem, SiteError>;

    /// Sends `request` through the site's requester.
    async fn execute(
        &self,
        ctx: &RequestContext,
        request: &SiteRequest,
    ) -> Result<RawResponse, SiteError> {
        self.requester().execute(ctx, request).await
    }

    /// Prepare, execute, parse.
    async fn search(
        &self,
        ctx: &RequestContext,
        query: &SearchQuery,
    ) -> Result<Vec<TorrentItem>, SiteError> {
        let request = self.prepare_search(query)?;
        let response = self.execute(ctx, &request).await?;
        self.parse_search(&response)
    }

    /// Prepare, execute, parse. Drivers with several sources override this.
    async fn get_user_info(&self, ctx: &RequestContext) -> Result<UserInfo, SiteError> {
        let request = self.prepare_user_info()?;
        let response = self.execute(ctx, &request).await?;
        let mut info = self.parse_user_info(&response)?;
        info.last_update = now_unix();
        Ok(info)
    }

    /// Prepare, execute, parse, then follow a returned link if there is one.
    async fn download(&self, ctx: &RequestContext, id: &str) -> Result<Vec<u8>, SiteError> {
        let request = self.prepare_download(id)?;
        let response = self.execute(ctx, &request).await?;
        match self.parse_download(response)? {
            DownloadTarget::Bytes(bytes) => Ok(bytes),
            DownloadTarget::Url(url) => {
                debug!(site = self.site_id(), url = %url, "following download link");
                let response = self.requester().fetch_absolute(ctx, &url).await?;
                Ok(response.body)
            }
        }
    }
}

/// Returns true when `body` looks like a bencoded dictionary (a torrent file).
#[must_use]
pub fn looks_like_torrent(body: &[u8]) -> bool {
    let body = body.trim_ascii();
    body.first() == Some(&b'd') && body.last() == Some(&b'e')
}
