//! Driver for HTML sites described by a declarative definition.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::Html;
use tracing::{debug, warn};

use super::{DownloadTarget, Driver, DriverResources, SearchQuery, looks_like_torrent};
use crate::definition::{CompiledDefinition, SearchPlan};
use crate::error::SiteError;
use crate::extract::{CompiledStep, Document, ExtractError, UserInfoCollector, UserInfoPlan};
use crate::model::{TorrentItem, UserInfo};
use crate::request::{RawResponse, RequestContext, SiteRequest, SiteRequester, join_url};
use crate::site::SiteConfig;
use crate::units::now_unix;

/// Selector-driven driver for NexusPHP-family sites.
///
/// Authentication is the browser cookie from `options.cookie`.
pub struct NexusPhpDriver {
    site: String,
    definition: Arc<CompiledDefinition>,
    requester: SiteRequester,
}

impl NexusPhpDriver {
    pub const SCHEMA: &'static str = "nexusphp";

    #[must_use]
    pub fn new(site: &str, definition: Arc<CompiledDefinition>, requester: SiteRequester) -> Self {
        Self {
            site: site.to_string(),
            definition,
            requester,
        }
    }

    /// [`DriverFactory`](super::DriverFactory) for this schema.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Config`] when no definition matches or the cookie is missing.
    pub fn factory(
        config: &SiteConfig,
        definition: Option<Arc<CompiledDefinition>>,
        resources: &DriverResources,
    ) -> Result<Arc<dyn Driver>, SiteError> {
        let definition = definition
            .ok_or_else(|| SiteError::config(&config.id, "no site definition matches this site"))?;
        let cookie = config
            .option_str("cookie")
            .ok_or_else(|| SiteError::config(&config.id, "options.cookie is required"))?;

        let mut requester = SiteRequester::new(
            &config.id,
            config.all_urls(),
            Arc::clone(&resources.transport),
            Arc::clone(&resources.limiter),
        )?
        .with_default_header("Cookie", cookie);
        if let Some(user_agent) = config.option_str("user_agent") {
            requester = requester.with_default_header("User-Agent", user_agent);
        }
        Ok(Arc::new(Self::new(&config.id, definition, requester)))
    }

    fn search_plan(&self) -> Result<&SearchPlan, SiteError> {
        self.definition
            .search()
            .ok_or_else(|| SiteError::unsupported(&self.site, "search"))
    }

    fn user_info_plan(&self) -> Result<&UserInfoPlan, SiteError> {
        self.definition
            .user_info()
            .ok_or_else(|| SiteError::unsupported(&self.site, "user info"))
    }

    /// NexusPHP answers an expired session with the login page and HTTP 200.
    fn ensure_logged_in(&self, response: &RawResponse) -> Result<(), SiteError> {
        if response.url.contains("login.php") {
            return Err(SiteError::InvalidCredentials {
                site: self.site.clone(),
                status: response.status,
            });
        }
        Ok(())
    }

    fn absolutize(&self, item: &mut TorrentItem) {
        let base = self.requester.base_url();
        item.download_url = Some(match item.download_url.take() {
            Some(url) => join_url(base, &url),
            None => join_url(base, &format!("download.php?id={}", urlencoding::encode(&item.id))),
        });
    }

    fn absorb_step(
        &self,
        collector: &mut UserInfoCollector<'_>,
        step: &CompiledStep,
        response: &RawResponse,
    ) -> Result<(), SiteError> {
        let document = Document::parse(&response.body, step.response_type)
            .map_err(|e| SiteError::parse(&self.site, "user info", e, &response.body))?;
        collector.absorb(step, &document)?;
        Ok(())
    }

    fn parse_detail(&self, id: &str, response: &RawResponse) -> Result<TorrentItem, SiteError> {
        self.ensure_logged_in(response)?;
        let html = Html::parse_document(&String::from_utf8_lossy(&response.body));
        let mut item = TorrentItem::new(id, "", &self.site);
        self.definition.detail().parse_into(&html, &mut item);
        if item.title.is_empty() {
            return Err(ExtractError::not_found("title").into());
        }
        self.absolutize(&mut item);
        Ok(item)
    }
}

#[async_trait]
impl Driver for NexusPhpDriver {
    fn site_id(&self) -> &str {
        &self.site
    }

    fn schema(&self) -> &'static str {
        Self::SCHEMA
    }

    fn requester(&self) -> &SiteRequester {
        &self.requester
    }

    fn prepare_search(&self, query: &SearchQuery) -> Result<SiteRequest, SiteError> {
        let config = self.search_plan()?.config();
        let mut request = SiteRequest::get(&config.path);
        for (name, value) in &config.params {
            request = request.with_query(name, value);
        }
        request = request.with_query(&config.keyword_param, &query.keyword);
        if let Some(page_param) = &config.page_param
            && query.page > 0
        {
            request = request.with_query(page_param, query.page.to_string());
        }
        Ok(request)
    }

    fn parse_search(&self, response: &RawResponse) -> Result<Vec<TorrentItem>, SiteError> {
        self.ensure_logged_in(response)?;
        let plan = self.search_plan()?;
        let html = Html::parse_document(&String::from_utf8_lossy(&response.body));
        let detail = self.definition.detail();
        let mut items = plan.parse_rows(&html, &self.site, |token| detail.discount_for(token));
        for item in &mut items {
            self.absolutize(item);
        }
        debug!(site = %self.site, count = items.len(), "parsed search rows");
        Ok(items)
    }

    fn prepare_user_info(&self) -> Result<SiteRequest, SiteError> {
        let plan = self.user_info_plan()?;
        let step = plan
            .steps()
            .first()
            .ok_or_else(|| SiteError::unsupported(&self.site, "user info"))?;
        Ok(UserInfoCollector::new(plan).request_for(step)?)
    }

    fn parse_user_info(&self, response: &RawResponse) -> Result<UserInfo, SiteError> {
        self.ensure_logged_in(response)?;
        let plan = self.user_info_plan()?;
        let mut collector = UserInfoCollector::new(plan);
        if let Some(step) = plan.steps().first() {
            self.absorb_step(&mut collector, step, response)?;
        }
        let info = collector.into_user_info(&self.site);
        if !info.has_identity() {
            return Err(ExtractError::not_found("id").into());
        }
        Ok(info)
    }

    fn prepare_download(&self, id: &str) -> Result<SiteRequest, SiteError> {
        Ok(SiteRequest::get("download.php").with_query("id", id))
    }

    fn parse_download(&self, response: RawResponse) -> Result<DownloadTarget, SiteError> {
        self.ensure_logged_in(&response)?;
        if looks_like_torrent(&response.body) {
            return Ok(DownloadTarget::Bytes(response.body));
        }
        Err(SiteError::parse(
            &self.site,
            "download",
            "response is not a torrent file",
            &response.body,
        ))
    }

    #[tracing::instrument(skip(self, ctx), fields(site = %self.site))]
    async fn get_torrent_detail(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<TorrentItem, SiteError> {
        let request = SiteRequest::get(self.definition.detail().path_for(id));
        let response = self.execute(ctx, &request).await?;
        self.parse_detail(id, &response)
    }

    /// Runs every fetch step in order.
    ///
    /// The first step is critical. A failed assertion or a failed later step
    /// stops the sequence and keeps what was captured so far.
    #[tracing::instrument(skip(self, ctx), fields(site = %self.site))]
    async fn get_user_info(&self, ctx: &RequestContext) -> Result<UserInfo, SiteError> {
        let plan = self.user_info_plan()?;
        let mut collector = UserInfoCollector::new(plan);

        for (index, step) in plan.steps().iter().enumerate() {
            let request = match collector.request_for(step) {
                Ok(request) => request,
                Err(error) => {
                    warn!(step = index, error = %error, "user-info step skipped");
                    break;
                }
            };
            let response = match self.execute(ctx, &request).await {
                Ok(response) => response,
                Err(error) if index == 0 || error.is_terminal() => return Err(error),
                Err(error) => {
                    warn!(
                        step = index,
                        error = %error,
                        "user-info step failed; keeping captured fields"
                    );
                    break;
                }
            };
            self.ensure_logged_in(&response)?;
            match self.absorb_step(&mut collector, step, &response) {
                Ok(()) => {}
                Err(SiteError::Extract(error @ ExtractError::AssertionFailed { .. })) => {
                    warn!(
                        step = index,
                        error = %error,
                        "user-info assertion failed; remaining steps skipped"
                    );
                    break;
                }
                Err(error) => return Err(error),
            }
        }

        let mut info = collector.into_user_info(&self.site);
        if !info.has_identity() {
            return Err(ExtractError::not_found("id").into());
        }
        if info.rank.is_empty()
            && let Some(level) = self
                .definition
                .definition()
                .levels
                .iter()
                .find(|level| level.id == info.level_id)
        {
            info.rank.clone_from(&level.name);
        }
        info.last_update = now_unix();
        Ok(info)
    }
}

impl std::fmt::Debug for NexusPhpDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NexusPhpDriver")
            .field("site", &self.site)
            .field("definition", &self.definition.id())
            .finish_non_exhaustive()
    }
}
