//! Driver for the M-Team JSON API.
//!
//! Every endpoint answers with the envelope `{code, message, data}`. A call
//! succeeded when `code` is `"0"` or `"SUCCESS"`; anything else is surfaced as
//! [`SiteError::UpstreamApi`] with the remote message intact.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{FixedOffset, Offset, Utc};
use futures_util::FutureExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    DownloadTarget, Driver, DriverResources, FlexInt, FlexString, SearchQuery, SubFetch,
    join_critical, looks_like_torrent,
};
use crate::definition::CompiledDefinition;
use crate::discount::{DiscountLevel, PromotionRule, resolve_discount};
use crate::error::SiteError;
use crate::extract::ExtractError;
use crate::model::{TorrentItem, UserInfo};
use crate::request::{RawResponse, RequestContext, SiteRequest, SiteRequester};
use crate::site::SiteConfig;
use crate::units::{now_unix, parse_time};

const SEARCH_PATH: &str = "api/torrent/search";
const DETAIL_PATH: &str = "api/torrent/detail";
const DOWNLOAD_TOKEN_PATH: &str = "api/torrent/genDlToken";
const PROFILE_PATH: &str = "api/member/profile";
const BONUS_PATH: &str = "api/tracker/mybonus";
const MESSAGE_STATS_PATH: &str = "api/msg/notify/statistic";
const PEER_STATS_PATH: &str = "api/tracker/myPeerStatistics";

const DEFAULT_SEARCH_MODE: &str = "normal";
const DEFAULT_OFFSET_SECS: i32 = 8 * 3600;

#[derive(Debug, Deserialize)]
struct Envelope {
    code: FlexString,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    fn is_success(&self) -> bool {
        let code = self.code.as_str().trim();
        code == "0" || code.eq_ignore_ascii_case("success")
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchPage {
    #[serde(default)]
    data: Option<Vec<ApiTorrent>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiTorrent {
    id: FlexString,
    name: String,
    small_descr: Option<String>,
    size: Option<FlexInt>,
    created_date: Option<String>,
    category: Option<FlexString>,
    labels_new: Option<Vec<String>>,
    status: Option<ApiStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiStatus {
    discount: Option<String>,
    discount_end_time: Option<String>,
    seeders: Option<FlexInt>,
    leechers: Option<FlexInt>,
    times_completed: Option<FlexInt>,
    promotion_rule: Option<ApiPromotion>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiPromotion {
    discount: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiProfile {
    id: FlexString,
    username: String,
    created_date: Option<String>,
    role: Option<FlexInt>,
    member_count: Option<ApiMemberCount>,
    member_status: Option<ApiMemberStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiMemberCount {
    bonus: Option<FlexString>,
    uploaded: Option<FlexInt>,
    downloaded: Option<FlexInt>,
    share_rate: Option<FlexString>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiMemberStatus {
    last_browse: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiBonus {
    formula_params: Option<ApiFormula>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiFormula {
    final_bs: Option<FlexString>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiMessageStats {
    count: Option<FlexInt>,
    un_make: Option<FlexInt>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiPeerStats {
    seeder_count: Option<FlexInt>,
    seeder_size: Option<FlexInt>,
    leecher_count: Option<FlexInt>,
    leecher_size: Option<FlexInt>,
}

fn int(value: Option<FlexInt>) -> i64 {
    value.map_or(0, |v| v.0)
}

/// API-key driver for `mtorrent` sites.
pub struct MTorrentDriver {
    site: String,
    search_mode: String,
    offset: FixedOffset,
    definition: Option<Arc<CompiledDefinition>>,
    requester: SiteRequester,
}

impl MTorrentDriver {
    pub const SCHEMA: &'static str = "mtorrent";

    #[must_use]
    pub fn new(
        site: &str,
        definition: Option<Arc<CompiledDefinition>>,
        requester: SiteRequester,
    ) -> Self {
        let offset = definition.as_ref().map_or_else(
            || FixedOffset::east_opt(DEFAULT_OFFSET_SECS).unwrap_or_else(|| Utc.fix()),
            |def| def.offset(),
        );
        Self {
            site: site.to_string(),
            search_mode: DEFAULT_SEARCH_MODE.to_string(),
            offset,
            definition,
            requester,
        }
    }

    /// Search category (`normal`, `adult`, `movie`, ...).
    #[must_use]
    pub fn with_search_mode(mut self, mode: &str) -> Self {
        self.search_mode = mode.to_string();
        self
    }

    /// [`DriverFactory`](super::DriverFactory) for this schema.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Config`] when `options.api_key` is missing.
    pub fn factory(
        config: &SiteConfig,
        definition: Option<Arc<CompiledDefinition>>,
        resources: &DriverResources,
    ) -> Result<Arc<dyn Driver>, SiteError> {
        let api_key = config
            .option_str("api_key")
            .ok_or_else(|| SiteError::config(&config.id, "options.api_key is required"))?;
        let requester = SiteRequester::new(
            &config.id,
            config.all_urls(),
            Arc::clone(&resources.transport),
            Arc::clone(&resources.limiter),
        )?
        .with_default_header("x-api-key", api_key);

        let mut driver = Self::new(&config.id, definition, requester);
        if let Some(mode) = config.option_str("search_mode") {
            driver = driver.with_search_mode(mode);
        }
        Ok(Arc::new(driver))
    }

    /// Unwraps the `{code, message, data}` envelope. A successful reply with
    /// `data: null` decodes to `T::default()`.
    fn decode<T: DeserializeOwned + Default>(
        &self,
        context: &str,
        response: &RawResponse,
    ) -> Result<T, SiteError> {
        let envelope: Envelope = serde_json::from_slice(&response.body)
            .map_err(|e| SiteError::parse(&self.site, context, e, &response.body))?;
        if !envelope.is_success() {
            return Err(SiteError::upstream(
                &self.site,
                envelope.code.0,
                envelope.message.unwrap_or_default(),
            ));
        }
        serde_json::from_value::<Option<T>>(envelope.data)
            .map(Option::unwrap_or_default)
            .map_err(|e| SiteError::parse(&self.site, context, e, &response.body))
    }

    async fn call<T: DeserializeOwned + Default>(
        &self,
        ctx: &RequestContext,
        context: &str,
        request: SiteRequest,
    ) -> Result<T, SiteError> {
        let response = self.execute(ctx, &request).await?;
        self.decode(context, &response)
    }

    fn time(&self, raw: Option<&str>) -> i64 {
        raw.and_then(|raw| parse_time(raw, self.offset)).unwrap_or(0)
    }

    fn to_item(&self, torrent: ApiTorrent, now: i64) -> TorrentItem {
        let mut item = TorrentItem::new(torrent.id.0, torrent.name.trim(), &self.site);
        item.subtitle = torrent.small_descr.unwrap_or_default().trim().to_string();
        item.size_bytes = int(torrent.size);
        item.uploaded_at = self.time(torrent.created_date.as_deref());
        item.category = torrent.category.map(|c| c.0).unwrap_or_default();
        for label in torrent.labels_new.unwrap_or_default() {
            item.add_tag(label);
        }

        let status = torrent.status.unwrap_or_default();
        item.seeders = int(status.seeders);
        item.leechers = int(status.leechers);
        item.snatched = int(status.times_completed);

        let base = status
            .discount
            .as_deref()
            .and_then(DiscountLevel::from_site_token)
            .unwrap_or_default();
        let base_end = self.time(status.discount_end_time.as_deref());
        let promotion = status.promotion_rule.map(|rule| {
            PromotionRule::new(
                rule.discount
                    .as_deref()
                    .and_then(DiscountLevel::from_site_token)
                    .unwrap_or_default(),
                self.time(rule.start_time.as_deref()),
                self.time(rule.end_time.as_deref()),
            )
        });
        let (level, end) = resolve_discount(base, base_end, promotion.as_ref(), now);
        item.discount_level = level;
        item.discount_end_time = end;
        item
    }

    /// Copies the profile into `info`. A profile without a user id is an error.
    fn apply_profile(&self, info: &mut UserInfo, profile: ApiProfile) -> Result<(), SiteError> {
        if profile.id.as_str().trim().is_empty() {
            return Err(ExtractError::not_found("id").into());
        }
        info.user_id = profile.id.0;
        info.username = profile.username;
        info.join_date = self.time(profile.created_date.as_deref());
        if let Some(counts) = profile.member_count {
            info.bonus = counts.bonus.map_or(0.0, |b| b.to_f64());
            info.uploaded = int(counts.uploaded);
            info.downloaded = int(counts.downloaded);
            info.ratio = counts.share_rate.map_or(0.0, |r| r.to_f64());
        }
        if let Some(status) = profile.member_status {
            info.last_access = self.time(status.last_browse.as_deref());
        }
        info.level_id = int(profile.role);
        if let Some(level) = self.definition.as_ref().and_then(|def| {
            def.definition()
                .levels
                .iter()
                .find(|level| level.id == info.level_id)
                .map(|level| level.name.clone())
        }) {
            info.rank = level;
        }
        info.fill_ratio();
        Ok(())
    }
}

#[async_trait]
impl Driver for MTorrentDriver {
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
        Ok(SiteRequest::post_json(
            SEARCH_PATH,
            json!({
                "mode": self.search_mode,
                "keyword": query.keyword,
                "pageNumber": query.page + 1,
                "pageSize": query.page_size,
            }),
        ))
    }

    fn parse_search(&self, response: &RawResponse) -> Result<Vec<TorrentItem>, SiteError> {
        let page: SearchPage = self.decode("search", response)?;
        let now = now_unix();
        let items: Vec<TorrentItem> = page
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|torrent| self.to_item(torrent, now))
            .filter(|item| !item.id.is_empty())
            .collect();
        debug!(site = %self.site, count = items.len(), "decoded search page");
        Ok(items)
    }

    fn prepare_user_info(&self) -> Result<SiteRequest, SiteError> {
        Ok(SiteRequest::post_form(PROFILE_PATH, Vec::new()))
    }

    fn parse_user_info(&self, response: &RawResponse) -> Result<UserInfo, SiteError> {
        let profile: ApiProfile = self.decode("profile", response)?;
        let mut info = UserInfo {
            site: self.site.clone(),
            ..UserInfo::default()
        };
        self.apply_profile(&mut info, profile)?;
        Ok(info)
    }

    fn prepare_download(&self, id: &str) -> Result<SiteRequest, SiteError> {
        Ok(SiteRequest::post_form(
            DOWNLOAD_TOKEN_PATH,
            vec![("id".to_string(), id.to_string())],
        ))
    }

    fn parse_download(&self, response: RawResponse) -> Result<DownloadTarget, SiteError> {
        if looks_like_torrent(&response.body) {
            return Ok(DownloadTarget::Bytes(response.body));
        }
        let url: String = self.decode("download token", &response)?;
        if url.trim().is_empty() {
            return Err(SiteError::parse(
                &self.site,
                "download token",
                "empty download link",
                &response.body,
            ));
        }
        Ok(DownloadTarget::Url(url.trim().to_string()))
    }

    #[tracing::instrument(skip(self, ctx), fields(site = %self.site))]
    async fn get_torrent_detail(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<TorrentItem, SiteError> {
        let request =
            SiteRequest::post_form(DETAIL_PATH, vec![("id".to_string(), id.to_string())]);
        let torrent: ApiTorrent = self.call(ctx, "detail", request).await?;
        Ok(self.to_item(torrent, now_unix()))
    }

    /// Profile is critical; bonus rate, message counts and peer stats are best-effort.
    #[tracing::instrument(skip(self, ctx), fields(site = %self.site))]
    async fn get_user_info(&self, ctx: &RequestContext) -> Result<UserInfo, SiteError> {
        let group = ctx.child();
        let state = Mutex::new(UserInfo {
            site: self.site.clone(),
            ..UserInfo::default()
        });

        let profile = SubFetch::new(
            "profile",
            async {
                let profile: ApiProfile = self
                    .call(&group, "profile", SiteRequest::post_form(PROFILE_PATH, Vec::new()))
                    .await?;
                self.apply_profile(&mut *state.lock().await, profile)
            }
            .boxed(),
        );
        let bonus = SubFetch::new(
            "bonus",
            async {
                let bonus: ApiBonus = self
                    .call(&group, "bonus", SiteRequest::post_form(BONUS_PATH, Vec::new()))
                    .await?;
                let per_hour = bonus
                    .formula_params
                    .and_then(|params| params.final_bs)
                    .map_or(0.0, |value| value.to_f64());
                state.lock().await.bonus_per_hour = per_hour;
                Ok(())
            }
            .boxed(),
        );
        let messages = SubFetch::new(
            "messages",
            async {
                let request = SiteRequest::post_form(MESSAGE_STATS_PATH, Vec::new());
                let stats: ApiMessageStats = self.call(&group, "messages", request).await?;
                let mut info = state.lock().await;
                info.unread_messages = int(stats.un_make);
                info.total_messages = int(stats.count);
                Ok(())
            }
            .boxed(),
        );
        let peers = SubFetch::new(
            "peers",
            async {
                let stats: ApiPeerStats = self
                    .call(&group, "peers", SiteRequest::post_form(PEER_STATS_PATH, Vec::new()))
                    .await?;
                let mut info = state.lock().await;
                info.seeder_count = int(stats.seeder_count);
                info.seeder_size = int(stats.seeder_size);
                info.leecher_count = int(stats.leecher_count);
                info.leecher_size = int(stats.leecher_size);
                Ok(())
            }
            .boxed(),
        );

        join_critical(&group, profile, vec![bonus, messages, peers]).await?;

        let mut info = state.into_inner();
        info.last_update = now_unix();
        Ok(info)
    }
}

impl std::fmt::Debug for MTorrentDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MTorrentDriver")
            .field("site", &self.site)
            .field("search_mode", &self.search_mode)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::definition::DefinitionRegistry;
    use crate::request::{HttpTimeouts, RateLimiter, ReqwestTransport};

    const NOW: i64 = 1_700_000_000;

    fn driver() -> MTorrentDriver {
        let definitions = DefinitionRegistry::with_builtins().unwrap();
        let requester = SiteRequester::new(
            "mteam",
            vec!["https://api.mteam.test".to_string()],
            Arc::new(ReqwestTransport::new(HttpTimeouts::default()).unwrap()),
            Arc::new(RateLimiter::new()),
        )
        .unwrap();
        MTorrentDriver::new("mteam", definitions.get("mtorrent"), requester)
    }

    fn response(body: &Value) -> RawResponse {
        RawResponse {
            status: 200,
            url: "https://api.mteam.test/api".to_string(),
            body: serde_json::to_vec(body).unwrap(),
        }
    }

    #[test]
    fn test_envelope_success_codes() {
        let driver = driver();
        for code in [json!("0"), json!(0), json!("SUCCESS"), json!("success")] {
            let out: Value = driver
                .decode("test", &response(&json!({"code": code, "data": {"x": 1}})))
                .unwrap();
            assert_eq!(out["x"], 1);
        }
    }

    #[test]
    fn test_envelope_failure_keeps_message() {
        let driver = driver();
        let err = driver
            .decode::<Value>(
                "test",
                &response(&json!({"code": 1, "message": "key revoked", "data": null})),
            )
            .unwrap_err();
        match err {
            SiteError::UpstreamApi { code, message, .. } => {
                assert_eq!(code, "1");
                assert_eq!(message, "key revoked");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_promotion_beats_base_discount() {
        let driver = driver();
        let torrent: ApiTorrent = serde_json::from_value(json!({
            "id": "901",
            "name": " Big.Movie.2160p ",
            "smallDescr": "remux",
            "size": "53687091200",
            "createdDate": "2023-11-14 10:00:00",
            "category": 401,
            "labelsNew": ["4k", "hdr", "4k"],
            "status": {
                "discount": "PERCENT_50",
                "discountEndTime": "2023-11-20 00:00:00",
                "seeders": "12",
                "leechers": 3,
                "timesCompleted": "40",
                "promotionRule": {
                    "discount": "FREE",
                    "startTime": "2023-11-01 00:00:00",
                    "endTime": "2023-12-01 00:00:00"
                }
            }
        }))
        .unwrap();
        let item = driver.to_item(torrent, NOW);
        assert_eq!(item.title, "Big.Movie.2160p");
        assert_eq!(item.size_bytes, 53_687_091_200);
        assert_eq!(item.category, "401");
        assert_eq!(item.tags, vec!["4k", "hdr"]);
        assert_eq!(item.seeders, 12);
        assert_eq!(item.snatched, 40);
        assert_eq!(item.discount_level, DiscountLevel::Free);
        assert_eq!(item.discount_end_time, 1_701_360_000);
    }

    #[test]
    fn test_expired_promotion_keeps_base() {
        let driver = driver();
        let torrent: ApiTorrent = serde_json::from_value(json!({
            "id": 902,
            "name": "Old",
            "status": {
                "discount": "PERCENT_50",
                "promotionRule": {"discount": "FREE", "endTime": "2023-01-01 00:00:00"}
            }
        }))
        .unwrap();
        let item = driver.to_item(torrent, NOW);
        assert_eq!(item.id, "902");
        assert_eq!(item.discount_level, DiscountLevel::Percent50);
        assert_eq!(item.discount_end_time, 0);
    }

    #[test]
    fn test_parse_search_skips_items_without_id() {
        let driver = driver();
        let items = driver
            .parse_search(&response(&json!({
                "code": "0",
                "data": {"total": "2", "data": [{"id": "1", "name": "A"}, {"name": "B"}]}
            })))
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source_site, "mteam");
    }

    #[test]
    fn test_null_data_decodes_to_empty_result() {
        let driver = driver();
        let items = driver
            .parse_search(&response(&json!({"code": "0", "message": "SUCCESS", "data": null})))
            .unwrap();
        assert!(items.is_empty());

        let bonus: ApiBonus = driver
            .decode("bonus", &response(&json!({"code": "0", "data": null})))
            .unwrap();
        assert!(bonus.formula_params.is_none());

        let err = driver
            .parse_download(response(&json!({"code": "0", "data": null})))
            .unwrap_err();
        assert!(matches!(err, SiteError::Parse { .. }));
    }

    #[test]
    fn test_null_profile_is_missing_identity() {
        let driver = driver();
        let err = driver
            .parse_user_info(&response(&json!({"code": "0", "data": null})))
            .unwrap_err();
        assert!(
            matches!(err, SiteError::Extract(ExtractError::FieldNotFound { .. })),
            "got {err:?}"
        );
    }

    #[test]
    fn test_parse_user_info_maps_profile() {
        let driver = driver();
        let info = driver
            .parse_user_info(&response(&json!({
                "code": "0",
                "data": {
                    "id": "77",
                    "username": "alice",
                    "role": "2",
                    "createdDate": "2020-01-01 00:00:00",
                    "memberCount": {
                        "bonus": "1234.5",
                        "uploaded": "2000",
                        "downloaded": "1000",
                        "shareRate": "2.000"
                    },
                    "memberStatus": {"lastBrowse": "2023-11-14 08:00:00"}
                }
            })))
            .unwrap();
        assert_eq!(info.user_id, "77");
        assert_eq!(info.username, "alice");
        assert_eq!(info.level_id, 2);
        assert_eq!(info.rank, "Power User");
        assert!((info.bonus - 1234.5).abs() < f64::EPSILON);
        assert!((info.ratio - 2.0).abs() < f64::EPSILON);
        assert_eq!(info.join_date, 1_577_808_000);
    }

    #[test]
    fn test_parse_download_returns_link() {
        let driver = driver();
        let target = driver
            .parse_download(response(&json!({"code": "0", "data": "https://dl.mteam.test/t/abc"})))
            .unwrap();
        assert_eq!(target, DownloadTarget::Url("https://dl.mteam.test/t/abc".to_string()));
    }

    #[test]
    fn test_search_body_uses_one_based_page() {
        let driver = driver();
        let mut query = SearchQuery::new("dune");
        query.page = 1;
        let request = driver.prepare_search(&query).unwrap();
        match request.body {
            Some(crate::request::RequestBody::Json(body)) => {
                assert_eq!(body["pageNumber"], 2);
                assert_eq!(body["mode"], "normal");
                assert_eq!(body["keyword"], "dune");
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }
}
