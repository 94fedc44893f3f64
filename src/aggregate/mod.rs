//! Cross-site result handling: deduplication, ranking and multi-site search.

mod dedupe;
mod rank;

pub use dedupe::{deduplicate, deduplicate_by_title, merge_duplicates, normalize_title};
pub use rank::{Ranker, RankerConfig};

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::driver::SearchQuery;
use crate::error::SiteError;
use crate::model::TorrentItem;
use crate::request::RequestContext;
use crate::site::Site;

/// One site's failure during a multi-site search.
#[derive(Debug)]
pub struct SiteFailure {
    pub site: String,
    pub error: SiteError,
}

/// Result of [`search_sites`].
#[derive(Debug, Default)]
pub struct SearchReport {
    /// Deduplicated, ranked listings.
    pub items: Vec<TorrentItem>,
    /// Sites whose search failed, in configuration order.
    pub failures: Vec<SiteFailure>,
}

/// Searches every site concurrently, then deduplicates by info hash and ranks.
///
/// A failing site is logged and skipped; its error is kept in the report.
#[tracing::instrument(
    skip(sites, ctx, ranker),
    fields(sites = sites.len(), keyword = %query.keyword)
)]
pub async fn search_sites(
    sites: &[Site],
    ctx: &RequestContext,
    query: &SearchQuery,
    ranker: &Ranker,
) -> SearchReport {
    let results = join_all(
        sites
            .iter()
            .map(|site| async move { (site.id(), site.search(ctx, query).await) }),
    )
    .await;

    let mut collected = Vec::new();
    let mut failures = Vec::new();
    for (site, result) in results {
        match result {
            Ok(items) => collected.extend(items),
            Err(error) => {
                warn!(site, error = %error, "site search failed; skipping");
                failures.push(SiteFailure {
                    site: site.to_string(),
                    error,
                });
            }
        }
    }

    let unique = deduplicate(&collected);
    info!(
        collected = collected.len(),
        unique = unique.len(),
        failed = failures.len(),
        "multi-site search completed"
    );
    SearchReport {
        items: ranker.rank(&unique),
        failures,
    }
}
