//! CLI entry point for ptharvest.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures_util::future::join_all;
use ptharvest_core::units::{format_size, now_unix};
use ptharvest_core::{
    DefinitionRegistry, DiscountLevel, DriverResources, RateLimiter, Ranker, ReqwestTransport,
    RequestContext, SearchQuery, Site, TorrentItem, UserInfo, build_default_driver_registry,
    check_feasibility, search_sites,
};
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use app_config::AppConfig;
use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    if let Command::Feasibility {
        size,
        speed,
        level,
        ends_in,
    } = &args.command
    {
        return run_feasibility(*size, *speed, *level, *ends_in);
    }

    let config = AppConfig::load(&args.config)?;
    let runtime = Runtime::build(&config)?;
    let ctx = RequestContext::with_timeout(Duration::from_secs(args.timeout));
    spawn_ctrl_c_handler(ctx.clone());

    match args.command {
        Command::Search {
            keyword,
            sites,
            page,
            json,
        } => {
            let sites = runtime.sites(&config, &sites)?;
            let mut query = SearchQuery::new(keyword);
            query.page = page;
            let ranker = Ranker::from_config(&config.ranking);
            let report = search_sites(&sites, &ctx, &query, &ranker).await;
            if !sites.is_empty() && report.failures.len() == sites.len() {
                bail!("Search failed on every site");
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&report.items)?);
            } else {
                print_results(&report.items, &ranker);
            }
        }
        Command::UserInfo { sites, json } => {
            let sites = runtime.sites(&config, &sites)?;
            let results = join_all(sites.iter().map(|site| site.get_user_info(&ctx))).await;
            let mut collected = Vec::new();
            for (site, result) in sites.iter().zip(results) {
                match result {
                    Ok(user) => collected.push(user),
                    Err(error) => warn!(site = site.id(), error = %error, "user info failed"),
                }
            }
            if collected.is_empty() && !sites.is_empty() {
                bail!("User info failed on every site");
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&collected)?);
            } else {
                for user in &collected {
                    print_user(user, &runtime, &config);
                }
            }
        }
        Command::Detail { site, id } => {
            let site = runtime.site(&config, &site)?;
            let item = site
                .get_torrent_detail(&ctx, &id)
                .await
                .with_context(|| format!("Failed to fetch torrent {id} from {}", site.id()))?;
            println!("{}", serde_json::to_string_pretty(&item)?);
        }
        Command::Download { site, id, output } => {
            let site = runtime.site(&config, &site)?;
            let bytes = site
                .download(&ctx, &id)
                .await
                .with_context(|| format!("Failed to download torrent {id} from {}", site.id()))?;
            tokio::fs::write(&output, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!(path = %output.display(), bytes = bytes.len(), "Torrent saved");
        }
        Command::Feasibility { .. } => {}
    }

    Ok(())
}

/// Shared resources plus the driver registry.
struct Runtime {
    resources: DriverResources,
}

impl Runtime {
    fn build(config: &AppConfig) -> Result<Self> {
        let mut definitions =
            DefinitionRegistry::with_builtins().context("Failed to load built-in definitions")?;
        if let Some(dir) = &config.definitions_dir {
            let loaded = definitions
                .load_dir(dir)
                .with_context(|| format!("Failed to load definitions from {}", dir.display()))?;
            debug!(count = loaded, "Loaded extra definitions");
        }
        let transport = ReqwestTransport::new(config.http).context("Failed to build HTTP client")?;
        Ok(Self {
            resources: DriverResources {
                transport: Arc::new(transport),
                limiter: Arc::new(RateLimiter::new()),
                definitions: Arc::new(definitions),
            },
        })
    }

    fn sites(&self, config: &AppConfig, ids: &[String]) -> Result<Vec<Site>> {
        let registry = build_default_driver_registry();
        config
            .select_sites(ids)?
            .into_iter()
            .map(|site| {
                registry
                    .build(site, &self.resources)
                    .with_context(|| format!("Failed to set up site `{}`", site.id))
            })
            .collect()
    }

    fn site(&self, config: &AppConfig, id: &str) -> Result<Site> {
        self.sites(config, &[id.to_string()])?
            .pop()
            .with_context(|| format!("No site with id `{id}` in config"))
    }
}

fn spawn_ctrl_c_handler(ctx: RequestContext) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight requests");
            ctx.cancel();
        }
    });
}

fn run_feasibility(
    size: i64,
    speed: f64,
    level: DiscountLevel,
    ends_in: Option<i64>,
) -> Result<()> {
    let now = now_unix();
    let end_time = ends_in.map_or(0, |secs| now + secs);
    let result = check_feasibility(size, speed, level, end_time, now);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn print_results(items: &[TorrentItem], ranker: &Ranker) {
    for (position, item) in items.iter().enumerate() {
        println!(
            "{:>3}. [{}] {}  {}  S:{} L:{}  {}  ({:.1})",
            position + 1,
            item.source_site,
            item.title,
            format_size(item.size_bytes),
            item.seeders,
            item.leechers,
            item.discount_level,
            ranker.score(item),
        );
    }
}

fn print_user(user: &UserInfo, runtime: &Runtime, config: &AppConfig) {
    println!(
        "[{}] {} (id {})  rank: {}  up: {}  down: {}  \
         ratio: {:.2}  bonus: {:.1} (+{:.1}/h)  unread: {}",
        user.site,
        user.username,
        user.user_id,
        user.rank,
        format_size(user.uploaded),
        format_size(user.downloaded),
        user.ratio,
        user.bonus,
        user.bonus_per_hour,
        user.unread_messages,
    );
    let Some(site) = config.sites.iter().find(|site| site.id == user.site) else {
        return;
    };
    if let Some(definition) = runtime
        .resources
        .definitions
        .resolve(&site.id, &site.base_url, &site.schema)
        && let Some(next) = definition.definition().next_level(user, now_unix())
    {
        println!("      next level: {} ({})", next.name, next.privilege);
    }
}
