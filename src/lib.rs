//! ptharvest core library
//!
//! Collects torrent listings and account statistics from private tracker
//! sites, HTML-scraped and JSON-API alike, normalizes them into one model,
//! then deduplicates and ranks them across sites.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`units`] - size, number and site-local time parsing
//! - [`discount`] - discount levels, promotion resolution, feasibility
//! - [`extract`] - declarative selector/filter extraction engine
//! - [`definition`] - site definitions and their registry
//! - [`request`] - rate-limited, cancellable requests with URL failover
//! - [`driver`] - per-schema site drivers and the composite fetch
//! - [`site`] - configured sites and their public operations
//! - [`aggregate`] - deduplication, ranking and multi-site search

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregate;
pub mod definition;
pub mod discount;
pub mod driver;
pub mod error;
pub mod extract;
pub mod model;
pub mod request;
pub mod site;
pub mod units;
mod user_agent;

// Re-export commonly used types
pub use aggregate::{Ranker, RankerConfig, SearchReport, SiteFailure, deduplicate, search_sites};
pub use definition::{CompiledDefinition, DefinitionError, DefinitionRegistry, SiteDefinition};
pub use discount::{DiscountLevel, Feasibility, PromotionRule, check_feasibility, resolve_discount};
pub use driver::{
    Driver, DriverRegistry, DriverResources, SearchQuery, build_default_driver_registry,
};
pub use error::SiteError;
pub use extract::ExtractError;
pub use model::{TorrentItem, UserInfo};
pub use request::{HttpTimeouts, RateLimiter, ReqwestTransport, RequestContext, SiteTransport};
pub use site::{Site, SiteConfig};
