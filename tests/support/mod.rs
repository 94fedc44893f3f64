//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod socket_guard;

use std::sync::Arc;

use ptharvest_core::{
    DefinitionRegistry, DriverResources, HttpTimeouts, RateLimiter, ReqwestTransport, Site,
    SiteConfig, build_default_driver_registry,
};

/// Resources with the built-in definitions and no rate limits beyond the definitions'.
pub fn resources() -> DriverResources {
    resources_with(DefinitionRegistry::with_builtins().unwrap())
}

pub fn resources_with(definitions: DefinitionRegistry) -> DriverResources {
    DriverResources {
        transport: Arc::new(ReqwestTransport::new(HttpTimeouts::default()).unwrap()),
        limiter: Arc::new(RateLimiter::new()),
        definitions: Arc::new(definitions),
    }
}

/// Builds a site with rate limiting disabled so tests run at full speed.
pub fn build_site(mut config: SiteConfig, resources: &DriverResources) -> Site {
    config.rate_limit = Some(0.0);
    build_default_driver_registry().build(&config, resources).unwrap()
}

pub fn nexusphp_site(id: &str, base_url: &str, resources: &DriverResources) -> Site {
    build_site(
        SiteConfig::new("nexusphp", id, base_url).with_option("cookie", "uid=1; pass=secret"),
        resources,
    )
}

pub fn mtorrent_site(id: &str, base_url: &str, resources: &DriverResources) -> Site {
    build_site(
        SiteConfig::new("mtorrent", id, base_url).with_option("api_key", "test-key"),
        resources,
    )
}
