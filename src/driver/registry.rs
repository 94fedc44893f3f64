//! Schema name to driver constructor.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use super::{Driver, MTorrentDriver, NexusPhpDriver};
use crate::definition::{CompiledDefinition, DefinitionRegistry};
use crate::error::SiteError;
use crate::request::{RateLimiter, SiteTransport};
use crate::site::{Site, SiteConfig};

const DEFAULT_RATE_BURST: u32 = 1;

/// Shared resources every driver is built with.
#[derive(Clone)]
pub struct DriverResources {
    pub transport: Arc<dyn SiteTransport>,
    pub limiter: Arc<RateLimiter>,
    pub definitions: Arc<DefinitionRegistry>,
}

/// Builds a driver for one configured site. `definition` is the matching
/// site definition, if the registry has one.
pub type DriverFactory = fn(
    config: &SiteConfig,
    definition: Option<Arc<CompiledDefinition>>,
    resources: &DriverResources,
) -> Result<Arc<dyn Driver>, SiteError>;

/// Explicit, constructed-once registry of driver factories.
#[derive(Default)]
pub struct DriverRegistry {
    factories: BTreeMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` for `schema`, replacing any previous one.
    #[tracing::instrument(skip(self, factory))]
    pub fn register(&mut self, schema: &str, factory: DriverFactory) {
        debug!("Registering driver factory");
        self.factories.insert(schema.to_ascii_lowercase(), factory);
    }

    /// Registered schema names, sorted.
    pub fn schemas(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiates the driver for `config` and configures its rate limit.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Config`] for an unknown schema, or the factory's error.
    #[tracing::instrument(
        skip(self, config, resources),
        fields(site = %config.id, schema = %config.schema)
    )]
    pub fn build(
        &self,
        config: &SiteConfig,
        resources: &DriverResources,
    ) -> Result<Site, SiteError> {
        let factory = self
            .factories
            .get(&config.schema.to_ascii_lowercase())
            .ok_or_else(|| {
                SiteError::config(
                    &config.id,
                    format!(
                        "unknown site type '{}' (known: {})",
                        config.schema,
                        self.schemas().collect::<Vec<_>>().join(", ")
                    ),
                )
            })?;

        let definition = resources
            .definitions
            .resolve(&config.id, &config.base_url, &config.schema);
        let rate = config
            .rate_limit
            .or_else(|| definition.as_ref().and_then(|def| def.definition().rate_limit))
            .unwrap_or(0.0);
        let burst = config
            .rate_burst
            .or_else(|| definition.as_ref().and_then(|def| def.definition().rate_burst))
            .unwrap_or(DEFAULT_RATE_BURST);
        resources.limiter.configure(&config.id, rate, burst);

        info!(
            definition = definition.as_ref().map_or("-", |def| def.id()),
            "Building site driver"
        );
        let driver = factory(config, definition, resources)?;
        Ok(Site::new(config.clone(), driver))
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("schemas", &self.schemas().collect::<Vec<_>>())
            .finish()
    }
}

/// Registry with every built-in schema.
#[must_use]
pub fn build_default_driver_registry() -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    registry.register(NexusPhpDriver::SCHEMA, NexusPhpDriver::factory);
    registry.register(MTorrentDriver::SCHEMA, MTorrentDriver::factory);
    registry
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::request::{HttpTimeouts, ReqwestTransport};

    fn resources() -> DriverResources {
        DriverResources {
            transport: Arc::new(ReqwestTransport::new(HttpTimeouts::default()).unwrap()),
            limiter: Arc::new(RateLimiter::new()),
            definitions: Arc::new(DefinitionRegistry::with_builtins().unwrap()),
        }
    }

    #[test]
    fn test_default_registry_schemas() {
        let registry = build_default_driver_registry();
        assert_eq!(registry.schemas().collect::<Vec<_>>(), vec!["mtorrent", "nexusphp"]);
    }

    #[test]
    fn test_build_unknown_schema() {
        let registry = build_default_driver_registry();
        let config = SiteConfig::new("gazelle", "red", "https://red.test");
        let err = registry.build(&config, &resources()).unwrap_err();
        assert!(err.to_string().contains("unknown site type 'gazelle'"));
    }

    #[test]
    fn test_build_applies_definition_rate_limit() {
        let registry = build_default_driver_registry();
        let resources = resources();
        let config =
            SiteConfig::new("nexusphp", "hdx", "https://hdx.test").with_option("cookie", "c=1");
        let site = registry.build(&config, &resources).unwrap();
        assert_eq!(site.id(), "hdx");
        assert_eq!(site.driver().schema(), "nexusphp");
        assert!(resources.limiter.is_limited("hdx"), "builtin definition carries a rate limit");
    }

    #[test]
    fn test_site_rate_limit_zero_overrides_definition() {
        let registry = build_default_driver_registry();
        let resources = resources();
        let mut config =
            SiteConfig::new("nexusphp", "open", "https://open.test").with_option("cookie", "c=1");
        config.rate_limit = Some(0.0);
        registry.build(&config, &resources).unwrap();
        assert!(!resources.limiter.is_limited("open"));
    }
}
