//! Definition registry.
//!
//! The [`DefinitionRegistry`] is built once at startup (built-ins plus any
//! definition files the caller loads) and is read-only afterwards. Drivers
//! receive the [`CompiledDefinition`] that matches their site.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::builtin::BUILTIN_DEFINITIONS;
use super::{CompiledDefinition, DefinitionError, SiteDefinition};

/// A collection of compiled site definitions with id, alias and host lookup.
#[derive(Default)]
pub struct DefinitionRegistry {
    definitions: Vec<Arc<CompiledDefinition>>,
    by_key: HashMap<String, usize>,
}

impl DefinitionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in schema definitions.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] if a built-in definition fails to compile.
    pub fn with_builtins() -> Result<Self, DefinitionError> {
        let mut registry = Self::new();
        for (origin, text) in BUILTIN_DEFINITIONS {
            registry.register(SiteDefinition::from_json(origin, text)?)?;
        }
        Ok(registry)
    }

    /// Compiles and registers `definition`.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::Duplicate`] when the id (or an alias) is
    /// already registered, or any compile error.
    #[tracing::instrument(skip(self, definition), fields(id = %definition.id))]
    pub fn register(&mut self, definition: SiteDefinition) -> Result<(), DefinitionError> {
        let keys: Vec<String> = std::iter::once(&definition.id)
            .chain(&definition.aka)
            .map(|key| key.to_ascii_lowercase())
            .collect();
        if let Some(taken) = keys.iter().find(|key| self.by_key.contains_key(*key)) {
            return Err(DefinitionError::Duplicate { id: taken.clone() });
        }

        let compiled = CompiledDefinition::compile(definition)?;
        debug!(schema = %compiled.definition().schema, "Registering definition");
        let index = self.definitions.len();
        self.definitions.push(Arc::new(compiled));
        for key in keys {
            self.by_key.insert(key, index);
        }
        Ok(())
    }

    /// Loads every `*.json` file in `dir`, in file-name order.
    ///
    /// Returns the number of definitions loaded.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::Io`] if the directory or a file cannot be
    /// read, or the first parse/compile error.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, DefinitionError> {
        let io_error = |path: &Path, source| DefinitionError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut paths = std::fs::read_dir(dir)
            .map_err(|e| io_error(dir, e))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")))
            .collect::<Vec<_>>();
        paths.sort();

        for path in &paths {
            let text = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
            self.register(SiteDefinition::from_json(&path.display().to_string(), &text)?)?;
        }
        info!(dir = %dir.display(), count = paths.len(), "Loaded site definitions");
        Ok(paths.len())
    }

    /// Returns the definition registered under `id` or one of its aliases.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<CompiledDefinition>> {
        self.by_key
            .get(&id.to_ascii_lowercase())
            .map(|&index| Arc::clone(&self.definitions[index]))
    }

    /// Finds the definition for a configured site.
    ///
    /// Lookup order: site id, alias, a definition whose URLs share the base
    /// URL's host, then the schema's default definition (registered under the
    /// schema name).
    #[must_use]
    pub fn resolve(
        &self,
        site_id: &str,
        base_url: &str,
        schema: &str,
    ) -> Option<Arc<CompiledDefinition>> {
        if let Some(found) = self.get(site_id) {
            return Some(found);
        }
        if let Some(host) = host_of(base_url)
            && let Some(found) = self.definitions.iter().find(|def| {
                def.definition()
                    .urls
                    .iter()
                    .any(|url| host_of(url).as_deref() == Some(host.as_str()))
            })
        {
            return Some(Arc::clone(found));
        }
        self.get(schema)
            .filter(|def| def.definition().schema.eq_ignore_ascii_case(schema))
    }

    /// Number of registered definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns true if no definitions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Registered definition ids, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|def| def.id())
    }
}

fn host_of(raw: &str) -> Option<String> {
    url::Url::parse(raw)
        .ok()?
        .host_str()
        .map(|host| host.trim_start_matches("www.").to_ascii_lowercase())
}

impl fmt::Debug for DefinitionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefinitionRegistry")
            .field("ids", &self.ids().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use super::*;

    fn site(id: &str, aka: &[&str], urls: &[&str]) -> SiteDefinition {
        SiteDefinition {
            id: id.to_string(),
            name: id.to_uppercase(),
            aka: aka.iter().map(ToString::to_string).collect(),
            schema: "nexusphp".to_string(),
            urls: urls.iter().map(ToString::to_string).collect(),
            favicon: None,
            rate_limit: None,
            rate_burst: None,
            timezone: "+08:00".to_string(),
            search: None,
            user_info: None,
            detail: None,
            levels: Vec::new(),
        }
    }

    #[test]
    fn test_builtins_register_schema_default() {
        let registry = DefinitionRegistry::with_builtins().unwrap();
        let def = registry.get("nexusphp").unwrap();
        assert!(def.search().is_some());
        assert!(def.user_info().is_some());
    }

    #[test]
    fn test_resolve_order() {
        let mut registry = DefinitionRegistry::with_builtins().unwrap();
        registry
            .register(site("hdexample", &["hdx"], &["https://hdexample.org/"]))
            .unwrap();

        assert_eq!(registry.resolve("hdexample", "", "nexusphp").unwrap().id(), "hdexample");
        assert_eq!(registry.resolve("HDX", "", "nexusphp").unwrap().id(), "hdexample");
        assert_eq!(
            registry
                .resolve("mine", "https://www.hdexample.org/index.php", "nexusphp")
                .unwrap()
                .id(),
            "hdexample"
        );
        assert_eq!(
            registry.resolve("other", "https://other.net", "nexusphp").unwrap().id(),
            "nexusphp"
        );
        assert!(registry.resolve("other", "https://other.net", "gazelle").is_none());
    }

    #[test]
    fn test_register_rejects_duplicate_alias() {
        let mut registry = DefinitionRegistry::new();
        registry.register(site("one", &["shared"], &[])).unwrap();
        let err = registry.register(site("two", &["shared"], &[])).unwrap_err();
        assert!(matches!(err, DefinitionError::Duplicate { id } if id == "shared"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_load_dir_reads_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let def = serde_json::to_string(&site("fromdisk", &[], &[])).unwrap();
        std::fs::File::create(dir.path().join("fromdisk.json"))
            .unwrap()
            .write_all(def.as_bytes())
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut registry = DefinitionRegistry::new();
        assert_eq!(registry.load_dir(dir.path()).unwrap(), 1);
        assert!(registry.get("fromdisk").is_some());
    }

    #[test]
    fn test_load_dir_missing_directory() {
        let mut registry = DefinitionRegistry::new();
        let err = registry.load_dir(Path::new("/nonexistent/ptharvest-defs")).unwrap_err();
        assert!(matches!(err, DefinitionError::Io { .. }));
    }
}
