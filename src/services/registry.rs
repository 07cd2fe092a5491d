//! Symbol -> adapter constructor table.
//!
//! Concrete adapters register a factory under their platform symbol at
//! startup; the orchestrator resolves one adapter per configured platform
//! and the core never reflects on adapter types.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ClientSettings;
use crate::error::{CollectError, Result};
use crate::services::adapter::{ClientAdapter, FixtureAdapter};

pub type AdapterFactory =
    Arc<dyn Fn(&str, &ClientSettings) -> Result<Arc<dyn ClientAdapter>> + Send + Sync>;

pub struct AdapterRegistry {
    factories: HashMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        AdapterRegistry {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in `fixture` adapter.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("fixture", |platform, _settings| {
            Ok(Arc::new(FixtureAdapter::new(platform, Vec::new())) as Arc<dyn ClientAdapter>)
        });
        registry
    }

    pub fn register<F>(&mut self, symbol: impl Into<String>, factory: F)
    where
        F: Fn(&str, &ClientSettings) -> Result<Arc<dyn ClientAdapter>> + Send + Sync + 'static,
    {
        self.factories.insert(symbol.into(), Arc::new(factory));
    }

    /// Build the adapter for `platform`. Test mode forces the fixture
    /// adapter; otherwise the `adapter` setting (default: the platform
    /// symbol itself) selects the factory.
    pub fn build(
        &self,
        platform: &str,
        settings: &ClientSettings,
    ) -> Result<Arc<dyn ClientAdapter>> {
        let symbol = if settings.db_config.test_mode {
            "fixture"
        } else {
            settings.adapter.as_deref().unwrap_or(platform)
        };
        let factory = self
            .factories
            .get(symbol)
            .ok_or_else(|| CollectError::UnknownPlatform {
                platform: symbol.to_string(),
            })?;
        factory(platform, settings)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_platform_is_rejected() {
        let registry = AdapterRegistry::with_builtins();
        let settings = ClientSettings::default();
        let err = match registry.build("nosuch", &settings) {
            Err(e) => e,
            Ok(_) => panic!("expected build to fail for unknown platform"),
        };
        assert!(matches!(err, CollectError::UnknownPlatform { .. }));
    }

    #[test]
    fn test_mode_forces_fixture_adapter() {
        let registry = AdapterRegistry::with_builtins();
        let mut settings = ClientSettings::default();
        settings.db_config.test_mode = true;
        let adapter = registry.build("nosuch", &settings).unwrap();
        assert_eq!(adapter.platform_name(), "nosuch");
    }

    #[test]
    fn adapter_symbol_overrides_platform_lookup() {
        let registry = AdapterRegistry::with_builtins();
        let settings = ClientSettings {
            adapter: Some("fixture".to_string()),
            ..Default::default()
        };
        let adapter = registry.build("youtube", &settings).unwrap();
        assert_eq!(adapter.platform_name(), "youtube");
    }
}
