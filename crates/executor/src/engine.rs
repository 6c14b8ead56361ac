//! The engine: configuration, descriptor resolution and observers.
//!
//! An [`Engine`] is shared (`Arc`) by every session created from it. It
//! owns the descriptor cache, so descriptors resolve once per engine, and
//! carries the optional collaborators (encryption provider, observers)
//! that calls consult.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use conduit_core::{
    Contract, ContractDescriptor, DescriptorResolver, EncryptionProvider, EngineConfig, Entity,
    EntityDescriptor, Result,
};
use tracing::info;

use crate::genspec::{GenSpec, VariantRegistry};
use crate::mapper;
use crate::notify::{CallObserver, Notifier};

/// Shared pipeline state for a set of sessions.
pub struct Engine {
    config: EngineConfig,
    resolver: DescriptorResolver,
    notifier: Notifier,
}

impl Engine {
    /// Engine with default configuration and no collaborators.
    pub fn new() -> Result<Arc<Self>> {
        Self::builder().build()
    }

    /// Start configuring an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Descriptor resolver (and its cache).
    pub fn resolver(&self) -> &DescriptorResolver {
        &self.resolver
    }

    /// Resolved descriptor of contract `C`.
    pub fn contract<C: Contract>(&self) -> Result<Arc<ContractDescriptor>> {
        self.resolver.contract::<C>()
    }

    /// Resolved descriptor of entity `T`.
    pub fn entity<T: Entity>(&self) -> Result<Arc<EntityDescriptor>> {
        self.resolver.entity::<T>()
    }

    /// Checked variant registry of GenSpec type `G`.
    pub fn variants<G: GenSpec>(&self) -> Result<Arc<VariantRegistry<G>>> {
        mapper::registry::<G>(&self.resolver)
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("observers", &self.notifier.len())
            .field("cached_descriptors", &self.resolver.cache().len())
            .finish()
    }
}

// ============================================================================
// Engine Builder
// ============================================================================

/// Builder for [`Engine`].
///
/// ```text
/// let engine = Engine::builder()
///     .config_file("conduit.toml")?
///     .encryption_provider(Arc::new(KeyVault::connect()?))
///     .observer(Arc::new(AuditLog::default()))
///     .build()?;
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    provider: Option<Arc<dyn EncryptionProvider>>,
    observers: Vec<Arc<dyn CallObserver>>,
}

impl EngineBuilder {
    /// Builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config`.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Load configuration from a TOML file.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.config = EngineConfig::from_file(path.as_ref())?;
        Ok(self)
    }

    /// Provider used by secure members.
    ///
    /// Without one, binding or mapping a secure member fails with a
    /// configuration error.
    pub fn encryption_provider(mut self, provider: Arc<dyn EncryptionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Register a lifecycle observer.
    pub fn observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Validate the configuration and build the engine.
    pub fn build(self) -> Result<Arc<Engine>> {
        let resolver = DescriptorResolver::new(&self.config, self.provider.clone())?;
        info!(
            target: "conduit::config",
            procedure_prefix = %self.config.procedure_prefix,
            view_prefix = %self.config.view_prefix,
            strict_columns = self.config.strict_columns,
            encryption = self.provider.is_some(),
            observers = self.observers.len(),
            "engine ready"
        );
        Ok(Arc::new(Engine {
            config: self.config,
            resolver,
            notifier: Notifier::new(self.observers),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::{ContractDefinition, Error};
    use std::io::Write;

    struct Ping;

    impl Contract for Ping {
        fn definition() -> ContractDefinition {
            ContractDefinition::stored_call("Ping")
        }
    }

    #[test]
    fn test_descriptors_cached_per_engine() {
        let engine = Engine::new().unwrap();
        let a = engine.contract::<Ping>().unwrap();
        let b = engine.contract::<Ping>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.target_name(), "usp_Ping");

        let other = Engine::new().unwrap();
        assert!(!Arc::ptr_eq(&a, &other.contract::<Ping>().unwrap()));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            discriminator_column: String::new(),
            ..EngineConfig::default()
        };
        let result = Engine::builder().config(config).build();
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_config_file_applies_prefix() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "procedure_prefix = \"sp_\"").unwrap();

        let engine = Engine::builder().config_file(file.path()).unwrap().build().unwrap();
        assert_eq!(engine.contract::<Ping>().unwrap().target_name(), "sp_Ping");
    }
}
