//! Plugin-based probe registry
//!
//! The registry maps resolver kinds to name lookups, fetcher names to page
//! fetchers, and store types to stores, so the binary assembles the engine
//! from configuration without hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nawala_core::registry::ProbeRegistry;
//! use nawala_core::config::NawalaConfig;
//!
//! let mut registry = ProbeRegistry::with_builtin_stores();
//! nawala_probe_http::register(&mut registry);
//!
//! let config = NawalaConfig::default();
//! let prober = registry.build_prober(&config)?;
//! let store = registry.create_store(&config.store).await?;
//! ```
//!
//! ## Registration
//!
//! Implementation crates register themselves during initialization:
//!
//! ```rust,ignore
//! // In nawala-probe-http
//! pub fn register(registry: &mut ProbeRegistry) {
//!     registry.register_lookup(ResolverKind::Dns, Box::new(DnsLookupFactory));
//!     registry.register_fetcher("http", Box::new(HttpFetcherFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{NawalaConfig, ProbeConfig, StoreConfig};
use crate::detector::BlockSignalDetector;
use crate::error::{Error, Result};
use crate::model::ResolverKind;
use crate::prober::SignalProber;
use crate::state::{FileStoreFactory, MemoryStoreFactory};
use crate::traits::{
    NameLookup, NameLookupFactory, PageFetcher, PageFetcherFactory, Store, StoreFactory,
};

/// Name of the fetcher [`ProbeRegistry::build_prober`] uses
pub const DEFAULT_FETCHER: &str = "http";

/// Registry of lookup, fetcher and store factories
#[derive(Default)]
pub struct ProbeRegistry {
    /// Name lookup factories by resolver kind
    lookups: HashMap<ResolverKind, Box<dyn NameLookupFactory>>,

    /// Page fetcher factories by name
    fetchers: HashMap<String, Box<dyn PageFetcherFactory>>,

    /// Store factories by type name
    stores: HashMap<String, Box<dyn StoreFactory>>,
}

impl ProbeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the `memory` and `file` stores registered
    pub fn with_builtin_stores() -> Self {
        let mut registry = Self::new();
        registry.register_store("memory", Box::new(MemoryStoreFactory));
        registry.register_store("file", Box::new(FileStoreFactory));
        registry
    }

    /// Register the lookup used for resolvers of `kind`
    ///
    /// A later registration for the same kind replaces the earlier one.
    pub fn register_lookup(&mut self, kind: ResolverKind, factory: Box<dyn NameLookupFactory>) {
        self.lookups.insert(kind, factory);
    }

    /// Register a page fetcher factory
    pub fn register_fetcher(&mut self, name: impl Into<String>, factory: Box<dyn PageFetcherFactory>) {
        self.fetchers.insert(name.into(), factory);
    }

    /// Register a store factory
    ///
    /// # Parameters
    ///
    /// - `name`: Store type name (matches [`StoreConfig::type_name`])
    /// - `factory`: Factory object for creating store instances
    pub fn register_store(&mut self, name: impl Into<String>, factory: Box<dyn StoreFactory>) {
        self.stores.insert(name.into(), factory);
    }

    /// Create the lookup for resolvers of `kind`
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn NameLookup>)`: Created lookup instance
    /// - `Err(Error)`: If no lookup is registered for `kind` or creation fails
    pub fn create_lookup(
        &self,
        kind: ResolverKind,
        config: &ProbeConfig,
    ) -> Result<Box<dyn NameLookup>> {
        let factory = self
            .lookups
            .get(&kind)
            .ok_or_else(|| Error::config(format!("No lookup registered for resolver kind: {}", kind)))?;

        factory.create(config)
    }

    /// Create a page fetcher by name
    pub fn create_fetcher(&self, name: &str, config: &ProbeConfig) -> Result<Box<dyn PageFetcher>> {
        let factory = self
            .fetchers
            .get(name)
            .ok_or_else(|| Error::config(format!("Unknown fetcher type: {}", name)))?;

        factory.create(config)
    }

    /// Create a store from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn Store>)`: Created (and loaded) store instance
    /// - `Err(Error)`: If the store type is not registered or creation fails
    pub async fn create_store(&self, config: &StoreConfig) -> Result<Box<dyn Store>> {
        let store_type = config.type_name();
        let factory = self
            .stores
            .get(store_type)
            .ok_or_else(|| Error::config(format!("Unknown store type: {}", store_type)))?;

        factory.create(config).await
    }

    /// Assemble the built-in prober from every registered lookup and the default fetcher
    ///
    /// Resolvers of a kind with no registered lookup are reported by the
    /// prober as failed and left out of fusion.
    pub fn build_prober(&self, config: &NawalaConfig) -> Result<SignalProber> {
        let fetcher: Arc<dyn PageFetcher> =
            Arc::from(self.create_fetcher(DEFAULT_FETCHER, &config.probe)?);
        let detector = BlockSignalDetector::from_config(&config.detector);

        let mut prober = SignalProber::new(detector, fetcher);
        for kind in self.list_lookups() {
            let lookup: Arc<dyn NameLookup> = Arc::from(self.create_lookup(kind, &config.probe)?);
            prober = prober.with_lookup(kind, lookup);
        }
        Ok(prober)
    }

    /// Resolver kinds with a registered lookup
    pub fn list_lookups(&self) -> Vec<ResolverKind> {
        let mut kinds: Vec<ResolverKind> = self.lookups.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// Registered fetcher names
    pub fn list_fetchers(&self) -> Vec<String> {
        self.fetchers.keys().cloned().collect()
    }

    /// Registered store type names
    pub fn list_stores(&self) -> Vec<String> {
        self.stores.keys().cloned().collect()
    }

    /// Check if a lookup is registered for `kind`
    pub fn has_lookup(&self, kind: ResolverKind) -> bool {
        self.lookups.contains_key(&kind)
    }

    /// Check if a fetcher is registered under `name`
    pub fn has_fetcher(&self, name: &str) -> bool {
        self.fetchers.contains_key(name)
    }

    /// Check if a store type is registered
    pub fn has_store(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }
}
