//! Generation engine seam.
//!
//! The engine itself is an external collaborator. twinrun only needs to
//! construct one by locator, let it install its legacy entry points and
//! register its caches, and ask it to generate.
//!
//! [`EngineHost`] is the one place that wiring happens, so the in-process
//! run and the worker run see an identically prepared engine.

use std::collections::BTreeMap;

use twinrun_snapshot::catalog::GeneratorCatalog;
use twinrun_snapshot::graph::GenerationResult;
use twinrun_snapshot::request::GenerationRequest;

use crate::cache::{CacheRegistry, EvictionStats};
use crate::legacy::{LegacyEntryPoints, LegacyPolicy};
use crate::RegistryError;

// ---------------------------------------------------------------------------
// GenerationEngine
// ---------------------------------------------------------------------------

/// A procedural generation engine.
///
/// `generate` either returns a result graph or fails. A failure is an
/// ordinary outcome (the request was rejected); it is never a transport
/// error.
pub trait GenerationEngine: Send {
    /// Stable engine name, used in logs.
    fn name(&self) -> &str;

    /// The generators this engine can run.
    fn catalog(&self) -> &GeneratorCatalog;

    /// Install this engine's legacy entry points.
    fn install_legacy(&self, _entry_points: &mut LegacyEntryPoints) {}

    /// Register every cache that outlives a single attempt.
    fn register_caches(&self, _caches: &mut CacheRegistry) {}

    /// Run one generation.
    fn generate(
        &mut self,
        request: &GenerationRequest,
        context: &EngineContext,
    ) -> anyhow::Result<GenerationResult>;
}

/// What the host lends an engine for the duration of one `generate` call.
#[derive(Debug, Default)]
pub struct EngineContext {
    pub legacy: LegacyEntryPoints,
}

// ---------------------------------------------------------------------------
// EngineHost
// ---------------------------------------------------------------------------

/// An engine wired to its legacy entry points and caches.
pub struct EngineHost {
    engine: Box<dyn GenerationEngine>,
    context: EngineContext,
    caches: CacheRegistry,
}

impl EngineHost {
    /// Prepare `engine`: install its legacy entry points, apply `policy`,
    /// and collect its caches.
    pub fn new(engine: Box<dyn GenerationEngine>, policy: &LegacyPolicy) -> Self {
        let mut legacy = LegacyEntryPoints::new();
        engine.install_legacy(&mut legacy);
        legacy.apply(policy);

        let mut caches = CacheRegistry::new();
        engine.register_caches(&mut caches);

        tracing::debug!(
            engine = engine.name(),
            caches = caches.len(),
            silenced = ?policy.silence,
            disabled = ?policy.disable,
            "engine host ready"
        );

        Self {
            engine,
            context: EngineContext { legacy },
            caches,
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn catalog(&self) -> &GeneratorCatalog {
        self.engine.catalog()
    }

    pub fn legacy(&self) -> &LegacyEntryPoints {
        &self.context.legacy
    }

    /// Run one generation with the prepared context.
    pub fn generate(&mut self, request: &GenerationRequest) -> anyhow::Result<GenerationResult> {
        self.engine.generate(request, &self.context)
    }

    /// Evict every registered cache.
    pub fn evict_caches(&self) -> EvictionStats {
        self.caches.evict_all()
    }
}

impl std::fmt::Debug for EngineHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHost")
            .field("engine", &self.engine.name())
            .field("legacy", &self.context.legacy)
            .field("caches", &self.caches)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EngineRegistry
// ---------------------------------------------------------------------------

/// Constructor of a registered engine.
pub type EngineFactory = fn() -> Box<dyn GenerationEngine>;

/// Maps engine locators to constructors.
#[derive(Debug, Clone, Default)]
pub struct EngineRegistry {
    factories: BTreeMap<String, EngineFactory>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, locator: impl Into<String>, factory: EngineFactory) {
        self.factories.insert(locator.into(), factory);
    }

    /// Registered locators, sorted.
    pub fn locators(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Construct the engine registered under `locator`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownEngine`] if nothing is registered
    /// under `locator`.
    pub fn create(&self, locator: &str) -> Result<Box<dyn GenerationEngine>, RegistryError> {
        let factory = self
            .factories
            .get(locator)
            .ok_or_else(|| RegistryError::UnknownEngine {
                locator: locator.to_owned(),
                registered: self.locators().collect::<Vec<_>>().join(", "),
            })?;
        Ok(factory())
    }
}
