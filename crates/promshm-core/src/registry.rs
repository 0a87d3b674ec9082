//! Collector registry and exposition entry point.
//!
//! A registry maps collector names to collectors and always contains one
//! named [`DEFAULT_COLLECTOR`], which is where [`Registry::register_metric`]
//! puts metrics. [`Registry::bridge`] renders everything the registry's
//! collectors expose into the text format.

use std::cell::UnsafeCell;
use std::fmt;

use crate::arena::{Arena, ArenaStr, Shared};
use crate::collector::Collector;
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::format::MetricFormatter;
use crate::map::{ConcurrentMap, DEFAULT_CAPACITY};
use crate::metric::{self, Metric};
use crate::sync::RwSpinLock;

/// Name of the collector every registry starts with.
pub const DEFAULT_COLLECTOR: &str = "default";

/// Top-level container of collectors.
pub struct Registry<A: Arena> {
    name: ArenaStr<A>,
    lock: RwSpinLock,
    collectors: ConcurrentMap<Shared<Collector<A>, A>, A>,
    default: Shared<Collector<A>, A>,
    map_capacity: usize,
    arena: A,
}

impl<A: Arena> Registry<A> {
    /// Create a registry with its default collector.
    pub fn new(arena: &A, name: &str) -> Result<Self> {
        Self::with_capacity(arena, name, DEFAULT_CAPACITY)
    }

    /// Create a registry whose maps start with `capacity` buckets.
    pub fn with_capacity(arena: &A, name: &str, capacity: usize) -> Result<Self> {
        let name = ArenaStr::new(arena, name)?;
        let collectors = ConcurrentMap::with_capacity(arena, capacity)?;
        let default = Shared::new(
            arena,
            Collector::with_capacity(arena, DEFAULT_COLLECTOR, capacity)?,
        )?;
        collectors.set(DEFAULT_COLLECTOR, default.clone())?;

        tracing::debug!(registry = %name, capacity, "registry created");
        Ok(Self {
            name,
            lock: RwSpinLock::new(),
            collectors,
            default,
            map_capacity: capacity,
            arena: arena.clone(),
        })
    }

    /// Create a registry from a [`StoreConfig`].
    pub fn with_config(arena: &A, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        Self::with_capacity(arena, &config.registry_name, config.initial_map_capacity)
    }

    /// Registry name.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// The collector metrics are registered into.
    pub fn default_collector(&self) -> &Shared<Collector<A>, A> {
        &self.default
    }

    /// Create a collector with this registry's arena and map capacity.
    /// It still has to be registered.
    pub fn new_collector(&self, name: &str) -> Result<Collector<A>> {
        Collector::with_capacity(&self.arena, name, self.map_capacity)
    }

    /// Validate the metric's name and add it to the default collector.
    pub fn register_metric(&self, metric: &Shared<Metric<A>, A>) -> Result<()> {
        if let Err(err) = Self::validate_metric_name(metric.name()) {
            tracing::warn!(
                registry = %self.name,
                metric = metric.name(),
                "rejected metric name"
            );
            return Err(err);
        }
        self.default.add_metric(metric.clone())
    }

    /// Add a collector. Collector names are unique per registry.
    pub fn register_collector(&self, collector: Shared<Collector<A>, A>) -> Result<()> {
        let _guard = self.lock.write();
        let name = collector.name().to_string();
        if !self.collectors.set_if_absent(&name, collector)? {
            tracing::warn!(
                registry = %self.name,
                collector = %name,
                "collector already registered"
            );
            return Err(Error::DuplicateRegistration(name));
        }
        tracing::debug!(registry = %self.name, collector = %name, "collector registered");
        Ok(())
    }

    /// Look up a registered collector by name.
    pub fn collector(&self, name: &str) -> Option<Shared<Collector<A>, A>> {
        self.collectors.get(name)
    }

    /// Collectors in registration order, the default one first.
    pub fn collectors(&self) -> Vec<Shared<Collector<A>, A>> {
        self.collectors.values()
    }

    /// Check `name` against `^[a-zA-Z_:][a-zA-Z0-9_:]*$`.
    pub fn validate_metric_name(name: &str) -> Result<()> {
        metric::validate_metric_name(name)
    }

    /// Render every collector into `formatter` and return the text.
    ///
    /// The formatter is cleared first. The returned text lives in the
    /// formatter and is replaced by the next render.
    pub fn bridge<'f>(&self, formatter: &'f mut MetricFormatter) -> &'f str {
        formatter.clear();
        {
            let _guard = self.lock.read();
            formatter.load_metrics(&self.collectors);
        }
        formatter.dump()
    }

    /// Render into a fresh string.
    pub fn to_text(&self) -> String {
        let mut formatter = MetricFormatter::new();
        self.bridge(&mut formatter).to_string()
    }
}

impl<A: Arena> fmt::Debug for Registry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("collectors", &self.collectors.keys())
            .finish()
    }
}

/// Create a shared registry in `arena`.
pub fn create_registry<A: Arena>(name: &str, arena: &A) -> Result<Shared<Registry<A>, A>> {
    Shared::new(arena, Registry::new(arena, name)?)
}

/// Create a shared registry from a [`StoreConfig`].
pub fn create_registry_with_config<A: Arena>(
    arena: &A,
    config: &StoreConfig,
) -> Result<Shared<Registry<A>, A>> {
    Shared::new(arena, Registry::with_config(arena, config)?)
}

/// Lazily created registry shared by every worker attached to a segment.
///
/// Initialization checks and creates under the slot's own lock, so racing
/// workers end up with the same registry.
pub struct RegistrySlot<A: Arena> {
    lock: RwSpinLock,
    slot: UnsafeCell<Option<Shared<Registry<A>, A>>>,
}

// SAFETY: `slot` is only read under the read lock and written under the
// write lock.
unsafe impl<A: Arena> Send for RegistrySlot<A> {}
unsafe impl<A: Arena> Sync for RegistrySlot<A> {}

impl<A: Arena> RegistrySlot<A> {
    /// Create an empty slot, usable in a `static`.
    #[cfg(not(feature = "loom"))]
    pub const fn new() -> Self {
        Self {
            lock: RwSpinLock::new(),
            slot: UnsafeCell::new(None),
        }
    }

    /// Create an empty slot.
    #[cfg(feature = "loom")]
    pub fn new() -> Self {
        Self {
            lock: RwSpinLock::new(),
            slot: UnsafeCell::new(None),
        }
    }

    /// The registry, if one was created.
    pub fn get(&self) -> Option<Shared<Registry<A>, A>> {
        let _guard = self.lock.read();
        // SAFETY: shared access under the read lock.
        unsafe { (*self.slot.get()).clone() }
    }

    /// Return the registry, creating it named `name` on first call.
    pub fn get_or_init(&self, arena: &A, name: &str) -> Result<Shared<Registry<A>, A>> {
        if let Some(registry) = self.get() {
            return Ok(registry);
        }

        let _guard = self.lock.write();
        // SAFETY: exclusive access under the write lock.
        let slot = unsafe { &mut *self.slot.get() };
        if let Some(registry) = slot.as_ref() {
            return Ok(registry.clone());
        }
        let registry = create_registry(name, arena)?;
        *slot = Some(registry.clone());
        Ok(registry)
    }

    /// Whether a registry was created.
    pub fn is_initialized(&self) -> bool {
        self.get().is_some()
    }
}

impl<A: Arena> Default for RegistrySlot<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Arena> fmt::Debug for RegistrySlot<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrySlot")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
