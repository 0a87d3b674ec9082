//! promshm core - arena-resident Prometheus metric store.
//!
//! Counters, gauges and histograms live in memory handed out by an
//! [`Arena`], typically a slab pool inside a shared-memory segment that
//! several worker processes attach. Updates from any worker land in the
//! same samples, and [`Registry::bridge`] renders the whole store in the
//! Prometheus text exposition format.
//!
//! The crate never performs I/O and never blocks on anything but its own
//! spin locks ([`sync::RwSpinLock`]).

pub mod arena;
pub mod collector;
pub mod config;
pub mod error;
pub mod format;
pub mod list;
pub mod map;
pub mod metric;
pub mod registry;
pub mod sync;

pub use arena::{Arena, ArenaBox, ArenaSlice, ArenaStr, HeapArena, Shared};
pub use collector::{CollectFn, Collector};
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use format::{MetricFormatter, StringBuilder};
pub use list::LinkedList;
pub use map::ConcurrentMap;
pub use metric::{
    Counter, Gauge, Histogram, HistogramBuckets, HistogramSample, HistogramSnapshot, Metric,
    MetricSample, MetricType, SampleSlot,
};
pub use registry::{
    create_registry, create_registry_with_config, Registry, RegistrySlot, DEFAULT_COLLECTOR,
};
