//! # Outbound Adapters
//!
//! Capabilities the core calls out to: durable storage of entity records and
//! audit entries, and courier tracking lookups. The defaults keep everything
//! in memory and report every courier integration as not yet set up.

pub mod persistence;
pub mod tracking;

pub use persistence::{MemoryAdapter, PersistenceAdapter, PersistenceError};
pub use tracking::{
    CourierIntegration, IntegrationStatus, TrackingAdapter, TrackingError, TrackingUpdate,
    UnconfiguredTracking, courier_integrations,
};
