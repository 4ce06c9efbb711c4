//! # EsoxSolutions.ServicePool
//!
//! Client-side connection pooling across a set of backend destinations, plus
//! TTL-based service registration and discovery.
//!
//! ## Features
//!
//! - One bounded idle queue per destination, lock-free checkout
//! - Random (or pluggable) destination choice per checkout
//! - Lazily bound connection handles that return their stream on close or drop
//! - Read/write deadlines on pooled TCP streams
//! - Service announcement with a cancellable heartbeat that renews the TTL
//! - One-shot discovery of live instances to seed a pool
//! - Per-destination metrics with Prometheus export
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use esox_servicepool::{
//!     InMemoryRegistry, PoolConfig, RegistrationConfig, ServiceDiscovery, ServiceRegistration,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(InMemoryRegistry::new());
//!
//! // Announce this process as an instance of "orders"
//! let mut registration = ServiceRegistration::new(
//!     "orders",
//!     "10.0.0.5:9090",
//!     Arc::clone(&registry),
//!     RegistrationConfig::default(),
//! )?;
//! registration.announce().await?;
//!
//! // Elsewhere: discover the instances and pool connections to them
//! let factory = ServiceDiscovery::new(registry)
//!     .build_pool("orders", &PoolConfig::default())
//!     .await?;
//!
//! let mut conn = factory.new_connection();
//! conn.write_all(b"ping").await?;
//! conn.close()?;
//!
//! registration.close().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;
mod destination;
mod discovery;
mod errors;
mod factory;
mod metrics;
mod registration;
mod registry;
mod selector;
mod transport;

#[cfg(test)]
mod testing;

pub use config::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MAX_IDLE_PER_DESTINATION,
    MIN_HEARTBEAT_INTERVAL, PoolConfig, RegistrationConfig, TTL_TO_HEARTBEAT_RATIO,
};
pub use connection::PooledConnection;
pub use destination::{DestinationEntry, DestinationStats};
pub use discovery::ServiceDiscovery;
pub use errors::{PoolError, PoolResult, RegistryError, RegistryResult};
pub use factory::PoolFactory;
pub use metrics::{MetricsExporter, PoolMetrics};
pub use registration::{PRESENCE_MARKER, ServiceRegistration, registry_key};
pub use registry::{InMemoryRegistry, Registry, RegistryEntry};
pub use selector::{DestinationSelector, RandomSelector, RoundRobinSelector};
pub use transport::{Dialer, TcpDialer, TcpTransport, Transport};
