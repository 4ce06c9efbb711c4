//! Service discovery over the registry namespace

use crate::config::PoolConfig;
use crate::errors::{PoolResult, RegistryError, RegistryResult};
use crate::factory::PoolFactory;
use crate::registry::Registry;

use std::sync::Arc;
use tracing::debug;

/// Lists live instances of a service from a [`Registry`].
///
/// Discovery is a one-shot lookup; a pool built from it keeps the destination
/// set it started with.
///
/// # Examples
///
/// ```
/// use esox_servicepool::{InMemoryRegistry, Registry, ServiceDiscovery};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let registry = Arc::new(InMemoryRegistry::new());
/// registry.set("/orders/10.0.0.5:9090", "1", Duration::from_secs(3)).await.unwrap();
///
/// let discovery = ServiceDiscovery::new(registry);
/// let addresses = discovery.list_instances("orders").await.unwrap();
/// assert_eq!(addresses, vec!["10.0.0.5:9090".to_string()]);
/// # }
/// ```
#[derive(Debug)]
pub struct ServiceDiscovery<R: Registry> {
    registry: Arc<R>,
}

impl<R: Registry> Clone for ServiceDiscovery<R> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<R: Registry> ServiceDiscovery<R> {
    pub fn new(registry: Arc<R>) -> Self {
        Self { registry }
    }

    /// Addresses of every live instance of `service_name`. A single malformed
    /// key fails the whole listing.
    pub async fn list_instances(&self, service_name: &str) -> RegistryResult<Vec<String>> {
        let prefix = format!("/{}", service_name);
        let entries = self.registry.get(&prefix, true).await?;

        let addresses = entries
            .iter()
            .map(|entry| parse_instance_key(&prefix, &entry.key))
            .collect::<RegistryResult<Vec<String>>>()?;

        debug!(
            "Discovered {} instances of {}",
            addresses.len(),
            service_name
        );
        Ok(addresses)
    }

    /// Discover `service_name` and build a TCP pool over its instances
    pub async fn build_pool(
        &self,
        service_name: &str,
        config: &PoolConfig,
    ) -> PoolResult<PoolFactory> {
        let addresses = self.list_instances(service_name).await?;
        PoolFactory::build(addresses, config)
    }
}

fn malformed(key: &str, reason: &str) -> RegistryError {
    RegistryError::MalformedEntry {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Extract `host:port` from `{prefix}/{host:port}`
fn parse_instance_key(prefix: &str, key: &str) -> RegistryResult<String> {
    let address = key
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(|| malformed(key, "outside the service namespace"))?;

    if address.contains('/') {
        return Err(malformed(key, "nested key"));
    }

    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| malformed(key, "missing port"))?;

    if host.is_empty() {
        return Err(malformed(key, "empty host"));
    }
    port.parse::<u16>().map_err(|_| malformed(key, "invalid port"))?;

    Ok(address.to_string())
}
