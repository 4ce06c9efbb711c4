//! Pool factory owning one shard per destination

use crate::config::PoolConfig;
use crate::connection::PooledConnection;
use crate::destination::DestinationEntry;
use crate::errors::{PoolError, PoolResult};
use crate::metrics::PoolMetrics;
use crate::selector::{DestinationSelector, RandomSelector};
use crate::transport::{Dialer, TcpDialer};

use std::sync::Arc;
use tracing::debug;

/// Set of destination shards plus the policy that picks among them.
///
/// The destination list is fixed at construction. Cloning is cheap and the
/// clones share the same shards.
///
/// # Examples
///
/// ```
/// use esox_servicepool::{PoolConfig, PoolFactory};
///
/// let factory = PoolFactory::build(
///     ["10.0.0.5:9090", "10.0.0.6:9090"],
///     &PoolConfig::default(),
/// ).unwrap();
///
/// assert_eq!(factory.len(), 2);
///
/// // No destination is chosen until the first I/O operation
/// let conn = factory.new_connection();
/// assert!(!conn.is_bound());
/// ```
pub struct PoolFactory<D: Dialer = TcpDialer, S: DestinationSelector = RandomSelector> {
    entries: Arc<[Arc<DestinationEntry<D>>]>,
    selector: Arc<S>,
}

impl<D: Dialer, S: DestinationSelector> Clone for PoolFactory<D, S> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            selector: Arc::clone(&self.selector),
        }
    }
}

impl PoolFactory<TcpDialer, RandomSelector> {
    /// Create a TCP pool with one shard per address. Performs no I/O.
    pub fn build<I, A>(addresses: I, config: &PoolConfig) -> PoolResult<Self>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self::with_dialer(addresses, config, TcpDialer)
    }
}

impl<D: Dialer> PoolFactory<D, RandomSelector> {
    /// Create a pool that opens streams through `dialer`
    pub fn with_dialer<I, A>(addresses: I, config: &PoolConfig, dialer: D) -> PoolResult<Self>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        config.validate()?;

        let dialer = Arc::new(dialer);
        let entries: Vec<Arc<DestinationEntry<D>>> = addresses
            .into_iter()
            .map(|address| {
                Arc::new(DestinationEntry::new(
                    address.into(),
                    config.max_idle_per_destination,
                    config.connect_timeout,
                    Arc::clone(&dialer),
                ))
            })
            .collect();

        if entries.is_empty() {
            return Err(PoolError::NoDestinations);
        }

        debug!(
            "Built pool with {} destinations (max idle {}, connect timeout {:?})",
            entries.len(),
            config.max_idle_per_destination,
            config.connect_timeout
        );

        Ok(Self {
            entries: entries.into(),
            selector: Arc::new(RandomSelector),
        })
    }
}

impl<D: Dialer, S: DestinationSelector> PoolFactory<D, S> {
    /// Swap the selection policy, keeping the same shards
    pub fn with_selector<T: DestinationSelector>(self, selector: T) -> PoolFactory<D, T> {
        PoolFactory {
            entries: self.entries,
            selector: Arc::new(selector),
        }
    }

    /// Pick the shard for the next checkout
    pub fn choose(&self) -> &Arc<DestinationEntry<D>> {
        let index = self.selector.select(&self.entries[..]) % self.entries.len();
        &self.entries[index]
    }

    /// Create an unbound connection drawing from this pool
    pub fn new_connection(&self) -> PooledConnection<D, S> {
        PooledConnection::new(self.clone())
    }

    pub fn entries(&self) -> &[Arc<DestinationEntry<D>>] {
        &self.entries
    }

    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.address())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; a factory is never built without destinations
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of every shard's counters
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics::new(self.entries.iter().map(|entry| entry.stats()).collect())
    }
}

impl<D: Dialer, S: DestinationSelector> std::fmt::Debug for PoolFactory<D, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolFactory")
            .field("entries", &self.entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::RoundRobinSelector;
    use crate::testing::MockDialer;
    use std::collections::HashMap;

    fn addresses(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("10.0.0.{}:9090", i + 1)).collect()
    }

    #[test]
    fn test_build_creates_one_entry_per_address() {
        let factory = PoolFactory::build(addresses(3), &PoolConfig::default()).unwrap();
        let destinations: Vec<&str> = factory.destinations().collect();
        assert_eq!(destinations, vec!["10.0.0.1:9090", "10.0.0.2:9090", "10.0.0.3:9090"]);

        for entry in factory.entries() {
            assert_eq!(entry.capacity(), 8);
            assert_eq!(entry.created(), 0);
        }
    }

    #[test]
    fn test_build_rejects_empty_list() {
        let result = PoolFactory::build(Vec::<String>::new(), &PoolConfig::default());
        assert!(matches!(result, Err(PoolError::NoDestinations)));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = PoolConfig::new().with_max_idle_per_destination(0);
        let result = PoolFactory::build(addresses(1), &config);
        assert!(matches!(result, Err(PoolError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_choose_is_roughly_uniform() {
        let factory =
            PoolFactory::with_dialer(addresses(4), &PoolConfig::default(), MockDialer::default())
                .unwrap();

        let draws = 40_000;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..draws {
            *counts.entry(factory.choose().address().to_string()).or_default() += 1;
        }

        assert_eq!(counts.len(), 4);
        for (address, count) in counts {
            let share = count as f64 / draws as f64;
            assert!(
                (share - 0.25).abs() < 0.02,
                "{} chosen with share {:.3}",
                address,
                share
            );
        }
    }

    #[test]
    fn test_round_robin_cycles() {
        let factory =
            PoolFactory::with_dialer(addresses(3), &PoolConfig::default(), MockDialer::default())
                .unwrap()
                .with_selector(RoundRobinSelector::new());

        let picks: Vec<String> = (0..6)
            .map(|_| factory.choose().address().to_string())
            .collect();
        assert_eq!(
            picks,
            vec![
                "10.0.0.1:9090",
                "10.0.0.2:9090",
                "10.0.0.3:9090",
                "10.0.0.1:9090",
                "10.0.0.2:9090",
                "10.0.0.3:9090",
            ]
        );
    }

    #[test]
    fn test_clones_share_entries() {
        let factory = PoolFactory::build(addresses(2), &PoolConfig::default()).unwrap();
        let clone = factory.clone();
        assert!(Arc::ptr_eq(&factory.entries()[0], &clone.entries()[0]));
    }
}
