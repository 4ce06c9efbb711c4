//! Registry contract and an in-process TTL store

use crate::errors::{RegistryError, RegistryResult};

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// One key/value pair returned by [`Registry::get`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegistryEntry {
    pub key: String,
    pub value: String,
}

/// TTL-capable key/value store used for service presence.
///
/// Keys are `/`-separated paths. Implementations backed by a store with
/// whole-second TTLs should round `ttl` up.
#[async_trait]
pub trait Registry: Send + Sync + 'static {
    /// Create or overwrite `key`, expiring `ttl` from now
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> RegistryResult<()>;

    /// Live entries under `prefix`. Without `recursive` only `prefix` itself
    /// and its direct children are returned.
    async fn get(&self, prefix: &str, recursive: bool) -> RegistryResult<Vec<RegistryEntry>>;
}

#[async_trait]
impl<R: Registry + ?Sized> Registry for Arc<R> {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> RegistryResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn get(&self, prefix: &str, recursive: bool) -> RegistryResult<Vec<RegistryEntry>> {
        (**self).get(prefix, recursive).await
    }
}

#[derive(Debug, Clone)]
struct Record {
    value: String,
    expires_at: Instant,
}

/// In-process registry with lazy expiry, for tests and single-process setups.
///
/// Expiry follows the tokio clock, so paused-time tests advance it.
///
/// # Examples
///
/// ```
/// use esox_servicepool::{InMemoryRegistry, Registry};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let registry = InMemoryRegistry::new();
/// registry.set("/orders/10.0.0.5:9090", "1", Duration::from_secs(3)).await.unwrap();
///
/// let entries = registry.get("/orders", true).await.unwrap();
/// assert_eq!(entries.len(), 1);
/// assert_eq!(entries[0].key, "/orders/10.0.0.5:9090");
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    records: Arc<DashMap<String, Record>>,
    writes: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

fn normalize(prefix: &str) -> &str {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

fn relative<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix == "/" {
        return key.strip_prefix('/');
    }
    key.strip_prefix(prefix)?.strip_prefix('/')
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` calls accepted so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent call fail until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.records.iter().filter(|r| r.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired keys
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.records.retain(|_, record| record.expires_at > now);
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> RegistryResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RegistryError::WriteFailed {
                key: key.to_string(),
                reason: "registry unavailable".to_string(),
            });
        }

        self.records.insert(
            key.to_string(),
            Record {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        trace!("Set {} with ttl {:?}", key, ttl);
        Ok(())
    }

    async fn get(&self, prefix: &str, recursive: bool) -> RegistryResult<Vec<RegistryEntry>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RegistryError::ReadFailed {
                prefix: prefix.to_string(),
                reason: "registry unavailable".to_string(),
            });
        }

        self.purge_expired();
        let prefix = normalize(prefix);

        let mut entries: Vec<RegistryEntry> = self
            .records
            .iter()
            .filter(|record| {
                let key = record.key().as_str();
                if key == prefix {
                    return true;
                }
                match relative(key, prefix) {
                    Some(rest) => recursive || !rest.contains('/'),
                    None => false,
                }
            })
            .map(|record| RegistryEntry {
                key: record.key().clone(),
                value: record.value().value.clone(),
            })
            .collect();

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}
