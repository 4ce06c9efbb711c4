//! Per-destination connection shard

use crate::errors::{PoolError, PoolResult};
use crate::transport::Dialer;

use crossbeam::queue::ArrayQueue;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    created: usize,
    in_use: usize,
    pending: usize,
    reused: usize,
    discarded: usize,
    connect_failures: usize,
}

/// Counts one dial in flight for as long as it lives, including when the
/// acquiring future is dropped mid-dial.
struct PendingDial<'a> {
    counters: &'a RwLock<Counters>,
}

impl<'a> PendingDial<'a> {
    fn start(counters: &'a RwLock<Counters>) -> Self {
        counters.write().pending += 1;
        Self { counters }
    }
}

impl Drop for PendingDial<'_> {
    fn drop(&mut self) {
        let mut counters = self.counters.write();
        counters.pending = counters.pending.saturating_sub(1);
    }
}

/// Point-in-time view of one destination's counters
///
/// # Examples
///
/// ```
/// use esox_servicepool::{PoolConfig, PoolFactory};
///
/// let factory = PoolFactory::build(["10.0.0.5:9090"], &PoolConfig::default()).unwrap();
/// let stats = factory.choose().stats();
///
/// assert_eq!(stats.address, "10.0.0.5:9090");
/// assert_eq!(stats.in_use, 0);
/// assert_eq!(stats.capacity, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DestinationStats {
    pub address: String,

    /// Streams dialed successfully
    pub created: usize,

    /// Streams currently checked out
    pub in_use: usize,

    /// Dials in flight
    pub pending: usize,

    /// Streams sitting in the idle queue
    pub idle: usize,

    /// Idle queue capacity
    pub capacity: usize,

    /// Checkouts served from the idle queue
    pub reused: usize,

    /// Streams dropped on release or invalidated
    pub discarded: usize,

    pub connect_failures: usize,
}

/// Connection state for a single `host:port` destination.
///
/// Idle streams live in a bounded lock-free queue. The counters behind the
/// lock are bookkeeping only; admission is never gated on them.
pub struct DestinationEntry<D: Dialer> {
    address: String,
    idle: ArrayQueue<D::Stream>,
    counters: RwLock<Counters>,
    connect_timeout: Duration,
    dialer: Arc<D>,
}

impl<D: Dialer> DestinationEntry<D> {
    /// `capacity` must be non-zero
    pub(crate) fn new(
        address: String,
        capacity: usize,
        connect_timeout: Duration,
        dialer: Arc<D>,
    ) -> Self {
        Self {
            address,
            idle: ArrayQueue::new(capacity),
            counters: RwLock::new(Counters::default()),
            connect_timeout,
            dialer,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn capacity(&self) -> usize {
        self.idle.capacity()
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    pub fn in_use(&self) -> usize {
        self.counters.read().in_use
    }

    pub fn created(&self) -> usize {
        self.counters.read().created
    }

    /// Check out a stream, reusing an idle one when available and dialing
    /// otherwise. Never waits for another caller to release.
    pub async fn acquire(&self) -> PoolResult<D::Stream> {
        if let Some(stream) = self.idle.pop() {
            let mut counters = self.counters.write();
            counters.in_use += 1;
            counters.reused += 1;
            trace!("Reusing idle connection to {}", self.address);
            return Ok(stream);
        }

        let pending = PendingDial::start(&self.counters);
        let dialed = self.dialer.dial(&self.address, self.connect_timeout).await;
        drop(pending);

        let mut counters = self.counters.write();
        match dialed {
            Ok(stream) => {
                counters.created += 1;
                counters.in_use += 1;
                debug!(
                    "Opened connection to {} (created: {}, in use: {})",
                    self.address, counters.created, counters.in_use
                );
                Ok(stream)
            }
            Err(source) => {
                counters.connect_failures += 1;
                drop(counters);
                warn!("Failed to connect to {}: {}", self.address, source);
                Err(PoolError::ConnectFailed {
                    address: self.address.clone(),
                    source,
                })
            }
        }
    }

    /// Return a stream to the idle queue. When the queue is already full the
    /// stream is dropped, which closes it.
    pub fn release(&self, stream: D::Stream) {
        let mut counters = self.counters.write();
        counters.in_use = counters.in_use.saturating_sub(1);

        if let Err(stream) = self.idle.push(stream) {
            counters.discarded += 1;
            drop(counters);
            drop(stream);
            debug!("Idle queue for {} is full, closing connection", self.address);
        } else {
            trace!(
                "Returned connection to {} (idle: {})",
                self.address,
                self.idle.len()
            );
        }
    }

    /// Drop a checked-out stream without returning it to the idle queue
    pub fn discard(&self, stream: D::Stream) {
        {
            let mut counters = self.counters.write();
            counters.in_use = counters.in_use.saturating_sub(1);
            counters.discarded += 1;
        }
        drop(stream);
        debug!("Discarded connection to {}", self.address);
    }

    pub fn stats(&self) -> DestinationStats {
        let counters = *self.counters.read();
        DestinationStats {
            address: self.address.clone(),
            created: counters.created,
            in_use: counters.in_use,
            pending: counters.pending,
            idle: self.idle.len(),
            capacity: self.idle.capacity(),
            reused: counters.reused,
            discarded: counters.discarded,
            connect_failures: counters.connect_failures,
        }
    }
}

impl<D: Dialer> std::fmt::Debug for DestinationEntry<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationEntry")
            .field("address", &self.address)
            .field("capacity", &self.idle.capacity())
            .field("idle", &self.idle.len())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingDialer, HangingDialer, MockDialer};

    fn entry(capacity: usize) -> (DestinationEntry<MockDialer>, Arc<MockDialer>) {
        let dialer = Arc::new(MockDialer::default());
        let entry = DestinationEntry::new(
            "10.0.0.5:9090".to_string(),
            capacity,
            Duration::from_secs(1),
            Arc::clone(&dialer),
        );
        (entry, dialer)
    }

    #[tokio::test]
    async fn test_acquire_dials_when_idle_queue_empty() {
        let (entry, dialer) = entry(2);

        let stream = entry.acquire().await.unwrap();
        assert_eq!(stream.id, 0);
        assert_eq!(dialer.dial_count(), 1);

        let stats = entry.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.in_use, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn test_release_then_acquire_reuses() {
        let (entry, dialer) = entry(2);

        let stream = entry.acquire().await.unwrap();
        entry.release(stream);
        assert_eq!(entry.idle_count(), 1);
        assert_eq!(entry.in_use(), 0);

        let again = entry.acquire().await.unwrap();
        assert_eq!(again.id, 0);
        assert_eq!(dialer.dial_count(), 1);
        assert_eq!(entry.stats().reused, 1);
        assert_eq!(entry.in_use(), 1);
    }

    #[tokio::test]
    async fn test_release_drops_overflow() {
        let (entry, _) = entry(1);

        let first = entry.acquire().await.unwrap();
        let second = entry.acquire().await.unwrap();
        assert_eq!(entry.created(), 2);

        entry.release(first);
        entry.release(second);

        let stats = entry.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.discarded, 1);
    }

    #[tokio::test]
    async fn test_in_use_bounded_by_created() {
        let (entry, _) = entry(3);
        let mut held = Vec::new();

        // Interleave checkouts and returns
        for round in 0..20 {
            if round % 3 == 2 {
                if let Some(stream) = held.pop() {
                    entry.release(stream);
                }
            } else {
                held.push(entry.acquire().await.unwrap());
            }
            let stats = entry.stats();
            assert!(stats.in_use <= stats.created);
            assert_eq!(stats.in_use, held.len());
        }

        for stream in held.drain(..) {
            entry.release(stream);
        }
        assert_eq!(entry.in_use(), 0);
    }

    #[tokio::test]
    async fn test_discard_does_not_requeue() {
        let (entry, _) = entry(2);

        let stream = entry.acquire().await.unwrap();
        entry.discard(stream);

        let stats = entry.stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.discarded, 1);
    }

    #[tokio::test]
    async fn test_failed_dial_creates_nothing() {
        let entry = DestinationEntry::new(
            "10.0.0.9:9090".to_string(),
            2,
            Duration::from_secs(1),
            Arc::new(FailingDialer),
        );

        let err = entry.acquire().await.unwrap_err();
        assert!(err.is_connect_failure());

        let stats = entry.stats();
        assert_eq!(stats.created, 0);
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.connect_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_dial_is_not_left_pending() {
        let entry = DestinationEntry::new(
            "10.0.0.7:9090".to_string(),
            2,
            Duration::from_secs(1),
            Arc::new(HangingDialer),
        );

        let outcome = tokio::time::timeout(Duration::from_millis(20), entry.acquire()).await;
        assert!(outcome.is_err());

        let stats = entry.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.created, 0);
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.connect_failures, 0);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_release() {
        let (entry, _) = entry(4);
        let entry = Arc::new(entry);

        let mut handles = vec![];
        for _ in 0..16 {
            let entry = Arc::clone(&entry);
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    let stream = entry.acquire().await.unwrap();
                    tokio::task::yield_now().await;
                    entry.release(stream);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = entry.stats();
        assert_eq!(stats.in_use, 0);
        assert!(stats.idle <= stats.capacity);
        assert_eq!(stats.reused + stats.created, 16 * 25);
    }
}
