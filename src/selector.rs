//! Destination selection policies

use crate::destination::DestinationEntry;
use crate::transport::Dialer;

use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Picks the destination for a new checkout.
///
/// `select` receives the factory's entries (never empty) and returns an
/// index into them; out-of-range indices wrap.
pub trait DestinationSelector: Send + Sync + 'static {
    fn select<D: Dialer>(&self, entries: &[Arc<DestinationEntry<D>>]) -> usize;
}

/// Uniform random choice with no memory of earlier picks or failures
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSelector;

impl DestinationSelector for RandomSelector {
    fn select<D: Dialer>(&self, entries: &[Arc<DestinationEntry<D>>]) -> usize {
        rand::rng().random_range(0..entries.len())
    }
}

/// Cycles through destinations in order
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    next: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DestinationSelector for RoundRobinSelector {
    fn select<D: Dialer>(&self, entries: &[Arc<DestinationEntry<D>>]) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % entries.len()
    }
}
