//! Metrics snapshots and export for connection pools

use crate::destination::DestinationStats;
use std::collections::HashMap;

/// Counters for every destination of a pool at one point in time
///
/// # Examples
///
/// ```
/// use esox_servicepool::{PoolConfig, PoolFactory};
///
/// let factory = PoolFactory::build(["10.0.0.5:9090", "10.0.0.6:9090"], &PoolConfig::default()).unwrap();
/// let metrics = factory.metrics();
///
/// assert_eq!(metrics.destinations.len(), 2);
/// assert_eq!(metrics.total_in_use(), 0);
/// assert_eq!(metrics.total_capacity(), 16);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Per-destination counters, in factory order
    pub destinations: Vec<DestinationStats>,
}

impl PoolMetrics {
    pub(crate) fn new(destinations: Vec<DestinationStats>) -> Self {
        Self { destinations }
    }

    pub fn total_created(&self) -> usize {
        self.destinations.iter().map(|d| d.created).sum()
    }

    pub fn total_in_use(&self) -> usize {
        self.destinations.iter().map(|d| d.in_use).sum()
    }

    pub fn total_idle(&self) -> usize {
        self.destinations.iter().map(|d| d.idle).sum()
    }

    pub fn total_capacity(&self) -> usize {
        self.destinations.iter().map(|d| d.capacity).sum()
    }

    pub fn total_connect_failures(&self) -> usize {
        self.destinations.iter().map(|d| d.connect_failures).sum()
    }

    /// Idle-queue fill ratio across all destinations (0.0 to 1.0)
    pub fn idle_ratio(&self) -> f64 {
        let capacity = self.total_capacity();
        if capacity > 0 {
            self.total_idle() as f64 / capacity as f64
        } else {
            0.0
        }
    }

    /// Export pool-wide totals as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("destinations".to_string(), self.destinations.len().to_string());
        metrics.insert("total_created".to_string(), self.total_created().to_string());
        metrics.insert("total_in_use".to_string(), self.total_in_use().to_string());
        metrics.insert("total_idle".to_string(), self.total_idle().to_string());
        metrics.insert("total_capacity".to_string(), self.total_capacity().to_string());
        metrics.insert(
            "total_connect_failures".to_string(),
            self.total_connect_failures().to_string(),
        );
        metrics.insert("idle_ratio".to_string(), format!("{:.2}", self.idle_ratio()));
        metrics
    }
}

/// Metric name, help text and the counter it reads
type Series = (&'static str, &'static str, fn(&DestinationStats) -> usize);

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export per-destination series in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_servicepool::{MetricsExporter, PoolConfig, PoolFactory};
    /// use std::collections::HashMap;
    ///
    /// let factory = PoolFactory::build(["10.0.0.5:9090"], &PoolConfig::default()).unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "orders".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&factory.metrics(), "orders_pool", Some(&tags));
    /// assert!(output.contains("servicepool_connections_in_use"));
    /// assert!(output.contains("destination=\"10.0.0.5:9090\""));
    /// assert!(output.contains("service=\"orders\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut output = String::new();

        let gauges: [Series; 4] = [
            (
                "servicepool_connections_in_use",
                "Connections currently checked out",
                |d: &DestinationStats| d.in_use,
            ),
            (
                "servicepool_connections_idle",
                "Connections waiting in the idle queue",
                |d: &DestinationStats| d.idle,
            ),
            (
                "servicepool_connections_pending",
                "Dials in flight",
                |d: &DestinationStats| d.pending,
            ),
            (
                "servicepool_idle_capacity",
                "Idle queue capacity",
                |d: &DestinationStats| d.capacity,
            ),
        ];
        let counters: [Series; 4] = [
            (
                "servicepool_connections_created_total",
                "Connections dialed",
                |d: &DestinationStats| d.created,
            ),
            (
                "servicepool_connections_reused_total",
                "Checkouts served from the idle queue",
                |d: &DestinationStats| d.reused,
            ),
            (
                "servicepool_connections_discarded_total",
                "Connections closed instead of pooled",
                |d: &DestinationStats| d.discarded,
            ),
            (
                "servicepool_connect_failures_total",
                "Failed dial attempts",
                |d: &DestinationStats| d.connect_failures,
            ),
        ];

        for (kind, series) in [("gauge", &gauges), ("counter", &counters)] {
            for (name, help, value) in series.iter() {
                output.push_str(&format!("# HELP {} {}\n", name, help));
                output.push_str(&format!("# TYPE {} {}\n", name, kind));
                for destination in &metrics.destinations {
                    let labels = Self::format_labels(pool_name, &destination.address, tags);
                    output.push_str(&format!("{}{{{}}} {}\n", name, labels, value(destination)));
                }
            }
        }

        output
    }

    fn format_labels(
        pool_name: &str,
        destination: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut labels = vec![
            format!("pool=\"{}\"", pool_name),
            format!("destination=\"{}\"", destination),
        ];

        if let Some(tags) = tags {
            let mut tags: Vec<_> = tags.iter().collect();
            tags.sort();
            for (key, value) in tags {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}
