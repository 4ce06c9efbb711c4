//! Pool and registration configuration

use crate::errors::{PoolError, PoolResult, RegistryError, RegistryResult};
use std::time::Duration;

/// Default number of idle connections retained per destination
pub const DEFAULT_MAX_IDLE_PER_DESTINATION: usize = 8;

/// Default timeout for dialing a destination
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default period between TTL renewals
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1000);

/// Floor applied to the heartbeat interval to keep a misconfigured
/// registration from flooding the registry
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(50);

/// Ratio between the registry TTL and the heartbeat interval
pub const TTL_TO_HEARTBEAT_RATIO: u32 = 3;

/// Configuration for a destination-sharded pool
///
/// # Examples
///
/// ```
/// use esox_servicepool::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::new()
///     .with_max_idle_per_destination(16)
///     .with_connect_timeout(Duration::from_millis(250));
///
/// assert_eq!(config.max_idle_per_destination, 16);
/// assert_eq!(config.connect_timeout, Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolConfig {
    /// Capacity of each destination's idle queue
    pub max_idle_per_destination: usize,

    /// Upper bound on a single dial attempt
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_destination: DEFAULT_MAX_IDLE_PER_DESTINATION,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle queue capacity per destination
    pub fn with_max_idle_per_destination(mut self, size: usize) -> Self {
        self.max_idle_per_destination = size;
        self
    }

    /// Set the dial timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.max_idle_per_destination == 0 {
            return Err(PoolError::InvalidConfiguration(
                "max_idle_per_destination must be at least 1".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(PoolError::InvalidConfiguration(
                "connect_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Heartbeat and TTL settings for a service registration
///
/// Setting the heartbeat interval also resets the TTL to three intervals, so
/// two consecutive renewals can fail before the key lapses. Call
/// [`with_ttl`](Self::with_ttl) afterwards to override it.
///
/// # Examples
///
/// ```
/// use esox_servicepool::RegistrationConfig;
/// use std::time::Duration;
///
/// let config = RegistrationConfig::new()
///     .with_heartbeat_interval(Duration::from_millis(500));
///
/// assert_eq!(config.ttl, Duration::from_millis(1500));
///
/// // Intervals below the floor are clamped
/// let config = RegistrationConfig::new()
///     .with_heartbeat_interval(Duration::from_millis(1))
///     .with_ttl(Duration::from_secs(1));
/// assert_eq!(config.effective_heartbeat_interval(), Duration::from_millis(50));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegistrationConfig {
    /// Period between renewals (clamped to [`MIN_HEARTBEAT_INTERVAL`])
    pub heartbeat_interval: Duration,

    /// Lifetime written with every registry update
    pub ttl: Duration,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            ttl: DEFAULT_HEARTBEAT_INTERVAL * TTL_TO_HEARTBEAT_RATIO,
        }
    }
}

impl RegistrationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the heartbeat interval and derive the TTL from it
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.ttl = interval.max(MIN_HEARTBEAT_INTERVAL) * TTL_TO_HEARTBEAT_RATIO;
        self
    }

    /// Override the TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Interval actually used by the heartbeat loop
    pub fn effective_heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL)
    }

    pub fn validate(&self) -> RegistryResult<()> {
        let interval = self.effective_heartbeat_interval();
        if interval >= self.ttl {
            return Err(RegistryError::InvalidConfiguration(format!(
                "heartbeat interval {:?} must be shorter than ttl {:?}",
                interval, self.ttl
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_idle_per_destination, 8);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pool_rejects_zero_capacity() {
        let config = PoolConfig::new().with_max_idle_per_destination(0);
        assert!(matches!(
            config.validate(),
            Err(PoolError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_registration_defaults() {
        let config = RegistrationConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(config.ttl, Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_interval_must_be_below_ttl() {
        let config = RegistrationConfig::new()
            .with_heartbeat_interval(Duration::from_secs(2))
            .with_ttl(Duration::from_secs(2));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_floor_counts_against_ttl() {
        // 10ms is clamped to 50ms, which is not below a 40ms ttl
        let config = RegistrationConfig::new()
            .with_heartbeat_interval(Duration::from_millis(10))
            .with_ttl(Duration::from_millis(40));
        assert_eq!(config.effective_heartbeat_interval(), MIN_HEARTBEAT_INTERVAL);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_ttl_uses_clamped_interval() {
        let config = RegistrationConfig::new().with_heartbeat_interval(Duration::from_millis(1));
        assert_eq!(config.ttl, Duration::from_millis(150));
        assert!(config.validate().is_ok());
    }
}
