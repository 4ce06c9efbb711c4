//! Service announcement with TTL heartbeats

use crate::config::RegistrationConfig;
use crate::errors::{RegistryError, RegistryResult};
use crate::registry::Registry;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, trace, warn};

/// Value written under every presence key
pub const PRESENCE_MARKER: &str = "1";

/// Registry key for one instance of a service: `/{service}/{host:port}`
///
/// # Examples
///
/// ```
/// use esox_servicepool::registry_key;
///
/// assert_eq!(registry_key("orders", "10.0.0.5:9090"), "/orders/10.0.0.5:9090");
/// ```
pub fn registry_key(service_name: &str, address: &str) -> String {
    format!("/{}/{}", service_name, address)
}

struct Heartbeat {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Presence of one `(service, address)` pair in a [`Registry`].
///
/// [`announce`](Self::announce) writes the key and starts a background task
/// that rewrites it every heartbeat interval. [`close`](Self::close) stops
/// the task; the key then lapses once its TTL runs out. Dropping an active
/// registration stops the task as well.
pub struct ServiceRegistration<R: Registry> {
    service_name: String,
    address: String,
    config: RegistrationConfig,
    registry: Arc<R>,
    heartbeat: Option<Heartbeat>,
}

impl<R: Registry> ServiceRegistration<R> {
    pub fn new(
        service_name: impl Into<String>,
        address: impl Into<String>,
        registry: Arc<R>,
        config: RegistrationConfig,
    ) -> RegistryResult<Self> {
        let service_name = service_name.into();
        let address = address.into();

        if service_name.is_empty() || service_name.contains('/') {
            return Err(RegistryError::InvalidConfiguration(format!(
                "invalid service name {:?}",
                service_name
            )));
        }
        if address.is_empty() || address.contains('/') {
            return Err(RegistryError::InvalidConfiguration(format!(
                "invalid address {:?}",
                address
            )));
        }
        config.validate()?;

        Ok(Self {
            service_name,
            address,
            config,
            registry,
            heartbeat: None,
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    pub fn key(&self) -> String {
        registry_key(&self.service_name, &self.address)
    }

    /// Whether a heartbeat task is running
    pub fn is_active(&self) -> bool {
        self.heartbeat.is_some()
    }

    /// Write the presence key once, refreshing its TTL
    pub async fn renew(&self) -> RegistryResult<()> {
        self.registry
            .set(&self.key(), PRESENCE_MARKER, self.config.ttl)
            .await
    }

    /// Write the presence key and start renewing it. If the first write
    /// fails no heartbeat is started. Announcing an active registration only
    /// rewrites the key.
    pub async fn announce(&mut self) -> RegistryResult<()> {
        let key = self.key();
        self.renew().await?;

        if self.heartbeat.is_some() {
            debug!("{} already announced, key refreshed", key);
            return Ok(());
        }

        let (stop, stop_rx) = oneshot::channel();
        let interval = self.config.effective_heartbeat_interval();
        let handle = tokio::spawn(run_heartbeat(
            Arc::clone(&self.registry),
            key.clone(),
            self.config.ttl,
            interval,
            stop_rx,
        ));
        self.heartbeat = Some(Heartbeat { stop, handle });

        info!(
            "Announced {} (ttl {:?}, heartbeat every {:?})",
            key, self.config.ttl, interval
        );
        Ok(())
    }

    /// Stop renewing and wait for the heartbeat task to exit. A renewal in
    /// flight completes first; nothing is written after this returns.
    pub async fn close(&mut self) {
        if let Some(Heartbeat { stop, handle }) = self.heartbeat.take() {
            let _ = stop.send(());
            if let Err(e) = handle.await {
                warn!("Heartbeat task for {} ended abnormally: {}", self.key(), e);
            }
            info!("Stopped heartbeat for {}", self.key());
        }
    }
}

impl<R: Registry> Drop for ServiceRegistration<R> {
    fn drop(&mut self) {
        if let Some(Heartbeat { stop, .. }) = self.heartbeat.take() {
            let _ = stop.send(());
        }
    }
}

impl<R: Registry> std::fmt::Debug for ServiceRegistration<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("key", &self.key())
            .field("config", &self.config)
            .field("active", &self.is_active())
            .finish()
    }
}

async fn run_heartbeat<R: Registry>(
    registry: Arc<R>,
    key: String,
    ttl: Duration,
    period: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            // Fires on an explicit stop or when the registration is dropped
            _ = &mut stop => break,

            _ = ticker.tick() => {
                match registry.set(&key, PRESENCE_MARKER, ttl).await {
                    Ok(()) => trace!("Renewed {}", key),
                    Err(e) => warn!("Failed to renew {}, retrying next tick: {}", key, e),
                }
            }
        }
    }

    debug!("Heartbeat for {} stopped", key);
}
