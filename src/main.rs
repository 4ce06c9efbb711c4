// EsoxSolutions.ServicePool
// Announces a local echo service, discovers it and talks to it through the pool.
//
// Run with: RUST_LOG=debug cargo run

use esox_servicepool::{
    InMemoryRegistry, MetricsExporter, PoolConfig, RegistrationConfig, ServiceDiscovery,
    ServiceRegistration,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const SERVICE: &str = "echo";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging()?;

    let mut addresses = Vec::new();
    for _ in 0..2 {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        addresses.push(listener.local_addr()?.to_string());
        tokio::spawn(serve_echo(listener));
    }

    let registry = Arc::new(InMemoryRegistry::new());
    let config = RegistrationConfig::new().with_heartbeat_interval(Duration::from_millis(200));

    let mut registrations = Vec::new();
    for address in &addresses {
        let mut registration = ServiceRegistration::new(
            SERVICE,
            address.as_str(),
            Arc::clone(&registry),
            config.clone(),
        )?;
        registration.announce().await?;
        registrations.push(registration);
    }

    let discovery = ServiceDiscovery::new(Arc::clone(&registry));
    let factory = discovery
        .build_pool(SERVICE, &PoolConfig::new().with_max_idle_per_destination(4))
        .await?;
    info!("Pool over {:?}", factory.destinations().collect::<Vec<_>>());

    let mut conn = factory.new_connection();
    for i in 0..10 {
        let message = format!("request {}", i);
        conn.write_all(message.as_bytes()).await?;

        let mut reply = vec![0u8; message.len()];
        conn.read_exact(&mut reply).await?;
        info!(
            "{} -> {} via {}",
            message,
            String::from_utf8_lossy(&reply),
            conn.destination().unwrap_or("?")
        );
        conn.close()?;
    }

    println!(
        "{}",
        MetricsExporter::export_prometheus(&factory.metrics(), "echo_pool", None)
    );

    for mut registration in registrations {
        registration.close().await;
    }

    Ok(())
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();

    Ok(())
}

async fn serve_echo(listener: TcpListener) {
    loop {
        let (mut socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Accept failed: {}", e);
                continue;
            }
        };

        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if socket.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Read from {} failed: {}", peer, e);
                        break;
                    }
                }
            }
        });
    }
}
