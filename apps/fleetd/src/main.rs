use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use fleet_utils::{ensure_dir, runtime_paths};

mod backup;
mod client;
mod config;
mod daemon;
mod decode;
mod fleet;
mod lock;
mod presence;
mod scheduler;
mod source;
mod store;
mod whitelist;

use crate::client::DefaultClientFactory;
use crate::config::FleetConfig;
use crate::decode::SavCliDecoder;
use crate::fleet::Fleet;
use crate::scheduler::Scheduler;
use crate::source::{ContainerTools, SourceResolver};
use crate::store::NamespacedStore;

/// Timeout for kubectl/docker copies and save downloads.
const SOURCE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Parser, Debug)]
#[command(name = "fleetd", version, about = "Game server fleet sync and backup daemon")]
struct Args {
    /// Path to the TOML config file.
    #[arg(long, short, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = FleetConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    let paths = runtime_paths();
    ensure_dir(&paths.runtime_dir)
        .with_context(|| format!("Failed to create {}", paths.runtime_dir.display()))?;

    // single-instance lock
    let _guard = match lock::acquire_lock(&paths.lock_path) {
        Ok(guard) => guard,
        Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
            warn!("daemon already running (lock held), exiting");
            return Ok(());
        }
        Err(err) => return Err(err).context("Failed to take daemon lock"),
    };

    if paths.socket_path.exists() {
        if fleet_ipc::socket::socket_alive(&paths.socket_path).await {
            warn!("daemon already running (socket alive), exiting");
            return Ok(());
        }
        fleet_ipc::socket::remove_stale_socket(&paths.socket_path)?;
    }

    let store = NamespacedStore::open(&config.storage.database_path()?)?;
    let resolver = SourceResolver::new(SOURCE_TIMEOUT, SOURCE_TIMEOUT)?.with_container_tools(ContainerTools {
        kubectl: config.save.kubectl_path.clone(),
        docker: config.save.docker_path.clone(),
    });
    let decoder = SavCliDecoder::from_config(&config.save);
    let fleet = Fleet::new(
        Arc::new(config),
        Arc::new(store),
        Arc::new(resolver),
        Arc::new(DefaultClientFactory),
        Arc::new(decoder),
    )?;
    fleet.log_loaded();

    let scheduler = Scheduler::new(Arc::new(fleet));
    scheduler.start();

    let shutdown = CancellationToken::new();
    let listener = fleet_ipc::socket::bind(&paths.socket_path)
        .with_context(|| format!("Failed to bind {}", paths.socket_path.display()))?;
    info!("fleetd listening at {:?}", paths.socket_path);

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received");
                shutdown.cancel();
            }
        });
    }

    let served = daemon::serve(listener, daemon::Daemon::new(Arc::clone(&scheduler), shutdown)).await;

    scheduler.shutdown().await;
    if let Err(err) = fleet_ipc::socket::remove_stale_socket(&paths.socket_path) {
        warn!("failed to remove socket file: {err}");
    }
    served.context("Control socket failed")
}
