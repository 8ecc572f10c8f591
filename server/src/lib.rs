// Metrics collector server

// Enforce panic-free code in production
#![cfg_attr(not(test), warn(clippy::unwrap_used))]
#![cfg_attr(not(test), warn(clippy::expect_used))]
#![cfg_attr(not(test), warn(clippy::panic))]
// Test-specific allows
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod api;
pub mod audit;
pub mod config;
pub mod shutdown;
pub mod snapshot;
pub mod storage;

pub use crate::config::{ServerArgs, ServerConfig};
pub use crate::storage::{MetricStorage, StorageError};

use anyhow::Context;
use metrics_core::crypto::{self, RsaPrivateKey};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{ApiServer, AppState, SecurityConfig};
use crate::audit::Auditor;
use crate::shutdown::{register_signal_handlers, ShutdownConfig, ShutdownCoordinator, ShutdownSignal};
use crate::snapshot::{load_snapshot, PeriodicSaver};

/// Run the collector until a shutdown signal arrives
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let private_key = load_crypto_key(&config.crypto_key)?;

    let storage = storage::open_storage(&config.database_dsn)
        .await
        .context("failed to open metric storage")?;

    let snapshot_path = config.snapshot_path();
    if !config.database_dsn.is_empty() {
        info!("Database backend active, file snapshots disabled");
    }
    if config.restore {
        if let Some(path) = &snapshot_path {
            load_snapshot(storage.as_ref(), path)
                .await
                .with_context(|| format!("failed to restore snapshot {}", path.display()))?;
        }
    }

    let saver = PeriodicSaver::start(
        storage.clone(),
        snapshot_path.clone().unwrap_or_default(),
        config.store_interval,
    );

    let auditor = Arc::new(Auditor::from_config(&config.audit_file, &config.audit_url));
    let state = AppState {
        storage: storage.clone(),
        signing_key: config.key.clone(),
        auditor,
    };
    let security = SecurityConfig {
        signing_key: config.key.clone(),
        private_key,
    };

    let shutdown_config = ShutdownConfig::default();
    let server = ApiServer::new(&config.address, state, security)
        .with_shutdown_timeout(shutdown_config.drain_timeout)
        .start()
        .with_context(|| format!("failed to bind {}", config.address))?;
    let handle = server.handle();

    let mut signals = register_signal_handlers();
    let server_task = actix_rt::spawn(server);

    let signal = match signals.recv().await {
        Some(signal) => signal,
        None => {
            warn!("Signal channel closed, shutting down");
            ShutdownSignal::Interrupt
        }
    };

    let coordinator = ShutdownCoordinator::new(storage, snapshot_path, shutdown_config);
    let result = coordinator.shutdown(signal, saver, Some(handle)).await;

    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("HTTP server exited with error: {}", e),
        Err(e) => warn!("HTTP server task failed: {}", e),
    }

    result.context("final snapshot failed")?;
    info!("Collector stopped");
    Ok(())
}

/// Bootstrap the key pair next to `path` on first start and load the private key
fn load_crypto_key(path: &str) -> anyhow::Result<Option<Arc<RsaPrivateKey>>> {
    if path.is_empty() {
        return Ok(None);
    }
    let path = Path::new(path);
    if crypto::ensure_keypair(path)? {
        info!("Generated a new RSA key pair in {:?}", path.parent().unwrap_or(path));
    }
    let key = crypto::load_private_key(path)
        .with_context(|| format!("failed to load private key {}", path.display()))?;
    Ok(Some(Arc::new(key)))
}
