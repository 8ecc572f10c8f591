//! Graceful shutdown of the collector
//!
//! Order: stop the periodic saver, drain the HTTP server, take the final
//! snapshot, close the backend. A failing step is logged and the sequence
//! goes on; only the final snapshot's failure is reported to the caller.

use actix_web::dev::ServerHandle;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::snapshot::{save_snapshot, PeriodicSaver};
use crate::storage::{MetricStorage, StorageError};

/// Shutdown signal source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Ctrl+C / SIGINT
    Interrupt,
    /// SIGTERM
    Terminate,
}

/// Configuration for graceful shutdown
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Upper bound for in-flight requests to finish
    pub drain_timeout: Duration,
    /// Timeout for the other individual steps
    pub step_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(30),
            step_timeout: Duration::from_secs(10),
        }
    }
}

/// Graceful shutdown coordinator
pub struct ShutdownCoordinator {
    storage: Arc<dyn MetricStorage>,
    snapshot_path: Option<PathBuf>,
    config: ShutdownConfig,
}

impl ShutdownCoordinator {
    /// `snapshot_path` is `None` when snapshot saving is disabled
    pub fn new(
        storage: Arc<dyn MetricStorage>,
        snapshot_path: Option<PathBuf>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            storage,
            snapshot_path,
            config,
        }
    }

    /// Run the shutdown sequence
    pub async fn shutdown(
        &self,
        signal: ShutdownSignal,
        saver: PeriodicSaver,
        server: Option<ServerHandle>,
    ) -> Result<(), StorageError> {
        let started = Instant::now();
        info!("Starting graceful shutdown (signal: {:?})", signal);

        info!("Phase 1: Stopping periodic saver");
        self.run_step("periodic_saver", self.config.step_timeout, async {
            saver.stop().await;
            Ok(())
        })
        .await;

        info!("Phase 2: Draining HTTP server");
        if let Some(server) = server {
            self.run_step("http_server", self.config.drain_timeout, async move {
                server.stop(true).await;
                Ok(())
            })
            .await;
        }

        info!("Phase 3: Saving final snapshot");
        let final_save = match &self.snapshot_path {
            Some(path) => match save_snapshot(self.storage.as_ref(), path).await {
                Ok(count) => {
                    info!("Final snapshot of {} metrics written to {}", count, path.display());
                    Ok(())
                }
                Err(e) => {
                    error!("Final snapshot failed: {}", e);
                    Err(e)
                }
            },
            None => Ok(()),
        };

        info!("Phase 4: Closing storage");
        let storage = Arc::clone(&self.storage);
        self.run_step("storage", self.config.step_timeout, async move {
            storage.close().await.map_err(|e| e.to_string())
        })
        .await;

        info!("Shutdown finished in {:?}", started.elapsed());
        final_save
    }

    /// Run one step with a timeout; failures are logged, not propagated
    async fn run_step<Fut>(&self, name: &str, limit: Duration, step: Fut)
    where
        Fut: Future<Output = Result<(), String>>,
    {
        let started = Instant::now();
        match timeout(limit, step).await {
            Ok(Ok(())) => info!("Component '{}' stopped in {:?}", name, started.elapsed()),
            Ok(Err(e)) => error!("Component '{}' shutdown failed: {}", name, e),
            Err(_) => warn!("Component '{}' shutdown timed out after {:?}", name, limit),
        }
    }
}

/// Register handlers for Ctrl+C and, on unix, SIGTERM
pub fn register_signal_handlers() -> tokio::sync::mpsc::Receiver<ShutdownSignal> {
    use tokio::signal;
    use tokio::sync::mpsc;

    let (tx, rx) = mpsc::channel(1);

    let tx_ctrl_c = tx.clone();
    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            info!("Ctrl+C received, initiating graceful shutdown");
            let _ = tx_ctrl_c.send(ShutdownSignal::Interrupt).await;
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    if sigterm.recv().await.is_some() {
                        info!("SIGTERM received, initiating graceful shutdown");
                        let _ = tx.send(ShutdownSignal::Terminate).await;
                    }
                }
                Err(e) => error!("Failed to register SIGTERM handler: {}", e),
            }
        });
    }

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use metrics_core::MetricRecord;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_shutdown_writes_final_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let storage: Arc<dyn MetricStorage> = Arc::new(MemoryStorage::new());
        storage.set_counter("hits", 9).await.unwrap();

        let saver = PeriodicSaver::start(storage.clone(), path.clone(), Duration::from_secs(3600));
        let coordinator =
            ShutdownCoordinator::new(storage, Some(path.clone()), ShutdownConfig::default());
        coordinator
            .shutdown(ShutdownSignal::Terminate, saver, None)
            .await
            .unwrap();

        let saved: Vec<MetricRecord> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved, vec![MetricRecord::counter("hits", 9)]);
    }

    #[tokio::test]
    async fn test_final_save_failure_is_reported() {
        let dir = tempdir().unwrap();
        // a directory cannot be replaced by a file
        let path = dir.path().to_path_buf();
        let storage: Arc<dyn MetricStorage> = Arc::new(MemoryStorage::new());

        let saver = PeriodicSaver::start(storage.clone(), PathBuf::new(), Duration::ZERO);
        let coordinator = ShutdownCoordinator::new(storage, Some(path), ShutdownConfig::default());
        assert!(coordinator
            .shutdown(ShutdownSignal::Interrupt, saver, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_signal_handler_registration() {
        let _rx = register_signal_handlers();
    }
}
