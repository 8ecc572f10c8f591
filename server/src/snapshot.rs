//! Snapshot persistence of the metric store
//!
//! The snapshot is a JSON array of metric records, rewritten wholesale on
//! every save and read once at startup.

use metrics_core::MetricRecord;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::storage::{MetricStorage, StorageError};

/// Write every stored metric to `path`, returning how many were written
///
/// The file is replaced through a temporary sibling so a crash never leaves
/// a truncated snapshot behind.
pub async fn save_snapshot(storage: &dyn MetricStorage, path: &Path) -> Result<usize, StorageError> {
    let mut records = storage.get_all().await?;
    records.sort_by(|a, b| a.id.cmp(&b.id).then(a.kind.as_str().cmp(b.kind.as_str())));
    let data = serde_json::to_vec_pretty(&records)?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, &data).await?;
    tokio::fs::rename(&tmp, path).await?;

    debug!("Saved {} metrics to {}", records.len(), path.display());
    Ok(records.len())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Load a snapshot into `storage`, returning how many records were applied
///
/// A missing or empty file yields an empty store. Entries that do not decode
/// as metric records (an unknown kind, for instance) are logged and skipped.
/// Values are stored as recorded, so loading into a store that already holds
/// them leaves counter totals unchanged.
pub async fn load_snapshot(storage: &dyn MetricStorage, path: &Path) -> Result<usize, StorageError> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No snapshot at {}, starting empty", path.display());
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };
    if data.iter().all(u8::is_ascii_whitespace) {
        info!("Snapshot {} is empty, starting empty", path.display());
        return Ok(0);
    }

    let entries: Vec<serde_json::Value> = serde_json::from_slice(&data)?;
    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<MetricRecord>(entry) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping snapshot entry: {}", e),
        }
    }

    storage.restore(&records).await?;
    info!("Restored {} metrics from {}", records.len(), path.display());
    Ok(records.len())
}

/// Background task saving a snapshot every `interval`
///
/// `stop` cancels the task and waits until it has exited, so no save can
/// race the final one taken during shutdown.
pub struct PeriodicSaver {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicSaver {
    /// Start saving; a zero interval or an empty path disables the task
    pub fn start(storage: Arc<dyn MetricStorage>, path: PathBuf, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        if interval.is_zero() || path.as_os_str().is_empty() {
            info!("Periodic snapshot saving disabled");
            return Self {
                cancel,
                handle: None,
            };
        }

        info!(
            "Saving snapshots to {} every {:?}",
            path.display(),
            interval
        );
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let started = Instant::now();
                        match save_snapshot(storage.as_ref(), &path).await {
                            Ok(count) => debug!("Periodic snapshot of {} metrics in {:?}", count, started.elapsed()),
                            Err(e) => error!("Periodic snapshot failed: {}", e),
                        }
                    }
                }
            }
            debug!("Periodic saver exited");
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the task and wait for it to finish
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Periodic saver task failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, SqliteStorage};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let source = MemoryStorage::new();
        source.set_gauge("cpu", 0.0).await.unwrap();
        source.set_gauge("mem", 78.25).await.unwrap();
        source.set_counter("hits", 42).await.unwrap();
        assert_eq!(save_snapshot(&source, &path).await.unwrap(), 3);

        let restored = MemoryStorage::new();
        assert_eq!(load_snapshot(&restored, &path).await.unwrap(), 3);
        assert_eq!(restored.get_gauge("cpu").await.unwrap(), 0.0);
        assert_eq!(restored.get_gauge("mem").await.unwrap(), 78.25);
        assert_eq!(restored.get_counter("hits").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_reload_into_sqlite_keeps_counter_total() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let db = dir.path().join("metrics.db");
        let dsn = db.to_str().unwrap();

        let storage = SqliteStorage::open(dsn).await.unwrap();
        storage.set_counter("hits", 5).await.unwrap();
        storage.set_gauge("cpu", 0.5).await.unwrap();
        save_snapshot(&storage, &path).await.unwrap();
        storage.close().await.unwrap();

        let reopened = SqliteStorage::open(dsn).await.unwrap();
        assert_eq!(load_snapshot(&reopened, &path).await.unwrap(), 2);
        assert_eq!(reopened.get_counter("hits").await.unwrap(), 5);
        assert_eq!(reopened.get_gauge("cpu").await.unwrap(), 0.5);
    }

    #[tokio::test]
    async fn test_missing_and_empty_files() {
        let dir = tempdir().unwrap();
        let storage = MemoryStorage::new();
        assert_eq!(
            load_snapshot(&storage, &dir.path().join("absent.json"))
                .await
                .unwrap(),
            0
        );

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "").unwrap();
        assert_eq!(load_snapshot(&storage, &empty).await.unwrap(), 0);
        assert!(storage.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_kinds_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(
            &path,
            r#"[{"id":"a","type":"gauge","value":1.5},{"id":"b","type":"histogram","value":2}]"#,
        )
        .unwrap();

        let storage = MemoryStorage::new();
        assert_eq!(load_snapshot(&storage, &path).await.unwrap(), 1);
        assert_eq!(storage.get_gauge("a").await.unwrap(), 1.5);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_snapshot(&MemoryStorage::new(), &path).await,
            Err(StorageError::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_periodic_saver_writes_and_stops() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let storage: Arc<dyn MetricStorage> = Arc::new(MemoryStorage::new());
        storage.set_counter("hits", 1).await.unwrap();

        let saver = PeriodicSaver::start(storage, path.clone(), Duration::from_millis(20));
        assert!(saver.is_running());
        time::sleep(Duration::from_millis(120)).await;
        saver.stop().await;

        let saved: Vec<MetricRecord> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved, vec![MetricRecord::counter("hits", 1)]);
    }

    #[tokio::test]
    async fn test_zero_interval_disables_saver() {
        let storage: Arc<dyn MetricStorage> = Arc::new(MemoryStorage::new());
        let saver = PeriodicSaver::start(storage, PathBuf::from("unused.json"), Duration::ZERO);
        assert!(!saver.is_running());
        saver.stop().await;
    }
}
