use async_trait::async_trait;
use metrics_core::MetricRecord;

use super::StorageError;

/// Metric store shared by the HTTP handlers, the snapshot saver and shutdown
///
/// Gauges are overwritten, counters accumulate. Reads of an unknown name
/// return [`StorageError::NotFound`], never a zero.
#[async_trait]
pub trait MetricStorage: Send + Sync {
    /// Overwrite the gauge `name`
    async fn set_gauge(&self, name: &str, value: f64) -> Result<(), StorageError>;

    /// Add `delta` to the counter `name`, creating it at `delta`
    async fn set_counter(&self, name: &str, delta: i64) -> Result<(), StorageError>;

    async fn get_gauge(&self, name: &str) -> Result<f64, StorageError>;

    async fn get_counter(&self, name: &str) -> Result<i64, StorageError>;

    /// Merge the batch with [`super::merge_batch`] and apply it in one pass
    async fn insert_batch(&self, batch: &[MetricRecord]) -> Result<(), StorageError>;

    /// Store snapshot values as they are: counters take the recorded total
    /// instead of adding it. Invalid records are skipped; for a repeated
    /// metric the last record wins.
    async fn restore(&self, records: &[MetricRecord]) -> Result<(), StorageError>;

    /// Every stored metric, in no particular order
    async fn get_all(&self) -> Result<Vec<MetricRecord>, StorageError>;

    /// Liveness probe of the backend
    async fn ping(&self) -> Result<(), StorageError>;

    /// Release the backend connection
    async fn close(&self) -> Result<(), StorageError>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}
