use async_trait::async_trait;
use metrics_core::{MetricKind, MetricRecord};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{merge_batch, MetricStorage, StorageError};

#[derive(Debug, Default)]
struct Metrics {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

impl Metrics {
    fn apply(&mut self, record: &MetricRecord) {
        match record.kind {
            MetricKind::Gauge => {
                if let Some(value) = record.value {
                    self.gauges.insert(record.id.clone(), value);
                }
            }
            MetricKind::Counter => {
                if let Some(delta) = record.delta {
                    let total = self.counters.entry(record.id.clone()).or_insert(0);
                    *total = total.wrapping_add(delta);
                }
            }
        }
    }
}

/// In-process metric store guarded by a single lock
#[derive(Debug, Default)]
pub struct MemoryStorage {
    metrics: RwLock<Metrics>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricStorage for MemoryStorage {
    async fn set_gauge(&self, name: &str, value: f64) -> Result<(), StorageError> {
        self.metrics
            .write()
            .await
            .gauges
            .insert(name.to_string(), value);
        Ok(())
    }

    async fn set_counter(&self, name: &str, delta: i64) -> Result<(), StorageError> {
        let mut metrics = self.metrics.write().await;
        let total = metrics.counters.entry(name.to_string()).or_insert(0);
        *total = total.wrapping_add(delta);
        Ok(())
    }

    async fn get_gauge(&self, name: &str) -> Result<f64, StorageError> {
        self.metrics
            .read()
            .await
            .gauges
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    async fn get_counter(&self, name: &str) -> Result<i64, StorageError> {
        self.metrics
            .read()
            .await
            .counters
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    async fn insert_batch(&self, batch: &[MetricRecord]) -> Result<(), StorageError> {
        let merged = merge_batch(batch);
        if merged.is_empty() {
            return Ok(());
        }
        let mut metrics = self.metrics.write().await;
        for record in &merged {
            metrics.apply(record);
        }
        Ok(())
    }

    async fn restore(&self, records: &[MetricRecord]) -> Result<(), StorageError> {
        let mut metrics = self.metrics.write().await;
        for record in records.iter().filter(|r| r.validate().is_ok()) {
            match record.kind {
                MetricKind::Gauge => {
                    if let Some(value) = record.value {
                        metrics.gauges.insert(record.id.clone(), value);
                    }
                }
                MetricKind::Counter => {
                    if let Some(delta) = record.delta {
                        metrics.counters.insert(record.id.clone(), delta);
                    }
                }
            }
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<MetricRecord>, StorageError> {
        let metrics = self.metrics.read().await;
        let gauges = metrics
            .gauges
            .iter()
            .map(|(name, value)| MetricRecord::gauge(name.clone(), *value));
        let counters = metrics
            .counters
            .iter()
            .map(|(name, delta)| MetricRecord::counter(name.clone(), *delta));
        Ok(gauges.chain(counters).collect())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
