//! Audit trail of batch writes
//!
//! Every successful batch write produces an [`AuditEvent`] that is handed to
//! all registered [`AuditSink`]s. Delivery is best effort: sink failures are
//! logged and never reach the request that triggered the event.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// One audited write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unix timestamp in seconds
    pub ts: i64,
    /// Names of the metrics carried by the request
    pub metrics: Vec<String>,
    pub ip_address: String,
}

impl AuditEvent {
    pub fn new(metrics: Vec<String>, ip_address: impl Into<String>) -> Self {
        Self {
            ts: chrono::Utc::now().timestamp(),
            metrics,
            ip_address: ip_address.into(),
        }
    }
}

/// On-disk layout of the audit file
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AuditLog {
    #[serde(default)]
    pub events: Vec<AuditEvent>,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Receiver of audit events
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;

    fn name(&self) -> &str;
}

/// Appends events to a JSON file of the form `{"events": [...]}`
pub struct FileAuditSink {
    path: PathBuf,
    // serialises read-modify-write cycles
    lock: Mutex<()>,
}

impl FileAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let _guard = self.lock.lock().await;

        let mut log = match tokio::fs::read(&self.path).await {
            Ok(data) if data.iter().all(u8::is_ascii_whitespace) => AuditLog::default(),
            Ok(data) => serde_json::from_slice::<AuditLog>(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AuditLog::default(),
            Err(e) => return Err(e.into()),
        };
        log.events.push(event.clone());

        tokio::fs::write(&self.path, serde_json::to_vec(&log)?).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// POSTs each event as JSON to a remote endpoint
pub struct UrlAuditSink {
    url: String,
    client: reqwest::Client,
}

impl UrlAuditSink {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl AuditSink for UrlAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.client
            .post(&self.url)
            .json(event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "url"
    }
}

/// Fan-out of audit events to the registered sinks
#[derive(Default)]
pub struct Auditor {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl Auditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the auditor from the configured file path and URL; empty values are skipped
    pub fn from_config(audit_file: &str, audit_url: &str) -> Self {
        let mut auditor = Self::new();
        if !audit_file.is_empty() {
            auditor.register(Arc::new(FileAuditSink::new(audit_file)));
        }
        if !audit_url.is_empty() {
            auditor.register(Arc::new(UrlAuditSink::new(audit_url)));
        }
        auditor
    }

    pub fn register(&mut self, sink: Arc<dyn AuditSink>) {
        debug!("Registered audit sink: {}", sink.name());
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver `event` to every sink and wait for all of them
    pub async fn record_all(&self, event: &AuditEvent) {
        let deliveries = self.sinks.iter().map(|sink| async move {
            if let Err(e) = sink.record(event).await {
                warn!("Audit sink '{}' failed: {}", sink.name(), e);
            }
        });
        futures::future::join_all(deliveries).await;
    }

    /// Deliver `event` in the background
    pub fn notify(self: &Arc<Self>, event: AuditEvent) {
        if self.is_empty() {
            return;
        }
        let auditor = Arc::clone(self);
        tokio::spawn(async move {
            auditor.record_all(&event).await;
        });
    }
}
