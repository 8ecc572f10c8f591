//! Poll and report loop of the agent
//!
//! A single loop drives two timers. Poll ticks refresh the snapshot inline;
//! report ticks hand the work to a tracked task, at most `rate_limit` of
//! them at a time. A tick that finds no free slot is skipped and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::time::{interval_at, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::collector::{Collector, SystemCollector};
use crate::config::AgentConfig;
use crate::encoder::BatchEncoder;
use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::snapshot::AgentSnapshot;
use crate::transport::{HttpTransport, Transport};

/// Encodes the snapshot and delivers it with retry
pub struct Reporter {
    encoder: BatchEncoder,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl Reporter {
    pub fn new(encoder: BatchEncoder, transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        Self {
            encoder,
            transport,
            retry,
        }
    }

    /// Send the current snapshot, returning how many records went out
    pub async fn report(&self, snapshot: &AgentSnapshot) -> Result<usize> {
        let records = snapshot.records();
        if records.is_empty() {
            debug!("Nothing to report yet");
            return Ok(0);
        }
        let batch = self.encoder.encode(&records)?;
        self.retry.run(|| self.transport.send(&batch)).await?;
        Ok(records.len())
    }
}

pub struct Agent {
    config: AgentConfig,
    collector: Box<dyn Collector>,
    snapshot: Arc<AgentSnapshot>,
    reporter: Arc<Reporter>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    skipped: Arc<AtomicU64>,
}

impl Agent {
    /// Build the agent with the host collector and the HTTP transport
    pub fn new(config: AgentConfig) -> Result<Self> {
        let collector = Box::new(SystemCollector::new(config.collect_system));
        let encoder = BatchEncoder::from_config(&config.key, &config.crypto_key)?;
        let transport = Arc::new(HttpTransport::new(&config.address, config.request_timeout)?);
        let reporter = Reporter::new(encoder, transport, RetryPolicy::default());
        Ok(Self::with_parts(config, collector, reporter))
    }

    pub fn with_parts(config: AgentConfig, collector: Box<dyn Collector>, reporter: Reporter) -> Self {
        let snapshot = Arc::new(AgentSnapshot::new(config.collect_system));
        let permits = Arc::new(Semaphore::new(config.rate_limit));
        Self {
            config,
            collector,
            snapshot,
            reporter: Arc::new(reporter),
            permits,
            tracker: TaskTracker::new(),
            skipped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn snapshot(&self) -> Arc<AgentSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Count of report cycles dropped because every slot was busy
    pub fn skipped_reports(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.skipped)
    }

    /// Run until `cancel` fires, then wait for in-flight reports
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            "Agent started: poll every {:?}, report every {:?}, rate limit {}",
            self.config.poll_interval, self.config.report_interval, self.config.rate_limit
        );

        self.poll();

        let start = tokio::time::Instant::now();
        let mut poll = interval_at(start + self.config.poll_interval, self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut report = interval_at(
            start + self.config.report_interval,
            self.config.report_interval,
        );
        report.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = poll.tick() => self.poll(),
                _ = report.tick() => self.dispatch_report(),
            }
        }

        self.drain().await;
    }

    fn poll(&mut self) {
        let sample = self.collector.sample();
        self.snapshot.refresh(sample);
    }

    fn dispatch_report(&self) {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                let skipped = self.skipped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "All {} report slots busy, skipping this cycle ({} skipped so far)",
                    self.config.rate_limit, skipped
                );
                return;
            }
        };

        let snapshot = Arc::clone(&self.snapshot);
        let reporter = Arc::clone(&self.reporter);
        self.tracker.spawn(async move {
            let started = Instant::now();
            match reporter.report(&snapshot).await {
                Ok(count) => debug!("Reported {} metrics in {:?}", count, started.elapsed()),
                Err(e) => error!("Report failed: {}", e),
            }
            drop(permit);
        });
    }

    async fn drain(&self) {
        self.tracker.close();
        let in_flight = self.tracker.len();
        if in_flight > 0 {
            info!("Waiting for {} in-flight reports", in_flight);
        }
        match timeout(self.config.shutdown_timeout, self.tracker.wait()).await {
            Ok(()) => info!("Agent stopped"),
            Err(_) => warn!(
                "Reports still in flight after {:?}, abandoning them",
                self.config.shutdown_timeout
            ),
        }
    }
}
