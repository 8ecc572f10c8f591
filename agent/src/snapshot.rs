//! Latest metric values held by the agent
//!
//! The poll loop writes, report tasks copy out. The lock is only held for
//! the copy, never across encoding or I/O.

use metrics_core::MetricRecord;
use parking_lot::Mutex;
use rand::Rng;

use crate::collector::RuntimeSample;

/// Accessor of one gauge in a [`RuntimeSample`]
pub type GaugeAccessor = fn(&RuntimeSample) -> f64;

/// Gauges of the agent process, reported on every cycle
pub static RUNTIME_GAUGES: &[(&str, GaugeAccessor)] = &[
    ("ProcessResidentMemory", |s: &RuntimeSample| s.process_resident as f64),
    ("ProcessVirtualMemory", |s: &RuntimeSample| s.process_virtual as f64),
    ("ProcessCPUUsage", |s: &RuntimeSample| f64::from(s.process_cpu)),
    ("ProcessRunTime", |s: &RuntimeSample| s.process_run_time as f64),
    ("ProcessDiskRead", |s: &RuntimeSample| s.process_disk_read as f64),
    ("ProcessDiskWritten", |s: &RuntimeSample| s.process_disk_written as f64),
];

/// Host gauges, reported when OS-level sampling is on
pub static SYSTEM_GAUGES: &[(&str, GaugeAccessor)] = &[
    ("TotalMemory", |s: &RuntimeSample| s.total_memory as f64),
    ("FreeMemory", |s: &RuntimeSample| s.available_memory as f64),
    ("UsedMemory", |s: &RuntimeSample| s.used_memory as f64),
    ("TotalSwap", |s: &RuntimeSample| s.total_swap as f64),
    ("UsedSwap", |s: &RuntimeSample| s.used_swap as f64),
];

pub const RANDOM_VALUE: &str = "RandomValue";
pub const POLL_COUNT: &str = "PollCount";
/// Prefix of the per-CPU gauges, numbered from 1
pub const CPU_UTILIZATION: &str = "CPUutilization";

#[derive(Debug, Default, Clone)]
struct SnapshotState {
    sample: RuntimeSample,
    random_value: f64,
    poll_count: i64,
    polled: bool,
}

/// Shared snapshot of the most recent poll
pub struct AgentSnapshot {
    include_system: bool,
    state: Mutex<SnapshotState>,
}

impl AgentSnapshot {
    pub fn new(include_system: bool) -> Self {
        Self {
            include_system,
            state: Mutex::new(SnapshotState::default()),
        }
    }

    /// Store a new sample and bump the poll counter
    pub fn refresh(&self, sample: RuntimeSample) {
        let random_value = rand::thread_rng().gen::<f64>();
        let mut state = self.state.lock();
        state.sample = sample;
        state.random_value = random_value;
        state.poll_count = state.poll_count.wrapping_add(1);
        state.polled = true;
    }

    pub fn poll_count(&self) -> i64 {
        self.state.lock().poll_count
    }

    /// Copy the snapshot out as metric records; empty before the first poll
    pub fn records(&self) -> Vec<MetricRecord> {
        let state = self.state.lock().clone();
        if !state.polled {
            return Vec::new();
        }

        let mut records: Vec<MetricRecord> = RUNTIME_GAUGES
            .iter()
            .map(|(name, get)| MetricRecord::gauge(*name, get(&state.sample)))
            .collect();

        if self.include_system {
            records.extend(
                SYSTEM_GAUGES
                    .iter()
                    .map(|(name, get)| MetricRecord::gauge(*name, get(&state.sample))),
            );
            records.extend(state.sample.cpu_usage.iter().enumerate().map(|(i, usage)| {
                MetricRecord::gauge(format!("{}{}", CPU_UTILIZATION, i + 1), f64::from(*usage))
            }));
        }

        records.push(MetricRecord::gauge(RANDOM_VALUE, state.random_value));
        records.push(MetricRecord::counter(POLL_COUNT, state.poll_count));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_core::MetricKind;

    fn sample() -> RuntimeSample {
        RuntimeSample {
            process_resident: 4096,
            total_memory: 1 << 30,
            cpu_usage: vec![12.5, 50.0],
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_before_first_poll() {
        assert!(AgentSnapshot::new(true).records().is_empty());
    }

    #[test]
    fn test_poll_count_increments() {
        let snapshot = AgentSnapshot::new(false);
        snapshot.refresh(sample());
        snapshot.refresh(sample());
        snapshot.refresh(sample());

        let records = snapshot.records();
        let poll_count = records.iter().find(|r| r.id == POLL_COUNT).unwrap();
        assert_eq!(poll_count.kind, MetricKind::Counter);
        assert_eq!(poll_count.delta, Some(3));
    }

    #[test]
    fn test_records_cover_tables() {
        let snapshot = AgentSnapshot::new(true);
        snapshot.refresh(sample());
        let records = snapshot.records();

        // runtime + system + two cpus + RandomValue + PollCount
        assert_eq!(
            records.len(),
            RUNTIME_GAUGES.len() + SYSTEM_GAUGES.len() + 2 + 2
        );
        for record in &records {
            assert!(record.validate().is_ok(), "{:?}", record);
        }

        let cpu2 = records.iter().find(|r| r.id == "CPUutilization2").unwrap();
        assert_eq!(cpu2.value, Some(50.0));
        let rss = records.iter().find(|r| r.id == "ProcessResidentMemory").unwrap();
        assert_eq!(rss.value, Some(4096.0));
        let random = records.iter().find(|r| r.id == RANDOM_VALUE).unwrap();
        assert!((0.0..1.0).contains(&random.value.unwrap()));
    }

    #[test]
    fn test_system_gauges_optional() {
        let snapshot = AgentSnapshot::new(false);
        snapshot.refresh(sample());
        let records = snapshot.records();
        assert!(records.iter().all(|r| r.id != "TotalMemory"));
        assert!(records.iter().all(|r| !r.id.starts_with(CPU_UTILIZATION)));
    }
}
