//! Sampling of process and host metrics through `sysinfo`

use sysinfo::{Pid, System};
use tracing::{debug, warn};

/// One reading of everything the agent reports
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeSample {
    /// Resident set size of the agent process, bytes
    pub process_resident: u64,
    /// Virtual memory of the agent process, bytes
    pub process_virtual: u64,
    /// CPU usage of the agent process, percent
    pub process_cpu: f32,
    /// Seconds since the agent process started
    pub process_run_time: u64,
    pub process_disk_read: u64,
    pub process_disk_written: u64,

    /// Zero when OS-level sampling is off
    pub total_memory: u64,
    pub available_memory: u64,
    pub used_memory: u64,
    pub total_swap: u64,
    pub used_swap: u64,
    /// Usage per logical CPU, percent; empty when OS-level sampling is off
    pub cpu_usage: Vec<f32>,
}

/// Source of [`RuntimeSample`]s
pub trait Collector: Send + Sync {
    fn sample(&mut self) -> RuntimeSample;
}

/// Collector backed by the host's process table
pub struct SystemCollector {
    sys: System,
    pid: Option<Pid>,
    collect_system: bool,
}

impl SystemCollector {
    pub fn new(collect_system: bool) -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("Cannot resolve own pid, process metrics disabled: {}", e);
                None
            }
        };
        Self {
            sys: System::new(),
            pid,
            collect_system,
        }
    }
}

impl Collector for SystemCollector {
    fn sample(&mut self) -> RuntimeSample {
        let mut sample = RuntimeSample::default();

        if let Some(pid) = self.pid {
            if self.sys.refresh_process(pid) {
                if let Some(process) = self.sys.process(pid) {
                    let disk = process.disk_usage();
                    sample.process_resident = process.memory();
                    sample.process_virtual = process.virtual_memory();
                    sample.process_cpu = process.cpu_usage();
                    sample.process_run_time = process.run_time();
                    sample.process_disk_read = disk.total_read_bytes;
                    sample.process_disk_written = disk.total_written_bytes;
                }
            }
        }

        if self.collect_system {
            self.sys.refresh_memory();
            self.sys.refresh_cpu();
            sample.total_memory = self.sys.total_memory();
            sample.available_memory = self.sys.available_memory();
            sample.used_memory = self.sys.used_memory();
            sample.total_swap = self.sys.total_swap();
            sample.used_swap = self.sys.used_swap();
            sample.cpu_usage = self.sys.cpus().iter().map(|cpu| cpu.cpu_usage()).collect();
        }

        debug!(
            "Sampled process rss={} cpus={}",
            sample.process_resident,
            sample.cpu_usage.len()
        );
        sample
    }
}
