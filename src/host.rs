//! Host monitoring code. This module contains the [`HostSampler`] struct.

use crate::Metrics;
use std::path::Path;
use sysinfo::{Disks, Networks, ProcessesToUpdate, System};
use tracing::{instrument, trace, warn};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Samples CPU, memory, root filesystem, disk I/O, network and process
/// counters from the host.
pub struct HostSampler {
    system: System,
    counter: u64,
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new(System::new_all())
    }
}

impl HostSampler {
    /// Create a new sampler over `system`.
    pub fn new(system: System) -> Self {
        Self { system, counter: 0 }
    }

    /// Number of samples taken so far.
    pub fn samples_taken(&self) -> u64 {
        self.counter
    }

    /// Take one sample of the host.
    ///
    /// CPU usage is a difference between two refreshes, so this waits
    /// [`sysinfo::MINIMUM_CPU_UPDATE_INTERVAL`] between them.
    #[instrument(skip(self), name = "Sampling host")]
    pub async fn sample(&mut self) -> Metrics {
        let mut metrics = Metrics::new();

        self.system.refresh_cpu_all();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        self.system.refresh_cpu_all();
        trace!("Refreshed CPU information");

        let cpus = self.system.cpus();
        metrics.insert("cpu_percent".into(), self.system.global_cpu_usage() as f64);
        metrics.insert("cpu_count".into(), cpus.len() as f64);
        metrics.insert(
            "cpu_freq_mhz".into(),
            cpus.first().map(|cpu| cpu.frequency() as f64).unwrap_or(0.0),
        );

        self.system.refresh_memory();
        let total = self.system.total_memory();
        let used = self.system.used_memory();
        metrics.insert("memory_percent".into(), percent(used, total));
        metrics.insert("memory_used_gb".into(), used as f64 / GIB);
        metrics.insert("memory_total_gb".into(), total as f64 / GIB);

        let disks = Disks::new_with_refreshed_list();
        match disks
            .iter()
            .find(|disk| disk.mount_point() == Path::new("/"))
        {
            Some(root) => {
                let total = root.total_space();
                let used = total.saturating_sub(root.available_space());
                metrics.insert("disk_percent".into(), percent(used, total));
                metrics.insert("disk_used_gb".into(), used as f64 / GIB);
                metrics.insert("disk_total_gb".into(), total as f64 / GIB);
            }
            None => warn!("No root filesystem found, skipping disk usage"),
        }

        let (read, written) = disks.iter().fold((0u64, 0u64), |(r, w), disk| {
            let usage = disk.usage();
            (
                r.saturating_add(usage.total_read_bytes),
                w.saturating_add(usage.total_written_bytes),
            )
        });
        metrics.insert("disk_read_mb".into(), read as f64 / MIB);
        metrics.insert("disk_write_mb".into(), written as f64 / MIB);

        let networks = Networks::new_with_refreshed_list();
        let (sent, received) = networks.iter().fold((0u64, 0u64), |(s, r), (_, data)| {
            (
                s.saturating_add(data.total_transmitted()),
                r.saturating_add(data.total_received()),
            )
        });
        metrics.insert("network_sent_mb".into(), sent as f64 / MIB);
        metrics.insert("network_recv_mb".into(), received as f64 / MIB);

        self.system.refresh_processes(ProcessesToUpdate::All, true);
        metrics.insert(
            "process_count".into(),
            self.system.processes().len() as f64,
        );

        self.counter = self.counter.wrapping_add(1);

        metrics
    }
}

/// `part / whole` as a percentage, 0 when `whole` is 0.
fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_handles_zero() {
        assert_eq!(percent(5, 0), 0.0);
        assert_eq!(percent(1, 4), 25.0);
    }

    #[tokio::test]
    async fn samples_core_host_metrics() {
        let mut sampler = HostSampler::default();
        let metrics = sampler.sample().await;

        for key in [
            "cpu_percent",
            "cpu_count",
            "memory_percent",
            "memory_total_gb",
            "network_sent_mb",
            "process_count",
        ] {
            assert!(metrics.contains_key(key), "missing {key}");
        }
        assert!(metrics["cpu_count"] >= 1.0);
        assert!((0.0..=100.0).contains(&metrics["memory_percent"]));
        assert_eq!(sampler.samples_taken(), 1);
    }
}
