//! Container-runtime metrics. An unavailable runtime is not an error: the
//! sampler just reports nothing.

use crate::Metrics;
use tracing::instrument;

#[cfg(feature = "docker")]
use tracing::warn;

#[cfg(feature = "docker")]
const MIB: f64 = 1024.0 * 1024.0;

/// CPU usage of one container as a percentage of host capacity, from the
/// current and previous cumulative counters the runtime reports.
pub fn cpu_percent(total: u64, pre_total: u64, system: u64, pre_system: u64) -> f64 {
    let cpu_delta = total as f64 - pre_total as f64;
    let system_delta = system as f64 - pre_system as f64;
    if system_delta > 0.0 {
        cpu_delta / system_delta * 100.0
    } else {
        0.0
    }
}

/// Samples container counts and aggregate resource usage from the local
/// Docker daemon.
pub struct ContainerSampler {
    #[cfg(feature = "docker")]
    docker: Option<bollard::Docker>,
}

impl ContainerSampler {
    /// Create a sampler against the local daemon (socket or `DOCKER_HOST`).
    /// A client that cannot be configured leaves the sampler disabled.
    #[cfg(feature = "docker")]
    pub fn connect() -> Self {
        let docker = match bollard::Docker::connect_with_local_defaults() {
            Ok(docker) => Some(docker),
            Err(err) => {
                warn!(%err, "Container runtime client unavailable, skipping container metrics");
                None
            }
        };
        Self { docker }
    }

    /// Built without container support; the sampler is always empty.
    #[cfg(not(feature = "docker"))]
    pub fn connect() -> Self {
        tracing::debug!("Built without the docker feature, skipping container metrics");
        Self {}
    }

    /// A sampler that never reports anything.
    pub fn disabled() -> Self {
        Self {
            #[cfg(feature = "docker")]
            docker: None,
        }
    }

    /// Take one sample: `container_count`, `running_containers`,
    /// `total_cpu_usage` (percent) and `total_memory_usage` (MiB). Empty when
    /// the runtime is unavailable.
    #[cfg(feature = "docker")]
    #[instrument(skip(self), name = "Sampling containers")]
    pub async fn sample(&self) -> Metrics {
        match &self.docker {
            Some(docker) => sample_docker(docker).await,
            None => Metrics::new(),
        }
    }

    /// Always empty without the `docker` feature.
    #[cfg(not(feature = "docker"))]
    #[instrument(skip(self), name = "Sampling containers")]
    pub async fn sample(&self) -> Metrics {
        Metrics::new()
    }
}

#[cfg(feature = "docker")]
async fn sample_docker(docker: &bollard::Docker) -> Metrics {
    use bollard::container::{ListContainersOptions, StatsOptions};
    use futures::StreamExt;

    let mut metrics = Metrics::new();

    let options = ListContainersOptions::<String> {
        all: true,
        ..Default::default()
    };
    let containers = match docker.list_containers(Some(options)).await {
        Ok(containers) => containers,
        Err(err) => {
            warn!(%err, "Container runtime unavailable, skipping container metrics");
            return metrics;
        }
    };

    let running: Vec<_> = containers
        .iter()
        .filter(|c| c.state.as_deref() == Some("running"))
        .filter_map(|c| c.id.as_deref())
        .collect();

    let mut total_cpu = 0.0;
    let mut total_memory = 0.0;

    for &id in &running {
        let options = StatsOptions {
            stream: false,
            one_shot: false,
        };
        let mut stats = std::pin::pin!(docker.stats(id, Some(options)));
        match stats.next().await {
            Some(Ok(stats)) => {
                total_cpu += cpu_percent(
                    stats.cpu_stats.cpu_usage.total_usage,
                    stats.precpu_stats.cpu_usage.total_usage,
                    stats.cpu_stats.system_cpu_usage.unwrap_or(0),
                    stats.precpu_stats.system_cpu_usage.unwrap_or(0),
                );
                total_memory += stats.memory_stats.usage.unwrap_or(0) as f64 / MIB;
            }
            Some(Err(err)) => warn!(container = id, %err, "Failed to get container stats"),
            None => warn!(container = id, "Container stats stream ended early"),
        }
    }

    metrics.insert("container_count".into(), containers.len() as f64);
    metrics.insert("running_containers".into(), running.len() as f64);
    metrics.insert("total_cpu_usage".into(), total_cpu);
    metrics.insert("total_memory_usage".into(), total_memory);
    metrics
}
