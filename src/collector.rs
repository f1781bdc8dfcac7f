//! The data collector: host, container and connectivity samples for one
//! plant, assembled into a batch.

use crate::{
    Batch, BatchSource, ConnectivityProbe, ConnectivityReport, ContainerSampler, HostSampler,
    Point, SimulationClock,
    point::{CONNECTIVITY_METRICS, DOCKER_METRICS, PLANT_STATUS, SYSTEM_METRICS},
    simulator::OPERATIONAL,
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use tracing::info;
use url::Url;

/// Named metric values from one sampling source.
pub type Metrics = BTreeMap<String, f64>;

/// Everything sampled during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedMetrics {
    /// Host counters.
    pub system: Metrics,
    /// Container-runtime counters. Empty when the runtime is unavailable.
    pub docker: Metrics,
    /// Reachability of the sink host.
    pub connectivity: ConnectivityReport,
}

/// Build the collector's points: one per metric, tagged with `plant_id` and
/// `metric_type`, followed by a `plant_status` point.
pub fn assemble(
    plant_id: &str,
    collected: &CollectedMetrics,
    captured_at: DateTime<Utc>,
) -> Vec<Point> {
    let connectivity = collected.connectivity.to_metrics();
    let sources = [
        (SYSTEM_METRICS, &collected.system),
        (DOCKER_METRICS, &collected.docker),
        (CONNECTIVITY_METRICS, &connectivity),
    ];

    let mut points: Vec<Point> = sources
        .into_iter()
        .flat_map(|(measurement, metrics)| {
            metrics.iter().map(move |(name, value)| {
                Point::new(measurement, captured_at)
                    .tag("plant_id", plant_id)
                    .tag("metric_type", name)
                    .field("value", *value)
            })
        })
        .collect();

    points.push(
        Point::new(PLANT_STATUS, captured_at)
            .tag("plant_id", plant_id)
            .field("status", OPERATIONAL)
            .field(
                "last_collection",
                captured_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ),
    );
    points
}

/// Samples the host and forwards the results for one plant.
pub struct DataCollector {
    plant_id: String,
    target: Url,
    host: HostSampler,
    containers: ContainerSampler,
    probe: ConnectivityProbe,
}

impl DataCollector {
    /// Create a collector for `plant_id` that checks connectivity to
    /// `target` (normally the sink URL).
    pub fn new(
        plant_id: impl Into<String>,
        target: Url,
        host: HostSampler,
        containers: ContainerSampler,
        probe: ConnectivityProbe,
    ) -> Self {
        Self {
            plant_id: plant_id.into(),
            target,
            host,
            containers,
            probe,
        }
    }

    /// Sample every source once. Sources run one after another.
    pub async fn collect(&mut self) -> CollectedMetrics {
        let system = self.host.sample().await;
        let docker = self.containers.sample().await;
        let connectivity = self.probe.probe(&self.target).await;

        info!(
            system = system.len(),
            docker = docker.len(),
            connectivity = connectivity.to_metrics().len(),
            "Collected metrics"
        );

        CollectedMetrics {
            system,
            docker,
            connectivity,
        }
    }
}

impl BatchSource for DataCollector {
    const NAME: &'static str = "data_collector";

    async fn produce(
        &mut self,
        _clock: &SimulationClock,
        captured_at: DateTime<Utc>,
    ) -> eyre::Result<Batch> {
        let collected = self.collect().await;
        let points = assemble(&self.plant_id, &collected, captured_at);
        Ok(Batch::new(points, captured_at, tracing::Span::current()))
    }
}
