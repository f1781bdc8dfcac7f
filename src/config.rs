//! Command-line and environment configuration for both binaries.

use crate::{ReconnectPolicy, SinkConfig};
use clap::{Args, Parser};
use std::time::Duration;
use url::Url;

/// Sink destination. Every flag falls back to an environment variable.
#[derive(Debug, Clone, Args)]
pub struct SinkArgs {
    /// Base URL of the time-series store.
    #[arg(long = "influxdb-url", env = "INFLUXDB_URL", default_value = "http://localhost:8086")]
    pub url: Url,

    /// API token.
    #[arg(
        long = "influxdb-token",
        env = "INFLUXDB_TOKEN",
        default_value = "water_monitoring_token_2024",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub token: String,

    /// Organization.
    #[arg(long = "influxdb-org", env = "INFLUXDB_ORG", default_value = "water_treatment")]
    pub org: String,

    /// Destination bucket.
    #[arg(long = "influxdb-bucket", env = "INFLUXDB_BUCKET", default_value = "water_metrics")]
    pub bucket: String,

    /// Per-request timeout, in seconds.
    #[arg(long = "sink-timeout", env = "SINK_TIMEOUT", default_value_t = 10)]
    pub timeout_secs: u64,

    /// Whether to retry the sink connection on later ticks.
    #[arg(long, env = "SINK_RECONNECT", value_enum, default_value_t = ReconnectPolicy::EveryTick)]
    pub reconnect: ReconnectPolicy,
}

impl SinkArgs {
    /// The sink configuration these arguments describe.
    pub fn sink_config(&self) -> SinkConfig {
        SinkConfig {
            url: self.url.clone(),
            token: self.token.clone(),
            org: self.org.clone(),
            bucket: self.bucket.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Loop timing and self-observability.
#[derive(Debug, Clone, Args)]
pub struct LoopArgs {
    /// Seconds between ticks.
    #[arg(
        long,
        env = "COLLECTION_INTERVAL",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval: u64,

    /// Expose loop metrics for Prometheus on this port.
    #[arg(long, env = "METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

impl LoopArgs {
    /// The tick interval.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}

/// Water treatment plant sensor simulator.
#[derive(Debug, Clone, Parser)]
#[command(name = "sensor-simulator", version)]
pub struct SimulatorArgs {
    /// Plant identifier (A, B, etc.).
    #[arg(long)]
    pub plant_id: String,

    /// Plant name.
    #[arg(long)]
    pub plant_name: String,

    /// Plant location.
    #[arg(long)]
    pub location: String,

    #[command(flatten)]
    pub run: LoopArgs,

    #[command(flatten)]
    pub sink: SinkArgs,
}

/// Water treatment plant data collector.
#[derive(Debug, Clone, Parser)]
#[command(name = "data-collector", version)]
pub struct CollectorArgs {
    /// Plant identifier (A, B, etc.).
    #[arg(long)]
    pub plant_id: String,

    #[command(flatten)]
    pub run: LoopArgs,

    #[command(flatten)]
    pub sink: SinkArgs,
}
