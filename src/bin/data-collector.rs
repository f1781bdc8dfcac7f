//! Forwards host, container and connectivity metrics for one plant.

use clap::Parser;
use tracing::info;
use water_telemetry::{
    ConnectivityProbe, ContainerSampler, DataCollector, HostSampler, InfluxSink, PollLoop,
    config::CollectorArgs, init_metrics, init_tracing,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = CollectorArgs::parse();

    // Set up the tracing.
    let provider = init_tracing("data-collector")?;
    if let Some(port) = args.run.metrics_port {
        init_metrics(port)?;
        info!(port, "Serving loop metrics");
    }

    info!(
        plant_id = %args.plant_id,
        interval_secs = args.run.interval,
        "Starting data collection"
    );

    let collector = DataCollector::new(
        args.plant_id,
        args.sink.url.clone(),
        HostSampler::default(),
        ContainerSampler::connect(),
        ConnectivityProbe::new()?,
    );
    let sink = InfluxSink::new(args.sink.sink_config())?;

    PollLoop::new(collector, sink, args.run.interval())
        .with_reconnect(args.sink.reconnect)
        .run()
        .await;

    // Flush any remaining spans before exiting.
    provider.shutdown().map_err(Into::into)
}
