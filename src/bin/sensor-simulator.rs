//! Simulates the water-quality sensors of one treatment plant.

use clap::Parser;
use tracing::info;
use water_telemetry::{
    InfluxSink, PlantIdentity, PollLoop, SensorBaseline, SensorSimulator, config::SimulatorArgs,
    init_metrics, init_tracing,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = SimulatorArgs::parse();

    // Set up the tracing.
    let provider = init_tracing("sensor-simulator")?;
    if let Some(port) = args.run.metrics_port {
        init_metrics(port)?;
        info!(port, "Serving loop metrics");
    }

    let plant = PlantIdentity::new(args.plant_id, args.plant_name, args.location);
    info!(
        plant_id = %plant.id,
        plant_name = %plant.name,
        location = %plant.location,
        interval_secs = args.run.interval,
        "Starting sensor simulation"
    );

    let simulator = SensorSimulator::new(plant, SensorBaseline::water_plant());
    let sink = InfluxSink::new(args.sink.sink_config())?;

    PollLoop::new(simulator, sink, args.run.interval())
        .with_reconnect(args.sink.reconnect)
        .run()
        .await;

    // Flush any remaining spans before exiting.
    provider.shutdown().map_err(Into::into)
}
