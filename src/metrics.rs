//! Self-metrics for the poll loops. Check the docs for [`init_metrics`].

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{sync::LazyLock, time::Duration};

const TICKS: &str = "water_telemetry.ticks";
const TICKS_DESC: &str = "The total number of poll loop ticks";

const BATCHES_BUILT: &str = "water_telemetry.batches_built";
const BATCHES_BUILT_DESC: &str = "The total number of batches assembled";

const BATCHES_LIVE: &str = "water_telemetry.batches_live";
const BATCHES_LIVE_DESC: &str = "The number of batches currently held in memory";

const BATCHES_WRITTEN: &str = "water_telemetry.batches_written";
const BATCHES_WRITTEN_DESC: &str = "The total number of batches accepted by the sink";

const BATCHES_FAILED: &str = "water_telemetry.batches_failed";
const BATCHES_FAILED_DESC: &str = "The total number of ticks that did not deliver a batch";

const POINTS_WRITTEN: &str = "water_telemetry.points_written";
const POINTS_WRITTEN_DESC: &str = "The total number of points accepted by the sink";

const SINK_CONNECTED: &str = "water_telemetry.sink_connected";
const SINK_CONNECTED_DESC: &str = "1 while the sink handle is live, 0 otherwise";

const TICK_DURATION: &str = "water_telemetry.tick_duration_seconds";
const TICK_DURATION_DESC: &str = "Time spent producing and writing one batch";

static DESCRIBE: LazyLock<()> = LazyLock::new(|| {
    metrics::describe_counter!(TICKS, TICKS_DESC);
    metrics::describe_counter!(BATCHES_BUILT, BATCHES_BUILT_DESC);
    metrics::describe_gauge!(BATCHES_LIVE, BATCHES_LIVE_DESC);
    metrics::describe_counter!(BATCHES_WRITTEN, BATCHES_WRITTEN_DESC);
    metrics::describe_counter!(BATCHES_FAILED, BATCHES_FAILED_DESC);
    metrics::describe_counter!(POINTS_WRITTEN, POINTS_WRITTEN_DESC);
    metrics::describe_gauge!(SINK_CONNECTED, SINK_CONNECTED_DESC);
    metrics::describe_histogram!(TICK_DURATION, metrics::Unit::Seconds, TICK_DURATION_DESC);
});

pub(crate) fn record_batch() {
    counter!(BATCHES_BUILT).increment(1);
    gauge!(BATCHES_LIVE).increment(1);
}

pub(crate) fn release_batch() {
    gauge!(BATCHES_LIVE).decrement(1);
}

pub(crate) fn record_tick(source: &'static str, elapsed: Duration) {
    counter!(TICKS, "source" => source).increment(1);
    histogram!(TICK_DURATION, "source" => source).record(elapsed.as_secs_f64());
}

pub(crate) fn record_write(source: &'static str, points: usize) {
    counter!(BATCHES_WRITTEN, "source" => source).increment(1);
    counter!(POINTS_WRITTEN, "source" => source).increment(points as u64);
}

pub(crate) fn record_failure(source: &'static str) {
    counter!(BATCHES_FAILED, "source" => source).increment(1);
}

pub(crate) fn set_sink_connected(connected: bool) {
    gauge!(SINK_CONNECTED).set(if connected { 1.0 } else { 0.0 });
}

/// Install a prometheus metrics exporter on the given port.
///
/// These are metrics about the loops themselves, not the telemetry they
/// forward. The telemetry goes to the time-series sink; this endpoint exists
/// so an operator can alert on a simulator or collector that has stopped
/// delivering.
///
/// ## Metrics in this program
///
/// - `water_telemetry.ticks` (counter): ticks run, labeled by `source`.
/// - `water_telemetry.batches_built` (counter): batches assembled.
/// - `water_telemetry.batches_live` (gauge): batches currently in memory.
///   Anything above 1 means a batch is being held past its write.
/// - `water_telemetry.batches_written` (counter): batches the sink accepted.
/// - `water_telemetry.batches_failed` (counter): ticks that did not deliver,
///   whether production, connection or the write itself failed.
/// - `water_telemetry.points_written` (counter): points the sink accepted.
/// - `water_telemetry.sink_connected` (gauge): 1 when the sink is connected.
/// - `water_telemetry.tick_duration_seconds` (histogram): produce + write
///   time per tick.
///
/// Visit `http://localhost:<port>/` or `curl` it to see the raw data in the
/// [Prometheus exposition format].
///
/// When no exporter is installed the [`metrics`] macros are no-ops, so the
/// loops record unconditionally.
///
/// [Prometheus exposition format]: https://prometheus.io/docs/instrumenting/exposition_formats/
pub fn init_metrics(port: u16) -> eyre::Result<u16> {
    LazyLock::force(&DESCRIBE);
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()?;
    Ok(port)
}
