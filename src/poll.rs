//! The poll loop: tick, produce a batch, write it, sleep, repeat.

use crate::{Batch, SimulationClock, Sink};
use chrono::{DateTime, Utc};
use std::{future::Future, time::Duration};
use tokio::time::Instant;
use tracing::{Instrument, error, info, info_span, warn};

/// Something that produces one batch per tick.
pub trait BatchSource {
    /// Short name, used as a metrics label and in logs.
    const NAME: &'static str;

    /// Produce the batch for this tick. Every point must carry
    /// `captured_at`. The batch should be created under the current span.
    fn produce(
        &mut self,
        clock: &SimulationClock,
        captured_at: DateTime<Utc>,
    ) -> impl Future<Output = eyre::Result<Batch>>;
}

/// What to do when the sink is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReconnectPolicy {
    /// Only connect at startup. A failed startup connection disables writes
    /// for the rest of the run.
    Never,
    /// While disconnected, try to connect again at every tick.
    #[default]
    EveryTick,
}

/// Whether the loop currently holds a live sink handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    /// Last connect succeeded.
    Connected,
    /// Not yet connected, or the last connect failed.
    Disconnected,
}

/// Counters returned when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Ticks started.
    pub ticks: u64,
    /// Batches the sink accepted.
    pub batches_written: u64,
    /// Ticks that did not deliver a batch.
    pub batches_failed: u64,
}

/// Drives a [`BatchSource`] into a [`Sink`] at a fixed interval.
///
/// Each tick fully completes before the next starts. The interval is slept
/// after every tick, whatever its outcome. Failures are logged and counted;
/// nothing escapes the loop.
pub struct PollLoop<S, K> {
    source: S,
    sink: K,
    interval: Duration,
    reconnect: ReconnectPolicy,

    clock: SimulationClock,
    state: SinkState,
    stats: LoopStats,
}

impl<S, K> PollLoop<S, K>
where
    S: BatchSource,
    K: Sink,
{
    /// Create a new loop that ticks every `interval`.
    pub fn new(source: S, sink: K, interval: Duration) -> Self {
        Self {
            source,
            sink,
            interval,
            reconnect: ReconnectPolicy::default(),
            clock: SimulationClock::from_local_now(),
            state: SinkState::Disconnected,
            stats: LoopStats::default(),
        }
    }

    /// Set the reconnect policy.
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> LoopStats {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(%err, "Unable to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `shutdown` resolves, then close the sink and return the
    /// counters. Shutdown is observed mid-tick as well as mid-sleep.
    pub async fn run_until<F>(mut self, shutdown: F) -> LoopStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!(
            source = S::NAME,
            interval_secs = self.interval.as_secs_f64(),
            reconnect = ?self.reconnect,
            "Starting poll loop"
        );

        let stopped = tokio::select! {
            biased;
            _ = &mut shutdown => true,
            _ = self.connect() => false,
        };

        if !stopped {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    _ = self.tick() => {}
                }

                tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        }

        info!(source = S::NAME, "Shutdown requested, stopping poll loop");
        self.sink.close().await;
        self.state = SinkState::Disconnected;
        crate::metrics::set_sink_connected(false);

        info!(
            ticks = self.stats.ticks,
            batches_written = self.stats.batches_written,
            batches_failed = self.stats.batches_failed,
            "Poll loop stopped"
        );
        self.stats
    }

    async fn connect(&mut self) {
        match self.sink.connect().await {
            Ok(()) => {
                info!(source = S::NAME, "Connected to sink");
                self.state = SinkState::Connected;
            }
            Err(err) => {
                error!(source = S::NAME, %err, "Failed to connect to sink");
                self.state = SinkState::Disconnected;
            }
        }
        crate::metrics::set_sink_connected(self.state == SinkState::Connected);
    }

    /// One iteration: advance the clock, produce, write.
    async fn tick(&mut self) {
        let tick_id = self.stats.ticks;
        self.stats.ticks += 1;

        // One root span per tick. The batch carries it to the sink.
        let span = info_span!("tick", source = S::NAME, tick_id);
        let started = Instant::now();

        self.clock.advance_to_local_now();
        let delivered = self.deliver().instrument(span).await;

        if delivered {
            self.stats.batches_written += 1;
        } else {
            self.stats.batches_failed += 1;
            crate::metrics::record_failure(S::NAME);
        }
        crate::metrics::record_tick(S::NAME, started.elapsed());
    }

    async fn deliver(&mut self) -> bool {
        let batch = match self.source.produce(&self.clock, Utc::now()).await {
            Ok(batch) => batch,
            Err(err) => {
                error!(%err, "Failed to produce batch");
                return false;
            }
        };

        if self.state == SinkState::Disconnected && self.reconnect == ReconnectPolicy::EveryTick {
            self.connect().await;
        }

        if self.state == SinkState::Disconnected {
            error!(points = batch.len(), "Sink not connected, dropping batch");
            return false;
        }

        match self.sink.write(&batch).await {
            Ok(()) => {
                info!(points = batch.len(), "Batch written");
                crate::metrics::record_write(S::NAME, batch.len());
                true
            }
            Err(err) => {
                warn!(points = batch.len(), %err, "Failed to write batch");
                false
            }
        }
    }
}
