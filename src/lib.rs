//! Telemetry forwarders for a simulated water-treatment monitoring
//! deployment.
//!
//! The crate ships two binaries, each a single poll loop that writes to an
//! InfluxDB-compatible time-series store:
//!
//! - `sensor-simulator` fabricates water-quality readings for one plant. The
//!   value model lives in [`sensor`]: a baseline shaped by time of day,
//!   jittered, clamped to a physical range and, rarely, spiked to simulate a
//!   faulty sensor. [`SensorSimulator`] turns one tick into a batch.
//! - `data-collector` samples the host it runs on ([`HostSampler`]), the
//!   local container runtime ([`ContainerSampler`]) and its reachability to
//!   the store ([`ConnectivityProbe`]). [`DataCollector`] turns one tick into
//!   a batch.
//!
//! Both producers implement [`BatchSource`]. A [`PollLoop`] drives a source
//! into a [`Sink`] (normally [`InfluxSink`]): tick, produce, write, sleep,
//! repeat, until Ctrl-C. Failures are logged and counted, never fatal.
//!
//! Data flows as plain [`Point`] records grouped into a [`Batch`]. A batch
//! owns the tracing span of the tick that produced it, so the write that
//! consumes it is traced as part of that tick.
//!
//! The binaries set up tracing with [`init_tracing`] and, when asked to,
//! expose their own counters with [`init_metrics`].

pub(crate) mod metrics;
pub use metrics::init_metrics;

mod batch;
pub use batch::Batch;

mod clock;
pub use clock::SimulationClock;

pub mod collector;
pub use collector::{CollectedMetrics, DataCollector, Metrics};

pub mod config;

pub mod connectivity;
pub use connectivity::{ConnectivityProbe, ConnectivityReport};

pub mod docker;
pub use docker::ContainerSampler;

mod host;
pub use host::HostSampler;

pub mod point;
pub use point::{FieldValue, Point};

mod poll;
pub use poll::{BatchSource, LoopStats, PollLoop, ReconnectPolicy};

pub mod sensor;
pub use sensor::{SensorBaseline, SensorSpec, TimeShaping};

pub mod simulator;
pub use simulator::{PlantIdentity, SensorSimulator};

pub mod sink;
pub use sink::{InfluxSink, Sink, SinkConfig, SinkError};

mod trace;
pub use trace::init_tracing;
