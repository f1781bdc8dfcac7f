//! Reading batch assembly for the sensor simulator.

use crate::{
    Batch, BatchSource, Point, SensorBaseline, SimulationClock,
    point::{PLANT_STATUS, WATER_METRICS},
};
use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, info, instrument};

/// Literal status reported by the simulated plant.
pub const OPERATIONAL: &str = "operational";

/// Who the readings belong to. Every point is tagged with this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlantIdentity {
    /// Short identifier, e.g. `A`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form location.
    pub location: String,
}

impl PlantIdentity {
    /// Create a new plant identity.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location: location.into(),
        }
    }

    fn tag(&self, point: Point) -> Point {
        point
            .tag("plant_id", &self.id)
            .tag("plant_name", &self.name)
            .tag("location", &self.location)
    }
}

/// Fabricates one reading per configured sensor each tick.
pub struct SensorSimulator<R = StdRng> {
    plant: PlantIdentity,
    baseline: SensorBaseline,
    rng: R,
}

impl SensorSimulator {
    /// Create a simulator seeded from OS entropy.
    pub fn new(plant: PlantIdentity, baseline: SensorBaseline) -> Self {
        Self::with_rng(plant, baseline, StdRng::from_entropy())
    }
}

impl<R: Rng> SensorSimulator<R> {
    /// Create a simulator drawing from `rng`.
    pub fn with_rng(plant: PlantIdentity, baseline: SensorBaseline, rng: R) -> Self {
        Self {
            plant,
            baseline,
            rng,
        }
    }

    /// The plant this simulator reports for.
    pub fn plant(&self) -> &PlantIdentity {
        &self.plant
    }

    /// Build the points for one tick: a `water_metrics` point per sensor, in
    /// table order, then one `plant_status` point. All share `captured_at`.
    #[instrument(skip_all, name = "Assembling readings")]
    pub fn assemble(&mut self, clock: &SimulationClock, captured_at: DateTime<Utc>) -> Vec<Point> {
        let mut points = Vec::with_capacity(self.baseline.len() + 1);
        let mut anomalies = 0usize;

        for spec in self.baseline.iter() {
            let sample = spec.sample(clock, &mut self.rng);
            anomalies += usize::from(sample.is_anomaly());
            debug!(sensor = spec.id, value = sample.value, "Generated reading");

            let point = Point::new(WATER_METRICS, captured_at)
                .tag("sensor_type", spec.id)
                .field("value", sample.value);
            points.push(self.plant.tag(point));
        }

        let uptime: f64 = self.rng.gen_range(95.0..=100.0);
        let status = Point::new(PLANT_STATUS, captured_at)
            .field("status", OPERATIONAL)
            .field("uptime_hours", uptime);
        points.push(self.plant.tag(status));

        info!(
            readings = self.baseline.len(),
            anomalies,
            hour = clock.hour(),
            day = clock.elapsed_days(),
            "Generated readings"
        );
        points
    }
}

impl<R: Rng> BatchSource for SensorSimulator<R> {
    const NAME: &'static str = "sensor_simulator";

    async fn produce(
        &mut self,
        clock: &SimulationClock,
        captured_at: DateTime<Utc>,
    ) -> eyre::Result<Batch> {
        let points = self.assemble(clock, captured_at);
        Ok(Batch::new(points, captured_at, tracing::Span::current()))
    }
}
