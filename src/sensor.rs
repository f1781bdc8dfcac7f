//! The synthetic sensor value model.
//!
//! A reading is `base × time factor × random factor × (1 + noise)`, clamped
//! into the sensor's physical range, occasionally multiplied by an anomaly
//! factor, and rounded to three decimals.
//!
//! The arithmetic lives in [`compute`], which takes its random draws
//! explicitly. [`SensorSpec::sample`] makes the draws from an [`Rng`] and
//! hands them over, so the model can be exercised either exactly (fixed
//! draws) or statistically (seeded generator).

use crate::SimulationClock;
use rand::Rng;
use tracing::warn;

/// Probability that a single reading turns into an anomaly, for sensors that
/// declare an anomaly range.
pub const ANOMALY_PROBABILITY: f64 = 0.001;

/// Variation range used when a sensor does not declare one (±5%).
pub const DEFAULT_VARIATION: (f64, f64) = (0.95, 1.05);

/// Noise is drawn uniformly from `[-NOISE_AMPLITUDE, NOISE_AMPLITUDE]`.
pub const NOISE_AMPLITUDE: f64 = 0.02;

/// Daily-cycle shaping rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeShaping {
    /// Morning and evening demand peaks, low flow overnight.
    FlowRate,
    /// Warm afternoons, cool early mornings.
    Temperature,
    /// Small rise during the demand peaks.
    Ph,
    /// No daily cycle.
    Flat,
}

impl TimeShaping {
    /// The multiplicative factor for `hour` (0 through 23).
    pub fn factor(self, hour: u32) -> f64 {
        let morning_peak = (7..=9).contains(&hour);
        let evening_peak = (18..=20).contains(&hour);
        match self {
            Self::FlowRate if morning_peak => 1.15,
            Self::FlowRate if evening_peak => 1.10,
            Self::FlowRate if hour >= 23 || hour <= 5 => 0.85,
            Self::Temperature if (14..=16).contains(&hour) => 1.05,
            Self::Temperature if (4..=6).contains(&hour) => 0.95,
            Self::Ph if morning_peak || evening_peak => 1.02,
            _ => 1.0,
        }
    }
}

/// Static description of one simulated sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSpec {
    /// Sensor identifier, used as the `sensor_type` tag.
    pub id: &'static str,
    /// Baseline value in the sensor's unit.
    pub base: f64,
    /// Relative variation range. `None` means [`DEFAULT_VARIATION`].
    pub variation: Option<(f64, f64)>,
    /// Physical clamp range. `None` leaves the value unclamped.
    pub clamp: Option<(f64, f64)>,
    /// Anomaly multiplier range. `None` means the sensor never spikes.
    pub anomaly: Option<(f64, f64)>,
    /// Daily-cycle rule.
    pub shaping: TimeShaping,
}

/// The random inputs to one reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Draws {
    /// Drawn from the variation range.
    pub random_factor: f64,
    /// Drawn from `[-0.02, 0.02]`.
    pub noise: f64,
    /// `Some` when this reading is an anomaly, holding the multiplier.
    pub anomaly_factor: Option<f64>,
}

impl Draws {
    /// Draws that leave the shaped baseline untouched.
    pub const NEUTRAL: Self = Self {
        random_factor: 1.0,
        noise: 0.0,
        anomaly_factor: None,
    };
}

/// One generated value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Rounded reading.
    pub value: f64,
    /// The multiplier applied if this reading was an anomaly.
    pub anomaly_factor: Option<f64>,
}

impl Sample {
    /// Whether this reading was an injected anomaly.
    pub fn is_anomaly(&self) -> bool {
        self.anomaly_factor.is_some()
    }
}

impl SensorSpec {
    /// The effective variation range.
    pub fn variation(&self) -> (f64, f64) {
        self.variation.unwrap_or(DEFAULT_VARIATION)
    }

    /// Make this reading's random draws.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Draws {
        let (lo, hi) = self.variation();
        let random_factor = rng.gen_range(lo..=hi);
        let noise = rng.gen_range(-NOISE_AMPLITUDE..=NOISE_AMPLITUDE);
        let anomaly_factor = self.anomaly.and_then(|(lo, hi)| {
            rng.gen_bool(ANOMALY_PROBABILITY)
                .then(|| rng.gen_range(lo..=hi))
        });
        Draws {
            random_factor,
            noise,
            anomaly_factor,
        }
    }

    /// Generate one reading for the clock's current hour.
    pub fn sample<R: Rng + ?Sized>(&self, clock: &SimulationClock, rng: &mut R) -> Sample {
        let draws = self.draw(rng);
        let sample = compute(self, clock.hour(), draws);
        if let Some(factor) = sample.anomaly_factor {
            warn!(
                sensor = self.id,
                factor,
                value = sample.value,
                "Simulating sensor anomaly"
            );
        }
        sample
    }
}

/// The reading for `spec` at `hour` given explicit `draws`.
///
/// Clamping happens before the anomaly multiplier, so an anomaly can leave
/// the physical range. Rounding is last.
pub fn compute(spec: &SensorSpec, hour: u32, draws: Draws) -> Sample {
    let mut value =
        spec.base * spec.shaping.factor(hour) * draws.random_factor * (1.0 + draws.noise);

    if let Some((lo, hi)) = spec.clamp {
        value = value.clamp(lo, hi);
    }

    // Only sensors with an anomaly range can spike.
    let anomaly_factor = spec.anomaly.and(draws.anomaly_factor);
    if let Some(factor) = anomaly_factor {
        value *= factor;
    }

    Sample {
        value: round3(value),
        anomaly_factor,
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Immutable, ordered sensor table, fixed at process start.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorBaseline {
    sensors: Vec<SensorSpec>,
}

impl SensorBaseline {
    /// Build a table from explicit specs, kept in the given order.
    ///
    /// Fails if any declared range is inverted or NaN.
    pub fn new(sensors: Vec<SensorSpec>) -> eyre::Result<Self> {
        for sensor in &sensors {
            let ranges = [
                ("variation", Some(sensor.variation())),
                ("clamp", sensor.clamp),
                ("anomaly", sensor.anomaly),
            ];
            for (name, (lo, hi)) in ranges
                .into_iter()
                .filter_map(|(name, range)| range.map(|r| (name, r)))
            {
                if lo.is_nan() || hi.is_nan() || lo > hi {
                    eyre::bail!("sensor {}: {name} range ({lo}, {hi}) is inverted", sensor.id);
                }
            }
        }
        Ok(Self { sensors })
    }

    /// The ten sensors of a municipal treatment plant.
    #[rustfmt::skip]
    pub fn water_plant() -> Self {
        use TimeShaping::*;

        let spec = |id, base, variation, clamp, anomaly, shaping| SensorSpec {
            id,
            base,
            variation: Some(variation),
            clamp,
            anomaly,
            shaping,
        };

        Self { sensors: vec![
            // L/min
            spec("flow_rate", 800.0, (0.95, 1.05), None, Some((0.5, 2.0)), FlowRate),
            spec("ph_level", 7.1, (0.95, 1.05), Some((6.5, 8.5)), Some((0.3, 3.0)), Ph),
            // °C
            spec("temperature", 22.0, (0.98, 1.02), Some((15.0, 30.0)), Some((0.7, 1.5)), Temperature),
            // bar
            spec("pressure", 2.8, (0.97, 1.03), Some((1.5, 4.0)), Some((0.5, 2.0)), Flat),
            // NTU
            spec("turbidity", 0.6, (0.8, 1.2), Some((0.1, 2.0)), Some((2.0, 5.0)), Flat),
            // mg/L
            spec("chlorine", 1.1, (0.9, 1.1), Some((0.5, 2.0)), Some((0.1, 3.0)), Flat),
            spec("dissolved_oxygen", 8.5, (0.95, 1.05), Some((6.0, 12.0)), None, Flat),
            // µS/cm
            spec("conductivity", 450.0, (0.95, 1.05), Some((200.0, 800.0)), None, Flat),
            spec("total_dissolved_solids", 320.0, (0.95, 1.05), Some((150.0, 500.0)), None, Flat),
            // mg/L as CaCO3
            spec("alkalinity", 120.0, (0.95, 1.05), Some((80.0, 200.0)), None, Flat),
        ] }
    }

    /// Look up a sensor by id.
    pub fn get(&self, id: &str) -> Option<&SensorSpec> {
        self.sensors.iter().find(|s| s.id == id)
    }

    /// Iterate sensors in table order.
    pub fn iter(&self) -> impl Iterator<Item = &SensorSpec> {
        self.sensors.iter()
    }

    /// Number of sensors.
    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

impl Default for SensorBaseline {
    fn default() -> Self {
        Self::water_plant()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::{SeedableRng, rngs::StdRng};

    fn clock_at(hour: u32) -> SimulationClock {
        SimulationClock::starting_at(
            NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(hour, 30, 0)
                .unwrap(),
        )
    }

    fn plant(id: &str) -> SensorSpec {
        SensorBaseline::water_plant().get(id).cloned().unwrap()
    }

    #[test]
    fn ph_peak_hour_example() {
        let sample = compute(&plant("ph_level"), 8, Draws::NEUTRAL);
        assert_eq!(sample.value, 7.242);
        assert!(!sample.is_anomaly());
    }

    #[test]
    fn flow_rate_night_example() {
        let sample = compute(&plant("flow_rate"), 2, Draws::NEUTRAL);
        assert_eq!(sample.value, 680.0);
    }

    #[test]
    fn shaping_windows() {
        use TimeShaping::*;

        assert_eq!(FlowRate.factor(7), 1.15);
        assert_eq!(FlowRate.factor(9), 1.15);
        assert_eq!(FlowRate.factor(10), 1.0);
        assert_eq!(FlowRate.factor(18), 1.10);
        assert_eq!(FlowRate.factor(20), 1.10);
        assert_eq!(FlowRate.factor(23), 0.85);
        assert_eq!(FlowRate.factor(0), 0.85);
        assert_eq!(FlowRate.factor(5), 0.85);
        assert_eq!(FlowRate.factor(6), 1.0);

        assert_eq!(Temperature.factor(14), 1.05);
        assert_eq!(Temperature.factor(16), 1.05);
        assert_eq!(Temperature.factor(4), 0.95);
        assert_eq!(Temperature.factor(6), 0.95);
        assert_eq!(Temperature.factor(12), 1.0);

        assert_eq!(Ph.factor(8), 1.02);
        assert_eq!(Ph.factor(19), 1.02);
        assert_eq!(Ph.factor(2), 1.0);

        for hour in 0..24 {
            assert_eq!(Flat.factor(hour), 1.0);
        }
    }

    #[test]
    fn clamps_to_physical_range() {
        let ph = plant("ph_level");
        let high = Draws {
            random_factor: 1.5,
            ..Draws::NEUTRAL
        };
        let low = Draws {
            random_factor: 0.5,
            ..Draws::NEUTRAL
        };
        assert_eq!(compute(&ph, 12, high).value, 8.5);
        assert_eq!(compute(&ph, 12, low).value, 6.5);
    }

    #[test]
    fn unclamped_sensor_passes_through() {
        let flow = plant("flow_rate");
        let draws = Draws {
            random_factor: 10.0,
            ..Draws::NEUTRAL
        };
        assert_eq!(compute(&flow, 12, draws).value, 8000.0);
    }

    #[test]
    fn anomaly_applies_after_clamp() {
        let turbidity = plant("turbidity");
        let draws = Draws {
            random_factor: 10.0,
            noise: 0.0,
            anomaly_factor: Some(2.0),
        };
        let sample = compute(&turbidity, 12, draws);
        assert_eq!(sample.value, 4.0);
        assert!(sample.is_anomaly());
    }

    #[test]
    fn sensors_without_anomaly_range_never_spike() {
        let oxygen = plant("dissolved_oxygen");
        let draws = Draws {
            anomaly_factor: Some(3.0),
            ..Draws::NEUTRAL
        };
        let sample = compute(&oxygen, 12, draws);
        assert_eq!(sample.value, 8.5);
        assert!(!sample.is_anomaly());

        let mut rng = StdRng::seed_from_u64(7);
        let clock = clock_at(12);
        assert!((0..20_000).all(|_| !oxygen.sample(&clock, &mut rng).is_anomaly()));
    }

    #[test]
    fn missing_variation_defaults_to_five_percent() {
        let spec = SensorSpec {
            id: "custom",
            base: 100.0,
            variation: None,
            clamp: None,
            anomaly: None,
            shaping: TimeShaping::Flat,
        };
        assert_eq!(spec.variation(), DEFAULT_VARIATION);

        let mut rng = StdRng::seed_from_u64(11);
        let clock = clock_at(3);
        for _ in 0..5_000 {
            let v = spec.sample(&clock, &mut rng).value;
            // 0.95 * 0.98 and 1.05 * 1.02, rounded outward
            assert!((93.1..=107.1).contains(&v), "{v}");
        }
    }

    #[test]
    fn non_anomalous_readings_stay_in_range() {
        let baseline = SensorBaseline::water_plant();
        let mut rng = StdRng::seed_from_u64(42);
        for hour in 0..24 {
            let clock = clock_at(hour);
            for spec in baseline.iter() {
                for _ in 0..200 {
                    let sample = spec.sample(&clock, &mut rng);
                    if sample.is_anomaly() {
                        continue;
                    }
                    if let Some((lo, hi)) = spec.clamp {
                        assert!(
                            (lo..=hi).contains(&sample.value),
                            "{} = {} outside {lo}..={hi}",
                            spec.id,
                            sample.value
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn seeded_generator_is_deterministic() {
        let baseline = SensorBaseline::water_plant();
        let clock = clock_at(8);

        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            baseline
                .iter()
                .map(|spec| spec.sample(&clock, &mut rng).value)
                .collect::<Vec<_>>()
        };

        assert_eq!(run(1234), run(1234));
        assert_ne!(run(1234), run(4321));
    }

    #[test]
    fn anomaly_rate_is_about_one_in_a_thousand() {
        let chlorine = plant("chlorine");
        let clock = clock_at(12);
        let mut rng = StdRng::seed_from_u64(2024);

        let anomalies = (0..100_000)
            .filter(|_| chlorine.sample(&clock, &mut rng).is_anomaly())
            .count();

        // Expected 100, standard deviation about 10.
        assert!((50..=150).contains(&anomalies), "{anomalies} anomalies");
    }

    #[test]
    fn anomaly_factor_stays_in_declared_range() {
        let pressure = plant("pressure");
        let mut rng = StdRng::seed_from_u64(99);
        let factors: Vec<f64> = (0..50_000)
            .filter_map(|_| pressure.draw(&mut rng).anomaly_factor)
            .collect();
        assert!(!factors.is_empty());
        assert!(factors.iter().all(|f| (0.5..=2.0).contains(f)));
    }

    #[test]
    fn plant_table_is_ordered() {
        let ids: Vec<_> = SensorBaseline::water_plant().iter().map(|s| s.id).collect();
        assert_eq!(ids.first(), Some(&"flow_rate"));
        assert_eq!(ids.last(), Some(&"alkalinity"));
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn plant_table_passes_validation() {
        let sensors = SensorBaseline::water_plant().sensors;
        assert_eq!(SensorBaseline::new(sensors).unwrap().len(), 10);
    }

    #[test]
    fn inverted_ranges_are_rejected() {
        let ok = plant("pressure");

        let variation = SensorSpec {
            variation: Some((1.05, 0.95)),
            ..ok.clone()
        };
        let clamp = SensorSpec {
            clamp: Some((4.0, 1.5)),
            ..ok.clone()
        };
        let anomaly = SensorSpec {
            anomaly: Some((f64::NAN, 2.0)),
            ..ok.clone()
        };

        for bad in [variation, clamp, anomaly] {
            let err = SensorBaseline::new(vec![ok.clone(), bad]).unwrap_err();
            assert!(err.to_string().contains("pressure"), "{err}");
        }
    }
}
