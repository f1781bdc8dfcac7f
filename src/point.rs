//! The [`Point`] record and its line-protocol encoding.
//!
//! Points are plain data: a measurement name, string tags, typed fields and a
//! timestamp. Nothing here knows about HTTP or any store client. The sink
//! turns a slice of points into a line-protocol body with [`encode_lines`].

use chrono::{DateTime, Utc};
use std::{collections::BTreeMap, fmt::Write};
use tracing::warn;

/// Measurement name for simulated water-quality readings.
pub const WATER_METRICS: &str = "water_metrics";
/// Measurement name for the per-batch plant status record.
pub const PLANT_STATUS: &str = "plant_status";
/// Measurement name for host metrics.
pub const SYSTEM_METRICS: &str = "system_metrics";
/// Measurement name for container-runtime metrics.
pub const DOCKER_METRICS: &str = "docker_metrics";
/// Measurement name for reachability checks.
pub const CONNECTIVITY_METRICS: &str = "connectivity_metrics";

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit float, written without a suffix.
    Float(f64),
    /// Signed integer, written with an `i` suffix.
    Integer(i64),
    /// Boolean, written as `true`/`false`.
    Boolean(bool),
    /// String, written double-quoted.
    String(String),
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// One tagged, timestamped record bound for the time-series store.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Measurement name, e.g. [`WATER_METRICS`].
    pub measurement: String,

    /// Tags, sorted by key.
    pub tags: BTreeMap<String, String>,

    /// Fields, sorted by key. A point without fields is not writable.
    pub fields: BTreeMap<String, FieldValue>,

    /// Capture instant.
    pub timestamp: DateTime<Utc>,
}

impl Point {
    /// Start a point in `measurement` at `timestamp`, with no tags or fields.
    pub fn new(measurement: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    /// Add a tag.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// The tag value for `key`, if present.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// The field value for `key`, if present.
    pub fn field_value(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Append this point as one line of line protocol to `out`, without the
    /// trailing newline.
    ///
    /// Tags with an empty value and non-finite floats are left out, as the
    /// store rejects both. Returns `false`, leaving `out` untouched, when no
    /// field is left to write.
    pub fn write_line(&self, out: &mut String) -> bool {
        let start = out.len();
        escape_into(out, &self.measurement, &[',', ' ']);

        for (key, value) in self.tags.iter().filter(|(_, v)| !v.is_empty()) {
            out.push(',');
            escape_into(out, key, &[',', '=', ' ']);
            out.push('=');
            escape_into(out, value, &[',', '=', ' ']);
        }

        let mut sep = ' ';
        for (key, value) in &self.fields {
            if matches!(value, FieldValue::Float(v) if !v.is_finite()) {
                continue;
            }
            out.push(sep);
            sep = ',';
            escape_into(out, key, &[',', '=', ' ']);
            out.push('=');
            match value {
                FieldValue::Float(v) => {
                    let _ = write!(out, "{v}");
                }
                FieldValue::Integer(v) => {
                    let _ = write!(out, "{v}i");
                }
                FieldValue::Boolean(v) => {
                    let _ = write!(out, "{v}");
                }
                FieldValue::String(v) => {
                    out.push('"');
                    for c in v.chars() {
                        if matches!(c, '"' | '\\') {
                            out.push('\\');
                        }
                        out.push(c);
                    }
                    out.push('"');
                }
            }
        }

        if sep == ' ' {
            out.truncate(start);
            return false;
        }

        // Past 2262 the nanosecond count no longer fits an i64.
        let nanos = self.timestamp.timestamp_nanos_opt().unwrap_or_else(|| {
            self.timestamp.timestamp().saturating_mul(1_000_000_000)
        });
        let _ = write!(out, " {nanos}");
        true
    }
}

/// Encode points as a newline-separated line-protocol body. Points with no
/// writable field are skipped with a warning.
pub fn encode_lines(points: &[Point]) -> String {
    let mut out = String::with_capacity(points.len() * 96);
    for point in points {
        let start = out.len();
        if start > 0 {
            out.push('\n');
        }
        if !point.write_line(&mut out) {
            out.truncate(start);
            warn!(measurement = %point.measurement, "Skipping point with no writable field");
        }
    }
    out
}

/// Backslash-escape `special`. Newlines become a literal `\n` so a value can
/// never split a record.
fn escape_into(out: &mut String, raw: &str, special: &[char]) {
    for c in raw.chars() {
        if c == '\n' {
            out.push_str("\\n");
            continue;
        }
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}
