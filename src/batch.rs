//! Just the [`Batch`] struct.

use crate::Point;
use chrono::{DateTime, Utc};
use std::ops::{Deref, DerefMut};
use tracing::trace;

/// A timestamp-aligned group of points produced by one tick, along with the
/// tracing span of that tick.
///
/// Like any unit of work that crosses from a producer to the sink, the batch
/// owns the span it was created under. The sink enters it while writing, so
/// the write shows up as a child of the tick that produced the data. The span
/// closes when the batch is dropped, right after the write.
///
/// A batch is handed to the sink whole: there is no per-point submission.
#[derive(Debug)]
pub struct Batch {
    points: Vec<Point>,

    captured_at: DateTime<Utc>,

    span: tracing::Span,
}

impl Deref for Batch {
    type Target = Vec<Point>;

    fn deref(&self) -> &Self::Target {
        &self.points
    }
}

impl DerefMut for Batch {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.points
    }
}

impl Batch {
    /// Create a new batch captured at `captured_at`. Every point should carry
    /// the same timestamp.
    pub fn new(points: Vec<Point>, captured_at: DateTime<Utc>, span: tracing::Span) -> Self {
        debug_assert!(points.iter().all(|p| p.timestamp == captured_at));
        crate::metrics::record_batch();
        Self {
            points,
            captured_at,
            span,
        }
    }

    /// The shared capture instant.
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Run a function within the scope of this batch's span.
    pub fn in_scope<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[Point]) -> R,
    {
        self.span().in_scope(|| f(&self.points))
    }

    /// Get the tracing span associated with this batch.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Number of points in `measurement`.
    pub fn count_of(&self, measurement: &str) -> usize {
        self.points
            .iter()
            .filter(|p| p.measurement == measurement)
            .count()
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        self.span().in_scope(|| {
            trace!(points = self.points.len(), "Dropping batch");
        });
        crate::metrics::release_batch();
    }
}
