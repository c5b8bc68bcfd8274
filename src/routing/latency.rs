//! Observed latency per model.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Weight of each new observation in the smoothed average.
pub const DEFAULT_ALPHA: f64 = 0.2;

const UNOBSERVED: u64 = u64::MAX;

/// Smoothed call latency for a fixed set of models.
///
/// One slot per model holds the average in microseconds, or a sentinel
/// until the first call lands. Slots are updated with `fetch_update`, so
/// concurrent recorders never drop a sample and no lock is taken.
#[derive(Debug)]
pub struct ModelLatency {
    ids: Vec<String>,
    averages: Vec<AtomicU64>,
    counts: Vec<AtomicU64>,
    alpha: f64,
}

impl ModelLatency {
    pub fn new<'a>(model_ids: impl IntoIterator<Item = &'a str>, alpha: f64) -> Self {
        let ids: Vec<String> = model_ids.into_iter().map(str::to_owned).collect();
        Self {
            averages: ids.iter().map(|_| AtomicU64::new(UNOBSERVED)).collect(),
            counts: ids.iter().map(|_| AtomicU64::new(0)).collect(),
            ids,
            alpha: alpha.clamp(0.0, 1.0),
        }
    }

    fn slot(&self, model_id: &str) -> Option<usize> {
        self.ids.iter().position(|id| id == model_id)
    }

    /// Fold a call duration into the model's average; unknown ids are ignored.
    pub fn record(&self, model_id: &str, duration: Duration) {
        let Some(slot) = self.slot(model_id) else {
            return;
        };
        let sample = u64::try_from(duration.as_micros()).unwrap_or(UNOBSERVED - 1);
        let alpha = self.alpha;
        // the closure always returns Some, so this never fails
        let _ = self.averages[slot].fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            Some(if current == UNOBSERVED {
                sample
            } else {
                (alpha * sample as f64 + (1.0 - alpha) * current as f64).round() as u64
            })
        });
        self.counts[slot].fetch_add(1, Ordering::Relaxed);
    }

    /// Current average, `None` before the first call or for unknown ids.
    pub fn average(&self, model_id: &str) -> Option<Duration> {
        let micros = self.averages[self.slot(model_id)?].load(Ordering::Acquire);
        (micros != UNOBSERVED).then(|| Duration::from_micros(micros))
    }

    pub fn observation_count(&self, model_id: &str) -> u64 {
        self.slot(model_id)
            .map_or(0, |slot| self.counts[slot].load(Ordering::Relaxed))
    }
}
