//! In-memory sample accumulator
//!
//! Buffers the values of the currently open sample window. Event intake
//! writes into it from request handlers while the scheduler drains it, so all
//! access goes through one mutex. It never touches storage.
//!
//! The first kind buffered for a name is kept: an observation of the other
//! kind for the same name is dropped rather than folded into it.

use crate::storage::database::Batch;
use crate::storage::MetricKind;
use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy)]
struct Slot {
    kind: MetricKind,
    value: i64,
    /// Write sequence of the last update
    seq: u64,
}

#[derive(Debug, Default)]
struct Window {
    slots: BTreeMap<String, Slot>,
    seq: u64,
}

/// Copy of the open window taken by [`SampleAccumulator::drain`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drained {
    batch: Batch,
    seq: u64,
}

impl Drained {
    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    pub fn into_batch(self) -> Batch {
        self.batch
    }
}

impl Deref for Drained {
    type Target = Batch;

    fn deref(&self) -> &Batch {
        &self.batch
    }
}

/// Accumulates observations for the open window
#[derive(Debug, Default)]
pub struct SampleAccumulator {
    window: Mutex<Window>,
}

impl SampleAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn window(&self) -> MutexGuard<'_, Window> {
        // A panic while holding the lock cannot leave a half-written entry
        self.window.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record an observation
    ///
    /// Gauges keep the last value set; counters add `value` to the window.
    /// Returns `false` when `name` is already buffered with the other kind;
    /// the observation is then dropped.
    pub fn accumulate(&self, name: &str, kind: MetricKind, value: i64) -> bool {
        let mut window = self.window();
        window.seq += 1;
        let seq = window.seq;

        match window.slots.get_mut(name) {
            Some(slot) if slot.kind != kind => {
                tracing::warn!(
                    metric = %name,
                    buffered = %slot.kind,
                    observed = %kind,
                    "Dropping observation with conflicting kind"
                );
                false
            }
            Some(slot) => {
                match kind {
                    MetricKind::Gauge => slot.value = value,
                    MetricKind::Counter => slot.value = slot.value.saturating_add(value),
                }
                slot.seq = seq;
                true
            }
            None => {
                window.slots.insert(name.to_string(), Slot { kind, value, seq });
                true
            }
        }
    }

    /// Set a gauge for the open window
    pub fn set(&self, name: &str, value: i64) -> bool {
        self.accumulate(name, MetricKind::Gauge, value)
    }

    /// Count one event in the open window
    pub fn increment(&self, name: &str) -> bool {
        self.accumulate(name, MetricKind::Counter, 1)
    }

    /// Kind buffered for `name`, if any
    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.window().slots.get(name).map(|slot| slot.kind)
    }

    /// Snapshot of the open window; the buffer is left as is
    pub fn drain(&self) -> Drained {
        let window = self.window();
        Drained {
            batch: window
                .slots
                .iter()
                .map(|(name, slot)| (name.clone(), (slot.kind, slot.value)))
                .collect(),
            seq: window.seq,
        }
    }

    /// Zero every tracked key
    ///
    /// Keys stay tracked, so the next window starts from 0 rather than absence.
    pub fn reset(&self) {
        for slot in self.window().slots.values_mut() {
            slot.value = 0;
        }
    }

    /// Reset after `drained` has been committed
    ///
    /// Same as [`reset`](Self::reset) for everything the flush wrote, except
    /// that counter increments and gauge updates recorded after `drain()` are
    /// kept for the next window.
    pub fn settle(&self, drained: &Drained) {
        let mut window = self.window();
        for (name, (_, committed)) in &drained.batch {
            if let Some(slot) = window.slots.get_mut(name) {
                match slot.kind {
                    MetricKind::Counter => slot.value = slot.value.saturating_sub(*committed),
                    MetricKind::Gauge if slot.seq <= drained.seq => slot.value = 0,
                    MetricKind::Gauge => {}
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.window().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window().slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counter_sums_increments() {
        let samples = SampleAccumulator::new();
        for _ in 0..4 {
            samples.increment("forward_event");
        }
        samples.accumulate("forward_event", MetricKind::Counter, 10);

        let batch = samples.drain();
        assert_eq!(batch["forward_event"], (MetricKind::Counter, 14));
    }

    #[test]
    fn test_gauge_last_write_wins() {
        let samples = SampleAccumulator::new();
        samples.set("getinfo_num_peers", 3);
        samples.set("getinfo_num_peers", 7);
        samples.set("getinfo_num_peers", 5);

        assert_eq!(samples.drain()["getinfo_num_peers"], (MetricKind::Gauge, 5));
    }

    #[test]
    fn test_drain_does_not_clear() {
        let samples = SampleAccumulator::new();
        samples.increment("db_write");

        let first = samples.drain();
        let second = samples.drain();
        assert_eq!(first, second);
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn test_reset_zeroes_but_keeps_keys() {
        let samples = SampleAccumulator::new();
        samples.increment("db_write");
        samples.set("getinfo_num_peers", 9);

        samples.reset();

        let batch = samples.drain();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch["db_write"].1, 0);
        assert_eq!(batch["getinfo_num_peers"].1, 0);

        samples.increment("db_write");
        assert_eq!(samples.drain()["db_write"].1, 1);
    }

    #[test]
    fn test_settle_keeps_late_increments() {
        let samples = SampleAccumulator::new();
        samples.increment("htlc_accepted");
        samples.increment("htlc_accepted");
        samples.set("getinfo_num_peers", 4);

        let flushed = samples.drain();

        // Arrives while the batch is being written
        samples.increment("htlc_accepted");
        samples.increment("forward_event");

        samples.settle(&flushed);

        let next = samples.drain();
        assert_eq!(next["htlc_accepted"].1, 1);
        assert_eq!(next["forward_event"].1, 1);
        assert_eq!(next["getinfo_num_peers"].1, 0);
    }

    #[test]
    fn test_settle_keeps_gauge_updated_after_drain() {
        let samples = SampleAccumulator::new();
        samples.set("getinfo_num_peers", 4);
        let flushed = samples.drain();

        samples.set("getinfo_num_peers", 6);
        samples.settle(&flushed);

        assert_eq!(samples.drain()["getinfo_num_peers"].1, 6);
    }

    #[test]
    fn test_settle_keeps_gauge_reset_to_same_value() {
        let samples = SampleAccumulator::new();
        samples.set("getinfo_num_peers", 4);
        let flushed = samples.drain();

        // Same value, but observed for the next window
        samples.set("getinfo_num_peers", 4);
        samples.settle(&flushed);

        assert_eq!(samples.drain()["getinfo_num_peers"].1, 4);
    }

    #[test]
    fn test_conflicting_kind_is_dropped() {
        let samples = SampleAccumulator::new();
        assert!(samples.set("getinfo_num_peers", 5));
        assert!(!samples.accumulate("getinfo_num_peers", MetricKind::Counter, 1000));
        assert!(samples.set("getinfo_num_peers", 6));

        assert_eq!(samples.drain()["getinfo_num_peers"], (MetricKind::Gauge, 6));
        assert_eq!(samples.kind_of("getinfo_num_peers"), Some(MetricKind::Gauge));

        assert!(samples.increment("forward_event"));
        assert!(!samples.set("forward_event", 9));
        assert_eq!(samples.drain()["forward_event"], (MetricKind::Counter, 1));
    }

    #[test]
    fn test_concurrent_increments() {
        let samples = Arc::new(SampleAccumulator::new());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let samples = samples.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        samples.increment("db_write");
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(samples.drain()["db_write"].1, 1000);
    }
}
