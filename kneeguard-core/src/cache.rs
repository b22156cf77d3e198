//! Last-Value-Wins Reading Cache
//!
//! ## Overview
//!
//! The telemetry receive loop and the foreground tick loop share exactly one piece of
//! mutable state: the latest reading per sensor slot. This module owns it.
//!
//! ```text
//! Receive loop (writer)                 Tick loop (reader)
//!        ↓                                     ↓
//!   publish(slot, reading)              get_latest(slot)
//!        ↓                                     ↓
//!   lock → swap Arc → unlock            lock → clone Arc → unlock
//! ```
//!
//! ## Why swap whole records?
//!
//! A reading is built completely before it is published and is never mutated
//! afterwards. Publishing replaces the `Arc` in the slot, reading clones it. The lock
//! is held for a pointer swap only, so neither side can stall the other for longer
//! than that, and a reader can never observe the id of one message paired with the
//! orientation of another.
//!
//! ## Semantics
//!
//! This is not a queue. Intermediate messages published between two reads are lost on
//! purpose: the consumer only ever wants the newest orientation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::telemetry::{SensorReading, SensorSlot};
use crate::traits::ReadingSource;

type Slot = Mutex<Option<Arc<SensorReading>>>;

/// Thread-safe single-value cache, one entry per sensor slot
#[derive(Debug, Default)]
pub struct LatestReadingCache {
    slots: [Slot; 2],
    publishes: AtomicU64,
}

impl LatestReadingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite `slot` with `reading`
    pub fn publish(&self, slot: SensorSlot, reading: SensorReading) {
        let reading = Arc::new(reading);
        // previous value is dropped after the guard, outside the critical section
        let _previous = {
            let mut guard = self.slots[slot.index()]
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            guard.replace(reading)
        };
        self.publishes.fetch_add(1, Ordering::Relaxed);
    }

    /// Most recent reading for `slot`, if any has arrived
    pub fn get_latest(&self, slot: SensorSlot) -> Option<Arc<SensorReading>> {
        self.slots[slot.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget both slots
    pub fn clear(&self) {
        for slot in &self.slots {
            slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        }
    }

    /// Total readings published since creation
    pub fn publish_count(&self) -> u64 {
        self.publishes.load(Ordering::Relaxed)
    }
}

impl ReadingSource for LatestReadingCache {
    fn latest(&self, slot: SensorSlot) -> Option<Arc<SensorReading>> {
        self.get_latest(slot)
    }
}
