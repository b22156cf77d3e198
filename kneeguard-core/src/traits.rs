//! Seams between the session engine and its transports
//!
//! The core never opens a socket. It reads sensor state through [`ReadingSource`] and
//! hands smoothness windows to a [`SmoothnessAnalyzer`]; the connectors crate supplies
//! the networked implementations, tests supply in-memory ones.

use std::sync::Arc;

use crate::errors::KneeGuardResult;
use crate::smoothness::{AnalysisRequest, SmoothnessMetrics};
use crate::telemetry::{SensorReading, SensorSlot};

/// Read side of the latest-reading cache
pub trait ReadingSource {
    /// Most recent reading for `slot`, `None` until one has arrived
    fn latest(&self, slot: SensorSlot) -> Option<Arc<SensorReading>>;

    /// Both slots, only if both are populated
    fn latest_pair(&self) -> Option<(Arc<SensorReading>, Arc<SensorReading>)> {
        Some((self.latest(SensorSlot::First)?, self.latest(SensorSlot::Second)?))
    }
}

impl<T: ReadingSource + ?Sized> ReadingSource for Arc<T> {
    fn latest(&self, slot: SensorSlot) -> Option<Arc<SensorReading>> {
        (**self).latest(slot)
    }
}

/// Consumer of completed smoothness windows
///
/// `submit` may block the caller for one network round trip (synchronous analyzers);
/// worker-backed analyzers return immediately and report through `poll_metrics`.
pub trait SmoothnessAnalyzer {
    /// Hand over one full window
    fn submit(&mut self, request: AnalysisRequest) -> KneeGuardResult<()>;

    /// Collect the newest finished result, if any
    fn poll_metrics(&mut self) -> Option<SmoothnessMetrics>;

    /// `false` once the analyzer has given up (e.g. the service is unreachable)
    fn is_enabled(&self) -> bool;

    /// Abandon any in-flight work; called once when the session shuts down
    fn shutdown(&mut self) {}
}

impl<T: SmoothnessAnalyzer + ?Sized> SmoothnessAnalyzer for Box<T> {
    fn submit(&mut self, request: AnalysisRequest) -> KneeGuardResult<()> {
        (**self).submit(request)
    }

    fn poll_metrics(&mut self) -> Option<SmoothnessMetrics> {
        (**self).poll_metrics()
    }

    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }
}
