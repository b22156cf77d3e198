//! Smoothness windowing and the analysis wire format
//!
//! ## Overview
//!
//! Each tick while calibrated, one orientation sample of the tracked segment is
//! appended to a fixed-capacity window together with the time since the previous
//! sample. When the window holds [`SMOOTHNESS_WINDOW_CAPACITY`] samples it is turned
//! into an [`AnalysisRequest`] and emptied in the same step, before the exchange is
//! attempted, so a failed exchange drops the window instead of retrying it.
//!
//! ```text
//! tick ─▶ record() ─▶ [s₀ s₁ … s₂₉₉] full ─▶ AnalysisRequest ─▶ analyzer
//!                          │                                       │
//!                          └── cleared (capacity kept)             └─▶ SmoothnessMetrics
//! ```
//!
//! ## Wire format
//!
//! ```text
//! request:  { "quaternions": [ {"w","x","y","z","timestamp"}, … ], "deltaTime": f, "time": f }
//! response: { "sparc": f, "ldlj": f }           ("SPARC"/"LDLJ" accepted, extra keys ignored)
//! ```
//!
//! `timestamp` in each sample is the delta since the previous sample in seconds; the
//! analysis side integrates them into a time axis.

use heapless::Vec as HVec;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::calibration::SegmentRole;
use crate::constants::network::SMOOTHNESS_WINDOW_CAPACITY;
use crate::errors::{KneeGuardError, KneeGuardResult};
use crate::orientation::Orientation;
use crate::time::{delta_secs, ms_to_secs, Timestamp};
use crate::traits::SmoothnessAnalyzer;

/// One orientation sample with the time since the previous one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SampleWire", into = "SampleWire")]
pub struct SmoothnessSample {
    pub orientation: Orientation,
    /// Seconds since the previous sample, 0 for the first
    pub delta_time: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct SampleWire {
    w: f64,
    x: f64,
    y: f64,
    z: f64,
    timestamp: f64,
}

impl From<SmoothnessSample> for SampleWire {
    fn from(s: SmoothnessSample) -> Self {
        let [w, x, y, z] = s.orientation.components();
        Self { w, x, y, z, timestamp: s.delta_time }
    }
}

impl TryFrom<SampleWire> for SmoothnessSample {
    type Error = KneeGuardError;

    fn try_from(s: SampleWire) -> Result<Self, Self::Error> {
        if !s.timestamp.is_finite() {
            return Err(KneeGuardError::InvalidInput { reason: "sample delta is not finite" });
        }
        Ok(Self { orientation: Orientation::new(s.w, s.x, s.y, s.z)?, delta_time: s.timestamp })
    }
}

/// Request document for one analysis round trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub quaternions: Vec<SmoothnessSample>,
    /// Duration of the tick that completed the window (seconds)
    pub delta_time: f64,
    /// Session-relative time at completion (seconds)
    pub time: f64,
}

/// Smoothness metrics returned by the analysis service
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothnessMetrics {
    /// Spectral arc length (more negative = less smooth)
    #[serde(alias = "SPARC")]
    pub sparc: f64,
    /// Log dimensionless jerk (more negative = less smooth)
    #[serde(alias = "LDLJ")]
    pub ldlj: f64,
}

impl SmoothnessMetrics {
    /// Decode a response document, rejecting non-finite metrics
    pub fn validated(self) -> KneeGuardResult<Self> {
        if self.sparc.is_finite() && self.ldlj.is_finite() {
            Ok(self)
        } else {
            Err(KneeGuardError::Decode("analysis returned non-finite metrics".into()))
        }
    }
}

/// Fixed-capacity sample window for one segment
#[derive(Debug, Clone, Default)]
pub struct SmoothnessWindow {
    samples: HVec<SmoothnessSample, SMOOTHNESS_WINDOW_CAPACITY>,
    last_timestamp: Option<Timestamp>,
}

impl SmoothnessWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample taken at `now`; `false` if the window was already full
    pub fn push(&mut self, orientation: Orientation, now: Timestamp) -> bool {
        if self.is_full() {
            return false;
        }
        let delta_time = self.last_timestamp.map_or(0.0, |last| delta_secs(last, now));
        self.last_timestamp = Some(now);
        self.samples.push(SmoothnessSample { orientation, delta_time }).is_ok()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.is_full()
    }

    pub fn samples(&self) -> &[SmoothnessSample] {
        &self.samples
    }

    /// Drop the samples; the delta chain continues from the last sample
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Drop the samples and forget the last timestamp
    pub fn reset(&mut self) {
        self.samples.clear();
        self.last_timestamp = None;
    }
}

/// Counters for the windowing side of the analysis link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SmoothnessStats {
    /// Windows that reached capacity
    pub windows_completed: u64,
    /// Windows handed to an analyzer that accepted them
    pub windows_submitted: u64,
    /// Windows dropped (analyzer disabled or submission failed)
    pub windows_dropped: u64,
    /// Metric pairs received
    pub results_received: u64,
}

/// Window plus last reported metrics for the tracked segment
#[derive(Debug, Clone)]
pub struct SmoothnessTracker {
    segment: SegmentRole,
    window: SmoothnessWindow,
    metrics: Option<SmoothnessMetrics>,
    stats: SmoothnessStats,
}

impl SmoothnessTracker {
    pub fn new(segment: SegmentRole) -> Self {
        Self {
            segment,
            window: SmoothnessWindow::new(),
            metrics: None,
            stats: SmoothnessStats::default(),
        }
    }

    /// Segment whose orientation is sampled
    pub fn segment(&self) -> SegmentRole {
        self.segment
    }

    /// Append a sample; returns the finished request when this sample filled the window
    pub fn record(&mut self, orientation: Orientation, now: Timestamp, tick_delta_s: f64) -> Option<AnalysisRequest> {
        self.window.push(orientation, now);
        self.take_request(now, tick_delta_s)
    }

    /// Drain the window into a request once it is full; `None` while it is still filling
    pub fn take_request(&mut self, now: Timestamp, tick_delta_s: f64) -> Option<AnalysisRequest> {
        if !self.window.is_full() {
            return None;
        }

        let request = AnalysisRequest {
            quaternions: self.window.samples().to_vec(),
            delta_time: tick_delta_s,
            time: ms_to_secs(now),
        };
        self.window.clear();
        self.stats.windows_completed += 1;
        Some(request)
    }

    /// Record a sample and, if the window completed, hand it to `analyzer`
    ///
    /// Errors from the analyzer are logged by the caller's analyzer and counted here;
    /// the window is gone either way.
    pub fn record_and_submit<A: SmoothnessAnalyzer + ?Sized>(
        &mut self,
        orientation: Orientation,
        now: Timestamp,
        tick_delta_s: f64,
        analyzer: &mut A,
    ) -> KneeGuardResult<()> {
        let Some(request) = self.record(orientation, now, tick_delta_s) else {
            return Ok(());
        };

        if !analyzer.is_enabled() {
            debug!("Smoothness window dropped: analysis disabled");
            self.stats.windows_dropped += 1;
            return Ok(());
        }

        match analyzer.submit(request) {
            Ok(()) => {
                self.stats.windows_submitted += 1;
                Ok(())
            }
            Err(err) => {
                self.stats.windows_dropped += 1;
                Err(err)
            }
        }
    }

    /// Pull any finished result out of `analyzer`
    pub fn collect<A: SmoothnessAnalyzer + ?Sized>(&mut self, analyzer: &mut A) -> Option<SmoothnessMetrics> {
        let metrics = analyzer.poll_metrics()?;
        self.apply_metrics(metrics);
        Some(metrics)
    }

    pub fn apply_metrics(&mut self, metrics: SmoothnessMetrics) {
        self.metrics = Some(metrics);
        self.stats.results_received += 1;
    }

    /// Last metrics reported this session
    pub fn metrics(&self) -> Option<SmoothnessMetrics> {
        self.metrics
    }

    pub fn pending_samples(&self) -> usize {
        self.window.len()
    }

    pub fn stats(&self) -> SmoothnessStats {
        self.stats
    }

    /// Drop buffered samples but keep the last metrics
    pub fn discard_window(&mut self) {
        self.window.reset();
    }

    /// Forget samples and metrics for a new session
    pub fn reset(&mut self) {
        self.window.reset();
        self.metrics = None;
        self.stats = SmoothnessStats::default();
    }
}

/// Analyzer used when no analysis service is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledAnalyzer;

impl SmoothnessAnalyzer for DisabledAnalyzer {
    fn submit(&mut self, _request: AnalysisRequest) -> KneeGuardResult<()> {
        Ok(())
    }

    fn poll_metrics(&mut self) -> Option<SmoothnessMetrics> {
        None
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Analyzer that answers every window with fixed metrics, or fails on demand
    struct Scripted {
        fail: bool,
        pending: Option<SmoothnessMetrics>,
        seen: usize,
    }

    impl SmoothnessAnalyzer for Scripted {
        fn submit(&mut self, request: AnalysisRequest) -> KneeGuardResult<()> {
            self.seen = request.quaternions.len();
            if self.fail {
                return Err(KneeGuardError::Decode("bad response".into()));
            }
            self.pending = Some(SmoothnessMetrics { sparc: -1.5, ldlj: -8.0 });
            Ok(())
        }

        fn poll_metrics(&mut self) -> Option<SmoothnessMetrics> {
            self.pending.take()
        }

        fn is_enabled(&self) -> bool {
            true
        }
    }

    #[test]
    fn first_delta_is_zero_then_tracks_time() {
        let mut window = SmoothnessWindow::new();
        window.push(Orientation::identity(), 1_000);
        window.push(Orientation::identity(), 1_016);
        window.push(Orientation::identity(), 1_050);

        let deltas: Vec<f64> = window.samples().iter().map(|s| s.delta_time).collect();
        assert_eq!(deltas, vec![0.0, 0.016, 0.034]);
    }

    #[test]
    fn window_empties_after_exactly_capacity_samples() {
        let mut tracker = SmoothnessTracker::new(SegmentRole::Thigh);
        for i in 0..SMOOTHNESS_WINDOW_CAPACITY - 1 {
            assert!(tracker.record(Orientation::identity(), i as u64 * 16, 0.016).is_none());
        }
        assert_eq!(tracker.pending_samples(), SMOOTHNESS_WINDOW_CAPACITY - 1);
        assert!(tracker.take_request(9_000, 0.016).is_none());

        let request = tracker.record(Orientation::identity(), 10_000, 0.016).unwrap();
        assert_eq!(request.quaternions.len(), SMOOTHNESS_WINDOW_CAPACITY);
        assert_eq!(request.time, 10.0);
        assert_eq!(tracker.pending_samples(), 0);
    }

    #[test]
    fn failed_exchange_still_clears_and_keeps_old_metrics() {
        let mut tracker = SmoothnessTracker::new(SegmentRole::Thigh);
        tracker.apply_metrics(SmoothnessMetrics { sparc: -2.0, ldlj: -6.0 });
        let mut analyzer = Scripted { fail: true, pending: None, seen: 0 };

        let mut result = Ok(());
        for i in 0..SMOOTHNESS_WINDOW_CAPACITY {
            result = tracker.record_and_submit(Orientation::identity(), i as u64 * 16, 0.016, &mut analyzer);
        }

        assert!(result.is_err());
        assert_eq!(analyzer.seen, SMOOTHNESS_WINDOW_CAPACITY);
        assert_eq!(tracker.pending_samples(), 0);
        assert!(tracker.collect(&mut analyzer).is_none());
        assert_eq!(tracker.metrics(), Some(SmoothnessMetrics { sparc: -2.0, ldlj: -6.0 }));
        assert_eq!(tracker.stats().windows_dropped, 1);
    }

    #[test]
    fn successful_exchange_reports_metrics() {
        let mut tracker = SmoothnessTracker::new(SegmentRole::Thigh);
        let mut analyzer = Scripted { fail: false, pending: None, seen: 0 };
        for i in 0..SMOOTHNESS_WINDOW_CAPACITY {
            tracker
                .record_and_submit(Orientation::identity(), i as u64 * 16, 0.016, &mut analyzer)
                .unwrap();
        }
        assert_eq!(tracker.collect(&mut analyzer), Some(SmoothnessMetrics { sparc: -1.5, ldlj: -8.0 }));
        assert_eq!(tracker.metrics().map(|m| m.ldlj), Some(-8.0));
    }

    #[test]
    fn disabled_analyzer_drops_windows() {
        let mut tracker = SmoothnessTracker::new(SegmentRole::Shin);
        let mut analyzer = DisabledAnalyzer;
        for i in 0..SMOOTHNESS_WINDOW_CAPACITY {
            tracker.record_and_submit(Orientation::identity(), i as u64, 0.001, &mut analyzer).unwrap();
        }
        assert_eq!(tracker.stats().windows_dropped, 1);
        assert_eq!(tracker.pending_samples(), 0);
        assert!(tracker.metrics().is_none());
    }

    #[test]
    fn request_wire_shape() {
        let request = AnalysisRequest {
            quaternions: vec![SmoothnessSample { orientation: Orientation::identity(), delta_time: 0.5 }],
            delta_time: 0.016,
            time: 12.0,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["quaternions"][0]["w"], 1.0);
        assert_eq!(json["quaternions"][0]["timestamp"], 0.5);
        assert_eq!(json["deltaTime"], 0.016);
        assert_eq!(json["time"], 12.0);
    }

    #[test]
    fn response_accepts_both_key_spellings() {
        let lower: SmoothnessMetrics = serde_json::from_str(r#"{"sparc":-1.5,"ldlj":-8.0}"#).unwrap();
        let upper: SmoothnessMetrics =
            serde_json::from_str(r#"{"message":"Data received successfully","SPARC":-1.5,"LDLJ":-8.0}"#).unwrap();
        assert_eq!(lower, upper);
    }
}
