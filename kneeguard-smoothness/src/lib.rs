//! Reference movement-smoothness analysis for KneeGuard
//!
//! ## Overview
//!
//! The session ships every full window of tracked-segment orientations to an analysis
//! service and folds the two numbers it gets back into its recording. This crate is
//! that service:
//!
//! ```text
//! AnalysisRequest ─▶ cumulative time axis ─▶ angular_speed ─▶ ┬─▶ sparc ─┐
//!                                                             └─▶ ldlj  ─┴─▶ SmoothnessMetrics
//! ```
//!
//! ## Sampling rate
//!
//! Both metrics need a sampling rate. By default it is derived from the window itself
//! (samples per second of covered time), so a feeder running at 60 Hz is analysed at
//! 60 Hz. [`AnalysisServer::with_sample_rate`] pins a fixed rate instead.
//!
//! ## Example
//!
//! ```no_run
//! use kneeguard_core::Framing;
//! use kneeguard_smoothness::AnalysisServer;
//!
//! let server = AnalysisServer::bind("127.0.0.1:5556", Framing::LengthPrefixed)?;
//! server.serve()?;
//! # Ok::<(), kneeguard_core::KneeGuardError>(())
//! ```

#![deny(unsafe_code)]

pub mod error;
pub mod kinematics;
pub mod metrics;
pub mod server;

pub use error::{SmoothnessError, SmoothnessResult};
pub use kinematics::angular_speed;
pub use metrics::{dimensionless_jerk, ldlj, sparc, sparc_with, SparcParams};
pub use server::AnalysisServer;

use kneeguard_core::{AnalysisRequest, Orientation, SmoothnessMetrics};

/// Score one window
///
/// Samples whose delta does not advance time (other than the first) are skipped.
/// `sample_rate` overrides the rate derived from the window.
pub fn analyze(request: &AnalysisRequest, sample_rate: Option<f64>) -> SmoothnessResult<SmoothnessMetrics> {
    let mut orientations: Vec<Orientation> = Vec::with_capacity(request.quaternions.len());
    let mut times: Vec<f64> = Vec::with_capacity(request.quaternions.len());
    let mut clock = 0.0;

    for (i, sample) in request.quaternions.iter().enumerate() {
        if i > 0 && sample.delta_time <= 0.0 {
            continue;
        }
        clock += sample.delta_time.max(0.0);
        orientations.push(sample.orientation);
        times.push(clock);
    }

    let speed = angular_speed(&orientations, &times)?;
    let fs = match sample_rate {
        Some(fs) => fs,
        None => derived_rate(&times)?,
    };

    Ok(SmoothnessMetrics { sparc: sparc(&speed, fs)?, ldlj: ldlj(&speed, fs)? })
}

fn derived_rate(times: &[f64]) -> SmoothnessResult<f64> {
    let span = match (times.first(), times.last()) {
        (Some(first), Some(last)) => last - first,
        _ => 0.0,
    };
    let fs = (times.len() as f64 - 1.0) / span;
    if fs.is_finite() && fs > 0.0 {
        Ok(fs)
    } else {
        Err(SmoothnessError::InvalidSampleRate(fs))
    }
}
