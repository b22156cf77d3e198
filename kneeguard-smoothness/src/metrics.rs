//! SPARC and LDLJ over a speed profile
//!
//! ## Spectral arc length (SPARC)
//!
//! ```text
//! nfft   = 2^(⌈log2 n⌉ + padlevel)               zero padding
//! M(f)   = |FFT(v, nfft)| / max |FFT|            normalized magnitude spectrum
//! band   = f ≤ fc, then trimmed to the first..last bin with M ≥ amp_th
//! SPARC  = −Σ √( (Δf / (f_last − f_first))² + ΔM² )
//! ```
//!
//! ## Log dimensionless jerk (LDLJ)
//!
//! ```text
//! DLJ  = −(T³ / v_peak²) · Σ (Δ²v / dt²)² · dt       T = n · dt
//! LDLJ = −ln |DLJ|
//! ```
//!
//! Both metrics are ≤ 0 for real movement; the closer to zero, the smoother.
//!
//! The spectrum comes from one forward FFT of the zero-padded profile; a 300-sample
//! window pads to 8192 points.

use rustfft::{num_complex::Complex, FftPlanner};

use crate::error::{SmoothnessError, SmoothnessResult};

/// SPARC tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparcParams {
    /// Extra powers of two of zero padding
    pub padlevel: u32,
    /// Upper cut-off frequency (Hz)
    pub fc: f64,
    /// Normalized magnitude below which the spectrum is ignored
    pub amp_th: f64,
}

impl Default for SparcParams {
    fn default() -> Self {
        Self { padlevel: 4, fc: 10.0, amp_th: 0.05 }
    }
}

/// Spectral arc length with the default parameters
pub fn sparc(speed: &[f64], fs: f64) -> SmoothnessResult<f64> {
    sparc_with(speed, fs, &SparcParams::default())
}

/// Spectral arc length of `speed` sampled at `fs` Hz
pub fn sparc_with(speed: &[f64], fs: f64, params: &SparcParams) -> SmoothnessResult<f64> {
    check_rate(fs)?;
    if speed.is_empty() {
        return Err(SmoothnessError::TooFewSamples { needed: 1, got: 0 });
    }

    let exponent = (speed.len() as f64).log2().ceil() as u32 + params.padlevel;
    let nfft = 1usize << exponent;
    let df = fs / nfft as f64;

    let spectrum = magnitude_spectrum(speed, nfft);
    let peak = spectrum.iter().copied().fold(0.0, f64::max);
    if !(peak.is_finite() && peak > 0.0) {
        return Err(SmoothnessError::FlatSignal);
    }

    let selected: Vec<(f64, f64)> = spectrum
        .iter()
        .enumerate()
        .take_while(|&(k, _)| k as f64 * df <= params.fc)
        .map(|(k, &m)| (k as f64 * df, m / peak))
        .collect();

    let first = selected.iter().position(|&(_, m)| m >= params.amp_th);
    let last = selected.iter().rposition(|&(_, m)| m >= params.amp_th);
    let band = match (first, last) {
        (Some(first), Some(last)) if last > first => &selected[first..=last],
        _ => return Ok(0.0),
    };

    let span = band[band.len() - 1].0 - band[0].0;
    let length: f64 = band
        .windows(2)
        .map(|pair| {
            let df = (pair[1].0 - pair[0].0) / span;
            let dm = pair[1].1 - pair[0].1;
            (df * df + dm * dm).sqrt()
        })
        .sum();
    Ok(-length)
}

/// `|FFT|` of `signal` zero-padded to `nfft` points
fn magnitude_spectrum(signal: &[f64], nfft: usize) -> Vec<f64> {
    let mut buffer: Vec<Complex<f64>> = signal
        .iter()
        .map(|&v| Complex::new(v, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(nfft)
        .collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(nfft);
    fft.process(&mut buffer);

    buffer.iter().map(|c| c.norm()).collect()
}

/// Dimensionless jerk of `speed` sampled at `fs` Hz
pub fn dimensionless_jerk(speed: &[f64], fs: f64) -> SmoothnessResult<f64> {
    check_rate(fs)?;
    if speed.len() < 3 {
        return Err(SmoothnessError::TooFewSamples { needed: 3, got: speed.len() });
    }

    let peak = speed.iter().fold(0.0, |acc: f64, v| acc.max(v.abs()));
    if !(peak.is_finite() && peak > 0.0) {
        return Err(SmoothnessError::FlatSignal);
    }

    let dt = 1.0 / fs;
    let duration = speed.len() as f64 * dt;
    let jerk_energy: f64 = speed
        .windows(3)
        .map(|w| {
            let jerk = (w[2] - 2.0 * w[1] + w[0]) / (dt * dt);
            jerk * jerk
        })
        .sum();

    let scale = duration.powi(3) / (peak * peak);
    Ok(-scale * jerk_energy * dt)
}

/// Log dimensionless jerk of `speed` sampled at `fs` Hz
pub fn ldlj(speed: &[f64], fs: f64) -> SmoothnessResult<f64> {
    let dlj = dimensionless_jerk(speed, fs)?;
    if dlj == 0.0 {
        // Perfectly linear profile; the log is unbounded
        return Err(SmoothnessError::FlatSignal);
    }
    Ok(-dlj.abs().ln())
}

fn check_rate(fs: f64) -> SmoothnessResult<()> {
    if fs.is_finite() && fs > 0.0 {
        Ok(())
    } else {
        Err(SmoothnessError::InvalidSampleRate(fs))
    }
}
