//! Event sampling, convolution, and temporal resampling.
//!
//! Regressors are built in three steps, each kept as a small pure function:
//!
//! 1. sample the condition's events onto an oversampled time grid
//! 2. convolve with a response kernel (full mode, truncated to input length)
//! 3. resample the convolved series back onto scan frame times
//!
//! Invariant: for a grid derived from `frametimes`, step 3 returns exactly one
//! sample per scan.

use crate::domain::Condition;
use crate::error::AppError;

/// Events sampled onto an oversampled grid: one amplitude per grid point.
#[derive(Debug, Clone)]
pub struct SampledCondition {
    pub regressor: Vec<f64>,
    pub times: Vec<f64>,
    /// Events ignored because their onset fell after the last frame time.
    pub n_dropped: usize,
}

/// Sample a condition's events onto a grid with `oversampling` points per scan.
///
/// Each event contributes its amplitude over `[onset, onset + duration)`;
/// zero-duration events cover a single grid step. The grid spans
/// `[frametimes[0], frametimes[last]]`.
pub fn sample_condition(
    cond: &Condition,
    frametimes: &[f64],
    oversampling: usize,
) -> Result<SampledCondition, AppError> {
    if frametimes.len() < 2 {
        return Err(AppError::input("Need at least two frame times to sample events."));
    }
    if oversampling == 0 {
        return Err(AppError::input("Oversampling must be >= 1."));
    }

    let tmin = frametimes[0];
    let tmax = frametimes[frametimes.len() - 1];
    let n = frametimes.len() * oversampling + 1;
    let step = (tmax - tmin) / (n as f64 - 1.0);
    if !(step.is_finite() && step > 0.0) {
        return Err(AppError::input("Frame times must be strictly increasing."));
    }

    let times: Vec<f64> = (0..n).map(|i| tmin + i as f64 * step).collect();

    // Accumulate onset/offset deltas, then integrate with a cumulative sum.
    let mut deltas = vec![0.0; n];
    let mut n_dropped = 0usize;
    for ((&onset, &duration), &amplitude) in cond
        .onsets
        .iter()
        .zip(cond.durations.iter())
        .zip(cond.amplitudes.iter())
    {
        if onset > tmax {
            n_dropped += 1;
            continue;
        }
        let i0 = times.partition_point(|&t| t < onset);
        let offset = onset + duration.max(0.0);
        let i1 = times.partition_point(|&t| t < offset).max(i0 + 1);
        deltas[i0.min(n - 1)] += amplitude;
        if i1 < n {
            deltas[i1] -= amplitude;
        }
    }

    let mut regressor = Vec::with_capacity(n);
    let mut acc = 0.0;
    for d in deltas {
        acc += d;
        regressor.push(acc);
    }

    Ok(SampledCondition {
        regressor,
        times,
        n_dropped,
    })
}

/// Full convolution of `signal` with `kernel`, truncated to `signal.len()`.
pub fn convolve_truncated(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let mut out = vec![0.0; n];
    for (i, o) in out.iter_mut().enumerate() {
        let kmax = kernel.len().min(i + 1);
        let mut acc = 0.0;
        for (k, &kv) in kernel.iter().enumerate().take(kmax) {
            acc += kv * signal[i - k];
        }
        *o = acc;
    }
    out
}

/// Linearly resample `(times, values)` onto `targets`.
///
/// `times` must be ascending. Targets outside the sampled range clamp to the
/// boundary values.
pub fn resample_linear(values: &[f64], times: &[f64], targets: &[f64]) -> Result<Vec<f64>, AppError> {
    if values.len() != times.len() || values.is_empty() {
        return Err(AppError::numeric("Resampling input lengths do not match."));
    }

    let mut out = Vec::with_capacity(targets.len());
    for &t in targets {
        if t <= times[0] {
            out.push(values[0]);
            continue;
        }
        if t >= times[times.len() - 1] {
            out.push(values[values.len() - 1]);
            continue;
        }
        let hi = times.partition_point(|&x| x < t).max(1);
        let lo = hi - 1;
        let span = times[hi] - times[lo];
        let u = if span > 0.0 { (t - times[lo]) / span } else { 0.0 };
        out.push(values[lo] + u * (values[hi] - values[lo]));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_condition() -> Condition {
        Condition {
            name: "audio".to_string(),
            onsets: vec![10.0],
            durations: vec![6.0],
            amplitudes: vec![1.0],
        }
    }

    fn frametimes(nscans: usize, tr: f64) -> Vec<f64> {
        (0..nscans).map(|i| i as f64 * tr).collect()
    }

    #[test]
    fn sampled_grid_has_expected_length() {
        let ft = frametimes(20, 2.0);
        let s = sample_condition(&block_condition(), &ft, 8).unwrap();
        assert_eq!(s.regressor.len(), 20 * 8 + 1);
        assert_eq!(s.times.len(), s.regressor.len());
        assert_eq!(s.n_dropped, 0);
    }

    #[test]
    fn block_event_covers_its_interval() {
        let ft = frametimes(20, 2.0);
        let s = sample_condition(&block_condition(), &ft, 16).unwrap();
        for (&t, &v) in s.times.iter().zip(s.regressor.iter()) {
            if t > 10.5 && t < 15.5 {
                assert!((v - 1.0).abs() < 1e-12, "expected 1 inside block at t={t}");
            }
            if t < 9.5 || t > 16.5 {
                assert!(v.abs() < 1e-12, "expected 0 outside block at t={t}");
            }
        }
    }

    #[test]
    fn zero_duration_event_is_a_single_step() {
        let cond = Condition {
            name: "click".to_string(),
            onsets: vec![4.0],
            durations: vec![0.0],
            amplitudes: vec![2.0],
        };
        let ft = frametimes(10, 2.0);
        let s = sample_condition(&cond, &ft, 8).unwrap();
        let n_nonzero = s.regressor.iter().filter(|v| v.abs() > 1e-12).count();
        assert_eq!(n_nonzero, 1);
        let peak = s.regressor.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!((peak - 2.0).abs() < 1e-12);
    }

    #[test]
    fn late_events_are_dropped() {
        let cond = Condition {
            name: "late".to_string(),
            onsets: vec![1000.0],
            durations: vec![1.0],
            amplitudes: vec![1.0],
        };
        let ft = frametimes(10, 2.0);
        let s = sample_condition(&cond, &ft, 4).unwrap();
        assert_eq!(s.n_dropped, 1);
        assert!(s.regressor.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn convolution_preserves_length() {
        let signal = vec![0.0; 64];
        let kernel = vec![1.0, 0.5, 0.25];
        assert_eq!(convolve_truncated(&signal, &kernel).len(), 64);
    }

    #[test]
    fn convolving_an_impulse_reproduces_the_kernel() {
        let mut signal = vec![0.0; 16];
        signal[3] = 1.0;
        let kernel = vec![1.0, 0.5, 0.25];
        let out = convolve_truncated(&signal, &kernel);
        assert!((out[3] - 1.0).abs() < 1e-12);
        assert!((out[4] - 0.5).abs() < 1e-12);
        assert!((out[5] - 0.25).abs() < 1e-12);
        assert!(out[6].abs() < 1e-12);
    }

    #[test]
    fn resampling_onto_the_same_grid_is_identity() {
        let times: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let values: Vec<f64> = times.iter().map(|t| t * t).collect();
        let out = resample_linear(&values, &times, &times).unwrap();
        for (a, b) in out.iter().zip(values.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn resampling_interpolates_midpoints() {
        let times = vec![0.0, 1.0];
        let values = vec![0.0, 2.0];
        let out = resample_linear(&values, &times, &[0.5]).unwrap();
        assert!((out[0] - 1.0).abs() < 1e-12);
    }
}
