//! Canonical response kernels.
//!
//! The canonical HRF is the difference of two gamma densities:
//!
//! - `h(t) = g(t; 6) - g(t; 16) / 6`
//!
//! with unit dispersion, sampled at `dt` on `[0, length]` and normalized to a
//! peak of 1. The perfusion kernel is derived from it, either directly or
//! through a linear operator matrix supplied by the caller.
//!
//! Numerical notes:
//! - With unit dispersion the gamma shapes are integers, so the normalizing
//!   constant is an exact factorial; no general gamma function is needed.
//! - `g(t; a)` is evaluated in log space to avoid overflow of `t^(a-1)` for
//!   long kernels.

use nalgebra::{DMatrix, DVector};

use crate::error::AppError;

/// Delay of the response peak (seconds).
pub const PEAK_DELAY_S: u32 = 6;

/// Delay of the post-stimulus undershoot (seconds).
pub const UNDERSHOOT_DELAY_S: u32 = 16;

/// Relative amplitude of the undershoot.
pub const UNDERSHOOT_RATIO: f64 = 1.0 / 6.0;

/// Gamma density with integer shape `a` and unit scale, `t >= 0`.
fn gamma_density(t: f64, shape: u32) -> f64 {
    if t <= 0.0 {
        return 0.0;
    }
    let a = shape as f64;
    let ln_norm = ln_factorial(shape - 1);
    ((a - 1.0) * t.ln() - t - ln_norm).exp()
}

fn ln_factorial(n: u32) -> f64 {
    (1..=n).map(|k| (k as f64).ln()).sum()
}

/// Sample the canonical HRF on `[0, length_s]` at step `dt`, peak-normalized.
pub fn canonical_hrf(length_s: f64, dt: f64) -> Result<Vec<f64>, AppError> {
    if !(dt.is_finite() && dt > 0.0) {
        return Err(AppError::input(format!("Invalid kernel step dt={dt} (must be > 0).")));
    }
    if !(length_s.is_finite() && length_s > dt) {
        return Err(AppError::input(format!(
            "Invalid kernel length {length_s}s (must be > dt={dt}s)."
        )));
    }

    let n = (length_s / dt).floor() as usize + 1;
    let mut kernel = Vec::with_capacity(n);
    for i in 0..n {
        let t = i as f64 * dt;
        let v = gamma_density(t, PEAK_DELAY_S) - UNDERSHOOT_RATIO * gamma_density(t, UNDERSHOOT_DELAY_S);
        kernel.push(v);
    }

    let peak = kernel.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(peak.is_finite() && peak > 0.0) {
        return Err(AppError::numeric("Degenerate HRF sampling (non-positive peak)."));
    }
    for v in &mut kernel {
        *v /= peak;
    }
    Ok(kernel)
}

/// Scale a kernel to unit L2 norm in place.
pub fn l2_normalize(kernel: &mut [f64]) {
    let norm = kernel.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in kernel.iter_mut() {
            *v /= norm;
        }
    }
}

/// Apply a perfusion operator matrix to a kernel: `p = omega * h`.
///
/// `omega` must be square with side equal to the kernel length.
pub fn apply_prf_operator(omega: &DMatrix<f64>, kernel: &[f64]) -> Result<Vec<f64>, AppError> {
    if omega.nrows() != omega.ncols() {
        return Err(AppError::input(format!(
            "Perfusion operator must be square, got {}x{}.",
            omega.nrows(),
            omega.ncols()
        )));
    }
    if omega.ncols() != kernel.len() {
        return Err(AppError::input(format!(
            "Perfusion operator side ({}) does not match kernel length ({}).",
            omega.ncols(),
            kernel.len()
        )));
    }
    let h = DVector::from_column_slice(kernel);
    let p = omega * h;
    if p.iter().any(|v| !v.is_finite()) {
        return Err(AppError::numeric("Perfusion operator produced non-finite kernel values."));
    }
    Ok(p.iter().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hrf_starts_at_zero_and_peaks_near_five_seconds() {
        let dt = 0.1;
        let hrf = canonical_hrf(25.0, dt).unwrap();
        assert!(hrf[0].abs() < 1e-12);

        let (imax, _) = hrf
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });
        let t_peak = imax as f64 * dt;
        // Peak of g(t;6) - g(t;16)/6 sits close to the mode of g(t;6) at t=5.
        assert!((4.0..6.5).contains(&t_peak), "peak at {t_peak}s");
        assert!((hrf[imax] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn hrf_has_undershoot() {
        let hrf = canonical_hrf(30.0, 0.5).unwrap();
        let min = hrf.iter().copied().fold(f64::INFINITY, f64::min);
        assert!(min < 0.0, "expected a negative undershoot, min={min}");
    }

    #[test]
    fn hrf_rejects_bad_sampling() {
        assert!(canonical_hrf(25.0, 0.0).is_err());
        assert!(canonical_hrf(0.1, 0.5).is_err());
    }

    #[test]
    fn l2_normalize_sets_unit_norm() {
        let mut k = vec![3.0, 4.0];
        l2_normalize(&mut k);
        let norm = k.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-12);
    }

    #[test]
    fn identity_operator_preserves_kernel() {
        let hrf = canonical_hrf(25.0, 0.5).unwrap();
        let eye = DMatrix::identity(hrf.len(), hrf.len());
        let prf = apply_prf_operator(&eye, &hrf).unwrap();
        for (a, b) in prf.iter().zip(hrf.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn operator_side_mismatch_is_an_error() {
        let hrf = canonical_hrf(25.0, 0.5).unwrap();
        let omega = DMatrix::identity(3, 3);
        assert!(apply_prf_operator(&omega, &hrf).is_err());
    }
}
