//! General linear model solvers.
//!
//! The design matrix is shared by every voxel, so the spherical (i.i.d.
//! residual) fit factorizes the design once with SVD and solves all voxel
//! columns in one call. The AR(1) path prewhitens per voxel and re-solves,
//! since the whitened design differs voxel to voxel.
//!
//! Implementation choices:
//! - SVD rather than QR so tall (scans >> regressors) and nearly collinear
//!   designs solve robustly. (Nalgebra's `QR::solve` is intended for square
//!   systems.)
//! - A tolerance ladder accepts the strictest solve that yields finite
//!   coefficients.

use nalgebra::{DMatrix, DVector};

use crate::error::AppError;

/// Tolerance ladder for the SVD solve, strictest first.
const SVD_TOLERANCES: [f64; 3] = [1e-10, 1e-8, 1e-6];

/// Upper bound on the magnitude of the AR(1) coefficient estimate.
const RHO_CLAMP: f64 = 0.95;

/// Result of a least-squares fit of one design against many observation columns.
#[derive(Debug, Clone)]
pub struct OlsFit {
    /// `nregressors x ncolumns` coefficient matrix.
    pub beta: DMatrix<f64>,
    /// Residual variance per observation column (SSE / dof).
    pub sigma2: Vec<f64>,
    /// Residual degrees of freedom (`nscans - rank(X)`).
    pub dof: f64,
}

/// Solve a least squares problem with a single right-hand side.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);
    for &tol in &SVD_TOLERANCES {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }
    None
}

/// Fit `Y = X B + E` by ordinary least squares for all columns of `Y` at once.
pub fn fit_ols(x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<OlsFit, AppError> {
    let n = x.nrows();
    if y.nrows() != n {
        return Err(AppError::data(format!(
            "Design has {n} rows but the series has {} time points.",
            y.nrows()
        )));
    }
    if n <= x.ncols() {
        return Err(AppError::data(format!(
            "Underdetermined fit: {n} scans for {} regressors.",
            x.ncols()
        )));
    }

    let svd = x.clone().svd(true, true);
    let mut beta = None;
    let mut rank = 0usize;
    for &tol in &SVD_TOLERANCES {
        if let Ok(b) = svd.solve(y, tol) {
            if b.iter().all(|v| v.is_finite()) {
                rank = svd.rank(tol);
                beta = Some(b);
                break;
            }
        }
    }
    let beta = beta.ok_or_else(|| AppError::numeric("Design matrix is too ill-conditioned to fit."))?;

    let dof = (n - rank.min(n)) as f64;
    if dof <= 0.0 {
        return Err(AppError::numeric("No residual degrees of freedom left."));
    }

    let residuals = y - x * &beta;
    let sigma2 = (0..residuals.ncols())
        .map(|j| residuals.column(j).iter().map(|r| r * r).sum::<f64>() / dof)
        .collect();

    Ok(OlsFit { beta, sigma2, dof })
}

/// Lag-1 autocorrelation of a residual series, clamped to `(-RHO_CLAMP, RHO_CLAMP)`.
pub fn lag1_autocorr(residuals: &[f64]) -> f64 {
    if residuals.len() < 3 {
        return 0.0;
    }
    let denom: f64 = residuals.iter().map(|r| r * r).sum();
    if denom <= 0.0 {
        return 0.0;
    }
    let num: f64 = residuals.windows(2).map(|w| w[0] * w[1]).sum();
    (num / denom).clamp(-RHO_CLAMP, RHO_CLAMP)
}

/// AR(1) prewhitening transform of a design and one observation column.
///
/// Rows `1..n` become first differences weighted by `rho`; row 0 is scaled by
/// `sqrt(1 - rho^2)` so the transform is the exact GLS square root.
pub fn prewhiten(x: &DMatrix<f64>, y: &DVector<f64>, rho: f64) -> (DMatrix<f64>, DVector<f64>) {
    let n = x.nrows();
    let p = x.ncols();
    let w0 = (1.0 - rho * rho).max(0.0).sqrt();

    let mut xw = DMatrix::<f64>::zeros(n, p);
    let mut yw = DVector::<f64>::zeros(n);
    for j in 0..p {
        xw[(0, j)] = w0 * x[(0, j)];
    }
    yw[0] = w0 * y[0];
    for i in 1..n {
        for j in 0..p {
            xw[(i, j)] = x[(i, j)] - rho * x[(i - 1, j)];
        }
        yw[i] = y[i] - rho * y[i - 1];
    }
    (xw, yw)
}
