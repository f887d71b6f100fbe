//! Polynomial drift basis.
//!
//! Low-frequency scanner drift is modeled by orthonormal polynomials over
//! normalized scan time. Degree 0 is the constant column, so the drift block
//! doubles as the session baseline.

use nalgebra::DMatrix;

use crate::error::AppError;

/// Build an orthonormal polynomial basis of degree `0..=order` over `nscans`
/// normalized time points.
///
/// Columns are mutually orthonormal (Gram-Schmidt with re-orthogonalization).
pub fn poly_drift(nscans: usize, order: usize) -> Result<DMatrix<f64>, AppError> {
    if nscans == 0 {
        return Err(AppError::input("Drift basis needs at least one scan."));
    }
    let ncols = order + 1;
    if ncols >= nscans {
        return Err(AppError::input(format!(
            "Drift order {order} leaves no degrees of freedom for {nscans} scans."
        )));
    }

    // Vandermonde on t in [0, 1].
    let denom = (nscans.max(2) - 1) as f64;
    let mut basis = DMatrix::<f64>::zeros(nscans, ncols);
    for i in 0..nscans {
        let t = i as f64 / denom;
        for d in 0..ncols {
            basis[(i, d)] = t.powi(d as i32);
        }
    }

    // Modified Gram-Schmidt, twice for numerical hygiene.
    for j in 0..ncols {
        for _ in 0..2 {
            for k in 0..j {
                let proj = basis.column(j).dot(&basis.column(k));
                for i in 0..nscans {
                    basis[(i, j)] -= proj * basis[(i, k)];
                }
            }
        }
        let norm = basis.column(j).norm();
        if norm < 1e-12 {
            return Err(AppError::numeric(format!(
                "Drift basis degenerated at degree {j} (too few scans)."
            )));
        }
        for i in 0..nscans {
            basis[(i, j)] /= norm;
        }
    }

    Ok(basis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_columns_are_orthonormal() {
        let basis = poly_drift(100, 4).unwrap();
        for j in 0..basis.ncols() {
            for k in 0..=j {
                let dot = basis.column(j).dot(&basis.column(k));
                let expected = if j == k { 1.0 } else { 0.0 };
                assert!(
                    (dot - expected).abs() < 1e-10,
                    "columns {j},{k}: dot={dot}"
                );
            }
        }
    }

    #[test]
    fn degree_zero_is_the_constant_column() {
        let basis = poly_drift(50, 3).unwrap();
        let first = basis[(0, 0)];
        assert!(first > 0.0);
        for i in 0..50 {
            assert!((basis[(i, 0)] - first).abs() < 1e-12);
        }
    }

    #[test]
    fn drift_rejects_orders_without_dof() {
        assert!(poly_drift(4, 4).is_err());
    }
}
