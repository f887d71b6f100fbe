//! Voxelwise GLM fit.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array3, Array4, Axis};
use rayon::prelude::*;

use crate::domain::{DesignMatrix, GlmConfig, ResidualModel, ScaleMode};
use crate::error::AppError;
use crate::math::{fit_ols, lag1_autocorr, prewhiten, solve_least_squares};

/// Fit results for every voxel inside the mask.
#[derive(Debug, Clone)]
pub struct VolumeFit {
    /// Regressor names, parallel to the rows of `beta`.
    pub names: Vec<String>,
    /// `nregressors x n_voxels` coefficients.
    pub beta: DMatrix<f64>,
    /// Residual variance per voxel.
    pub sigma2: Vec<f64>,
    /// Residual degrees of freedom.
    pub dof: f64,
    /// Per-voxel AR(1) coefficients (AR(1) model only).
    pub rho: Option<Vec<f64>>,
    /// Voxel coordinates, parallel to the columns of `beta`.
    pub indices: Vec<[usize; 3]>,
}

impl VolumeFit {
    pub fn n_voxels(&self) -> usize {
        self.indices.len()
    }

    /// Row of betas for one regressor.
    pub fn betas_for(&self, regressor: usize) -> Vec<f64> {
        self.beta.row(regressor).iter().copied().collect()
    }

    /// Portable summary for the fit JSON.
    pub fn summary(&self, config: &GlmConfig) -> crate::domain::FitSummary {
        let nv = self.n_voxels().max(1) as f64;
        let regressors = self
            .names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let betas = self.betas_for(i);
                crate::domain::RegressorStat {
                    name: name.clone(),
                    beta_min: betas.iter().copied().fold(f64::INFINITY, f64::min),
                    beta_max: betas.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    beta_mean: betas.iter().sum::<f64>() / nv,
                }
            })
            .collect();

        crate::domain::FitSummary {
            tool: "aslfit".to_string(),
            generated: chrono::Utc::now(),
            residual_model: config.residual_model,
            scale: config.scale,
            n_voxels: self.n_voxels(),
            dof: self.dof,
            mean_sigma2: self.sigma2.iter().sum::<f64>() / nv,
            mean_rho: self
                .rho
                .as_ref()
                .map(|r| r.iter().sum::<f64>() / r.len().max(1) as f64),
            regressors,
        }
    }
}

/// Coordinates of voxels with positive mask values.
pub fn mask_indices(mask: &Array3<f64>) -> Vec<[usize; 3]> {
    let mut out = Vec::new();
    for ((i, j, k), &v) in mask.indexed_iter() {
        if v > 0.0 {
            out.push([i, j, k]);
        }
    }
    out
}

/// Time-by-voxel matrix of the series restricted to `indices`.
pub fn extract_masked(series: &Array4<f64>, indices: &[[usize; 3]]) -> DMatrix<f64> {
    let n = series.len_of(Axis(3));
    DMatrix::from_fn(n, indices.len(), |t, j| {
        let [x, y, z] = indices[j];
        series[[x, y, z, t]]
    })
}

/// Expand per-voxel values into a volume, zero outside the mask.
pub fn expand_map(values: &[f64], indices: &[[usize; 3]], shape: [usize; 3]) -> Array3<f64> {
    let mut out = Array3::zeros((shape[0], shape[1], shape[2]));
    for ([x, y, z], &v) in indices.iter().zip(values.iter()) {
        out[[*x, *y, *z]] = v;
    }
    out
}

/// Fit a design to the masked voxels of a 4-D series.
pub fn fit_series(
    design: &DesignMatrix,
    series: &Array4<f64>,
    mask: &Array3<f64>,
    config: &GlmConfig,
) -> Result<VolumeFit, AppError> {
    let n = series.len_of(Axis(3));
    if design.nscans() != n {
        return Err(AppError::data(format!(
            "Design has {} rows but the series has {n} scans.",
            design.nscans()
        )));
    }

    let indices = mask_indices(mask);
    if indices.is_empty() {
        return Err(AppError::data("Mask selects no voxels."));
    }
    log::info!("fitting {} voxels over {} scans", indices.len(), n);

    let mut y = extract_masked(series, &indices);
    if let ScaleMode::Percent = config.scale {
        scale_percent(&mut y)?;
    }

    let x = &design.matrix;
    match config.residual_model {
        ResidualModel::Spherical => {
            let fit = fit_ols(x, &y)?;
            Ok(VolumeFit {
                names: design.names.clone(),
                beta: fit.beta,
                sigma2: fit.sigma2,
                dof: fit.dof,
                rho: None,
                indices,
            })
        }
        ResidualModel::Ar1 => fit_ar1(design, x, &y, indices),
    }
}

/// Percent signal change over the masked series: `y <- (y - mean) * 100 / range`.
fn scale_percent(y: &mut DMatrix<f64>) -> Result<(), AppError> {
    let n = (y.nrows() * y.ncols()) as f64;
    let mean = y.iter().sum::<f64>() / n;
    let max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = y.iter().copied().fold(f64::INFINITY, f64::min);
    let range = max - min;
    if !(range.is_finite() && range > 0.0) {
        return Err(AppError::numeric(
            "Cannot rescale to percent signal: masked series has zero range.",
        ));
    }
    for v in y.iter_mut() {
        *v = (*v - mean) * 100.0 / range;
    }
    Ok(())
}

fn fit_ar1(
    design: &DesignMatrix,
    x: &DMatrix<f64>,
    y: &DMatrix<f64>,
    indices: Vec<[usize; 3]>,
) -> Result<VolumeFit, AppError> {
    let n = x.nrows();
    let p = x.ncols();

    // First pass: plain OLS residuals give the per-voxel AR(1) estimates.
    let initial = fit_ols(x, y)?;
    let residuals = y - x * &initial.beta;
    let rho: Vec<f64> = (0..y.ncols())
        .map(|j| {
            let col: Vec<f64> = residuals.column(j).iter().copied().collect();
            lag1_autocorr(&col)
        })
        .collect();

    // Second pass: prewhiten and re-solve each voxel. The whitened design
    // differs per voxel, so the work is parallelized over voxel columns.
    let columns = (0..y.ncols())
        .into_par_iter()
        .map(|j| -> Result<(DVector<f64>, f64), AppError> {
            let col = DVector::from_iterator(n, y.column(j).iter().copied());
            let (xw, yw) = prewhiten(x, &col, rho[j]);
            let beta = solve_least_squares(&xw, &yw).ok_or_else(|| {
                AppError::numeric("Prewhitened design is too ill-conditioned to fit.")
            })?;
            let resid = &yw - &xw * &beta;
            let dof = (n - p) as f64;
            let sigma2 = resid.iter().map(|r| r * r).sum::<f64>() / dof;
            Ok((beta, sigma2))
        })
        .collect::<Result<Vec<(DVector<f64>, f64)>, AppError>>()?;

    let mut beta = DMatrix::<f64>::zeros(p, y.ncols());
    let mut sigma2 = Vec::with_capacity(y.ncols());
    for (j, (b, s2)) in columns.into_iter().enumerate() {
        beta.set_column(j, &b);
        sigma2.push(s2);
    }

    Ok(VolumeFit {
        names: design.names.clone(),
        beta,
        sigma2,
        dof: (n - p) as f64,
        rho: Some(rho),
        indices,
    })
}
