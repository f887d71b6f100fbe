//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during design construction and fitting
//! - exported to JSON/CSV/MAT
//! - reloaded later for fitting or plotting

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Which perfusion response model to use for the ASL regressors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PrfModel {
    /// Reuse the hemodynamic kernel as the perfusion kernel.
    Hrf,
    /// Apply a physiological linear operator matrix to the hemodynamic kernel.
    ///
    /// Requires `--prf-operator` (square matrix, side = kernel length in samples).
    Physio,
}

/// Residual model for the GLM fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResidualModel {
    /// Independent identically distributed residuals; one shared SVD solve.
    Spherical,
    /// Per-voxel AR(1) prewhitening (Cochrane-Orcutt), parallel over voxels.
    Ar1,
}

/// How the voxel time series are rescaled before fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMode {
    /// Fit the raw signal.
    None,
    /// Percent signal change: `y <- (y - mean) * 100 / (max - min)`,
    /// with mean/max/min taken over the masked series.
    Percent,
}

/// Anatomical axis along which a display slice is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SliceAxis {
    Sagittal,
    Coronal,
    Axial,
}

impl SliceAxis {
    /// Array axis index in (x, y, z) voxel order.
    pub fn to_index(self) -> usize {
        match self {
            SliceAxis::Sagittal => 0,
            SliceAxis::Coronal => 1,
            SliceAxis::Axial => 2,
        }
    }
}

/// Output raster format for figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FigureFormat {
    Png,
    Jpeg,
}

impl FigureFormat {
    pub fn extension(self) -> &'static str {
        match self {
            FigureFormat::Png => "png",
            FigureFormat::Jpeg => "jpg",
        }
    }
}

/// One experimental condition: parallel event arrays sorted by onset.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub name: String,
    /// Event onset times (seconds), ascending.
    pub onsets: Vec<f64>,
    /// Event durations (seconds), parallel to `onsets`.
    pub durations: Vec<f64>,
    /// Event amplitudes, parallel to `onsets` (1.0 when the file has none).
    pub amplitudes: Vec<f64>,
}

impl Condition {
    pub fn n_events(&self) -> usize {
        self.onsets.len()
    }
}

/// A parsed experimental paradigm: conditions in file order.
#[derive(Debug, Clone, Default)]
pub struct Paradigm {
    pub conditions: Vec<Condition>,
}

impl Paradigm {
    pub fn condition(&self, name: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.conditions.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn n_events(&self) -> usize {
        self.conditions.iter().map(Condition::n_events).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.iter().all(|c| c.onsets.is_empty())
    }

    /// Copy of the paradigm with the named conditions removed.
    pub fn without(&self, exclude: &[String]) -> Paradigm {
        Paradigm {
            conditions: self
                .conditions
                .iter()
                .filter(|c| !exclude.iter().any(|e| e == &c.name))
                .cloned()
                .collect(),
        }
    }
}

/// Configuration for design matrix construction.
#[derive(Debug, Clone)]
pub struct DesignConfig {
    /// Number of scans (rows of the design matrix).
    pub nscans: usize,
    /// Repetition time (seconds between scans).
    pub tr: f64,
    /// Kernel sampling step (seconds); also sets the convolution oversampling.
    pub dt: f64,
    /// Length of the response kernels (seconds).
    pub kernel_length: f64,
    /// Maximum degree of the polynomial drift basis (degree 0 = constant).
    pub drift_order: usize,
    /// Explicit condition column order; paradigm order when `None`.
    pub cond_order: Option<Vec<String>>,
    /// Conditions dropped before building regressors.
    pub exclude: Vec<String>,
    pub prf_model: PrfModel,
    /// Set each kernel's L2 norm to one.
    pub normalize_kernels: bool,
}

/// A built design matrix with its timing metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    /// Regressor names, parallel to the matrix columns.
    pub names: Vec<String>,
    /// `nscans x nregressors`.
    pub matrix: DMatrix<f64>,
    pub tr: f64,
    pub dt: f64,
}

impl DesignMatrix {
    pub fn nscans(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn nregressors(&self) -> usize {
        self.matrix.ncols()
    }

    /// Scan acquisition times (seconds).
    pub fn frametimes(&self) -> Vec<f64> {
        (0..self.nscans()).map(|i| i as f64 * self.tr).collect()
    }
}

/// Portable (JSON) form of a design matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignFile {
    pub tool: String,
    pub generated: DateTime<Utc>,
    pub tr: f64,
    pub dt: f64,
    pub nscans: usize,
    pub names: Vec<String>,
    /// Column-major regressor values; `columns[j]` has `nscans` samples.
    pub columns: Vec<Vec<f64>>,
}

impl DesignFile {
    pub fn from_design(design: &DesignMatrix) -> Self {
        let columns = (0..design.nregressors())
            .map(|j| design.matrix.column(j).iter().copied().collect())
            .collect();
        DesignFile {
            tool: "aslfit".to_string(),
            generated: Utc::now(),
            tr: design.tr,
            dt: design.dt,
            nscans: design.nscans(),
            names: design.names.clone(),
            columns,
        }
    }

    pub fn to_design(&self) -> Result<DesignMatrix, AppError> {
        if self.names.len() != self.columns.len() {
            return Err(AppError::data(format!(
                "Design file has {} names but {} columns.",
                self.names.len(),
                self.columns.len()
            )));
        }
        if self.columns.iter().any(|c| c.len() != self.nscans) {
            return Err(AppError::data(
                "Design file column length does not match nscans.",
            ));
        }
        if self.columns.is_empty() {
            return Err(AppError::data("Design file has no regressors."));
        }
        let matrix = DMatrix::from_fn(self.nscans, self.columns.len(), |i, j| self.columns[j][i]);
        Ok(DesignMatrix {
            names: self.names.clone(),
            matrix,
            tr: self.tr,
            dt: self.dt,
        })
    }
}

/// Configuration for the GLM fit.
#[derive(Debug, Clone)]
pub struct GlmConfig {
    pub residual_model: ResidualModel,
    pub scale: ScaleMode,
}

/// Per-regressor effect-size summary for the fit JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressorStat {
    pub name: String,
    pub beta_min: f64,
    pub beta_max: f64,
    pub beta_mean: f64,
}

/// Portable (JSON) summary of a GLM fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitSummary {
    pub tool: String,
    pub generated: DateTime<Utc>,
    pub residual_model: ResidualModel,
    pub scale: ScaleMode,
    pub n_voxels: usize,
    pub dof: f64,
    pub mean_sigma2: f64,
    pub mean_rho: Option<f64>,
    pub regressors: Vec<RegressorStat>,
}

/// Scan protocol file (TOML). All fields optional; CLI flags take precedence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Protocol {
    pub nscans: Option<usize>,
    pub tr: Option<f64>,
    pub dt: Option<f64>,
    pub kernel_length: Option<f64>,
    pub drift_order: Option<usize>,
    pub cond_order: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn design_file_round_trips() {
        let design = DesignMatrix {
            names: vec!["a".to_string(), "b".to_string()],
            matrix: DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            tr: 2.0,
            dt: 0.5,
        };
        let file = DesignFile::from_design(&design);
        let back = file.to_design().unwrap();
        assert_eq!(back.names, design.names);
        assert_eq!(back.matrix, design.matrix);
    }

    #[test]
    fn design_file_rejects_ragged_columns() {
        let file = DesignFile {
            tool: "aslfit".to_string(),
            generated: Utc::now(),
            tr: 2.0,
            dt: 0.5,
            nscans: 3,
            names: vec!["a".to_string()],
            columns: vec![vec![1.0, 2.0]],
        };
        assert!(file.to_design().is_err());
    }

    #[test]
    fn paradigm_without_drops_named_conditions() {
        let paradigm = Paradigm {
            conditions: vec![
                Condition {
                    name: "audio".to_string(),
                    onsets: vec![0.0],
                    durations: vec![1.0],
                    amplitudes: vec![1.0],
                },
                Condition {
                    name: "final_rest".to_string(),
                    onsets: vec![10.0],
                    durations: vec![5.0],
                    amplitudes: vec![1.0],
                },
            ],
        };
        let kept = paradigm.without(&["final_rest".to_string()]);
        assert_eq!(kept.names(), vec!["audio"]);
    }
}
