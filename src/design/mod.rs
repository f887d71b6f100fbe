//! Design matrix construction.
//!
//! Column layout, in order:
//!
//! 1. one BOLD regressor per condition (events convolved with the HRF)
//! 2. one perfusion regressor per condition (events convolved with the PRF,
//!    multiplied by the tag/control alternation)
//! 3. the perfusion baseline (the tag/control alternation itself)
//! 4. the orthonormal polynomial drift block (degree 0 = constant baseline)

pub mod drift;

pub use drift::*;

use nalgebra::DMatrix;

use crate::domain::{Condition, DesignConfig, DesignMatrix, Paradigm, PrfModel};
use crate::error::AppError;
use crate::math::{
    apply_prf_operator, canonical_hrf, convolve_truncated, l2_normalize, resample_linear,
    sample_condition,
};

/// A built design plus the kernels used, for reporting and kernel charts.
#[derive(Debug, Clone)]
pub struct DesignBuild {
    pub design: DesignMatrix,
    pub hrf: Vec<f64>,
    pub prf: Vec<f64>,
}

/// Tag/control weights over scans: `+1, -1, +1, ...`.
pub fn tag_control_weights(nscans: usize) -> Vec<f64> {
    (0..nscans).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect()
}

/// Build the full design matrix for a paradigm.
///
/// `prf_operator` is required for `PrfModel::Physio` and ignored otherwise.
pub fn build_design(
    paradigm: &Paradigm,
    config: &DesignConfig,
    prf_operator: Option<&DMatrix<f64>>,
) -> Result<DesignBuild, AppError> {
    if config.nscans < 2 {
        return Err(AppError::input(format!(
            "Need at least 2 scans to build a design, got {}.",
            config.nscans
        )));
    }
    if !(config.tr.is_finite() && config.tr > 0.0) {
        return Err(AppError::input(format!("Invalid TR {} (must be > 0).", config.tr)));
    }

    let paradigm = paradigm.without(&config.exclude);
    if paradigm.conditions.is_empty() || paradigm.is_empty() {
        return Err(AppError::data("No conditions left after exclusion."));
    }

    let order = resolve_cond_order(&paradigm, config.cond_order.as_deref())?;

    let mut hrf = canonical_hrf(config.kernel_length, config.dt)?;
    let mut prf = match config.prf_model {
        PrfModel::Hrf => hrf.clone(),
        PrfModel::Physio => {
            let omega = prf_operator.ok_or_else(|| {
                AppError::input("PRF model `physio` requires a perfusion operator matrix.")
            })?;
            apply_prf_operator(omega, &hrf)?
        }
    };
    if config.normalize_kernels {
        l2_normalize(&mut hrf);
        l2_normalize(&mut prf);
    }

    let frametimes: Vec<f64> = (0..config.nscans).map(|i| i as f64 * config.tr).collect();
    let oversampling = ((config.tr / config.dt).round() as usize).max(1);
    let weights = tag_control_weights(config.nscans);

    let mut names = Vec::new();
    let mut columns: Vec<Vec<f64>> = Vec::new();

    for cond in &order {
        columns.push(condition_regressor(cond, &frametimes, oversampling, &hrf)?);
        names.push(format!("{}_bold", cond.name));
    }
    for cond in &order {
        let mut col = condition_regressor(cond, &frametimes, oversampling, &prf)?;
        for (v, w) in col.iter_mut().zip(weights.iter()) {
            *v *= w;
        }
        columns.push(col);
        names.push(format!("{}_perf", cond.name));
    }

    columns.push(weights.clone());
    names.push("perf_baseline".to_string());

    let drift = poly_drift(config.nscans, config.drift_order)?;
    for d in 0..drift.ncols() {
        columns.push(drift.column(d).iter().copied().collect());
        names.push(format!("drift_{d}"));
    }

    let matrix = DMatrix::from_fn(config.nscans, columns.len(), |i, j| columns[j][i]);
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(AppError::numeric("Design matrix contains non-finite values."));
    }

    Ok(DesignBuild {
        design: DesignMatrix {
            names,
            matrix,
            tr: config.tr,
            dt: config.dt,
        },
        hrf,
        prf,
    })
}

fn condition_regressor(
    cond: &Condition,
    frametimes: &[f64],
    oversampling: usize,
    kernel: &[f64],
) -> Result<Vec<f64>, AppError> {
    let sampled = sample_condition(cond, frametimes, oversampling)?;
    if sampled.n_dropped > 0 {
        log::warn!(
            "condition '{}': {} event(s) fall after the last scan and were dropped",
            cond.name,
            sampled.n_dropped
        );
    }
    let convolved = convolve_truncated(&sampled.regressor, kernel);
    resample_linear(&convolved, &sampled.times, frametimes)
}

fn resolve_cond_order<'a>(
    paradigm: &'a Paradigm,
    requested: Option<&[String]>,
) -> Result<Vec<&'a Condition>, AppError> {
    match requested {
        None => Ok(paradigm.conditions.iter().collect()),
        Some(names) => {
            let mut out = Vec::with_capacity(names.len());
            for name in names {
                let cond = paradigm.condition(name).ok_or_else(|| {
                    AppError::input(format!("Condition '{name}' from --cond-order not in paradigm."))
                })?;
                out.push(cond);
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Paradigm;

    fn paradigm() -> Paradigm {
        Paradigm {
            conditions: vec![
                Condition {
                    name: "audio".to_string(),
                    onsets: vec![12.0, 60.0, 120.0],
                    durations: vec![6.0, 6.0, 6.0],
                    amplitudes: vec![1.0, 1.0, 1.0],
                },
                Condition {
                    name: "video".to_string(),
                    onsets: vec![30.0, 90.0],
                    durations: vec![6.0, 6.0],
                    amplitudes: vec![1.0, 1.0],
                },
            ],
        }
    }

    fn config() -> DesignConfig {
        DesignConfig {
            nscans: 80,
            tr: 2.5,
            dt: 0.5,
            kernel_length: 25.0,
            drift_order: 3,
            cond_order: None,
            exclude: Vec::new(),
            prf_model: PrfModel::Hrf,
            normalize_kernels: false,
        }
    }

    #[test]
    fn design_has_expected_columns() {
        let build = build_design(&paradigm(), &config(), None).unwrap();
        let d = &build.design;
        // 2 bold + 2 perf + perf_baseline + 4 drift columns.
        assert_eq!(d.nregressors(), 9);
        assert_eq!(d.nscans(), 80);
        assert_eq!(
            d.names,
            vec![
                "audio_bold",
                "video_bold",
                "audio_perf",
                "video_perf",
                "perf_baseline",
                "drift_0",
                "drift_1",
                "drift_2",
                "drift_3",
            ]
        );
    }

    #[test]
    fn perfusion_columns_are_tag_control_modulated() {
        // With the HRF reused as PRF, each perfusion column must equal the
        // matching BOLD column times the alternation.
        let build = build_design(&paradigm(), &config(), None).unwrap();
        let d = &build.design;
        let w = tag_control_weights(d.nscans());
        for c in 0..2 {
            let bold = d.matrix.column(c);
            let perf = d.matrix.column(c + 2);
            for i in 0..d.nscans() {
                assert!((perf[i] - bold[i] * w[i]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn bold_regressor_responds_after_onset() {
        let build = build_design(&paradigm(), &config(), None).unwrap();
        let col = build.design.matrix.column(0);
        // Scan 0 precedes the first event.
        assert!(col[0].abs() < 1e-9);
        // Around onset+peak (12s + ~5s -> scan ~7) the response is active.
        assert!(col[7] > 0.1, "expected active response, got {}", col[7]);
    }

    #[test]
    fn explicit_cond_order_reorders_columns() {
        let mut cfg = config();
        cfg.cond_order = Some(vec!["video".to_string(), "audio".to_string()]);
        let build = build_design(&paradigm(), &cfg, None).unwrap();
        assert_eq!(build.design.names[0], "video_bold");
        assert_eq!(build.design.names[1], "audio_bold");
    }

    #[test]
    fn unknown_cond_order_name_is_an_input_error() {
        let mut cfg = config();
        cfg.cond_order = Some(vec!["nope".to_string()]);
        assert!(build_design(&paradigm(), &cfg, None).is_err());
    }

    #[test]
    fn excluding_all_conditions_is_a_data_error() {
        let mut cfg = config();
        cfg.exclude = vec!["audio".to_string(), "video".to_string()];
        assert!(build_design(&paradigm(), &cfg, None).is_err());
    }

    #[test]
    fn physio_without_operator_is_an_input_error() {
        let mut cfg = config();
        cfg.prf_model = PrfModel::Physio;
        assert!(build_design(&paradigm(), &cfg, None).is_err());
    }
}
