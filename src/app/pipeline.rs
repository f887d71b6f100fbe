//! Shared pipeline logic used by the CLI handlers.
//!
//! Keeping this in one place avoids duplicating the core workflows:
//! paradigm ingest -> kernel sampling -> design build, and
//! design load -> volume load -> grid checks -> voxelwise fit.
//!
//! The handlers in `app` then focus on presentation (printing vs files).

use crate::cli::{DesignArgs, GlmArgs};
use crate::design::{build_design, DesignBuild};
use crate::domain::{DesignConfig, DesignMatrix, GlmConfig, Protocol};
use crate::error::AppError;
use crate::fit::{fit_series, VolumeFit};
use crate::io::operator::read_operator_csv;
use crate::io::paradigm::{load_paradigm, IngestedParadigm};
use crate::io::protocol::read_protocol;
use crate::io::volume::{check_mask_grid, load_volume3, load_volume4, Volume3};

/// Kernel sampling step when neither flag nor protocol sets one (seconds).
const DEFAULT_DT: f64 = 0.5;

/// Kernel length when neither flag nor protocol sets one (seconds).
const DEFAULT_KERNEL_LENGTH: f64 = 25.0;

/// Drift order when neither flag nor protocol sets one.
const DEFAULT_DRIFT_ORDER: usize = 4;

/// Condition excluded by default (paradigm bookkeeping, not a regressor).
const DEFAULT_EXCLUDE: &str = "final_rest";

/// All computed outputs of a single `aslfit design` run.
#[derive(Debug, Clone)]
pub struct DesignRun {
    pub ingest: IngestedParadigm,
    pub build: DesignBuild,
}

/// All computed outputs of a single `aslfit glm` run.
#[derive(Debug, Clone)]
pub struct GlmRun {
    pub fit: VolumeFit,
    pub mask: Volume3,
    pub shape: [usize; 3],
}

/// Merge CLI flags over the optional protocol into a full design config.
pub fn resolve_design_config(args: &DesignArgs) -> Result<DesignConfig, AppError> {
    let protocol = match &args.protocol {
        Some(path) => read_protocol(path)?,
        None => Protocol::default(),
    };

    let nscans = args.nscans.or(protocol.nscans).ok_or_else(|| {
        AppError::input("Number of scans not set (use --nscans or a protocol file).")
    })?;
    let tr = args.tr.or(protocol.tr).ok_or_else(|| {
        AppError::input("Repetition time not set (use --tr or a protocol file).")
    })?;

    Ok(DesignConfig {
        nscans,
        tr,
        dt: args.dt.or(protocol.dt).unwrap_or(DEFAULT_DT),
        kernel_length: args
            .kernel_length
            .or(protocol.kernel_length)
            .unwrap_or(DEFAULT_KERNEL_LENGTH),
        drift_order: args
            .drift_order
            .or(protocol.drift_order)
            .unwrap_or(DEFAULT_DRIFT_ORDER),
        cond_order: args.cond_order.clone().or(protocol.cond_order),
        exclude: args
            .exclude
            .clone()
            .or(protocol.exclude)
            .unwrap_or_else(|| vec![DEFAULT_EXCLUDE.to_string()]),
        prf_model: args.prf_model,
        normalize_kernels: args.normalize,
    })
}

/// Execute the design pipeline: ingest, kernels, matrix.
pub fn run_design(args: &DesignArgs, config: &DesignConfig) -> Result<DesignRun, AppError> {
    let ingest = load_paradigm(&args.paradigm)?;
    for e in &ingest.row_errors {
        log::warn!("paradigm line {}: {}", e.line, e.message);
    }

    let operator = match &args.prf_operator {
        Some(path) => Some(read_operator_csv(path)?),
        None => None,
    };

    let build = build_design(&ingest.paradigm, config, operator.as_ref())?;
    Ok(DesignRun { ingest, build })
}

/// Execute the GLM pipeline: load series + mask, check grids, fit.
pub fn run_glm(args: &GlmArgs, design: &DesignMatrix) -> Result<GlmRun, AppError> {
    let series = load_volume4(&args.bold)?;
    let mask = load_volume3(&args.mask)?;
    check_mask_grid(&series, &mask)?;

    let config = GlmConfig {
        residual_model: args.residual_model,
        scale: args.scale,
    };
    let fit = fit_series(design, &series.data, &mask.data, &config)?;

    let s = series.data.shape();
    Ok(GlmRun {
        fit,
        mask,
        shape: [s[0], s[1], s[2]],
    })
}
