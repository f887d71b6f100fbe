//! Reporting utilities: onset statistics and formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized (important for future snapshot tests)

use crate::domain::{DesignConfig, GlmConfig, Paradigm, ResidualModel};
use crate::design::DesignBuild;
use crate::fit::VolumeFit;
use crate::io::paradigm::IngestedParadigm;

/// Conditions ignored by the onset statistics (fixation/blank screens).
const STAT_IGNORED: [&str; 2] = ["blank", "blanc"];

/// Inter-stimulus interval statistics over all scored conditions.
#[derive(Debug, Clone)]
pub struct OnsetStats {
    pub mean_isi: f64,
    pub min_isi: f64,
    pub max_isi: f64,
    pub first_onset: f64,
    pub last_onset: f64,
}

/// Compute onset statistics; `None` with fewer than two scored events.
pub fn onset_stats(paradigm: &Paradigm) -> Option<OnsetStats> {
    let mut onsets: Vec<f64> = paradigm
        .conditions
        .iter()
        .filter(|c| !STAT_IGNORED.contains(&c.name.as_str()))
        .flat_map(|c| c.onsets.iter().copied())
        .collect();
    if onsets.len() < 2 {
        return None;
    }
    onsets.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let diffs: Vec<f64> = onsets.windows(2).map(|w| w[1] - w[0]).collect();
    let mean_isi = diffs.iter().sum::<f64>() / diffs.len() as f64;
    let min_isi = diffs.iter().copied().fold(f64::INFINITY, f64::min);
    let max_isi = diffs.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Some(OnsetStats {
        mean_isi,
        min_isi,
        max_isi,
        first_onset: onsets[0],
        last_onset: onsets[onsets.len() - 1],
    })
}

/// Format a duration in seconds as `H/min/sec` (e.g. `1H2min3.000sec`).
pub fn format_duration(seconds: f64) -> String {
    let mut s = String::new();
    let mut rest = seconds;
    if rest / 3600.0 >= 1.0 {
        s.push_str(&format!("{}H", (rest / 3600.0) as u64));
        rest %= 3600.0;
    }
    if rest / 60.0 >= 1.0 {
        s.push_str(&format!("{}min", (rest / 60.0) as u64));
        rest %= 60.0;
    }
    s.push_str(&format!("{rest:.3}sec"));
    s
}

/// Format the design-run summary (paradigm description + matrix layout).
pub fn format_design_summary(
    ingest: &IngestedParadigm,
    build: &DesignBuild,
    config: &DesignConfig,
) -> String {
    let mut out = String::new();

    out.push_str("=== aslfit - design matrix ===\n");
    out.push_str(&format!(
        "Timing: nscans={} | tr={}s | dt={}s\n",
        config.nscans, config.tr, config.dt
    ));
    out.push_str(&format!(
        "Kernels: length={}s ({} samples) | prf={:?}\n",
        config.kernel_length,
        build.hrf.len(),
        config.prf_model
    ));

    out.push_str("\nConditions:\n");
    let scored = ingest.paradigm.without(&config.exclude);
    for cond in &scored.conditions {
        out.push_str(&format!("- {} ({} events)\n", cond.name, cond.n_events()));
    }
    for name in &config.exclude {
        if ingest.paradigm.condition(name).is_some() {
            out.push_str(&format!("- {name} (excluded)\n"));
        }
    }

    if let Some(stats) = onset_stats(&scored) {
        out.push_str("\nOnsets:\n");
        out.push_str(&format!("- mean ISI: {}\n", format_duration(stats.mean_isi)));
        out.push_str(&format!("- min ISI : {}\n", format_duration(stats.min_isi)));
        out.push_str(&format!("- max ISI : {}\n", format_duration(stats.max_isi)));
        out.push_str(&format!("- first event: {}\n", format_duration(stats.first_onset)));
        out.push_str(&format!("- last event : {}\n", format_duration(stats.last_onset)));
    }

    if !ingest.row_errors.is_empty() {
        out.push_str(&format!("\nSkipped {} malformed row(s):\n", ingest.row_errors.len()));
        for e in ingest.row_errors.iter().take(5) {
            out.push_str(&format!("- line {}: {}\n", e.line, e.message));
        }
        if ingest.row_errors.len() > 5 {
            out.push_str(&format!("- ... and {} more\n", ingest.row_errors.len() - 5));
        }
    }

    out.push_str(&format!(
        "\nDesign: {} scans x {} regressors\n",
        build.design.nscans(),
        build.design.nregressors()
    ));
    out.push_str(&format!("Columns: {}\n", build.design.names.join(", ")));

    out
}

/// Format the GLM fit summary.
pub fn format_glm_summary(fit: &VolumeFit, config: &GlmConfig) -> String {
    let mut out = String::new();

    out.push_str("=== aslfit - GLM fit ===\n");
    out.push_str(&format!(
        "Model: {:?} | scaling: {:?}\n",
        config.residual_model, config.scale
    ));
    out.push_str(&format!(
        "Voxels: {} | dof: {:.1}\n",
        fit.n_voxels(),
        fit.dof
    ));

    let mean_sigma2 = fit.sigma2.iter().sum::<f64>() / fit.sigma2.len().max(1) as f64;
    out.push_str(&format!("Mean residual variance: {mean_sigma2:.5}\n"));
    if let (ResidualModel::Ar1, Some(rho)) = (config.residual_model, &fit.rho) {
        let mean_rho = rho.iter().sum::<f64>() / rho.len().max(1) as f64;
        out.push_str(&format!("Mean AR(1) coefficient: {mean_rho:.3}\n"));
    }

    out.push_str("\nEffect sizes:\n");
    for (i, name) in fit.names.iter().enumerate() {
        let betas = fit.betas_for(i);
        let min = betas.iter().copied().fold(f64::INFINITY, f64::min);
        let max = betas.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        out.push_str(&format!("  {name:<24} beta=[{min:.4}, {max:.4}]\n"));
    }

    out
}
