//! Kernel chart: HRF and PRF polylines rendered to a PNG.
//!
//! The chart is intentionally text-free (plotters is built without font
//! support); the sampling step and amplitudes are reported on the terminal
//! instead.

use std::path::Path;

use plotters::prelude::*;

use crate::error::AppError;

/// Render the HRF (blue) and PRF (red) over time, plus a zero line.
pub fn render_kernel_chart(
    path: &Path,
    hrf: &[f64],
    prf: &[f64],
    dt: f64,
    width: u32,
    height: u32,
) -> Result<(), AppError> {
    if hrf.is_empty() || prf.is_empty() {
        return Err(AppError::numeric("Cannot chart empty kernels."));
    }

    let chart_err = |e: String| AppError::input(format!("Failed to render kernel chart: {e}"));

    let n = hrf.len().max(prf.len());
    let tmax = (n as f64 - 1.0) * dt;
    let ymin = hrf
        .iter()
        .chain(prf.iter())
        .copied()
        .fold(f64::INFINITY, f64::min);
    let ymax = hrf
        .iter()
        .chain(prf.iter())
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    if !(ymin.is_finite() && ymax.is_finite()) {
        return Err(AppError::numeric("Kernels contain non-finite values."));
    }
    let pad = ((ymax - ymin) * 0.05).max(1e-6);

    let root = BitMapBackend::new(path, (width.max(64), height.max(64))).into_drawing_area();
    root.fill(&WHITE).map_err(|e| chart_err(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(12)
        .build_cartesian_2d(0.0..tmax.max(dt), (ymin - pad)..(ymax + pad))
        .map_err(|e| chart_err(e.to_string()))?;

    chart
        .draw_series(LineSeries::new([(0.0, 0.0), (tmax, 0.0)], &BLACK.mix(0.3)))
        .map_err(|e| chart_err(e.to_string()))?;
    chart
        .draw_series(LineSeries::new(
            hrf.iter().enumerate().map(|(i, &v)| (i as f64 * dt, v)),
            &BLUE,
        ))
        .map_err(|e| chart_err(e.to_string()))?;
    chart
        .draw_series(LineSeries::new(
            prf.iter().enumerate().map(|(i, &v)| (i as f64 * dt, v)),
            &RED,
        ))
        .map_err(|e| chart_err(e.to_string()))?;

    root.present().map_err(|e| chart_err(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::canonical_hrf;

    #[test]
    fn chart_writes_a_png() {
        let hrf = canonical_hrf(25.0, 0.5).unwrap();
        let path = std::env::temp_dir().join(format!("aslfit-kernels-{}.png", std::process::id()));
        render_kernel_chart(&path, &hrf, &hrf, 0.5, 320, 200).unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.len() > 0);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn empty_kernels_are_rejected() {
        let path = std::env::temp_dir().join("aslfit-kernels-empty.png");
        assert!(render_kernel_chart(&path, &[], &[], 0.5, 320, 200).is_err());
    }
}
