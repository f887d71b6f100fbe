//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - runs the design/fit/mask pipelines
//! - prints reports
//! - writes exports and figures

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::cli::{Command, DesignArgs, GlmArgs, MaskArgs, PlotArgs, SynthArgs};
use crate::domain::{FigureFormat, GlmConfig};
use crate::error::AppError;
use crate::fit::expand_map;
use crate::render::{
    autocrop, design_raster, extract_slice, overlay_image, palette_bar, render_kernel_chart,
    resample_nearest, save_figure, Colormap, NormWindow,
};

pub mod pipeline;

/// Entry point for the `aslfit` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Design(args) => handle_design(args),
        Command::Glm(args) => handle_glm(args),
        Command::Mask(args) => handle_mask(args),
        Command::Plot(args) => handle_plot(args),
        Command::Synth(args) => handle_synth(args),
    }
}

fn handle_design(args: DesignArgs) -> Result<(), AppError> {
    let config = pipeline::resolve_design_config(&args)?;
    let run = pipeline::run_design(&args, &config)?;

    println!(
        "{}",
        crate::report::format_design_summary(&run.ingest, &run.build, &config)
    );

    let design = &run.build.design;
    if let Some(path) = &args.out_json {
        crate::io::design_json::write_design_json(path, design)?;
        println!("Wrote design JSON: {}", path.display());
    }
    if let Some(path) = &args.out_csv {
        crate::io::export::write_design_csv(path, design)?;
        println!("Wrote design CSV: {}", path.display());
    }
    if let Some(path) = &args.out_mat {
        crate::io::mat::write_design_mat(path, design)?;
        println!("Wrote regressors MAT: {}", path.display());
    }
    if let Some(path) = &args.dmat_png {
        let raster = design_raster(design, 16, 2)?;
        save_figure(&raster, path, FigureFormat::Png)?;
        println!("Wrote design raster: {}", path.display());
    }
    if let Some(path) = &args.kernels_png {
        render_kernel_chart(path, &run.build.hrf, &run.build.prf, design.dt, 640, 360)?;
        println!("Wrote kernel chart: {}", path.display());
    }

    Ok(())
}

fn handle_glm(args: GlmArgs) -> Result<(), AppError> {
    let design = crate::io::design_json::read_design_json(&args.design)?;
    let run = pipeline::run_glm(&args, &design)?;
    let fit = &run.fit;

    std::fs::create_dir_all(&args.out_dir).map_err(|e| {
        AppError::input(format!(
            "Failed to create output dir '{}': {e}",
            args.out_dir.display()
        ))
    })?;

    for (i, name) in fit.names.iter().enumerate() {
        let volume = expand_map(&fit.betas_for(i), &fit.indices, run.shape);
        let path = args.out_dir.join(format!("{name}.nii"));
        crate::io::volume::save_volume3(&path, &volume, &run.mask.header)?;
    }
    let variance = expand_map(&fit.sigma2, &fit.indices, run.shape);
    crate::io::volume::save_volume3(
        &args.out_dir.join("residual_variance.nii"),
        &variance,
        &run.mask.header,
    )?;

    let config = GlmConfig {
        residual_model: args.residual_model,
        scale: args.scale,
    };
    crate::io::export::write_summary_json(
        &args.out_dir.join("fit_summary.json"),
        &fit.summary(&config),
    )?;

    println!("{}", crate::report::format_glm_summary(fit, &config));
    println!(
        "Wrote {} beta map(s) to {}",
        fit.names.len(),
        args.out_dir.display()
    );
    Ok(())
}

fn handle_mask(args: MaskArgs) -> Result<(), AppError> {
    let binary = crate::io::volume::load_volume3(&args.binary)?;
    let prob = crate::io::volume::load_volume3(&args.prob)?;

    let combined = crate::masks::combine_masks(&binary, &prob, args.threshold)?;
    let kept = combined.iter().filter(|&&v| v != 0).count();
    let before = binary.data.iter().filter(|&&v| v != 0.0).count();

    crate::io::volume::save_mask(&args.out, &combined, &binary.header)?;
    println!(
        "Combined mask: {kept} voxel(s) kept of {before} (threshold {}).",
        args.threshold
    );
    println!("Wrote mask: {}", args.out.display());
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let anat = crate::io::volume::load_volume3(&args.anat)?;
    let mask = match &args.mask {
        Some(path) => Some(crate::io::volume::load_volume3(path)?),
        None => None,
    };

    // Load every map and extract its display slice, applying sign/scale.
    let sign = if args.flip_sign { -1.0 } else { 1.0 };
    let factors = resolve_scale_factors(&args.scale_factors, args.maps.len())?;
    let mut slices = Vec::new();
    for (path, factor) in args.maps.iter().zip(factors.iter()) {
        let volume = crate::io::volume::load_volume3(path)?;
        if let Some(m) = &mask {
            crate::io::volume::check_same_grid(&volume, m, "map and mask")?;
        }
        let mut slice = extract_slice(&volume.data, args.axis, args.slice)?;
        let scale = sign * factor;
        slice.mapv_inplace(|v| v * scale);
        slices.push((map_stem(path), slice));
    }

    let mask_slice = match &mask {
        Some(m) => Some(extract_slice(&m.data, args.axis, args.slice)?),
        None => None,
    };

    // Anatomy may live on a finer grid; take its own slice index and resample
    // in-plane onto the map grid.
    let anat_index = args.anat_slice.unwrap_or(args.slice);
    let anat_slice = extract_slice(&anat.data, args.axis, anat_index)?;
    let target_dims = slices[0].1.dim();
    let anat_slice = if anat_slice.dim() == target_dims {
        anat_slice
    } else {
        resample_nearest(&anat_slice, target_dims)
    };

    let window = shared_window(&args, &slices, mask_slice.as_ref())?;
    log::info!("palette window: [{:.4}, {:.4}]", window.vmin, window.vmax);

    std::fs::create_dir_all(&args.out_dir).map_err(|e| {
        AppError::input(format!(
            "Failed to create output dir '{}': {e}",
            args.out_dir.display()
        ))
    })?;

    let cmap = Colormap::activation();
    for (stem, slice) in &slices {
        let mut img = overlay_image(slice, &anat_slice, mask_slice.as_ref(), &cmap, window, args.zoom)?;
        if args.crop {
            img = autocrop(&img);
        }
        let path = args
            .out_dir
            .join(format!("{stem}.{}", args.format.extension()));
        save_figure(&img, &path, args.format)?;
        println!("Wrote figure: {}", path.display());
    }

    if args.palette {
        let bar = palette_bar(&cmap, 24, 256);
        let path = args
            .out_dir
            .join(format!("palette.{}", args.format.extension()));
        save_figure(&bar, &path, args.format)?;
        println!("Wrote palette: {}", path.display());
    }

    println!(
        "Palette window: [{:.4}, {:.4}] over {} map(s), {:?} slice {}.",
        window.vmin,
        window.vmax,
        slices.len(),
        args.axis,
        args.slice
    );
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let config = crate::synth::SynthConfig {
        nscans: args.nscans,
        tr: args.tr,
        dt: args.dt,
        n_conditions: args.conditions,
        block_duration: args.block_duration,
        rest_duration: args.rest_duration,
        shape: [args.shape[0], args.shape[1], args.shape[2]],
        noise_sigma: args.noise_sigma,
        seed: args.seed,
    };
    let session = crate::synth::generate_session(&config)?;
    crate::synth::write_session(&args.out_dir, &session, args.tr)?;

    println!("=== aslfit - synthetic session ===");
    println!(
        "Scans: {} | TR: {}s | shape: {:?} | seed: {}",
        args.nscans, args.tr, config.shape, args.seed
    );
    for tc in &session.truth.conditions {
        println!(
            "- {}: blob at {:?} (r={:.1}), bold={:.2}, perf={:.2}",
            tc.name, tc.center, tc.radius, tc.bold_amplitude, tc.perf_amplitude
        );
    }
    println!(
        "Wrote paradigm.txt, bold.nii, mask.nii, truth.json to {}",
        args.out_dir.display()
    );
    Ok(())
}

/// Shared palette window across all map slices.
fn shared_window(
    args: &PlotArgs,
    slices: &[(String, ndarray::Array2<f64>)],
    mask_slice: Option<&ndarray::Array2<f64>>,
) -> Result<NormWindow, AppError> {
    if let (Some(vmin), Some(vmax)) = (args.vmin, args.vmax) {
        if !(vmin.is_finite() && vmax.is_finite() && vmax > vmin) {
            return Err(AppError::input(format!(
                "Invalid palette window [{vmin}, {vmax}]."
            )));
        }
        return Ok(NormWindow::new(vmin, vmax));
    }

    let values = slices.iter().flat_map(|(_, slice)| {
        slice.indexed_iter().filter_map(|((i, j), &v)| {
            let shown = match mask_slice {
                Some(m) => m[[i, j]] > 0.0,
                None => v != 0.0,
            };
            if shown { Some(v) } else { None }
        })
    });
    let mut window = NormWindow::from_values(values)
        .ok_or_else(|| AppError::data("No overlay values available to set the palette window."))?;
    if let Some(vmin) = args.vmin {
        window.vmin = vmin;
    }
    if let Some(vmax) = args.vmax {
        window.vmax = vmax;
    }
    Ok(window)
}

/// One scale factor per map: a single value broadcasts, none means 1.0.
fn resolve_scale_factors(factors: &[f64], n_maps: usize) -> Result<Vec<f64>, AppError> {
    if factors.iter().any(|f| !f.is_finite()) {
        return Err(AppError::input("Scale factors must be finite."));
    }
    match factors.len() {
        0 => Ok(vec![1.0; n_maps]),
        1 => Ok(vec![factors[0]; n_maps]),
        n if n == n_maps => Ok(factors.to_vec()),
        n => Err(AppError::input(format!(
            "Got {n} scale factor(s) for {n_maps} map(s); pass one value or one per map."
        ))),
    }
}

/// File stem with NIfTI extensions stripped (`map.nii.gz` -> `map`).
fn map_stem(path: &Path) -> String {
    let mut stem: PathBuf = PathBuf::from(path.file_name().unwrap_or_default());
    while let Some(s) = stem.file_stem() {
        let next = PathBuf::from(s);
        if next == stem {
            break;
        }
        stem = next;
    }
    stem.to_string_lossy().into_owned()
}
