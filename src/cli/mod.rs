//! Command-line parsing for the BOLD/ASL GLM toolkit.
//!
//! The goal of this module is to keep **argument parsing** and **command
//! dispatch** separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{FigureFormat, PrfModel, ResidualModel, ScaleMode, SliceAxis};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "aslfit", version, about = "BOLD/ASL GLM design and fitting toolkit")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build a design matrix from a paradigm file and export it.
    Design(DesignArgs),
    /// Fit a saved design to a 4-D series within a mask.
    Glm(GlmArgs),
    /// Intersect a binary mask with a thresholded probabilistic mask.
    Mask(MaskArgs),
    /// Render statistic maps over an anatomical slice.
    Plot(PlotArgs),
    /// Generate a synthetic session (paradigm + volumes + ground truth).
    Synth(SynthArgs),
}

/// Options for building a design matrix.
#[derive(Debug, Parser, Clone)]
pub struct DesignArgs {
    /// Paradigm file (flat text: [session] condition onset duration [amplitude]).
    #[arg(long)]
    pub paradigm: PathBuf,

    /// Protocol TOML with scan timing and condition layout.
    #[arg(long)]
    pub protocol: Option<PathBuf>,

    /// Number of scans (overrides the protocol).
    #[arg(long)]
    pub nscans: Option<usize>,

    /// Repetition time in seconds (overrides the protocol).
    #[arg(long)]
    pub tr: Option<f64>,

    /// Kernel sampling step in seconds (overrides the protocol).
    #[arg(long)]
    pub dt: Option<f64>,

    /// Response kernel length in seconds (overrides the protocol).
    #[arg(long)]
    pub kernel_length: Option<f64>,

    /// Polynomial drift order (overrides the protocol).
    #[arg(long)]
    pub drift_order: Option<usize>,

    /// Comma-separated condition column order (overrides the protocol).
    #[arg(long, value_delimiter = ',')]
    pub cond_order: Option<Vec<String>>,

    /// Comma-separated conditions to exclude (overrides the protocol).
    #[arg(long, value_delimiter = ',')]
    pub exclude: Option<Vec<String>>,

    /// Perfusion response model.
    #[arg(long, value_enum, default_value_t = PrfModel::Hrf)]
    pub prf_model: PrfModel,

    /// Perfusion operator CSV (required for --prf-model physio).
    #[arg(long)]
    pub prf_operator: Option<PathBuf>,

    /// Normalize kernels to unit L2 norm.
    #[arg(long)]
    pub normalize: bool,

    /// Export the design as JSON (consumed by `aslfit glm`).
    #[arg(long)]
    pub out_json: Option<PathBuf>,

    /// Export the design as CSV.
    #[arg(long)]
    pub out_csv: Option<PathBuf>,

    /// Export the design as a MATLAB .mat file (variables `r`, `reg_names`).
    #[arg(long)]
    pub out_mat: Option<PathBuf>,

    /// Render the design matrix raster to this PNG.
    #[arg(long)]
    pub dmat_png: Option<PathBuf>,

    /// Render the HRF/PRF kernel chart to this PNG.
    #[arg(long)]
    pub kernels_png: Option<PathBuf>,
}

/// Options for the GLM fit.
#[derive(Debug, Parser, Clone)]
pub struct GlmArgs {
    /// Design JSON produced by `aslfit design --out-json`.
    #[arg(long)]
    pub design: PathBuf,

    /// 4-D BOLD/ASL series (NIfTI).
    #[arg(long)]
    pub bold: PathBuf,

    /// 3-D analysis mask (NIfTI), same grid as the series.
    #[arg(long)]
    pub mask: PathBuf,

    /// Output directory for beta maps and the fit summary.
    #[arg(long, default_value = "glm_analysis")]
    pub out_dir: PathBuf,

    /// Residual model.
    #[arg(long, value_enum, default_value_t = ResidualModel::Spherical)]
    pub residual_model: ResidualModel,

    /// Signal rescaling before the fit.
    #[arg(long, value_enum, default_value_t = ScaleMode::Percent)]
    pub scale: ScaleMode,
}

/// Options for mask combination.
#[derive(Debug, Parser, Clone)]
pub struct MaskArgs {
    /// Binary mask (NIfTI).
    #[arg(long)]
    pub binary: PathBuf,

    /// Probabilistic mask (NIfTI), same grid as the binary mask.
    #[arg(long)]
    pub prob: PathBuf,

    /// Threshold applied to the probabilistic mask.
    #[arg(long, default_value_t = 0.5)]
    pub threshold: f64,

    /// Output mask path.
    #[arg(long)]
    pub out: PathBuf,
}

/// Options for map rendering.
#[derive(Debug, Parser, Clone)]
pub struct PlotArgs {
    /// Statistic map(s) to render (repeatable); all share one palette window.
    #[arg(long = "map", required = true)]
    pub maps: Vec<PathBuf>,

    /// Anatomical volume (NIfTI).
    #[arg(long)]
    pub anat: PathBuf,

    /// Mask restricting the overlay (NIfTI, same grid as the maps).
    #[arg(long)]
    pub mask: Option<PathBuf>,

    /// Display axis.
    #[arg(long, value_enum, default_value_t = SliceAxis::Axial)]
    pub axis: SliceAxis,

    /// Slice index on the map grid.
    #[arg(long)]
    pub slice: usize,

    /// Slice index on the anatomical grid (defaults to --slice).
    #[arg(long)]
    pub anat_slice: Option<usize>,

    /// Multiply every map by -1 before rendering.
    #[arg(long)]
    pub flip_sign: bool,

    /// Scale factor(s) applied before rendering: one value for all maps,
    /// or one per --map (repeatable, matched by position).
    #[arg(long = "scale-factor")]
    pub scale_factors: Vec<f64>,

    /// Explicit palette window minimum (default: from masked data).
    #[arg(long)]
    pub vmin: Option<f64>,

    /// Explicit palette window maximum (default: from masked data).
    #[arg(long)]
    pub vmax: Option<f64>,

    /// Nearest-neighbor zoom factor.
    #[arg(long, default_value_t = 4)]
    pub zoom: u32,

    /// Trim uniform borders from the figures.
    #[arg(long)]
    pub crop: bool,

    /// Also write a palette bar figure.
    #[arg(long)]
    pub palette: bool,

    /// Figure format.
    #[arg(long, value_enum, default_value_t = FigureFormat::Png)]
    pub format: FigureFormat,

    /// Output directory for the figures.
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,
}

/// Options for synthetic session generation.
#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    /// Output directory.
    #[arg(long, default_value = "synth_session")]
    pub out_dir: PathBuf,

    /// Number of scans.
    #[arg(long, default_value_t = 120)]
    pub nscans: usize,

    /// Repetition time (seconds).
    #[arg(long, default_value_t = 3.0)]
    pub tr: f64,

    /// Kernel sampling step (seconds).
    #[arg(long, default_value_t = 0.5)]
    pub dt: f64,

    /// Number of conditions.
    #[arg(long, default_value_t = 2)]
    pub conditions: usize,

    /// Block duration (seconds).
    #[arg(long, default_value_t = 9.0)]
    pub block_duration: f64,

    /// Rest duration between blocks (seconds).
    #[arg(long, default_value_t = 12.0)]
    pub rest_duration: f64,

    /// Volume shape as x,y,z.
    #[arg(long, value_delimiter = ',', num_args = 3, default_values_t = [24, 24, 12])]
    pub shape: Vec<usize>,

    /// Gaussian noise standard deviation.
    #[arg(long, default_value_t = 0.5)]
    pub noise_sigma: f64,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}
