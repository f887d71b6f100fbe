//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - input configuration enums (`PrfModel`, `ResidualModel`, `ScaleMode`, `SliceAxis`)
//! - the parsed paradigm (`Paradigm`, `Condition`)
//! - the design matrix and its portable file form (`DesignMatrix`, `DesignFile`)
//! - protocol files (`Protocol`)

pub mod types;

pub use types::*;
