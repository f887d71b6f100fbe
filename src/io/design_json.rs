//! Read/write design JSON files.
//!
//! Design JSON is the "portable" representation of a built design matrix:
//! regressor names, timing metadata, and column values. `aslfit glm` consumes
//! it, so a design can be built once and fit against several runs.
//!
//! The schema is defined by `domain::DesignFile`.

use std::fs::File;
use std::path::Path;

use crate::domain::{DesignFile, DesignMatrix};
use crate::error::AppError;

/// Write a design JSON file.
pub fn write_design_json(path: &Path, design: &DesignMatrix) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::input(format!("Failed to create design JSON '{}': {e}", path.display()))
    })?;
    let design_file = DesignFile::from_design(design);
    serde_json::to_writer_pretty(file, &design_file)
        .map_err(|e| AppError::input(format!("Failed to write design JSON: {e}")))?;
    Ok(())
}

/// Read a design JSON file back into a design matrix.
pub fn read_design_json(path: &Path) -> Result<DesignMatrix, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::input(format!("Failed to open design JSON '{}': {e}", path.display()))
    })?;
    let design_file: DesignFile = serde_json::from_reader(file)
        .map_err(|e| AppError::input(format!("Invalid design JSON: {e}")))?;
    design_file.to_design()
}
