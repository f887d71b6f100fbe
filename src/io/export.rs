//! Plain-text exports.
//!
//! The CSV export is meant to be easy to consume in spreadsheets or downstream
//! scripts; the JSON helper serializes any summary structure.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::domain::DesignMatrix;
use crate::error::AppError;

/// Write a design matrix as CSV: `time_s` column plus one column per regressor.
pub fn write_design_csv(path: &Path, design: &DesignMatrix) -> Result<(), AppError> {
    let mut file = File::create(path).map_err(|e| {
        AppError::input(format!("Failed to create design CSV '{}': {e}", path.display()))
    })?;

    writeln!(file, "time_s,{}", design.names.join(",")).map_err(|e| {
        AppError::input(format!("Failed to write design CSV header: {e}"))
    })?;

    for (i, t) in design.frametimes().iter().enumerate() {
        let mut row = format!("{t:.3}");
        for j in 0..design.nregressors() {
            row.push_str(&format!(",{:.10}", design.matrix[(i, j)]));
        }
        writeln!(file, "{row}").map_err(|e| {
            AppError::input(format!("Failed to write design CSV row: {e}"))
        })?;
    }

    Ok(())
}

/// Serialize a summary structure to pretty JSON.
pub fn write_summary_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::input(format!("Failed to create JSON '{}': {e}", path.display()))
    })?;
    serde_json::to_writer_pretty(file, value)
        .map_err(|e| AppError::input(format!("Failed to write JSON '{}': {e}", path.display())))
}
