//! Perfusion operator ingest.
//!
//! The physiological operator linking the perfusion response to the
//! hemodynamic response is supplied as a dense CSV matrix (one row per line,
//! comma-separated). It must be square; the side is validated against the
//! kernel length at application time.

use std::fs::File;
use std::path::Path;

use nalgebra::DMatrix;

use crate::error::AppError;

/// Read a dense square matrix from CSV.
pub fn read_operator_csv(path: &Path) -> Result<DMatrix<f64>, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::input(format!("Failed to open operator CSV '{}': {e}", path.display()))
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            AppError::input(format!("Operator CSV line {}: {e}", idx + 1))
        })?;
        let row: Result<Vec<f64>, _> = record.iter().map(|s| s.parse::<f64>()).collect();
        let row = row.map_err(|e| {
            AppError::input(format!("Operator CSV line {}: invalid number ({e})", idx + 1))
        })?;
        rows.push(row);
    }

    let n = rows.len();
    if n == 0 {
        return Err(AppError::data(format!("Operator CSV '{}' is empty.", path.display())));
    }
    if rows.iter().any(|r| r.len() != n) {
        return Err(AppError::data(format!(
            "Operator CSV '{}' is not square ({n} rows).",
            path.display()
        )));
    }

    Ok(DMatrix::from_fn(n, n, |i, j| rows[i][j]))
}
