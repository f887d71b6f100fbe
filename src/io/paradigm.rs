//! Paradigm file ingest and normalization.
//!
//! A paradigm file is flat text, one event per line, space-separated, with
//! optionally double-quoted condition names:
//!
//! ```text
//! cond onset duration
//! session cond onset duration
//! session cond onset duration amplitude
//! ```
//!
//! Design goals:
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Deterministic output** (onsets sorted ascending per condition,
//!   durations/amplitudes permuted identically)
//! - **Separation of concerns**: no regressor logic here

use std::fs::File;
use std::path::Path;

use crate::domain::{Condition, Paradigm};
use crate::error::AppError;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: parsed paradigm + row errors.
#[derive(Debug, Clone)]
pub struct IngestedParadigm {
    pub paradigm: Paradigm,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Load a paradigm file.
///
/// Fails with a data error if no valid event remains.
pub fn load_paradigm(path: &Path) -> Result<IngestedParadigm, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::input(format!("Failed to open paradigm '{}': {e}", path.display()))
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut conditions: Vec<Condition> = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 1;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("parse error: {e}"),
                });
                continue;
            }
        };

        // Runs of spaces produce empty fields; drop them.
        let fields: Vec<&str> = record.iter().filter(|f| !f.is_empty()).collect();
        if fields.is_empty() {
            rows_read -= 1; // blank line
            continue;
        }

        match parse_fields(&fields) {
            Ok((name, onset, duration, amplitude)) => {
                push_event(&mut conditions, name, onset, duration, amplitude);
            }
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    for cond in &mut conditions {
        sort_by_onset(cond);
    }

    let paradigm = Paradigm { conditions };
    if paradigm.is_empty() {
        return Err(AppError::data(format!(
            "No valid events in paradigm '{}' ({} row error(s)).",
            path.display(),
            row_errors.len()
        )));
    }

    Ok(IngestedParadigm {
        paradigm,
        row_errors,
        rows_read,
    })
}

fn parse_fields(fields: &[&str]) -> Result<(String, f64, f64, f64), String> {
    let (name, onset, duration, amplitude) = match fields.len() {
        3 => (fields[0], fields[1], fields[2], None),
        4 => (fields[1], fields[2], fields[3], None),
        5 => (fields[1], fields[2], fields[3], Some(fields[4])),
        n => return Err(format!("expected 3-5 fields, got {n}")),
    };

    let name = name.trim_matches('"');
    if name.is_empty() {
        return Err("empty condition name".to_string());
    }

    let onset = parse_f64(onset, "onset")?;
    if onset < 0.0 {
        return Err(format!("negative onset {onset}"));
    }
    let duration = parse_f64(duration, "duration")?;
    if duration < 0.0 {
        return Err(format!("negative duration {duration}"));
    }
    let amplitude = match amplitude {
        Some(a) => parse_f64(a, "amplitude")?,
        None => 1.0,
    };

    Ok((name.to_string(), onset, duration, amplitude))
}

fn parse_f64(s: &str, what: &str) -> Result<f64, String> {
    let v: f64 = s
        .parse()
        .map_err(|_| format!("invalid {what} '{s}'"))?;
    if !v.is_finite() {
        return Err(format!("non-finite {what} '{s}'"));
    }
    Ok(v)
}

fn push_event(conditions: &mut Vec<Condition>, name: String, onset: f64, duration: f64, amplitude: f64) {
    if let Some(cond) = conditions.iter_mut().find(|c| c.name == name) {
        cond.onsets.push(onset);
        cond.durations.push(duration);
        cond.amplitudes.push(amplitude);
    } else {
        conditions.push(Condition {
            name,
            onsets: vec![onset],
            durations: vec![duration],
            amplitudes: vec![amplitude],
        });
    }
}

fn sort_by_onset(cond: &mut Condition) {
    let mut order: Vec<usize> = (0..cond.onsets.len()).collect();
    order.sort_by(|&a, &b| {
        cond.onsets[a]
            .partial_cmp(&cond.onsets[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    cond.onsets = order.iter().map(|&i| cond.onsets[i]).collect();
    cond.durations = order.iter().map(|&i| cond.durations[i]).collect();
    cond.amplitudes = order.iter().map(|&i| cond.amplitudes[i]).collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "aslfit-paradigm-{}-{}.txt",
            std::process::id(),
            contents.len()
        ));
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_quoted_four_field_rows() {
        let path = write_temp("0 \"clicGaudio\" 355.9 0\n0 \"clicGaudio\" 12.4 0\n");
        let ingest = load_paradigm(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(ingest.rows_read, 2);
        assert!(ingest.row_errors.is_empty());
        let cond = ingest.paradigm.condition("clicGaudio").unwrap();
        // Onsets come back sorted.
        assert_eq!(cond.onsets, vec![12.4, 355.9]);
        assert_eq!(cond.durations, vec![0.0, 0.0]);
        assert_eq!(cond.amplitudes, vec![1.0, 1.0]);
    }

    #[test]
    fn sorting_keeps_durations_with_their_onsets() {
        let path = write_temp("audio 30.0 5.0\naudio 10.0 2.0\naudio 20.0 3.0\n");
        let ingest = load_paradigm(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let cond = ingest.paradigm.condition("audio").unwrap();
        assert_eq!(cond.onsets, vec![10.0, 20.0, 30.0]);
        assert_eq!(cond.durations, vec![2.0, 3.0, 5.0]);
    }

    #[test]
    fn five_field_rows_carry_amplitude() {
        let path = write_temp("1 audio 3.0 2.0 0.5\n");
        let ingest = load_paradigm(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let cond = ingest.paradigm.condition("audio").unwrap();
        assert_eq!(cond.amplitudes, vec![0.5]);
    }

    #[test]
    fn bad_rows_are_reported_not_fatal() {
        let path = write_temp("audio 3.0 2.0\naudio not-a-number 2.0\n");
        let ingest = load_paradigm(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(ingest.row_errors.len(), 1);
        assert_eq!(ingest.row_errors[0].line, 2);
        assert_eq!(ingest.paradigm.n_events(), 1);
    }

    #[test]
    fn all_bad_rows_is_a_data_error() {
        let path = write_temp("audio x 2.0\nvideo y 3.0\n");
        let err = load_paradigm(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert_eq!(err.exit_code(), 3);
    }
}
