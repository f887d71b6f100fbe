//! Protocol TOML files.
//!
//! A protocol captures the scan timing and condition layout of a study so it
//! doesn't have to be retyped per run:
//!
//! ```toml
//! nscans = 291
//! tr = 3.0
//! dt = 0.5
//! drift_order = 4
//! cond_order = ["clicGaudio", "clicGvideo"]
//! exclude = ["final_rest"]
//! ```
//!
//! CLI flags override protocol values field by field.

use std::path::Path;

use crate::domain::Protocol;
use crate::error::AppError;

/// Read a protocol TOML file.
pub fn read_protocol(path: &Path) -> Result<Protocol, AppError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::input(format!("Failed to read protocol '{}': {e}", path.display()))
    })?;
    toml::from_str(&contents)
        .map_err(|e| AppError::input(format!("Invalid protocol '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_a_full_protocol() {
        let path = std::env::temp_dir().join(format!("aslfit-protocol-{}.toml", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "nscans = 291").unwrap();
        writeln!(f, "tr = 3.0").unwrap();
        writeln!(f, "dt = 0.5").unwrap();
        writeln!(f, "cond_order = [\"a\", \"b\"]").unwrap();
        drop(f);

        let p = read_protocol(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(p.nscans, Some(291));
        assert_eq!(p.tr, Some(3.0));
        assert_eq!(p.cond_order.as_deref(), Some(&["a".to_string(), "b".to_string()][..]));
        assert!(p.drift_order.is_none());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let path = std::env::temp_dir().join(format!("aslfit-protocol-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "nscnas = 10\n").unwrap();
        assert!(read_protocol(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
