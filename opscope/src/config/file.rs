//! Configuration file loading.
//!
//! Reads, parses and validates a JSON configuration document. Only
//! documents that pass validation ever reach the engine; the caller keeps
//! the previously active configuration on any failure.

use std::fs;
use std::path::Path;

use crate::config::schema::ConfigDocument;
use crate::config::validation::validate_document;
use crate::error::TelemetryError;

/// Load and validate a configuration document from a JSON file.
///
/// # Errors
///
/// - [`TelemetryError::Io`] when the file cannot be read (retryable: the
///   file may still be mid-write).
/// - [`TelemetryError::Parse`] for malformed JSON.
/// - [`TelemetryError::Validation`] when the document parses but fails
///   semantic checks.
pub fn load_document(path: &Path) -> Result<ConfigDocument, TelemetryError> {
    let content = fs::read_to_string(path)?;
    let doc: ConfigDocument = serde_json::from_str(&content)?;
    validate_document(&doc).map_err(TelemetryError::Validation)?;
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("opscope-cfg-{}.json", uuid::Uuid::new_v4()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_valid_document() {
        let path = write_temp(
            r#"{ "global": { "sampling_rate": 0.5 },
                 "types": { "app.Widget": { "enabled": false } } }"#,
        );
        let doc = load_document(&path).unwrap();
        assert_eq!(
            doc.global.as_ref().and_then(|g| g.sampling_rate),
            Some(0.5)
        );
        assert_eq!(doc.types.len(), 1);
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let path = write_temp("{ not json");
        assert!(matches!(
            load_document(&path),
            Err(TelemetryError::Parse(_))
        ));
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_invalid_document_is_validation_error() {
        let path = write_temp(r#"{ "global": { "sampling_rate": 1.5 } }"#);
        assert!(matches!(
            load_document(&path),
            Err(TelemetryError::Validation(_))
        ));
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let path = std::env::temp_dir().join("opscope-definitely-missing.json");
        let err = load_document(&path).unwrap_err();
        assert!(err.is_retryable());
    }
}
