//! # Settings File
//!
//! Session settings read from an optional TOML document. Every key is
//! optional; missing keys keep their defaults.
//!
//! ```toml
//! activation_depth = 2
//! index_by_default = false
//! transaction_group_limit = 5
//! ```

use std::path::{Path, PathBuf};
use trellis_core::{Settings, TrellisError};

/// Maximum settings file size (1 MB).
const MAX_SETTINGS_FILE_SIZE: u64 = 1024 * 1024;

/// Parse settings from TOML text.
pub fn parse_settings(text: &str) -> Result<Settings, TrellisError> {
    toml::from_str(text).map_err(|e| TrellisError::Config(format!("Invalid settings: {e}")))
}

/// Load settings from `path`, or the defaults when no path is given.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, TrellisError> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let path = validate_file_path(path)?;

    let metadata = std::fs::metadata(&path)
        .map_err(|e| TrellisError::Config(format!("Cannot read file metadata: {e}")))?;
    if metadata.len() > MAX_SETTINGS_FILE_SIZE {
        return Err(TrellisError::Config(format!(
            "Settings file size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_SETTINGS_FILE_SIZE
        )));
    }

    let text = std::fs::read_to_string(&path)
        .map_err(|e| TrellisError::Config(format!("Read settings file: {e}")))?;
    let settings = parse_settings(&text)?;
    tracing::debug!(path = %path.display(), ?settings, "loaded settings");
    Ok(settings)
}

/// Canonicalize `path` and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, TrellisError> {
    let canonical = path.canonicalize().map_err(|e| {
        TrellisError::Config(format!("Invalid file path '{}': {}", path.display(), e))
    })?;
    if !canonical.is_file() {
        return Err(TrellisError::Config(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    Ok(canonical)
}
