//! Path utilities

use std::path::PathBuf;

/// Data directory (~/.ndrill), falls back to ./.ndrill without a home
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".ndrill"))
        .unwrap_or_else(|| PathBuf::from(".ndrill"))
}

/// Configuration file location
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Scratch space for host sandbox sessions
pub fn sandbox_dir() -> PathBuf {
    data_dir().join("sandbox")
}

/// Sanitize a target identifier for use in a filename.
///
/// Every character outside `[A-Za-z0-9]` becomes `_`.
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
