//! Installation and build configuration files
//!
//! - `.build.info`: pipe-delimited table at the installation root naming
//!   the active build
//! - build config: `key = value` file naming the encoding, root, install and
//!   download files of one build
//! - CDN config: `key = value` file listing the CDN archives

mod build_config;
mod build_info;
mod cdn_config;

pub use build_config::{BuildConfig, BuildFileRef};
pub use build_info::{BuildInfoEntry, BuildInfoFile};
pub use cdn_config::CdnConfig;

use std::collections::HashMap;
use thiserror::Error;

/// Configuration parsing errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `.build.info` has no header row
    #[error("build info has no header row")]
    MissingHeader,

    /// Header column without `Name!TYPE:N` form
    #[error("malformed build info column: {0}")]
    MalformedColumn(String),

    /// Data row with a different column count than the header
    #[error("build info row {row} has {actual} fields, expected {expected}")]
    ColumnCountMismatch {
        /// Data row number, starting at 0
        row: usize,
        /// Header column count
        expected: usize,
        /// Fields in the row
        actual: usize,
    },

    /// A required key is absent
    #[error("missing config value '{0}'")]
    MissingValue(&'static str),

    /// A value that should be a hex key is not
    #[error("invalid key in '{field}': {source}")]
    InvalidKey {
        /// Config key holding the value
        field: &'static str,
        /// Hex decoding failure
        source: hex::FromHexError,
    },
}

/// Result type for configuration parsing
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Split a `key = value` line
pub(crate) fn parse_line(line: &str) -> Option<(String, String)> {
    let mut parts = line.splitn(2, " = ");
    let key = parts.next()?.trim();
    let value = parts.next()?.trim();

    if is_valid_key(key) {
        Some((key.to_string(), value.to_string()))
    } else {
        None
    }
}

/// Config keys are alphanumeric with `-` and `_`
pub(crate) fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

/// Parse `key = value` text into whitespace-split values
///
/// Blank lines and `#` comments are skipped. A repeated key extends the
/// previous values.
pub(crate) fn parse_key_values(text: &str) -> HashMap<String, Vec<String>> {
    let mut entries: HashMap<String, Vec<String>> = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = parse_line(line) {
            entries
                .entry(key)
                .or_default()
                .extend(value.split_whitespace().map(String::from));
        }
    }
    entries
}
