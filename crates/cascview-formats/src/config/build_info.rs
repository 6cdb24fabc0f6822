//! `.build.info` table
//!
//! A pipe-delimited table whose header row declares `Name!TYPE:N` columns.
//! Lines starting with `## ` carry metadata such as the sequence number and
//! are skipped.
//!
//! ```text
//! Branch!STRING:0|Active!DEC:1|Build Key!HEX:16|CDN Key!HEX:16|...
//! us|1|0a1b...|2c3d...|...
//! ```

use super::{ConfigError, Result};

/// Parsed `.build.info`
#[derive(Debug, Clone, Default)]
pub struct BuildInfoFile {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl BuildInfoFile {
    /// Parse `.build.info` text
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with("## "));
        let header = lines.next().ok_or(ConfigError::MissingHeader)?;

        let columns = header
            .split('|')
            .map(|column| {
                column
                    .split_once('!')
                    .map(|(name, _)| name.to_string())
                    .ok_or_else(|| ConfigError::MalformedColumn(column.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut rows = Vec::new();
        for (row, line) in lines.enumerate() {
            let fields: Vec<String> = line.split('|').map(String::from).collect();
            if fields.len() != columns.len() {
                return Err(ConfigError::ColumnCountMismatch {
                    row,
                    expected: columns.len(),
                    actual: fields.len(),
                });
            }
            rows.push(fields);
        }

        Ok(Self { columns, rows })
    }

    /// Number of data rows
    pub fn entry_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether a column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// First row with `Active` = 1
    pub fn active_entry(&self) -> Option<BuildInfoEntry<'_>> {
        self.entries().into_iter().find(BuildInfoEntry::is_active)
    }

    /// First active row whose product matches, ignoring case
    pub fn active_entry_for(&self, product: &str) -> Option<BuildInfoEntry<'_>> {
        self.entries().into_iter().find(|e| {
            e.is_active()
                && e.product()
                    .is_some_and(|p| p.eq_ignore_ascii_case(product))
        })
    }

    /// Every row
    pub fn entries(&self) -> Vec<BuildInfoEntry<'_>> {
        self.rows
            .iter()
            .map(|row| BuildInfoEntry {
                columns: &self.columns,
                row,
            })
            .collect()
    }
}

/// A row of `.build.info`
#[derive(Debug, Clone, Copy)]
pub struct BuildInfoEntry<'a> {
    columns: &'a [String],
    row: &'a [String],
}

impl<'a> BuildInfoEntry<'a> {
    /// Raw field value by column name
    pub fn get(&self, name: &str) -> Option<&'a str> {
        let index = self.columns.iter().position(|c| c == name)?;
        self.row.get(index).map(String::as_str)
    }

    /// Branch name (e.g. "us")
    pub fn branch(&self) -> Option<&'a str> {
        self.get("Branch")
    }

    /// Whether this row is the active build
    pub fn is_active(&self) -> bool {
        self.get("Active").is_some_and(|v| v == "1")
    }

    /// Build config key (hex)
    pub fn build_key(&self) -> Option<&'a str> {
        self.get("Build Key").filter(|v| !v.is_empty())
    }

    /// CDN config key (hex)
    pub fn cdn_key(&self) -> Option<&'a str> {
        self.get("CDN Key").filter(|v| !v.is_empty())
    }

    /// CDN path prefix (e.g. "tpr/wow")
    pub fn cdn_path(&self) -> Option<&'a str> {
        self.get("CDN Path").filter(|v| !v.is_empty())
    }

    /// CDN host names, space-separated in the file
    pub fn cdn_hosts(&self) -> Vec<&'a str> {
        self.get("CDN Hosts")
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Tag string
    pub fn tags(&self) -> Option<&'a str> {
        self.get("Tags")
    }

    /// Version string
    pub fn version(&self) -> Option<&'a str> {
        self.get("Version")
    }

    /// Product code (e.g. "wow", "wow_classic")
    pub fn product(&self) -> Option<&'a str> {
        self.get("Product").filter(|v| !v.is_empty())
    }
}
