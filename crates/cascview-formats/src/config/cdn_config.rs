//! CDN config

use std::collections::HashMap;

use cascview_crypto::EncodingKey;

use super::{ConfigError, Result, parse_key_values};

/// Parsed CDN config
#[derive(Debug, Clone, Default)]
pub struct CdnConfig {
    entries: HashMap<String, Vec<String>>,
}

impl CdnConfig {
    /// Parse CDN config text
    pub fn parse(text: &str) -> Self {
        Self {
            entries: parse_key_values(text),
        }
    }

    /// Raw values of `key`
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Archive keys in listed order
    ///
    /// The position of an archive in this list is the archive index used by
    /// its `.index` records.
    pub fn archives(&self) -> Result<Vec<EncodingKey>> {
        self.get("archives")
            .unwrap_or_default()
            .iter()
            .map(|hex| {
                EncodingKey::from_hex(hex).map_err(|source| ConfigError::InvalidKey {
                    field: "archives",
                    source,
                })
            })
            .collect()
    }

    /// Combined archive group key, if any
    pub fn archive_group(&self) -> Option<&str> {
        self.get("archive-group")?.first().map(String::as_str)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_archives() {
        let config = CdnConfig::parse(
            "archives = 0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a 0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b\n\
             archive-group = cccccccccccccccccccccccccccccccc\n",
        );
        let archives = config.archives().unwrap();
        assert_eq!(archives.len(), 2);
        assert_eq!(archives[1], EncodingKey::from_bytes([0x0b; 16]));
        assert_eq!(
            config.archive_group(),
            Some("cccccccccccccccccccccccccccccccc")
        );
    }

    #[test]
    fn test_no_archives() {
        assert!(CdnConfig::parse("").archives().unwrap().is_empty());
    }
}
