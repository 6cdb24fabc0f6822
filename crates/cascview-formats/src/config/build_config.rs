//! Build config
//!
//! Each value is a whitespace-separated list. System files are named by a
//! content key optionally followed by the encoding key of their stored blob:
//!
//! ```text
//! root = 0f1e...
//! encoding = 3a4b... 9c8d...
//! encoding-size = 12345 6789
//! ```

use std::collections::HashMap;

use cascview_crypto::{ContentKey, EncodingKey};

use super::{ConfigError, Result, parse_key_values};

/// A system file referenced by the build config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildFileRef {
    /// Content key of the decoded file
    pub content_key: ContentKey,
    /// Encoding key of the stored blob, when listed
    pub encoding_key: Option<EncodingKey>,
    /// Decoded size, when listed
    pub size: Option<u64>,
}

/// Parsed build config
#[derive(Debug, Clone, Default)]
pub struct BuildConfig {
    entries: HashMap<String, Vec<String>>,
}

impl BuildConfig {
    /// Parse build config text
    pub fn parse(text: &str) -> Self {
        Self {
            entries: parse_key_values(text),
        }
    }

    /// Raw values of `key`
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// First value of `key`
    pub fn get_first(&self, key: &str) -> Option<&str> {
        self.get(key)?.first().map(String::as_str)
    }

    /// Content key of the root file
    pub fn root(&self) -> Result<ContentKey> {
        let value = self.get_first("root").ok_or(ConfigError::MissingValue("root"))?;
        ContentKey::from_hex(value).map_err(|source| ConfigError::InvalidKey {
            field: "root",
            source,
        })
    }

    /// Keys of the encoding file; its encoding key is required
    pub fn encoding(&self) -> Result<BuildFileRef> {
        let file = self
            .file_ref("encoding")?
            .ok_or(ConfigError::MissingValue("encoding"))?;
        if file.encoding_key.is_none() {
            return Err(ConfigError::MissingValue("encoding"));
        }
        Ok(file)
    }

    /// Keys of the install manifest, if listed
    pub fn install(&self) -> Result<Option<BuildFileRef>> {
        self.file_ref("install")
    }

    /// Keys of the download manifest, if listed
    pub fn download(&self) -> Result<Option<BuildFileRef>> {
        self.file_ref("download")
    }

    /// Human readable build name
    pub fn build_name(&self) -> Option<&str> {
        self.get_first("build-name")
    }

    /// Product code the build belongs to
    pub fn build_product(&self) -> Option<&str> {
        self.get_first("build-product")
    }

    fn file_ref(&self, field: &'static str) -> Result<Option<BuildFileRef>> {
        let Some(values) = self.get(field) else {
            return Ok(None);
        };
        let Some(first) = values.first() else {
            return Ok(None);
        };
        let invalid = |source| ConfigError::InvalidKey { field, source };
        let content_key = ContentKey::from_hex(first).map_err(invalid)?;
        let encoding_key = values
            .get(1)
            .map(|v| EncodingKey::from_hex(v))
            .transpose()
            .map_err(invalid)?;
        let size = self
            .entries
            .get(&format!("{field}-size"))
            .and_then(|v| v.first())
            .and_then(|s| s.parse().ok());
        Ok(Some(BuildFileRef {
            content_key,
            encoding_key,
            size,
        }))
    }
}
