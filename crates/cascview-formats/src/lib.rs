//! Parsers for the binary and text formats of a CASC installation
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::similar_names)] // Domain-specific naming patterns
#![allow(clippy::doc_markdown)] // Many CASC-specific terms don't need backticks
//!
//! # Supported Formats
//!
//! - **BLTE**: chunked container wrapping every stored object
//! - **Encoding**: content key to encoding key table
//! - **Root**: path hash to content key namespace, with locale and content variants
//! - **Install** / **Download**: manifests with tag bitmasks for selective installation
//! - **Archive**: CDN `.index` manifests locating keys inside archive blobs
//! - **Config**: `.build.info` tables and `key = value` build/CDN configs
//!
//! Parsers that walk large tables take a [`CancellationToken`] and check it
//! between records, so a caller on another thread can stop a load early.

#![warn(missing_docs)]

pub mod archive;
pub mod blte;
pub mod cancel;
pub mod config;
pub mod download;
pub mod encoding;
pub mod install;
pub mod root;

mod tags;

pub use cancel::{CancellationToken, Cancelled};
pub use tags::{Tag, TagType};

/// Read a NUL-terminated string
pub(crate) fn read_cstring<R: std::io::Read>(reader: &mut R) -> std::io::Result<String> {
    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        reader.read_exact(&mut byte)?;
        if byte[0] == 0 {
            break;
        }
        bytes.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read a 40-bit big-endian integer stored as a high byte plus a `u32`
pub(crate) fn read_u40_be<R: std::io::Read>(reader: &mut R) -> std::io::Result<u64> {
    let mut bytes = [0u8; 5];
    reader.read_exact(&mut bytes)?;
    Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}
