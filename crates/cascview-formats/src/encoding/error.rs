//! Error types for encoding table parsing

use thiserror::Error;

use crate::cancel::Cancelled;

/// Errors raised while reading the encoding table
#[derive(Debug, Error)]
pub enum EncodingError {
    /// File did not start with "EN"
    #[error("invalid encoding magic: expected 'EN', got {0:02X?}")]
    InvalidMagic([u8; 2]),

    /// Version other than 1
    #[error("unsupported encoding version {0}")]
    UnsupportedVersion(u8),

    /// Key size other than 16 bytes
    #[error("unsupported {field} size {value}, expected 16")]
    UnsupportedKeySize {
        /// Header field name
        field: &'static str,
        /// Declared size
        value: u8,
    },

    /// Page MD5 did not match the page index
    #[error("encoding {table} page {page} checksum mismatch")]
    PageChecksumMismatch {
        /// "content key" or "encoding key"
        table: &'static str,
        /// Page number
        page: usize,
    },

    /// Stream ended before a table was complete
    #[error("encoding file truncated in {section}: need {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        /// Section being read
        section: &'static str,
        /// Bytes needed
        needed: usize,
        /// Offset of the read
        offset: usize,
        /// Bytes left
        available: usize,
    },

    /// Parse stopped by a cancellation token
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary parsing error
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for encoding operations
pub type EncodingResult<T> = Result<T, EncodingError>;
