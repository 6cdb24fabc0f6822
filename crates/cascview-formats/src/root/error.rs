//! Root file errors

use thiserror::Error;

use crate::cancel::Cancelled;

/// Errors raised while parsing a root file
#[derive(Debug, Error)]
pub enum RootError {
    /// A block declared no locale
    #[error("root block {block} at offset {offset} has an empty locale set")]
    EmptyLocale {
        /// Block number
        block: usize,
        /// Byte offset of the block header
        offset: u64,
    },

    /// A block claims more records than the file can hold
    #[error("root block {block} declares {records} records but only {remaining} bytes remain")]
    BlockTooLarge {
        /// Block number
        block: usize,
        /// Declared record count
        records: u32,
        /// Bytes left in the file
        remaining: u64,
    },

    /// Manifest header could not be read
    #[error("invalid root manifest header: {0}")]
    InvalidHeader(String),

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

/// Result type for root operations
pub type Result<T> = std::result::Result<T, RootError>;
