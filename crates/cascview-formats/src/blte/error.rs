//! BLTE error types

use thiserror::Error;

use crate::cancel::Cancelled;

/// BLTE decoding error
#[derive(Debug, Error)]
pub enum BlteError {
    /// Stream did not start with "BLTE"
    #[error("bad BLTE magic: expected [42 4C 54 45], got {0:02X?}")]
    BadMagic([u8; 4]),

    /// Multi-chunk header did not carry the 0x0F marker
    #[error("bad BLTE frame marker: expected 0x0F, got 0x{0:02X}")]
    BadFrameMarker(u8),

    /// Frame header size disagrees with the chunk table
    #[error("BLTE header size {header_size} too small for {chunk_count} chunks")]
    BadHeaderSize {
        /// Declared header size
        header_size: u32,
        /// Chunk count from the chunk table
        chunk_count: u32,
    },

    /// Declared container size cannot hold a single-chunk frame
    #[error("declared BLTE size {0} is smaller than the 8-byte header")]
    DeclaredSizeTooSmall(u64),

    /// Chunk MD5 did not match its declared checksum
    #[error("chunk {chunk} integrity check failed: expected {expected}, got {actual}")]
    IntegrityError {
        /// Chunk index
        chunk: usize,
        /// Declared MD5 (hex)
        expected: String,
        /// Computed MD5 (hex)
        actual: String,
    },

    /// Chunk payload could not be decoded
    #[error("chunk {chunk} is corrupt: {reason}")]
    CorruptChunk {
        /// Chunk index
        chunk: usize,
        /// What went wrong
        reason: String,
    },

    /// Mode byte not handled by this decoder
    #[error("unknown BLTE chunk type 0x{mode:02X} in chunk {chunk}")]
    UnknownChunkType {
        /// Chunk index
        chunk: usize,
        /// Mode byte
        mode: u8,
    },

    /// Decoding stopped by a cancellation token
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary parsing error
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for BLTE operations
pub type BlteResult<T> = Result<T, BlteError>;
