//! Per-chunk transforms

use flate2::read::DeflateDecoder;
use std::io::Read;

use cascview_crypto::ContentKey;

use super::error::{BlteError, BlteResult};
use super::header::ChunkInfo;

/// Maximum decoded size of a single chunk (1 GB)
pub const MAX_DECOMPRESSION_SIZE: u64 = 1024 * 1024 * 1024;

/// Mode byte plus the two-byte zlib stream header in front of raw DEFLATE data
const ZLIB_PREFIX_LEN: usize = 3;

/// Chunk transform selected by the first payload byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkMode {
    /// 'N': stored verbatim
    None,
    /// 'Z': zlib
    Zlib,
    /// 'E': encrypted, passed through undecrypted
    Encrypted,
}

impl ChunkMode {
    /// Parse a mode byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'N' => Some(Self::None),
            b'Z' => Some(Self::Zlib),
            b'E' => Some(Self::Encrypted),
            _ => None,
        }
    }
}

/// Verify a stored chunk against its declared MD5
pub(crate) fn verify(index: usize, raw: &[u8], info: &ChunkInfo) -> BlteResult<()> {
    if !info.has_checksum() {
        return Ok(());
    }
    let actual = ContentKey::from_data(raw);
    if actual.as_bytes() == &info.checksum {
        Ok(())
    } else {
        Err(BlteError::IntegrityError {
            chunk: index,
            expected: hex::encode(info.checksum),
            actual: actual.to_hex(),
        })
    }
}

/// Decode one stored chunk, returning its bytes and mode
///
/// `expected_size` is the declared decoded size when a chunk table was
/// present.
pub(crate) fn decode(
    index: usize,
    raw: &[u8],
    expected_size: Option<u32>,
) -> BlteResult<(Vec<u8>, ChunkMode)> {
    let (&mode_byte, payload) = raw.split_first().ok_or_else(|| BlteError::CorruptChunk {
        chunk: index,
        reason: "empty chunk".to_string(),
    })?;
    let mode = ChunkMode::from_byte(mode_byte).ok_or(BlteError::UnknownChunkType {
        chunk: index,
        mode: mode_byte,
    })?;

    let output = match mode {
        ChunkMode::None => payload.to_vec(),
        ChunkMode::Zlib => inflate(index, raw)?,
        ChunkMode::Encrypted => return Ok((payload.to_vec(), mode)),
    };

    if let Some(expected) = expected_size
        && output.len() as u64 != u64::from(expected)
    {
        return Err(BlteError::CorruptChunk {
            chunk: index,
            reason: format!("decoded {} bytes, expected {expected}", output.len()),
        });
    }

    Ok((output, mode))
}

fn inflate(index: usize, raw: &[u8]) -> BlteResult<Vec<u8>> {
    let stream = raw.get(ZLIB_PREFIX_LEN..).ok_or_else(|| BlteError::CorruptChunk {
        chunk: index,
        reason: "zlib chunk shorter than its stream header".to_string(),
    })?;

    let mut output = Vec::new();
    DeflateDecoder::new(stream)
        .take(MAX_DECOMPRESSION_SIZE + 1)
        .read_to_end(&mut output)
        .map_err(|e| BlteError::CorruptChunk {
            chunk: index,
            reason: format!("inflate failed: {e}"),
        })?;

    if output.len() as u64 > MAX_DECOMPRESSION_SIZE {
        return Err(BlteError::CorruptChunk {
            chunk: index,
            reason: format!("decoded size exceeds {MAX_DECOMPRESSION_SIZE} bytes"),
        });
    }
    Ok(output)
}
