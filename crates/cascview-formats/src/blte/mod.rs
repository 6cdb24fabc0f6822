//! BLTE container decoding
//!
//! Every object in a CASC archive is wrapped in a BLTE container: a short
//! frame header followed by one or more chunks, each starting with a mode
//! byte. Chunks are verified against their MD5 (when declared) before they
//! are decoded, and decoded chunks are emitted strictly in order.
//!
//! ```
//! use cascview_formats::blte;
//!
//! let container = b"BLTE\0\0\0\0Nhello";
//! let decoded = blte::decode(&mut &container[..], container.len() as u64)?;
//! assert_eq!(decoded.data, b"hello");
//! # Ok::<(), cascview_formats::blte::BlteError>(())
//! ```
//!
//! Encrypted (`'E'`) chunks are not decrypted. Their payload is passed
//! through and counted in [`Decoded::encrypted_chunks`].

mod chunk;
mod error;
mod header;

pub use chunk::{ChunkMode, MAX_DECOMPRESSION_SIZE};
pub use error::{BlteError, BlteResult};
pub use header::{BLTE_MAGIC, BLTE_PREAMBLE_SIZE, BlteFrame, CHUNK_TABLE_MARKER, ChunkInfo};

use std::io::{Read, Write};
use tracing::{trace, warn};

use crate::cancel::CancellationToken;

/// Fully decoded container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Concatenated chunk output
    pub data: Vec<u8>,
    /// Chunks passed through undecrypted
    pub encrypted_chunks: usize,
}

impl Decoded {
    /// Whether every chunk was actually decoded
    pub fn is_complete(&self) -> bool {
        self.encrypted_chunks == 0
    }
}

/// Outcome of a streaming decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeSummary {
    /// Bytes written to the sink
    pub bytes_written: u64,
    /// Chunks in the container
    pub chunks: usize,
    /// Chunks passed through undecrypted
    pub encrypted_chunks: usize,
}

/// Decode a container held in `reader`
pub fn decode<R: Read>(reader: &mut R, declared_size: u64) -> BlteResult<Decoded> {
    BlteDecoder::new(declared_size).decode(reader)
}

/// Container decoder with optional cancellation
#[derive(Debug, Clone)]
pub struct BlteDecoder<'a> {
    declared_size: u64,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> BlteDecoder<'a> {
    /// Decoder for a container of `declared_size` bytes in total
    pub fn new(declared_size: u64) -> Self {
        Self {
            declared_size,
            cancel: None,
        }
    }

    /// Check `token` before every chunk
    #[must_use]
    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Decode into memory
    ///
    /// On any error nothing is returned, not even the chunks that decoded
    /// before the failure.
    pub fn decode<R: Read>(&self, reader: &mut R) -> BlteResult<Decoded> {
        let mut data = Vec::new();
        let summary = self.decode_to(reader, &mut data)?;
        Ok(Decoded {
            data,
            encrypted_chunks: summary.encrypted_chunks,
        })
    }

    /// Decode into `writer`, one verified chunk at a time
    ///
    /// A chunk is only written once it has passed its integrity check and
    /// decoded cleanly, but chunks before a failing one are already in the
    /// sink. Callers that need all-or-nothing output write to a scratch
    /// location first.
    pub fn decode_to<R: Read, W: Write>(
        &self,
        reader: &mut R,
        writer: &mut W,
    ) -> BlteResult<DecodeSummary> {
        let frame = BlteFrame::read(reader, self.declared_size)?;
        let mut summary = DecodeSummary {
            chunks: frame.chunk_count(),
            ..DecodeSummary::default()
        };

        match frame {
            BlteFrame::Single { compressed_size } => {
                self.check_cancelled()?;
                let raw = read_chunk(reader, compressed_size)?;
                let (output, mode) = chunk::decode(0, &raw, None)?;
                emit(writer, &output, mode, &mut summary)?;
            }
            BlteFrame::Chunked(infos) => {
                for (index, info) in infos.iter().enumerate() {
                    self.check_cancelled()?;
                    let raw = read_chunk(reader, u64::from(info.compressed_size))?;
                    chunk::verify(index, &raw, info)?;
                    let (output, mode) =
                        chunk::decode(index, &raw, Some(info.decompressed_size))?;
                    trace!(
                        "chunk {index}: {:?}, {} -> {} bytes",
                        mode,
                        raw.len(),
                        output.len()
                    );
                    emit(writer, &output, mode, &mut summary)?;
                }
            }
        }

        if summary.encrypted_chunks > 0 {
            warn!(
                "{} of {} BLTE chunks are encrypted and were passed through undecrypted",
                summary.encrypted_chunks, summary.chunks
            );
        }
        Ok(summary)
    }

    fn check_cancelled(&self) -> BlteResult<()> {
        if let Some(token) = self.cancel {
            token.check()?;
        }
        Ok(())
    }

}

fn emit<W: Write>(
    writer: &mut W,
    output: &[u8],
    mode: ChunkMode,
    summary: &mut DecodeSummary,
) -> BlteResult<()> {
    writer.write_all(output)?;
    summary.bytes_written += output.len() as u64;
    if mode == ChunkMode::Encrypted {
        summary.encrypted_chunks += 1;
    }
    Ok(())
}

fn read_chunk<R: Read>(reader: &mut R, size: u64) -> BlteResult<Vec<u8>> {
    let mut raw = Vec::new();
    reader.by_ref().take(size).read_to_end(&mut raw)?;
    if (raw.len() as u64) < size {
        return Err(BlteError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("chunk truncated: expected {size} bytes, got {}", raw.len()),
        )));
    }
    Ok(raw)
}
