//! Encoding table: content key to encoding key
//!
//! Each content key (MD5 of a decoded file) maps to one or more encoding
//! keys (MD5 of the stored BLTE blob). Only the first encoding key is kept;
//! extra keys are logged and counted.

mod error;
mod header;
mod table;

pub use error::{EncodingError, EncodingResult};
pub use header::{ENCODING_HEADER_SIZE, EncodingHeader};
pub use table::{EncodedBlob, EncodingEntry, EncodingOptions, EncodingTable};
