//! Root file: the path namespace of a build
//!
//! The root file maps 64-bit path hashes to one or more content keys, each
//! tagged with the locale and content flags of the block it came from.
//! Several variants of one path (per-language sound files, low-violence
//! models) share a hash and are told apart by those flags.

mod error;
mod flags;
mod header;
mod table;

pub use error::{Result, RootError};
pub use flags::{ContentFlags, LocaleFlags};
pub use header::RootLayout;
pub use table::{RootEntry, RootTable, file_data_id_hash, select_entries};
