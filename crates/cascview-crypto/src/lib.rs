//! Key types and hash functions used by CASC lookups
//!
//! Every table in a CASC installation is keyed by one of three things:
//!
//! - **Content keys**: MD5 of the decoded file bytes
//! - **Encoding keys**: MD5 of the BLTE-encoded blob, truncated to 9 bytes in
//!   local `.idx` files
//! - **Path hashes**: Jenkins96 of the normalized file path
//!
//! # Examples
//!
//! ```
//! use cascview_crypto::{ContentKey, path_hash};
//!
//! let key = ContentKey::from_data(b"Hello, World!");
//! assert_eq!(key.to_string(), "65A8E27D8879283831B664BD8B7F0AD4");
//!
//! // Separator and case are normalized before hashing
//! assert_eq!(path_hash("World/Maps/Azeroth.wdt"), path_hash("WORLD\\MAPS\\AZEROTH.WDT"));
//! ```

#![warn(missing_docs)]

pub mod jenkins;
pub mod keys;

pub use jenkins::{Jenkins96, hashlittle, hashlittle2, normalize_path, path_hash};
pub use keys::{
    ContentKey, EncodingKey, KEY_LENGTH, KeyHasher, KeyMap, KeySet, TRUNCATED_KEY_LENGTH,
    TruncatedKey, fnv1a32,
};
