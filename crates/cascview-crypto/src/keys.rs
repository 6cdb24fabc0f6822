//! Content keys, encoding keys and the truncated keys of local indices

use binrw::{BinRead, BinWrite};
use md5::{Digest, Md5};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{BuildHasherDefault, Hash, Hasher};

/// Length of a full content or encoding key
pub const KEY_LENGTH: usize = 16;

/// Length of the truncated encoding keys stored in local `.idx` files
pub const TRUNCATED_KEY_LENGTH: usize = 9;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// FNV-1a 32-bit hash over a byte sequence
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Hasher for key-addressed tables
///
/// Keys are already uniformly distributed MD5 output, so a cheap FNV-1a fold
/// over the bytes is all a table needs.
#[derive(Debug, Clone, Copy)]
pub struct KeyHasher(u32);

impl Default for KeyHasher {
    fn default() -> Self {
        Self(FNV_OFFSET_BASIS)
    }
}

impl Hasher for KeyHasher {
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 = (self.0 ^ u32::from(byte)).wrapping_mul(FNV_PRIME);
        }
    }

    fn finish(&self) -> u64 {
        u64::from(self.0)
    }
}

/// Hash map keyed by CASC keys
pub type KeyMap<K, V> = HashMap<K, V, BuildHasherDefault<KeyHasher>>;

/// Hash set of CASC keys
pub type KeySet<K> = HashSet<K, BuildHasherDefault<KeyHasher>>;

macro_rules! md5_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
        pub struct $name([u8; KEY_LENGTH]);

        impl $name {
            /// Create a key from raw bytes
            pub const fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
                Self(bytes)
            }

            /// Create a key by hashing `data` with MD5
            pub fn from_data(data: &[u8]) -> Self {
                let digest = Md5::digest(data);
                let mut bytes = [0u8; KEY_LENGTH];
                bytes.copy_from_slice(&digest);
                Self(bytes)
            }

            /// Create a key from a slice, `None` unless it is exactly 16 bytes
            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                <[u8; KEY_LENGTH]>::try_from(bytes).ok().map(Self)
            }

            /// Parse a key from a 32 character hex string (either case)
            pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
                let mut bytes = [0u8; KEY_LENGTH];
                hex::decode_to_slice(hex.trim(), &mut bytes)?;
                Ok(Self(bytes))
            }

            /// Raw key bytes
            pub const fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
                &self.0
            }

            /// Lower-case hex, as used in CDN paths
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Upper-case hex without separators
            pub fn to_hex_upper(&self) -> String {
                hex::encode_upper(self.0)
            }

            /// Whether every byte is zero
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|&b| b == 0)
            }
        }

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                state.write(&self.0);
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex_upper())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; KEY_LENGTH]> for $name {
            fn from(bytes: [u8; KEY_LENGTH]) -> Self {
                Self(bytes)
            }
        }
    };
}

md5_key!(
    /// MD5 of a file's decoded bytes, the key into the encoding table
    ContentKey
);

md5_key!(
    /// MD5 of a BLTE-encoded blob, the key into archive indices
    EncodingKey
);

impl EncodingKey {
    /// First 9 bytes, the form stored in local `.idx` files
    pub fn truncated(&self) -> TruncatedKey {
        let mut bytes = [0u8; TRUNCATED_KEY_LENGTH];
        bytes.copy_from_slice(&self.0[..TRUNCATED_KEY_LENGTH]);
        TruncatedKey(bytes)
    }
}

/// Encoding key truncated to 9 bytes
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct TruncatedKey([u8; TRUNCATED_KEY_LENGTH]);

impl TruncatedKey {
    /// Create a truncated key from raw bytes
    pub const fn from_bytes(bytes: [u8; TRUNCATED_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Take the first 9 bytes of a longer key, `None` if it is shorter
    pub fn from_prefix(bytes: &[u8]) -> Option<Self> {
        let prefix = bytes.get(..TRUNCATED_KEY_LENGTH)?;
        let mut out = [0u8; TRUNCATED_KEY_LENGTH];
        out.copy_from_slice(prefix);
        Some(Self(out))
    }

    /// Raw key bytes
    pub const fn as_bytes(&self) -> &[u8; TRUNCATED_KEY_LENGTH] {
        &self.0
    }

    /// Local index bucket for this key
    ///
    /// XOR of all nine bytes, folded to a nibble.
    pub fn bucket(&self) -> u8 {
        let folded = self.0.iter().fold(0u8, |acc, &b| acc ^ b);
        (folded & 0x0f) ^ (folded >> 4)
    }
}

impl Hash for TruncatedKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(&self.0);
    }
}

impl fmt::Display for TruncatedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl From<EncodingKey> for TruncatedKey {
    fn from(key: EncodingKey) -> Self {
        key.truncated()
    }
}
