//! Tag bitmasks shared by install and download manifests

use std::io::Read;

use crate::cancel::{CancellationToken, Cancelled};
use crate::read_cstring;

/// Category of a manifest tag
///
/// Values outside the known set are kept as [`TagType::Other`] so a manifest
/// from a newer build still loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagType {
    /// Platform tag (Windows, OSX, ...)
    Platform,
    /// Architecture tag (x86_32, x86_64, ...)
    Architecture,
    /// Locale tag (enUS, deDE, ...)
    Locale,
    /// Region tag (US, EU, ...)
    Region,
    /// Category tag (speech, text, ...)
    Category,
    /// Alternate content tag
    Alternate,
    /// Tag type not known to this parser
    Other(u16),
}

impl TagType {
    /// Map a raw tag type
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0001 => Self::Platform,
            0x0002 => Self::Architecture,
            0x0003 => Self::Locale,
            0x0004 => Self::Region,
            0x0005 => Self::Category,
            0x4000 => Self::Alternate,
            other => Self::Other(other),
        }
    }

    /// Raw tag type
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Platform => 0x0001,
            Self::Architecture => 0x0002,
            Self::Locale => 0x0003,
            Self::Region => 0x0004,
            Self::Category => 0x0005,
            Self::Alternate => 0x4000,
            Self::Other(value) => value,
        }
    }
}

/// How mask bytes map to entry indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BitOrder {
    /// Bit `i` is bit `i % 8` of byte `i / 8`
    Raw,
    /// Each byte goes through [`permute_byte`] first
    Permuted,
}

/// Byte permutation applied to download manifest masks
pub(crate) fn permute_byte(b: u8) -> u8 {
    ((u64::from(b) * 0x0002_0202_0202 & 0x0108_8442_2010) % 1023) as u8
}

/// A named tag with one bit per manifest entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Tag name (e.g. "Windows", "enUS")
    pub name: String,
    /// Tag category
    pub tag_type: TagType,
    mask: Vec<u8>,
}

impl Tag {
    /// Whether the entry at `index` carries this tag
    pub fn contains(&self, index: usize) -> bool {
        self.mask
            .get(index / 8)
            .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
    }

    /// Indices of all tagged entries, up to `entry_count`
    pub fn indices(&self, entry_count: usize) -> impl Iterator<Item = usize> + '_ {
        (0..entry_count).filter(|&i| self.contains(i))
    }

    /// Normalized mask bytes
    pub fn mask(&self) -> &[u8] {
        &self.mask
    }
}

/// Read `count` tags whose masks are `mask_len` bytes long
pub(crate) fn read_tags<R: Read>(
    reader: &mut R,
    count: usize,
    mask_len: usize,
    order: BitOrder,
    cancel: &CancellationToken,
) -> Result<Vec<Tag>, TagReadError> {
    let mut tags = Vec::with_capacity(count);
    for _ in 0..count {
        cancel.check()?;
        let name = read_cstring(reader)?;
        let mut raw_type = [0u8; 2];
        reader.read_exact(&mut raw_type)?;
        let mut mask = vec![0u8; mask_len];
        reader.read_exact(&mut mask)?;
        if order == BitOrder::Permuted {
            for byte in &mut mask {
                *byte = permute_byte(*byte);
            }
        }
        tags.push(Tag {
            name,
            tag_type: TagType::from_u16(u16::from_be_bytes(raw_type)),
            mask,
        });
    }
    Ok(tags)
}

#[derive(Debug)]
pub(crate) enum TagReadError {
    Io(std::io::Error),
    Cancelled(Cancelled),
}

impl From<std::io::Error> for TagReadError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<Cancelled> for TagReadError {
    fn from(err: Cancelled) -> Self {
        Self::Cancelled(err)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    #[test]
    fn test_permute_known_bytes() {
        assert_eq!(permute_byte(0x01), 0x80);
        assert_eq!(permute_byte(0x80), 0x01);
        assert_eq!(permute_byte(0xF0), 0x0F);
        assert_eq!(permute_byte(0x00), 0x00);
        assert_eq!(permute_byte(0xFF), 0xFF);
    }

    #[test]
    fn test_read_tags_keeps_unknown_types() {
        let mut data = Vec::new();
        data.extend_from_slice(b"Windows\0");
        data.extend_from_slice(&1u16.to_be_bytes());
        data.push(0b0000_0101);
        data.extend_from_slice(b"Mystery\0");
        data.extend_from_slice(&0x0777u16.to_be_bytes());
        data.push(0b0000_0010);

        let tags = read_tags(
            &mut Cursor::new(data),
            2,
            1,
            BitOrder::Raw,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(tags[0].tag_type, TagType::Platform);
        assert_eq!(tags[0].indices(3).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(tags[1].tag_type, TagType::Other(0x0777));
        assert!(tags[1].contains(1));
        assert!(!tags[1].contains(100));
    }

    #[test]
    fn test_permuted_order_is_msb_first() {
        let mut data = b"Speech\0".to_vec();
        data.extend_from_slice(&5u16.to_be_bytes());
        data.push(0b1000_0000);

        let tags = read_tags(
            &mut Cursor::new(data),
            1,
            1,
            BitOrder::Permuted,
            &CancellationToken::new(),
        )
        .unwrap();
        assert!(tags[0].contains(0));
        assert!(!tags[0].contains(7));
    }

    proptest! {
        #[test]
        fn permute_is_an_involution(b in any::<u8>()) {
            prop_assert_eq!(permute_byte(permute_byte(b)), b);
            prop_assert_eq!(permute_byte(b), b.reverse_bits());
        }
    }
}
