//! Content key to encoding key table
//!
//! ```text
//! header            22 bytes
//! espec block       espec_block_size bytes, NUL separated strings
//! ckey page index   ckey_page_count * (first key 16 + page md5 16)
//! ckey pages        ckey_page_count * ckey_page_size
//! ekey page index   ekey_page_count * 32
//! ekey pages        ekey_page_count * ekey_page_size
//! ```
//!
//! A content key record is `key_count u8, size u40 BE, ckey, key_count * ekey`;
//! a zero key count ends the page. An encoding key record is
//! `ekey, espec index u32 BE, encoded size u40 BE`; a zero key ends the page.

use binrw::BinRead;
use std::io::Cursor;
use tracing::{debug, warn};

use cascview_crypto::{ContentKey, EncodingKey, KeyMap};

use super::error::{EncodingError, EncodingResult};
use super::header::{ENCODING_HEADER_SIZE, EncodingHeader};
use crate::cancel::CancellationToken;

const PAGE_INDEX_ENTRY_SIZE: usize = 32;
const CKEY_RECORD_FIXED: usize = 1 + 5 + 16;
const EKEY_RECORD_SIZE: usize = 16 + 4 + 5;

/// Decoded size and first encoding key of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingEntry {
    /// Decoded file size
    pub size: u64,
    /// First encoding key listed for the content
    pub key: EncodingKey,
}

/// Encoding spec and encoded size of a blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedBlob {
    /// Index into [`EncodingTable::especs`]
    pub espec_index: u32,
    /// Size of the BLTE container
    pub encoded_size: u64,
}

/// Parse options
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodingOptions {
    /// Check every page against the MD5 in its page index
    pub verify_pages: bool,
}

/// Parsed encoding table
#[derive(Debug, Clone, Default)]
pub struct EncodingTable {
    entries: KeyMap<ContentKey, EncodingEntry>,
    blobs: KeyMap<EncodingKey, EncodedBlob>,
    especs: Vec<String>,
    lossy_entries: usize,
}

impl EncodingTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a decoded encoding file
    pub fn parse(data: &[u8]) -> EncodingResult<Self> {
        Self::parse_with(data, EncodingOptions::default(), &CancellationToken::new())
    }

    /// Parse with options, checking `cancel` between records
    pub fn parse_with(
        data: &[u8],
        options: EncodingOptions,
        cancel: &CancellationToken,
    ) -> EncodingResult<Self> {
        let header_bytes = section(data, 0, ENCODING_HEADER_SIZE, "header")?;
        let header = EncodingHeader::read(&mut Cursor::new(header_bytes))?;
        header.validate()?;
        debug!(
            "encoding header: {} ckey pages of {} KB, {} ekey pages of {} KB",
            header.ckey_page_count,
            header.ckey_page_size_kb,
            header.ekey_page_count,
            header.ekey_page_size_kb
        );

        let mut table = Self::new();
        let mut offset = ENCODING_HEADER_SIZE;

        let espec_block = section(data, offset, header.espec_block_size as usize, "espec block")?;
        table.especs = espec_block
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect();
        offset += espec_block.len();

        let ckey_pages = header.ckey_page_count as usize;
        let ckey_index = section(data, offset, ckey_pages * PAGE_INDEX_ENTRY_SIZE, "ckey page index")?;
        offset += ckey_index.len();
        for page_no in 0..ckey_pages {
            let page = section(data, offset, header.ckey_page_size(), "ckey page")?;
            offset += page.len();
            if options.verify_pages {
                verify_page(ckey_index, page_no, page, "content key")?;
            }
            table.read_ckey_page(page, cancel)?;
        }

        let ekey_pages = header.ekey_page_count as usize;
        let ekey_index = section(data, offset, ekey_pages * PAGE_INDEX_ENTRY_SIZE, "ekey page index")?;
        offset += ekey_index.len();
        for page_no in 0..ekey_pages {
            let page = section(data, offset, header.ekey_page_size(), "ekey page")?;
            offset += page.len();
            if options.verify_pages {
                verify_page(ekey_index, page_no, page, "encoding key")?;
            }
            table.read_ekey_page(page, cancel)?;
        }

        if table.lossy_entries > 0 {
            warn!(
                "{} content keys list more than one encoding key; only the first is kept",
                table.lossy_entries
            );
        }
        debug!(
            "encoding table: {} content keys, {} encoded blobs, {} especs",
            table.entries.len(),
            table.blobs.len(),
            table.especs.len()
        );
        Ok(table)
    }

    fn read_ckey_page(&mut self, page: &[u8], cancel: &CancellationToken) -> EncodingResult<()> {
        let mut pos = 0;
        while pos + CKEY_RECORD_FIXED <= page.len() {
            cancel.check()?;
            let key_count = usize::from(page[pos]);
            if key_count == 0 {
                break;
            }
            let record_len = CKEY_RECORD_FIXED + key_count * 16;
            let record = page
                .get(pos..pos + record_len)
                .ok_or(EncodingError::Truncated {
                    section: "ckey record",
                    needed: record_len,
                    offset: pos,
                    available: page.len() - pos,
                })?;

            let size = record[1..6]
                .iter()
                .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
            let ckey = key_at(record, 6).map(ContentKey::from_bytes);
            let ekeys: Vec<EncodingKey> = (0..key_count)
                .filter_map(|i| key_at(record, CKEY_RECORD_FIXED + i * 16))
                .map(EncodingKey::from_bytes)
                .collect();

            if let Some(ckey) = ckey {
                self.insert(ckey, size, &ekeys);
            }
            pos += record_len;
        }
        Ok(())
    }

    fn read_ekey_page(&mut self, page: &[u8], cancel: &CancellationToken) -> EncodingResult<()> {
        for record in page.chunks_exact(EKEY_RECORD_SIZE) {
            cancel.check()?;
            let Some(ekey) = key_at(record, 0).map(EncodingKey::from_bytes) else {
                break;
            };
            if ekey.is_zero() {
                break;
            }
            let espec_index = u32::from_be_bytes([record[16], record[17], record[18], record[19]]);
            let encoded_size = record[20..25]
                .iter()
                .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
            self.blobs.entry(ekey).or_insert(EncodedBlob {
                espec_index,
                encoded_size,
            });
        }
        Ok(())
    }

    /// Record a content key, keeping only the first encoding key
    ///
    /// Returns `false` and leaves the table untouched when `ckey` is already
    /// present or `ekeys` is empty.
    pub fn insert(&mut self, ckey: ContentKey, size: u64, ekeys: &[EncodingKey]) -> bool {
        let Some(&first) = ekeys.first() else {
            return false;
        };
        if ekeys.len() > 1 {
            debug!(
                "content key {ckey} has {} encoding keys, keeping {first}",
                ekeys.len()
            );
            self.lossy_entries += 1;
        }
        if let Some(existing) = self.entries.get(&ckey) {
            if existing.key != first {
                debug!(
                    "content key {ckey} already maps to {}, ignoring {first}",
                    existing.key
                );
                self.lossy_entries += 1;
            }
            return false;
        }
        self.entries.insert(ckey, EncodingEntry { size, key: first });
        true
    }

    /// Look up a content key
    pub fn get(&self, ckey: &ContentKey) -> Option<&EncodingEntry> {
        self.entries.get(ckey)
    }

    /// Encoded size and spec of a blob
    pub fn blob(&self, ekey: &EncodingKey) -> Option<&EncodedBlob> {
        self.blobs.get(ekey)
    }

    /// Encoding spec string of a blob
    pub fn espec_for(&self, ekey: &EncodingKey) -> Option<&str> {
        let blob = self.blobs.get(ekey)?;
        self.especs.get(blob.espec_index as usize).map(String::as_str)
    }

    /// All encoding spec strings
    pub fn especs(&self) -> &[String] {
        &self.especs
    }

    /// Number of content keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no content keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of times an extra encoding key was dropped
    pub fn lossy_entries(&self) -> usize {
        self.lossy_entries
    }

    /// Iterate over all content keys
    pub fn iter(&self) -> impl Iterator<Item = (&ContentKey, &EncodingEntry)> {
        self.entries.iter()
    }
}

fn section<'a>(
    data: &'a [u8],
    offset: usize,
    len: usize,
    name: &'static str,
) -> EncodingResult<&'a [u8]> {
    data.get(offset..offset + len)
        .ok_or(EncodingError::Truncated {
            section: name,
            needed: len,
            offset,
            available: data.len().saturating_sub(offset),
        })
}

fn key_at(record: &[u8], offset: usize) -> Option<[u8; 16]> {
    record.get(offset..offset + 16)?.try_into().ok()
}

fn verify_page(
    index: &[u8],
    page_no: usize,
    page: &[u8],
    table: &'static str,
) -> EncodingResult<()> {
    let entry = page_no * PAGE_INDEX_ENTRY_SIZE;
    let expected = index.get(entry + 16..entry + 32);
    let actual = ContentKey::from_data(page);
    if expected == Some(&actual.as_bytes()[..]) {
        Ok(())
    } else {
        Err(EncodingError::PageChecksumMismatch {
            table,
            page: page_no,
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(byte: u8) -> [u8; 16] {
        [byte; 16]
    }

    /// Build an encoding file with one 1 KB page per table
    fn build(records: &[(u8, u64, Vec<[u8; 16]>)], blobs: &[([u8; 16], u32, u64)]) -> Vec<u8> {
        let especs = b"n\0z\0";
        let mut ckey_page = Vec::new();
        for (ckey, size, ekeys) in records {
            ckey_page.push(ekeys.len() as u8);
            ckey_page.extend_from_slice(&size.to_be_bytes()[3..]);
            ckey_page.extend_from_slice(&key(*ckey));
            for ekey in ekeys {
                ckey_page.extend_from_slice(ekey);
            }
        }
        ckey_page.resize(1024, 0);

        let mut ekey_page = Vec::new();
        for (ekey, espec, size) in blobs {
            ekey_page.extend_from_slice(ekey);
            ekey_page.extend_from_slice(&espec.to_be_bytes());
            ekey_page.extend_from_slice(&size.to_be_bytes()[3..]);
        }
        ekey_page.resize(1024, 0);

        let mut data = Vec::new();
        data.extend_from_slice(b"EN");
        data.extend_from_slice(&[1, 16, 16]);
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&1u32.to_be_bytes());
        data.push(0);
        data.extend_from_slice(&(especs.len() as u32).to_be_bytes());
        data.extend_from_slice(especs);

        data.extend_from_slice(&key(records.first().map_or(0, |r| r.0)));
        data.extend_from_slice(ContentKey::from_data(&ckey_page).as_bytes());
        data.extend_from_slice(&ckey_page);

        data.extend_from_slice(&[0u8; 16]);
        data.extend_from_slice(ContentKey::from_data(&ekey_page).as_bytes());
        data.extend_from_slice(&ekey_page);
        data
    }

    #[test]
    fn test_parse_forward_and_reverse_tables() {
        let data = build(
            &[(1, 100, vec![key(0xA1)]), (2, 0x01_0000_0000, vec![key(0xA2)])],
            &[(key(0xA1), 1, 80), (key(0xA2), 0, 99)],
        );
        let table = EncodingTable::parse_with(
            &data,
            EncodingOptions { verify_pages: true },
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get(&ContentKey::from_bytes(key(1))),
            Some(&EncodingEntry {
                size: 100,
                key: EncodingKey::from_bytes(key(0xA1))
            })
        );
        assert_eq!(
            table.get(&ContentKey::from_bytes(key(2))).unwrap().size,
            0x01_0000_0000
        );
        assert_eq!(table.espec_for(&EncodingKey::from_bytes(key(0xA1))), Some("z"));
        assert_eq!(
            table.blob(&EncodingKey::from_bytes(key(0xA2))).unwrap().encoded_size,
            99
        );
    }

    #[test]
    fn test_multiple_keys_keep_first() {
        let data = build(&[(7, 10, vec![key(0xB1), key(0xB2)])], &[]);
        let table = EncodingTable::parse(&data).unwrap();
        assert_eq!(
            table.get(&ContentKey::from_bytes(key(7))).unwrap().key,
            EncodingKey::from_bytes(key(0xB1))
        );
        assert_eq!(table.lossy_entries(), 1);
    }

    #[test]
    fn test_second_insert_does_not_overwrite() {
        let mut table = EncodingTable::new();
        let ckey = ContentKey::from_bytes(key(3));
        assert!(table.insert(ckey, 5, &[EncodingKey::from_bytes(key(0xC1))]));
        assert!(!table.insert(ckey, 6, &[EncodingKey::from_bytes(key(0xC2))]));
        assert_eq!(table.get(&ckey).unwrap().key, EncodingKey::from_bytes(key(0xC1)));
        assert_eq!(table.get(&ckey).unwrap().size, 5);
        assert_eq!(table.lossy_entries(), 1);
    }

    #[test]
    fn test_bad_magic() {
        let mut data = build(&[], &[]);
        data[0] = b'X';
        assert!(matches!(
            EncodingTable::parse(&data),
            Err(EncodingError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_page_checksum_mismatch() {
        let mut data = build(&[(1, 1, vec![key(0xA1)])], &[]);
        // First byte of the content key page
        let page_start = ENCODING_HEADER_SIZE + 4 + 32;
        data[page_start + 1] ^= 0xFF;
        let result = EncodingTable::parse_with(
            &data,
            EncodingOptions { verify_pages: true },
            &CancellationToken::new(),
        );
        assert!(matches!(
            result,
            Err(EncodingError::PageChecksumMismatch { page: 0, .. })
        ));
    }

    #[test]
    fn test_truncated_file() {
        let data = build(&[(1, 1, vec![key(0xA1)])], &[]);
        let result = EncodingTable::parse(&data[..data.len() - 10]);
        assert!(matches!(result, Err(EncodingError::Truncated { .. })));
    }

    #[test]
    fn test_cancelled() {
        let data = build(&[(1, 1, vec![key(0xA1)])], &[]);
        let token = CancellationToken::new();
        token.cancel();
        let result = EncodingTable::parse_with(&data, EncodingOptions::default(), &token);
        assert!(matches!(result, Err(EncodingError::Cancelled(_))));
    }
}
