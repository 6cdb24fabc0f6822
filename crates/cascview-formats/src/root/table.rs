//! Root table: path hash to content variants

use binrw::BinRead;
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use tracing::debug;

use cascview_crypto::{ContentKey, path_hash};

use super::error::{Result, RootError};
use super::flags::{ContentFlags, LocaleFlags};
use super::header::RootLayout;
use crate::cancel::CancellationToken;

/// One stored variant of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootEntry {
    /// MD5 of the decoded file
    pub content_key: ContentKey,
    /// Locales of the enclosing block
    pub locale: LocaleFlags,
    /// Content flags of the enclosing block
    pub content: ContentFlags,
    /// File data id
    pub file_data_id: u32,
}

#[derive(BinRead, Debug)]
#[br(little)]
struct BlockHeader {
    num_records: u32,
    content_flags: u32,
    locale_flags: u32,
}

#[derive(BinRead, Debug)]
#[br(little)]
struct SplitBlockHeader {
    num_records: u32,
    locale_flags: u32,
    content_flags: u32,
    content_flags_2: u32,
    content_flags_3: u8,
}

/// Smallest record: fdid delta plus content key
const MIN_RECORD_SIZE: u64 = 4 + 16;

/// Hash under which a file without a name hash is stored
///
/// Such files are only reachable by file data id until a listfile names them.
pub fn file_data_id_hash(file_data_id: u32) -> u64 {
    path_hash(&format!("FILEDATA_{file_data_id}"))
}

/// Parsed root file
#[derive(Debug, Clone, Default)]
pub struct RootTable {
    entries: HashMap<u64, Vec<RootEntry>>,
    by_file_data_id: HashMap<u32, u64>,
    layout: Option<RootLayout>,
    blocks: usize,
    nameless: usize,
}

impl RootTable {
    /// Parse a decoded root file
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::parse_with(data, &CancellationToken::new())
    }

    /// Parse, checking `cancel` between records
    pub fn parse_with(data: &[u8], cancel: &CancellationToken) -> Result<Self> {
        let mut reader = Cursor::new(data);
        let layout = RootLayout::detect(&mut reader)?;
        let len = data.len() as u64;
        let mut table = Self {
            layout: Some(layout),
            ..Self::default()
        };

        while reader.position() < len {
            cancel.check()?;
            let offset = reader.position();
            let (count, locale, content) = if layout.has_split_block_header() {
                let header = SplitBlockHeader::read(&mut reader)?;
                let content = header.content_flags
                    | header.content_flags_2
                    | (u32::from(header.content_flags_3) << 17);
                (header.num_records, header.locale_flags, content)
            } else {
                let header = BlockHeader::read(&mut reader)?;
                (header.num_records, header.locale_flags, header.content_flags)
            };
            let block = table.blocks;
            table.blocks += 1;

            let locale = LocaleFlags(locale);
            let content = ContentFlags(content);
            if locale.is_empty() {
                return Err(RootError::EmptyLocale { block, offset });
            }
            if count == 0 {
                continue;
            }
            let remaining = len - reader.position();
            if u64::from(count) * MIN_RECORD_SIZE > remaining {
                return Err(RootError::BlockTooLarge {
                    block,
                    records: count,
                    remaining,
                });
            }

            let named = !content.contains(ContentFlags::NO_NAME_HASH);
            let records = match layout {
                RootLayout::Legacy => read_interleaved(&mut reader, count, cancel)?,
                RootLayout::Manifest { .. } => read_split(&mut reader, count, named, cancel)?,
            };
            for (file_data_id, content_key, name_hash) in records {
                let hash = name_hash.unwrap_or_else(|| {
                    table.nameless += 1;
                    file_data_id_hash(file_data_id)
                });
                table.insert(
                    hash,
                    RootEntry {
                        content_key,
                        locale,
                        content,
                        file_data_id,
                    },
                );
            }
        }

        debug!(
            "root: {:?}, {} blocks, {} hashes, {} entries without name hash",
            layout,
            table.blocks,
            table.entries.len(),
            table.nameless
        );
        Ok(table)
    }

    /// Add one entry under `hash`
    pub fn insert(&mut self, hash: u64, entry: RootEntry) {
        self.by_file_data_id
            .entry(entry.file_data_id)
            .or_insert(hash);
        self.entries.entry(hash).or_default().push(entry);
    }

    /// All variants stored under `hash`, in file order
    pub fn entries(&self, hash: u64) -> &[RootEntry] {
        self.entries.get(&hash).map_or(&[], Vec::as_slice)
    }

    /// Variants of `hash` matching `locale`, narrowed by `content`
    ///
    /// Entries whose locale intersects `locale` are kept. If more than one
    /// remains and any of them has exactly `content`, only those are kept.
    /// The result preserves file order, so its first element is the pick.
    pub fn select(&self, hash: u64, locale: LocaleFlags, content: ContentFlags) -> Vec<&RootEntry> {
        select_entries(self.entries(hash), locale, content)
    }

    /// Path hash a file data id is stored under
    pub fn hash_for_file_data_id(&self, file_data_id: u32) -> Option<u64> {
        self.by_file_data_id.get(&file_data_id).copied()
    }

    /// Whether `hash` has at least one entry
    pub fn contains(&self, hash: u64) -> bool {
        self.entries.contains_key(&hash)
    }

    /// Iterate over every hash and its entries
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[RootEntry])> {
        self.entries.iter().map(|(&hash, entries)| (hash, entries.as_slice()))
    }

    /// Number of distinct hashes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of entries across all hashes
    pub fn entry_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Layout the table was parsed from
    pub fn layout(&self) -> Option<RootLayout> {
        self.layout
    }

    /// Entries stored under a file data id hash
    pub fn nameless_entries(&self) -> usize {
        self.nameless
    }
}

/// Locale filter followed by content narrowing, see [`RootTable::select`]
pub fn select_entries(
    entries: &[RootEntry],
    locale: LocaleFlags,
    content: ContentFlags,
) -> Vec<&RootEntry> {
    let by_locale: Vec<&RootEntry> = entries
        .iter()
        .filter(|entry| entry.locale.intersects(locale))
        .collect();
    if by_locale.len() > 1 {
        let exact: Vec<&RootEntry> = by_locale
            .iter()
            .copied()
            .filter(|entry| entry.content == content)
            .collect();
        if !exact.is_empty() {
            return exact;
        }
    }
    by_locale
}

type Record = (u32, ContentKey, Option<u64>);

fn read_deltas<R: Read + Seek>(reader: &mut R, count: u32) -> Result<Vec<u32>> {
    let mut ids = Vec::with_capacity(count as usize);
    let mut next = 0u32;
    for _ in 0..count {
        let delta = i32::read_le(reader)?;
        let id = next.wrapping_add_signed(delta);
        ids.push(id);
        next = id.wrapping_add(1);
    }
    Ok(ids)
}

/// Legacy block: deltas, then `(content key, name hash)` pairs
fn read_interleaved<R: Read + Seek>(
    reader: &mut R,
    count: u32,
    cancel: &CancellationToken,
) -> Result<Vec<Record>> {
    let ids = read_deltas(reader, count)?;
    let mut records = Vec::with_capacity(ids.len());
    for id in ids {
        cancel.check()?;
        let content_key = ContentKey::read_le(reader)?;
        let name_hash = u64::read_le(reader)?;
        records.push((id, content_key, Some(name_hash)));
    }
    Ok(records)
}

/// Manifest block: deltas, then all content keys, then all name hashes
fn read_split<R: Read + Seek>(
    reader: &mut R,
    count: u32,
    named: bool,
    cancel: &CancellationToken,
) -> Result<Vec<Record>> {
    let ids = read_deltas(reader, count)?;
    let mut keys = Vec::with_capacity(ids.len());
    for _ in 0..count {
        cancel.check()?;
        keys.push(ContentKey::read_le(reader)?);
    }
    let mut hashes = Vec::with_capacity(ids.len());
    if named {
        for _ in 0..count {
            hashes.push(Some(u64::read_le(reader)?));
        }
    } else {
        hashes.resize(ids.len(), None);
    }
    Ok(ids
        .into_iter()
        .zip(keys)
        .zip(hashes)
        .map(|((id, key), hash)| (id, key, hash))
        .collect())
}
