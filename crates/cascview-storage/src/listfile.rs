//! Listfiles
//!
//! A listfile is plain text with one path per line, either `path` or
//! `fdid;path`. Paths use `\` or `/` separators.
//!
//! Hashing a large listfile is slow, so [`Listfile::load`] keeps a binary
//! cache next to the source (`<listfile>.cache`) tagged with the source's
//! modification time. The cache is rebuilt whenever the time differs.

use binrw::{BinRead, BinWrite};
use std::fs;
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};

use cascview_crypto::path_hash;

use crate::names::NameTable;
use crate::root::RootHandler;
use crate::{Result, StorageError};

const CACHE_VERSION: u16 = 1;
const NO_FILE_DATA_ID: u32 = u32::MAX;

#[derive(BinRead, BinWrite, Debug)]
#[brw(little, magic = b"CVLF")]
struct CacheHeader {
    version: u16,
    source_mtime: u64,
    count: u32,
}

#[derive(BinRead, BinWrite, Debug)]
#[brw(little)]
struct CacheRecord {
    hash: u64,
    file_data_id: u32,
    name_len: u16,
    #[br(count = name_len)]
    name: Vec<u8>,
}

/// One listfile line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListfileEntry {
    /// Jenkins hash of `path`
    pub hash: u64,
    /// File data id, for `fdid;path` lines
    pub file_data_id: Option<u32>,
    /// Path with `\` separators
    pub path: String,
}

impl ListfileEntry {
    fn new(file_data_id: Option<u32>, path: &str) -> Self {
        let path = path.replace('/', "\\");
        Self {
            hash: path_hash(&path),
            file_data_id,
            path,
        }
    }
}

/// Result of naming root entries from a listfile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListfileStats {
    /// Entries named by path hash
    pub named: usize,
    /// Entries named through their file data id
    pub aliased: usize,
    /// Lines matching nothing in the root table
    pub unknown: usize,
}

/// Parsed listfile
#[derive(Debug, Clone, Default)]
pub struct Listfile {
    entries: Vec<ListfileEntry>,
}

impl Listfile {
    /// Parse listfile text
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| match line.split_once(';') {
                Some((id, path)) if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) => {
                    ListfileEntry::new(id.parse().ok(), path)
                }
                _ => ListfileEntry::new(None, line),
            })
            .collect();
        Self { entries }
    }

    /// Load `path`, using or refreshing its binary cache
    pub fn load(path: &Path) -> Result<Self> {
        let mtime = fs::metadata(path)?
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs());
        let cache_path = Self::cache_path(path);

        match Self::read_cache(&cache_path, mtime) {
            Ok(Some(listfile)) => {
                debug!(
                    "Loaded {} listfile entries from {}",
                    listfile.len(),
                    cache_path.display()
                );
                return Ok(listfile);
            }
            Ok(None) => {}
            Err(e) => warn!("Ignoring listfile cache {}: {e}", cache_path.display()),
        }

        let text = fs::read(path)?;
        let listfile = Self::parse(&String::from_utf8_lossy(&text));
        info!("Parsed {} listfile entries from {}", listfile.len(), path.display());
        if let Err(e) = listfile.write_cache(&cache_path, mtime) {
            warn!("Failed to write listfile cache {}: {e}", cache_path.display());
        }
        Ok(listfile)
    }

    /// Location of the cache for `path`
    pub fn cache_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".cache");
        PathBuf::from(name)
    }

    fn read_cache(cache_path: &Path, mtime: u64) -> Result<Option<Self>> {
        let Ok(data) = fs::read(cache_path) else {
            return Ok(None);
        };
        let mut reader = Cursor::new(data);
        let header = CacheHeader::read(&mut reader)
            .map_err(|e| StorageError::Cache(format!("bad header: {e}")))?;
        if header.version != CACHE_VERSION || header.source_mtime != mtime {
            return Ok(None);
        }

        let mut entries = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            let record = CacheRecord::read(&mut reader)
                .map_err(|e| StorageError::Cache(format!("bad record: {e}")))?;
            entries.push(ListfileEntry {
                hash: record.hash,
                file_data_id: (record.file_data_id != NO_FILE_DATA_ID).then_some(record.file_data_id),
                path: String::from_utf8_lossy(&record.name).into_owned(),
            });
        }
        Ok(Some(Self { entries }))
    }

    fn write_cache(&self, cache_path: &Path, mtime: u64) -> Result<()> {
        let file = fs::File::create(cache_path)?;
        let mut writer = BufWriter::new(file);
        let to_cache_error = |e: binrw::Error| StorageError::Cache(e.to_string());

        CacheHeader {
            version: CACHE_VERSION,
            source_mtime: mtime,
            count: self.entries.len() as u32,
        }
        .write(&mut writer)
        .map_err(to_cache_error)?;

        for entry in &self.entries {
            let name = truncate_name(&entry.path).as_bytes();
            CacheRecord {
                hash: entry.hash,
                file_data_id: entry.file_data_id.unwrap_or(NO_FILE_DATA_ID),
                name_len: name.len() as u16,
                name: name.to_vec(),
            }
            .write(&mut writer)
            .map_err(to_cache_error)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Entries in file order
    pub fn entries(&self) -> &[ListfileEntry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the listfile is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record the names of entries present in `root`
    ///
    /// A path whose hash is not in the root table is still used when its
    /// file data id is, so files stored without a name hash get named too.
    /// Other lines are counted and skipped.
    pub fn assign_names(&self, root: &RootHandler, names: &mut NameTable) -> ListfileStats {
        let mut stats = ListfileStats::default();
        for entry in &self.entries {
            if root.contains(entry.hash) {
                names.insert_file(entry.hash, &entry.path);
                stats.named += 1;
                continue;
            }
            match entry
                .file_data_id
                .and_then(|id| root.hash_for_file_data_id(id))
            {
                Some(stored) => {
                    names.insert_alias(stored, &entry.path);
                    stats.aliased += 1;
                }
                None => stats.unknown += 1,
            }
        }
        if stats.unknown > 0 {
            warn!(
                "{} listfile entries are not in the root table",
                stats.unknown
            );
        }
        info!(
            "Listfile named {} files ({} by file data id)",
            stats.named + stats.aliased,
            stats.aliased
        );
        stats
    }
}

/// Longest prefix of `name` that fits a cache record, cut on a char boundary
fn truncate_name(name: &str) -> &str {
    let mut end = name.len().min(usize::from(u16::MAX));
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
