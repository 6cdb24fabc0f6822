//! Hash to name dictionary owned by a storage session
//!
//! Tree nodes store hashes only and resolve their names here, so names can
//! be filled in or replaced after the tree is built. Call
//! [`NameTable::clear`] before reusing a table for another installation.

use cascview_crypto::{KeyMap, path_hash};

/// Known file paths and folder names
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    /// Path hash -> full path with `\` separators
    files: KeyMap<u64, String>,
    /// Segment hash -> folder name
    folders: KeyMap<u64, String>,
    /// Path hash -> hash the root table stores the file under
    aliases: KeyMap<u64, u64>,
}

impl NameTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Name the file stored under `hash`
    ///
    /// Every folder segment of `path` is recorded as well. An existing name
    /// for `hash` is replaced.
    pub fn insert_file(&mut self, hash: u64, path: &str) {
        let path = path.replace('/', "\\");
        let segments: Vec<&str> = path.split('\\').filter(|s| !s.is_empty()).collect();
        if let Some((_, folders)) = segments.split_last() {
            for folder in folders {
                self.folders
                    .entry(path_hash(folder))
                    .or_insert_with(|| (*folder).to_string());
            }
        }
        self.files.insert(hash, path);
    }

    /// Name a file whose root entry is stored under another hash
    ///
    /// Used for files without a name hash, which the root table keys by
    /// file data id. `path` then resolves to `stored_hash`.
    pub fn insert_alias(&mut self, stored_hash: u64, path: &str) {
        let hash = path_hash(path);
        if hash != stored_hash {
            self.aliases.insert(hash, stored_hash);
        }
        self.insert_file(stored_hash, path);
    }

    /// Hash the root table stores `hash` under
    pub fn resolve(&self, hash: u64) -> u64 {
        self.aliases.get(&hash).copied().unwrap_or(hash)
    }

    /// Full path of a file
    pub fn file_path(&self, hash: u64) -> Option<&str> {
        self.files.get(&hash).map(String::as_str)
    }

    /// Last path segment of a file
    pub fn file_name(&self, hash: u64) -> Option<&str> {
        self.file_path(hash)
            .map(|path| path.rsplit('\\').next().unwrap_or(path))
    }

    /// Name of a folder segment
    pub fn folder_name(&self, hash: u64) -> Option<&str> {
        self.folders.get(&hash).map(String::as_str)
    }

    /// Every named file as (hash, path)
    pub fn files(&self) -> impl Iterator<Item = (u64, &str)> {
        self.files.iter().map(|(&hash, path)| (hash, path.as_str()))
    }

    /// Number of named files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no file is named
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of named folder segments
    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    /// Forget every name
    pub fn clear(&mut self) {
        self.files.clear();
        self.folders.clear();
        self.aliases.clear();
    }
}
