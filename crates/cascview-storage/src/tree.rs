//! Folder tree over the selected root entries
//!
//! Folders are keyed by the hash of their own name segment and files by
//! their full path hash. Display names come from a [`NameTable`]; files the
//! table does not know are placed in an `unknown` folder under a
//! placeholder name built from their hash and file data id.

use std::borrow::Cow;
use std::collections::BTreeMap;

use cascview_crypto::{ContentKey, path_hash};
use cascview_formats::root::{ContentFlags, LocaleFlags, RootEntry, RootTable};

use crate::names::NameTable;

/// Folder holding files the name table does not know
pub const UNKNOWN_FOLDER: &str = "unknown";

/// A folder node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascFolder {
    hash: u64,
    folders: BTreeMap<u64, CascFolder>,
    files: BTreeMap<u64, CascFile>,
}

/// A file node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascFile {
    hash: u64,
    entry: RootEntry,
}

impl CascFolder {
    /// An empty root folder
    pub fn root() -> Self {
        Self::default()
    }

    fn child(hash: u64) -> Self {
        Self {
            hash,
            ..Self::default()
        }
    }

    /// Hash of this folder's name segment, 0 for the root
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Display name
    pub fn name<'a>(&self, names: &'a NameTable) -> Cow<'a, str> {
        if self.hash == 0 {
            return Cow::Borrowed("");
        }
        match names.folder_name(self.hash) {
            Some(name) => Cow::Borrowed(name),
            None if self.hash == path_hash(UNKNOWN_FOLDER) => Cow::Borrowed(UNKNOWN_FOLDER),
            None => Cow::Owned(format!("{:016X}", self.hash)),
        }
    }

    /// Sub-folders ordered by hash
    pub fn folders(&self) -> impl Iterator<Item = &Self> {
        self.folders.values()
    }

    /// Files ordered by hash
    pub fn files(&self) -> impl Iterator<Item = &CascFile> {
        self.files.values()
    }

    /// Direct sub-folder by name, ignoring case
    pub fn folder(&self, name: &str) -> Option<&Self> {
        self.folders.get(&path_hash(name))
    }

    /// Folder at a `\` or `/` separated path; the empty path is `self`
    pub fn find_folder(&self, path: &str) -> Option<&Self> {
        path.split(['\\', '/'])
            .filter(|s| !s.is_empty())
            .try_fold(self, |folder, segment| folder.folder(segment))
    }

    /// File by full path hash, searched recursively
    pub fn find_file(&self, hash: u64) -> Option<&CascFile> {
        self.files
            .get(&hash)
            .or_else(|| self.folders.values().find_map(|f| f.find_file(hash)))
    }

    /// Number of files in this folder and below
    pub fn file_count(&self) -> usize {
        self.files.len() + self.folders.values().map(Self::file_count).sum::<usize>()
    }

    /// Number of folders below this one
    pub fn folder_count(&self) -> usize {
        self.folders.len() + self.folders.values().map(Self::folder_count).sum::<usize>()
    }

    /// Every file in this folder and below, depth first
    pub fn walk_files(&self) -> Vec<&CascFile> {
        let mut out: Vec<&CascFile> = self.files.values().collect();
        for folder in self.folders.values() {
            out.extend(folder.walk_files());
        }
        out
    }

    fn insert(&mut self, folders: &[&str], file: CascFile) {
        let mut node = self;
        for segment in folders {
            let hash = path_hash(segment);
            node = node.folders.entry(hash).or_insert_with(|| Self::child(hash));
        }
        node.files.insert(file.hash, file);
    }
}

impl CascFile {
    /// Full path hash the file is stored under
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Selected root entry
    pub fn entry(&self) -> &RootEntry {
        &self.entry
    }

    /// Content key of the selected entry
    pub fn content_key(&self) -> ContentKey {
        self.entry.content_key
    }

    /// File data id of the selected entry
    pub fn file_data_id(&self) -> u32 {
        self.entry.file_data_id
    }

    /// Name used when the name table does not know the file
    pub fn placeholder_name(&self) -> String {
        format!("{:016X}_{}", self.hash, self.entry.file_data_id)
    }

    /// Display name
    pub fn name<'a>(&self, names: &'a NameTable) -> Cow<'a, str> {
        names
            .file_name(self.hash)
            .map_or_else(|| Cow::Owned(self.placeholder_name()), Cow::Borrowed)
    }

    /// Full path, under [`UNKNOWN_FOLDER`] when unnamed
    pub fn path<'a>(&self, names: &'a NameTable) -> Cow<'a, str> {
        names.file_path(self.hash).map_or_else(
            || Cow::Owned(format!("{UNKNOWN_FOLDER}\\{}", self.placeholder_name())),
            Cow::Borrowed,
        )
    }
}

/// Build the tree of entries selected by `locale` and `content`
///
/// Hashes without a matching entry are left out. When several entries
/// match, the first one in file order is used.
pub fn build_tree(
    table: &RootTable,
    locale: LocaleFlags,
    content: ContentFlags,
    names: &NameTable,
) -> CascFolder {
    let mut root = CascFolder::root();
    for (hash, entries) in table.iter() {
        let selected = cascview_formats::root::select_entries(entries, locale, content);
        let Some(entry) = selected.first() else {
            continue;
        };
        let file = CascFile {
            hash,
            entry: **entry,
        };
        match names.file_path(hash) {
            Some(path) => {
                let segments: Vec<&str> = path.split('\\').filter(|s| !s.is_empty()).collect();
                let folders = segments.split_last().map_or(&[][..], |(_, f)| f);
                root.insert(folders, file);
            }
            None => root.insert(&[UNKNOWN_FOLDER], file),
        }
    }
    root
}
