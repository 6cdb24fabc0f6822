//! Root handlers
//!
//! A root handler owns the parsed root table of one game and the tree built
//! from it for the current locale and content selection. The handler for a
//! build is chosen from its product code.

use tracing::{debug, info};

use cascview_formats::CancellationToken;
use cascview_formats::root::{ContentFlags, LocaleFlags, RootEntry, RootTable};

use crate::names::NameTable;
use crate::tree::{CascFolder, build_tree};
use crate::{Result, StorageError};

/// Root handler for a supported game
#[derive(Debug, Clone)]
pub enum RootHandler {
    /// World of Warcraft and its classic variants
    Wow(WowRootHandler),
}

/// World of Warcraft root: path hash or file data id to content variants
#[derive(Debug, Clone)]
pub struct WowRootHandler {
    table: RootTable,
    selection: Option<(LocaleFlags, ContentFlags)>,
    tree: CascFolder,
}

impl WowRootHandler {
    /// Parse a decoded root file
    pub fn parse(data: &[u8], cancel: &CancellationToken) -> Result<Self> {
        let table = RootTable::parse_with(data, cancel)?;
        info!(
            "Root: {} hashes, {} entries ({} without name hash)",
            table.len(),
            table.entry_count(),
            table.nameless_entries()
        );
        Ok(Self::from_table(table))
    }

    /// Wrap an already parsed table
    pub fn from_table(table: RootTable) -> Self {
        Self {
            table,
            selection: None,
            tree: CascFolder::root(),
        }
    }
}

impl RootHandler {
    /// Parse the root file of `product`
    ///
    /// Fails with [`StorageError::UnsupportedFormat`] for products other
    /// than World of Warcraft.
    pub fn parse(product: &str, data: &[u8], cancel: &CancellationToken) -> Result<Self> {
        if product.to_ascii_lowercase().starts_with("wow") {
            Ok(Self::Wow(WowRootHandler::parse(data, cancel)?))
        } else {
            Err(StorageError::UnsupportedFormat(format!(
                "no root handler for product '{product}'"
            )))
        }
    }

    fn inner(&self) -> &WowRootHandler {
        match self {
            Self::Wow(handler) => handler,
        }
    }

    fn inner_mut(&mut self) -> &mut WowRootHandler {
        match self {
            Self::Wow(handler) => handler,
        }
    }

    /// Parsed root table
    pub fn table(&self) -> &RootTable {
        &self.inner().table
    }

    /// Every variant stored under `hash`
    pub fn entries(&self, hash: u64) -> &[RootEntry] {
        self.table().entries(hash)
    }

    /// Every (hash, entry) pair in the table
    pub fn all_entries(&self) -> impl Iterator<Item = (u64, &RootEntry)> {
        self.table()
            .iter()
            .flat_map(|(hash, entries)| entries.iter().map(move |e| (hash, e)))
    }

    /// Variants of `hash` matching the current selection, first is the pick
    ///
    /// Before any selection is made every variant matches.
    pub fn select(&self, hash: u64) -> Vec<&RootEntry> {
        let (locale, content) = self.flags();
        self.table().select(hash, locale, content)
    }

    /// Path hash a file data id is stored under
    pub fn hash_for_file_data_id(&self, file_data_id: u32) -> Option<u64> {
        self.table().hash_for_file_data_id(file_data_id)
    }

    /// Whether `hash` has at least one entry
    pub fn contains(&self, hash: u64) -> bool {
        self.table().contains(hash)
    }

    /// Current locale and content selection
    pub fn flags(&self) -> (LocaleFlags, ContentFlags) {
        self.inner()
            .selection
            .unwrap_or((LocaleFlags::ALL, ContentFlags::NONE))
    }

    /// Select locale and content, rebuilding the tree if they changed
    ///
    /// Returns whether the tree was rebuilt.
    pub fn set_flags(&mut self, locale: LocaleFlags, content: ContentFlags, names: &NameTable) -> bool {
        if self.inner().selection == Some((locale, content)) {
            return false;
        }
        self.inner_mut().selection = Some((locale, content));
        self.build_tree(names);
        true
    }

    /// Rebuild the tree for the current selection, e.g. after new names
    pub fn build_tree(&mut self, names: &NameTable) -> &CascFolder {
        let (locale, content) = self.flags();
        let handler = self.inner_mut();
        handler.tree = build_tree(&handler.table, locale, content, names);
        debug!(
            "Built tree for {} / {}: {} files",
            locale,
            content,
            handler.tree.file_count()
        );
        &handler.tree
    }

    /// Tree for the current selection
    pub fn tree(&self) -> &CascFolder {
        &self.inner().tree
    }

    /// Drop the tree and the selection; the table stays loaded
    pub fn clear(&mut self) {
        let handler = self.inner_mut();
        handler.tree = CascFolder::root();
        handler.selection = None;
    }
}
