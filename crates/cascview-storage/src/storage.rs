//! Storage facade
//!
//! [`CascStorage::open`] runs the whole load sequence on the calling thread:
//!
//! 1. `.build.info`, build config and CDN config
//! 2. local `.idx` files and CDN `.index` files
//! 3. encoding table
//! 4. root table
//! 5. install and download manifests (optional)
//! 6. name tree for the configured locale and content
//!
//! Every table is built into locals and the storage value is only assembled
//! once all of them loaded, so a failed or cancelled open leaves nothing
//! half-populated behind.

use std::fs;
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use cascview_crypto::{ContentKey, EncodingKey, path_hash};
use cascview_formats::CancellationToken;
use cascview_formats::archive::{ArchiveIndex, ArchiveIndexTable};
use cascview_formats::blte::{BlteDecoder, DecodeSummary};
use cascview_formats::config::{BuildConfig, BuildFileRef, BuildInfoFile, CdnConfig};
use cascview_formats::download::{DownloadEntry, DownloadError, DownloadManifest};
use cascview_formats::encoding::{EncodingOptions, EncodingTable};
use cascview_formats::install::{InstallEntry, InstallError, InstallManifest};
use cascview_formats::root::{ContentFlags, LocaleFlags, RootEntry};

use crate::archive::DataFiles;
use crate::cdn::{CdnCache, CdnClient, CdnTransport, ContentKind, HttpTransport};
use crate::config::{MissingFilePolicy, StorageConfig};
use crate::index::LocalIndex;
use crate::listfile::{Listfile, ListfileStats};
use crate::names::NameTable;
use crate::progress::{LoadPhase, NoProgress, Progress};
use crate::root::RootHandler;
use crate::tree::CascFolder;
use crate::{Result, StorageError};

/// Identity of the opened build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Product code
    pub product: String,
    /// Build name from the build config
    pub build_name: Option<String>,
    /// Version string from `.build.info`
    pub version: Option<String>,
    /// Build config key
    pub build_key: String,
    /// CDN config key
    pub cdn_key: String,
}

/// Table sizes of an open storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Keys in the local index
    pub local_index_keys: usize,
    /// Local index files read
    pub local_index_files: usize,
    /// Archives listed in the CDN config
    pub cdn_archives: usize,
    /// Keys in the merged CDN index
    pub cdn_index_keys: usize,
    /// Content keys in the encoding table
    pub encoding_entries: usize,
    /// Content keys that listed more than one encoding key
    pub encoding_lossy: usize,
    /// Distinct hashes in the root table
    pub root_hashes: usize,
    /// Entries in the root table
    pub root_entries: usize,
    /// Files with a known name
    pub named_files: usize,
    /// Files in the current tree
    pub tree_files: usize,
    /// Install manifest entries
    pub install_entries: usize,
    /// Download manifest entries
    pub download_entries: usize,
    /// Open `data.NNN` handles
    pub open_data_files: usize,
}

/// Local `.idx` index and the data files it points into
#[derive(Debug)]
struct LocalStore {
    index: LocalIndex,
    data: DataFiles,
}

/// Everywhere an encoded blob can be read from
#[derive(Debug)]
struct BlobSource {
    local: Option<LocalStore>,
    cdn: Option<CdnClient>,
    archives: Vec<EncodingKey>,
    cdn_index: ArchiveIndexTable,
}

impl BlobSource {
    /// Read an encoded blob: local index first, then the CDN
    fn read(&self, key: &EncodingKey) -> Result<Vec<u8>> {
        if let Some(local) = &self.local {
            match local.index.get(key) {
                Some(entry) => match local.data.read(key, entry) {
                    Ok(data) => return Ok(data),
                    Err(e) => warn!("Local read of {key} failed, trying CDN: {e}"),
                },
                None => debug!("{key} not in local index"),
            }
        }
        self.read_remote(key)
    }

    fn read_remote(&self, key: &EncodingKey) -> Result<Vec<u8>> {
        let Some(cdn) = &self.cdn else {
            return Err(StorageError::NotFound(format!(
                "encoding key {key}: not local and no CDN configured"
            )));
        };

        if let Some(location) = self.cdn_index.get(key) {
            if let Some(archive) = self.archives.get(usize::from(location.archive_index)) {
                match cdn.fetch_range(
                    archive,
                    u64::from(location.offset),
                    u64::from(location.size),
                ) {
                    Ok(data) => return Ok(data),
                    Err(e) => warn!("Archive fetch of {key} from {archive} failed: {e}"),
                }
            }
        }
        cdn.fetch_data(key)
    }

    /// Read and decode, retrying remotely when the local copy fails to decode
    fn decode(&self, key: &EncodingKey, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let raw = self.read(key)?;
        match decode_blob(&raw, cancel) {
            Ok(data) => Ok(data),
            Err(e) if self.local.is_some() && self.cdn.is_some() && !e.is_cancelled() => {
                warn!("Decoding {key} failed, retrying from CDN: {e}");
                let raw = self.read_remote(key)?;
                decode_blob(&raw, cancel)
            }
            Err(e) => Err(e),
        }
    }

    /// Decode into a fresh file at `path`, retrying remotely like `decode`
    fn decode_to_file(&self, key: &EncodingKey, path: &Path) -> Result<DecodeSummary> {
        let raw = self.read(key)?;
        match write_blob(&raw, path) {
            Ok(summary) => Ok(summary),
            Err(e) if self.local.is_some() && self.cdn.is_some() && !e.is_cancelled() => {
                warn!("Decoding {key} to {} failed, retrying from CDN: {e}", path.display());
                let raw = self.read_remote(key)?;
                write_blob(&raw, path)
            }
            Err(e) => Err(e),
        }
    }
}

/// Decode `raw` into `path`, truncating whatever the file held
fn write_blob(raw: &[u8], path: &Path) -> Result<DecodeSummary> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    let summary = BlteDecoder::new(raw.len() as u64).decode_to(&mut Cursor::new(raw), &mut writer)?;
    writer.flush()?;
    Ok(summary)
}

fn decode_blob(raw: &[u8], cancel: &CancellationToken) -> Result<Vec<u8>> {
    let decoded = BlteDecoder::new(raw.len() as u64)
        .with_cancellation(cancel)
        .decode(&mut Cursor::new(raw))?;
    Ok(decoded.data)
}

/// An open CASC storage
#[derive(Debug)]
pub struct CascStorage {
    config: StorageConfig,
    build: BuildSummary,
    source: BlobSource,
    encoding: EncodingTable,
    root: RootHandler,
    install: Option<InstallManifest>,
    download: Option<DownloadManifest>,
    names: NameTable,
}

/// Resolved `.build.info` and config overrides
struct BuildLocation {
    product: String,
    version: Option<String>,
    build_key: String,
    cdn_key: String,
    hosts: Vec<String>,
    cdn_path: Option<String>,
}

impl CascStorage {
    /// Open storage with the HTTP transport and no progress reporting
    pub fn open(config: StorageConfig) -> Result<Self> {
        Self::open_with(config, &NoProgress, &CancellationToken::new())
    }

    /// Open storage with the HTTP transport
    pub fn open_with(
        config: StorageConfig,
        progress: &dyn Progress,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let transport = HttpTransport::new(config.http_timeout)?;
        Self::open_with_transport(config, Box::new(transport), progress, cancel)
    }

    /// Open storage fetching CDN objects through `transport`
    pub fn open_with_transport(
        config: StorageConfig,
        transport: Box<dyn CdnTransport>,
        progress: &dyn Progress,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        progress.phase(LoadPhase::Config);
        let location = Self::locate_build(&config)?;
        info!(
            "Opening {} build {} ({})",
            location.product,
            location.build_key,
            if config.online { "online" } else { "local" }
        );

        let cdn = match (&location.cdn_path, location.hosts.is_empty()) {
            (Some(path), false) => {
                let mut client = CdnClient::new(location.hosts.clone(), path.clone(), transport);
                if let Some(dir) = &config.cache_dir {
                    client = client.with_cache(CdnCache::new(dir));
                }
                Some(client)
            }
            _ if config.online => {
                return Err(StorageError::Config(
                    "online storage needs CDN hosts and a CDN path".to_string(),
                ));
            }
            _ => None,
        };

        let build_config = BuildConfig::parse(&String::from_utf8_lossy(&Self::read_config(
            &config,
            cdn.as_ref(),
            &location.build_key,
        )?));
        let cdn_config = CdnConfig::parse(&String::from_utf8_lossy(&Self::read_config(
            &config,
            cdn.as_ref(),
            &location.cdn_key,
        )?));
        cancel.check()?;

        progress.phase(LoadPhase::Indices);
        let local = if config.online {
            None
        } else {
            let data_dir = config.data_dir().join("data");
            Some(LocalStore {
                index: LocalIndex::load_dir(&data_dir, cancel)?,
                data: DataFiles::new(&data_dir),
            })
        };
        let archives = cdn_config.archives()?;
        let cdn_index = Self::load_cdn_indices(&config, cdn.as_ref(), &archives, progress, cancel)?;
        let source = BlobSource {
            local,
            cdn,
            archives,
            cdn_index,
        };

        progress.phase(LoadPhase::Encoding);
        let encoding_ref = build_config.encoding()?;
        let encoding_key = encoding_ref
            .encoding_key
            .ok_or_else(|| StorageError::Config("build config lacks an encoding key".to_string()))?;
        let encoding_data = source
            .decode(&encoding_key, cancel)
            .map_err(|e| Self::required("encoding", e))?;
        let encoding = EncodingTable::parse_with(
            &encoding_data,
            EncodingOptions {
                verify_pages: config.verify_encoding_pages,
            },
            cancel,
        )
        .map_err(|e| Self::required("encoding", e.into()))?;
        info!(
            "Encoding: {} content keys ({} with extra encoding keys)",
            encoding.len(),
            encoding.lossy_entries()
        );

        progress.phase(LoadPhase::Root);
        let root_key = build_config.root()?;
        let root_entry = encoding.get(&root_key).ok_or_else(|| {
            StorageError::NotFound(format!("root content key {root_key} not in encoding table"))
        })?;
        let root_data = source
            .decode(&root_entry.key, cancel)
            .map_err(|e| Self::required("root", e))?;
        let mut root = RootHandler::parse(&location.product, &root_data, cancel)
            .map_err(|e| Self::required("root", e))?;

        progress.phase(LoadPhase::Manifests);
        let install = if config.load_install {
            match Self::load_manifest("install", build_config.install()?, &encoding, &source, cancel)?
                .map(|data| InstallManifest::parse_with(&data, cancel))
            {
                Some(Ok(manifest)) => Some(manifest),
                Some(Err(InstallError::Cancelled(_))) => return Err(StorageError::Cancelled),
                Some(Err(e)) => {
                    warn!("Skipping install manifest: {e}");
                    None
                }
                None => None,
            }
        } else {
            None
        };
        let download = if config.load_download {
            match Self::load_manifest("download", build_config.download()?, &encoding, &source, cancel)?
                .map(|data| DownloadManifest::parse_with(&data, cancel))
            {
                Some(Ok(manifest)) => Some(manifest),
                Some(Err(DownloadError::Cancelled(_))) => return Err(StorageError::Cancelled),
                Some(Err(e)) => {
                    warn!("Skipping download manifest: {e}");
                    None
                }
                None => None,
            }
        } else {
            None
        };

        progress.phase(LoadPhase::Tree);
        let names = NameTable::new();
        root.set_flags(config.locale_flags(), config.content_flags(), &names);
        progress.report(100, Some("Done"));

        let build = BuildSummary {
            product: location.product,
            build_name: build_config.build_name().map(String::from),
            version: location.version,
            build_key: location.build_key,
            cdn_key: location.cdn_key,
        };

        Ok(Self {
            config,
            build,
            source,
            encoding,
            root,
            install,
            download,
            names,
        })
    }

    fn required(file: &str, error: StorageError) -> StorageError {
        if error.is_cancelled() || error.is_not_found() {
            error
        } else {
            StorageError::invalid_format(file, error)
        }
    }

    fn locate_build(config: &StorageConfig) -> Result<BuildLocation> {
        let info_path = config.base_path.join(".build.info");
        let info = if info_path.exists() {
            Some(BuildInfoFile::parse(&fs::read_to_string(&info_path)?)?)
        } else if config.online {
            None
        } else {
            return Err(StorageError::NotFound(format!(
                "{} does not exist",
                info_path.display()
            )));
        };

        let entry = info.as_ref().and_then(|info| {
            config
                .product
                .as_deref()
                .and_then(|p| info.active_entry_for(p))
                .or_else(|| info.active_entry())
        });
        if info.is_some() && entry.is_none() {
            return Err(StorageError::invalid_format(".build.info", "no active build"));
        }

        let pick = |own: &Option<String>, from_info: Option<&str>, what: &str| {
            own.clone()
                .or_else(|| from_info.map(String::from))
                .ok_or_else(|| StorageError::Config(format!("no {what} configured")))
        };
        let build_key = pick(&config.build_key, entry.and_then(|e| e.build_key()), "build key")?;
        let cdn_key = pick(&config.cdn_key, entry.and_then(|e| e.cdn_key()), "CDN key")?;

        let hosts = if config.cdn_hosts.is_empty() {
            entry
                .map(|e| e.cdn_hosts().into_iter().map(String::from).collect())
                .unwrap_or_default()
        } else {
            config.cdn_hosts.clone()
        };

        Ok(BuildLocation {
            product: config
                .product
                .clone()
                .or_else(|| entry.and_then(|e| e.product()).map(String::from))
                .unwrap_or_else(|| "wow".to_string()),
            version: entry.and_then(|e| e.version()).map(String::from),
            build_key,
            cdn_key,
            hosts,
            cdn_path: config
                .cdn_path
                .clone()
                .or_else(|| entry.and_then(|e| e.cdn_path()).map(String::from)),
        })
    }

    /// Config file from `Data/config` or, failing that, the CDN
    fn read_config(config: &StorageConfig, cdn: Option<&CdnClient>, key: &str) -> Result<Vec<u8>> {
        let relative = CdnClient::relative_path(ContentKind::Config, key, "")?;
        if !config.online {
            let path = config.data_dir().join(relative);
            match fs::read(&path) {
                Ok(data) => return Ok(data),
                Err(e) => debug!("{} unavailable: {e}", path.display()),
            }
        }
        match cdn {
            Some(cdn) => cdn.fetch_config(key),
            None => Err(StorageError::NotFound(format!("config {key}"))),
        }
    }

    fn load_cdn_indices(
        config: &StorageConfig,
        cdn: Option<&CdnClient>,
        archives: &[EncodingKey],
        progress: &dyn Progress,
        cancel: &CancellationToken,
    ) -> Result<ArchiveIndexTable> {
        let mut table = ArchiveIndexTable::new();
        let indices_dir = config.data_dir().join("indices");
        let span = LoadPhase::Encoding.start_percent() - LoadPhase::Indices.start_percent();

        for (i, archive) in archives.iter().enumerate() {
            cancel.check()?;
            let local_path = indices_dir.join(format!("{}.index", archive.to_hex()));
            let data = if !config.online && local_path.exists() {
                fs::read(&local_path)?
            } else if let Some(cdn) = cdn {
                match cdn.fetch_index(archive) {
                    Ok(data) => data,
                    Err(e) if !config.online => {
                        warn!("Skipping archive index {archive}: {e}");
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            } else {
                debug!("No index for archive {archive}");
                continue;
            };

            let archive_index = u16::try_from(i)
                .map_err(|_| StorageError::Config(format!("too many archives: {}", archives.len())))?;
            let index = ArchiveIndex::parse_with(&data, archive_index, cancel)
                .map_err(|e| Self::required(&format!("{archive}.index"), e.into()))?;
            table.merge(index);

            let done = (i + 1) * usize::from(span) / archives.len();
            progress.report(LoadPhase::Indices.start_percent() + done as u8, None);
        }

        info!(
            "CDN indices: {} keys from {} archives",
            table.len(),
            archives.len()
        );
        Ok(table)
    }

    fn load_manifest(
        name: &str,
        file: Option<BuildFileRef>,
        encoding: &EncodingTable,
        source: &BlobSource,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>> {
        let Some(file) = file else {
            debug!("Build has no {name} manifest");
            return Ok(None);
        };
        let key = file
            .encoding_key
            .or_else(|| encoding.get(&file.content_key).map(|e| e.key));
        let Some(key) = key else {
            warn!("{name} manifest {} not in encoding table", file.content_key);
            return Ok(None);
        };
        match source.decode(&key, cancel) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!("Skipping {name} manifest: {e}");
                Ok(None)
            }
        }
    }

    fn apply_policy(&self, result: Result<Vec<u8>>) -> Result<Vec<u8>> {
        match result {
            Err(StorageError::NotFound(what)) if self.config.missing_files == MissingFilePolicy::Empty => {
                debug!("Returning empty data for missing {what}");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    fn entry_for_hash(&self, hash: u64) -> Result<&RootEntry> {
        self.root
            .select(hash)
            .first()
            .copied()
            .ok_or_else(|| StorageError::NotFound(format!("no root entry for hash {hash:016X}")))
    }

    fn encoding_key_for(&self, content_key: &ContentKey) -> Result<EncodingKey> {
        self.encoding
            .get(content_key)
            .map(|entry| entry.key)
            .ok_or_else(|| {
                StorageError::NotFound(format!("content key {content_key} not in encoding table"))
            })
    }

    fn hash_for_name(&self, name: &str) -> u64 {
        self.names.resolve(path_hash(name))
    }

    fn read_content_key(&self, content_key: &ContentKey) -> Result<Vec<u8>> {
        let key = self.encoding_key_for(content_key)?;
        self.source.decode(&key, &CancellationToken::new())
    }

    /// Decoded file at `name`
    pub fn open_by_name(&self, name: &str) -> Result<Vec<u8>> {
        self.open_by_hash(self.hash_for_name(name))
    }

    /// Decoded file stored under a path hash
    pub fn open_by_hash(&self, hash: u64) -> Result<Vec<u8>> {
        let result = self
            .entry_for_hash(hash)
            .and_then(|entry| self.read_content_key(&entry.content_key));
        self.apply_policy(result)
    }

    /// Decoded file with a file data id
    pub fn open_by_file_data_id(&self, file_data_id: u32) -> Result<Vec<u8>> {
        match self.root.hash_for_file_data_id(file_data_id) {
            Some(hash) => self.open_by_hash(hash),
            None => self.apply_policy(Err(StorageError::NotFound(format!(
                "file data id {file_data_id}"
            )))),
        }
    }

    /// Decoded file with a content key
    pub fn open_by_content_key(&self, content_key: &ContentKey) -> Result<Vec<u8>> {
        self.apply_policy(self.read_content_key(content_key))
    }

    /// Decoded blob with an encoding key
    pub fn open_by_encoding_key(&self, encoding_key: &EncodingKey) -> Result<Vec<u8>> {
        self.apply_policy(self.source.decode(encoding_key, &CancellationToken::new()))
    }

    /// Decode a file straight to `dest`, returning the bytes written
    ///
    /// Output goes to `<dest>.part` first and is renamed once the whole file
    /// decoded, so a failure never leaves a partial `dest`.
    pub fn extract_to(&self, content_key: &ContentKey, dest: &Path) -> Result<u64> {
        let result = self
            .encoding_key_for(content_key)
            .and_then(|key| self.extract_key(&key, dest));
        self.apply_extract_policy(result, dest)
    }

    /// Decode the file at `name` to `dest`
    pub fn extract_by_name(&self, name: &str, dest: &Path) -> Result<u64> {
        let result = self
            .entry_for_hash(self.hash_for_name(name))
            .map(|entry| entry.content_key)
            .and_then(|content_key| self.encoding_key_for(&content_key))
            .and_then(|key| self.extract_key(&key, dest));
        self.apply_extract_policy(result, dest)
    }

    fn extract_key(&self, key: &EncodingKey, dest: &Path) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let partial = partial_path(dest);
        match self.source.decode_to_file(key, &partial) {
            Ok(summary) => {
                fs::rename(&partial, dest)?;
                debug!(
                    "Extracted {} bytes in {} chunks to {}",
                    summary.bytes_written,
                    summary.chunks,
                    dest.display()
                );
                Ok(summary.bytes_written)
            }
            Err(e) => {
                if let Err(remove) = fs::remove_file(&partial)
                    && remove.kind() != std::io::ErrorKind::NotFound
                {
                    warn!("Failed to remove {}: {remove}", partial.display());
                }
                Err(e)
            }
        }
    }

    fn apply_extract_policy(&self, result: Result<u64>, dest: &Path) -> Result<u64> {
        match result {
            Err(StorageError::NotFound(what)) if self.config.missing_files == MissingFilePolicy::Empty => {
                debug!("Writing empty {} for missing {what}", dest.display());
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(dest, [])?;
                Ok(0)
            }
            other => other,
        }
    }

    /// Whether the root table has an entry for `name` under the current flags
    pub fn file_exists(&self, name: &str) -> bool {
        self.file_exists_by_hash(self.hash_for_name(name))
    }

    /// Whether the root table has an entry for `hash` under the current flags
    pub fn file_exists_by_hash(&self, hash: u64) -> bool {
        !self.root.select(hash).is_empty()
    }

    /// Whether the root table has an entry for `file_data_id`
    pub fn file_exists_by_file_data_id(&self, file_data_id: u32) -> bool {
        self.root
            .hash_for_file_data_id(file_data_id)
            .is_some_and(|hash| self.file_exists_by_hash(hash))
    }

    /// Change locale and content selection; returns whether the tree was rebuilt
    pub fn set_flags(&mut self, locale: LocaleFlags, content: ContentFlags) -> bool {
        self.root.set_flags(locale, content, &self.names)
    }

    /// Name files from a listfile and rebuild the tree
    pub fn load_listfile(&mut self, path: &Path) -> Result<ListfileStats> {
        let listfile = Listfile::load(path)?;
        let stats = listfile.assign_names(&self.root, &mut self.names);
        self.root.build_tree(&self.names);
        Ok(stats)
    }

    /// Tree for the current selection
    pub fn tree(&self) -> &CascFolder {
        self.root.tree()
    }

    /// Known file and folder names
    pub fn names(&self) -> &NameTable {
        &self.names
    }

    /// Root handler
    pub fn root(&self) -> &RootHandler {
        &self.root
    }

    /// Encoding table
    pub fn encoding(&self) -> &EncodingTable {
        &self.encoding
    }

    /// Install manifest, if loaded
    pub fn install_manifest(&self) -> Option<&InstallManifest> {
        self.install.as_ref()
    }

    /// Download manifest, if loaded
    pub fn download_manifest(&self) -> Option<&DownloadManifest> {
        self.download.as_ref()
    }

    /// Install manifest entries carrying `tag`
    pub fn install_entries(&self, tag: &str) -> Vec<&InstallEntry> {
        self.install
            .as_ref()
            .map(|m| m.entries_for_tag(tag))
            .unwrap_or_default()
    }

    /// Download manifest entries carrying `tag`
    pub fn download_entries(&self, tag: &str) -> Vec<&DownloadEntry> {
        self.download
            .as_ref()
            .map(|m| m.entries_for_tag(tag))
            .unwrap_or_default()
    }

    /// Identity of the opened build
    pub fn build(&self) -> &BuildSummary {
        &self.build
    }

    /// Configuration the storage was opened with
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Table sizes
    pub fn stats(&self) -> StorageStats {
        let local = self.source.local.as_ref();
        StorageStats {
            local_index_keys: local.map_or(0, |l| l.index.len()),
            local_index_files: local.map_or(0, |l| l.index.file_count()),
            cdn_archives: self.source.archives.len(),
            cdn_index_keys: self.source.cdn_index.len(),
            encoding_entries: self.encoding.len(),
            encoding_lossy: self.encoding.lossy_entries(),
            root_hashes: self.root.table().len(),
            root_entries: self.root.table().entry_count(),
            named_files: self.names.len(),
            tree_files: self.tree().file_count(),
            install_entries: self.install.as_ref().map_or(0, |m| m.entries.len()),
            download_entries: self.download.as_ref().map_or(0, |m| m.entries.len()),
            open_data_files: local.map_or(0, |l| l.data.open_handles()),
        }
    }

    /// Forget names, drop the tree and release file handles
    ///
    /// The tables stay loaded; [`CascStorage::set_flags`] builds a new tree.
    pub fn clear(&mut self) {
        self.names.clear();
        self.root.clear();
        if let Some(local) = &self.source.local {
            local.data.close();
        }
    }

    /// Release every resource
    pub fn close(mut self) {
        self.clear();
        info!("Closed storage for {}", self.build.product);
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}
