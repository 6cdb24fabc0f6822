#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Integration tests for opening storages built on disk
//!
//! Every test writes a small but complete installation into a temporary
//! directory: `.build.info`, build and CDN configs, a local index with its
//! `data.000` archive, an encoding table and a legacy root. Blobs missing
//! from the local archive are served by a stub CDN transport.

use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use cascview_crypto::{ContentKey, EncodingKey, path_hash};
use cascview_formats::CancellationToken;
use cascview_formats::root::{ContentFlags, LocaleFlags};
use cascview_storage::archive::LOCAL_HEADER_SIZE;
use cascview_storage::cdn::{CdnClient, ContentKind};
use cascview_storage::{
    CascStorage, CdnResponse, CdnTransport, MissingFilePolicy, NoProgress, Result, StorageConfig,
    StorageError,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const BUILD_KEY: &str = "0123456789abcdef0123456789abcdef";
const CDN_KEY: &str = "fedcba9876543210fedcba9876543210";
const HOST: &str = "cdn.test";
const CDN_PATH: &str = "tpr/wow";

// --- Fixture builders ---

#[derive(Default, Clone)]
struct StubTransport {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubTransport {
    fn serve(&self, relative: &str, data: Vec<u8>) {
        self.objects
            .lock()
            .insert(format!("http://{HOST}/{CDN_PATH}/{relative}"), data);
    }

    fn forget(&self, relative: &str) {
        self.objects
            .lock()
            .remove(&format!("http://{HOST}/{CDN_PATH}/{relative}"));
    }

    fn requests_for(&self, relative: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|url| url.ends_with(relative))
            .count()
    }
}

impl CdnTransport for StubTransport {
    fn fetch(&self, url: &str, range: Option<Range<u64>>) -> Result<CdnResponse> {
        self.requests.lock().push(url.to_string());
        let objects = self.objects.lock();
        let data = objects
            .get(url)
            .ok_or_else(|| StorageError::NotFound(url.to_string()))?;
        let data = match range {
            Some(r) => data[r.start as usize..r.end as usize].to_vec(),
            None => data.clone(),
        };
        Ok(CdnResponse { data, etag: None })
    }
}

/// Single-chunk BLTE frame holding `data` uncompressed
fn blte(data: &[u8]) -> Vec<u8> {
    let mut out = b"BLTE".to_vec();
    out.extend_from_slice(&0u32.to_be_bytes());
    out.push(b'N');
    out.extend_from_slice(data);
    out
}

struct Blob {
    ckey: ContentKey,
    ekey: EncodingKey,
    size: u64,
    encoded: Vec<u8>,
}

impl Blob {
    fn new(data: &[u8]) -> Self {
        let encoded = blte(data);
        Self {
            ckey: ContentKey::from_data(data),
            ekey: EncodingKey::from_data(&encoded),
            size: data.len() as u64,
            encoded,
        }
    }

    fn data_path(&self) -> String {
        CdnClient::relative_path(ContentKind::Data, &self.ekey.to_hex(), "").unwrap()
    }
}

fn encoding_file(blobs: &[&Blob]) -> Vec<u8> {
    let mut page = Vec::new();
    for blob in blobs {
        page.push(1);
        page.extend_from_slice(&blob.size.to_be_bytes()[3..]);
        page.extend_from_slice(blob.ckey.as_bytes());
        page.extend_from_slice(blob.ekey.as_bytes());
    }
    page.resize(1024, 0);

    let mut data = b"EN".to_vec();
    data.extend_from_slice(&[1, 16, 16]);
    data.extend_from_slice(&1u16.to_be_bytes());
    data.extend_from_slice(&1u16.to_be_bytes());
    data.extend_from_slice(&1u32.to_be_bytes());
    data.extend_from_slice(&0u32.to_be_bytes());
    data.push(0);
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(blobs[0].ckey.as_bytes());
    data.extend_from_slice(ContentKey::from_data(&page).as_bytes());
    data.extend_from_slice(&page);
    data
}

/// Legacy root with one en-US block; file data ids start at 100
fn root_file(files: &[(&str, &Blob)]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&(files.len() as u32).to_le_bytes());
    data.extend_from_slice(&ContentFlags::NONE.0.to_le_bytes());
    data.extend_from_slice(&LocaleFlags::EN_US.0.to_le_bytes());
    for i in 0..files.len() {
        let delta: i32 = if i == 0 { 100 } else { 0 };
        data.extend_from_slice(&delta.to_le_bytes());
    }
    for (name, blob) in files {
        data.extend_from_slice(blob.ckey.as_bytes());
        data.extend_from_slice(&path_hash(name).to_le_bytes());
    }
    data
}

/// 30-byte `data.NNN` header: reversed key, BE size, flags and checksums
fn local_header(key: &EncodingKey, size_with_header: u32) -> Vec<u8> {
    let mut data: Vec<u8> = key.as_bytes().iter().rev().copied().collect();
    data.extend_from_slice(&size_with_header.to_be_bytes());
    data.extend_from_slice(&[0; 10]);
    data
}

fn idx_record(key: &EncodingKey, offset: u32, size: u32) -> Vec<u8> {
    let mut data = key.as_bytes()[..9].to_vec();
    data.push(0);
    data.extend_from_slice(&(offset & 0x3FFF_FFFF).to_be_bytes());
    data.extend_from_slice(&size.to_le_bytes());
    data
}

fn idx_file(records: &[Vec<u8>]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&16u32.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&7u16.to_le_bytes());
    data.extend_from_slice(&[0, 0, 4, 5, 9, 30]);
    data.extend_from_slice(&0x4000_0000u64.to_le_bytes());
    data.resize(32, 0);
    let body = records.concat();
    data.extend_from_slice(&(body.len() as u32).to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&body);
    data
}

fn write(path: &Path, data: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, data).unwrap();
}

/// A file of the installation and whether `data.000` holds it
struct FileSpec {
    name: &'static str,
    data: &'static [u8],
    local: bool,
}

const fn local(name: &'static str, data: &'static [u8]) -> FileSpec {
    FileSpec {
        name,
        data,
        local: true,
    }
}

const fn remote(name: &'static str, data: &'static [u8]) -> FileSpec {
    FileSpec {
        name,
        data,
        local: false,
    }
}

struct Installation {
    dir: TempDir,
    transport: StubTransport,
    blobs: HashMap<&'static str, Blob>,
}

impl Installation {
    /// Write an installation; every blob is also served by the stub CDN
    fn build(files: &[FileSpec]) -> Self {
        let dir = TempDir::new().unwrap();
        let transport = StubTransport::default();

        let blobs: HashMap<&'static str, Blob> =
            files.iter().map(|f| (f.name, Blob::new(f.data))).collect();
        let named: Vec<(&str, &Blob)> = files.iter().map(|f| (f.name, &blobs[f.name])).collect();
        let root = Blob::new(&root_file(&named));

        let mut encoded: Vec<&Blob> = vec![&root];
        encoded.extend(named.iter().map(|(_, b)| *b));
        let encoding = Blob::new(&encoding_file(&encoded));

        let mut local_blobs = vec![&encoding, &root];
        local_blobs.extend(files.iter().filter(|f| f.local).map(|f| &blobs[f.name]));

        let mut archive = Vec::new();
        let mut records = Vec::new();
        for blob in &local_blobs {
            let size = (LOCAL_HEADER_SIZE + blob.encoded.len()) as u32;
            records.push(idx_record(&blob.ekey, archive.len() as u32, size));
            archive.extend_from_slice(&local_header(&blob.ekey, size));
            archive.extend_from_slice(&blob.encoded);
        }
        let data_dir = dir.path().join("Data/data");
        write(&data_dir.join("data.000"), &archive);
        write(&data_dir.join("0000000001.idx"), &idx_file(&records));

        let build_config = format!(
            "# Build Configuration\nroot = {}\nencoding = {} {}\nbuild-name = WOW-1234patch1.0.0\n",
            root.ckey.to_hex(),
            encoding.ckey.to_hex(),
            encoding.ekey.to_hex()
        );
        let cdn_config = "# CDN Configuration\narchive-group = 00000000000000000000000000000000\n";
        for (key, text) in [(BUILD_KEY, build_config.as_str()), (CDN_KEY, cdn_config)] {
            let relative = CdnClient::relative_path(ContentKind::Config, key, "").unwrap();
            write(&dir.path().join("Data").join(&relative), text.as_bytes());
            transport.serve(&relative, text.as_bytes().to_vec());
        }

        write(
            &dir.path().join(".build.info"),
            format!(
                "Branch!STRING:0|Active!DEC:1|Build Key!HEX:16|CDN Key!HEX:16|CDN Path!STRING:0|CDN Hosts!STRING:0|Version!STRING:0|Product!STRING:0\n\
                 us|1|{BUILD_KEY}|{CDN_KEY}|{CDN_PATH}|{HOST}|1.0.0.1234|wow\n"
            )
            .as_bytes(),
        );

        for blob in [&encoding, &root].into_iter().chain(blobs.values()) {
            transport.serve(&blob.data_path(), blob.encoded.clone());
        }

        Self {
            dir,
            transport,
            blobs,
        }
    }

    fn config(&self) -> StorageConfig {
        StorageConfig::new(self.dir.path())
    }

    fn open(&self, config: StorageConfig) -> Result<CascStorage> {
        CascStorage::open_with_transport(
            config,
            Box::new(self.transport.clone()),
            &NoProgress,
            &CancellationToken::new(),
        )
    }
}

fn sample() -> Installation {
    Installation::build(&[
        local("a\\b.txt", b"hello"),
        local("Interface\\Icons\\icon.blp", b"icon bytes"),
        remote("Sound\\music.ogg", b"streamed from the CDN"),
    ])
}

// --- Opening and reading ---

#[test]
fn test_open_local_and_read_by_name() {
    let install = sample();
    let storage = install.open(install.config()).unwrap();

    assert_eq!(storage.open_by_name("a\\b.txt").unwrap(), b"hello");
    assert_eq!(storage.open_by_name("A/B.TXT").unwrap(), b"hello");
    assert_eq!(
        storage.open_by_name("interface/icons/ICON.BLP").unwrap(),
        b"icon bytes"
    );

    let build = storage.build();
    assert_eq!(build.product, "wow");
    assert_eq!(build.build_key, BUILD_KEY);
    assert_eq!(build.version.as_deref(), Some("1.0.0.1234"));
    assert_eq!(build.build_name.as_deref(), Some("WOW-1234patch1.0.0"));

    // Everything came from disk
    assert!(install.transport.requests.lock().is_empty());
}

#[test]
fn test_read_by_file_data_id_and_keys() {
    let install = sample();
    let storage = install.open(install.config()).unwrap();

    assert_eq!(storage.open_by_file_data_id(100).unwrap(), b"hello");
    assert_eq!(storage.open_by_file_data_id(101).unwrap(), b"icon bytes");

    let blob = &install.blobs["a\\b.txt"];
    assert_eq!(storage.open_by_content_key(&blob.ckey).unwrap(), b"hello");
    assert_eq!(storage.open_by_encoding_key(&blob.ekey).unwrap(), b"hello");
}

#[test]
fn test_stats_after_open() {
    let install = sample();
    let storage = install.open(install.config()).unwrap();
    let stats = storage.stats();

    assert_eq!(stats.local_index_keys, 4);
    assert_eq!(stats.local_index_files, 1);
    assert_eq!(stats.encoding_entries, 4);
    assert_eq!(stats.root_hashes, 3);
    assert_eq!(stats.root_entries, 3);
    assert_eq!(stats.tree_files, 3);
    assert_eq!(stats.named_files, 0);
    assert_eq!(stats.cdn_archives, 0);
}

#[test]
fn test_falls_back_to_cdn_for_missing_local_blob() {
    let install = sample();
    let storage = install.open(install.config()).unwrap();

    let data = storage.open_by_name("Sound\\music.ogg").unwrap();
    assert_eq!(data, b"streamed from the CDN");

    let relative = install.blobs["Sound\\music.ogg"].data_path();
    assert_eq!(install.transport.requests_for(&relative), 1);
}

/// Flip a byte of the local copy of `name`, `offset` bytes from its BLTE frame
fn corrupt_local(install: &Installation, name: &str, offset: isize) {
    let archive = install.dir.path().join("Data/data/data.000");
    let mut bytes = fs::read(&archive).unwrap();
    let blob = &install.blobs[name];
    let pos = bytes
        .windows(blob.encoded.len())
        .position(|w| w == blob.encoded.as_slice())
        .unwrap();
    let pos = pos.checked_add_signed(offset).unwrap();
    bytes[pos] ^= 0xFF;
    fs::write(&archive, bytes).unwrap();
}

#[test]
fn test_falls_back_to_cdn_for_corrupt_local_blob() {
    let install = sample();
    // BLTE magic
    corrupt_local(&install, "a\\b.txt", 0);

    let storage = install.open(install.config()).unwrap();
    let hello = &install.blobs["a\\b.txt"];
    assert_eq!(storage.open_by_name("a\\b.txt").unwrap(), b"hello");
    assert_eq!(install.transport.requests_for(&hello.data_path()), 1);
}

#[test]
fn test_falls_back_to_cdn_for_mismatched_local_header() {
    let install = sample();
    // First byte of the reversed key is the last byte of the encoding key,
    // outside the 9 bytes the index matches on
    corrupt_local(&install, "a\\b.txt", -(LOCAL_HEADER_SIZE as isize));

    let storage = install.open(install.config()).unwrap();
    let hello = &install.blobs["a\\b.txt"];
    assert_eq!(storage.open_by_name("a\\b.txt").unwrap(), b"hello");
    assert_eq!(install.transport.requests_for(&hello.data_path()), 1);
}

#[test]
fn test_extract_corrupt_local_blob_via_cdn() {
    let install = sample();
    corrupt_local(&install, "a\\b.txt", 0);

    let storage = install.open(install.config()).unwrap();
    let out = TempDir::new().unwrap();
    let dest = out.path().join("b.txt");

    assert_eq!(storage.extract_by_name("a\\b.txt", &dest).unwrap(), 5);
    assert_eq!(fs::read(&dest).unwrap(), b"hello");
    assert!(!out.path().join("b.txt.part").exists());
    let hello = &install.blobs["a\\b.txt"];
    assert_eq!(install.transport.requests_for(&hello.data_path()), 1);
}

#[test]
fn test_open_online() {
    let install = sample();
    let config = StorageConfig::online("wow")
        .with_path(install.dir.path().join("nowhere"))
        .with_cdn(vec![HOST.to_string()], CDN_PATH)
        .with_build(BUILD_KEY, CDN_KEY);
    let storage = install.open(config).unwrap();

    assert_eq!(storage.open_by_name("a\\b.txt").unwrap(), b"hello");
    assert_eq!(storage.stats().local_index_keys, 0);
    assert!(!install.transport.requests.lock().is_empty());
}

#[test]
fn test_online_without_hosts_is_config_error() {
    let install = sample();
    let config = StorageConfig::online("wow").with_build(BUILD_KEY, CDN_KEY);
    let err = CascStorage::open_with_transport(
        config.with_path(install.dir.path().join("nowhere")),
        Box::new(install.transport.clone()),
        &NoProgress,
        &CancellationToken::new(),
    )
    .unwrap_err();
    assert!(matches!(err, StorageError::Config(_)), "{err}");
}

#[test]
fn test_missing_build_info() {
    let dir = TempDir::new().unwrap();
    let err = CascStorage::open_with_transport(
        StorageConfig::new(dir.path()),
        Box::new(StubTransport::default()),
        &NoProgress,
        &CancellationToken::new(),
    )
    .unwrap_err();
    assert!(err.is_not_found(), "{err}");
}

// --- Missing files ---

#[test]
fn test_missing_file_errors_by_default() {
    let install = sample();
    let storage = install.open(install.config()).unwrap();

    let err = storage.open_by_name("does\\not\\exist.txt").unwrap_err();
    assert!(err.is_not_found(), "{err}");
    assert!(storage.open_by_file_data_id(9999).unwrap_err().is_not_found());
    assert!(!storage.file_exists("does\\not\\exist.txt"));
}

#[test]
fn test_missing_file_policy_empty() {
    let install = sample();
    let config = install.config().with_missing_files(MissingFilePolicy::Empty);
    let storage = install.open(config).unwrap();

    assert!(storage.open_by_name("does\\not\\exist.txt").unwrap().is_empty());
    assert!(storage.open_by_file_data_id(9999).unwrap().is_empty());
    assert!(
        storage
            .open_by_content_key(&ContentKey::from_data(b"unknown"))
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_file_exists() {
    let install = sample();
    let storage = install.open(install.config()).unwrap();

    assert!(storage.file_exists("a\\b.txt"));
    assert!(storage.file_exists_by_hash(path_hash("Sound\\music.ogg")));
    assert!(storage.file_exists_by_file_data_id(101));
    assert!(!storage.file_exists_by_file_data_id(5));
}

// --- Extraction ---

#[test]
fn test_extract_to_creates_parents() {
    let install = sample();
    let storage = install.open(install.config()).unwrap();
    let out = TempDir::new().unwrap();
    let dest = out.path().join("nested/dir/b.txt");

    let written = storage.extract_by_name("a\\b.txt", &dest).unwrap();
    assert_eq!(written, 5);
    assert_eq!(fs::read(&dest).unwrap(), b"hello");
    assert!(!out.path().join("nested/dir/b.txt.part").exists());
}

#[test]
fn test_extract_missing_with_empty_policy() {
    let install = sample();
    let config = install.config().with_missing_files(MissingFilePolicy::Empty);
    let storage = install.open(config).unwrap();
    let out = TempDir::new().unwrap();
    let dest = out.path().join("missing.bin");

    let written = storage
        .extract_to(&ContentKey::from_data(b"unknown"), &dest)
        .unwrap();
    assert_eq!(written, 0);
    assert!(fs::read(&dest).unwrap().is_empty());
}

#[test]
fn test_extract_unknown_name_with_empty_policy() {
    let install = sample();
    let config = install.config().with_missing_files(MissingFilePolicy::Empty);
    let storage = install.open(config).unwrap();
    let out = TempDir::new().unwrap();
    let dest = out.path().join("nested/exist.txt");

    assert!(storage.open_by_name("does\\not\\exist.txt").unwrap().is_empty());
    let written = storage
        .extract_by_name("does\\not\\exist.txt", &dest)
        .unwrap();
    assert_eq!(written, 0);
    assert!(fs::read(&dest).unwrap().is_empty());
}

#[test]
fn test_extract_blob_missing_everywhere() {
    let install = sample();
    install
        .transport
        .forget(&install.blobs["Sound\\music.ogg"].data_path());
    let out = TempDir::new().unwrap();
    let dest = out.path().join("music.ogg");

    let storage = install.open(install.config()).unwrap();
    let err = storage.extract_by_name("Sound\\music.ogg", &dest).unwrap_err();
    assert!(err.is_not_found(), "{err}");
    assert!(!dest.exists());
    assert!(!out.path().join("music.ogg.part").exists());

    let config = install.config().with_missing_files(MissingFilePolicy::Empty);
    let storage = install.open(config).unwrap();
    assert!(storage.open_by_name("Sound\\music.ogg").unwrap().is_empty());
    assert_eq!(storage.extract_by_name("Sound\\music.ogg", &dest).unwrap(), 0);
    assert!(fs::read(&dest).unwrap().is_empty());
}

// --- CDN cache ---

#[test]
fn test_cache_serves_second_read() {
    let install = sample();
    let cache = TempDir::new().unwrap();
    let storage = install
        .open(install.config().with_cache_dir(cache.path()))
        .unwrap();
    let relative = install.blobs["Sound\\music.ogg"].data_path();

    storage.open_by_name("Sound\\music.ogg").unwrap();
    storage.open_by_name("Sound\\music.ogg").unwrap();
    assert_eq!(install.transport.requests_for(&relative), 1);
    assert!(cache.path().join(&relative).exists());
}

#[test]
fn test_cache_size_mismatch_refetches() {
    let install = sample();
    let cache = TempDir::new().unwrap();
    let storage = install
        .open(install.config().with_cache_dir(cache.path()))
        .unwrap();
    let relative = install.blobs["Sound\\music.ogg"].data_path();

    storage.open_by_name("Sound\\music.ogg").unwrap();
    fs::write(cache.path().join(&relative), b"short").unwrap();

    let data = storage.open_by_name("Sound\\music.ogg").unwrap();
    assert_eq!(data, b"streamed from the CDN");
    assert_eq!(install.transport.requests_for(&relative), 2);
}

// --- Names and selection ---

#[test]
fn test_listfile_names_tree() {
    let install = sample();
    let mut storage = install.open(install.config()).unwrap();
    assert!(storage.tree().find_folder("unknown").is_some());

    let listfile = install.dir.path().join("listfile.csv");
    fs::write(
        &listfile,
        "100;a/b.txt\nInterface/Icons/icon.blp\nSound\\music.ogg\nnot/in/root.txt\n",
    )
    .unwrap();
    let stats = storage.load_listfile(&listfile).unwrap();
    assert_eq!(stats.named, 3);
    assert_eq!(stats.unknown, 1);

    let tree = storage.tree();
    assert!(tree.find_folder("unknown").is_none());
    let icons = tree.find_folder("interface/icons").unwrap();
    assert_eq!(icons.file_count(), 1);
    let file = icons.files().next().unwrap();
    assert_eq!(file.name(storage.names()), "icon.blp");
    assert_eq!(file.file_data_id(), 101);
    assert_eq!(tree.file_count(), 3);
}

#[test]
fn test_set_flags_changes_selection() {
    let install = sample();
    let mut storage = install.open(install.config()).unwrap();
    assert!(storage.file_exists("a\\b.txt"));

    assert!(storage.set_flags(LocaleFlags::DE_DE, ContentFlags::NONE));
    assert!(!storage.file_exists("a\\b.txt"));
    assert_eq!(storage.tree().file_count(), 0);

    assert!(!storage.set_flags(LocaleFlags::DE_DE, ContentFlags::NONE));
    assert!(storage.set_flags(LocaleFlags::EN_US, ContentFlags::NONE));
    assert_eq!(storage.tree().file_count(), 3);
}

// --- Progress and cancellation ---

#[test]
fn test_progress_reaches_completion() {
    let install = sample();
    let seen = Mutex::new(Vec::new());
    let progress = |percent: u8, _status: Option<&str>| seen.lock().push(percent);

    CascStorage::open_with_transport(
        install.config(),
        Box::new(install.transport.clone()),
        &progress,
        &CancellationToken::new(),
    )
    .unwrap();

    let seen = seen.into_inner();
    assert_eq!(seen.first(), Some(&0));
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
}

#[test]
fn test_cancelled_open() {
    let install = sample();
    let token = CancellationToken::new();
    token.cancel();

    let err = CascStorage::open_with_transport(
        install.config(),
        Box::new(install.transport.clone()),
        &NoProgress,
        &token,
    )
    .unwrap_err();
    assert!(err.is_cancelled(), "{err}");
}

#[test]
fn test_clear_drops_names_and_tree() {
    let install = sample();
    let mut storage = install.open(install.config()).unwrap();
    storage.open_by_name("a\\b.txt").unwrap();
    assert_eq!(storage.stats().open_data_files, 1);

    storage.clear();
    assert_eq!(storage.stats().open_data_files, 0);
    assert_eq!(storage.tree().file_count(), 0);
    assert!(storage.names().is_empty());

    // Tables stay loaded
    assert_eq!(storage.open_by_name("a\\b.txt").unwrap(), b"hello");
    storage.close();
}
