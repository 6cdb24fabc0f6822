//! On-disk mirror of CDN downloads
//!
//! Every cached object `<file>` has a `<file>.meta` JSON sidecar holding
//! its size and, when the CDN sent one, the MD5 from the ETag. An object is
//! served only if it still matches its sidecar; otherwise both files are
//! removed and the caller downloads again.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{Result, StorageError};

/// Validation data stored next to a cached object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMeta {
    /// Size in bytes
    pub size: u64,
    /// Lowercase hex MD5, when known
    pub md5: Option<String>,
}

/// Disk cache rooted at a directory
#[derive(Debug, Clone)]
pub struct CdnCache {
    root: PathBuf,
}

impl CdnCache {
    /// Cache stored under `root`
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Cache directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a cached object
    pub fn path_for(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    fn meta_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".meta");
        PathBuf::from(name)
    }

    /// Cached object, if present and valid
    pub fn get(&self, relative: &str) -> Option<Vec<u8>> {
        let path = self.path_for(relative);
        let meta_path = Self::meta_path(&path);
        let meta: CacheMeta = match fs::read(&meta_path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("Discarding cache entry {relative}: bad metadata: {e}");
                    self.remove(relative);
                    return None;
                }
            },
            Err(_) => return None,
        };

        let Ok(data) = fs::read(&path) else {
            self.remove(relative);
            return None;
        };

        if data.len() as u64 != meta.size {
            warn!(
                "Revalidating cache entry {relative}: size {} != {}",
                data.len(),
                meta.size
            );
            self.remove(relative);
            return None;
        }
        if let Some(expected) = &meta.md5 {
            let actual = format!("{:x}", md5::compute(&data));
            if !actual.eq_ignore_ascii_case(expected) {
                warn!("Revalidating cache entry {relative}: MD5 {actual} != {expected}");
                self.remove(relative);
                return None;
            }
        }

        debug!("Cache hit {relative}");
        Some(data)
    }

    /// Store an object; `etag` is kept as its MD5 when it looks like one
    pub fn put(&self, relative: &str, data: &[u8], etag: Option<&str>) -> Result<()> {
        let path = self.path_for(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StorageError::Cache(format!("{}: {e}", parent.display())))?;
        }

        let md5 = etag
            .filter(|tag| tag.len() == 32 && tag.chars().all(|c| c.is_ascii_hexdigit()))
            .map(str::to_ascii_lowercase);
        let meta = CacheMeta {
            size: data.len() as u64,
            md5,
        };

        let mut partial = path.as_os_str().to_os_string();
        partial.push(".part");
        let partial = PathBuf::from(partial);
        fs::write(&partial, data)
            .map_err(|e| StorageError::Cache(format!("{}: {e}", partial.display())))?;
        fs::rename(&partial, &path)
            .map_err(|e| StorageError::Cache(format!("{}: {e}", path.display())))?;

        let meta_json = serde_json::to_vec(&meta)
            .map_err(|e| StorageError::Cache(format!("failed to encode metadata: {e}")))?;
        fs::write(Self::meta_path(&path), meta_json)
            .map_err(|e| StorageError::Cache(format!("{}: {e}", path.display())))?;
        Ok(())
    }

    /// Remove an object and its sidecar
    pub fn remove(&self, relative: &str) {
        let path = self.path_for(relative);
        let _ = fs::remove_file(Self::meta_path(&path));
        let _ = fs::remove_file(path);
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_put_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CdnCache::new(dir.path());
        cache.put("data/ab/cd/abcd", b"hello", None).unwrap();
        assert_eq!(cache.get("data/ab/cd/abcd").unwrap(), b"hello");
        assert!(cache.get("data/ab/cd/missing").is_none());
    }

    #[test]
    fn test_size_mismatch_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CdnCache::new(dir.path());
        cache.put("data/ab/cd/abcd", b"hello", None).unwrap();
        fs::write(cache.path_for("data/ab/cd/abcd"), b"hello world").unwrap();
        assert!(cache.get("data/ab/cd/abcd").is_none());
        assert!(!cache.path_for("data/ab/cd/abcd").exists());
    }

    #[test]
    fn test_md5_from_etag() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CdnCache::new(dir.path());
        let etag = format!("{:x}", md5::compute(b"hello"));
        cache.put("config/aa/bb/aabb", b"hello", Some(&etag)).unwrap();
        assert_eq!(cache.get("config/aa/bb/aabb").unwrap(), b"hello");

        // Same size, different content
        fs::write(cache.path_for("config/aa/bb/aabb"), b"jello").unwrap();
        assert!(cache.get("config/aa/bb/aabb").is_none());
    }

    #[test]
    fn test_non_md5_etag_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CdnCache::new(dir.path());
        cache.put("x", b"abc", Some("W/\"weak\"")).unwrap();
        let meta: CacheMeta =
            serde_json::from_slice(&fs::read(dir.path().join("x.meta")).unwrap()).unwrap();
        assert_eq!(meta, CacheMeta { size: 3, md5: None });
    }
}
