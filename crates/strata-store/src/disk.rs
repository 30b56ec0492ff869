use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use strata_types::{validate_collection_name, validate_key, TypeError};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::traits::{sample_keys, KeyStream, Store};

/// Prefix of in-flight write files. Key segments may not start with it.
const TEMP_PREFIX: &str = ".strata-tmp-";

/// One file per key under a directory named after the collection.
///
/// Keys containing `/` map to nested directories. Each write goes to a
/// temporary file in the target directory and is renamed into place, so a
/// reader never observes a half-written value.
///
/// `yield_keys` walks the directory lazily: files created or removed while a
/// stream is being consumed may or may not be reported by that stream.
pub struct DiskBytesStore {
    collection: String,
    dir: PathBuf,
}

impl DiskBytesStore {
    /// Open (creating if absent) the collection directory `parent/collection`.
    pub fn open(parent: impl AsRef<Path>, collection: &str) -> StoreResult<Self> {
        validate_collection_name(collection)?;
        let dir = parent.as_ref().join(collection);
        fs::create_dir_all(&dir)
            .map_err(|e| StoreError::backend(collection, "open", &[], e))?;
        debug!(collection, dir = %dir.display(), "opened disk store");
        Ok(Self {
            collection: collection.to_string(),
            dir,
        })
    }

    /// Directory holding this collection's files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        let mut path = self.dir.clone();
        for segment in key.split('/') {
            let reason = match segment {
                "" => Some("empty path segment"),
                "." | ".." => Some("relative path segment"),
                s if s.starts_with(TEMP_PREFIX) => Some("reserved path segment"),
                _ => None,
            };
            if let Some(reason) = reason {
                return Err(TypeError::InvalidKey {
                    key: key.to_string(),
                    reason: reason.to_string(),
                }
                .into());
            }
            path.push(segment);
        }
        Ok(path)
    }

    fn write_atomic(&self, path: &Path, value: &[u8]) -> std::io::Result<()> {
        let parent = path.parent().unwrap_or(&self.dir);
        fs::create_dir_all(parent)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(parent)?;
        tmp.write_all(value)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.dir).ok()?;
        let mut segments = Vec::new();
        for part in relative.components() {
            segments.push(part.as_os_str().to_str()?.to_string());
        }
        let key = segments.join("/");
        if segments.iter().any(|s| s.starts_with(TEMP_PREFIX)) || validate_key(&key).is_err() {
            return None;
        }
        Some(key)
    }
}

/// A key is absent when its path is missing or is a directory created for
/// nested keys (`a` once `a/b` exists).
fn is_absent(path: &Path, err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::NotFound || path.is_dir()
}

impl Store for DiskBytesStore {
    type Value = Vec<u8>;

    fn collection_name(&self) -> &str {
        &self.collection
    }

    fn mset(&self, pairs: &[(String, Vec<u8>)]) -> StoreResult<()> {
        let paths = pairs
            .iter()
            .map(|(k, _)| self.path_for(k))
            .collect::<StoreResult<Vec<_>>>()?;
        for ((key, value), path) in pairs.iter().zip(&paths) {
            self.write_atomic(path, value).map_err(|e| {
                StoreError::backend(&self.collection, "mset", std::slice::from_ref(key), e)
            })?;
        }
        debug!(collection = %self.collection, count = pairs.len(), "mset");
        Ok(())
    }

    fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        let paths = keys
            .iter()
            .map(|k| self.path_for(k))
            .collect::<StoreResult<Vec<_>>>()?;
        keys.iter()
            .zip(paths)
            .map(|(key, path)| match fs::read(&path) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if is_absent(&path, &e) => Ok(None),
                Err(e) => Err(StoreError::backend(
                    &self.collection,
                    "mget",
                    std::slice::from_ref(key),
                    e,
                )),
            })
            .collect()
    }

    fn mdelete(&self, keys: &[String]) -> StoreResult<()> {
        let paths = keys
            .iter()
            .map(|k| self.path_for(k))
            .collect::<StoreResult<Vec<_>>>()?;
        for (key, path) in keys.iter().zip(paths) {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if is_absent(&path, &e) => {}
                Err(e) => {
                    return Err(StoreError::backend(
                        &self.collection,
                        "mdelete",
                        std::slice::from_ref(key),
                        e,
                    ))
                }
            }
        }
        debug!(collection = %self.collection, count = keys.len(), "mdelete");
        Ok(())
    }

    fn yield_keys(&self, prefix: Option<&str>) -> StoreResult<KeyStream<'_>> {
        let prefix = prefix.map(str::to_string);
        let walker = WalkDir::new(&self.dir).min_depth(1).into_iter();
        let stream = walker.filter_map(move |entry| match entry {
            Ok(entry) if entry.file_type().is_file() => {
                if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                    return None;
                }
                let key = match self.key_for(entry.path()) {
                    Some(key) => key,
                    None => {
                        warn!(
                            collection = %self.collection,
                            path = %entry.path().display(),
                            "skipping file that does not map to a valid key"
                        );
                        return None;
                    }
                };
                match &prefix {
                    Some(p) if !key.starts_with(p.as_str()) => None,
                    _ => Some(Ok(key)),
                }
            }
            Ok(_) => None,
            Err(e) => Some(Err(StoreError::backend(
                &self.collection,
                "yield_keys",
                &[],
                e,
            ))),
        });
        Ok(Box::new(stream))
    }

    /// Keys removed between listing and reading are dropped, so a concurrent
    /// delete can make the result shorter than `count`.
    fn sample(&self, count: usize) -> StoreResult<Vec<Vec<u8>>> {
        let chosen = sample_keys(&self.collection, self.keys(None)?, count)?;
        Ok(self.mget(&chosen)?.into_iter().flatten().collect())
    }
}
