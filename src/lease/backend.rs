//! Storage substrates for lease records.
//!
//! Backends deal in raw bytes keyed by resource id; the [`LeaseStore`]
//! decides what the bytes mean.
//!
//! [`LeaseStore`]: super::LeaseStore

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use rand::Rng;

use crate::error::{ClaimError, Result};

/// File name suffix for lease records on disk.
pub const CLAIM_SUFFIX: &str = ".claim.json";

const TEMP_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const TEMP_LEN: usize = 8;

/// Shared key/value substrate for lease records.
///
/// Implementations must make `put_new` an atomic create-or-fail: when two
/// callers race on the same key exactly one of them sees `true`.
pub trait LeaseBackend: Send + Sync {
    /// Replace the record for `key` atomically.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Create the record for `key` only if none exists.
    fn put_new(&self, key: &str, bytes: &[u8]) -> Result<bool>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove the record for `key`. Missing records are not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Remove the record for `key` only if it still holds `expected`.
    fn remove_if(&self, key: &str, expected: &[u8]) -> Result<bool>;

    /// Swap the record for `key` to `bytes` only if it still holds `expected`.
    fn replace_if(&self, key: &str, expected: &[u8], bytes: &[u8]) -> Result<bool>;

    /// Every key currently stored, valid or not.
    fn keys(&self) -> Result<Vec<String>>;

    /// Delete leftovers of interrupted writes that are older than `older_than`.
    fn sweep_scratch(&self, _older_than: Duration) -> Result<usize> {
        Ok(0)
    }
}

/// Escape a resource id into a flat file name stem.
///
/// `%` and `_` are percent-encoded first so that the `__` used for path
/// separators stays unambiguous.
///
/// # Examples
/// ```
/// use swarm_claim::lease::{escape_key, unescape_key};
///
/// let stem = escape_key("memory/lessons/L_042.md");
/// assert_eq!(stem, "memory__lessons__L%5F042.md");
/// assert_eq!(unescape_key(&stem), "memory/lessons/L_042.md");
/// ```
pub fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        match c {
            '%' => out.push_str("%25"),
            '_' => out.push_str("%5F"),
            '/' | '\\' => out.push_str("__"),
            _ => out.push(c),
        }
    }
    out
}

/// Reverse [`escape_key`]. Backslash separators come back as `/`.
pub fn unescape_key(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len());
    let mut chars = stem.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '_' if chars.peek() == Some(&'_') => {
                chars.next();
                out.push('/');
            }
            '%' => {
                let code: String = chars.clone().take(2).collect();
                match code.as_str() {
                    "25" => {
                        chars.nth(1);
                        out.push('%');
                    }
                    "5F" => {
                        chars.nth(1);
                        out.push('_');
                    }
                    _ => out.push('%'),
                }
            }
            _ => out.push(c),
        }
    }
    out
}

pub(crate) fn temp_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..TEMP_LEN)
        .map(|_| TEMP_CHARSET[rng.gen_range(0..TEMP_CHARSET.len())] as char)
        .collect()
}

/// `<stem>.<suffix>.tmp` or `<stem>.<suffix>.reap`, as left behind by a crash.
fn is_scratch_name(name: &str) -> bool {
    let Some(rest) = name
        .strip_suffix(".tmp")
        .or_else(|| name.strip_suffix(".reap"))
    else {
        return false;
    };
    match rest.rsplit_once('.') {
        Some((stem, suffix)) => {
            !stem.is_empty()
                && suffix.len() == TEMP_LEN
                && suffix.bytes().all(|b| TEMP_CHARSET.contains(&b))
        }
        None => false,
    }
}

/// One `<escaped>.claim.json` file per resource under a claims directory.
#[derive(Debug, Clone)]
pub struct FsBackend {
    dir: PathBuf,
}

impl FsBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}", escape_key(key), CLAIM_SUFFIX))
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| ClaimError::io("failed to create claims directory", &self.dir, e))
    }

    fn scratch_path(&self, key: &str, ext: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}.{}", escape_key(key), temp_suffix(), ext))
    }

    /// Write `bytes` to a fresh scratch file next to the record.
    fn write_scratch(&self, key: &str, bytes: &[u8]) -> Result<PathBuf> {
        self.ensure_dir()?;
        let tmp = self.scratch_path(key, "tmp");
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .map_err(|e| ClaimError::io("failed to create temp lease file", &tmp, e))?;
        file.write_all(bytes)
            .and_then(|_| file.sync_all())
            .map_err(|e| ClaimError::io("failed to write temp lease file", &tmp, e))?;
        Ok(tmp)
    }

    /// Exclusive create without hard links, for filesystems that lack them.
    fn create_new_direct(&self, path: &Path, bytes: &[u8]) -> Result<bool> {
        match fs::OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                file.write_all(bytes)
                    .map_err(|e| ClaimError::io("failed to write lease", path, e))?;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(ClaimError::io("failed to create lease", path, e)),
        }
    }

    /// Move the record aside and keep it out only if it still holds `expected`.
    fn take_if(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let path = self.path_for(key);
        let reap = self.scratch_path(key, "reap");

        // Rename first so a concurrent claimer cannot be deleted between our
        // comparison and the removal.
        match fs::rename(&path, &reap) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(ClaimError::io("failed to remove lease", path, e)),
        }

        let taken = fs::read(&reap)
            .map_err(|e| ClaimError::io("failed to read reaped lease", &reap, e))?;
        if taken != expected {
            // Someone rewrote it after we looked; put it back. If a fresh create
            // landed in the meantime, that record wins and the rewrite is lost.
            match fs::hard_link(&reap, &path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    log::warn!("lease {} displaced by a concurrent create", path.display());
                }
                Err(e) => log::warn!("failed to restore lease {}: {}", path.display(), e),
            }
            let _ = fs::remove_file(&reap);
            return Ok(false);
        }

        match fs::remove_file(&reap) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(ClaimError::io("failed to remove lease", reap, e)),
        }
    }

    /// Link a fully written scratch file into place, failing if a record exists.
    fn link_new(&self, tmp: &Path, key: &str, bytes: &[u8]) -> Result<bool> {
        let path = self.path_for(key);
        match fs::hard_link(tmp, &path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => {
                log::debug!("hard link unavailable for {}: {}", path.display(), e);
                self.create_new_direct(&path, bytes)
            }
        }
    }
}

impl LeaseBackend for FsBackend {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let tmp = self.write_scratch(key, bytes)?;
        let path = self.path_for(key);
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(ClaimError::io("failed to write lease", path, e));
        }
        Ok(())
    }

    fn put_new(&self, key: &str, bytes: &[u8]) -> Result<bool> {
        let tmp = self.write_scratch(key, bytes)?;
        // Linking a fully written file makes the record appear complete or not at all.
        let linked = self.link_new(&tmp, key, bytes);
        let _ = fs::remove_file(&tmp);
        linked
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClaimError::io("failed to read lease", path, e)),
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClaimError::io("failed to remove lease", path, e)),
        }
    }

    fn remove_if(&self, key: &str, expected: &[u8]) -> Result<bool> {
        self.take_if(key, expected)
    }

    fn replace_if(&self, key: &str, expected: &[u8], bytes: &[u8]) -> Result<bool> {
        let tmp = self.write_scratch(key, bytes)?;
        // Between taking the old record and linking the new one a create may
        // win; then the resource has changed hands and we report failure.
        let swapped = match self.take_if(key, expected) {
            Ok(true) => self.link_new(&tmp, key, bytes),
            other => other,
        };
        let _ = fs::remove_file(&tmp);
        swapped
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ClaimError::io("failed to list claims", &self.dir, e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ClaimError::io("failed to list claims", &self.dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(stem) = name.strip_suffix(CLAIM_SUFFIX) {
                keys.push(unescape_key(stem));
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn sweep_scratch(&self, older_than: Duration) -> Result<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(ClaimError::io("failed to list claims", &self.dir, e)),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| ClaimError::io("failed to list claims", &self.dir, e))?;
            let name = entry.file_name();
            if !name.to_str().map_or(false, is_scratch_name) {
                continue;
            }
            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
                continue;
            };
            // Files stamped in the future count as fresh.
            let age = now.duration_since(modified).unwrap_or_default();
            if age < older_than {
                continue;
            }
            let path = entry.path();
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(ClaimError::io("failed to remove scratch file", path, e)),
            }
        }
        Ok(removed)
    }
}

/// In-process backend for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LeaseBackend for MemoryBackend {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.records().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn put_new(&self, key: &str, bytes: &[u8]) -> Result<bool> {
        let mut records = self.records();
        if records.contains_key(key) {
            return Ok(false);
        }
        records.insert(key.to_string(), bytes.to_vec());
        Ok(true)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.records().get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.records().remove(key);
        Ok(())
    }

    fn remove_if(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let mut records = self.records();
        if records.get(key).map(Vec::as_slice) == Some(expected) {
            records.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    fn replace_if(&self, key: &str, expected: &[u8], bytes: &[u8]) -> Result<bool> {
        let mut records = self.records();
        match records.get_mut(key) {
            Some(current) if current.as_slice() == expected => {
                *current = bytes.to_vec();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.records().keys().cloned().collect())
    }
}
