//! Blocking file routines. Everything here runs on the worker pool, never on
//! the backend's sequence.
//!
//! Layout: one file per entry, `{hash:016x}_0`, holding a small header
//! (magic, version, key length, key) followed by the stream 0 payload. The
//! cache directory also carries an `index` marker recording the layout
//! version.

use crate::entry_hash::EntryHash;
use crate::error::{CacheError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

pub(crate) const ENTRY_MAGIC: u64 = 0xfcfb_6d1b_a772_5c30;
pub(crate) const ENTRY_VERSION: u32 = 1;
const ENTRY_HEADER_LEN: u64 = 16;

const MARKER_FILE: &str = "index";
const MARKER_MAGIC: u64 = 0x656e_7465_7220_6361;
const MARKER_VERSION: u32 = 7;

/// Used when neither the configuration nor a caller sets a size.
pub const DEFAULT_MAX_SIZE: u64 = 80 * 1024 * 1024;

/// Result of checking the cache directory.
#[derive(Debug, Clone)]
pub(crate) struct DiskStat {
    pub(crate) max_size: u64,
    pub(crate) cache_dir_mtime: Option<SystemTime>,
}

/// What the index learns about an entry file from a directory scan.
#[derive(Debug, Clone)]
pub(crate) struct ScannedEntry {
    pub(crate) hash: EntryHash,
    pub(crate) size: u64,
    pub(crate) last_used: SystemTime,
}

/// Header and payload size of an opened entry file.
#[derive(Debug, Clone)]
pub(crate) struct EntryStat {
    pub(crate) key: String,
    pub(crate) data_size: u64,
    pub(crate) last_used: SystemTime,
}

/// On-disk size of an entry file holding `data_len` payload bytes.
pub(crate) fn file_size_for(key: &str, data_len: u64) -> u64 {
    ENTRY_HEADER_LEN + key.len() as u64 + data_len
}

pub(crate) fn entry_path(dir: &Path, hash: EntryHash) -> PathBuf {
    dir.join(hash.file_name(0))
}

/// Create the directory if needed and validate (or write) the version
/// marker. A marker from another layout makes the directory unusable.
pub(crate) fn init_cache_structure(dir: &Path, suggested_max_size: u64) -> Result<DiskStat> {
    fs::create_dir_all(dir).map_err(|e| {
        CacheError::InitFailed(format!("cannot create {}: {}", dir.display(), e))
    })?;

    let marker = dir.join(MARKER_FILE);
    match fs::read(&marker) {
        Ok(bytes) => check_marker(&bytes)
            .map_err(|msg| CacheError::InitFailed(format!("{}: {}", marker.display(), msg)))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let mut bytes = Vec::with_capacity(12);
            bytes.extend_from_slice(&MARKER_MAGIC.to_le_bytes());
            bytes.extend_from_slice(&MARKER_VERSION.to_le_bytes());
            fs::write(&marker, bytes).map_err(|e| {
                CacheError::InitFailed(format!("cannot write {}: {}", marker.display(), e))
            })?;
        }
        Err(e) => {
            return Err(CacheError::InitFailed(format!(
                "cannot read {}: {}",
                marker.display(),
                e
            )))
        }
    }

    let cache_dir_mtime = fs::metadata(dir).and_then(|m| m.modified()).ok();
    let max_size = if suggested_max_size == 0 {
        DEFAULT_MAX_SIZE
    } else {
        suggested_max_size
    };
    Ok(DiskStat {
        max_size,
        cache_dir_mtime,
    })
}

fn check_marker(bytes: &[u8]) -> std::result::Result<(), &'static str> {
    if bytes.len() != 12 {
        return Err("truncated version marker");
    }
    let (magic, version) = bytes.split_at(8);
    if u64::from_le_bytes(magic.try_into().map_err(|_| "bad magic")?) != MARKER_MAGIC {
        return Err("not a cache directory");
    }
    if u32::from_le_bytes(version.try_into().map_err(|_| "bad version")?) != MARKER_VERSION {
        return Err("unsupported cache version");
    }
    Ok(())
}

/// List every entry file in the directory. Unrelated files are ignored.
pub(crate) fn scan_cache_directory(dir: &Path) -> Result<Vec<ScannedEntry>> {
    let mut found = Vec::new();
    for dirent in fs::read_dir(dir)? {
        let dirent = dirent?;
        let name = dirent.file_name();
        let Some(hash) = name.to_str().and_then(EntryHash::from_file_name) else {
            continue;
        };
        let meta = match dirent.metadata() {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => continue,
            Err(e) => {
                warn!(hash = %hash, error = %e, "skipping unreadable entry file");
                continue;
            }
        };
        found.push(ScannedEntry {
            hash,
            size: meta.len(),
            last_used: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    debug!(dir = %dir.display(), entries = found.len(), "scanned cache directory");
    Ok(found)
}

fn encode_header(key: &str) -> Vec<u8> {
    let mut header = Vec::with_capacity(ENTRY_HEADER_LEN as usize + key.len());
    header.extend_from_slice(&ENTRY_MAGIC.to_le_bytes());
    header.extend_from_slice(&ENTRY_VERSION.to_le_bytes());
    header.extend_from_slice(&(key.len() as u32).to_le_bytes());
    header.extend_from_slice(key.as_bytes());
    header
}

fn read_header(file: &mut File) -> Result<String> {
    let mut fixed = [0u8; ENTRY_HEADER_LEN as usize];
    file.read_exact(&mut fixed).map_err(|_| CacheError::Failed)?;
    let mut magic = [0u8; 8];
    magic.copy_from_slice(&fixed[..8]);
    let mut version = [0u8; 4];
    version.copy_from_slice(&fixed[8..12]);
    let mut key_len = [0u8; 4];
    key_len.copy_from_slice(&fixed[12..16]);
    if u64::from_le_bytes(magic) != ENTRY_MAGIC || u32::from_le_bytes(version) != ENTRY_VERSION {
        return Err(CacheError::Failed);
    }
    let key_len = u64::from(u32::from_le_bytes(key_len));
    if key_len > file.metadata()?.len().saturating_sub(ENTRY_HEADER_LEN) {
        return Err(CacheError::Failed);
    }
    let mut key = vec![0u8; key_len as usize];
    file.read_exact(&mut key).map_err(|_| CacheError::Failed)?;
    String::from_utf8(key).map_err(|_| CacheError::Failed)
}

/// Write a fresh header for `key`, replacing any stale file for the hash.
pub(crate) fn create_entry_file(dir: &Path, hash: EntryHash, key: &str) -> Result<EntryStat> {
    let path = entry_path(dir, hash);
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)?;
    file.write_all(&encode_header(key))?;
    Ok(EntryStat {
        key: key.to_string(),
        data_size: 0,
        last_used: SystemTime::now(),
    })
}

/// Open an existing entry file. When `expected_key` is given the stored key
/// must match it; a mismatch means another key owns the file.
pub(crate) fn open_entry_file(
    dir: &Path,
    hash: EntryHash,
    expected_key: Option<&str>,
) -> Result<EntryStat> {
    let path = entry_path(dir, hash);
    let mut file = File::open(&path)?;
    let key = read_header(&mut file)?;
    if let Some(expected) = expected_key {
        if expected != key {
            debug!(hash = %hash, "stored key does not match requested key");
            return Err(CacheError::NotFound);
        }
    }
    let meta = file.metadata()?;
    let header_len = ENTRY_HEADER_LEN + key.len() as u64;
    Ok(EntryStat {
        data_size: meta.len().saturating_sub(header_len),
        last_used: meta.modified().unwrap_or_else(|_| SystemTime::now()),
        key,
    })
}

pub(crate) fn read_entry_data(dir: &Path, hash: EntryHash) -> Result<Vec<u8>> {
    let mut file = File::open(entry_path(dir, hash))?;
    read_header(&mut file)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(data)
}

/// Replace stream 0 with `data`. The header is rewritten so a truncated
/// earlier write cannot leave a stale key behind.
pub(crate) fn write_entry_data(dir: &Path, hash: EntryHash, key: &str, data: &[u8]) -> Result<u64> {
    let path = entry_path(dir, hash);
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)?;
    file.write_all(&encode_header(key))?;
    file.write_all(data)?;
    Ok(data.len() as u64)
}

/// Remove the files of one entry. A missing file is not an error.
pub(crate) fn delete_entry_files(dir: &Path, hash: EntryHash) -> Result<()> {
    match fs::remove_file(entry_path(dir, hash)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(hash = %hash, error = %e, "failed to delete entry files");
            Err(CacheError::from(e))
        }
    }
}

/// Remove the files of every hash. All deletions are attempted; the first
/// failure is reported after the rest have run.
pub(crate) fn delete_entry_set_files(dir: &Path, hashes: &[EntryHash]) -> Result<()> {
    let mut first_error = None;
    for &hash in hashes {
        if let Err(e) = delete_entry_files(dir, hash) {
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        None => Ok(()),
        Some(e) => Err(e),
    }
}
