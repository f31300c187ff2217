//! On-disk store.
//!
//! Layout under the store root:
//!
//! ```text
//! entries/<sha256(path) hex>.entry   one JSON header line, then the payload
//! baseline.json                      last manifest reconciled against
//! stash.lock                         advisory lock held during a pass
//! ```
//!
//! Each record is written to a temp file in the same directory and renamed
//! into place, so a record is either the old one or the new one.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs4::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use stash_domain::{parse_manifest, render_json, Integrity, Manifest};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::{CacheEntry, CacheStore, StoreError, StoreLease, StoredAsset};

const ENTRIES_DIR: &str = "entries";
const ENTRY_EXTENSION: &str = "entry";
const BASELINE_FILE: &str = "baseline.json";
const LOCK_FILE: &str = "stash.lock";

#[derive(Debug, Serialize, Deserialize)]
struct RecordHeader {
    path: String,
    hash: Integrity,
    size: u64,
}

impl From<RecordHeader> for StoredAsset {
    fn from(header: RecordHeader) -> Self {
        Self {
            path: header.path,
            hash: header.hash,
            size: header.size,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    identity: String,
}

impl FsStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let entries = root.join(ENTRIES_DIR);
        fs::create_dir_all(&entries).map_err(|err| StoreError::io(&entries, err))?;
        let canonical = fs::canonicalize(&root).unwrap_or_else(|_| root.clone());
        Ok(Self {
            identity: format!("fs:{}", canonical.display()),
            root,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entries_dir(&self) -> PathBuf {
        self.root.join(ENTRIES_DIR)
    }

    fn record_path(&self, path: &str) -> PathBuf {
        let key = hex::encode(Sha256::digest(path.as_bytes()));
        self.entries_dir().join(format!("{key}.{ENTRY_EXTENSION}"))
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    fn open_lock_file(&self) -> Result<File, StoreError> {
        let path = self.lock_path();
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| StoreError::Lock { path, source })
    }
}

async fn blocking<T, F>(task: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| StoreError::Unavailable(format!("store task failed: {err}")))?
}

fn open_record(file: &Path) -> Result<Option<BufReader<File>>, StoreError> {
    match File::open(file) {
        Ok(handle) => Ok(Some(BufReader::new(handle))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(StoreError::io(file, err)),
    }
}

fn read_header(reader: &mut BufReader<File>, file: &Path) -> Result<RecordHeader, StoreError> {
    let mut line = Vec::new();
    reader
        .read_until(b'\n', &mut line)
        .map_err(|err| StoreError::io(file, err))?;
    if line.pop() != Some(b'\n') {
        return Err(StoreError::Corrupt {
            path: file.to_path_buf(),
            reason: "missing record header".to_string(),
        });
    }
    serde_json::from_slice(&line).map_err(|err| StoreError::Corrupt {
        path: file.to_path_buf(),
        reason: err.to_string(),
    })
}

fn read_record(file: &Path) -> Result<Option<(RecordHeader, Vec<u8>)>, StoreError> {
    let Some(mut reader) = open_record(file)? else {
        return Ok(None);
    };
    let header = read_header(&mut reader, file)?;
    let mut payload = Vec::new();
    reader
        .read_to_end(&mut payload)
        .map_err(|err| StoreError::io(file, err))?;
    Ok(Some((header, payload)))
}

fn read_record_header(file: &Path) -> Result<Option<RecordHeader>, StoreError> {
    match open_record(file)? {
        Some(mut reader) => read_header(&mut reader, file).map(Some),
        None => Ok(None),
    }
}

fn write_atomic(dest: &Path, chunks: &[&[u8]]) -> Result<(), StoreError> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|err| StoreError::io(dir, err))?;
    for chunk in chunks {
        tmp.write_all(chunk)
            .map_err(|err| StoreError::io(tmp.path(), err))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|err| StoreError::io(tmp.path(), err))?;
    tmp.persist(dest)
        .map_err(|err| StoreError::io(dest, err.error))?;
    Ok(())
}

fn scan_headers(dir: &Path) -> Result<Vec<RecordHeader>, StoreError> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(StoreError::io(dir, err)),
    };
    let mut headers = Vec::new();
    for dirent in read_dir {
        let dirent = dirent.map_err(|err| StoreError::io(dir, err))?;
        let file = dirent.path();
        if file.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
            continue;
        }
        match read_record_header(&file) {
            Ok(Some(header)) => headers.push(header),
            Ok(None) => {}
            Err(StoreError::Corrupt { path, reason }) => {
                warn!(record = %path.display(), %reason, "skipping unreadable cache record");
            }
            Err(err) => return Err(err),
        }
    }
    headers.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(headers)
}

#[async_trait]
impl CacheStore for FsStore {
    fn identity(&self) -> String {
        self.identity.clone()
    }

    async fn get(&self, path: &str) -> Result<Option<CacheEntry>, StoreError> {
        let file = self.record_path(path);
        let key = path.to_string();
        blocking(move || {
            Ok(read_record(&file)?
                .filter(|(header, _)| header.path == key)
                .map(|(header, payload)| CacheEntry::new(header.path, header.hash, payload)))
        })
        .await
    }

    async fn head(&self, path: &str) -> Result<Option<StoredAsset>, StoreError> {
        let file = self.record_path(path);
        let key = path.to_string();
        blocking(move || {
            Ok(read_record_header(&file)?
                .filter(|header| header.path == key)
                .map(StoredAsset::from))
        })
        .await
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), StoreError> {
        let file = self.record_path(&entry.path);
        blocking(move || {
            let header = RecordHeader {
                path: entry.path,
                hash: entry.hash,
                size: entry.payload.len() as u64,
            };
            let mut line = serde_json::to_vec(&header).map_err(|err| StoreError::Corrupt {
                path: file.clone(),
                reason: err.to_string(),
            })?;
            line.push(b'\n');
            write_atomic(&file, &[&line, &entry.payload])?;
            debug!(path = %header.path, size = header.size, "stored cache record");
            Ok(())
        })
        .await
    }

    async fn delete(&self, path: &str) -> Result<bool, StoreError> {
        let file = self.record_path(path);
        blocking(move || match fs::remove_file(&file) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StoreError::io(&file, err)),
        })
        .await
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.entries_dir();
        blocking(move || {
            Ok(scan_headers(&dir)?
                .into_iter()
                .map(|header| header.path)
                .collect())
        })
        .await
    }

    async fn snapshot(&self) -> Result<Vec<StoredAsset>, StoreError> {
        let dir = self.entries_dir();
        blocking(move || {
            Ok(scan_headers(&dir)?
                .into_iter()
                .map(StoredAsset::from)
                .collect())
        })
        .await
    }

    async fn load_baseline(&self) -> Result<Option<Manifest>, StoreError> {
        let file = self.root.join(BASELINE_FILE);
        blocking(move || {
            let contents = match fs::read_to_string(&file) {
                Ok(contents) => contents,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
                Err(err) => return Err(StoreError::io(&file, err)),
            };
            parse_manifest(&contents)
                .map(Some)
                .map_err(|err| StoreError::Baseline(err.to_string()))
        })
        .await
    }

    async fn save_baseline(&self, manifest: &Manifest) -> Result<(), StoreError> {
        let file = self.root.join(BASELINE_FILE);
        let rendered =
            render_json(manifest).map_err(|err| StoreError::Baseline(err.to_string()))?;
        blocking(move || write_atomic(&file, &[rendered.as_bytes()])).await
    }

    async fn clear_baseline(&self) -> Result<(), StoreError> {
        let file = self.root.join(BASELINE_FILE);
        blocking(move || match fs::remove_file(&file) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::io(&file, err)),
        })
        .await
    }

    async fn lock(&self) -> Result<StoreLease, StoreError> {
        if let Some(lease) = self.try_lock().await? {
            return Ok(lease);
        }
        info!(store = %self.root.display(), "waiting for another process to release the store");
        let file = self.open_lock_file()?;
        let path = self.lock_path();
        blocking(move || {
            file.lock_exclusive()
                .map_err(|source| StoreError::Lock { path, source })?;
            Ok(StoreLease::file(file))
        })
        .await
    }

    async fn try_lock(&self) -> Result<Option<StoreLease>, StoreError> {
        let file = self.open_lock_file()?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(StoreLease::file(file))),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(source) => Err(StoreError::Lock {
                path: self.lock_path(),
                source,
            }),
        }
    }
}
