//! Persistent record of videos whose comments were already extracted.
//!
//! The file is a JSON array of video ids. It only ever grows, and every update
//! goes through a temp file in the same directory followed by a rename, so a
//! reader sees either the previous set or the new one.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::LedgerError;

/// Serializes read-merge-persist cycles between ledgers living in the same
/// process. Separate processes sharing one file can still interleave between
/// the re-read and the rename and drop each other's newest id.
static PERSIST_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    ids: HashSet<String>,
}

impl Ledger {
    /// Loads the ledger at `path`. Missing, unreadable or corrupt files yield
    /// an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ids = read_ids_lenient(&path);
        debug!(path = %path.display(), count = ids.len(), "loaded ledger");
        Self { path, ids }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, video_id: &str) -> bool {
        self.ids.contains(video_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Records `video_id` and persists the whole set.
    ///
    /// The in-memory set is updated even when persisting fails, so the caller
    /// keeps skipping the video for the rest of the run.
    pub fn add(&mut self, video_id: &str) -> Result<(), LedgerError> {
        self.ids.insert(video_id.to_owned());

        let _guard = PERSIST_LOCK.lock();
        // Merge whatever other writers persisted since we loaded.
        self.ids.extend(read_ids_lenient(&self.path));
        let staged = stage(&self.path, &self.ids)?;
        commit(staged, &self.path)
    }
}

fn read_ids_lenient(path: &Path) -> HashSet<String> {
    match read_ids(path) {
        Ok(ids) => ids,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring unreadable ledger");
            HashSet::new()
        }
    }
}

fn read_ids(path: &Path) -> Result<HashSet<String>, LedgerError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(source) => {
            return Err(LedgerError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if raw.trim().is_empty() {
        return Ok(HashSet::new());
    }
    let ids: Vec<String> = serde_json::from_str(&raw)?;
    Ok(ids.into_iter().filter(|id| !id.is_empty()).collect())
}

/// Writes the sorted id list to a temp file next to `path` and flushes it to
/// disk. Dropping the returned handle removes the temp file.
fn stage(path: &Path, ids: &HashSet<String>) -> Result<NamedTempFile, LedgerError> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let io_err = |source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    };

    fs::create_dir_all(dir).map_err(io_err)?;
    let sorted: BTreeSet<&String> = ids.iter().collect();
    let payload = serde_json::to_vec(&sorted)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(&payload).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    Ok(tmp)
}

fn commit(staged: NamedTempFile, path: &Path) -> Result<(), LedgerError> {
    staged.persist(path).map_err(|err| LedgerError::Io {
        path: path.to_path_buf(),
        source: err.error,
    })?;
    Ok(())
}
