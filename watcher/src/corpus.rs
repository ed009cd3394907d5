use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("storage I/O error on {0}: {1}")]
    Io(String, std::io::Error),
}

fn map_io(path: &Path, e: std::io::Error) -> StorageError {
    match e.kind() {
        ErrorKind::NotFound => StorageError::NotFound(path.display().to_string()),
        ErrorKind::PermissionDenied => StorageError::PermissionDenied(path.display().to_string()),
        _ => StorageError::Io(path.display().to_string(), e),
    }
}

/// One photo in the reference library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    pub path: PathBuf,
}

impl CorpusEntry {
    pub fn read_bytes(&self) -> Result<Vec<u8>, StorageError> {
        std::fs::read(&self.path).map_err(|e| map_io(&self.path, e))
    }
}

/// The reference photo library: a directory of image files.
pub struct PhotoLibrary {
    dir: PathBuf,
}

impl PhotoLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Enumerate the library's regular files. Sorted by file name so the
    /// corpus enumeration order, and therefore match order, is deterministic.
    pub fn list(&self) -> Result<Vec<CorpusEntry>, StorageError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(|e| map_io(&self.dir, e))? {
            let entry = entry.map_err(|e| map_io(&self.dir, e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file {
                paths.push(entry.path());
            }
        }
        paths.sort();
        debug!(dir = %self.dir.display(), photos = paths.len(), "enumerated photo library");
        Ok(paths.into_iter().map(|path| CorpusEntry { path }).collect())
    }

    pub fn delete(&self, path: &Path) -> Result<(), StorageError> {
        std::fs::remove_file(path).map_err(|e| map_io(path, e))
    }
}

/// Per-photo OCR text cache plus tombstones for deleted entries.
///
/// Cached text is computed once per path per process lifetime and is NOT
/// invalidated if the file's content changes on disk during the run — a
/// known limitation. Only deletion through the action dispatcher retires an
/// entry, which also guarantees it never reappears in a later match result.
#[derive(Debug, Default)]
pub struct CorpusIndex {
    texts: HashMap<PathBuf, String>,
    dropped: HashSet<PathBuf>,
}

impl CorpusIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached_text(&self, path: &Path) -> Option<&str> {
        self.texts.get(path).map(String::as_str)
    }

    pub fn insert_text(&mut self, path: PathBuf, text: String) {
        self.texts.insert(path, text);
    }

    pub fn is_dropped(&self, path: &Path) -> bool {
        self.dropped.contains(path)
    }

    /// Retire an entry: forget its cached text and bar it from future scans.
    pub fn drop_entry(&mut self, path: &Path) {
        self.texts.remove(path);
        self.dropped.insert(path.to_path_buf());
    }
}
