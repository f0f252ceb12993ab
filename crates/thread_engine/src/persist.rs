use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use engine_logging::engine_info;
use tempfile::NamedTempFile;
use thiserror::Error;
use thread_core::{ThreadId, ThreadSnapshot};

use crate::filename::snapshot_filename;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    Ok(())
}

/// Atomically write content to `{dir}/{filename}` by writing a temp file then renaming.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        // `persist` replaces an existing target in one rename.
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}

/// Stores a finished snapshot somewhere and says where.
pub trait Persistence {
    fn save(&self, snapshot: &ThreadSnapshot) -> Result<PathBuf, PersistError>;
}

/// Pretty-printed JSON at `{dir}/comments-{thread}.json`.
#[derive(Debug, Clone)]
pub struct JsonPersistence {
    writer: AtomicFileWriter,
    filename: String,
}

impl JsonPersistence {
    pub fn new(dir: PathBuf, thread: &ThreadId) -> Self {
        Self {
            writer: AtomicFileWriter::new(dir),
            filename: snapshot_filename(thread, "json"),
        }
    }

    pub fn target(&self) -> PathBuf {
        self.writer.dir().join(&self.filename)
    }

    /// Read a snapshot written by [`Persistence::save`].
    pub fn load(&self) -> Result<ThreadSnapshot, PersistError> {
        let content = fs::read_to_string(self.target())?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Persistence for JsonPersistence {
    fn save(&self, snapshot: &ThreadSnapshot) -> Result<PathBuf, PersistError> {
        let content = serde_json::to_string_pretty(snapshot)?;
        let path = self.writer.write(&self.filename, &content)?;
        engine_info!(
            "Saved {} items and {} replies to {:?}",
            snapshot.top_level_count(),
            snapshot.child_count(),
            path
        );
        Ok(path)
    }
}
