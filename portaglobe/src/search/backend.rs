//! Pluggable search table backends.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors from search table storage.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Table name would escape the spool directory or is empty
    #[error("invalid search table name: {0}")]
    InvalidTableName(String),

    /// Backend storage failure
    #[error("search backend error: {0}")]
    Storage(#[from] std::io::Error),
}

/// Destination for POI search tables unpacked from a globe.
///
/// The backend is selected by server configuration; a relational
/// implementation can be supplied externally through this trait.
pub trait SearchBackend: Send + Sync {
    /// Stores a table's raw content under `table_name`.
    fn load_search_table(&self, table_name: &str, content: &[u8]) -> Result<(), SearchError>;

    /// Drops every previously loaded table.
    fn clear_search_tables(&self) -> Result<(), SearchError>;
}

/// File-spool backend: each table is written to `<spool>/<name>`.
pub struct FileBackend {
    spool_dir: PathBuf,
}

impl FileBackend {
    pub fn new(spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
        }
    }

    fn table_path(&self, table_name: &str) -> Result<PathBuf, SearchError> {
        // Table names come out of a container index; keep them to a single
        // path component.
        if table_name.is_empty()
            || table_name.contains('/')
            || table_name.contains('\\')
            || table_name == "."
            || table_name == ".."
        {
            return Err(SearchError::InvalidTableName(table_name.to_string()));
        }
        Ok(self.spool_dir.join(table_name))
    }
}

impl SearchBackend for FileBackend {
    fn load_search_table(&self, table_name: &str, content: &[u8]) -> Result<(), SearchError> {
        let path = self.table_path(table_name)?;
        fs::create_dir_all(&self.spool_dir)?;
        fs::write(&path, content)?;
        debug!(table = table_name, path = %path.display(), "search table written");
        Ok(())
    }

    fn clear_search_tables(&self) -> Result<(), SearchError> {
        if !self.spool_dir.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.spool_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}

/// No-op backend for servers with search disabled.
#[derive(Debug, Default)]
pub struct StubBackend;

impl SearchBackend for StubBackend {
    fn load_search_table(&self, _table_name: &str, _content: &[u8]) -> Result<(), SearchError> {
        Ok(())
    }

    fn clear_search_tables(&self) -> Result<(), SearchError> {
        Ok(())
    }
}

/// Selects a backend from the configured database name, mirroring the
/// server config convention: empty or "none" disables search, "file"
/// spools to disk under `spool_dir`.
pub fn backend_for_config(database: &str, spool_dir: &Path) -> Box<dyn SearchBackend> {
    match database.to_ascii_lowercase().as_str() {
        "" | "none" => Box::new(StubBackend),
        _ => Box::new(FileBackend::new(spool_dir)),
    }
}
