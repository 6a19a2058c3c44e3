//! Scoped globe sessions.
//!
//! The registry replaces process-global "active globe" state: request
//! handlers acquire an `Arc<GlobeHandle>` for the globe they serve, and a
//! globe switch replaces the registry entry without disturbing in-flight
//! requests, which finish against the handle they hold.

use crate::globe::{GlobeError, GlobeHandle};
use crate::unpacker::UnpackerFactory;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::info;

/// Registry of open globe handles keyed by canonical container path.
pub struct GlobeSessions {
    factory: Arc<dyn UnpackerFactory>,
    globes: RwLock<HashMap<PathBuf, Arc<GlobeHandle>>>,
    active: RwLock<Option<PathBuf>>,
}

impl GlobeSessions {
    pub fn new(factory: Arc<dyn UnpackerFactory>) -> Self {
        Self {
            factory,
            globes: RwLock::new(HashMap::new()),
            active: RwLock::new(None),
        }
    }

    fn key_for(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
    }

    /// Returns the open handle for `path`, opening the container on first
    /// acquisition.
    pub fn acquire(&self, path: &Path) -> Result<Arc<GlobeHandle>, GlobeError> {
        let key = Self::key_for(path);

        if let Some(handle) = self.globes.read().unwrap().get(&key) {
            return Ok(Arc::clone(handle));
        }

        let handle = Arc::new(GlobeHandle::open(path, self.factory.as_ref())?);

        let mut globes = self.globes.write().unwrap();
        // A racing open may have won; keep the first handle inserted.
        let entry = globes
            .entry(key)
            .or_insert_with(|| Arc::clone(&handle));
        Ok(Arc::clone(entry))
    }

    /// Selects the globe served by default and returns its handle.
    ///
    /// In-flight requests against a previously selected globe keep their
    /// handles; the registry entry for the old globe remains until
    /// evicted.
    pub fn select(&self, path: &Path) -> Result<Arc<GlobeHandle>, GlobeError> {
        let handle = self.acquire(path)?;
        *self.active.write().unwrap() = Some(Self::key_for(path));
        info!(globe = %path.display(), "globe selected for serving");
        Ok(handle)
    }

    /// Handle of the currently selected globe.
    pub fn active(&self) -> Option<Arc<GlobeHandle>> {
        let active = self.active.read().unwrap();
        let key = active.as_ref()?;
        self.globes.read().unwrap().get(key).cloned()
    }

    /// Drops the registry entry for `path`. Outstanding `Arc`s keep the
    /// handle alive until released.
    pub fn evict(&self, path: &Path) {
        let key = Self::key_for(path);
        self.globes.write().unwrap().remove(&key);
        let mut active = self.active.write().unwrap();
        if active.as_deref() == Some(key.as_path()) {
            *active = None;
        }
    }

    pub fn open_count(&self) -> usize {
        self.globes.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unpacker::{DbRootInfo, FileLoc, PacketType, Unpacker, UnpackerOpenError};
    use std::fs;
    use tempfile::TempDir;

    struct EmptyUnpacker;

    impl Unpacker for EmptyUnpacker {
        fn find_file(&self, _: &str) -> Option<FileLoc> {
            None
        }
        fn find_layer_file(&self, _: &str, _: u32) -> Option<FileLoc> {
            None
        }
        fn find_meta_dbroot(&self) -> Option<FileLoc> {
            None
        }
        fn find_qtp_packet(&self, _: &str, _: PacketType, _: u32, _: u32) -> Option<FileLoc> {
            None
        }
        fn find_data_packet(&self, _: &str, _: PacketType, _: u32, _: u32) -> Option<FileLoc> {
            None
        }
        fn find_map_data_packet(&self, _: &str, _: PacketType, _: u32, _: u32) -> Option<FileLoc> {
            None
        }
        fn index_size(&self) -> usize {
            0
        }
        fn index_file(&self, _: usize) -> Option<String> {
            None
        }
        fn is_gee(&self) -> bool {
            true
        }
        fn is_2d(&self) -> bool {
            false
        }
        fn is_3d(&self) -> bool {
            true
        }
        fn dbroot_info(&self) -> DbRootInfo {
            DbRootInfo::default()
        }
    }

    struct EmptyFactory;

    impl UnpackerFactory for EmptyFactory {
        fn open(
            &self,
            _path: &Path,
            _composite: bool,
            _files_only: bool,
        ) -> Result<Box<dyn Unpacker>, UnpackerOpenError> {
            Ok(Box::new(EmptyUnpacker))
        }
    }

    #[test]
    fn test_acquire_caches_handles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sf.glb");
        fs::write(&path, b"x").unwrap();

        let sessions = GlobeSessions::new(Arc::new(EmptyFactory));
        let a = sessions.acquire(&path).unwrap();
        let b = sessions.acquire(&path).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(sessions.open_count(), 1);
    }

    #[test]
    fn test_select_and_active() {
        let dir = TempDir::new().unwrap();
        let sf = dir.path().join("sf.glb");
        let la = dir.path().join("la.glb");
        fs::write(&sf, b"x").unwrap();
        fs::write(&la, b"x").unwrap();

        let sessions = GlobeSessions::new(Arc::new(EmptyFactory));
        assert!(sessions.active().is_none());

        sessions.select(&sf).unwrap();
        assert_eq!(sessions.active().unwrap().name(), "sf.glb");

        // Switching globes replaces the selection; the old handle stays
        // open in the registry.
        sessions.select(&la).unwrap();
        assert_eq!(sessions.active().unwrap().name(), "la.glb");
        assert_eq!(sessions.open_count(), 2);
    }

    #[test]
    fn test_evict_clears_selection() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sf.glb");
        fs::write(&path, b"x").unwrap();

        let sessions = GlobeSessions::new(Arc::new(EmptyFactory));
        let handle = sessions.select(&path).unwrap();
        sessions.evict(&path);
        assert!(sessions.active().is_none());
        assert_eq!(sessions.open_count(), 0);

        // The acquired handle is still usable after eviction.
        assert_eq!(handle.name(), "sf.glb");
    }

    #[test]
    fn test_acquire_unknown_type_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sf.zip");
        fs::write(&path, b"x").unwrap();

        let sessions = GlobeSessions::new(Arc::new(EmptyFactory));
        assert!(sessions.acquire(&path).is_err());
    }
}
