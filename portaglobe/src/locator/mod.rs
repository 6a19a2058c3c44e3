//! Packfile locator
//!
//! Binds an [`Unpacker`] to the container file it indexes and performs the
//! one read primitive every higher-level read operation is built from:
//! seek to a located offset and read exactly that entry's bytes.

use crate::unpacker::{FileLoc, Unpacker};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error reading a located byte range out of a container.
#[derive(Debug, Error)]
pub enum LocatorError {
    /// Container file could not be opened or read
    #[error("cannot read container {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves logical addresses to byte ranges and reads them.
///
/// Owns the opened unpacker for one container. Reads open the container
/// per call; the OS page cache makes repeated opens cheap, and it keeps
/// the locator free of interior mutability.
pub struct PackfileLocator {
    container_path: PathBuf,
    unpacker: Box<dyn Unpacker>,
}

impl PackfileLocator {
    pub fn new(container_path: impl Into<PathBuf>, unpacker: Box<dyn Unpacker>) -> Self {
        Self {
            container_path: container_path.into(),
            unpacker,
        }
    }

    /// The bound container file.
    pub fn container_path(&self) -> &Path {
        &self.container_path
    }

    /// Address-lookup capability for this container.
    pub fn unpacker(&self) -> &dyn Unpacker {
        self.unpacker.as_ref()
    }

    /// Reads the bytes of a located entry.
    ///
    /// Seeks to the reconstructed 64-bit offset and reads exactly
    /// `loc.size()` bytes; a short read is an I/O error, not a short
    /// result.
    pub fn read(&self, loc: FileLoc) -> Result<Vec<u8>, LocatorError> {
        let io_err = |source| LocatorError::Io {
            path: self.container_path.clone(),
            source,
        };

        let mut file = File::open(&self.container_path).map_err(io_err)?;
        file.seek(SeekFrom::Start(loc.offset())).map_err(io_err)?;

        let mut buf = vec![0u8; loc.size() as usize];
        file.read_exact(&mut buf).map_err(io_err)?;
        Ok(buf)
    }

    /// Reads `len` bytes at `offset` from the end of the container.
    ///
    /// Used for the fixed-size package trailer (version and CRC words).
    pub fn read_trailer(&self, offset_from_end: u64, len: usize) -> Result<Vec<u8>, LocatorError> {
        let io_err = |source| LocatorError::Io {
            path: self.container_path.clone(),
            source,
        };

        let mut file = File::open(&self.container_path).map_err(io_err)?;
        let size = file.metadata().map_err(io_err)?.len();
        file.seek(SeekFrom::Start(size.saturating_sub(offset_from_end)))
            .map_err(io_err)?;

        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).map_err(io_err)?;
        Ok(buf)
    }

    /// Container size in bytes.
    pub fn container_size(&self) -> Result<u64, LocatorError> {
        std::fs::metadata(&self.container_path)
            .map(|m| m.len())
            .map_err(|source| LocatorError::Io {
                path: self.container_path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unpacker::{DbRootInfo, PacketType};
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct NoopUnpacker;

    impl Unpacker for NoopUnpacker {
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

    #[test]
    fn test_read_exact_range() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"0123456789abcdef").unwrap();

        let locator = PackfileLocator::new(file.path(), Box::new(NoopUnpacker));
        let data = locator.read(FileLoc::new(0, 4, 6)).unwrap();
        assert_eq!(&data, b"456789");
    }

    #[test]
    fn test_read_past_end_is_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"short").unwrap();

        let locator = PackfileLocator::new(file.path(), Box::new(NoopUnpacker));
        assert!(locator.read(FileLoc::new(0, 0, 64)).is_err());
    }

    #[test]
    fn test_read_trailer_from_end() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"payload....VERSION-1CRC!").unwrap();

        let locator = PackfileLocator::new(file.path(), Box::new(NoopUnpacker));
        let crc = locator.read_trailer(4, 4).unwrap();
        assert_eq!(&crc, b"CRC!");

        let version = locator.read_trailer(13, 9).unwrap();
        assert_eq!(&version, b"VERSION-1");
    }

    #[test]
    fn test_missing_container_is_error() {
        let locator = PackfileLocator::new("/nonexistent/globe.glb", Box::new(NoopUnpacker));
        assert!(locator.read(FileLoc::new(0, 0, 1)).is_err());
        assert!(locator.container_size().is_err());
    }
}
