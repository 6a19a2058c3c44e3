//! Packfile unpacker capability
//!
//! The native container decoder (the code that parses a package's internal
//! index) is an external collaborator; this module defines the boundary the
//! rest of the crate consumes. An [`Unpacker`] resolves logical addresses
//! (file paths, qtnode/packet-type/channel/layer tuples) to byte locations
//! within the container file, and an [`UnpackerFactory`] opens one for a
//! container at serve time.

mod types;

pub use types::{DbRootInfo, FileLoc, PacketType, UnpackerOpenError};

use std::path::Path;

/// Byte-location lookup into an opened globe package.
///
/// Every `find_*` method returns `Some(loc)` when the entry exists and
/// `None` when it does not. Absence is an expected outcome on hot paths
/// (ancestor-tile probing), never an error.
pub trait Unpacker: Send + Sync {
    /// Locates a top-level file by its path relative to the package root.
    fn find_file(&self, relative_path: &str) -> Option<FileLoc>;

    /// Locates a file within a composite sub-layer.
    fn find_layer_file(&self, relative_path: &str, layer_id: u32) -> Option<FileLoc>;

    /// Locates the meta dbroot of a composite 3D package.
    fn find_meta_dbroot(&self) -> Option<FileLoc>;

    /// Locates a quadtree-index packet.
    fn find_qtp_packet(
        &self,
        qt_path: &str,
        packet_type: PacketType,
        channel: u32,
        layer_id: u32,
    ) -> Option<FileLoc>;

    /// Locates a 3D data packet (imagery, terrain, vector).
    fn find_data_packet(
        &self,
        qt_path: &str,
        packet_type: PacketType,
        channel: u32,
        layer_id: u32,
    ) -> Option<FileLoc>;

    /// Locates a 2D map data packet.
    fn find_map_data_packet(
        &self,
        qt_path: &str,
        packet_type: PacketType,
        channel: u32,
        layer_id: u32,
    ) -> Option<FileLoc>;

    /// Number of entries in the package's internal index.
    fn index_size(&self) -> usize;

    /// Path of the index entry at `idx`, if in range.
    fn index_file(&self, idx: usize) -> Option<String>;

    /// Whether the container passed the package signature check.
    fn is_gee(&self) -> bool;

    /// Whether the package can serve 2D map data.
    fn is_2d(&self) -> bool;

    /// Whether the package can serve 3D globe data.
    fn is_3d(&self) -> bool;

    /// Facts parsed from the dbroot header of a 3D package.
    ///
    /// Meaningful only when [`is_3d`](Unpacker::is_3d) returns true.
    fn dbroot_info(&self) -> DbRootInfo;
}

/// Opens an [`Unpacker`] over a container file.
///
/// The serving layer is wired with whatever factory binds the native
/// decoder; tests substitute a fake.
pub trait UnpackerFactory: Send + Sync {
    /// Opens the container at `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Container file path
    /// * `composite` - Whether to parse the composite (`.glc`) index
    /// * `files_only` - Restrict the index to top-level files (admin
    ///   tooling reads metadata without paying for the full packet index)
    fn open(
        &self,
        path: &Path,
        composite: bool,
        files_only: bool,
    ) -> Result<Box<dyn Unpacker>, UnpackerOpenError>;
}

/// Factory for deployments without a package decoder bound.
///
/// Mbtiles containers still serve (they bypass the unpacker entirely);
/// opening a package container fails with
/// [`UnpackerOpenError::NoDecoder`].
pub struct NoPackageDecoder;

impl UnpackerFactory for NoPackageDecoder {
    fn open(
        &self,
        path: &Path,
        _composite: bool,
        _files_only: bool,
    ) -> Result<Box<dyn Unpacker>, UnpackerOpenError> {
        Err(UnpackerOpenError::NoDecoder(path.to_path_buf()))
    }
}
