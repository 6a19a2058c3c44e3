//! The globe handle: one opened container and its typed read operations.

use super::descriptor::{ContainerKind, GlobeDescriptor};
use super::error::GlobeError;
use super::layer_map::LayerBaseMap;
use super::mbtiles::MbtilesReader;
use crate::locator::PackfileLocator;
use crate::quadtree::QtNode;
use crate::unpacker::{FileLoc, PacketType, UnpackerFactory};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Package trailer layout: an 8-byte version string followed by a 4-byte
/// CRC at the very end of the container.
pub const VERSION_OFFSET: u64 = 12;
pub const VERSION_SIZE: usize = 8;
pub const CRC_OFFSET: u64 = 4;
pub const CRC_SIZE: usize = 4;

/// Path of the embedded server definitions in 2D packages.
const MAP_JSON_PATH: &str = "maps/map.json";

/// Quadtree channel carrying terrain packets, by format convention.
const TERRAIN_CHANNEL: u32 = 1;

enum Store {
    Pack(PackfileLocator),
    Tiles(MbtilesReader),
}

/// An opened globe container.
///
/// A handle is immutable once opened: switching globes means opening a new
/// handle, not mutating this one. Handles are shared across request
/// handlers behind an `Arc` (see `server::GlobeSessions`).
pub struct GlobeHandle {
    path: PathBuf,
    descriptor: GlobeDescriptor,
    layer_map: LayerBaseMap,
    store: Store,
}

impl std::fmt::Debug for GlobeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobeHandle")
            .field("path", &self.path)
            .field("descriptor", &self.descriptor)
            .field("layer_map", &self.layer_map)
            .finish_non_exhaustive()
    }
}

impl GlobeHandle {
    /// Opens the container at `path` for serving.
    ///
    /// Dispatches on the file extension: `.glb`/`.glm` open as simple
    /// packages, `.glc` as composite, `.mbt` as a SQLite tile database.
    ///
    /// # Errors
    ///
    /// [`GlobeError::UnknownFileType`] for unrecognized extensions and
    /// [`GlobeError::Unreadable`] when the file is missing or fails the
    /// package check.
    pub fn open(path: &Path, factory: &dyn UnpackerFactory) -> Result<Self, GlobeError> {
        Self::open_inner(path, factory, false)
    }

    /// Opens the container restricted to its top-level files.
    ///
    /// Used by admin tooling that reads package metadata without paying
    /// for the full packet index.
    pub fn open_files_only(path: &Path, factory: &dyn UnpackerFactory) -> Result<Self, GlobeError> {
        Self::open_inner(path, factory, true)
    }

    fn open_inner(
        path: &Path,
        factory: &dyn UnpackerFactory,
        files_only: bool,
    ) -> Result<Self, GlobeError> {
        if !path.exists() {
            return Err(GlobeError::unreadable(path, "no such file"));
        }

        let kind = ContainerKind::from_path(path)
            .ok_or_else(|| GlobeError::UnknownFileType(path.to_path_buf()))?;

        if kind == ContainerKind::Mbt {
            let reader = MbtilesReader::open(path)?;
            debug!(path = %path.display(), "serving mbtiles container");
            return Ok(GlobeHandle {
                path: path.to_path_buf(),
                descriptor: GlobeDescriptor::for_mbtiles(),
                layer_map: LayerBaseMap::empty(),
                store: Store::Tiles(reader),
            });
        }

        let unpacker = factory
            .open(path, kind.is_composite(), files_only)
            .map_err(|e| GlobeError::unreadable(path, e))?;
        let descriptor = GlobeDescriptor::for_package(kind, unpacker.as_ref());
        let locator = PackfileLocator::new(path, unpacker);

        let mut handle = GlobeHandle {
            path: path.to_path_buf(),
            descriptor,
            layer_map: LayerBaseMap::empty(),
            store: Store::Pack(locator),
        };

        // 2D packages embed their layer table in the server definitions.
        if descriptor.is_2d {
            match handle.read_file(MAP_JSON_PATH) {
                Ok(json) => match LayerBaseMap::from_server_defs(&String::from_utf8_lossy(&json)) {
                    Ok(map) => handle.layer_map = map,
                    Err(e) => warn!(path = %path.display(), error = %e, "undecodable server defs"),
                },
                Err(e) if e.is_not_found() => {
                    warn!(path = %path.display(), "2D package has no {}", MAP_JSON_PATH)
                }
                Err(e) => return Err(e),
            }
        }

        debug!(path = %path.display(), kind = ?kind, "serving globe");
        Ok(handle)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the container, e.g. `sf.glb`.
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Container name without its extension.
    pub fn short_name(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn descriptor(&self) -> &GlobeDescriptor {
        &self.descriptor
    }

    /// Whether `(layer_id, channel)` renders "no data" tiles when packets
    /// are missing. Unknown combinations degrade to `false`.
    pub fn is_base_layer(&self, layer_id: u32, channel: u32) -> bool {
        self.layer_map.is_base_layer(layer_id, channel)
    }

    fn locator(&self) -> Result<&PackfileLocator, GlobeError> {
        match &self.store {
            Store::Pack(locator) => Ok(locator),
            Store::Tiles(_) => Err(GlobeError::unreadable(
                &self.path,
                "no package index (mbtiles container)",
            )),
        }
    }

    fn read_located(&self, loc: Option<FileLoc>, what: &str) -> Result<Vec<u8>, GlobeError> {
        let locator = self.locator()?;
        match loc {
            Some(loc) => locator
                .read(loc)
                .map_err(|e| GlobeError::unreadable(&self.path, e)),
            None => Err(GlobeError::NotFound(what.to_string())),
        }
    }

    /// Whether a top-level file exists in the package.
    pub fn file_exists(&self, relative_path: &str) -> bool {
        match &self.store {
            Store::Pack(locator) => locator.unpacker().find_file(relative_path).is_some(),
            Store::Tiles(_) => false,
        }
    }

    /// Reads a top-level file from the package.
    pub fn read_file(&self, relative_path: &str) -> Result<Vec<u8>, GlobeError> {
        let loc = self.locator()?.unpacker().find_file(relative_path);
        self.read_located(loc, relative_path)
    }

    /// Reads a file from a composite sub-layer.
    pub fn read_layer_file(&self, relative_path: &str, layer_id: u32) -> Result<Vec<u8>, GlobeError> {
        let loc = self
            .locator()?
            .unpacker()
            .find_layer_file(relative_path, layer_id);
        self.read_located(loc, relative_path)
    }

    /// Reads the meta dbroot of a composite 3D package.
    pub fn read_meta_dbroot(&self) -> Result<Vec<u8>, GlobeError> {
        let loc = self.locator()?.unpacker().find_meta_dbroot();
        self.read_located(loc, "meta dbroot")
    }

    /// Reads a layer's dbroot.
    ///
    /// Older packages store the dbroot as a plain layer file; newer ones
    /// store it as the root quadtree packet. Both locations are probed,
    /// file first.
    pub fn read_dbroot(&self, path: &str, layer_id: u32) -> Result<Vec<u8>, GlobeError> {
        let unpacker = self.locator()?.unpacker();
        if let Some(loc) = unpacker.find_layer_file(path, layer_id) {
            return self.read_located(Some(loc), path);
        }
        let loc = unpacker.find_qtp_packet("0", PacketType::DbRoot, 0, layer_id);
        self.read_located(loc, "dbroot")
    }

    /// Reads the quadtree index packet at `qtnode`.
    pub fn read_qt_packet(&self, qtnode: &QtNode, layer_id: u32) -> Result<Vec<u8>, GlobeError> {
        let loc =
            self.locator()?
                .unpacker()
                .find_qtp_packet(qtnode.as_str(), PacketType::Qtp, 0, layer_id);
        self.read_located(loc, &format!("quadtree packet {}", qtnode))
    }

    /// Reads a 3D data packet at `qtnode`.
    pub fn read_data_packet(
        &self,
        qtnode: &QtNode,
        packet_type: PacketType,
        channel: u32,
        layer_id: u32,
    ) -> Result<Vec<u8>, GlobeError> {
        let loc = self.locator()?.unpacker().find_data_packet(
            qtnode.as_str(),
            packet_type,
            channel,
            layer_id,
        );
        self.read_located(loc, &format!("packet {}", qtnode))
    }

    /// Reads the imagery packet at `qtnode` (channel 0).
    pub fn read_imagery_packet(&self, qtnode: &QtNode, layer_id: u32) -> Result<Vec<u8>, GlobeError> {
        self.read_data_packet(qtnode, PacketType::Image, 0, layer_id)
    }

    /// Reads the terrain packet at `qtnode`.
    pub fn read_terrain_packet(&self, qtnode: &QtNode, layer_id: u32) -> Result<Vec<u8>, GlobeError> {
        self.read_data_packet(qtnode, PacketType::Terrain, TERRAIN_CHANNEL, layer_id)
    }

    /// Reads the vector packet at `qtnode` on `channel`.
    pub fn read_vector_packet(
        &self,
        qtnode: &QtNode,
        channel: u32,
        layer_id: u32,
    ) -> Result<Vec<u8>, GlobeError> {
        self.read_data_packet(qtnode, PacketType::Vector, channel, layer_id)
    }

    /// Reads a 2D map data packet at `qtnode`.
    pub fn read_map_data_packet(
        &self,
        qtnode: &QtNode,
        packet_type: PacketType,
        channel: u32,
        layer_id: u32,
    ) -> Result<Vec<u8>, GlobeError> {
        let loc = self.locator()?.unpacker().find_map_data_packet(
            qtnode.as_str(),
            packet_type,
            channel,
            layer_id,
        );
        self.read_located(loc, &format!("map packet {}", qtnode))
    }

    /// Reads the map imagery packet at `qtnode` on `channel`.
    pub fn read_map_imagery_packet(
        &self,
        qtnode: &QtNode,
        channel: u32,
        layer_id: u32,
    ) -> Result<Vec<u8>, GlobeError> {
        self.read_map_data_packet(qtnode, PacketType::Image, channel, layer_id)
    }

    /// Reads the map vector packet at `qtnode` on `channel`.
    pub fn read_map_vector_packet(
        &self,
        qtnode: &QtNode,
        channel: u32,
        layer_id: u32,
    ) -> Result<Vec<u8>, GlobeError> {
        self.read_map_data_packet(qtnode, PacketType::Vector, channel, layer_id)
    }

    /// Reads a tile from an mbtiles container at web-map `(x, y, zoom)`.
    pub fn read_map_imagery_tile(&self, x: u32, y: u32, zoom: u8) -> Result<Vec<u8>, GlobeError> {
        match &self.store {
            Store::Tiles(reader) => reader.read_tile(x, y, zoom),
            Store::Pack(_) => Err(GlobeError::NotTileDatabase(self.path.clone())),
        }
    }

    /// All entry paths in the package's internal index.
    pub fn index_files(&self) -> Vec<String> {
        match &self.store {
            Store::Pack(locator) => {
                let unpacker = locator.unpacker();
                (0..unpacker.index_size())
                    .filter_map(|i| unpacker.index_file(i))
                    .collect()
            }
            Store::Tiles(_) => Vec::new(),
        }
    }

    /// Format version string from the package trailer.
    pub fn version(&self) -> Result<String, GlobeError> {
        let bytes = self
            .locator()?
            .read_trailer(VERSION_OFFSET, VERSION_SIZE)
            .map_err(|e| GlobeError::unreadable(&self.path, e))?;
        Ok(String::from_utf8_lossy(&bytes).trim_end_matches('\0').to_string())
    }

    /// Stored CRC word from the package trailer.
    pub fn crc(&self) -> Result<[u8; CRC_SIZE], GlobeError> {
        let bytes = self
            .locator()?
            .read_trailer(CRC_OFFSET, CRC_SIZE)
            .map_err(|e| GlobeError::unreadable(&self.path, e))?;
        let mut crc = [0u8; CRC_SIZE];
        crc.copy_from_slice(&bytes);
        Ok(crc)
    }

    /// Recomputes the trailer CRC: the XOR fold of every 4-byte word in
    /// the container up to (excluding) the stored CRC word.
    pub fn calculate_crc(&self) -> Result<[u8; CRC_SIZE], GlobeError> {
        let locator = self.locator()?;
        let size = locator
            .container_size()
            .map_err(|e| GlobeError::unreadable(&self.path, e))?;
        let words = (size.saturating_sub(CRC_OFFSET)) / CRC_SIZE as u64;

        let file = std::fs::File::open(&self.path)
            .map_err(|e| GlobeError::unreadable(&self.path, e))?;
        let mut reader = BufReader::new(file);
        let mut crc = [0u8; CRC_SIZE];
        let mut word = [0u8; CRC_SIZE];
        for _ in 0..words {
            reader
                .read_exact(&mut word)
                .map_err(|e| GlobeError::unreadable(&self.path, e))?;
            for j in 0..CRC_SIZE {
                crc[j] ^= word[j];
            }
        }
        Ok(crc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unpacker::{DbRootInfo, UnpackerOpenError};
    use std::collections::HashMap;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    /// Unpacker backed by a map of entries laid out in the test container.
    #[derive(Default)]
    struct FakeUnpacker {
        files: HashMap<String, FileLoc>,
        layer_files: HashMap<(String, u32), FileLoc>,
        qtp_packets: HashMap<(String, PacketType, u32, u32), FileLoc>,
        data_packets: HashMap<(String, PacketType, u32, u32), FileLoc>,
        is_2d: bool,
        is_3d: bool,
    }

    impl crate::unpacker::Unpacker for FakeUnpacker {
        fn find_file(&self, path: &str) -> Option<FileLoc> {
            self.files.get(path).copied()
        }
        fn find_layer_file(&self, path: &str, layer_id: u32) -> Option<FileLoc> {
            self.layer_files.get(&(path.to_string(), layer_id)).copied()
        }
        fn find_meta_dbroot(&self) -> Option<FileLoc> {
            None
        }
        fn find_qtp_packet(
            &self,
            qt: &str,
            pt: PacketType,
            channel: u32,
            layer: u32,
        ) -> Option<FileLoc> {
            self.qtp_packets
                .get(&(qt.to_string(), pt, channel, layer))
                .copied()
        }
        fn find_data_packet(
            &self,
            qt: &str,
            pt: PacketType,
            channel: u32,
            layer: u32,
        ) -> Option<FileLoc> {
            self.data_packets
                .get(&(qt.to_string(), pt, channel, layer))
                .copied()
        }
        fn find_map_data_packet(
            &self,
            qt: &str,
            pt: PacketType,
            channel: u32,
            layer: u32,
        ) -> Option<FileLoc> {
            self.find_data_packet(qt, pt, channel, layer)
        }
        fn index_size(&self) -> usize {
            self.files.len()
        }
        fn index_file(&self, idx: usize) -> Option<String> {
            let mut names: Vec<_> = self.files.keys().cloned().collect();
            names.sort();
            names.get(idx).cloned()
        }
        fn is_gee(&self) -> bool {
            true
        }
        fn is_2d(&self) -> bool {
            self.is_2d
        }
        fn is_3d(&self) -> bool {
            self.is_3d
        }
        fn dbroot_info(&self) -> DbRootInfo {
            DbRootInfo {
                has_imagery: true,
                has_terrain: false,
                is_proto_imagery: true,
            }
        }
    }

    /// Builds a container file from (name, bytes) entries and the matching
    /// fake unpacker index.
    struct FakeFactory {
        unpackers: std::sync::Mutex<HashMap<PathBuf, FakeUnpacker>>,
    }

    impl FakeFactory {
        fn new() -> Self {
            Self {
                unpackers: std::sync::Mutex::new(HashMap::new()),
            }
        }

        fn insert(&self, path: &Path, unpacker: FakeUnpacker) {
            self.unpackers
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), unpacker);
        }
    }

    impl UnpackerFactory for FakeFactory {
        fn open(
            &self,
            path: &Path,
            _composite: bool,
            _files_only: bool,
        ) -> Result<Box<dyn crate::unpacker::Unpacker>, UnpackerOpenError> {
            let mut map = self.unpackers.lock().unwrap();
            map.remove(path)
                .map(|u| Box::new(u) as Box<dyn crate::unpacker::Unpacker>)
                .ok_or_else(|| UnpackerOpenError::BadPackage(path.to_path_buf()))
        }
    }

    /// Writes `entries` back to back into `path` and returns their locs.
    fn write_container(path: &Path, entries: &[&[u8]]) -> Vec<FileLoc> {
        let mut file = fs::File::create(path).unwrap();
        let mut locs = Vec::new();
        let mut offset = 0u64;
        for data in entries {
            file.write_all(data).unwrap();
            locs.push(FileLoc::new(
                (offset >> 32) as u32,
                (offset & 0xffff_ffff) as u32,
                data.len() as u32,
            ));
            offset += data.len() as u64;
        }
        locs
    }

    #[test]
    fn test_open_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("globe.zip");
        fs::write(&path, b"data").unwrap();

        let factory = FakeFactory::new();
        let err = GlobeHandle::open(&path, &factory).unwrap_err();
        assert!(matches!(err, GlobeError::UnknownFileType(_)));
    }

    #[test]
    fn test_open_missing_file() {
        let factory = FakeFactory::new();
        let err = GlobeHandle::open(Path::new("/nonexistent/sf.glb"), &factory).unwrap_err();
        assert!(matches!(err, GlobeError::Unreadable { .. }));
    }

    #[test]
    fn test_read_file_and_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sf.glb");
        let locs = write_container(&path, &[b"hello dbroot", b"imagery!"]);

        let mut unpacker = FakeUnpacker {
            is_3d: true,
            ..Default::default()
        };
        unpacker.files.insert("earth/info.txt".to_string(), locs[0]);

        let factory = FakeFactory::new();
        factory.insert(&path, unpacker);

        let handle = GlobeHandle::open(&path, &factory).unwrap();
        assert_eq!(handle.name(), "sf.glb");
        assert_eq!(handle.short_name(), "sf");
        assert!(handle.file_exists("earth/info.txt"));
        assert_eq!(handle.read_file("earth/info.txt").unwrap(), b"hello dbroot");

        let err = handle.read_file("missing.txt").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_imagery_packet_not_found_is_not_found_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sf.glb");
        write_container(&path, &[b"x"]);

        let factory = FakeFactory::new();
        factory.insert(
            &path,
            FakeUnpacker {
                is_3d: true,
                ..Default::default()
            },
        );

        let handle = GlobeHandle::open(&path, &factory).unwrap();
        let qtnode = QtNode::parse("0123").unwrap();
        let err = handle.read_imagery_packet(&qtnode, 0).unwrap_err();
        assert!(err.is_not_found(), "expected NotFound, got {:?}", err);
    }

    #[test]
    fn test_terrain_packet_uses_channel_one() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sf.glb");
        let locs = write_container(&path, &[b"terrain-bytes"]);

        let mut unpacker = FakeUnpacker {
            is_3d: true,
            ..Default::default()
        };
        unpacker
            .data_packets
            .insert(("02".to_string(), PacketType::Terrain, 1, 0), locs[0]);

        let factory = FakeFactory::new();
        factory.insert(&path, unpacker);

        let handle = GlobeHandle::open(&path, &factory).unwrap();
        let qtnode = QtNode::parse("02").unwrap();
        assert_eq!(handle.read_terrain_packet(&qtnode, 0).unwrap(), b"terrain-bytes");
    }

    #[test]
    fn test_dbroot_two_tier_fallback() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sf.glb");
        let locs = write_container(&path, &[b"dbroot-as-packet"]);

        // No layer file; dbroot only exists as the root quadtree packet.
        let mut unpacker = FakeUnpacker {
            is_3d: true,
            ..Default::default()
        };
        unpacker.qtp_packets.insert(
            ("0".to_string(), PacketType::DbRoot, 0, 0),
            locs[0],
        );

        let factory = FakeFactory::new();
        factory.insert(&path, unpacker);

        let handle = GlobeHandle::open(&path, &factory).unwrap();
        assert_eq!(
            handle.read_dbroot("dbroot.v5", 0).unwrap(),
            b"dbroot-as-packet"
        );
    }

    #[test]
    fn test_dbroot_prefers_layer_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sf.glb");
        let locs = write_container(&path, &[b"dbroot-as-file", b"dbroot-as-packet"]);

        let mut unpacker = FakeUnpacker {
            is_3d: true,
            ..Default::default()
        };
        unpacker
            .layer_files
            .insert(("dbroot.v5".to_string(), 0), locs[0]);
        unpacker.qtp_packets.insert(
            ("0".to_string(), PacketType::DbRoot, 0, 0),
            locs[1],
        );

        let factory = FakeFactory::new();
        factory.insert(&path, unpacker);

        let handle = GlobeHandle::open(&path, &factory).unwrap();
        assert_eq!(handle.read_dbroot("dbroot.v5", 0).unwrap(), b"dbroot-as-file");
    }

    #[test]
    fn test_glm_loads_layer_map_from_map_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("city.glm");
        let map_json = br#"{"layers": [{"id": 1001, "glm_id": 0, "non_base_layer": false}]}"#;
        let locs = write_container(&path, &[map_json]);

        let mut unpacker = FakeUnpacker {
            is_2d: true,
            ..Default::default()
        };
        unpacker.files.insert(MAP_JSON_PATH.to_string(), locs[0]);

        let factory = FakeFactory::new();
        factory.insert(&path, unpacker);

        let handle = GlobeHandle::open(&path, &factory).unwrap();
        assert!(handle.descriptor().is_2d);
        assert!(handle.is_base_layer(0, 1001));
        assert!(!handle.is_base_layer(0, 9999));
    }

    #[test]
    fn test_mbtiles_round_trip_and_pack_ops_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("map.mbt");
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute(
                "CREATE TABLE tiles (zoom_level INTEGER, tile_column INTEGER, \
                 tile_row INTEGER, tile_data BLOB)",
                (),
            )
            .unwrap();
            conn.execute(
                "INSERT INTO tiles VALUES (3, 4, 5, X'AABB')",
                (),
            )
            .unwrap();
        }

        let factory = FakeFactory::new();
        let handle = GlobeHandle::open(&path, &factory).unwrap();
        assert!(handle.descriptor().is_mbtiles);
        assert_eq!(handle.read_map_imagery_tile(4, 2, 3).unwrap(), vec![0xaa, 0xbb]);
        assert!(handle.read_file("anything").is_err());
        assert!(handle.index_files().is_empty());
    }

    #[test]
    fn test_tile_read_on_package_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sf.glb");
        write_container(&path, &[b"x"]);

        let factory = FakeFactory::new();
        factory.insert(
            &path,
            FakeUnpacker {
                is_3d: true,
                ..Default::default()
            },
        );

        let handle = GlobeHandle::open(&path, &factory).unwrap();
        assert!(matches!(
            handle.read_map_imagery_tile(0, 0, 0),
            Err(GlobeError::NotTileDatabase(_))
        ));
    }

    #[test]
    fn test_version_and_crc_trailer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sf.glb");
        // 4 words of payload, an 8-byte version, then the CRC word.
        let payload = b"abcdwxyz";
        let version = b"5.1.3\0\0\0";
        let mut crc = [0u8; 4];
        for word in payload.chunks(4).chain(version.chunks(4)) {
            for j in 0..4 {
                crc[j] ^= word[j];
            }
        }
        let mut contents = Vec::new();
        contents.extend_from_slice(payload);
        contents.extend_from_slice(version);
        contents.extend_from_slice(&crc);
        fs::write(&path, &contents).unwrap();

        let factory = FakeFactory::new();
        factory.insert(
            &path,
            FakeUnpacker {
                is_3d: true,
                ..Default::default()
            },
        );

        let handle = GlobeHandle::open(&path, &factory).unwrap();
        assert_eq!(handle.version().unwrap(), "5.1.3");
        assert_eq!(handle.crc().unwrap(), crc);
        assert_eq!(handle.calculate_crc().unwrap(), crc);
    }
}
