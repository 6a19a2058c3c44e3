//! Container kind detection and derived globe facts.

use crate::unpacker::{DbRootInfo, Unpacker};
use std::path::Path;

/// The closed set of globe container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Single-layer 3D globe package
    Glb,
    /// Single-layer 2D map package
    Glm,
    /// Composite multi-layer package
    Glc,
    /// SQLite tile database
    Mbt,
}

impl ContainerKind {
    /// Detects the kind from a file extension; `None` for anything else.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("glb") => Some(ContainerKind::Glb),
            Some("glm") => Some(ContainerKind::Glm),
            Some("glc") => Some(ContainerKind::Glc),
            Some("mbt") => Some(ContainerKind::Mbt),
            _ => None,
        }
    }

    pub fn is_composite(self) -> bool {
        matches!(self, ContainerKind::Glc)
    }

    pub fn is_mbtiles(self) -> bool {
        matches!(self, ContainerKind::Mbt)
    }
}

/// Read-only facts about an open container, computed once at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobeDescriptor {
    pub kind: ContainerKind,
    pub is_2d: bool,
    pub is_3d: bool,
    pub is_composite: bool,
    pub is_mbtiles: bool,
    /// Container passed the package signature check
    pub is_gee: bool,
    pub has_imagery: bool,
    pub has_terrain: bool,
    pub is_proto_imagery: bool,
}

impl GlobeDescriptor {
    /// Describes a package-backed container, consulting the unpacker for
    /// composite dimensionality and (for 3D) the dbroot header facts.
    pub fn for_package(kind: ContainerKind, unpacker: &dyn Unpacker) -> Self {
        let (is_2d, is_3d) = match kind {
            ContainerKind::Glb => (false, true),
            ContainerKind::Glm => (true, false),
            ContainerKind::Glc => (unpacker.is_2d(), unpacker.is_3d()),
            ContainerKind::Mbt => unreachable!("mbtiles containers have no unpacker"),
        };

        let dbroot = if is_3d {
            unpacker.dbroot_info()
        } else {
            DbRootInfo::default()
        };

        GlobeDescriptor {
            kind,
            is_2d,
            is_3d,
            is_composite: kind.is_composite(),
            is_mbtiles: false,
            is_gee: unpacker.is_gee(),
            has_imagery: dbroot.has_imagery,
            has_terrain: dbroot.has_terrain,
            is_proto_imagery: dbroot.is_proto_imagery,
        }
    }

    /// Describes an mbtiles container (always 2D, never composite).
    pub fn for_mbtiles() -> Self {
        GlobeDescriptor {
            kind: ContainerKind::Mbt,
            is_2d: true,
            is_3d: false,
            is_composite: false,
            is_mbtiles: true,
            is_gee: false,
            has_imagery: false,
            has_terrain: false,
            is_proto_imagery: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unpacker::FileLoc;
    use crate::unpacker::PacketType;
    use std::path::PathBuf;

    struct FixedUnpacker {
        is_2d: bool,
        is_3d: bool,
        dbroot: DbRootInfo,
    }

    impl Unpacker for FixedUnpacker {
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
            self.is_2d
        }
        fn is_3d(&self) -> bool {
            self.is_3d
        }
        fn dbroot_info(&self) -> DbRootInfo {
            self.dbroot
        }
    }

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(
            ContainerKind::from_path(&PathBuf::from("/g/sf.glb")),
            Some(ContainerKind::Glb)
        );
        assert_eq!(
            ContainerKind::from_path(&PathBuf::from("sf.glm")),
            Some(ContainerKind::Glm)
        );
        assert_eq!(
            ContainerKind::from_path(&PathBuf::from("sf.glc")),
            Some(ContainerKind::Glc)
        );
        assert_eq!(
            ContainerKind::from_path(&PathBuf::from("sf.mbt")),
            Some(ContainerKind::Mbt)
        );
        assert_eq!(ContainerKind::from_path(&PathBuf::from("sf.zip")), None);
        assert_eq!(ContainerKind::from_path(&PathBuf::from("globe")), None);
    }

    #[test]
    fn test_glb_is_3d_only() {
        let unpacker = FixedUnpacker {
            is_2d: false,
            is_3d: false, // ignored for non-composite kinds
            dbroot: DbRootInfo {
                has_imagery: true,
                has_terrain: true,
                is_proto_imagery: false,
            },
        };
        let desc = GlobeDescriptor::for_package(ContainerKind::Glb, &unpacker);
        assert!(desc.is_3d && !desc.is_2d);
        assert!(!desc.is_composite && !desc.is_mbtiles);
        assert!(desc.has_imagery && desc.has_terrain);
    }

    #[test]
    fn test_glm_is_2d_only() {
        let unpacker = FixedUnpacker {
            is_2d: false,
            is_3d: true,
            dbroot: DbRootInfo::default(),
        };
        let desc = GlobeDescriptor::for_package(ContainerKind::Glm, &unpacker);
        assert!(desc.is_2d && !desc.is_3d);
        // 2D packages never parse a dbroot header.
        assert!(!desc.has_imagery && !desc.has_terrain);
    }

    #[test]
    fn test_glc_dimensionality_comes_from_unpacker() {
        let unpacker = FixedUnpacker {
            is_2d: true,
            is_3d: false,
            dbroot: DbRootInfo::default(),
        };
        let desc = GlobeDescriptor::for_package(ContainerKind::Glc, &unpacker);
        assert!(desc.is_composite);
        assert!(desc.is_2d && !desc.is_3d);
    }

    #[test]
    fn test_mbtiles_descriptor_invariants() {
        let desc = GlobeDescriptor::for_mbtiles();
        assert_eq!(desc.kind, ContainerKind::Mbt);
        assert!(desc.is_mbtiles && desc.is_2d);
        assert!(!desc.is_composite && !desc.is_3d);
    }

    #[test]
    fn test_exactly_one_dimensionality_for_simple_kinds() {
        for kind in [ContainerKind::Glb, ContainerKind::Glm] {
            let unpacker = FixedUnpacker {
                is_2d: true,
                is_3d: true,
                dbroot: DbRootInfo::default(),
            };
            let desc = GlobeDescriptor::for_package(kind, &unpacker);
            assert!(desc.is_2d ^ desc.is_3d);
        }
    }
}
