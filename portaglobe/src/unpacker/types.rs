//! Unpacker boundary types

use std::path::PathBuf;
use thiserror::Error;

/// Kinds of packet addressable in a globe package index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Dbroot header stored as a quadtree packet (newer packages)
    DbRoot,
    /// Quadtree index packet
    Qtp,
    /// Imagery packet
    Image,
    /// Terrain packet
    Terrain,
    /// Vector packet
    Vector,
}

/// Location of an entry within the container file.
///
/// The package format stores the 64-bit offset as two 32-bit words; sizes
/// of individual entries always fit in 32 bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileLoc {
    pub high_offset: u32,
    pub low_offset: u32,
    pub low_size: u32,
}

impl FileLoc {
    pub fn new(high_offset: u32, low_offset: u32, low_size: u32) -> Self {
        Self {
            high_offset,
            low_offset,
            low_size,
        }
    }

    /// Reconstructs the full byte offset from the stored halves.
    ///
    /// Entries past 4 GiB are routine in large globes; truncating here
    /// silently corrupts reads, so the widening happens before the shift.
    pub fn offset(&self) -> u64 {
        ((self.high_offset as u64 & 0xffff_ffff) << 32) | (self.low_offset as u64 & 0xffff_ffff)
    }

    /// Entry size in bytes.
    pub fn size(&self) -> u64 {
        self.low_size as u64
    }
}

/// Facts parsed from a 3D package's dbroot header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DbRootInfo {
    /// Package carries imagery packets
    pub has_imagery: bool,
    /// Package carries terrain packets
    pub has_terrain: bool,
    /// Dbroot is in protobuf format rather than the ETA text format
    pub is_proto_imagery: bool,
}

/// Failure to open a container for unpacking.
#[derive(Debug, Error)]
pub enum UnpackerOpenError {
    /// Container file missing or unreadable
    #[error("cannot open container {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Container did not parse as a globe package
    #[error("container {0} is not a readable globe package")]
    BadPackage(PathBuf),

    /// No package decoder is bound in this deployment
    #[error("no package decoder bound; cannot open {0}")]
    NoDecoder(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_reconstruction_zero_high() {
        let loc = FileLoc::new(0, 0xffff_ffff, 16);
        assert_eq!(loc.offset(), 0xffff_ffff);
    }

    #[test]
    fn test_offset_reconstruction_high_word() {
        let loc = FileLoc::new(1, 0, 16);
        assert_eq!(loc.offset(), 0x1_0000_0000);
    }

    #[test]
    fn test_offset_matches_little_endian_assembly() {
        // The two halves are the low and high words of one 64-bit value.
        for (high, low) in [(0u32, 0u32), (0, 0xffff_ffff), (1, 0), (0xdead, 0xbeef_cafe)] {
            let loc = FileLoc::new(high, low, 0);
            let mut bytes = [0u8; 8];
            bytes[..4].copy_from_slice(&low.to_le_bytes());
            bytes[4..].copy_from_slice(&high.to_le_bytes());
            assert_eq!(loc.offset(), u64::from_le_bytes(bytes));
        }
    }

    #[test]
    fn test_size_widens_low_size() {
        let loc = FileLoc::new(0, 0, u32::MAX);
        assert_eq!(loc.size(), u32::MAX as u64);
    }
}
