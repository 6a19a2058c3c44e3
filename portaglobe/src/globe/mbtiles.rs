//! SQLite-backed tile containers (`.mbt`).
//!
//! Mbtiles stores tiles in TMS row order (row 0 at the south), while tile
//! requests arrive in web map order (row 0 at the north), so every lookup
//! flips the row for the zoom level.

use super::error::GlobeError;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Flips a web-map row into the TMS row stored in the tiles table.
pub fn flip_row(row: u32, zoom: u8) -> u32 {
    (1u32 << zoom) - 1 - row
}

/// Read-only handle on an mbtiles database.
pub struct MbtilesReader {
    path: PathBuf,
    // rusqlite connections are Send but not Sync; the handle is shared
    // across request handlers behind an Arc.
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for MbtilesReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MbtilesReader")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl MbtilesReader {
    /// Opens the tile database read-only.
    pub fn open(path: &Path) -> Result<Self, GlobeError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| GlobeError::unreadable(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the tile at web-map coordinates `(x, y, zoom)`.
    pub fn read_tile(&self, x: u32, y: u32, zoom: u8) -> Result<Vec<u8>, GlobeError> {
        let tms_row = flip_row(y, zoom);
        let conn = self.conn.lock().expect("mbtiles connection poisoned");
        let result: Option<Vec<u8>> = conn
            .query_row(
                "SELECT tile_data FROM tiles \
                 WHERE tile_column = ?1 AND tile_row = ?2 AND zoom_level = ?3",
                (x, tms_row, zoom),
                |row| row.get(0),
            )
            .optional()?;

        result.ok_or_else(|| {
            GlobeError::NotFound(format!("tile ({}, {}) at zoom {}", x, y, zoom))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_tile_db(path: &Path, tiles: &[(u32, u32, u8, &[u8])]) {
        let conn = Connection::open(path).unwrap();
        conn.execute(
            "CREATE TABLE tiles (zoom_level INTEGER, tile_column INTEGER, \
             tile_row INTEGER, tile_data BLOB)",
            (),
        )
        .unwrap();
        for (col, tms_row, zoom, data) in tiles {
            conn.execute(
                "INSERT INTO tiles (zoom_level, tile_column, tile_row, tile_data) \
                 VALUES (?1, ?2, ?3, ?4)",
                (zoom, col, tms_row, *data),
            )
            .unwrap();
        }
    }

    #[test]
    fn test_flip_row() {
        // At zoom 3 web row 2 lands on TMS row 5.
        assert_eq!(flip_row(2, 3), 5);
        assert_eq!(flip_row(0, 0), 0);
        assert_eq!(flip_row(0, 1), 1);
        assert_eq!(flip_row(7, 3), 0);
    }

    #[test]
    fn test_read_tile_applies_row_flip() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("map.mbt");
        // Stored at TMS row 5; requested as web row 2 at zoom 3.
        create_tile_db(&db_path, &[(4, 5, 3, b"tile-bytes")]);

        let reader = MbtilesReader::open(&db_path).unwrap();
        let data = reader.read_tile(4, 2, 3).unwrap();
        assert_eq!(&data, b"tile-bytes");

        // The unflipped row must not resolve.
        let err = reader.read_tile(4, 5, 3).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_missing_tile_is_not_found() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("map.mbt");
        create_tile_db(&db_path, &[]);

        let reader = MbtilesReader::open(&db_path).unwrap();
        let err = reader.read_tile(0, 0, 0).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_open_missing_file_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let err = MbtilesReader::open(&dir.path().join("absent.mbt")).unwrap_err();
        assert!(matches!(err, GlobeError::Unreadable { .. }));
    }
}
