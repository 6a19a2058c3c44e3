//! Globe container handling
//!
//! A [`GlobeHandle`] owns one opened globe container and exposes the typed
//! read operations the tile server is built on. Containers come in four
//! kinds: `.glb` (3D single-layer), `.glm` (2D single-layer), `.glc`
//! (composite multi-layer) and `.mbt` (SQLite tile database).

mod descriptor;
mod error;
mod handle;
mod layer_map;
mod mbtiles;

pub use descriptor::{ContainerKind, GlobeDescriptor};
pub use error::GlobeError;
pub use handle::{GlobeHandle, CRC_OFFSET, CRC_SIZE, VERSION_OFFSET, VERSION_SIZE};
pub use layer_map::{clean_server_defs, LayerBaseMap};
pub use mbtiles::{flip_row, MbtilesReader};
