//! Publish domain types.

use super::error::PublishError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of publishable database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbType {
    /// Fusion 3D (GE) database
    Ge,
    /// Fusion 2D map database
    Map,
    /// Portable 3D globe
    Glb,
    /// Portable 2D map
    Glm,
    /// Portable composite
    Glc,
}

impl DbType {
    /// Fusion databases are identified by (client host, assetroot path)
    /// and require a push before publishing.
    pub fn is_fusion(self) -> bool {
        matches!(self, DbType::Ge | DbType::Map)
    }

    /// Portable globes are identified by file path alone.
    pub fn is_portable(self) -> bool {
        !self.is_fusion()
    }

    /// Wire name used in catalog rows and rewrite rules.
    pub fn as_str(self) -> &'static str {
        match self {
            DbType::Ge => "ge",
            DbType::Map => "map",
            DbType::Glb => "glb",
            DbType::Glm => "glm",
            DbType::Glc => "glc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ge" => Some(DbType::Ge),
            "map" => Some(DbType::Map),
            "glb" => Some(DbType::Glb),
            "glm" => Some(DbType::Glm),
            "glc" => Some(DbType::Glc),
            _ => None,
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a database name and normalizes it.
///
/// Fusion databases end in a `gedb`/`mapdb` directory; portable globes
/// carry their container extension. Anything else is unsupported.
pub fn identify_published_db(db_name: &str) -> Result<(String, DbType), PublishError> {
    let normalized = db_name.trim().trim_end_matches('/').to_string();

    let db_type = if normalized.ends_with(".glb") {
        DbType::Glb
    } else if normalized.ends_with(".glm") {
        DbType::Glm
    } else if normalized.ends_with(".glc") {
        DbType::Glc
    } else if normalized.ends_with("/gedb") || normalized == "gedb" {
        DbType::Ge
    } else if normalized.ends_with("/mapdb") || normalized == "mapdb" {
        DbType::Map
    } else {
        return Err(PublishError::UnsupportedDbType(db_name.to_string()));
    };

    Ok((normalized, db_type))
}

/// Normalizes a target path to the `/sub_path1[/sub_path2]` form.
///
/// Returns `None` when no path remains after trimming (a bare `/` or
/// empty input).
pub fn normalize_target_path(target_path: &str) -> Option<String> {
    let trimmed = target_path.trim().trim_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    Some(format!("/{}", trimmed))
}

/// Per-target publish configuration carried in the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishContext {
    pub snippets_set_name: Option<String>,
    pub search_def_names: Vec<String>,
    pub supplemental_search_def_names: Vec<String>,
    pub poi_federated: bool,
    /// Serve this database to Earth Clients that specify none.
    /// At most one target catalog-wide may carry this flag.
    pub ec_default_db: bool,
}

impl PublishContext {
    /// Whether the POI search service is among the configured search tabs.
    pub fn has_poi_search(&self) -> bool {
        self.search_def_names.iter().any(|n| n == "POISearch")
    }
}

/// The full set of parameters for one publish operation.
#[derive(Debug, Clone)]
pub struct PublishDef {
    /// Normalized target path (leading slash, no trailing slash)
    pub target_path: String,
    pub virtual_host_name: String,
    /// Normalized database name (assetroot path or globe path)
    pub db_name: String,
    /// Fusion client host; empty for portable globes
    pub client_host_name: String,
    pub db_type: DbType,
    pub serve_wms: bool,
    pub context: PublishContext,
}

/// Everything known about a published target, as returned by target
/// detail queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDetails {
    pub target_path: String,
    pub virtual_host_name: String,
    pub db_name: String,
    pub client_host_name: String,
    pub serve_wms: bool,
    /// Absent for targets published before publish contexts existed.
    pub publish_context: Option<PublishContext>,
}
