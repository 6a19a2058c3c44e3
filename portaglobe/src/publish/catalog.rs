//! The publish catalog.
//!
//! Relational source of truth for what is published where. Table and
//! field names match the stream-server schema; SQLite provides the
//! storage, and multi-step publish sequences rely on step-ordered
//! compensating actions rather than cross-statement transactions.

use super::error::PublishError;
use super::types::{PublishContext, TargetDetails};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// A dynamic cut specification registered with the serving layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutSpec {
    pub name: String,
    pub qtnodes: String,
    pub exclusion_qtnodes: String,
    pub min_level: u32,
    pub default_level: u32,
    pub max_level: u32,
}

/// A database row from `db_table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbRecord {
    pub db_id: i64,
    pub host_name: String,
    pub db_name: String,
    pub db_pretty_name: String,
    pub db_flags: i64,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS target_table (
    target_id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_path TEXT NOT NULL UNIQUE,
    serve_wms INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS virtual_host_table (
    virtual_host_id INTEGER PRIMARY KEY AUTOINCREMENT,
    virtual_host_name TEXT NOT NULL UNIQUE,
    virtual_host_url TEXT NOT NULL,
    virtual_host_ssl INTEGER NOT NULL DEFAULT 0,
    virtual_host_cache_level INTEGER NOT NULL DEFAULT 2
);
CREATE TABLE IF NOT EXISTS db_table (
    db_id INTEGER PRIMARY KEY AUTOINCREMENT,
    host_name TEXT NOT NULL,
    db_name TEXT NOT NULL,
    db_pretty_name TEXT NOT NULL DEFAULT '',
    db_timestamp TEXT,
    db_size INTEGER NOT NULL DEFAULT 0,
    db_flags INTEGER NOT NULL DEFAULT 0,
    UNIQUE (host_name, db_name)
);
CREATE TABLE IF NOT EXISTS target_db_table (
    target_id INTEGER NOT NULL,
    virtual_host_id INTEGER NOT NULL,
    db_id INTEGER NOT NULL,
    publish_context_id INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS publish_context_table (
    publish_context_id INTEGER PRIMARY KEY AUTOINCREMENT,
    snippets_set_name TEXT,
    search_def_names TEXT,
    supplemental_search_def_names TEXT,
    poifederated INTEGER NOT NULL DEFAULT 0,
    ec_default_db INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS cut_spec_table (
    cut_spec_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    qtnodes TEXT NOT NULL DEFAULT '',
    exclusion_qtnodes TEXT NOT NULL DEFAULT '',
    min_level INTEGER NOT NULL DEFAULT 0,
    default_level INTEGER NOT NULL DEFAULT 0,
    max_level INTEGER NOT NULL DEFAULT 24
);
";

/// Catalog of published targets, virtual hosts and pushed databases.
pub struct PublishCatalog {
    conn: Mutex<Connection>,
}

impl PublishCatalog {
    /// Opens (creating if needed) the catalog database at `path`.
    pub fn open(path: &Path) -> Result<Self, PublishError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory catalog for tests and ephemeral servers.
    pub fn open_in_memory() -> Result<Self, PublishError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("catalog connection poisoned")
    }

    // ---- virtual hosts ----

    /// Registers a virtual host; fails if the name is taken.
    pub fn add_virtual_host(
        &self,
        name: &str,
        url: &str,
        ssl: bool,
        cache_level: u32,
    ) -> Result<(), PublishError> {
        if self.query_virtual_host_id(name)?.is_some() {
            return Err(PublishError::VirtualHostConflict(
                name.to_string(),
                "already exists".to_string(),
            ));
        }
        self.conn().execute(
            "INSERT INTO virtual_host_table (virtual_host_name, virtual_host_url, \
             virtual_host_ssl, virtual_host_cache_level) VALUES (?1, ?2, ?3, ?4)",
            (name, url, ssl, cache_level),
        )?;
        Ok(())
    }

    /// Deletes a virtual host; fails while any target is published on it.
    pub fn delete_virtual_host(&self, name: &str) -> Result<(), PublishError> {
        let in_use: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM virtual_host_table, target_db_table \
                 WHERE virtual_host_table.virtual_host_name = ?1 AND \
                   virtual_host_table.virtual_host_id = target_db_table.virtual_host_id \
                 LIMIT 1",
                (name,),
                |row| row.get(0),
            )
            .optional()?;
        if in_use.is_some() {
            return Err(PublishError::VirtualHostConflict(
                name.to_string(),
                "currently in use".to_string(),
            ));
        }
        self.conn().execute(
            "DELETE FROM virtual_host_table WHERE virtual_host_name = ?1",
            (name,),
        )?;
        Ok(())
    }

    pub fn query_virtual_host_id(&self, name: &str) -> Result<Option<i64>, PublishError> {
        let id = self
            .conn()
            .query_row(
                "SELECT virtual_host_id FROM virtual_host_table \
                 WHERE virtual_host_name = ?1",
                (name,),
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// URL and SSL flag of a virtual host.
    pub fn query_virtual_host(&self, name: &str) -> Result<Option<(String, bool)>, PublishError> {
        let row = self
            .conn()
            .query_row(
                "SELECT virtual_host_url, virtual_host_ssl FROM virtual_host_table \
                 WHERE virtual_host_name = ?1",
                (name,),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    /// URL path components of every registered virtual host.
    pub fn virtual_host_url_paths(&self) -> Result<Vec<String>, PublishError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT virtual_host_url FROM virtual_host_table")?;
        let urls = stmt
            .query_map((), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(urls.iter().map(|u| url_path(u)).collect())
    }

    // ---- databases ----

    /// Registers (pushes) a database, returning its id. Re-pushing an
    /// existing database returns the existing id.
    pub fn register_database(
        &self,
        host_name: &str,
        db_name: &str,
        db_pretty_name: &str,
        db_size: i64,
        db_flags: i64,
    ) -> Result<i64, PublishError> {
        if let Some(id) = self.query_db_id(host_name, db_name)? {
            return Ok(id);
        }
        let conn = self.conn();
        conn.execute(
            "INSERT INTO db_table (host_name, db_name, db_pretty_name, db_timestamp, \
             db_size, db_flags) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                host_name,
                db_name,
                db_pretty_name,
                chrono::Utc::now().to_rfc3339(),
                db_size,
                db_flags,
            ),
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Database id for `(host, name)`; `None` when never pushed.
    pub fn query_db_id(&self, host_name: &str, db_name: &str) -> Result<Option<i64>, PublishError> {
        let id = self
            .conn()
            .query_row(
                "SELECT db_id FROM db_table WHERE host_name = ?1 AND db_name = ?2",
                (host_name, db_name),
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn query_db_and_host(&self, db_id: i64) -> Result<Option<(String, String)>, PublishError> {
        let row = self
            .conn()
            .query_row(
                "SELECT db_name, host_name FROM db_table WHERE db_id = ?1",
                (db_id,),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    /// Every pushed database, for cleanup sweeps.
    pub fn list_databases(&self) -> Result<Vec<DbRecord>, PublishError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT db_id, host_name, db_name, db_pretty_name, db_flags FROM db_table",
        )?;
        let records = stmt
            .query_map((), |row| {
                Ok(DbRecord {
                    db_id: row.get(0)?,
                    host_name: row.get(1)?,
                    db_name: row.get(2)?,
                    db_pretty_name: row.get(3)?,
                    db_flags: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // ---- targets ----

    /// Adds a target path (or updates its WMS flag if present) and
    /// returns the target id.
    pub fn add_target(&self, target_path: &str, serve_wms: bool) -> Result<i64, PublishError> {
        if let Some(id) = self.query_target_id_by_path(target_path)? {
            self.conn().execute(
                "UPDATE target_table SET serve_wms = ?1 WHERE target_id = ?2",
                (serve_wms, id),
            )?;
            return Ok(id);
        }
        let conn = self.conn();
        conn.execute(
            "INSERT INTO target_table (target_path, serve_wms) VALUES (?1, ?2)",
            (target_path, serve_wms),
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Case-sensitive target lookup: the catalog keeps target paths as
    /// the user entered them.
    pub fn query_target_id_by_path(&self, target_path: &str) -> Result<Option<i64>, PublishError> {
        let id = self
            .conn()
            .query_row(
                "SELECT target_id FROM target_table WHERE target_path = ?1",
                (target_path,),
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Case-insensitive check for whether a target path already serves a
    /// database. Two published points may not differ only by case.
    pub fn is_target_path_used(&self, target_path: &str) -> Result<bool, PublishError> {
        let used: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM target_table, target_db_table \
                 WHERE lower(target_table.target_path) = ?1 AND \
                   target_table.target_id = target_db_table.target_id \
                 LIMIT 1",
                (target_path.to_lowercase(),),
                |row| row.get(0),
            )
            .optional()?;
        Ok(used.is_some())
    }

    // ---- publish contexts ----

    /// Inserts a publish context row, returning its id.
    ///
    /// When the context claims the Earth Client default flag, every other
    /// row's flag is cleared first so at most one holder exists.
    pub fn insert_publish_context(&self, context: &PublishContext) -> Result<i64, PublishError> {
        let conn = self.conn();
        if context.ec_default_db {
            debug!("clearing previous ec_default_db holder");
            conn.execute("UPDATE publish_context_table SET ec_default_db = 0", ())?;
        }
        conn.execute(
            "INSERT INTO publish_context_table (snippets_set_name, search_def_names, \
             supplemental_search_def_names, poifederated, ec_default_db) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (
                context.snippets_set_name.as_deref(),
                serde_json::to_string(&context.search_def_names).unwrap_or_default(),
                serde_json::to_string(&context.supplemental_search_def_names).unwrap_or_default(),
                context.poi_federated,
                context.ec_default_db,
            ),
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn delete_publish_context(&self, publish_context_id: i64) -> Result<(), PublishError> {
        if publish_context_id == 0 {
            return Ok(());
        }
        self.conn().execute(
            "DELETE FROM publish_context_table WHERE publish_context_id = ?1",
            (publish_context_id,),
        )?;
        Ok(())
    }

    /// Publish context id linked to a target; 0 when none.
    pub fn query_publish_context_id(&self, target_id: i64) -> Result<i64, PublishError> {
        let id: Option<i64> = self
            .conn()
            .query_row(
                "SELECT publish_context_id FROM target_db_table WHERE target_id = ?1",
                (target_id,),
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.unwrap_or(0))
    }

    // ---- target-db links ----

    /// Links a target to a virtual host, database and publish context.
    pub fn link_target(
        &self,
        target_id: i64,
        virtual_host_id: i64,
        db_id: i64,
        publish_context_id: i64,
    ) -> Result<(), PublishError> {
        self.conn().execute(
            "INSERT INTO target_db_table (target_id, virtual_host_id, db_id, \
             publish_context_id) VALUES (?1, ?2, ?3, ?4)",
            (target_id, virtual_host_id, db_id, publish_context_id),
        )?;
        Ok(())
    }

    /// Removes a target's serving link; returns the number of rows
    /// removed (0 when the target was not published).
    pub fn unlink_target(&self, target_id: i64) -> Result<usize, PublishError> {
        let rows = self.conn().execute(
            "DELETE FROM target_db_table WHERE target_id = ?1",
            (target_id,),
        )?;
        Ok(rows)
    }

    /// `(virtual_host_url, db_name, host_name, db_flags)` for a published
    /// target id.
    pub fn target_details_by_id(
        &self,
        target_id: i64,
    ) -> Result<Option<(String, String, String, i64)>, PublishError> {
        let row = self
            .conn()
            .query_row(
                "SELECT virtual_host_table.virtual_host_url, db_table.db_name, \
                   db_table.host_name, db_table.db_flags \
                 FROM target_db_table, virtual_host_table, db_table \
                 WHERE target_db_table.target_id = ?1 AND \
                   virtual_host_table.virtual_host_id = target_db_table.virtual_host_id AND \
                   db_table.db_id = target_db_table.db_id",
                (target_id,),
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                    ))
                },
            )
            .optional()?;
        Ok(row)
    }

    /// `(target_path, host_name, db_name)` for every published target.
    pub fn publish_info_list(&self) -> Result<Vec<(String, String, String)>, PublishError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT target_path, host_name, db_name \
             FROM target_table, db_table, target_db_table \
             WHERE target_table.target_id = target_db_table.target_id AND \
               db_table.db_id = target_db_table.db_id",
        )?;
        let rows = stmt
            .query_map((), |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// `(target_path, target_id, serve_wms)` for targets serving
    /// published databases.
    pub fn list_target_paths(&self) -> Result<Vec<(String, i64, bool)>, PublishError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT target_path, target_id, serve_wms FROM target_table \
             WHERE target_id IN (SELECT target_id FROM target_db_table)",
        )?;
        let rows = stmt
            .query_map((), |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Target path of the Earth Client default database, if one is set.
    pub fn ec_default_target_path(&self) -> Result<Option<String>, PublishError> {
        let path = self
            .conn()
            .query_row(
                "SELECT target_table.target_path \
                 FROM publish_context_table, target_table, target_db_table \
                 WHERE publish_context_table.ec_default_db = 1 AND \
                   target_table.target_id = target_db_table.target_id AND \
                   target_db_table.publish_context_id = \
                     publish_context_table.publish_context_id",
                (),
                |row| row.get(0),
            )
            .optional()?;
        Ok(path)
    }

    /// Full details for a published target path.
    pub fn get_target_details(
        &self,
        target_path: &str,
    ) -> Result<Option<TargetDetails>, PublishError> {
        let base = self
            .conn()
            .query_row(
                "SELECT db_table.host_name, db_table.db_name, \
                   virtual_host_table.virtual_host_name, target_table.serve_wms \
                 FROM target_table, target_db_table, db_table, virtual_host_table \
                 WHERE target_table.target_path = ?1 AND \
                   target_table.target_id = target_db_table.target_id AND \
                   target_db_table.db_id = db_table.db_id AND \
                   target_db_table.virtual_host_id = virtual_host_table.virtual_host_id",
                (target_path,),
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()?;

        let (host_name, db_name, virtual_host_name, serve_wms) = match base {
            Some(row) => row,
            None => return Ok(None),
        };

        let publish_context = self.query_publish_context_by_path(target_path)?;

        Ok(Some(TargetDetails {
            target_path: target_path.to_string(),
            virtual_host_name,
            db_name,
            client_host_name: host_name,
            serve_wms,
            publish_context,
        }))
    }

    fn query_publish_context_by_path(
        &self,
        target_path: &str,
    ) -> Result<Option<PublishContext>, PublishError> {
        let row = self
            .conn()
            .query_row(
                "SELECT publish_context_table.snippets_set_name, \
                   publish_context_table.search_def_names, \
                   publish_context_table.supplemental_search_def_names, \
                   publish_context_table.poifederated, \
                   publish_context_table.ec_default_db \
                 FROM target_table, target_db_table, publish_context_table \
                 WHERE target_table.target_path = ?1 AND \
                   target_table.target_id = target_db_table.target_id AND \
                   target_db_table.publish_context_id = \
                     publish_context_table.publish_context_id",
                (target_path,),
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, bool>(4)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(
            |(snippets_set_name, search_defs, sup_search_defs, poi_federated, ec_default_db)| {
                PublishContext {
                    snippets_set_name,
                    search_def_names: decode_name_list(search_defs.as_deref()),
                    supplemental_search_def_names: decode_name_list(sup_search_defs.as_deref()),
                    poi_federated,
                    ec_default_db,
                }
            },
        ))
    }

    // ---- cut specs ----

    pub fn cut_specs(&self) -> Result<Vec<CutSpec>, PublishError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT name, qtnodes, exclusion_qtnodes, min_level, default_level, max_level \
             FROM cut_spec_table",
        )?;
        let specs = stmt
            .query_map((), |row| {
                Ok(CutSpec {
                    name: row.get(0)?,
                    qtnodes: row.get(1)?,
                    exclusion_qtnodes: row.get(2)?,
                    min_level: row.get(3)?,
                    default_level: row.get(4)?,
                    max_level: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(specs)
    }

    /// Counts of published links per distinct target path; used by the
    /// consistency tests.
    pub fn links_per_target_path(&self) -> Result<Vec<(String, i64)>, PublishError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT target_table.target_path, COUNT(*) \
             FROM target_table, target_db_table \
             WHERE target_table.target_id = target_db_table.target_id \
             GROUP BY target_table.target_path",
        )?;
        let rows = stmt
            .query_map((), |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Decodes a stored search-definition name list (JSON array text).
fn decode_name_list(stored: Option<&str>) -> Vec<String> {
    stored
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

/// Path component of a virtual host URL ("http://host/public" -> "/public",
/// "/public" -> "/public").
pub(crate) fn url_path(url: &str) -> String {
    let without_scheme = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => return url.to_string(),
    };
    match without_scheme.find('/') {
        Some(idx) => without_scheme[idx..].to_string(),
        None => String::new(),
    }
}
