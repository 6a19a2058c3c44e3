//! Publish state-transition management.
//!
//! Orchestrates Publish / Unpublish / Republish / SwapTargets / Cleanup /
//! Reset across three representations that cannot share a transaction:
//! catalog rows, in-memory serving registrations, and the rewrite rules
//! file. Each completed step pushes a compensating action onto a stack;
//! a failing step unwinds the stack so the target ends fully published or
//! fully unpublished.

use super::catalog::PublishCatalog;
use super::error::PublishError;
use super::htaccess::{update_htaccess_file, RewriteTarget};
use super::serving::ServingRegistry;
use super::types::{
    identify_published_db, normalize_target_path, DbType, PublishDef, TargetDetails,
};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// First path segments reserved by the server's own endpoints.
pub const RESERVED_WORDS: &[&str] = &[
    "fdb",
    "htdocs",
    "admin",
    "cutter",
    "earth",
    "icons",
    "js",
    "maps",
    "portable",
    "shared_assets",
];

/// Manifest transfer retries after the initial attempt.
const MAX_TRANSFER_RETRIES: u32 = 2;

/// One file of a publish manifest: where it is now and the relative path
/// it belongs at under the target's publish directory.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub orig_path: String,
    pub current_path: PathBuf,
}

/// Builds the publish manifest for a Fusion database (dbroot with merged
/// snippets and search configuration, search.json, supplemental search
/// UI). Portable globes have no manifest.
pub trait ManifestProvider: Send + Sync {
    fn publish_manifest(
        &self,
        publish_def: &PublishDef,
        stream_url: &str,
    ) -> Result<Vec<ManifestEntry>, PublishError>;
}

/// Reports whether a pushed database carries POI search data; consulted
/// before republishing over a POISearch-enabled target.
pub trait PoiDataSource: Send + Sync {
    fn has_poi_data(&self, client_host_name: &str, db_name: &str) -> bool;
}

/// Default POI source for servers without a search database.
pub struct NoPoiData;

impl PoiDataSource for NoPoiData {
    fn has_poi_data(&self, _client_host_name: &str, _db_name: &str) -> bool {
        false
    }
}

/// Filesystem and retry settings for the manager.
#[derive(Debug, Clone)]
pub struct PublishManagerConfig {
    /// The `.htaccess` file carrying the publish rewrite block
    pub htaccess_path: PathBuf,
    /// Root under which pushed Fusion databases are laid out
    pub publish_root: PathBuf,
    /// Directory holding portable globe files
    pub globes_directory: PathBuf,
    /// First manifest-transfer retry delay; doubles per retry
    pub transfer_retry_delay: Duration,
}

impl PublishManagerConfig {
    pub fn new(
        htaccess_path: impl Into<PathBuf>,
        publish_root: impl Into<PathBuf>,
        globes_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            htaccess_path: htaccess_path.into(),
            publish_root: publish_root.into(),
            globes_directory: globes_directory.into(),
            transfer_retry_delay: Duration::from_secs(5),
        }
    }
}

/// A stack of compensating actions for a multi-step operation.
///
/// Steps push their undo as they succeed; `unwind` runs them LIFO when a
/// later step fails. Compensation failures are logged, never propagated,
/// so the unwind always runs to completion.
struct Compensations<'a> {
    stack: Vec<(&'static str, Box<dyn FnOnce() -> Result<(), PublishError> + 'a>)>,
}

impl<'a> Compensations<'a> {
    fn new() -> Self {
        Self { stack: Vec::new() }
    }

    fn push(
        &mut self,
        label: &'static str,
        action: impl FnOnce() -> Result<(), PublishError> + 'a,
    ) {
        self.stack.push((label, Box::new(action)));
    }

    fn unwind(mut self) {
        while let Some((label, action)) = self.stack.pop() {
            debug!(step = label, "compensating");
            if let Err(e) = action() {
                warn!(step = label, error = %e, "compensation failed");
            }
        }
    }

    fn commit(mut self) {
        self.stack.clear();
    }
}

/// The publish manager.
pub struct PublishManager {
    catalog: PublishCatalog,
    serving: Arc<dyn ServingRegistry>,
    manifest_provider: Option<Box<dyn ManifestProvider>>,
    poi_source: Box<dyn PoiDataSource>,
    config: PublishManagerConfig,
}

impl PublishManager {
    pub fn new(
        catalog: PublishCatalog,
        serving: Arc<dyn ServingRegistry>,
        config: PublishManagerConfig,
    ) -> Self {
        Self {
            catalog,
            serving,
            manifest_provider: None,
            poi_source: Box::new(NoPoiData),
            config,
        }
    }

    pub fn with_manifest_provider(mut self, provider: Box<dyn ManifestProvider>) -> Self {
        self.manifest_provider = Some(provider);
        self
    }

    pub fn with_poi_source(mut self, source: Box<dyn PoiDataSource>) -> Self {
        self.poi_source = source;
        self
    }

    pub fn catalog(&self) -> &PublishCatalog {
        &self.catalog
    }

    // ---- publish ----

    /// Publishes a database under a target path.
    ///
    /// Step order: validate, resolve the database, register with the
    /// serving layer, insert catalog rows, regenerate rewrite rules, and
    /// (Fusion only) transfer the publish manifest. Any failing step
    /// unwinds the compensations pushed by the steps before it.
    pub fn publish(&self, publish_def: &PublishDef) -> Result<(), PublishError> {
        let target_path = normalize_target_path(&publish_def.target_path)
            .ok_or_else(|| PublishError::InvalidTargetPath(publish_def.target_path.clone()))?;
        self.verify_target_path(&target_path)?;

        if self.catalog.is_target_path_used(&target_path)? {
            return Err(PublishError::TargetPathInUse(target_path));
        }

        let (db_name, db_type) = identify_published_db(&publish_def.db_name)?;
        let client_host_name = if db_type.is_fusion() {
            publish_def.client_host_name.clone()
        } else {
            // Portable globes carry no client host identity.
            String::new()
        };

        let db_id = self
            .catalog
            .query_db_id(&client_host_name, &db_name)?
            .ok_or_else(|| PublishError::DatabaseNotPushed(db_name.clone()))?;

        let virtual_host_id = self
            .catalog
            .query_virtual_host_id(&publish_def.virtual_host_name)?
            .ok_or_else(|| {
                PublishError::UnknownVirtualHost(publish_def.virtual_host_name.clone())
            })?;

        let target_db_path = if db_type.is_fusion() {
            self.build_target_publish_path(&client_host_name, &db_name, &target_path)
                .to_string_lossy()
                .into_owned()
        } else {
            db_name.clone()
        };

        info!(path = %target_path, db = %db_name, db_type = %db_type, "publishing");

        let mut compensations = Compensations::new();

        // Serving-layer registration. On failure, drop any partially
        // created target publish directory.
        if let Err(e) = self.serving.register_database_for_serving(
            &target_path,
            db_type,
            &target_db_path,
        ) {
            self.delete_target_publish_dir(&target_path, &client_host_name, &db_name);
            return Err(e);
        }
        {
            let serving = Arc::clone(&self.serving);
            let path = target_path.clone();
            compensations.push("unregister serving", move || {
                serving.unregister_database_for_serving(&path)
            });
        }

        // Catalog rows and rewrite rules.
        let catalog_result = (|| -> Result<(), PublishError> {
            let target_id = self.catalog.add_target(&target_path, publish_def.serve_wms)?;
            let publish_context_id = self.catalog.insert_publish_context(&publish_def.context)?;
            self.catalog
                .link_target(target_id, virtual_host_id, db_id, publish_context_id)?;
            self.update_htaccess()
        })();
        if let Err(e) = catalog_result {
            let _ = self.do_unpublish(&target_path);
            compensations.unwind();
            return Err(e);
        }
        {
            let path = target_path.clone();
            compensations.push("unpublish catalog rows", move || {
                self.do_unpublish(&path).map(|_| ())
            });
        }

        // Publish manifest, Fusion databases only.
        if db_type.is_fusion() {
            let def_for_manifest = PublishDef {
                target_path: target_path.clone(),
                db_name: db_name.clone(),
                client_host_name: client_host_name.clone(),
                db_type,
                ..publish_def.clone()
            };
            if let Err(e) = self.build_and_transfer_manifest(&def_for_manifest) {
                self.delete_target_publish_dir(&target_path, &client_host_name, &db_name);
                compensations.unwind();
                return Err(e);
            }
        }

        compensations.commit();
        info!(path = %target_path, "published");
        Ok(())
    }

    // ---- unpublish ----

    /// Unpublishes a target path, returning the `(host, db_name)` that
    /// was being served there.
    ///
    /// A target that is not published is a no-op with a warning (and a
    /// `None` return), so the operation is idempotent.
    pub fn unpublish(&self, target_path: &str) -> Result<Option<(String, String)>, PublishError> {
        let target_path = normalize_target_path(target_path)
            .ok_or_else(|| PublishError::InvalidTargetPath(target_path.to_string()))?;

        let unpublished = self.do_unpublish(&target_path)?;
        self.serving.unregister_database_for_serving(&target_path)?;
        Ok(unpublished)
    }

    /// Catalog-and-filesystem half of unpublish: removes the publish
    /// context and serving link, regenerates the rewrite rules, deletes
    /// the publish directory. Returns the unpublished `(host, db_name)`,
    /// or `None` when the target was not published.
    fn do_unpublish(&self, target_path: &str) -> Result<Option<(String, String)>, PublishError> {
        let target_id = match self.catalog.query_target_id_by_path(target_path)? {
            Some(id) => id,
            None => {
                warn!(path = target_path, "unpublish: target path does not exist");
                return Ok(None);
            }
        };

        let publish_context_id = self.catalog.query_publish_context_id(target_id)?;
        self.catalog.delete_publish_context(publish_context_id)?;

        // Fetch the database identity before deleting the link row.
        let details = self.catalog.target_details_by_id(target_id)?;

        let removed = self.catalog.unlink_target(target_id)?;
        if removed > 0 {
            self.update_htaccess()?;
        }

        match details {
            Some((_vh_url, db_name, host_name, _db_flags)) => {
                self.delete_target_publish_dir(target_path, &host_name, &db_name);
                info!(path = target_path, db = %db_name, "unpublished");
                Ok(Some((host_name, db_name)))
            }
            None => Ok(None),
        }
    }

    // ---- republish ----

    /// Replaces the database behind a published target with another
    /// version of the same database, preserving the publish context.
    pub fn republish(
        &self,
        db_name: &str,
        target_path: &str,
        client_host_name: &str,
    ) -> Result<(), PublishError> {
        let target_path = normalize_target_path(target_path)
            .ok_or_else(|| PublishError::InvalidTargetPath(target_path.to_string()))?;

        let (new_db_name, _db_type) = identify_published_db(db_name)?;
        if self
            .catalog
            .query_db_id(client_host_name, &new_db_name)?
            .is_none()
        {
            return Err(PublishError::DatabaseNotPushed(new_db_name));
        }

        let details = self
            .catalog
            .get_target_details(&target_path)?
            .ok_or_else(|| PublishError::TargetNotPublished(target_path.clone()))?;

        let context = details
            .publish_context
            .clone()
            .ok_or_else(|| PublishError::NoPublishContext(target_path.clone()))?;

        if !are_databases_comparable(
            &new_db_name,
            client_host_name,
            &details.db_name,
            &details.client_host_name,
        ) {
            return Err(PublishError::NotComparable {
                current: details.db_name.clone(),
                requested: new_db_name,
            });
        }

        // A target with POI search enabled cannot move to a database
        // version without POI data.
        if context.has_poi_search() && !self.poi_source.has_poi_data(client_host_name, &new_db_name)
        {
            return Err(PublishError::PoiUnavailable {
                target: target_path.clone(),
                db_name: new_db_name,
            });
        }

        self.unpublish(&target_path)?;
        self.publish(&PublishDef {
            target_path: target_path.clone(),
            virtual_host_name: details.virtual_host_name.clone(),
            db_name: new_db_name,
            client_host_name: client_host_name.to_string(),
            db_type: details_db_type(&details)?,
            serve_wms: details.serve_wms,
            context,
        })?;

        info!(path = %target_path, "republished");
        Ok(())
    }

    // ---- swap ----

    /// Exchanges the databases served by two published targets.
    pub fn swap_targets(&self, path_a: &str, path_b: &str) -> Result<(), PublishError> {
        let path_a = normalize_target_path(path_a)
            .ok_or_else(|| PublishError::InvalidTargetPath(path_a.to_string()))?;
        let path_b = normalize_target_path(path_b)
            .ok_or_else(|| PublishError::InvalidTargetPath(path_b.to_string()))?;
        if path_a == path_b {
            return Err(PublishError::SamePaths(path_a));
        }

        let details_a = self.published_details_with_context(&path_a)?;
        let details_b = self.published_details_with_context(&path_b)?;

        self.unpublish(&path_a)?;
        self.unpublish(&path_b)?;

        // Each target republishes under the other's path.
        self.publish(&publish_def_from_details(&details_a, &path_b)?)?;
        self.publish(&publish_def_from_details(&details_b, &path_a)?)?;

        info!(a = %path_a, b = %path_b, "targets swapped");
        Ok(())
    }

    fn published_details_with_context(
        &self,
        target_path: &str,
    ) -> Result<TargetDetails, PublishError> {
        let details = self
            .catalog
            .get_target_details(target_path)?
            .ok_or_else(|| PublishError::TargetNotPublished(target_path.to_string()))?;
        if details.publish_context.is_none() {
            return Err(PublishError::NoPublishContext(target_path.to_string()));
        }
        Ok(details)
    }

    // ---- cleanup ----

    /// Unpublishes every catalog-registered database whose backing file
    /// or directory no longer exists on disk. Returns the unpublished
    /// `(host, db_name)` pairs.
    ///
    /// Portable cleanup is skipped entirely when the globes directory has
    /// no portable files, so an unmounted volume cannot cause a mass
    /// false-positive unpublish.
    pub fn cleanup(&self) -> Result<Vec<(String, String)>, PublishError> {
        let published = self.catalog.publish_info_list()?;
        let is_globes_mounted = directory_has_portables(&self.config.globes_directory);
        if !is_globes_mounted {
            warn!(
                dir = %self.config.globes_directory.display(),
                "no portable files in globes directory; volume may not be \
                 mounted. Portable publish records will not be cleaned"
            );
        }

        let mut unpublished = Vec::new();
        for (target_path, host_name, db_name) in published {
            let (db_path, db_type) = match identify_published_db(&db_name) {
                Ok(identified) => identified,
                Err(_) => continue,
            };

            let check_path = if db_type.is_fusion() {
                self.build_db_publish_path(&host_name, &db_path)
                    .join("header.xml")
            } else {
                if !is_globes_mounted {
                    continue;
                }
                self.config
                    .globes_directory
                    .join(db_path.trim_start_matches('/'))
            };

            if !check_path.exists() {
                self.do_unpublish(&target_path)?;
                self.serving.unregister_database_for_serving(&target_path)?;
                warn!(
                    db = %db_name,
                    path = %target_path,
                    "database could not be found; its target has been un-published"
                );
                unpublished.push((host_name, db_path));
            }
        }

        info!(count = unpublished.len(), "publish info cleanup complete");
        Ok(unpublished)
    }

    // ---- reset ----

    /// Rebuilds the serving layer from the catalog: clears every
    /// registration, reinstalls cut specs, re-registers each published
    /// target (unpublishing any that fail), and regenerates the rewrite
    /// rules.
    pub fn reset(&self) -> Result<(), PublishError> {
        self.serving.reset()?;

        let cut_specs = self.catalog.cut_specs()?;
        if !cut_specs.is_empty() {
            self.serving.init_cut_specs(&cut_specs)?;
        }

        for (target_path, host_name, db_name) in self.catalog.publish_info_list()? {
            let (norm_db_name, db_type) = match identify_published_db(&db_name) {
                Ok(identified) => identified,
                Err(e) => {
                    warn!(path = %target_path, error = %e, "unidentifiable database on reset");
                    continue;
                }
            };
            let target_db_path = if db_type.is_fusion() {
                self.build_target_publish_path(&host_name, &norm_db_name, &target_path)
                    .to_string_lossy()
                    .into_owned()
            } else {
                norm_db_name
            };

            if let Err(e) = self.serving.register_database_for_serving(
                &target_path,
                db_type,
                &target_db_path,
            ) {
                warn!(path = %target_path, error = %e, "re-registration failed; unpublishing");
                self.do_unpublish(&target_path)?;
            }
        }

        self.update_htaccess()
    }

    // ---- shared steps ----

    /// Validates a normalized target path against reserved words and
    /// virtual host URL prefixes.
    fn verify_target_path(&self, target_path: &str) -> Result<(), PublishError> {
        let first_segment = target_path[1..]
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();
        if RESERVED_WORDS.contains(&first_segment.as_str()) {
            return Err(PublishError::ReservedPath {
                word: first_segment,
                path: target_path.to_string(),
            });
        }

        let prefix = format!("/{}", first_segment);
        if self.catalog.virtual_host_url_paths()?.contains(&prefix) {
            return Err(PublishError::ReservedPath {
                word: prefix,
                path: target_path.to_string(),
            });
        }
        Ok(())
    }

    /// Regenerates the rewrite rules from the catalog's current state.
    fn update_htaccess(&self) -> Result<(), PublishError> {
        let mut targets = Vec::new();
        for (target_path, target_id, serve_wms) in self.catalog.list_target_paths()? {
            let (vh_url, db_name, _host_name, db_flags) =
                match self.catalog.target_details_by_id(target_id)? {
                    Some(details) => details,
                    None => continue, // no database published on this path
                };
            let (_norm, db_type) = match identify_published_db(&db_name) {
                Ok(identified) => identified,
                Err(_) => continue,
            };
            targets.push(RewriteTarget {
                target_path,
                virtual_host_path: super::catalog::url_path(&vh_url),
                db_type,
                db_flags,
                serve_wms,
            });
        }

        let ec_default = self.catalog.ec_default_target_path()?;
        update_htaccess_file(&self.config.htaccess_path, targets, ec_default.as_deref())
    }

    /// `{publish_root}/{host}{db_name}` for a pushed Fusion database.
    fn build_db_publish_path(&self, client_host_name: &str, db_name: &str) -> PathBuf {
        self.config
            .publish_root
            .join(client_host_name)
            .join(db_name.trim_start_matches('/'))
    }

    /// `{db_publish_path}/targets{target_path}`.
    fn build_target_publish_path(
        &self,
        client_host_name: &str,
        db_name: &str,
        target_path: &str,
    ) -> PathBuf {
        self.build_db_publish_path(client_host_name, db_name)
            .join("targets")
            .join(target_path.trim_start_matches('/'))
    }

    /// Best-effort removal of a target's publish directory (Fusion only).
    fn delete_target_publish_dir(&self, target_path: &str, client_host_name: &str, db_name: &str) {
        let db_type = match identify_published_db(db_name) {
            Ok((_, db_type)) => db_type,
            Err(_) => return,
        };
        if !db_type.is_fusion() || client_host_name.is_empty() {
            return;
        }

        let target_dir = self.build_target_publish_path(client_host_name, db_name, target_path);
        debug!(dir = %target_dir.display(), "deleting target publish directory");
        if let Err(e) = std::fs::remove_dir_all(&target_dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %target_dir.display(), error = %e, "could not delete publish directory");
            }
        }
        // Drop the `targets` parent when it is now empty.
        if let Some(parent) = target_dir.parent() {
            let _ = std::fs::remove_dir(parent);
        }
    }

    /// Builds the publish manifest and copies it into the target's
    /// publish directory, retrying each file with doubling delays.
    fn build_and_transfer_manifest(&self, publish_def: &PublishDef) -> Result<(), PublishError> {
        let provider = match &self.manifest_provider {
            Some(provider) => provider,
            None => {
                debug!("no manifest provider configured; skipping manifest transfer");
                return Ok(());
            }
        };

        let (vh_url, vh_ssl) = self
            .catalog
            .query_virtual_host(&publish_def.virtual_host_name)?
            .ok_or_else(|| {
                PublishError::UnknownVirtualHost(publish_def.virtual_host_name.clone())
            })?;
        let stream_url = format!(
            "{}{}",
            vh_base_url(&vh_url, vh_ssl),
            publish_def.target_path
        );

        let manifest = provider.publish_manifest(publish_def, &stream_url)?;
        let dest_prefix = self.build_target_publish_path(
            &publish_def.client_host_name,
            &publish_def.db_name,
            &publish_def.target_path,
        );

        for entry in &manifest {
            self.transfer_with_retry(&entry.current_path, &dest_prefix.join(&entry.orig_path))?;
        }
        Ok(())
    }

    fn transfer_with_retry(&self, src: &Path, dest: &Path) -> Result<(), PublishError> {
        let mut delay = self.config.transfer_retry_delay;
        let mut remaining = MAX_TRANSFER_RETRIES;
        loop {
            match transfer_file(src, dest) {
                Ok(()) => return Ok(()),
                Err(e) if remaining > 0 => {
                    debug!(src = %src.display(), error = %e, "retrying manifest transfer");
                    std::thread::sleep(delay);
                    delay *= 2;
                    remaining -= 1;
                }
                Err(_) => {
                    return Err(PublishError::TransferFailed {
                        src: src.display().to_string(),
                        dest: dest.display().to_string(),
                    })
                }
            }
        }
    }
}

fn transfer_file(src: &Path, dest: &Path) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(src, dest)?;
    Ok(())
}

fn details_db_type(details: &TargetDetails) -> Result<DbType, PublishError> {
    identify_published_db(&details.db_name).map(|(_, db_type)| db_type)
}

fn publish_def_from_details(
    details: &TargetDetails,
    target_path: &str,
) -> Result<PublishDef, PublishError> {
    Ok(PublishDef {
        target_path: target_path.to_string(),
        virtual_host_name: details.virtual_host_name.clone(),
        db_name: details.db_name.clone(),
        client_host_name: details.client_host_name.clone(),
        db_type: details_db_type(details)?,
        serve_wms: details.serve_wms,
        context: details.publish_context.clone().unwrap_or_default(),
    })
}

/// Whether two database names are versions of the same database: same
/// client host, and the same parent-directory stem under the asset tree.
pub fn are_databases_comparable(
    db_name1: &str,
    host_name1: &str,
    db_name2: &str,
    host_name2: &str,
) -> bool {
    if host_name1 != host_name2 {
        return false;
    }

    let stem_pattern = Regex::new(r".*/(.*)/.*\.kda/.*").unwrap();
    let stem = |name: &str| -> Option<String> {
        stem_pattern
            .captures(name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };

    match (stem(db_name1), stem(db_name2)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Scheme-qualified base URL for a virtual host.
fn vh_base_url(vh_url: &str, vh_ssl: bool) -> String {
    if vh_url.contains("://") {
        vh_url.to_string()
    } else {
        let scheme = if vh_ssl { "https" } else { "http" };
        format!("{}://localhost{}", scheme, vh_url)
    }
}

/// Whether the directory contains at least one portable globe file.
fn directory_has_portables(dir: &Path) -> bool {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return false,
    };
    for entry in entries.flatten() {
        if let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) {
            if matches!(ext, "glb" | "glm" | "glc" | "mbt") {
                return true;
            }
        }
    }
    false
}
