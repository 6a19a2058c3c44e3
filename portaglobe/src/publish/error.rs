//! Publish error types.

use thiserror::Error;

/// Errors from publish, unpublish and catalog operations.
///
/// Every variant carries a human-readable message surfaced in the admin
/// response; precondition failures trigger compensating rollback of any
/// already-completed publish sub-steps before propagating.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Target path failed syntax validation
    #[error("not a valid target path {0} (path format is /sub_path1[/sub_path2])")]
    InvalidTargetPath(String),

    /// First path segment is reserved by the server
    #[error("system reserved word {word} is used in target path {path}")]
    ReservedPath { word: String, path: String },

    /// Target path is already bound to a database (case-insensitive)
    #[error(
        "target path {0} is already in use; note that paths are case \
         insensitive. Use another path or un-publish the database using \
         this path"
    )]
    TargetPathInUse(String),

    /// Named virtual host is not in the catalog
    #[error("virtual host {0} does not exist")]
    UnknownVirtualHost(String),

    /// Virtual host exists already (add) or is still serving targets (delete)
    #[error("virtual host {0}: {1}")]
    VirtualHostConflict(String, String),

    /// Database was never registered/pushed
    #[error("database {0} does not exist on server; it needs to be registered/pushed before publishing")]
    DatabaseNotPushed(String),

    /// Database name is not a recognized publishable type
    #[error("unsupported database type for {0}")]
    UnsupportedDbType(String),

    /// Target is not currently published
    #[error("target path {0} does not exist or is not currently published")]
    TargetNotPublished(String),

    /// Target was published before publish contexts existed
    #[error(
        "no publish context for target path {0}; this command is not \
         supported for targets published with an earlier server version"
    )]
    NoPublishContext(String),

    /// Republish databases are not versions of the same database
    #[error(
        "database names do not match for target and given database: \
         {current} vs {requested} should be versions of the same database"
    )]
    NotComparable { current: String, requested: String },

    /// Republish would drop POI search that the target has enabled
    #[error(
        "target path {target} has POISearch enabled while database {db_name} \
         has no POI data; republish is disabled"
    )]
    PoiUnavailable { target: String, db_name: String },

    /// Swap of a target path with itself
    #[error("target paths {0} and {0} are the same")]
    SamePaths(String),

    /// Serving-layer registration failure
    #[error("serving registration failed for {target}: {reason}")]
    Serving { target: String, reason: String },

    /// Manifest file transfer exhausted its retries
    #[error("could not transfer publish manifest file {src} to {dest}")]
    TransferFailed { src: String, dest: String },

    /// Catalog storage failure
    #[error("catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    /// Filesystem failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
