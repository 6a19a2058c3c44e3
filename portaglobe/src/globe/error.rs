//! Globe read error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from opening and reading globe containers.
#[derive(Debug, Error)]
pub enum GlobeError {
    /// Requested packet or file is absent from the container.
    ///
    /// This is an expected, frequently hit outcome (ancestor-tile probing,
    /// dbroot fallback); callers branch on it rather than propagate it.
    #[error("not found in container: {0}")]
    NotFound(String),

    /// Container missing, unopenable, or failed the package check.
    #[error("unreadable container {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    /// File extension is not one of .glb/.glm/.glc/.mbt.
    #[error("unknown globe file type: {0}")]
    UnknownFileType(PathBuf),

    /// Tile read against a container that is not an mbtiles database.
    #[error("container {0} is not a tile database")]
    NotTileDatabase(PathBuf),

    /// SQL failure from an mbtiles container.
    #[error("tile database error: {0}")]
    TileDb(#[from] rusqlite::Error),
}

impl GlobeError {
    /// True for the expected "entry absent" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GlobeError::NotFound(_))
    }

    pub(crate) fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        GlobeError::Unreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        assert!(GlobeError::NotFound("packet".into()).is_not_found());
        assert!(!GlobeError::UnknownFileType(PathBuf::from("x.zip")).is_not_found());
    }

    #[test]
    fn test_display_includes_path() {
        let err = GlobeError::unreadable("/globes/bad.glb", "permission denied");
        let msg = err.to_string();
        assert!(msg.contains("/globes/bad.glb"));
        assert!(msg.contains("permission denied"));
    }
}
