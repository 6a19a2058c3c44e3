//! Server configuration file handling.
//!
//! Loads and saves the portaglobe server configuration with sensible
//! defaults from `~/.portaglobe/config.ini` (or an explicit path).

use ini::Ini;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default globe served when none is selected.
pub const DEFAULT_GLOBE_NAME: &str = "earth.glb";
/// Default port for the tile server.
pub const DEFAULT_PORT: u16 = 9335;
/// Default search backend selector (search disabled).
pub const DEFAULT_SEARCH_DATABASE: &str = "none";

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("failed to read config file: {0}")]
    Read(#[from] ini::Error),

    /// Failed to write config file
    #[error("failed to write config file: {0}")]
    Write(std::io::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {section}.{key} = '{value}'")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// Globe serving settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobeSettings {
    /// Directory holding globe container files
    pub directory: PathBuf,
    /// Globe file served at startup
    pub name: String,
}

/// Search backend settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSettings {
    /// Backend selector: "none" disables search, "file" spools to disk
    pub database: String,
    /// Spool directory for the file backend
    pub spool_directory: PathBuf,
}

/// Publish management settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSettings {
    /// SQLite catalog database path
    pub catalog_path: PathBuf,
    /// The `.htaccess` file carrying the publish rewrite block
    pub htaccess_path: PathBuf,
    /// Root under which pushed Fusion databases are laid out
    pub publish_root: PathBuf,
}

/// The complete server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub globe: GlobeSettings,
    pub port: u16,
    pub search: SearchSettings,
    pub publish: PublishSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            globe: GlobeSettings {
                directory: PathBuf::from("globes"),
                name: DEFAULT_GLOBE_NAME.to_string(),
            },
            port: DEFAULT_PORT,
            search: SearchSettings {
                database: DEFAULT_SEARCH_DATABASE.to_string(),
                spool_directory: PathBuf::from("search_spool"),
            },
            publish: PublishSettings {
                catalog_path: PathBuf::from("gepublish.db"),
                htaccess_path: PathBuf::from("htdocs/.htaccess"),
                publish_root: PathBuf::from("published_dbs"),
            },
        }
    }
}

impl ServerConfig {
    /// Loads configuration from the default path, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("globe")) {
            if let Some(directory) = section.get("directory") {
                config.globe.directory = PathBuf::from(directory);
            }
            if let Some(name) = section.get("name") {
                config.globe.name = name.to_string();
            }
        }

        if let Some(section) = ini.section(Some("server")) {
            if let Some(port) = section.get("port") {
                config.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                    section: "server".to_string(),
                    key: "port".to_string(),
                    value: port.to_string(),
                })?;
            }
        }

        if let Some(section) = ini.section(Some("search")) {
            if let Some(database) = section.get("database") {
                config.search.database = database.to_string();
            }
            if let Some(spool) = section.get("spool_directory") {
                config.search.spool_directory = PathBuf::from(spool);
            }
        }

        if let Some(section) = ini.section(Some("publish")) {
            if let Some(catalog) = section.get("catalog_path") {
                config.publish.catalog_path = PathBuf::from(catalog);
            }
            if let Some(htaccess) = section.get("htaccess_path") {
                config.publish.htaccess_path = PathBuf::from(htaccess);
            }
            if let Some(root) = section.get("publish_root") {
                config.publish.publish_root = PathBuf::from(root);
            }
        }

        Ok(config)
    }

    /// Saves configuration to a specific path, creating parent
    /// directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Write)?;
        }

        let mut ini = Ini::new();
        ini.with_section(Some("globe"))
            .set("directory", self.globe.directory.to_string_lossy().as_ref())
            .set("name", self.globe.name.as_str());
        ini.with_section(Some("server"))
            .set("port", self.port.to_string());
        ini.with_section(Some("search"))
            .set("database", self.search.database.as_str())
            .set(
                "spool_directory",
                self.search.spool_directory.to_string_lossy().as_ref(),
            );
        ini.with_section(Some("publish"))
            .set(
                "catalog_path",
                self.publish.catalog_path.to_string_lossy().as_ref(),
            )
            .set(
                "htaccess_path",
                self.publish.htaccess_path.to_string_lossy().as_ref(),
            )
            .set(
                "publish_root",
                self.publish.publish_root.to_string_lossy().as_ref(),
            );

        ini.write_to_file(path).map_err(ConfigError::Write)
    }

    /// Path of the globe served at startup.
    pub fn initial_globe_path(&self) -> PathBuf {
        self.globe.directory.join(&self.globe.name)
    }
}

/// Config directory (`~/.portaglobe`).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".portaglobe")
}

/// Config file path (`~/.portaglobe/config.ini`).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.globe.name, DEFAULT_GLOBE_NAME);
        assert_eq!(config.search.database, "none");
        assert_eq!(config.initial_globe_path(), PathBuf::from("globes/earth.glb"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig::load_from(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");

        let mut config = ServerConfig::default();
        config.port = 8844;
        config.globe.name = "sf.glc".to_string();
        config.search.database = "file".to_string();
        config.publish.catalog_path = dir.path().join("catalog.db");

        config.save_to(&path).unwrap();
        let loaded = ServerConfig::load_from(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_invalid_port_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[server]\nport = not-a-port\n").unwrap();

        assert!(matches!(
            ServerConfig::load_from(&path),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[globe]\nname = bay.glb\n").unwrap();

        let config = ServerConfig::load_from(&path).unwrap();
        assert_eq!(config.globe.name, "bay.glb");
        assert_eq!(config.port, DEFAULT_PORT);
    }
}
