//! Application configuration
//!
//! Values come from a TOML file layered over compiled-in defaults:
//! 1. An explicit path (`--config`), or
//! 2. `<data_local_dir>/snapcart/config/snapcart.toml` if it exists, else
//! 3. The embedded `config/snapcart.toml`.
//!
//! Keys missing from an override file keep their default values.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::DEFAULT_CATEGORY;

/// Default configuration (embedded at compile time)
const DEFAULT_CONFIG: &str = include_str!("../../../config/snapcart.toml");

/// HTTP server settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Receipt ingestion and listing settings
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptSettings {
    pub default_category: String,
    pub recent_limit: usize,
}

impl Default for ReceiptSettings {
    fn default() -> Self {
        Self {
            default_category: DEFAULT_CATEGORY.to_string(),
            recent_limit: 5,
        }
    }
}

/// Resolved application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub db_path: PathBuf,
    pub receipts: ReceiptSettings,
    /// File the configuration was read from, if not the embedded default
    pub source: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            db_path: PathBuf::from("snapcart.db"),
            receipts: ReceiptSettings::default(),
            source: None,
        }
    }
}

impl AppConfig {
    /// Load from an explicit path, the user override location, or the defaults
    ///
    /// An explicit path that does not exist is an error; a missing user
    /// override file is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            return Self::load_file(path);
        }

        match default_config_path() {
            Some(user_path) if user_path.exists() => Self::load_file(&user_path),
            _ => parse_config(DEFAULT_CONFIG),
        }
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let mut config = parse_config(&content)?;
        config.source = Some(path.to_path_buf());
        debug!(path = %path.display(), "Loaded config override");
        Ok(config)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("snapcart").join("config").join("snapcart.toml"))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    server: Option<RawServer>,
    database: Option<RawDatabase>,
    receipts: Option<RawReceipts>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawServer {
    host: Option<String>,
    port: Option<u16>,
    allowed_origins: Option<Vec<String>>,
    max_upload_bytes: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDatabase {
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawReceipts {
    default_category: Option<String>,
    recent_limit: Option<usize>,
}

/// Parse config from TOML content, layering it over the built-in defaults
fn parse_config(content: &str) -> Result<AppConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = AppConfig::default();

    if let Some(server) = raw.server {
        if let Some(host) = server.host {
            config.server.host = host;
        }
        if let Some(port) = server.port {
            config.server.port = port;
        }
        if let Some(origins) = server.allowed_origins {
            config.server.allowed_origins = origins;
        }
        if let Some(max) = server.max_upload_bytes {
            if max == 0 {
                return Err(Error::Config(
                    "server.max_upload_bytes must be greater than 0".to_string(),
                ));
            }
            config.server.max_upload_bytes = max;
        }
    }

    if let Some(path) = raw.database.and_then(|d| d.path) {
        config.db_path = path;
    }

    if let Some(receipts) = raw.receipts {
        if let Some(category) = receipts.default_category {
            if category.trim().is_empty() {
                return Err(Error::Config(
                    "receipts.default_category must not be empty".to_string(),
                ));
            }
            config.receipts.default_category = category.trim().to_string();
        }
        if let Some(limit) = receipts.recent_limit {
            config.receipts.recent_limit = limit;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_default_parses() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.receipts.default_category, "General");
        assert_eq!(config.receipts.recent_limit, 5);
        assert_eq!(config.db_path, PathBuf::from("snapcart.db"));
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = parse_config(
            r#"
            [server]
            port = 9090

            [receipts]
            default_category = "Groceries"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.receipts.default_category, "Groceries");
        assert_eq!(config.receipts.recent_limit, 5);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            parse_config("[server]\nport = \"eighty\""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            parse_config("[server]\nmax_upload_bytes = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            parse_config("[receipts]\ndefault_category = \" \""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            parse_config("[storage]\npath = \"x\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapcart.toml");
        fs::write(&path, "[database]\npath = \"/var/lib/snapcart/receipts.db\"\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/var/lib/snapcart/receipts.db"));
        assert_eq!(config.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/snapcart.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
