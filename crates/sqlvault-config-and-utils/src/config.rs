//! Configuration management for sqlvault.
//!
//! Configuration is a single JSON document. Every section carries serde
//! defaults, so a file only needs to name what it changes.

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default storage directory (can be overridden at compile time via SQLVAULT_DEFAULT_STORAGE_PATH).
pub const DEFAULT_STORAGE_PATH: &str = match option_env!("SQLVAULT_DEFAULT_STORAGE_PATH") {
    Some(path) => path,
    None => "./data",
};

const DEFAULT_KEY_PATH: &str = "./keys";
const DEFAULT_JWT_TIMEOUT: &str = "1h";
const DEFAULT_USER_NAME: &str = "admin";

/// Main sqlvault configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Optional JSONL log file. Logs always go to stderr as well.
    pub log_file: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    /// Logical databases to bootstrap, one SQLite file each.
    pub databases: Vec<DatabaseDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Forces the `debug` level regardless of `log_level`.
    pub debug: bool,
    pub transactions: TransactionLoggingConfig,
}

/// Audit trail settings (`__transactions`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionLoggingConfig {
    pub enabled: bool,
    pub log_select_queries: bool,
}

impl Default for TransactionLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_select_queries: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub jwt: JwtConfig,
    pub default: DefaultUserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub enabled: bool,
    /// Session lifetime such as `30m`, `1h` or `7d`.
    pub timeout: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: DEFAULT_JWT_TIMEOUT.to_string(),
        }
    }
}

/// Credentials of the user seeded into every new database.
///
/// An empty password means one is generated and logged once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultUserConfig {
    pub name: String,
    pub password: String,
}

impl Default for DefaultUserConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_USER_NAME.to_string(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `<name>.db` files.
    pub path: PathBuf,
    pub encryption: EncryptionConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STORAGE_PATH),
            encryption: EncryptionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    pub enabled: bool,
    /// Directory of the sealed key file.
    pub path: PathBuf,
    /// Inline `base64(key):base64(nonce)`; takes precedence over the key file.
    pub key: Option<String>,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from(DEFAULT_KEY_PATH),
            key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseDefinition {
    pub name: String,
    #[serde(default = "default_schema_version")]
    pub version: i64,
    #[serde(default)]
    pub tables: Vec<TableDefinition>,
}

fn default_schema_version() -> i64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default)]
    pub primary_key: bool,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            primary_key: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_file: None,
            logging: LoggingConfig::default(),
            session: SessionConfig::default(),
            storage: StorageConfig::default(),
            databases: vec![DatabaseDefinition {
                name: "main".to_string(),
                version: 1,
                tables: vec![TableDefinition {
                    name: "notes".to_string(),
                    columns: vec![
                        ColumnDefinition::new("title", "TEXT"),
                        ColumnDefinition::new("body", "TEXT"),
                    ],
                }],
            }],
        }
    }
}

impl Config {
    /// Load configuration from `path`, falling back to defaults when it does not exist,
    /// then apply environment overrides and validate.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Pretty JSON rendering of this configuration.
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The default configuration as pretty JSON, for `generate-config`.
    pub fn default_json() -> CoreResult<String> {
        Self::default().to_json()
    }

    /// Effective log level after the `logging.debug` switch.
    pub fn effective_log_level(&self) -> &str {
        if self.logging.debug {
            "debug"
        } else {
            &self.log_level
        }
    }

    /// Look up a configured database by name.
    pub fn database(&self, name: &str) -> Option<&DatabaseDefinition> {
        self.databases.iter().find(|db| db.name == name)
    }

    /// Structural checks that serde cannot express.
    pub fn validate(&self) -> CoreResult<()> {
        if self.databases.is_empty() {
            return Err(CoreError::Config(
                "at least one database must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for db in &self.databases {
            if db.name.trim().is_empty() {
                return Err(CoreError::Config("database name is empty".to_string()));
            }
            if !seen.insert(db.name.as_str()) {
                return Err(CoreError::Config(format!(
                    "database '{}' is configured more than once",
                    db.name
                )));
            }
            for table in &db.tables {
                if table.name.trim().is_empty() {
                    return Err(CoreError::Config(format!(
                        "database '{}' has a table with an empty name",
                        db.name
                    )));
                }
                if table.columns.iter().any(|c| c.name.trim().is_empty()) {
                    return Err(CoreError::Config(format!(
                        "table '{}' in database '{}' has a column with an empty name",
                        table.name, db.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("SQLVAULT_LOG_LEVEL") {
            self.log_level = log_level;
        }
    }
}
