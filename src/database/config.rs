//! Loader configuration file support
//!
//! Handles parsing of `libdb.toml` configuration files and
//! environment variable overrides.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use super::{DatabaseError, DatabaseResult};

/// Default configuration filename
pub const CONFIG_FILENAME: &str = "libdb.toml";

/// Environment variable for the workbook path
pub const ENV_EXCEL_PATH: &str = "EXCEL_PATH";

/// Environment variable for the DDL file path
pub const ENV_DDL_PATH: &str = "LIBDB_DDL_PATH";

/// Environment variable for the database host
pub const ENV_DB_HOST: &str = "DB_HOST";

/// Environment variable for the database port
pub const ENV_DB_PORT: &str = "DB_PORT";

/// Environment variable for the database name
pub const ENV_DB_NAME: &str = "DB_NAME";

/// Environment variable for the database user
pub const ENV_DB_USER: &str = "DB_USER";

/// Environment variable for the database password
pub const ENV_DB_PASSWORD: &str = "DB_PASSWORD";

/// Database credentials
///
/// Passed explicitly to the connector; `Debug` and `Display` mask the password.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    /// Server host name
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name
    #[serde(default = "default_dbname")]
    pub name: String,

    /// Role name
    #[serde(default = "default_user")]
    pub user: String,

    /// Role password
    #[serde(default)]
    pub password: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_dbname() -> String {
    "postgres".to_string()
}

fn default_user() -> String {
    "postgres".to_string()
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            name: default_dbname(),
            user: default_user(),
            password: None,
        }
    }
}

impl Credentials {
    /// Create credentials for a host/database/user triple
    pub fn new(
        host: impl Into<String>,
        name: impl Into<String>,
        user: impl Into<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            host: host.into(),
            name: name.into(),
            user: user.into(),
            password,
            ..Default::default()
        }
    }

    /// Connection target with the password masked
    pub fn masked(&self) -> String {
        let password = if self.password.is_some() { ":****" } else { "" };
        format!(
            "postgresql://{}{}@{}:{}/{}",
            self.user, password, self.host, self.port, self.name
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .finish()
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Import configuration section
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ImportSection {
    /// Path to the workbook to import
    #[serde(default)]
    pub workbook: Option<PathBuf>,

    /// Path to a DDL file replacing the bundled library schema
    #[serde(default)]
    pub ddl: Option<PathBuf>,
}

/// Main configuration structure
///
/// Represents the `libdb.toml` configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Database credentials
    #[serde(default)]
    pub database: Credentials,

    /// Import sources
    #[serde(default)]
    pub import: ImportSection,
}

impl LoaderConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration
    ///
    /// Reads `path` if given (it must exist), otherwise `libdb.toml` in the current
    /// directory if present, otherwise defaults. Environment overrides apply last.
    pub fn load(path: Option<&Path>) -> DatabaseResult<Self> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None => {
                let default_path = Path::new(CONFIG_FILENAME);
                if default_path.exists() {
                    Self::read(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env_overrides();

        Ok(config)
    }

    fn read(path: &Path) -> DatabaseResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DatabaseError::IoError(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> DatabaseResult<Self> {
        toml::from_str(content)
            .map_err(|e| DatabaseError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> DatabaseResult<String> {
        toml::to_string_pretty(self).map_err(|e| {
            DatabaseError::SerializationError(format!("Failed to serialize config: {}", e))
        })
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_EXCEL_PATH) {
            self.import.workbook = Some(PathBuf::from(path));
        }

        if let Some(path) = lookup(ENV_DDL_PATH) {
            self.import.ddl = Some(PathBuf::from(path));
        }

        if let Some(host) = lookup(ENV_DB_HOST) {
            self.database.host = host;
        }

        if let Some(port) = lookup(ENV_DB_PORT)
            && let Ok(port) = port.parse()
        {
            self.database.port = port;
        }

        if let Some(name) = lookup(ENV_DB_NAME) {
            self.database.name = name;
        }

        if let Some(user) = lookup(ENV_DB_USER) {
            self.database.user = user;
        }

        if let Some(password) = lookup(ENV_DB_PASSWORD) {
            self.database.password = Some(password);
        }
    }

    /// Get the workbook path, failing if none is configured
    pub fn workbook_path(&self) -> DatabaseResult<&Path> {
        self.import.workbook.as_deref().ok_or_else(|| {
            DatabaseError::ConfigError(format!(
                "{} is not set in the environment or {}",
                ENV_EXCEL_PATH, CONFIG_FILENAME
            ))
        })
    }
}

/// Generate a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# Library database loader configuration
# Every value can be overridden from the environment (see comments).

[database]
# DB_HOST
host = "localhost"
# DB_PORT
port = 5432
# DB_NAME
name = "postgres"
# DB_USER
user = "postgres"
# DB_PASSWORD (prefer the environment over writing it here)
# password = ""

[import]
# EXCEL_PATH: workbook with Client, Transaction, MediaItem, Book, Magazine
# and DigitalMedia sheets
# workbook = "data/library.xlsx"

# LIBDB_DDL_PATH: replaces the bundled library schema
# ddl = "sql/library_schema.sql"
"#
}
