//! Application configuration loaded from `config.toml`.
//!
//! The file holds the bot's default command prefix, owner IDs, the database
//! credentials and the table name for each persisted entity type. Secrets can
//! stay out of the file: `DATABASE_URL` overrides the assembled connection URL
//! and the bot token is only ever read from the environment.

/// Database connection and table setup
pub mod database;

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "BOT_CONFIG";

fn default_prefix() -> String {
    "m!".to_string()
}

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Prefix used in guilds that have not configured their own
    #[serde(default = "default_prefix")]
    pub default_prefix: String,
    /// Discord user IDs allowed to run maintenance commands
    #[serde(default)]
    pub owners: Vec<u64>,
    /// Storage settings
    pub database: DatabaseSettings,
}

/// SQL dialect to connect with.
#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    /// Local `SQLite` file (`name` is the file path)
    #[default]
    Sqlite,
    /// `MySQL` / `MariaDB` server
    Mysql,
}

/// `[database]` section.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct DatabaseSettings {
    /// SQL dialect
    #[serde(default)]
    pub backend: DatabaseBackend,
    /// Server host (server backends only)
    #[serde(default)]
    pub host: String,
    /// Login user (server backends only)
    #[serde(default)]
    pub user: String,
    /// Login password; must be present for server backends, may be empty
    #[serde(default)]
    pub password: Option<String>,
    /// Database name, or file path for `SQLite`
    #[serde(default)]
    pub name: String,
    /// Physical table name per entity key, e.g. `guilds = "guilds"`
    #[serde(default)]
    pub tables: HashMap<String, String>,
}

impl DatabaseSettings {
    /// Checks that the credentials needed by the backend are present.
    ///
    /// # Errors
    /// Returns [`Error::Config`] naming the first missing setting.
    pub fn validate(&self) -> Result<()> {
        let missing = |what: &str| Error::Config {
            message: format!("You have to set the database credentials properly: `{what}` is missing"),
        };
        if self.name.trim().is_empty() {
            return Err(missing("name"));
        }
        if self.backend == DatabaseBackend::Mysql {
            if self.host.trim().is_empty() {
                return Err(missing("host"));
            }
            if self.user.trim().is_empty() {
                return Err(missing("user"));
            }
            if self.password.is_none() {
                return Err(missing("password"));
            }
        }
        Ok(())
    }

    /// Connection URL assembled from the credentials.
    ///
    /// # Errors
    /// Returns [`Error::Config`] when [`DatabaseSettings::validate`] fails.
    pub fn connection_url(&self) -> Result<String> {
        self.validate()?;
        Ok(match self.backend {
            DatabaseBackend::Sqlite => format!("sqlite://{}?mode=rwc", self.name),
            DatabaseBackend::Mysql => format!(
                "mysql://{}:{}@{}/{}",
                self.user,
                self.password.as_deref().unwrap_or_default(),
                self.host,
                self.name
            ),
        })
    }

    /// `DATABASE_URL` when set, otherwise [`DatabaseSettings::connection_url`].
    ///
    /// # Errors
    /// Returns [`Error::Config`] when no override is set and the credentials
    /// are incomplete.
    pub fn resolve_url(&self) -> Result<String> {
        match std::env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Ok(url),
            _ => self.connection_url(),
        }
    }
}

/// Loads settings from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    tracing::debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config file {}: {e}", path_ref.display()),
    })
}

/// Loads settings from `$BOT_CONFIG`, falling back to `./config.toml`.
///
/// # Errors
/// See [`load_settings`].
pub fn load_default_settings() -> Result<Settings> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string());
    load_settings(path)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_settings() {
        let toml_str = r#"
            default_prefix = "!"
            owners = [1234]

            [database]
            backend = "mysql"
            host = "localhost"
            user = "mafia"
            password = ""
            name = "mafia"

            [database.tables]
            guilds = "guild_settings"
        "#;

        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.default_prefix, "!");
        assert_eq!(settings.owners, [1234]);
        assert_eq!(settings.database.backend, DatabaseBackend::Mysql);
        assert_eq!(settings.database.tables["guilds"], "guild_settings");
        assert_eq!(
            settings.database.connection_url().unwrap(),
            "mysql://mafia:@localhost/mafia"
        );
    }

    #[test]
    fn test_defaults_to_sqlite_and_default_prefix() {
        let settings: Settings = toml::from_str(
            r#"
            [database]
            name = "data/mafia.sqlite"
        "#,
        )
        .unwrap();
        assert_eq!(settings.default_prefix, "m!");
        assert!(settings.owners.is_empty());
        assert!(settings.database.tables.is_empty());
        assert_eq!(
            settings.database.connection_url().unwrap(),
            "sqlite://data/mafia.sqlite?mode=rwc"
        );
    }

    #[test]
    fn test_server_backend_requires_credentials() {
        let mut database = DatabaseSettings {
            backend: DatabaseBackend::Mysql,
            host: "db".into(),
            user: "mafia".into(),
            password: None,
            name: "mafia".into(),
            tables: HashMap::new(),
        };
        assert!(matches!(
            database.validate(),
            Err(Error::Config { message }) if message.contains("password")
        ));

        database.password = Some(String::new());
        assert!(database.validate().is_ok());

        database.host = "  ".into();
        assert!(matches!(
            database.validate(),
            Err(Error::Config { message }) if message.contains("host")
        ));
    }

    #[test]
    fn test_missing_file_is_a_config_error() {
        assert!(matches!(
            load_settings("definitely/not/here.toml"),
            Err(Error::Config { .. })
        ));
    }
}
