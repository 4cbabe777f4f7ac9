//! Storage context: one database connection and the table names configured
//! for each entity type.

use crate::config::DatabaseSettings;
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// The storage context: one connection plus the table name configured for
/// each entity type. Built once at startup and handed to every entity cache.
#[derive(Debug)]
pub struct Storage {
    connection: DatabaseConnection,
    tables: HashMap<String, String>,
}

impl Storage {
    /// Wraps an open connection.
    #[must_use]
    pub fn new(connection: DatabaseConnection, settings: &DatabaseSettings) -> Self {
        Self {
            connection,
            tables: settings.tables.clone(),
        }
    }

    /// Connects using the URL assembled from `settings` (or `DATABASE_URL`).
    ///
    /// # Errors
    /// Returns a configuration error for incomplete credentials and a
    /// database error when the connection cannot be opened.
    #[instrument(skip(settings), fields(backend = ?settings.backend))]
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let url = settings.resolve_url()?;
        Self::connect_url(&url, settings).await
    }

    /// Connects to an explicit URL, taking only table names from `settings`.
    ///
    /// # Errors
    /// Returns a database error when the connection cannot be opened.
    pub async fn connect_url(url: &str, settings: &DatabaseSettings) -> Result<Self> {
        debug!("Initializing database connection");
        let connection = Database::connect(url).await?;
        info!(
            tables = settings.tables.len(),
            "Database connection opened."
        );
        Ok(Self::new(connection, settings))
    }

    /// The underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// SQL dialect of the connection.
    #[must_use]
    pub fn backend(&self) -> DbBackend {
        self.connection.get_database_backend()
    }

    /// Physical table configured under `key`. Blank names count as missing.
    #[must_use]
    pub fn table(&self, key: &str) -> Option<&str> {
        self.tables
            .get(key)
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
    }
}
