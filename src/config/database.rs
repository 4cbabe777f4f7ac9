//! Database setup for the bot.
//!
//! Connection handling lives in [`crate::db::Storage`]; this module creates the
//! tables of every configured entity at startup. Entities whose table key is
//! missing from `[database.tables]` are skipped, matching the disabled caches
//! built for them.

use crate::db::Storage;
use crate::entities::{Guild, guild};
use crate::errors::Result;
use sea_orm::ConnectionTrait;
use tracing::{debug, warn};

/// Creates every configured entity table that does not exist yet.
///
/// # Errors
/// Returns a database error when a `CREATE TABLE` statement fails.
pub async fn create_tables(storage: &Storage) -> Result<()> {
    let backend = storage.backend();

    match storage.table(guild::TABLE_KEY) {
        Some(table) => {
            let statement = Guild::create_table_statement(table);
            storage.connection().execute(backend.build(&statement)).await?;
            debug!(table, "guild table ready");
        }
        None => warn!("no guild table configured, skipping creation"),
    }

    Ok(())
}
