//! Guild entity - per-server bot settings.
//!
//! One row per Discord guild the bot has been configured in: the category
//! game channels are created under, a custom command prefix and a locale.

use crate::db::{Entity, EntityCache, Lifecycle, SchemaBuilder};
use sea_orm::sea_query::{Alias, ColumnDef, Table, TableCreateStatement};

/// Key of the guild table in `[database.tables]`.
pub const TABLE_KEY: &str = "guilds";

/// Cache of guild settings keyed by guild ID.
pub type GuildCache = EntityCache<u64, Guild>;

/// Per-guild settings.
///
/// Field accessors update the lifecycle: getters stamp `last_accessed`,
/// setters stamp `last_modified` until the next save.
#[derive(Clone, Debug, Default)]
pub struct Guild {
    id: u64,
    game_category_id: u64,
    prefix: Option<String>,
    localization: Option<String>,
    lifecycle: Lifecycle,
}

impl Guild {
    /// A guild that has no stored row yet.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Discord guild ID.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.lifecycle.touch_accessed();
        self.id
    }

    /// Category channel that game channels are created under, 0 when unset.
    #[must_use]
    pub fn game_category_id(&self) -> u64 {
        self.lifecycle.touch_accessed();
        self.game_category_id
    }

    /// Sets the game category.
    pub fn set_game_category_id(&mut self, id: u64) {
        self.game_category_id = id;
        self.lifecycle.touch_modified();
    }

    /// Custom command prefix.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.lifecycle.touch_accessed();
        self.prefix.as_deref()
    }

    /// The custom prefix, or `default` when none is set.
    #[must_use]
    pub fn prefix_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.prefix().filter(|p| !p.is_empty()).unwrap_or(default)
    }

    /// Sets or clears the custom prefix.
    pub fn set_prefix(&mut self, prefix: Option<String>) {
        self.prefix = prefix;
        self.lifecycle.touch_modified();
    }

    /// Locale tag such as `en`.
    #[must_use]
    pub fn localization(&self) -> Option<&str> {
        self.lifecycle.touch_accessed();
        self.localization.as_deref()
    }

    /// Sets or clears the locale.
    pub fn set_localization(&mut self, localization: Option<String>) {
        self.localization = localization;
        self.lifecycle.touch_modified();
    }

    /// `CREATE TABLE IF NOT EXISTS` for the guild table.
    #[must_use]
    pub fn create_table_statement(table: &str) -> TableCreateStatement {
        Table::create()
            .table(Alias::new(table))
            .if_not_exists()
            .col(
                ColumnDef::new(Alias::new("id"))
                    .big_integer()
                    .not_null()
                    .primary_key(),
            )
            .col(
                ColumnDef::new(Alias::new("game_category"))
                    .big_integer()
                    .not_null()
                    .default(0),
            )
            .col(ColumnDef::new(Alias::new("prefix")).text().null())
            .col(ColumnDef::new(Alias::new("localization")).text().null())
            .to_owned()
    }
}

impl Entity for Guild {
    const NAME: &'static str = "Guild";

    fn declare(schema: &mut SchemaBuilder<Self>) {
        schema
            .field("id", |g| g.id, |g, v| g.id = v)
            .primary()
            .converter_named("snowflake");
        schema
            .field(
                "game_category_id",
                |g| g.game_category_id,
                |g, v| g.game_category_id = v,
            )
            .column("game_category")
            .converter_named("snowflake");
        schema.field("prefix", |g| g.prefix.clone(), |g, v| g.prefix = v);
        schema.field(
            "localization",
            |g| g.localization.clone(),
            |g, v| g.localization = v,
        );
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::db::query::build_upsert;
    use crate::db::row::decode;
    use crate::db::{Storage, Value, describe};
    use crate::errors::Result;
    use crate::test_utils::{init_test_tracing, memory_settings, setup_test_db, single_row};
    use sea_orm::{DatabaseBackend, DbBackend, MockDatabase, MockExecResult};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn guild_row() -> BTreeMap<&'static str, sea_orm::Value> {
        BTreeMap::from([
            ("id", sea_orm::Value::BigInt(Some(42))),
            ("game_category", sea_orm::Value::BigInt(Some(0))),
            ("prefix", sea_orm::Value::from("!".to_string())),
            ("localization", sea_orm::Value::from("en".to_string())),
        ])
    }

    #[test]
    fn test_decode_stored_guild() {
        let schema = describe::<Guild>().unwrap();
        let rows = single_row(&[
            ("id", Value::Int(42)),
            ("game_category", Value::Int(0)),
            ("prefix", Value::Text("!".into())),
            ("localization", Value::Text("en".into())),
        ]);
        let guild = decode(rows, &schema).unwrap().unwrap();

        assert!(guild.lifecycle().filled());
        assert!(guild.lifecycle().last_modified().is_none());
        assert_eq!(guild.id(), 42);
        assert_eq!(guild.game_category_id(), 0);
        assert_eq!(guild.prefix(), Some("!"));
        assert_eq!(guild.localization(), Some("en"));
        assert_eq!(guild.prefix_or("m!"), "!");
    }

    #[test]
    fn test_setter_marks_pending_change_and_upsert_carries_it() {
        let schema = describe::<Guild>().unwrap();
        let rows = single_row(&[("id", Value::Int(42)), ("game_category", Value::Int(0))]);
        let mut guild = decode(rows, &schema).unwrap().unwrap();

        guild.set_game_category_id(7);
        assert!(guild.lifecycle().last_modified().is_some());

        let statement = build_upsert(DbBackend::Sqlite, "guilds", &guild, &schema).unwrap();
        let bound = statement.values.unwrap().0;
        assert!(bound.contains(&sea_orm::Value::BigInt(Some(7))));
        assert!(bound.contains(&sea_orm::Value::BigInt(Some(42))));
    }

    #[test]
    fn test_unloaded_guild_does_not_track() {
        let mut guild = Guild::new(9);
        guild.set_prefix(Some("?".into()));
        assert_eq!(guild.prefix_or("m!"), "?");
        assert!(guild.lifecycle().last_modified().is_none());
        assert!(guild.lifecycle().last_accessed().is_none());
    }

    #[test]
    fn test_empty_prefix_falls_back_to_default() {
        let mut guild = Guild::new(1);
        guild.set_prefix(Some(String::new()));
        assert_eq!(guild.prefix_or("m!"), "m!");
    }

    #[tokio::test]
    async fn test_save_through_mock_clears_pending_change() -> Result<()> {
        let storage = Arc::new(Storage::new(
            MockDatabase::new(DatabaseBackend::Sqlite)
                .append_query_results([vec![guild_row()]])
                .append_exec_results([MockExecResult {
                    last_insert_id: 42,
                    rows_affected: 1,
                }])
                .into_connection(),
            &memory_settings(&[(TABLE_KEY, "guilds")]),
        ));
        let cache = GuildCache::new(&storage, TABLE_KEY)?;

        let shared = cache.get(42).await?.unwrap();
        let mut guild = shared.write().await;
        guild.set_game_category_id(7);
        cache.save(&mut guild).await?;
        assert!(guild.lifecycle().last_modified().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_round_trip() -> Result<()> {
        init_test_tracing();
        let storage = Arc::new(setup_test_db().await?);
        let cache = GuildCache::new(&storage, TABLE_KEY)?;
        assert!(cache.get(1_234_567_890_123_456_789).await?.is_none());

        let mut guild = Guild::new(1_234_567_890_123_456_789);
        guild.set_game_category_id(u64::MAX - 1);
        guild.set_prefix(Some("!".into()));
        cache.save(&mut guild).await?;

        let stored = cache.get(1_234_567_890_123_456_789).await?.unwrap();
        {
            let mut stored = stored.write().await;
            assert!(stored.lifecycle().filled());
            assert_eq!(stored.game_category_id(), u64::MAX - 1);
            assert_eq!(stored.prefix(), Some("!"));
            assert_eq!(stored.localization(), None);

            // Second save updates the existing row in place
            stored.set_localization(Some("pl".into()));
            assert!(stored.lifecycle().last_modified().is_some());
            cache.save(&mut stored).await?;
            assert!(stored.lifecycle().last_modified().is_none());
        }

        cache.invalidate_all().await;
        let reloaded = cache.get(1_234_567_890_123_456_789).await?.unwrap();
        assert!(!Arc::ptr_eq(&stored, &reloaded));
        assert_eq!(reloaded.read().await.localization(), Some("pl"));
        assert_eq!(reloaded.read().await.prefix(), Some("!"));
        Ok(())
    }
}
