//! Shared test utilities.
//!
//! Provides tracing setup, in-memory database helpers, and a `Ticket` entity
//! that exercises every part of the mapper (converters, two-phase reads,
//! field hooks, the type-level hook, ignored fields).

use crate::{
    config::{DatabaseBackend, DatabaseSettings},
    db::{
        Entity, Lifecycle, SchemaBuilder, Storage, Value,
        converter::Converter,
        row::{Row, RowSet},
    },
    errors::{ConvertError, Error, Result},
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing_subscriber::EnvFilter;

/// Installs a test-writer tracing subscriber. Safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace")),
        )
        .with_test_writer()
        .try_init();
}

/// Settings for an in-memory `SQLite` database with the given table keys.
pub fn memory_settings(tables: &[(&str, &str)]) -> DatabaseSettings {
    DatabaseSettings {
        backend: DatabaseBackend::Sqlite,
        host: String::new(),
        user: String::new(),
        password: None,
        name: ":memory:".to_string(),
        tables: tables
            .iter()
            .map(|(key, table)| ((*key).to_string(), (*table).to_string()))
            .collect::<HashMap<_, _>>(),
    }
}

/// Connects an in-memory `SQLite` storage context with the guild table created.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<Storage> {
    let storage =
        Storage::connect_url("sqlite::memory:", &memory_settings(&[("guilds", "guilds")])).await?;
    crate::config::database::create_tables(&storage).await?;
    Ok(storage)
}

/// Builds a one-row set from column/value pairs.
pub fn single_row(columns: &[(&str, Value)]) -> RowSet {
    RowSet::new(vec![row(columns)])
}

/// Builds a row from column/value pairs.
pub fn row(columns: &[(&str, Value)]) -> Row {
    columns
        .iter()
        .map(|(name, value)| ((*name).to_string(), value.clone()))
        .collect()
}

/// Upper-cases text and reports the original spelling as hook state.
#[derive(Default)]
pub struct TagConverter;

impl Converter for TagConverter {
    fn name(&self) -> &'static str {
        "tag"
    }

    fn read(&self, raw: Value) -> Result<Value, ConvertError> {
        match raw {
            Value::Null => Ok(Value::Null),
            Value::Text(tag) => Ok(Value::Text(tag.to_uppercase())),
            other => Err(ConvertError::Unsupported {
                converter: "tag",
                found: other.kind(),
            }),
        }
    }

    fn write(&self, value: Value) -> Result<Value, ConvertError> {
        Ok(match value {
            Value::Text(tag) => Value::Text(tag.to_lowercase()),
            other => other,
        })
    }

    fn uses_read_with_state(&self) -> bool {
        true
    }

    fn read_with_state(&self, raw: Value) -> Result<(Value, Value), ConvertError> {
        let state = raw.clone();
        Ok((self.read(raw)?, state))
    }
}

/// Test entity covering converters, hooks and ignored fields.
#[derive(Debug, Default)]
pub struct Ticket {
    /// Primary key, column `ticket_id`
    pub id: u64,
    /// Nullable text
    pub title: Option<String>,
    /// Stored as unix seconds
    pub opened_at: Option<DateTime<Utc>>,
    /// Upper-cased by [`TagConverter`], which also feeds the tag hook
    pub tag: Option<String>,
    /// Plain integer with a hook but no converter
    pub score: i64,
    /// Ignored by the mapper
    pub note: String,
    /// Arguments seen by the tag hook
    pub tag_hook_args: Vec<Vec<Value>>,
    /// Arguments seen by the score hook
    pub score_hook_args: Vec<Vec<Value>>,
    /// Arguments seen by the type-level hook
    pub summary_args: Vec<Vec<Value>>,
    /// Load and change tracking
    pub lifecycle: Lifecycle,
}

impl Ticket {
    fn on_tag(&mut self, args: Vec<Value>) -> Result<()> {
        self.tag_hook_args.push(args);
        Ok(())
    }

    fn on_score(&mut self, args: Vec<Value>) -> Result<()> {
        self.score_hook_args.push(args);
        Ok(())
    }

    fn summarize(&mut self, args: Vec<Value>) -> Result<()> {
        if args.first() == Some(&Value::Text("boom".into())) {
            return Err(Error::Hook {
                method: "summarize".to_string(),
                message: "tag exploded".to_string(),
            });
        }
        self.summary_args.push(args);
        Ok(())
    }
}

impl Entity for Ticket {
    const NAME: &'static str = "Ticket";

    fn declare(schema: &mut SchemaBuilder<Self>) {
        schema
            .field("id", |t| t.id, |t, v| t.id = v)
            .column("ticket_id")
            .primary()
            .converter_named("snowflake");
        schema.field("title", |t| t.title.clone(), |t, v| t.title = v);
        schema
            .field("opened_at", |t| t.opened_at, |t, v| t.opened_at = v)
            .converter_named("unix_timestamp");
        schema
            .field("tag", |t| t.tag.clone(), |t, v| t.tag = v)
            .converter::<TagConverter>()
            .after_parse("on_tag");
        schema
            .field("score", |t| t.score, |t, v| t.score = v)
            .after_parse("on_score");
        schema
            .field("note", |t| t.note.clone(), |t, v| t.note = v)
            .ignore();

        schema
            .method("on_tag", 1, Self::on_tag)
            .method("on_score", 1, Self::on_score)
            .method("summarize", 2, Self::summarize)
            .after_parse("summarize", &["tag", "priority"]);
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}
