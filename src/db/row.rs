//! Raw rows and the row decoder.
//!
//! A [`RowSet`] owns the rows returned by one query. [`decode`] consumes it, so
//! the rows are released when decoding returns, whether it succeeded or not.

use crate::db::converter::read_two_phase;
use crate::db::lifecycle::Entity;
use crate::db::schema::Schema;
use crate::db::value::Value;
use crate::errors::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sea_orm::sqlx::{
    self, Column as _, Row as _, TypeInfo as _, ValueRef as _, mysql::MySqlRow,
    sqlite::SqliteRow,
};
use sea_orm::{ConnectionTrait, QueryResult, Statement};
use std::collections::VecDeque;
use tracing::trace;

/// One raw row: column names with their untyped values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    /// Value of the column named `name`, compared case-insensitively.
    /// `None` means the column is absent; a SQL `NULL` is `Some(&Value::Null)`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(column, _)| column.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Column names in result order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Converts a backend row into a [`Row`], column by column.
    ///
    /// Values keep their storage type: integers, reals, text and blobs map to
    /// the matching [`Value`] variant, and columns declared as booleans or
    /// date-times are read as such.
    ///
    /// # Errors
    /// Returns a decode error when a column cannot be read.
    pub fn from_query_result(result: &QueryResult) -> Result<Self> {
        #[cfg(test)]
        if let Some(mock) = result.try_as_mock_row() {
            return Ok(mock
                .clone()
                .into_column_value_tuples()
                .map(|(name, value)| (name, Value::from(value)))
                .collect());
        }
        if let Some(row) = result.try_as_sqlite_row() {
            return row
                .columns()
                .iter()
                .map(|column| {
                    let value = sqlite_value(row, column.ordinal(), column.type_info().name())
                        .map_err(|e| column_error(column.name(), &e))?;
                    Ok::<_, Error>((column.name().to_string(), value))
                })
                .collect();
        }
        if let Some(row) = result.try_as_mysql_row() {
            return row
                .columns()
                .iter()
                .map(|column| {
                    let value = mysql_value(row, column.ordinal(), column.type_info().name())
                        .map_err(|e| column_error(column.name(), &e))?;
                    Ok::<_, Error>((column.name().to_string(), value))
                })
                .collect();
        }
        Err(Error::Decode {
            entity: "row",
            field: String::new(),
            message: "unsupported backend row".to_string(),
        })
    }
}

fn column_error(column: &str, error: &sqlx::Error) -> Error {
    Error::Decode {
        entity: "row",
        field: column.to_string(),
        message: error.to_string(),
    }
}

/// `SQLite` is dynamically typed: the declared type only decides booleans and
/// date-times, everything else follows the stored value's class.
fn sqlite_value(row: &SqliteRow, index: usize, declared: &str) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let stored = raw.type_info().name().to_string();

    match declared {
        "BOOLEAN" if stored == "INTEGER" => return row.try_get(index).map(Value::Bool),
        "DATETIME" | "DATE" => {
            if let Ok(at) = row.try_get::<DateTime<Utc>, _>(index) {
                return Ok(Value::Timestamp(at));
            }
        }
        _ => {}
    }

    match stored.as_str() {
        "INTEGER" => row.try_get(index).map(Value::Int),
        "REAL" => row.try_get(index).map(Value::Float),
        "BLOB" => row.try_get(index).map(Value::Bytes),
        _ => row.try_get(index).map(Value::Text),
    }
}

fn mysql_value(row: &MySqlRow, index: usize, declared: &str) -> Result<Value, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    match declared {
        "BOOLEAN" => row.try_get(index).map(Value::Bool),
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row.try_get(index).map(Value::UInt),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get(index).map(Value::Int)
        }
        "FLOAT" | "DOUBLE" => row.try_get(index).map(Value::Float),
        "DATETIME" | "TIMESTAMP" => row.try_get(index).map(Value::Timestamp),
        "DATE" => row
            .try_get::<NaiveDate, _>(index)
            .map(|date| Value::Timestamp(date.and_time(NaiveTime::MIN).and_utc())),
        "TIME" => row
            .try_get::<NaiveTime, _>(index)
            .map(|time| Value::Text(time.to_string())),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            row.try_get(index).map(Value::Bytes)
        }
        _ => row
            .try_get(index)
            .map(Value::Text)
            .or_else(|_| row.try_get(index).map(Value::Bytes)),
    }
}

impl<S: Into<String>> FromIterator<(S, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (S, Value)>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }
}

/// The rows produced by one query.
#[derive(Debug, Default)]
pub struct RowSet {
    rows: VecDeque<Row>,
}

impl RowSet {
    /// Wraps already materialised rows.
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows: rows.into() }
    }

    /// Runs `statement` and collects its rows.
    ///
    /// # Errors
    /// Propagates query execution errors.
    pub async fn fetch<C: ConnectionTrait>(connection: &C, statement: Statement) -> Result<Self> {
        trace!(sql = %statement.sql, "fetching rows");
        let results = connection.query_all(statement).await?;
        let rows = results
            .iter()
            .map(Row::from_query_result)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(rows))
    }

    /// Whether any row is left.
    #[must_use]
    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    /// Advances to the next row.
    pub fn next_row(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }
}

impl Drop for RowSet {
    fn drop(&mut self) {
        trace!(unread = self.rows.len(), "row set released");
    }
}

/// Decodes the first row of `rows` into a `T`.
///
/// Returns `Ok(None)` for an empty row set. Fields whose column is absent keep
/// their default. Without a converter a raw value is only assigned when its
/// kind matches the field exactly; with one, the converter output must fit
/// the field (a `NULL` output on a non-nullable field keeps the default).
///
/// # Errors
/// Converter failures, converter output of the wrong kind, and hook failures
/// are returned after the row set has been released.
pub fn decode<T: Entity>(mut rows: RowSet, schema: &Schema<T>) -> Result<Option<T>> {
    let Some(row) = rows.next_row() else {
        return Ok(None);
    };
    let mut entity = T::default();

    for binding in schema.bindings() {
        let Some(raw) = row.get(binding.column()) else {
            trace!(entity = T::NAME, column = binding.column(), "column absent");
            continue;
        };
        let raw = raw.clone();

        let state = if let Some(converter) = binding.converter()? {
            let (value, state) =
                read_two_phase(converter.as_ref(), raw).map_err(|e| Error::Decode {
                    entity: T::NAME,
                    field: binding.field().to_string(),
                    message: e.to_string(),
                })?;
            if let Err(rejected) = binding.assign(&mut entity, value) {
                if !rejected.is_null() {
                    return Err(Error::Decode {
                        entity: T::NAME,
                        field: binding.field().to_string(),
                        message: format!(
                            "converter `{}` produced {}, field expects {}",
                            converter.name(),
                            rejected.kind(),
                            binding.kind()
                        ),
                    });
                }
            }
            state
        } else {
            if let Err(rejected) = binding.assign(&mut entity, raw) {
                trace!(
                    entity = T::NAME,
                    field = binding.field(),
                    found = %rejected.kind(),
                    expected = %binding.kind(),
                    "kind mismatch, keeping default"
                );
            }
            Value::Null
        };

        if let Some(hook) = binding.hook() {
            hook.invoke(&mut entity, vec![state])?;
        }
    }

    entity.lifecycle_mut().mark_filled();

    if let Some(type_hook) = schema.type_hook() {
        let args = type_hook
            .columns()
            .iter()
            .map(|column| row.get(column).cloned().unwrap_or_default())
            .collect();
        type_hook.hook().invoke(&mut entity, args)?;
    }

    Ok(Some(entity))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::db::schema::describe;
    use crate::db::Storage;
    use crate::test_utils::{Ticket, init_test_tracing, memory_settings, row, single_row};
    use chrono::{TimeZone, Utc};

    fn full_ticket_row() -> RowSet {
        single_row(&[
            ("ticket_id", Value::Int(9)),
            ("title", Value::Text("lobby stuck".into())),
            ("opened_at", Value::Int(1_600_000_000)),
            ("tag", Value::Text("Bug".into())),
            ("score", Value::Int(3)),
            ("note", Value::Text("never read".into())),
        ])
    }

    #[test]
    fn test_empty_row_set_decodes_to_none() {
        let schema = describe::<Ticket>().unwrap();
        let rows = RowSet::default();
        assert!(!rows.has_rows());
        assert!(decode(rows, &schema).unwrap().is_none());
    }

    #[test]
    fn test_decode_applies_converters_and_stamps_lifecycle() {
        init_test_tracing();
        let schema = describe::<Ticket>().unwrap();
        let ticket = decode(full_ticket_row(), &schema).unwrap().unwrap();

        assert_eq!(ticket.id, 9);
        assert_eq!(ticket.title.as_deref(), Some("lobby stuck"));
        assert_eq!(
            ticket.opened_at,
            Some(Utc.with_ymd_and_hms(2020, 9, 13, 12, 26, 40).unwrap())
        );
        assert_eq!(ticket.tag.as_deref(), Some("BUG"));
        assert_eq!(ticket.score, 3);
        assert!(ticket.note.is_empty(), "ignored field must not be decoded");
        assert!(ticket.lifecycle.filled());
        assert!(ticket.lifecycle.last_accessed().is_some());
        assert!(ticket.lifecycle.last_modified().is_none());
    }

    #[test]
    fn test_two_phase_state_reaches_only_its_own_hook() {
        let schema = describe::<Ticket>().unwrap();
        let ticket = decode(full_ticket_row(), &schema).unwrap().unwrap();

        assert_eq!(ticket.tag_hook_args, vec![vec![Value::Text("Bug".into())]]);
        assert_eq!(ticket.score_hook_args, vec![vec![Value::Null]]);
    }

    #[test]
    fn test_type_hook_gets_raw_values_and_null_for_absent_columns() {
        let schema = describe::<Ticket>().unwrap();
        let ticket = decode(full_ticket_row(), &schema).unwrap().unwrap();

        // `tag` is passed pre-conversion, `priority` is not in the row at all
        assert_eq!(
            ticket.summary_args,
            vec![vec![Value::Text("Bug".into()), Value::Null]]
        );

        let with_priority = single_row(&[
            ("ticket_id", Value::Int(1)),
            ("PRIORITY", Value::Int(5)),
        ]);
        let ticket = decode(with_priority, &schema).unwrap().unwrap();
        assert_eq!(ticket.summary_args, vec![vec![Value::Null, Value::Int(5)]]);
    }

    #[test]
    fn test_null_columns_yield_no_value() {
        let schema = describe::<Ticket>().unwrap();
        let rows = single_row(&[
            ("ticket_id", Value::Int(2)),
            ("title", Value::Null),
            ("opened_at", Value::Null),
            ("tag", Value::Null),
            ("score", Value::Null),
        ]);
        let ticket = decode(rows, &schema).unwrap().unwrap();

        assert_eq!(ticket.title, None);
        assert_eq!(ticket.opened_at, None);
        assert_eq!(ticket.tag, None);
        assert_eq!(ticket.score, 0);
        assert_eq!(ticket.tag_hook_args, vec![vec![Value::Null]]);
    }

    #[test]
    fn test_mismatched_raw_kind_keeps_default() {
        let schema = describe::<Ticket>().unwrap();
        let rows = single_row(&[
            ("ticket_id", Value::Int(4)),
            ("title", Value::Int(17)),
            ("score", Value::Text("high".into())),
        ]);
        let ticket = decode(rows, &schema).unwrap().unwrap();

        assert_eq!(ticket.id, 4);
        assert_eq!(ticket.title, None);
        assert_eq!(ticket.score, 0);
    }

    #[test]
    fn test_column_match_is_case_insensitive_and_first_row_wins() {
        let schema = describe::<Ticket>().unwrap();
        let rows = RowSet::new(vec![
            row(&[("TICKET_ID", Value::Int(10)), ("Title", Value::Text("a".into()))]),
            row(&[("ticket_id", Value::Int(11)), ("title", Value::Text("b".into()))]),
        ]);
        let ticket = decode(rows, &schema).unwrap().unwrap();

        assert_eq!(ticket.id, 10);
        assert_eq!(ticket.title.as_deref(), Some("a"));
    }

    #[test]
    fn test_converter_and_hook_failures_propagate() {
        let schema = describe::<Ticket>().unwrap();

        let bad_timestamp = single_row(&[
            ("ticket_id", Value::Int(1)),
            ("opened_at", Value::Text("tuesday".into())),
        ]);
        assert!(matches!(
            decode(bad_timestamp, &schema),
            Err(Error::Decode { field, .. }) if field == "opened_at"
        ));

        let exploding = single_row(&[
            ("ticket_id", Value::Int(1)),
            ("tag", Value::Text("boom".into())),
        ]);
        assert!(matches!(
            decode(exploding, &schema),
            Err(Error::Hook { method, .. }) if method == "summarize"
        ));
    }

    #[test]
    fn test_row_lookup_distinguishes_null_from_absent() {
        let row = row(&[("prefix", Value::Null)]);
        assert_eq!(row.get("PREFIX"), Some(&Value::Null));
        assert_eq!(row.get("localization"), None);
        assert_eq!(row.column_names().collect::<Vec<_>>(), ["prefix"]);
    }

    #[tokio::test]
    async fn test_sqlite_columns_keep_their_storage_type() -> Result<()> {
        let storage = Storage::connect_url("sqlite::memory:", &memory_settings(&[])).await?;
        let connection = storage.connection();
        connection
            .execute_unprepared(
                "CREATE TABLE samples (id INTEGER PRIMARY KEY, data BLOB, at DATETIME, \
                 flag BOOLEAN, ratio REAL, note TEXT)",
            )
            .await?;
        connection
            .execute_unprepared(
                "INSERT INTO samples VALUES (7, x'0102ff', '2020-09-13 12:26:40', 1, 0.5, NULL)",
            )
            .await?;

        let mut rows = RowSet::fetch(
            connection,
            Statement::from_string(storage.backend(), "SELECT * FROM samples"),
        )
        .await?;
        let row = rows.next_row().unwrap();

        assert_eq!(row.get("id"), Some(&Value::Int(7)));
        assert_eq!(row.get("data"), Some(&Value::Bytes(vec![1, 2, 255])));
        assert_eq!(
            row.get("at"),
            Some(&Value::Timestamp(
                Utc.with_ymd_and_hms(2020, 9, 13, 12, 26, 40).unwrap()
            ))
        );
        assert_eq!(row.get("flag"), Some(&Value::Bool(true)));
        assert_eq!(row.get("ratio"), Some(&Value::Float(0.5)));
        assert_eq!(row.get("note"), Some(&Value::Null));
        assert!(rows.next_row().is_none());
        Ok(())
    }
}
