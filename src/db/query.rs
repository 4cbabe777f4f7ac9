//! Statement builders for the keyed lookup and the upsert.
//!
//! Both work purely from a [`Schema`]; nothing here executes a statement.

use crate::db::lifecycle::Entity;
use crate::db::schema::Schema;
use crate::db::value::Value;
use crate::errors::Result;
use sea_orm::sea_query::{Alias, Asterisk, Expr, OnConflict, Query, SimpleExpr};
use sea_orm::{DbBackend, Statement};

/// `SELECT * FROM table WHERE <primary> = key LIMIT 1`.
///
/// The key goes through the primary column's converter first, so it is
/// compared in storage form. All columns are selected because the type-level
/// hook may read columns that are not mapped to fields.
///
/// # Errors
/// Returns an error when the key cannot be converted.
pub fn build_lookup<T: Entity>(
    backend: DbBackend,
    table: &str,
    schema: &Schema<T>,
    key: Value,
) -> Result<Statement> {
    let primary = schema.primary();
    let key = match primary.converter()? {
        Some(converter) => converter.write(key)?,
        None => key,
    };

    let select = Query::select()
        .column(Asterisk)
        .from(Alias::new(table))
        .and_where(Expr::col(Alias::new(primary.column())).eq(sea_orm::Value::from(key)))
        .limit(1)
        .to_owned();
    Ok(backend.build(&select))
}

/// Single-statement insert-or-update of every mapped column of `entity`.
///
/// Conflicts on the primary column update every other mapped column to the
/// new value. An entity whose only mapped column is its key rewrites the key
/// onto itself, which keeps the statement valid on every backend.
///
/// # Errors
/// Returns an error when a converter rejects a field value.
pub fn build_upsert<T: Entity>(
    backend: DbBackend,
    table: &str,
    entity: &T,
    schema: &Schema<T>,
) -> Result<Statement> {
    let mut columns = Vec::with_capacity(schema.bindings().len());
    let mut values = Vec::with_capacity(schema.bindings().len());
    for binding in schema.bindings() {
        columns.push(Alias::new(binding.column()));
        values.push(SimpleExpr::Value(binding.storage_value(entity)?.into()));
    }

    let primary = schema.primary().column();
    let mut updates: Vec<Alias> = schema
        .bindings()
        .iter()
        .filter(|binding| binding.column() != primary)
        .map(|binding| Alias::new(binding.column()))
        .collect();
    if updates.is_empty() {
        updates.push(Alias::new(primary));
    }

    let insert = Query::insert()
        .into_table(Alias::new(table))
        .columns(columns)
        .values(values)?
        .on_conflict(
            OnConflict::column(Alias::new(primary))
                .update_columns(updates)
                .to_owned(),
        )
        .to_owned();
    Ok(backend.build(&insert))
}
