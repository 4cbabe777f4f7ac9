//! Unified error types and result handling.
//!
//! Schema construction and value conversion have their own error enums so the
//! persistence layer can report them precisely; both fold into [`Error`].

use crate::db::value::ValueKind;
use thiserror::Error;

/// Top-level error type for the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration (credentials, config file).
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// Query execution or connection failure reported by the storage backend.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// An entity type declared an invalid schema.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A converter rejected a raw value or a domain value.
    #[error("Conversion error: {0}")]
    Convert(#[from] ConvertError),

    /// A row could not be turned into an entity.
    #[error("Decode error on `{entity}.{field}`: {message}")]
    Decode {
        /// Entity type name
        entity: &'static str,
        /// Field (or hook method) being processed
        field: String,
        /// Failure description
        message: String,
    },

    /// A post-parse hook reported a failure.
    #[error("Hook `{method}` failed: {message}")]
    Hook {
        /// Hook method name
        method: String,
        /// Failure description
        message: String,
    },

    /// The storage context has no table configured for this entity type.
    #[error("No table configured for `{key}`")]
    TableNotConfigured {
        /// Table key looked up in `[database.tables]`
        key: String,
    },

    /// Failed to build a SQL statement.
    #[error("Query build error: {0}")]
    Query(#[from] sea_orm::sea_query::error::Error),

    /// Environment variable error.
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// Serenity/Poise framework error.
    #[error("Serenity/Poise framework error: {0}")]
    Framework(Box<poise::serenity_prelude::Error>),
}

impl From<poise::serenity_prelude::Error> for Error {
    fn from(value: poise::serenity_prelude::Error) -> Self {
        Self::Framework(Box::new(value))
    }
}

/// Raised while building an entity schema. Always fatal for that entity type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A field names a converter the registry does not know.
    #[error("`{entity}.{field}` declares unknown converter `{converter}`")]
    UnknownConverter {
        /// Entity type name
        entity: &'static str,
        /// Field name
        field: String,
        /// Converter name as declared
        converter: String,
    },

    /// A converter factory failed to produce an instance.
    #[error("`{entity}.{field}` converter could not be instantiated: {message}")]
    ConverterInstantiation {
        /// Entity type name
        entity: &'static str,
        /// Field name
        field: String,
        /// Factory failure
        message: String,
    },

    /// A hook refers to a method that was never registered.
    #[error("`{entity}` has no hook method `{method}`")]
    UnknownHook {
        /// Entity type name
        entity: &'static str,
        /// Method name
        method: String,
    },

    /// A hook method takes a different number of arguments than declared.
    #[error("`{entity}::{method}` takes {actual} argument(s), {expected} expected")]
    HookArity {
        /// Entity type name
        entity: &'static str,
        /// Method name
        method: String,
        /// Arguments required by the declaration
        expected: usize,
        /// Arguments the registered method takes
        actual: usize,
    },

    /// No field is marked as the primary column, or more than one is.
    #[error("`{entity}` must declare exactly one primary column, found {found}")]
    PrimaryKey {
        /// Entity type name
        entity: &'static str,
        /// Number of primary columns declared
        found: usize,
    },

    /// Two bindings map to the same storage column.
    #[error("`{entity}` maps column `{column}` more than once")]
    DuplicateColumn {
        /// Entity type name
        entity: &'static str,
        /// Storage column name
        column: String,
    },
}

/// Raised by converters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// The raw value has a kind this converter cannot read.
    #[error("`{converter}` cannot convert a {found} value")]
    Unsupported {
        /// Converter name
        converter: &'static str,
        /// Kind of the offending value
        found: ValueKind,
    },

    /// The value is of the right kind but outside the representable range.
    #[error("`{converter}` value out of range: {value}")]
    OutOfRange {
        /// Converter name
        converter: &'static str,
        /// Rendered offending value
        value: String,
    },
}

/// Convenience `Result` type
pub type Result<T, E = Error> = std::result::Result<T, E>;
