//! Metadata-driven persistence: schemas, converters, row decoding, upserts
//! and the per-entity read-through cache.

pub mod cache;
pub mod connection;
pub mod converter;
pub mod lifecycle;
pub mod query;
pub mod row;
pub mod schema;
pub mod value;

pub use cache::{EntityCache, Shared};
pub use connection::Storage;
pub use converter::{Converter, ConverterRegistry, SnowflakeConverter, UnixTimestampConverter};
pub use lifecycle::{Entity, Lifecycle};
pub use schema::{ColumnBinding, Schema, SchemaBuilder, describe};
pub use value::{FieldValue, Value, ValueKind};
