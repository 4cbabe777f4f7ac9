//! Value converters between storage representations and entity field values.
//!
//! A converter is a stateless strategy. Schemas hold a [`ConverterFactory`]
//! rather than an instance, and a fresh converter is created for every read or
//! write so nothing can leak between calls.

use crate::db::value::Value;
use crate::errors::ConvertError;
use chrono::DateTime;
use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

/// Transformation contract shared by the row decoder and the upsert builder.
pub trait Converter: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Converts a raw storage value into a field value.
    ///
    /// # Errors
    /// Returns [`ConvertError`] when the raw value cannot be represented.
    fn read(&self, raw: Value) -> Result<Value, ConvertError>;

    /// Converts a field value back into its storage form. Identity by default.
    ///
    /// # Errors
    /// Returns [`ConvertError`] when the value cannot be stored.
    fn write(&self, value: Value) -> Result<Value, ConvertError> {
        Ok(value)
    }

    /// Whether the decoder must call [`Converter::read_with_state`] instead of
    /// [`Converter::read`].
    fn uses_read_with_state(&self) -> bool {
        false
    }

    /// Two-phase read: the converted value plus auxiliary state handed to the
    /// field's post-parse hook.
    ///
    /// # Errors
    /// Returns [`ConvertError`] when the raw value cannot be represented.
    fn read_with_state(&self, raw: Value) -> Result<(Value, Value), ConvertError> {
        Ok((self.read(raw)?, Value::Null))
    }
}

/// Produces a fresh converter instance. Failure is reported as a message and
/// surfaces as a schema construction error.
pub type ConverterFactory = fn() -> Result<Box<dyn Converter>, String>;

/// Factory for any converter type with a `Default` instance.
#[allow(clippy::unnecessary_wraps)]
pub fn factory_of<C: Converter + Default + 'static>() -> Result<Box<dyn Converter>, String> {
    Ok(Box::new(C::default()))
}

/// Reads through the converter, honouring its two-phase capability.
///
/// Returns the converted value and the hook state (`Null` when the converter
/// does not use the two-phase protocol).
pub fn read_two_phase(
    converter: &dyn Converter,
    raw: Value,
) -> Result<(Value, Value), ConvertError> {
    if converter.uses_read_with_state() {
        converter.read_with_state(raw)
    } else {
        Ok((converter.read(raw)?, Value::Null))
    }
}

/// Name-keyed converter factories.
///
/// Entity schemas can refer to converters by name; names are resolved once,
/// when the schema is built.
pub struct ConverterRegistry {
    factories: RwLock<HashMap<String, ConverterFactory>>,
}

impl ConverterRegistry {
    /// Registry pre-populated with the standard converters.
    #[must_use]
    pub fn with_standard() -> Self {
        let registry = Self {
            factories: RwLock::new(HashMap::new()),
        };
        registry.register(
            UnixTimestampConverter::NAME,
            factory_of::<UnixTimestampConverter>,
        );
        registry.register(SnowflakeConverter::NAME, factory_of::<SnowflakeConverter>);
        registry
    }

    /// Process-wide registry used by schema construction.
    pub fn global() -> &'static Self {
        static REGISTRY: OnceLock<ConverterRegistry> = OnceLock::new();
        REGISTRY.get_or_init(Self::with_standard)
    }

    /// Registers (or replaces) a named converter factory.
    pub fn register(&self, name: &str, factory: ConverterFactory) {
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), factory);
    }

    /// Looks up a factory by name.
    pub fn resolve(&self, name: &str) -> Option<ConverterFactory> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }
}

/// Unix epoch seconds (signed or unsigned 64-bit) to a UTC timestamp.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixTimestampConverter;

impl UnixTimestampConverter {
    /// Registry name.
    pub const NAME: &'static str = "unix_timestamp";

    fn from_seconds(seconds: i64) -> Result<Value, ConvertError> {
        DateTime::from_timestamp(seconds, 0)
            .map(Value::Timestamp)
            .ok_or_else(|| ConvertError::OutOfRange {
                converter: Self::NAME,
                value: seconds.to_string(),
            })
    }
}

impl Converter for UnixTimestampConverter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn read(&self, raw: Value) -> Result<Value, ConvertError> {
        match raw {
            Value::Null => Ok(Value::Null),
            Value::Int(seconds) => Self::from_seconds(seconds),
            Value::UInt(seconds) => {
                let seconds = i64::try_from(seconds).map_err(|_| ConvertError::OutOfRange {
                    converter: Self::NAME,
                    value: seconds.to_string(),
                })?;
                Self::from_seconds(seconds)
            }
            other => Err(ConvertError::Unsupported {
                converter: Self::NAME,
                found: other.kind(),
            }),
        }
    }

    fn write(&self, value: Value) -> Result<Value, ConvertError> {
        Ok(match value {
            Value::Timestamp(at) => Value::Int(at.timestamp()),
            other => other,
        })
    }
}

/// Discord snowflakes are `u64`, SQL integer columns are `i64`. The bits are
/// reinterpreted in both directions so IDs above `i64::MAX` survive storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnowflakeConverter;

impl SnowflakeConverter {
    /// Registry name.
    pub const NAME: &'static str = "snowflake";
}

impl Converter for SnowflakeConverter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    #[allow(clippy::cast_sign_loss)]
    fn read(&self, raw: Value) -> Result<Value, ConvertError> {
        match raw {
            Value::Null => Ok(Value::Null),
            Value::Int(id) => Ok(Value::UInt(id as u64)),
            Value::UInt(id) => Ok(Value::UInt(id)),
            other => Err(ConvertError::Unsupported {
                converter: Self::NAME,
                found: other.kind(),
            }),
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    fn write(&self, value: Value) -> Result<Value, ConvertError> {
        Ok(match value {
            Value::UInt(id) => Value::Int(id as i64),
            other => other,
        })
    }
}
