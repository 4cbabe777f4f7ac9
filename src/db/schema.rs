//! Entity schemas: the immutable column binding table for one entity type.
//!
//! Entities describe themselves once through [`Entity::declare`]. [`describe`]
//! validates the declaration, resolves converters and hook methods by name,
//! and caches the resulting [`Schema`] for the lifetime of the process. Both
//! the row decoder and the upsert builder work from the same schema.

use crate::db::converter::{Converter, ConverterFactory, ConverterRegistry, factory_of};
use crate::db::lifecycle::{Entity, Lifecycle};
use crate::db::value::{FieldValue, Value, ValueKind};
use crate::errors::{Error, Result, SchemaError};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::{debug, trace};

/// Signature of a post-parse hook method. Field hooks receive exactly one
/// argument (the converter state); type-level hooks receive one raw value per
/// declared column.
pub type HookFn<T> = fn(&mut T, Vec<Value>) -> Result<()>;

type Getter<T> = Box<dyn Fn(&T) -> Value + Send + Sync>;
type Setter<T> = Box<dyn Fn(&mut T, Value) -> Result<(), Value> + Send + Sync>;

enum ConverterDecl {
    Typed(ConverterFactory),
    Named(String),
}

/// One field as declared by the entity. Finalised into a [`ColumnBinding`].
pub struct FieldDecl<T> {
    field: &'static str,
    column: Option<String>,
    primary: bool,
    ignore: bool,
    converter: Option<ConverterDecl>,
    hook: Option<String>,
    kind: ValueKind,
    get: Getter<T>,
    set: Setter<T>,
}

impl<T> FieldDecl<T> {
    /// Storage column name. Defaults to the field name.
    pub fn column(&mut self, name: &str) -> &mut Self {
        self.column = Some(name.to_string());
        self
    }

    /// Marks this field as the primary key column.
    pub const fn primary(&mut self) -> &mut Self {
        self.primary = true;
        self
    }

    /// Excludes the field from both decode and upsert.
    pub const fn ignore(&mut self) -> &mut Self {
        self.ignore = true;
        self
    }

    /// Binds a converter by type.
    pub fn converter<C: Converter + Default + 'static>(&mut self) -> &mut Self {
        self.converter = Some(ConverterDecl::Typed(factory_of::<C>));
        self
    }

    /// Binds a converter by its [`ConverterRegistry`] name.
    pub fn converter_named(&mut self, name: &str) -> &mut Self {
        self.converter = Some(ConverterDecl::Named(name.to_string()));
        self
    }

    /// Hook method invoked right after this field is decoded.
    pub fn after_parse(&mut self, method: &str) -> &mut Self {
        self.hook = Some(method.to_string());
        self
    }
}

struct MethodDecl<T> {
    arity: usize,
    f: HookFn<T>,
}

/// Collects an entity's declaration. See [`Entity::declare`].
pub struct SchemaBuilder<T> {
    fields: Vec<FieldDecl<T>>,
    methods: HashMap<String, MethodDecl<T>>,
    type_hook: Option<(String, Vec<String>)>,
}

impl<T: Entity> SchemaBuilder<T> {
    fn new() -> Self {
        Self {
            fields: Vec::new(),
            methods: HashMap::new(),
            type_hook: None,
        }
    }

    /// Declares a mapped field through a getter and a setter.
    ///
    /// The getter and setter must touch the struct field directly; the public
    /// accessors of an entity update lifecycle metadata, the mapper must not.
    pub fn field<V, G, S>(&mut self, name: &'static str, get: G, set: S) -> &mut FieldDecl<T>
    where
        V: FieldValue,
        G: Fn(&T) -> V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.fields.push(FieldDecl {
            field: name,
            column: None,
            primary: false,
            ignore: false,
            converter: None,
            hook: None,
            kind: V::KIND,
            get: Box::new(move |entity| get(entity).into_value()),
            set: Box::new(move |entity, value| {
                set(entity, V::from_value(value)?);
                Ok(())
            }),
        });
        let last = self.fields.len() - 1;
        &mut self.fields[last]
    }

    /// Registers a hook method under `name`, taking `arity` arguments.
    pub fn method(&mut self, name: &str, arity: usize, f: HookFn<T>) -> &mut Self {
        self.methods.insert(name.to_string(), MethodDecl { arity, f });
        self
    }

    /// Declares the type-level post-parse hook: `method` runs once after the
    /// whole row is decoded and receives the raw values of `columns`.
    pub fn after_parse(&mut self, method: &str, columns: &[&str]) -> &mut Self {
        self.type_hook = Some((
            method.to_string(),
            columns.iter().map(ToString::to_string).collect(),
        ));
        self
    }

    fn resolve_hook(&self, method: String, expected: usize) -> Result<Hook<T>, SchemaError> {
        let decl = self
            .methods
            .get(&method)
            .ok_or_else(|| SchemaError::UnknownHook {
                entity: T::NAME,
                method: method.clone(),
            })?;
        if decl.arity != expected {
            return Err(SchemaError::HookArity {
                entity: T::NAME,
                method,
                expected,
                actual: decl.arity,
            });
        }
        Ok(Hook { method, f: decl.f })
    }

    fn build(mut self, registry: &ConverterRegistry) -> Result<Schema<T>, SchemaError> {
        let fields = std::mem::take(&mut self.fields);
        let mut bindings: Vec<ColumnBinding<T>> = Vec::with_capacity(fields.len());
        let mut primary = Vec::new();

        for decl in fields {
            if Lifecycle::FIELDS.contains(&decl.field) {
                debug!(entity = T::NAME, field = decl.field, "skipping lifecycle field");
                continue;
            }
            if decl.ignore {
                trace!(entity = T::NAME, field = decl.field, "skipping ignored field");
                continue;
            }

            let column = decl.column.unwrap_or_else(|| decl.field.to_string());
            if bindings
                .iter()
                .any(|b| b.column.eq_ignore_ascii_case(&column))
            {
                return Err(SchemaError::DuplicateColumn {
                    entity: T::NAME,
                    column,
                });
            }

            let converter = match decl.converter {
                None => None,
                Some(ConverterDecl::Typed(factory)) => Some(factory),
                Some(ConverterDecl::Named(name)) => Some(registry.resolve(&name).ok_or_else(
                    || SchemaError::UnknownConverter {
                        entity: T::NAME,
                        field: decl.field.to_string(),
                        converter: name.clone(),
                    },
                )?),
            };
            // Probe instantiation
            if let Some(factory) = converter {
                factory().map_err(|message| SchemaError::ConverterInstantiation {
                    entity: T::NAME,
                    field: decl.field.to_string(),
                    message,
                })?;
            }

            let hook = decl
                .hook
                .map(|method| self.resolve_hook(method, 1))
                .transpose()?;

            if decl.primary {
                primary.push(bindings.len());
            }
            bindings.push(ColumnBinding {
                entity: T::NAME,
                field: decl.field,
                column,
                kind: decl.kind,
                converter,
                hook,
                get: decl.get,
                set: decl.set,
            });
        }

        let [primary] = primary.as_slice() else {
            return Err(SchemaError::PrimaryKey {
                entity: T::NAME,
                found: primary.len(),
            });
        };
        let primary = *primary;

        let type_hook = match self.type_hook.take() {
            None => None,
            Some((method, columns)) => {
                let hook = self.resolve_hook(method, columns.len())?;
                Some(TypeHook { hook, columns })
            }
        };

        Ok(Schema {
            bindings,
            primary,
            type_hook,
        })
    }
}

/// A hook method resolved at schema construction.
pub struct Hook<T> {
    method: String,
    f: HookFn<T>,
}

impl<T> Hook<T> {
    /// Method name as declared.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Calls the hook, discarding nothing but its unit result.
    pub fn invoke(&self, entity: &mut T, args: Vec<Value>) -> Result<()> {
        (self.f)(entity, args)
    }
}

/// The type-level post-parse hook and the raw columns it consumes.
pub struct TypeHook<T> {
    hook: Hook<T>,
    columns: Vec<String>,
}

impl<T> TypeHook<T> {
    /// The resolved hook method.
    pub const fn hook(&self) -> &Hook<T> {
        &self.hook
    }

    /// Upstream column names, in argument order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Links one entity field to one storage column.
pub struct ColumnBinding<T> {
    entity: &'static str,
    field: &'static str,
    column: String,
    kind: ValueKind,
    converter: Option<ConverterFactory>,
    hook: Option<Hook<T>>,
    get: Getter<T>,
    set: Setter<T>,
}

impl<T> ColumnBinding<T> {
    /// Rust field name.
    pub const fn field(&self) -> &'static str {
        self.field
    }

    /// Storage column name.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Kind a raw value must have to be assigned without a converter.
    pub const fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Field-level post-parse hook, if declared.
    pub const fn hook(&self) -> Option<&Hook<T>> {
        self.hook.as_ref()
    }

    /// Whether a converter is bound.
    pub const fn has_converter(&self) -> bool {
        self.converter.is_some()
    }

    /// A fresh converter instance, if one is bound.
    pub fn converter(&self) -> Result<Option<Box<dyn Converter>>> {
        self.converter
            .map(|factory| {
                factory().map_err(|message| {
                    Error::Schema(SchemaError::ConverterInstantiation {
                        entity: self.entity,
                        field: self.field.to_string(),
                        message,
                    })
                })
            })
            .transpose()
    }

    /// Current in-memory value of the field, before any converter.
    pub fn read(&self, entity: &T) -> Value {
        (self.get)(entity)
    }

    /// Assigns a value if its kind matches the field exactly; otherwise the
    /// value is handed back and the field is left untouched.
    pub fn assign(&self, entity: &mut T, value: Value) -> Result<(), Value> {
        (self.set)(entity, value)
    }

    /// Field value in storage form: read, then passed through the converter's
    /// `write` when one is bound.
    pub fn storage_value(&self, entity: &T) -> Result<Value> {
        let value = self.read(entity);
        match self.converter()? {
            Some(converter) => Ok(converter.write(value)?),
            None => Ok(value),
        }
    }
}

/// Immutable binding table for one entity type.
pub struct Schema<T> {
    bindings: Vec<ColumnBinding<T>>,
    primary: usize,
    type_hook: Option<TypeHook<T>>,
}

impl<T> Schema<T> {
    /// Mapped columns in declaration order. Ignored and lifecycle fields are
    /// never present.
    pub fn bindings(&self) -> &[ColumnBinding<T>] {
        &self.bindings
    }

    /// The primary key binding.
    pub fn primary(&self) -> &ColumnBinding<T> {
        &self.bindings[self.primary]
    }

    /// Type-level post-parse hook, if declared.
    pub const fn type_hook(&self) -> Option<&TypeHook<T>> {
        self.type_hook.as_ref()
    }

    /// Finds a binding by storage column name, ignoring case.
    pub fn binding(&self, column: &str) -> Option<&ColumnBinding<T>> {
        self.bindings
            .iter()
            .find(|b| b.column.eq_ignore_ascii_case(column))
    }
}

type SchemaMap = RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>;

fn schemas() -> &'static SchemaMap {
    static SCHEMAS: OnceLock<SchemaMap> = OnceLock::new();
    SCHEMAS.get_or_init(|| RwLock::new(HashMap::new()))
}

#[allow(clippy::expect_used)] // Entries are keyed by `TypeId::of::<T>()`, the downcast cannot miss
fn downcast<T: Entity>(erased: Arc<dyn Any + Send + Sync>) -> Arc<Schema<T>> {
    Arc::downcast::<Schema<T>>(erased).expect("schema cache entry keyed by its own TypeId")
}

/// Returns the schema for `T`, building and caching it on first use.
///
/// Every later call returns the same `Arc`. A failed construction is not
/// cached, so it is reported again on the next call.
///
/// # Errors
/// Returns [`SchemaError`] when the declaration is invalid.
pub fn describe<T: Entity>() -> Result<Arc<Schema<T>>, SchemaError> {
    let key = TypeId::of::<T>();
    let cached = schemas()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
        .cloned();
    if let Some(erased) = cached {
        return Ok(downcast(erased));
    }

    let mut builder = SchemaBuilder::<T>::new();
    T::declare(&mut builder);
    let built: Arc<dyn Any + Send + Sync> = Arc::new(builder.build(ConverterRegistry::global())?);

    // First schema stored wins
    let erased = Arc::clone(
        schemas()
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(built),
    );
    let schema = downcast::<T>(erased);
    debug!(
        entity = T::NAME,
        columns = schema.bindings().len(),
        "schema described"
    );
    Ok(schema)
}
