//! Lifecycle tracking shared by every persisted entity.

use crate::db::schema::SchemaBuilder;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Bookkeeping carried by every entity: whether it was ever loaded, when a
/// mapped field was last read, and whether it has unsaved changes.
///
/// `last_accessed` is updated from `&self` accessors while the entity sits
/// behind a shared read guard, so it is stored atomically as epoch millis.
#[derive(Debug, Default)]
pub struct Lifecycle {
    filled: bool,
    last_accessed: AtomicI64,
    last_modified: Option<DateTime<Utc>>,
}

impl Lifecycle {
    /// Names that belong to the tracking surface. Fields declared under these
    /// names are never mapped to storage columns.
    pub const FIELDS: [&'static str; 3] = ["filled", "last_accessed", "last_modified"];

    /// True once the entity was populated from storage.
    #[must_use]
    pub const fn filled(&self) -> bool {
        self.filled
    }

    /// Last time a mapped field was read on a filled entity.
    #[must_use]
    pub fn last_accessed(&self) -> Option<DateTime<Utc>> {
        match self.last_accessed.load(Ordering::Relaxed) {
            0 => None,
            millis => DateTime::from_timestamp_millis(millis),
        }
    }

    /// Set while the entity has changes not yet persisted.
    #[must_use]
    pub const fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    /// Marks the entity as loaded from storage.
    pub fn mark_filled(&mut self) {
        self.filled = true;
        self.touch_accessed();
    }

    /// Records a read of a mapped field. No-op until the entity is filled.
    pub fn touch_accessed(&self) {
        if self.filled {
            self.last_accessed
                .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        }
    }

    /// Records a write of a mapped field. No-op until the entity is filled.
    pub fn touch_modified(&mut self) {
        if self.filled {
            self.last_modified = Some(Utc::now());
        }
    }

    /// Called after a successful save.
    pub fn clear_modified(&mut self) {
        self.last_modified = None;
    }
}

impl Clone for Lifecycle {
    fn clone(&self) -> Self {
        Self {
            filled: self.filled,
            last_accessed: AtomicI64::new(self.last_accessed.load(Ordering::Relaxed)),
            last_modified: self.last_modified,
        }
    }
}

/// A type persisted through the metadata-driven mapper.
///
/// Implementors declare their column bindings once in [`Entity::declare`];
/// the declaration is turned into an immutable, cached schema by
/// [`crate::db::schema::describe`].
pub trait Entity: Default + Send + Sync + 'static {
    /// Type name used in logs and errors.
    const NAME: &'static str;

    /// Declares fields, hook methods and the type-level post-parse hook.
    fn declare(schema: &mut SchemaBuilder<Self>);

    /// Lifecycle metadata.
    fn lifecycle(&self) -> &Lifecycle;

    /// Mutable lifecycle metadata.
    fn lifecycle_mut(&mut self) -> &mut Lifecycle;
}
