//! Read-through entity cache, one per entity type and table.

use crate::db::Storage;
use crate::db::lifecycle::Entity;
use crate::db::query::{build_lookup, build_upsert};
use crate::db::row::{RowSet, decode};
use crate::db::schema::{Schema, describe};
use crate::db::value::FieldValue;
use crate::errors::{Error, Result};
use sea_orm::ConnectionTrait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument};

/// A cached entity, shared by every caller that looked it up.
///
/// Mutate through the write guard and then save to keep the cached copy and
/// storage in step.
pub type Shared<T> = Arc<RwLock<T>>;

struct Entries<K, T> {
    /// Bumped by every clear; a load started before a clear is not stored.
    generation: u64,
    map: HashMap<K, Shared<T>>,
}

/// Concurrent key → entity map with read-through loading.
///
/// Entries live until [`EntityCache::invalidate_all`]; there is no expiry and
/// no size bound. Absent rows are never cached.
pub struct EntityCache<K, T> {
    storage: Arc<Storage>,
    table_key: String,
    table: Option<String>,
    schema: Arc<Schema<T>>,
    entries: RwLock<Entries<K, T>>,
}

impl<K, T> EntityCache<K, T>
where
    K: FieldValue + Clone + Eq + Hash + Debug,
    T: Entity,
{
    /// Creates the cache for `T` over the table configured under `table_key`.
    ///
    /// Without a configured table the cache is disabled: the condition is
    /// logged here, once, and every `get` returns `None`.
    ///
    /// # Errors
    /// Returns a schema error when `T` declares an invalid schema.
    pub fn new(storage: &Arc<Storage>, table_key: &str) -> Result<Self> {
        let schema = describe::<T>()?;
        let table = storage.table(table_key).map(ToString::to_string);
        if table.is_none() {
            error!(
                entity = T::NAME,
                "{table_key} table name is missing, no database service will be provided to this table"
            );
        }
        Ok(Self {
            storage: Arc::clone(storage),
            table_key: table_key.to_string(),
            table,
            schema,
            entries: RwLock::new(Entries {
                generation: 0,
                map: HashMap::new(),
            }),
        })
    }

    /// Whether a backing table is configured.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.table.is_some()
    }

    /// Returns the entity stored under `key`, loading it on a miss.
    ///
    /// Two concurrent misses for one key may both query storage; the first
    /// instance stored is the one every caller gets back. A load that races
    /// [`EntityCache::invalidate_all`] is returned to its caller but not cached.
    ///
    /// # Errors
    /// Query and decode errors propagate; the cache is left unchanged.
    #[instrument(skip(self), fields(entity = T::NAME))]
    pub async fn get(&self, key: K) -> Result<Option<Shared<T>>> {
        let Some(table) = self.table.as_deref() else {
            return Ok(None);
        };
        let generation = {
            let entries = self.entries.read().await;
            if let Some(hit) = entries.map.get(&key) {
                return Ok(Some(Arc::clone(hit)));
            }
            entries.generation
        };

        debug!("looking for entity in database");
        let statement = build_lookup(
            self.storage.backend(),
            table,
            &self.schema,
            key.clone().into_value(),
        )?;
        let rows = RowSet::fetch(self.storage.connection(), statement).await?;
        let Some(entity) = decode(rows, &self.schema)? else {
            debug!("no row found");
            return Ok(None);
        };

        Ok(Some(self.store(key, entity, generation).await))
    }

    /// Caches a freshly loaded entity unless the cache was cleared since the
    /// load began at `generation`.
    async fn store(&self, key: K, entity: T, generation: u64) -> Shared<T> {
        let mut entries = self.entries.write().await;
        if entries.generation != generation {
            debug!("cache cleared during load, entity not cached");
            return Arc::new(RwLock::new(entity));
        }
        Arc::clone(
            entries
                .map
                .entry(key)
                .or_insert_with(|| Arc::new(RwLock::new(entity))),
        )
    }

    /// Upserts `entity` and clears its pending-changes marker.
    ///
    /// Does not touch the cache map: mutate the cached instance itself to see
    /// the change through later `get` calls.
    ///
    /// # Errors
    /// Returns [`Error::TableNotConfigured`] for a disabled cache; query
    /// errors propagate and leave `last_modified` set.
    #[instrument(skip_all, fields(entity = T::NAME))]
    pub async fn save(&self, entity: &mut T) -> Result<()> {
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| Error::TableNotConfigured {
                key: self.table_key.clone(),
            })?;
        let statement = build_upsert(self.storage.backend(), table, entity, &self.schema)?;
        self.storage.connection().execute(statement).await?;
        entity.lifecycle_mut().clear_modified();
        debug!("entity saved");
        Ok(())
    }

    /// Drops every cached entry. Instances already handed out stay valid.
    pub async fn invalidate_all(&self) {
        let mut entries = self.entries.write().await;
        let dropped = entries.map.len();
        entries.map.clear();
        entries.generation = entries.generation.wrapping_add(1);
        info!(entity = T::NAME, dropped, "entity cache cleared");
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.map.len()
    }

    /// Whether nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.map.is_empty()
    }
}
