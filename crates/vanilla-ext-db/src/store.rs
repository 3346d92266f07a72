//! Storage for model instances.
//!
//! [`ModelStore`] is the only persistence interface the form layer uses.
//! Applications implement it over their database of choice; [`MemoryStore`]
//! is a complete in-process implementation used by tests and prototypes.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use vanilla_ext_core::{VanillaError, VanillaResult};

use crate::model::Model;
use crate::value::Value;

/// Async storage for instances of one model type.
#[async_trait]
pub trait ModelStore<M: Model>: Send + Sync {
    /// Fetches the instance with the given primary key.
    ///
    /// Returns [`VanillaError::DoesNotExist`] when no row matches.
    async fn get(&self, pk: &Value) -> VanillaResult<M>;

    /// Returns every stored instance in primary key order.
    async fn all(&self) -> VanillaResult<Vec<M>>;

    /// Returns the instances whose `field` equals `value`, in primary key order.
    async fn filter(&self, field: &str, value: &Value) -> VanillaResult<Vec<M>>;

    /// Inserts or updates `instance`. An insert assigns the primary key.
    async fn save(&self, instance: &mut M) -> VanillaResult<()>;

    /// Deletes `instance`.
    async fn delete(&self, instance: &M) -> VanillaResult<()>;
}

/// An in-memory [`ModelStore`] keyed by integer primary keys.
///
/// # Examples
///
/// ```ignore
/// let store = MemoryStore::<Author>::new();
/// let mut author = Author { id: None, name: "Ursula".into() };
/// store.save(&mut author).await?;
/// assert_eq!(author.id, Some(1));
/// ```
pub struct MemoryStore<M: Model> {
    rows: RwLock<BTreeMap<i64, M>>,
    next_id: AtomicI64,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Default for MemoryStore<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> MemoryStore<M> {
    /// Creates an empty store. The first insert receives primary key 1.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            _model: PhantomData,
        }
    }

    /// Returns the number of stored rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Returns `true` if the store holds no rows.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    fn integer_pk(pk: &Value) -> VanillaResult<i64> {
        pk.as_i64().ok_or_else(|| {
            VanillaError::IntegrityError(format!(
                "{} primary key must be an integer, got {pk}",
                M::meta().label()
            ))
        })
    }
}

#[async_trait]
impl<M: Model> ModelStore<M> for MemoryStore<M> {
    async fn get(&self, pk: &Value) -> VanillaResult<M> {
        let id = Self::integer_pk(pk)?;
        self.rows.read().await.get(&id).cloned().ok_or_else(|| {
            VanillaError::DoesNotExist(format!("{} matching pk={pk}", M::meta().label()))
        })
    }

    async fn all(&self) -> VanillaResult<Vec<M>> {
        Ok(self.rows.read().await.values().cloned().collect())
    }

    async fn filter(&self, field: &str, value: &Value) -> VanillaResult<Vec<M>> {
        M::meta().get_field(field)?;
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|row| row.field_value(field).as_ref() == Some(value))
            .cloned()
            .collect())
    }

    async fn save(&self, instance: &mut M) -> VanillaResult<()> {
        let mut rows = self.rows.write().await;
        let id = match instance.pk() {
            Some(pk) => {
                let id = Self::integer_pk(&pk)?;
                self.next_id.fetch_max(id + 1, Ordering::SeqCst);
                id
            }
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                instance.set_pk(Value::Int(id));
                id
            }
        };
        let created = rows.insert(id, instance.clone()).is_none();
        tracing::debug!(model = %M::meta().label(), pk = id, created, "saved row");
        Ok(())
    }

    async fn delete(&self, instance: &M) -> VanillaResult<()> {
        let pk = instance.pk().ok_or_else(|| {
            VanillaError::IntegrityError(format!(
                "{} object can't be deleted because its primary key is not set",
                M::meta().label()
            ))
        })?;
        let id = Self::integer_pk(&pk)?;
        if self.rows.write().await.remove(&id).is_none() {
            return Err(VanillaError::DoesNotExist(format!(
                "{} matching pk={id}",
                M::meta().label()
            )));
        }
        tracing::debug!(model = %M::meta().label(), pk = id, "deleted row");
        Ok(())
    }
}
