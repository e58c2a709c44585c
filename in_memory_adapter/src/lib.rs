use std::{collections::HashMap, fmt::Display, hash::Hash};

use json_store_adapter::db::{DbError, Repository};
use tokio::sync::RwLock;

/// Volatile repository, same contract as the JSON file store
#[derive(Debug)]
pub struct InMemoryRepo<T, Id> {
    storage: RwLock<HashMap<Id, T>>,
    table: &'static str,
}

impl<T, Id> InMemoryRepo<T, Id>
where
    Id: Clone + Eq + Hash,
{
    #[must_use]
    pub fn new(table: &'static str) -> Self {
        Self {
            storage: RwLock::new(HashMap::new()),
            table,
        }
    }
}

impl<T, Id> Repository<T, Id> for InMemoryRepo<T, Id>
where
    T: Clone,
    Id: Clone + Eq + Hash + Display,
{
    async fn insert(&self, id: Id, item: T) -> Result<(), DbError> {
        let mut storage = self.storage.write().await;
        if storage.contains_key(&id) {
            return Err(DbError::AlreadyExists {
                table: self.table.to_string(),
                id: id.to_string(),
            });
        }
        storage.insert(id, item);
        Ok(())
    }

    async fn update(&self, id: Id, item: T) -> Result<(), DbError> {
        let mut storage = self.storage.write().await;
        match storage.get_mut(&id) {
            Some(slot) => {
                *slot = item;
                Ok(())
            }
            None => Err(DbError::NotFound {
                table: self.table.to_string(),
                id: id.to_string(),
            }),
        }
    }

    async fn remove(&self, id: Id) -> Result<(), DbError> {
        self.storage.write().await.remove(&id);
        Ok(())
    }

    async fn get(&self, id: &Id) -> Result<Option<T>, DbError> {
        Ok(self.storage.read().await.get(id).cloned())
    }

    async fn len(&self) -> Result<usize, DbError> {
        Ok(self.storage.read().await.len())
    }
}
