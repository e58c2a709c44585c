use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("Runtime error: {0}")]
    TaskError(String),
    #[error("Record {id} already exists in {table}")]
    AlreadyExists { table: String, id: String },
    #[error("Record {id} not found in {table}")]
    NotFound { table: String, id: String },
}

impl From<tokio::task::JoinError> for DbError {
    fn from(error: tokio::task::JoinError) -> Self {
        DbError::TaskError(error.to_string())
    }
}

#[allow(async_fn_in_trait)]
pub trait Repository<T, Id> {
    /// Insert a new item with the given ID
    /// # Errors
    /// - Returns `DbError::AlreadyExists` if the ID is taken
    /// - Returns `DbError` if the operation fails
    async fn insert(&self, id: Id, item: T) -> Result<(), DbError>;
    /// Replace an existing item with the given ID
    /// # Errors
    /// - Returns `DbError::NotFound` if there is no item with this ID
    /// - Returns `DbError` if the operation fails
    async fn update(&self, id: Id, item: T) -> Result<(), DbError>;
    /// Remove an item with the given ID, if present
    /// # Errors
    /// - Returns `DbError` if the operation fails
    async fn remove(&self, id: Id) -> Result<(), DbError>;
    /// Get an item by ID
    /// # Errors
    /// - Returns `DbError` if the operation fails
    async fn get(&self, id: &Id) -> Result<Option<T>, DbError>;
    /// Get the number of items in the repository
    /// # Errors
    /// - Returns `DbError` if the operation fails
    async fn len(&self) -> Result<usize, DbError>;
    /// Check if the repository is empty
    /// # Errors
    /// - Returns `DbError` if the operation fails
    async fn is_empty(&self) -> Result<bool, DbError> {
        Ok(self.len().await? == 0)
    }
    /// Check if an item with the given ID exists
    /// # Errors
    /// - Returns `DbError` if the operation fails
    async fn contains(&self, id: &Id) -> Result<bool, DbError> {
        Ok(self.get(id).await?.is_some())
    }
}

type Table = serde_json::Map<String, Value>;
type Document = BTreeMap<String, Table>;

/// A single JSON document on disk holding named tables of records.
///
/// The document is loaded once and cached. Every mutation rewrites the whole
/// file through a temporary file that is renamed over the original, so a
/// crash leaves either the old or the new document behind.
#[derive(Clone)]
pub struct JsonFileStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    path: PathBuf,
    document: Arc<Mutex<Document>>,
}

impl std::fmt::Debug for JsonFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileStore")
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}

impl JsonFileStore {
    /// Open the store at `path`, creating the file (and its parent directory)
    /// if needed and making sure every table in `tables` exists.
    /// # Errors
    /// - Returns `DbError::SerdeError` if the file is not a valid store document
    /// - Returns `DbError` if the file cannot be read or written
    pub async fn open(path: impl Into<PathBuf>, tables: &[&str]) -> Result<Self, DbError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let (mut document, mut dirty) = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => (Document::new(), true),
            Ok(bytes) => (serde_json::from_slice::<Document>(&bytes)?, false),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (Document::new(), true),
            Err(e) => return Err(e.into()),
        };

        for table in tables {
            if !document.contains_key(*table) {
                document.insert((*table).to_string(), Table::new());
                dirty = true;
            }
        }

        if dirty {
            write_document(&path, &document).await?;
        }
        info!("Opened JSON store at {}", path.display());

        Ok(Self {
            inner: Arc::new(StoreInner {
                path,
                document: Arc::new(Mutex::new(document)),
            }),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Get a typed view over one table of the store
    #[must_use]
    pub fn repo<T, Id>(&self, table: &str) -> JsonFileRepo<T, Id> {
        JsonFileRepo {
            store: self.clone(),
            table: table.to_string(),
            _phantom: PhantomData,
        }
    }

    async fn read<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        let document = self.inner.document.lock().await;
        f(&document)
    }

    /// Apply `f` to a copy of the document, persist it, then swap it in.
    /// The cached document is untouched if `f` or the write fails.
    ///
    /// The write and the swap run in one blocking task that owns the lock, so
    /// dropping the returned future after it started writing cannot leave the
    /// file and the cached document out of step.
    async fn mutate<R>(
        &self,
        f: impl FnOnce(&mut Document) -> Result<R, DbError>,
    ) -> Result<R, DbError> {
        let mut document = Arc::clone(&self.inner.document).lock_owned().await;
        let mut next = document.clone();
        let out = f(&mut next)?;
        let bytes = serde_json::to_vec_pretty(&next)?;
        let path = self.inner.path.clone();

        tokio::task::spawn_blocking(move || {
            if let Err(e) = write_atomically(&path, &bytes) {
                error!("Failed to write {}: {e}", path.display());
                return Err(DbError::from(e));
            }
            *document = next;
            Ok(())
        })
        .await??;
        Ok(out)
    }
}

async fn write_document(path: &Path, document: &Document) -> Result<(), DbError> {
    let bytes = serde_json::to_vec_pretty(document)?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomically(&path, &bytes)).await??;
    Ok(())
}

fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Generic repository over one table of a [`JsonFileStore`], stores T as JSON
pub struct JsonFileRepo<T, Id> {
    store: JsonFileStore,
    table: String,
    _phantom: PhantomData<fn() -> (T, Id)>,
}

impl<T, Id> Clone for JsonFileRepo<T, Id> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            table: self.table.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T, Id> std::fmt::Debug for JsonFileRepo<T, Id> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileRepo")
            .field("path", &self.store.path())
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl<T, Id> JsonFileRepo<T, Id> {
    fn not_found(&self, id: String) -> DbError {
        DbError::NotFound {
            table: self.table.clone(),
            id,
        }
    }
}

impl<T, Id> Repository<T, Id> for JsonFileRepo<T, Id>
where
    T: Serialize + DeserializeOwned,
    Id: ToString,
{
    async fn insert(&self, id: Id, item: T) -> Result<(), DbError> {
        let data = serde_json::to_value(item)?;
        let id_str = id.to_string();

        self.store
            .mutate(|document| {
                let table = document.entry(self.table.clone()).or_default();
                if table.contains_key(&id_str) {
                    return Err(DbError::AlreadyExists {
                        table: self.table.clone(),
                        id: id_str.clone(),
                    });
                }
                table.insert(id_str.clone(), data);
                Ok(())
            })
            .await?;

        debug!("Inserted {id_str} into {}", self.table);
        Ok(())
    }

    async fn update(&self, id: Id, item: T) -> Result<(), DbError> {
        let data = serde_json::to_value(item)?;
        let id_str = id.to_string();

        self.store
            .mutate(|document| {
                match document
                    .get_mut(&self.table)
                    .and_then(|table| table.get_mut(&id_str))
                {
                    Some(slot) => {
                        *slot = data;
                        Ok(())
                    }
                    None => Err(self.not_found(id_str.clone())),
                }
            })
            .await?;

        debug!("Updated {id_str} in {}", self.table);
        Ok(())
    }

    async fn remove(&self, id: Id) -> Result<(), DbError> {
        let id_str = id.to_string();

        self.store
            .mutate(|document| {
                if let Some(table) = document.get_mut(&self.table) {
                    table.remove(&id_str);
                }
                Ok(())
            })
            .await
    }

    async fn get(&self, id: &Id) -> Result<Option<T>, DbError> {
        let id_str = id.to_string();

        let row = self
            .store
            .read(|document| {
                document
                    .get(&self.table)
                    .and_then(|table| table.get(&id_str))
                    .cloned()
            })
            .await;

        Ok(row.map(serde_json::from_value).transpose()?)
    }

    async fn len(&self) -> Result<usize, DbError> {
        Ok(self
            .store
            .read(|document| document.get(&self.table).map_or(0, Table::len))
            .await)
    }

    async fn contains(&self, id: &Id) -> Result<bool, DbError> {
        let id_str = id.to_string();
        Ok(self
            .store
            .read(|document| {
                document
                    .get(&self.table)
                    .is_some_and(|table| table.contains_key(&id_str))
            })
            .await)
    }
}
