//! SQLite-backed record store
//!
//! Each record (`<collection>/<key>`) is one JSON document row. Paths deeper
//! than a record are read and written inside the document; writes that touch
//! several records run in one transaction.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::repositories::RecordStore;
use crate::infrastructure::config::defaults;
use crate::infrastructure::json_tree;

pub struct SqliteRecordStore {
    pool: SqlitePool,
    // SQLite has a single writer; read-modify-write transactions queue here
    write_lock: Mutex<()>,
}

/// A path split into record address and in-document remainder
struct RecordPath<'a> {
    collection: &'a str,
    key: Option<&'a str>,
    inner: Vec<&'a str>,
}

impl<'a> RecordPath<'a> {
    fn parse(path: &'a str) -> Result<Self> {
        let segments = json_tree::segments(path);
        match segments.as_slice() {
            [] => Err(anyhow!("Root path is not addressable")),
            [collection] => Ok(Self {
                collection: *collection,
                key: None,
                inner: Vec::new(),
            }),
            [collection, key, inner @ ..] => Ok(Self {
                collection: *collection,
                key: Some(*key),
                inner: inner.to_vec(),
            }),
        }
    }
}

impl SqliteRecordStore {
    /// Open (creating if needed) the database file and its schema.
    pub async fn open(database_path: &Path, max_connections: Option<u32>) -> Result<Self> {
        if let Some(parent) = database_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create database directory {:?}", parent))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.unwrap_or(defaults::DB_MAX_CONNECTIONS))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {:?}", database_path))?;

        let store = Self::from_pool(pool);
        store.migrate().await?;
        info!("🗄️ Record store ready: {:?}", database_path);
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                key TEXT NOT NULL,
                document TEXT NOT NULL,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (collection, key)
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All records of a collection, ordered by key
    pub async fn collection(&self, collection: &str) -> Result<Map<String, Value>> {
        let rows = sqlx::query("SELECT key, document FROM records WHERE collection = ? ORDER BY key")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let key: String = row.get("key");
                let document: String = row.get("document");
                let value = serde_json::from_str(&document)
                    .with_context(|| format!("Corrupt document {}/{}", collection, key))?;
                Ok((key, value))
            })
            .collect()
    }

    /// Seed a whole collection from an export map, replacing what was there.
    pub async fn import_collection(&self, collection: &str, records: Map<String, Value>) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(collection)
            .execute(&mut *tx)
            .await?;
        let count = records.len();
        for (key, document) in records {
            write_document(&mut tx, collection, &key, &document).await?;
        }
        tx.commit().await?;
        info!("Imported {} records into {}", count, collection);
        Ok(count)
    }

    /// Apply path writes atomically; `null` values delete.
    async fn apply_writes(&self, writes: Vec<(String, Value)>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let mut documents: HashMap<(String, String), Value> = HashMap::new();

        for (path, value) in &writes {
            let target = RecordPath::parse(path)?;
            let Some(key) = target.key else {
                let records = match value {
                    Value::Null => Map::new(),
                    Value::Object(records) => records.clone(),
                    _ => return Err(anyhow!("Collection {} can only be replaced by an object", target.collection)),
                };
                documents.retain(|(collection, _), _| collection != target.collection);
                sqlx::query("DELETE FROM records WHERE collection = ?")
                    .bind(target.collection)
                    .execute(&mut *tx)
                    .await?;
                for (key, document) in records {
                    documents.insert((target.collection.to_string(), key), document);
                }
                continue;
            };

            let address = (target.collection.to_string(), key.to_string());
            if !documents.contains_key(&address) {
                let current = read_document(&mut tx, target.collection, key).await?;
                documents.insert(address.clone(), current.unwrap_or(Value::Null));
            }
            if let Some(document) = documents.get_mut(&address) {
                if target.inner.is_empty() {
                    *document = value.clone();
                } else {
                    json_tree::set(document, &target.inner, value.clone());
                }
            }
        }

        for ((collection, key), document) in &documents {
            let empty = document.is_null() || document.as_object().is_some_and(Map::is_empty);
            if empty {
                sqlx::query("DELETE FROM records WHERE collection = ? AND key = ?")
                    .bind(collection)
                    .bind(key)
                    .execute(&mut *tx)
                    .await?;
            } else {
                write_document(&mut tx, collection, key, document).await?;
            }
        }

        tx.commit().await?;
        debug!("Committed {} path writes over {} records", writes.len(), documents.len());
        Ok(())
    }
}

async fn read_document(tx: &mut Transaction<'_, Sqlite>, collection: &str, key: &str) -> Result<Option<Value>> {
    let row = sqlx::query("SELECT document FROM records WHERE collection = ? AND key = ?")
        .bind(collection)
        .bind(key)
        .fetch_optional(&mut **tx)
        .await?;

    row.map(|row| {
        let document: String = row.get("document");
        serde_json::from_str(&document).with_context(|| format!("Corrupt document {}/{}", collection, key))
    })
    .transpose()
}

async fn write_document(tx: &mut Transaction<'_, Sqlite>, collection: &str, key: &str, document: &Value) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO records (collection, key, document, updated_at)
        VALUES (?, ?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT (collection, key) DO UPDATE SET
            document = excluded.document,
            updated_at = excluded.updated_at
        ",
    )
    .bind(collection)
    .bind(key)
    .bind(serde_json::to_string(document)?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let target = RecordPath::parse(path)?;
        let Some(key) = target.key else {
            let records = self.collection(target.collection).await?;
            return Ok((!records.is_empty()).then_some(Value::Object(records)));
        };

        let row = sqlx::query("SELECT document FROM records WHERE collection = ? AND key = ?")
            .bind(target.collection)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let document: String = row.get("document");
        let document: Value = serde_json::from_str(&document)
            .with_context(|| format!("Corrupt document {}/{}", target.collection, key))?;
        Ok(json_tree::get(&document, &target.inner).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        self.apply_writes(vec![(path.to_string(), value)]).await
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<()> {
        let writes = fields
            .into_iter()
            .map(|(field, value)| (json_tree::join(path, &field), value))
            .collect();
        self.apply_writes(writes).await
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.apply_writes(vec![(path.to_string(), Value::Null)]).await
    }
}
