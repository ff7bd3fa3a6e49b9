//! Repository interfaces for the record store
//!
//! The engine never talks to a concrete database. It reads snapshots through
//! [`SnapshotSource`] and issues point writes through [`RecordStore`].

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::entities::Snapshot;

/// Path-addressed document store (`orders/<key>`, `newCustomers/<key>/phone`, ...)
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Value at `path`, `None` when nothing is stored there
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Replace whatever is stored at `path`
    async fn set(&self, path: &str, value: Value) -> Result<()>;

    /// Write each field relative to `path`. Field names may themselves be
    /// nested paths (`customer/phone`); a `null` value deletes the field.
    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<()>;

    /// Delete whatever is stored at `path`
    async fn remove(&self, path: &str) -> Result<()>;
}

/// Feed of the current orders/customers collections
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn load(&self) -> Result<Snapshot>;
}
