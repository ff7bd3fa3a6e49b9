//! In-memory record store over a single JSON tree

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::domain::repositories::RecordStore;
use crate::infrastructure::json_tree;

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    root: RwLock<Value>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::from_value(Value::Object(Map::new()))
    }

    /// Seed from a full export, e.g. `{"orders": {...}, "newCustomers": {...}}`
    pub fn from_value(root: Value) -> Self {
        Self {
            root: RwLock::new(root),
        }
    }

    /// Copy of the whole tree
    pub async fn dump(&self) -> Value {
        self.root.read().await.clone()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let root = self.root.read().await;
        Ok(json_tree::get(&root, &json_tree::segments(path)).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        let mut root = self.root.write().await;
        json_tree::set(&mut root, &json_tree::segments(path), value);
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<()> {
        let mut root = self.root.write().await;
        for (field, value) in fields {
            let target = json_tree::join(path, &field);
            json_tree::set(&mut root, &json_tree::segments(&target), value);
        }
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let mut root = self.root.write().await;
        json_tree::remove(&mut root, &json_tree::segments(path));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn update_writes_nested_fields_and_null_deletes() -> Result<()> {
        let store = InMemoryRecordStore::from_value(json!({
            "orders": { "o1": { "customer": { "phone": "+84 901" }, "customerPhone": "+84 901", "note": "x" } }
        }));

        let fields = json!({ "customer/phone": "0901", "customerPhone": "0901", "note": null });
        store.update("orders/o1", fields.as_object().cloned().unwrap_or_default()).await?;

        assert_eq!(
            store.get("orders/o1").await?,
            Some(json!({ "customer": { "phone": "0901" }, "customerPhone": "0901" }))
        );
        Ok(())
    }

    #[tokio::test]
    async fn remove_and_get_missing() -> Result<()> {
        let store = InMemoryRecordStore::new();
        store.set("newCustomers/0901", json!({ "name": "Lan" })).await?;
        assert!(store.get("newCustomers/0901").await?.is_some());

        store.remove("newCustomers/0901").await?;
        assert_eq!(store.get("newCustomers/0901").await?, None);
        assert_eq!(store.dump().await, json!({}));
        Ok(())
    }
}
