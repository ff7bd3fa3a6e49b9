//! Snapshot loading from a record store

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::domain::constants::{CUSTOMERS_COLLECTION, ORDERS_COLLECTION};
use crate::domain::entities::{Customer, Order, Snapshot};
use crate::domain::repositories::{RecordStore, SnapshotSource};

/// Reads both collections in full and parses every record leniently.
/// Records that are not objects are skipped.
pub struct StoreSnapshotLoader {
    store: Arc<dyn RecordStore>,
}

impl StoreSnapshotLoader {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    async fn collection(&self, name: &str) -> Result<Map<String, Value>> {
        match self.store.get(name).await? {
            Some(Value::Object(records)) => Ok(records),
            Some(other) => {
                warn!("Collection {} is not an object ({}); treating as empty", name, type_name(&other));
                Ok(Map::new())
            }
            None => Ok(Map::new()),
        }
    }
}

#[async_trait]
impl SnapshotSource for StoreSnapshotLoader {
    async fn load(&self) -> Result<Snapshot> {
        let raw_orders = self.collection(ORDERS_COLLECTION).await?;
        let raw_customers = self.collection(CUSTOMERS_COLLECTION).await?;

        let orders: Vec<Order> = raw_orders
            .iter()
            .filter_map(|(key, raw)| {
                let order = Order::from_record(key, raw);
                if order.is_none() {
                    debug!("Skipping unreadable order record {}", key);
                }
                order
            })
            .collect();
        let customers: Vec<Customer> = raw_customers
            .iter()
            .filter_map(|(key, raw)| {
                let customer = Customer::from_record(key, raw);
                if customer.is_none() {
                    debug!("Skipping unreadable customer record {}", key);
                }
                customer
            })
            .collect();

        info!(
            "📥 Loaded snapshot: {}/{} orders, {}/{} customers",
            orders.len(),
            raw_orders.len(),
            customers.len(),
            raw_customers.len()
        );
        Ok(Snapshot::new(orders, customers))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_store::InMemoryRecordStore;
    use serde_json::json;

    #[tokio::test]
    async fn loads_both_collections_and_skips_garbage() -> Result<()> {
        let store = Arc::new(InMemoryRecordStore::from_value(json!({
            "orders": {
                "o1": { "id": "o1", "customer": { "name": "Lan", "phone": "0901 234 567" } },
                "o2": "not a record"
            },
            "newCustomers": {
                "0901234567": { "name": "Lan", "phone": "0901234567" }
            }
        })));

        let snapshot = StoreSnapshotLoader::new(store).load().await?;
        assert_eq!(snapshot.orders.len(), 1);
        assert_eq!(snapshot.orders[0].id, "o1");
        assert_eq!(snapshot.customers.len(), 1);
        assert_eq!(snapshot.customers[0].storage_key, "0901234567");
        Ok(())
    }

    #[tokio::test]
    async fn empty_store_gives_empty_snapshot() -> Result<()> {
        let store = Arc::new(InMemoryRecordStore::new());
        let snapshot = StoreSnapshotLoader::new(store).load().await?;
        assert!(snapshot.orders.is_empty());
        assert!(snapshot.customers.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn non_object_collection_reads_as_empty() -> Result<()> {
        let store = Arc::new(InMemoryRecordStore::from_value(json!({ "orders": [1, 2, 3] })));
        let snapshot = StoreSnapshotLoader::new(store).load().await?;
        assert!(snapshot.orders.is_empty());
        Ok(())
    }
}
