//! Shared helpers for integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

use datasync_console_lib::domain::{RecordStore, Snapshot, SnapshotSource};
use datasync_console_lib::infrastructure::{InMemoryRecordStore, StoreSnapshotLoader};
use datasync_console_lib::{ConsistencyEngine, EngineOptions};

/// One store call as seen by [`RecordingStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Get(String),
    Set(String),
    Update(String),
    Remove(String),
}

impl StoreCall {
    pub fn path(&self) -> &str {
        match self {
            Self::Get(p) | Self::Set(p) | Self::Update(p) | Self::Remove(p) => p,
        }
    }

    pub const fn is_write(&self) -> bool {
        !matches!(self, Self::Get(_))
    }
}

/// In-memory store that records every call and can be told to fail writes.
pub struct RecordingStore {
    inner: InMemoryRecordStore,
    calls: Mutex<Vec<StoreCall>>,
    failing_writes: Mutex<HashSet<String>>,
    failing_removes: Mutex<HashSet<String>>,
    failing_reads: AtomicBool,
}

impl RecordingStore {
    pub fn new(root: Value) -> Self {
        Self {
            inner: InMemoryRecordStore::from_value(root),
            calls: Mutex::new(Vec::new()),
            failing_writes: Mutex::new(HashSet::new()),
            failing_removes: Mutex::new(HashSet::new()),
            failing_reads: AtomicBool::new(false),
        }
    }

    /// Every set/update/remove on `path` fails.
    pub fn fail_writes_to(&self, path: &str) {
        self.failing_writes.lock().unwrap().insert(path.to_string());
    }

    /// Only removes of `path` fail.
    pub fn fail_removes_of(&self, path: &str) {
        self.failing_removes.lock().unwrap().insert(path.to_string());
    }

    /// Every get fails.
    pub fn fail_reads(&self) {
        self.failing_reads.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<StoreCall> {
        self.calls().into_iter().filter(StoreCall::is_write).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub async fn dump(&self) -> Value {
        self.inner.dump().await
    }

    fn record(&self, call: StoreCall) -> Result<()> {
        let path = call.path().to_string();
        let is_remove = matches!(call, StoreCall::Remove(_));
        let is_write = call.is_write();
        self.calls.lock().unwrap().push(call);

        if !is_write && self.failing_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("injected read failure at {path}"));
        }
        if is_write && self.failing_writes.lock().unwrap().contains(&path) {
            return Err(anyhow!("injected write failure at {path}"));
        }
        if is_remove && self.failing_removes.lock().unwrap().contains(&path) {
            return Err(anyhow!("injected remove failure at {path}"));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for RecordingStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        self.record(StoreCall::Get(path.to_string()))?;
        self.inner.get(path).await
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        self.record(StoreCall::Set(path.to_string()))?;
        self.inner.set(path, value).await
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<()> {
        self.record(StoreCall::Update(path.to_string()))?;
        self.inner.update(path, fields).await
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.record(StoreCall::Remove(path.to_string()))?;
        self.inner.remove(path).await
    }
}

/// Snapshot source returning a fixed snapshot
pub struct FixedSource(pub Snapshot);

#[async_trait]
impl SnapshotSource for FixedSource {
    async fn load(&self) -> Result<Snapshot> {
        Ok(self.0.clone())
    }
}

/// Engine over a recording store seeded with `root`, reading snapshots back
/// from the same store.
pub fn engine_over(root: Value) -> (Arc<RecordingStore>, ConsistencyEngine) {
    let store = Arc::new(RecordingStore::new(root));
    let dyn_store: Arc<dyn RecordStore> = store.clone();
    let source = Arc::new(StoreSnapshotLoader::new(Arc::clone(&dyn_store)));
    let mut options = EngineOptions::default();
    options.batch_defaults.inter_batch_delay_ms = 0;
    (store, ConsistencyEngine::with_options(source, dyn_store, options))
}

/// CFAbsoluteTime for `hours` after 2001-01-01T00:00:00Z
pub fn cf_hours(hours: f64) -> f64 {
    hours * 3600.0
}

/// An order record with the fields most rules look at
pub fn order(id: &str, name: &str, phone: &str, received_hours: f64) -> Value {
    json!({
        "id": id,
        "customer": { "name": name, "phone": phone },
        "customerPhone": phone,
        "orderDate": cf_hours(received_hours),
        "deliveryTimeSlot": "10:00 - 12:00",
        "cakes": [{ "name": "Brazilian Cheesebread", "amount": 1, "price": 120000 }]
    })
}

/// A customer record with every required field present
pub fn customer(name: &str, phone: &str, first_order_id: &str, last_order_id: &str) -> Value {
    json!({
        "name": name,
        "phone": phone,
        "firstOrderId": first_order_id,
        "lastOrderId": last_order_id
    })
}
