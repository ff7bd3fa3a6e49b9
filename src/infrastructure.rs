//! Infrastructure layer: configuration, logging and record stores
//!
//! Concrete [`RecordStore`](crate::domain::RecordStore) implementations live
//! here, together with the loader that turns a store into a snapshot.

pub mod config;
pub mod json_tree;
pub mod logging;
pub mod memory_store;
pub mod snapshot_loader;
pub mod sqlite_store;

pub use config::{AppConfig, ConfigError, ConfigManager};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use memory_store::InMemoryRecordStore;
pub use snapshot_loader::StoreSnapshotLoader;
pub use sqlite_store::SqliteRecordStore;
