//! datasync-console - data consistency engine for the orders/customers store
//!
//! Orders and customers are joined by a canonical phone key. Detection rules
//! turn a snapshot of both collections into findings; operators select the
//! findings to fix and the batch executor applies them in throttled chunks.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{
    BatchJob, BatchProgress, BatchResult, BatchRunConfig, ConsistencyEngine, DetectionReport, EngineError,
    EngineOptions, ExecutorState, SelectionSet,
};
pub use domain::{ConflictType, Finding, FindingKind, RecordStore, Snapshot, SnapshotSource};
