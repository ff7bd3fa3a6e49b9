//! Application layer module
//!
//! Detection, selection and remediation of data consistency findings.

pub mod aggregator;
pub mod batch_executor;
pub mod detection;
pub mod detectors;
pub mod engine;
pub mod errors;
pub mod remediation;
pub mod selection;

pub use aggregator::{DetectionReport, FindingAggregator};
pub use batch_executor::{
    BatchJob, BatchProgress, BatchRemediationExecutor, BatchResult, BatchRunConfig, ExecutorState, ItemError,
};
pub use engine::{ConsistencyEngine, EngineOptions};
pub use errors::{EngineError, MoveError, PlanError};
pub use remediation::{Mutation, RemediationPlan};
pub use selection::SelectionSet;
