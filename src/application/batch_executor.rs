//! Batch remediation executor
//!
//! Applies planned fixes chunk by chunk: every mutation in a chunk is
//! dispatched at once and awaited together, failures are recorded per item,
//! and the next chunk starts after an optional pause. Nothing is retried.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::errors::EngineError;
use crate::application::remediation::RemediationPlan;
use crate::domain::constants::RENAME_CONFIRMATION_TOKEN;
use crate::domain::finding::{Finding, FindingKind};
use crate::domain::repositories::RecordStore;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_INTER_BATCH_DELAY_MS: u64 = 100;

/// Per-run knobs chosen by the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRunConfig {
    pub batch_size: usize,
    pub inter_batch_delay_ms: u64,
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

impl Default for BatchRunConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            inter_batch_delay_ms: DEFAULT_INTER_BATCH_DELAY_MS,
            confirmation_token: None,
        }
    }
}

impl BatchRunConfig {
    #[must_use]
    pub fn with_confirmation(mut self, token: impl Into<String>) -> Self {
        self.confirmation_token = Some(token.into());
        self
    }
}

/// Transient unit of work; never persisted
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub findings: Vec<Finding>,
    pub config: BatchRunConfig,
}

impl BatchJob {
    pub const fn new(findings: Vec<Finding>, config: BatchRunConfig) -> Self {
        Self { findings, config }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorState {
    Idle,
    Running,
    Completed,
    PartiallyFailed,
}

/// Emitted once per finished chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub run_id: Uuid,
    pub processed: usize,
    pub total: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemError {
    pub subject_key: String,
    pub kind: FindingKind,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub run_id: Uuid,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub per_item_errors: Vec<ItemError>,
    pub final_state: ExecutorState,
    pub elapsed_ms: u64,
}

pub struct BatchRemediationExecutor {
    store: Arc<dyn RecordStore>,
}

impl BatchRemediationExecutor {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Check the whole job before touching the store. Any problem rejects
    /// the batch with zero mutations applied.
    pub fn validate(job: &BatchJob) -> Result<Vec<RemediationPlan>, EngineError> {
        if job.config.batch_size == 0 {
            return Err(EngineError::Config("batch size must be greater than zero".into()));
        }
        if job.findings.is_empty() {
            return Err(EngineError::ValidationRejected("no findings selected".into()));
        }

        let plans = job
            .findings
            .iter()
            .map(RemediationPlan::for_finding)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EngineError::ValidationRejected(e.to_string()))?;

        Self::check_move_conflicts(&plans)?;

        let destructive = plans.iter().filter(|plan| plan.is_destructive()).count();
        if destructive > 0 && job.config.confirmation_token.as_deref() != Some(RENAME_CONFIRMATION_TOKEN) {
            return Err(EngineError::ValidationRejected(format!(
                "{destructive} selected fixes move records between keys; type {RENAME_CONFIRMATION_TOKEN} to confirm"
            )));
        }

        Ok(plans)
    }

    /// Items in a chunk run in no particular order, so a key that is moved
    /// must not be touched by any other item of the same batch.
    fn check_move_conflicts(plans: &[RemediationPlan]) -> Result<(), EngineError> {
        let mut touched: HashMap<&str, usize> = HashMap::new();
        for path in plans.iter().flat_map(RemediationPlan::touched_paths) {
            *touched.entry(path).or_default() += 1;
        }

        for plan in plans.iter().filter(|plan| plan.is_destructive()) {
            if let Some(path) = plan.touched_paths().into_iter().find(|path| touched[path] > 1) {
                return Err(EngineError::ValidationRejected(format!(
                    "{} fix for '{}' moves {path}, which another selected fix also touches; run them in separate batches",
                    plan.kind, plan.subject_key
                )));
            }
        }
        Ok(())
    }

    pub async fn run<F>(&self, job: BatchJob, mut on_progress: F) -> Result<BatchResult, EngineError>
    where
        F: FnMut(BatchProgress) + Send,
    {
        let mut state = ExecutorState::Idle;
        let plans = Self::validate(&job)?;

        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let total = plans.len();
        let BatchRunConfig {
            batch_size,
            inter_batch_delay_ms,
            ..
        } = job.config;
        let chunk_count = total.div_ceil(batch_size);

        transition(&mut state, ExecutorState::Running, run_id);
        info!(
            "🚀 Starting remediation run {}: {} fixes in {} chunks of {}",
            run_id, total, chunk_count, batch_size
        );

        let mut processed = 0;
        let mut failed = 0;
        let mut per_item_errors = Vec::new();

        for (chunk_index, chunk) in plans.chunks(batch_size).enumerate() {
            let store = self.store.as_ref();
            let outcomes = join_all(chunk.iter().map(|plan| async move { (plan, plan.apply(store).await) })).await;

            for (plan, outcome) in outcomes {
                if let Err(e) = outcome {
                    failed += 1;
                    warn!("⚠️ {} fix for {} failed: {:#}", plan.kind, plan.subject_key, e);
                    per_item_errors.push(ItemError {
                        subject_key: plan.subject_key.clone(),
                        kind: plan.kind,
                        error: format!("{e:#}"),
                    });
                }
            }
            processed += chunk.len();

            debug!(
                "Chunk {}/{} done: processed={}, failed={}",
                chunk_index + 1,
                chunk_count,
                processed,
                failed
            );
            on_progress(BatchProgress {
                run_id,
                processed,
                total,
                failed,
            });

            if processed < total && inter_batch_delay_ms > 0 {
                sleep(Duration::from_millis(inter_batch_delay_ms)).await;
            }
        }

        let final_state = if failed == 0 {
            ExecutorState::Completed
        } else {
            ExecutorState::PartiallyFailed
        };
        transition(&mut state, final_state, run_id);

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            "✅ Remediation run {} finished: {} succeeded, {} failed in {}ms",
            run_id,
            total - failed,
            failed,
            elapsed_ms
        );

        Ok(BatchResult {
            run_id,
            total,
            succeeded: total - failed,
            failed,
            per_item_errors,
            final_state: state,
            elapsed_ms,
        })
    }

    /// `run` with progress delivered over a channel. A dropped receiver
    /// does not stop the run.
    pub async fn run_with_channel(
        &self,
        job: BatchJob,
        progress_tx: mpsc::UnboundedSender<BatchProgress>,
    ) -> Result<BatchResult, EngineError> {
        self.run(job, move |progress| {
            let _ = progress_tx.send(progress);
        })
        .await
    }
}

fn transition(state: &mut ExecutorState, next: ExecutorState, run_id: Uuid) {
    debug!("Run {} state: {:?} -> {:?}", run_id, state, next);
    *state = next;
}
