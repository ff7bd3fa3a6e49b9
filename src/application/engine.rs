//! Consistency engine facade: detect findings, run remediation batches

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tokio::sync::mpsc;
use tracing::info;

use crate::application::aggregator::{DetectionReport, FindingAggregator};
use crate::application::batch_executor::{BatchJob, BatchProgress, BatchRemediationExecutor, BatchResult, BatchRunConfig};
use crate::application::detection::DetectionContext;
use crate::application::detectors::{ConsistencyRule, default_rules, rules_for};
use crate::application::errors::EngineError;
use crate::domain::entities::Snapshot;
use crate::domain::finding::{Finding, FindingKind};
use crate::domain::repositories::{RecordStore, SnapshotSource};

pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Rules to run; empty means all
    pub enabled_kinds: Vec<FindingKind>,
    pub utc_offset_hours: i32,
    pub batch_defaults: BatchRunConfig,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            enabled_kinds: Vec::new(),
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
            batch_defaults: BatchRunConfig::default(),
        }
    }
}

pub struct ConsistencyEngine {
    source: Arc<dyn SnapshotSource>,
    executor: BatchRemediationExecutor,
    rules: Arc<Vec<Box<dyn ConsistencyRule>>>,
    options: EngineOptions,
}

impl ConsistencyEngine {
    pub fn new(source: Arc<dyn SnapshotSource>, store: Arc<dyn RecordStore>) -> Self {
        Self::with_options(source, store, EngineOptions::default())
    }

    pub fn with_options(source: Arc<dyn SnapshotSource>, store: Arc<dyn RecordStore>, options: EngineOptions) -> Self {
        let rules = if options.enabled_kinds.is_empty() {
            default_rules()
        } else {
            rules_for(&options.enabled_kinds)
        };
        Self {
            source,
            executor: BatchRemediationExecutor::new(store),
            rules: Arc::new(rules),
            options,
        }
    }

    pub const fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Batch settings to start from when the operator does not override them
    pub fn default_batch_config(&self) -> BatchRunConfig {
        self.options.batch_defaults.clone()
    }

    /// Load a fresh snapshot and run every rule over it. Rule evaluation is
    /// CPU-bound and runs on the blocking pool.
    pub async fn detect(&self) -> Result<DetectionReport, EngineError> {
        let snapshot = Arc::new(self.source.load().await.map_err(EngineError::Snapshot)?);
        let rules = Arc::clone(&self.rules);
        let offset = self.options.utc_offset_hours;

        let report = tokio::task::spawn_blocking(move || run_rules(&rules, &snapshot, offset)).await?;
        Ok(report)
    }

    /// Detection over an already loaded snapshot, on the calling thread
    pub fn detect_snapshot(&self, snapshot: &Snapshot) -> DetectionReport {
        run_rules(&self.rules, snapshot, self.options.utc_offset_hours)
    }

    pub async fn run_batch<F>(
        &self,
        findings: Vec<Finding>,
        config: BatchRunConfig,
        on_progress: F,
    ) -> Result<BatchResult, EngineError>
    where
        F: FnMut(BatchProgress) + Send,
    {
        self.executor.run(BatchJob::new(findings, config), on_progress).await
    }

    pub async fn run_batch_with_channel(
        &self,
        findings: Vec<Finding>,
        config: BatchRunConfig,
        progress_tx: mpsc::UnboundedSender<BatchProgress>,
    ) -> Result<BatchResult, EngineError> {
        self.executor
            .run_with_channel(BatchJob::new(findings, config), progress_tx)
            .await
    }

    pub async fn run_job<F>(&self, job: BatchJob, on_progress: F) -> Result<BatchResult, EngineError>
    where
        F: FnMut(BatchProgress) + Send,
    {
        self.executor.run(job, on_progress).await
    }
}

/// Rules run in parallel; findings come back in rule order.
fn run_rules(rules: &[Box<dyn ConsistencyRule>], snapshot: &Snapshot, utc_offset_hours: i32) -> DetectionReport {
    let started = Instant::now();
    info!(
        "🔍 Running {} rules over {} orders and {} customers",
        rules.len(),
        snapshot.orders.len(),
        snapshot.customers.len()
    );

    let ctx = DetectionContext::new(snapshot, utc_offset_hours);
    let findings: Vec<Finding> = rules
        .par_iter()
        .map(|rule| rule.detect(&ctx))
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect();

    info!("Rules finished in {:?}", started.elapsed());
    FindingAggregator::aggregate(findings, snapshot.orders.len(), snapshot.customers.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{Map, Value, json};

    use crate::domain::entities::{Customer, Order};

    struct FixedSource(Snapshot);

    #[async_trait]
    impl SnapshotSource for FixedSource {
        async fn load(&self) -> Result<Snapshot> {
            Ok(self.0.clone())
        }
    }

    struct NoopStore;

    #[async_trait]
    impl RecordStore for NoopStore {
        async fn get(&self, _path: &str) -> Result<Option<Value>> {
            Ok(None)
        }
        async fn set(&self, _path: &str, _value: Value) -> Result<()> {
            Ok(())
        }
        async fn update(&self, _path: &str, _fields: Map<String, Value>) -> Result<()> {
            Ok(())
        }
        async fn remove(&self, _path: &str) -> Result<()> {
            Ok(())
        }
    }

    fn snapshot() -> Snapshot {
        Snapshot::new(
            vec![Order::from_record("tmp", &json!({ "id": "o1", "customerPhone": "+84 901 234 567" })).unwrap()],
            vec![Customer::from_record("0901234567", &json!({ "phone": "0901234567", "name": "Lan" })).unwrap()],
        )
    }

    #[tokio::test]
    async fn detect_runs_rules_in_reporting_order() {
        let engine = ConsistencyEngine::new(Arc::new(FixedSource(snapshot())), Arc::new(NoopStore));
        let report = engine.detect().await.unwrap();

        let kinds: Vec<FindingKind> = report.findings.iter().map(|f| f.kind).collect();
        let mut sorted = kinds.clone();
        sorted.sort();
        assert_eq!(kinds, sorted);
        assert!(kinds.contains(&FindingKind::WrongStorageKey));
        assert!(kinds.contains(&FindingKind::PhoneFormat));
    }

    #[tokio::test]
    async fn enabled_kinds_limit_the_rule_set() {
        let options = EngineOptions {
            enabled_kinds: vec![FindingKind::WrongStorageKey],
            ..EngineOptions::default()
        };
        let engine = ConsistencyEngine::with_options(Arc::new(FixedSource(snapshot())), Arc::new(NoopStore), options);
        let report = engine.detect().await.unwrap();
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].kind, FindingKind::WrongStorageKey);
    }
}
