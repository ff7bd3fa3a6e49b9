//! Operator selection of findings to remediate

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::application::batch_executor::{BatchJob, BatchRunConfig};
use crate::application::errors::PlanError;
use crate::application::remediation::RemediationPlan;
use crate::domain::finding::{Finding, FindingKind};

#[derive(Debug, Default)]
pub struct SelectionSet {
    selected: Vec<(Finding, RemediationPlan)>,
    time_slots: HashMap<String, String>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply the delivery slot for an order. Must happen before a
    /// `MissingTimeSlot` finding for that order can be selected.
    pub fn assign_time_slot(&mut self, order_key: impl Into<String>, slot: impl Into<String>) {
        let (order_key, slot) = (order_key.into(), slot.into());
        for (finding, plan) in &mut self.selected {
            if finding.kind == FindingKind::MissingTimeSlot && finding.subject_key == order_key {
                finding.proposed_value = Some(Value::String(slot.clone()));
                if let Ok(updated) = RemediationPlan::for_finding(finding) {
                    *plan = updated;
                }
            }
        }
        self.time_slots.insert(order_key, slot);
    }

    /// Use each finding's suggested slot where the operator has not chosen one.
    pub fn accept_suggested_time_slots<'a>(&mut self, findings: impl IntoIterator<Item = &'a Finding>) -> usize {
        let mut assigned = 0;
        for finding in findings {
            if finding.kind != FindingKind::MissingTimeSlot || self.time_slots.contains_key(&finding.subject_key) {
                continue;
            }
            if let Some(slot) = finding.metadata.suggestion.clone() {
                self.assign_time_slot(finding.subject_key.clone(), slot);
                assigned += 1;
            }
        }
        assigned
    }

    /// Add a finding. Returns `Ok(false)` when it is already selected.
    pub fn select(&mut self, finding: &Finding) -> Result<bool, PlanError> {
        if self.contains(finding.kind, &finding.subject_key) {
            return Ok(false);
        }

        let mut finding = finding.clone();
        if finding.kind == FindingKind::MissingTimeSlot {
            if let Some(slot) = self.time_slots.get(&finding.subject_key) {
                finding.proposed_value = Some(Value::String(slot.clone()));
            }
        }

        let plan = RemediationPlan::for_finding(&finding)?;
        self.selected.push((finding, plan));
        Ok(true)
    }

    /// Select every finding that can be remediated; returns how many were added.
    pub fn select_all<'a>(&mut self, findings: impl IntoIterator<Item = &'a Finding>) -> usize {
        findings
            .into_iter()
            .filter(|finding| match self.select(finding) {
                Ok(added) => added,
                Err(e) => {
                    debug!("Skipping finding: {}", e);
                    false
                }
            })
            .count()
    }

    pub fn deselect(&mut self, kind: FindingKind, subject_key: &str) -> bool {
        let before = self.selected.len();
        self.selected
            .retain(|(finding, _)| !(finding.kind == kind && finding.subject_key == subject_key));
        self.selected.len() != before
    }

    pub fn contains(&self, kind: FindingKind, subject_key: &str) -> bool {
        self.selected
            .iter()
            .any(|(finding, _)| finding.kind == kind && finding.subject_key == subject_key)
    }

    /// Whether any selected fix moves a record between keys
    pub fn requires_confirmation(&self) -> bool {
        self.selected.iter().any(|(_, plan)| plan.is_destructive())
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.selected.iter().map(|(finding, _)| finding)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn into_job(self, config: BatchRunConfig) -> BatchJob {
        BatchJob::new(self.selected.into_iter().map(|(finding, _)| finding).collect(), config)
    }
}
