//! Finding aggregation and data health reporting

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::finding::{ConflictType, Finding, FindingKind};

/// Result of one detection pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionReport {
    pub generated_at: DateTime<Utc>,
    pub total_orders: usize,
    pub total_customers: usize,
    pub findings: Vec<Finding>,
    pub counts_by_kind: BTreeMap<FindingKind, usize>,
    pub counts_by_conflict: ConflictCounts,
    /// Findings that can be selected for remediation
    pub actionable: usize,
    /// 100 means no issues; not clamped, can go negative
    pub health_score: i64,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictCounts {
    pub missing: usize,
    pub different: usize,
    pub same: usize,
}

impl DetectionReport {
    pub fn findings_of(&self, kind: FindingKind) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.kind == kind)
    }

    pub fn count(&self, kind: FindingKind) -> usize {
        self.counts_by_kind.get(&kind).copied().unwrap_or(0)
    }
}

pub struct FindingAggregator;

impl FindingAggregator {
    /// Merge rule outputs (already in rule order) into a report.
    pub fn aggregate(findings: Vec<Finding>, total_orders: usize, total_customers: usize) -> DetectionReport {
        let mut counts_by_kind = BTreeMap::new();
        let mut counts_by_conflict = ConflictCounts::default();
        for finding in &findings {
            *counts_by_kind.entry(finding.kind).or_insert(0) += 1;
            match finding.conflict_type {
                ConflictType::Missing => counts_by_conflict.missing += 1,
                ConflictType::Different => counts_by_conflict.different += 1,
                ConflictType::Same => counts_by_conflict.same += 1,
            }
        }

        let actionable = counts_by_conflict.missing + counts_by_conflict.different;
        let health_score = Self::health_score(total_orders, total_customers, actionable);
        let recommendations = Self::recommendations(&counts_by_kind);

        info!(
            "✅ Detection completed: {} findings ({} actionable), health_score={}",
            findings.len(),
            actionable,
            health_score
        );

        DetectionReport {
            generated_at: Utc::now(),
            total_orders,
            total_customers,
            findings,
            counts_by_kind,
            counts_by_conflict,
            actionable,
            health_score,
            recommendations,
        }
    }

    /// `round((possible - issues) / possible * 100)` with
    /// `possible = orders + customers * 2`; 100 for an empty store.
    pub fn health_score(total_orders: usize, total_customers: usize, issues: usize) -> i64 {
        let possible = total_orders + total_customers * 2;
        if possible == 0 {
            return 100;
        }
        let ratio = (possible as f64 - issues as f64) / possible as f64;
        #[allow(clippy::cast_possible_truncation)]
        let score = (ratio * 100.0).round() as i64;
        score
    }

    fn recommendations(counts: &BTreeMap<FindingKind, usize>) -> Vec<String> {
        counts
            .iter()
            .filter_map(|(kind, &count)| {
                let advice = match kind {
                    FindingKind::PhoneFormat => "normalize order phone numbers",
                    FindingKind::DuplicateCustomer => "remove duplicate customer records",
                    FindingKind::OrderIdMismatch => "refresh customer first/last order ids",
                    FindingKind::WrongStorageKey => "rename orders stored under the wrong key (requires confirmation)",
                    FindingKind::NonStandardProductName => "standardize product names",
                    FindingKind::MissingRequiredField => "fill in missing customer fields from their orders",
                    FindingKind::InvalidPhoneShape => "re-key customers with malformed phones",
                    FindingKind::MissingTimeSlot => "assign delivery time slots",
                    FindingKind::ProfileSync => "sync social links and addresses from orders",
                };
                (count > 0).then(|| format!("{count} × {kind}: {advice}"))
            })
            .collect()
    }
}
