//! Remediation planning: one finding, one store mutation
//!
//! Moves between keys are not atomic. They are modeled as explicit two-phase
//! steps (write new, then remove old) that report which phase failed.

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::application::errors::{MoveError, PlanError};
use crate::domain::constants::{CUSTOMERS_COLLECTION, ORDERS_COLLECTION, record_path};
use crate::domain::finding::{Finding, FindingKind};
use crate::domain::repositories::RecordStore;

/// Write the full order record under its id, then drop the old key.
#[derive(Debug, Clone, PartialEq)]
pub struct RenameStep {
    pub from: String,
    pub to: String,
    pub record: Value,
}

impl RenameStep {
    pub async fn apply(&self, store: &dyn RecordStore) -> Result<(), MoveError> {
        ensure_target_free(store, &self.to).await?;
        store.set(&self.to, self.record.clone()).await.map_err(|source| MoveError::Write {
            to: self.to.clone(),
            source,
        })?;
        remove_source(store, &self.from, &self.to).await
    }
}

/// Move a customer to the key matching its cleaned phone. The record is
/// re-read at apply time so concurrent edits are carried over.
#[derive(Debug, Clone, PartialEq)]
pub struct RekeyStep {
    pub from: String,
    pub to: String,
    pub phone: String,
}

impl RekeyStep {
    pub async fn apply(&self, store: &dyn RecordStore) -> Result<(), MoveError> {
        let current = store.get(&self.from).await.map_err(|source| MoveError::Read {
            path: self.from.clone(),
            source,
        })?;
        let Some(Value::Object(mut record)) = current else {
            return Err(MoveError::SourceMissing { from: self.from.clone() });
        };

        record.remove("id");
        record.insert("phone".to_string(), Value::String(self.phone.clone()));

        ensure_target_free(store, &self.to).await?;
        store.set(&self.to, Value::Object(record)).await.map_err(|source| MoveError::Write {
            to: self.to.clone(),
            source,
        })?;
        remove_source(store, &self.from, &self.to).await
    }
}

/// Moves never overwrite: a record already at the target is left for the
/// operator to reconcile.
async fn ensure_target_free(store: &dyn RecordStore, to: &str) -> Result<(), MoveError> {
    let existing = store.get(to).await.map_err(|source| MoveError::Read {
        path: to.to_string(),
        source,
    })?;
    if existing.is_some() {
        warn!("⚠️ {} already holds a record, move skipped", to);
        return Err(MoveError::TargetExists { to: to.to_string() });
    }
    Ok(())
}

async fn remove_source(store: &dyn RecordStore, from: &str, to: &str) -> Result<(), MoveError> {
    store.remove(from).await.map_err(|source| {
        error!("❌ {} was written but {} could not be removed; record exists under both keys", to, from);
        MoveError::Remove {
            from: from.to_string(),
            to: to.to_string(),
            source,
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Update { path: String, fields: Map<String, Value> },
    Remove { path: String },
    Rename(RenameStep),
    Rekey(RekeyStep),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemediationPlan {
    pub kind: FindingKind,
    pub subject_key: String,
    pub mutation: Mutation,
}

impl RemediationPlan {
    pub fn for_finding(finding: &Finding) -> Result<Self, PlanError> {
        if !finding.is_actionable() {
            return Err(PlanError::Informational {
                kind: finding.kind,
                subject_key: finding.subject_key.clone(),
            });
        }

        let key = finding.subject_key.as_str();
        let order_path = record_path(ORDERS_COLLECTION, key);
        let customer_path = record_path(CUSTOMERS_COLLECTION, key);

        let mutation = match finding.kind {
            FindingKind::PhoneFormat => {
                let phone = proposed_string(finding)?;
                Mutation::Update {
                    path: order_path,
                    fields: fields([("customer/phone", phone.clone()), ("customerPhone", phone)]),
                }
            }
            FindingKind::DuplicateCustomer => Mutation::Remove { path: customer_path },
            FindingKind::OrderIdMismatch
            | FindingKind::MissingRequiredField
            | FindingKind::ProfileSync => Mutation::Update {
                path: customer_path,
                fields: proposed_fields(finding)?,
            },
            FindingKind::NonStandardProductName => Mutation::Update {
                path: order_path,
                fields: proposed_fields(finding)?,
            },
            FindingKind::WrongStorageKey => {
                let id = proposed_string(finding)?;
                let record = finding
                    .metadata
                    .record
                    .clone()
                    .filter(Value::is_object)
                    .ok_or_else(|| malformed(finding, "record snapshot missing"))?;
                Mutation::Rename(RenameStep {
                    from: order_path,
                    to: record_path(ORDERS_COLLECTION, &id),
                    record,
                })
            }
            FindingKind::InvalidPhoneShape => {
                let digits = proposed_string(finding)?;
                if digits == key {
                    Mutation::Update {
                        path: customer_path,
                        fields: fields([("phone", digits)]),
                    }
                } else {
                    Mutation::Rekey(RekeyStep {
                        from: customer_path,
                        to: record_path(CUSTOMERS_COLLECTION, &digits),
                        phone: digits,
                    })
                }
            }
            FindingKind::MissingTimeSlot => Mutation::Update {
                path: order_path,
                fields: fields([("deliveryTimeSlot", proposed_string(finding)?)]),
            },
        };

        Ok(Self {
            kind: finding.kind,
            subject_key: finding.subject_key.clone(),
            mutation,
        })
    }

    /// Plans that move records between keys need an explicit confirmation.
    pub const fn is_destructive(&self) -> bool {
        matches!(self.mutation, Mutation::Rename(_) | Mutation::Rekey(_))
    }

    /// Store paths this plan reads or writes; moves touch both keys.
    pub fn touched_paths(&self) -> Vec<&str> {
        match &self.mutation {
            Mutation::Update { path, .. } | Mutation::Remove { path } => vec![path.as_str()],
            Mutation::Rename(RenameStep { from, to, .. }) | Mutation::Rekey(RekeyStep { from, to, .. }) => {
                vec![from.as_str(), to.as_str()]
            }
        }
    }

    pub async fn apply(&self, store: &dyn RecordStore) -> Result<()> {
        debug!("Applying {} remediation to {}", self.kind, self.subject_key);
        match &self.mutation {
            Mutation::Update { path, fields } => store.update(path, fields.clone()).await,
            Mutation::Remove { path } => store.remove(path).await,
            Mutation::Rename(step) => Ok(step.apply(store).await?),
            Mutation::Rekey(step) => Ok(step.apply(store).await?),
        }
    }
}

fn fields<const N: usize>(entries: [(&str, String); N]) -> Map<String, Value> {
    entries
        .into_iter()
        .map(|(field, value)| (field.to_string(), Value::String(value)))
        .collect()
}

fn proposed_string(finding: &Finding) -> Result<String, PlanError> {
    match finding.proposed_value.as_ref() {
        None | Some(Value::Null) => Err(missing(finding)),
        Some(Value::String(s)) if !s.trim().is_empty() && !s.contains('/') => Ok(s.clone()),
        Some(_) => Err(malformed(finding, "expected a non-empty key-safe string")),
    }
}

fn proposed_fields(finding: &Finding) -> Result<Map<String, Value>, PlanError> {
    match finding.proposed_value.as_ref() {
        None | Some(Value::Null) => Err(missing(finding)),
        Some(Value::Object(map)) if !map.is_empty() => Ok(map.clone()),
        Some(_) => Err(malformed(finding, "expected a non-empty field map")),
    }
}

fn missing(finding: &Finding) -> PlanError {
    PlanError::MissingProposal {
        kind: finding.kind,
        subject_key: finding.subject_key.clone(),
    }
}

fn malformed(finding: &Finding, reason: &str) -> PlanError {
    PlanError::MalformedProposal {
        kind: finding.kind,
        subject_key: finding.subject_key.clone(),
        reason: reason.to_string(),
    }
}
