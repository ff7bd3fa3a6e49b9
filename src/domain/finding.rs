//! Findings: one detected inconsistency plus its proposed remediation

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FindingKind {
    PhoneFormat,
    DuplicateCustomer,
    OrderIdMismatch,
    WrongStorageKey,
    NonStandardProductName,
    MissingRequiredField,
    InvalidPhoneShape,
    MissingTimeSlot,
    ProfileSync,
}

impl FindingKind {
    pub const ALL: [Self; 9] = [
        Self::PhoneFormat,
        Self::DuplicateCustomer,
        Self::OrderIdMismatch,
        Self::WrongStorageKey,
        Self::NonStandardProductName,
        Self::MissingRequiredField,
        Self::InvalidPhoneShape,
        Self::MissingTimeSlot,
        Self::ProfileSync,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PhoneFormat => "phone-format",
            Self::DuplicateCustomer => "duplicate-customer",
            Self::OrderIdMismatch => "order-id-mismatch",
            Self::WrongStorageKey => "wrong-storage-key",
            Self::NonStandardProductName => "non-standard-product-name",
            Self::MissingRequiredField => "missing-required-field",
            Self::InvalidPhoneShape => "invalid-phone-shape",
            Self::MissingTimeSlot => "missing-time-slot",
            Self::ProfileSync => "profile-sync",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == value)
    }

    /// Whether the subject is an order (otherwise a customer)
    pub const fn targets_orders(self) -> bool {
        matches!(
            self,
            Self::PhoneFormat | Self::WrongStorageKey | Self::NonStandardProductName | Self::MissingTimeSlot
        )
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictType {
    /// Target value absent
    Missing,
    /// Target value present but wrong
    Different,
    /// Already correct; informational only
    Same,
}

/// Display and remediation context that does not fit current/proposed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindingMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_keys: Vec<String>,
    /// Hint for findings whose value the operator has to supply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Full record snapshot, kept for fixes that rewrite a whole record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub kind: FindingKind,
    /// Storage key of the order or customer the finding is about
    pub subject_key: String,
    pub current_value: Option<Value>,
    pub proposed_value: Option<Value>,
    pub conflict_type: ConflictType,
    #[serde(default)]
    pub metadata: FindingMetadata,
}

impl Finding {
    pub fn new(kind: FindingKind, subject_key: impl Into<String>, conflict_type: ConflictType) -> Self {
        Self {
            kind,
            subject_key: subject_key.into(),
            current_value: None,
            proposed_value: None,
            conflict_type,
            metadata: FindingMetadata::default(),
        }
    }

    #[must_use]
    pub fn with_current(mut self, value: impl Into<Value>) -> Self {
        self.current_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn with_proposed(mut self, value: impl Into<Value>) -> Self {
        self.proposed_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.metadata.labels.push(label.into());
        self
    }

    #[must_use]
    pub fn with_customer_name(mut self, name: Option<&str>) -> Self {
        self.metadata.customer_name = name.map(str::to_string);
        self
    }

    /// "same" findings are never selectable
    pub fn is_actionable(&self) -> bool {
        self.conflict_type != ConflictType::Same
    }

    /// Proposed value as a string, ignoring JSON null
    pub fn proposed_str(&self) -> Option<&str> {
        self.proposed_value.as_ref().and_then(Value::as_str)
    }
}
