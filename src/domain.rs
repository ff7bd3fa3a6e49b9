//! Domain module - records, findings and the rules that never touch I/O
//!
//! - `phone`: the join key between orders and customers
//! - `entities`: lenient views over the store's records
//! - `finding`: what detection produces and remediation consumes
//! - `repositories`: the store seams implemented in infrastructure

pub mod constants;
pub mod entities;
pub mod finding;
pub mod phone;
pub mod product_names;
pub mod repositories;
pub mod time_slot;

pub use entities::{Customer, LineItem, Order, OrderCustomer, Snapshot};
pub use finding::{ConflictType, Finding, FindingKind, FindingMetadata};
pub use phone::{canonical_key, normalize, suggest_canonical_form};
pub use repositories::{RecordStore, SnapshotSource};
