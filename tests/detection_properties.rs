//! Property checks over generated snapshots

mod common;

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{Value, json};

use common::{FixedSource, RecordingStore};
use datasync_console_lib::application::RemediationPlan;
use datasync_console_lib::application::aggregator::FindingAggregator;
use datasync_console_lib::domain::{Customer, Order, Snapshot};
use datasync_console_lib::{ConflictType, ConsistencyEngine, FindingKind};

fn phone_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "0[0-9]{9}",
        "\\+84 [0-9]{3} [0-9]{3} [0-9]{3}",
        "84[0-9]{9}",
        "[0-9]{3}-[0-9]{3}-[0-9]{4}",
        "[0-9]{0,5}",
        Just(String::new()),
    ]
}

fn order_strategy() -> impl Strategy<Value = (String, Value)> {
    (
        "o-[a-z0-9]{1,6}",
        prop::option::of("o-[a-z0-9]{1,6}"),
        phone_strategy(),
        0.0..1.0e6f64,
        prop::option::of(Just("10:00 - 12:00")),
        prop::option::of(prop_oneof![Just("cheese bread"), Just("Brazilian Cheesebread"), Just("Tiramisu")]),
    )
        .prop_map(|(key, id, phone, received, slot, item)| {
            let record = json!({
                "id": id.unwrap_or_else(|| key.clone()),
                "customer": { "name": "Lan", "phone": phone },
                "orderDate": received,
                "deliveryTimeSlot": slot,
                "cakes": item.map(|name| vec![json!({ "name": name, "amount": 1 })]).unwrap_or_default()
            });
            (key, record)
        })
}

fn customer_strategy() -> impl Strategy<Value = (String, Value)> {
    (
        phone_strategy(),
        prop::option::of("[A-Z][a-z]{2,8}"),
        prop::option::of("o-[a-z0-9]{1,6}"),
    )
        .prop_map(|(phone, name, first)| {
            let key = if phone.trim().is_empty() { "blank".to_string() } else { phone.replace('/', "") };
            let record = json!({ "phone": phone, "name": name, "firstOrderId": first, "lastOrderId": first });
            (key, record)
        })
}

fn snapshot_strategy() -> impl Strategy<Value = Snapshot> {
    (
        prop::collection::vec(order_strategy(), 0..20),
        prop::collection::vec(customer_strategy(), 0..10),
    )
        .prop_map(|(orders, customers)| {
            let orders = orders
                .iter()
                .filter_map(|(key, raw)| Order::from_record(key, raw))
                .collect();
            let customers = customers
                .iter()
                .filter_map(|(key, raw)| Customer::from_record(key, raw))
                .collect();
            Snapshot::new(orders, customers)
        })
}

fn engine_for(snapshot: &Snapshot) -> ConsistencyEngine {
    let store = Arc::new(RecordingStore::new(json!({})));
    ConsistencyEngine::new(Arc::new(FixedSource(snapshot.clone())), store)
}

proptest! {
    #[test]
    fn detection_is_deterministic(snapshot in snapshot_strategy()) {
        let engine = engine_for(&snapshot);
        let first = engine.detect_snapshot(&snapshot);
        let second = engine.detect_snapshot(&snapshot);
        prop_assert_eq!(first.findings, second.findings);
        prop_assert_eq!(first.health_score, second.health_score);
    }

    #[test]
    fn findings_are_grouped_in_rule_order(snapshot in snapshot_strategy()) {
        let report = engine_for(&snapshot).detect_snapshot(&snapshot);
        let kinds: Vec<FindingKind> = report.findings.iter().map(|f| f.kind).collect();
        let mut sorted = kinds.clone();
        sorted.sort();
        prop_assert_eq!(kinds, sorted);
    }

    #[test]
    fn counts_match_findings(snapshot in snapshot_strategy()) {
        let report = engine_for(&snapshot).detect_snapshot(&snapshot);
        let total: usize = report.counts_by_kind.values().sum();
        prop_assert_eq!(total, report.findings.len());
        let conflicts = report.counts_by_conflict;
        prop_assert_eq!(conflicts.missing + conflicts.different + conflicts.same, report.findings.len());
        let issues = conflicts.missing + conflicts.different;
        prop_assert_eq!(
            report.health_score,
            FindingAggregator::health_score(snapshot.orders.len(), snapshot.customers.len(), issues)
        );
    }

    #[test]
    fn phone_proposals_are_digit_only(snapshot in snapshot_strategy()) {
        let report = engine_for(&snapshot).detect_snapshot(&snapshot);
        for finding in report.findings_of(FindingKind::PhoneFormat) {
            let proposed = finding.proposed_str().unwrap_or_default();
            prop_assert!(proposed.chars().all(|c| c.is_ascii_digit()), "{:?}", finding);
        }
    }

    #[test]
    fn informational_findings_never_plan(snapshot in snapshot_strategy()) {
        let report = engine_for(&snapshot).detect_snapshot(&snapshot);
        for finding in report.findings.iter().filter(|f| f.conflict_type == ConflictType::Same) {
            prop_assert!(RemediationPlan::for_finding(finding).is_err());
        }
    }
}
