//! Consistency rules
//!
//! Every rule is a stateless pass over a [`DetectionContext`]. Rules never
//! touch the store; remediation is planned from the findings they emit.

use serde_json::{Map, Value, json};

use crate::application::detection::DetectionContext;
use crate::domain::constants::{ORDER_ITEMS_FIELD, PHONE_MAX_DIGITS, PHONE_MIN_DIGITS};
use crate::domain::entities::non_blank;
use crate::domain::finding::{ConflictType, Finding, FindingKind};
use crate::domain::phone::{normalize, suggest_canonical_form};
use crate::domain::product_names::standardize;
use crate::domain::time_slot::suggest_time_slot;

pub trait ConsistencyRule: Send + Sync {
    fn kind(&self) -> FindingKind;

    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<Finding>;
}

/// Full rule set in reporting order
pub fn default_rules() -> Vec<Box<dyn ConsistencyRule>> {
    vec![
        Box::new(PhoneFormatRule),
        Box::new(DuplicateCustomerRule),
        Box::new(OrderIdMismatchRule),
        Box::new(WrongStorageKeyRule),
        Box::new(NonStandardProductNameRule),
        Box::new(MissingRequiredFieldRule),
        Box::new(InvalidPhoneShapeRule),
        Box::new(MissingTimeSlotRule),
        Box::new(ProfileSyncRule),
    ]
}

/// Rule set restricted to `kinds`, keeping reporting order
pub fn rules_for(kinds: &[FindingKind]) -> Vec<Box<dyn ConsistencyRule>> {
    default_rules()
        .into_iter()
        .filter(|rule| kinds.contains(&rule.kind()))
        .collect()
}

/// Order phones that carry anything besides digits
pub struct PhoneFormatRule;

impl PhoneFormatRule {
    fn labels(raw: &str) -> Vec<&'static str> {
        let mut labels = Vec::new();
        let rest = match raw.strip_prefix("+84") {
            Some(rest) => {
                labels.push("+84 format");
                rest
            }
            None => raw,
        };
        if rest.chars().any(char::is_whitespace) {
            labels.push("whitespace");
        }
        if rest.chars().any(|c| !c.is_ascii_digit() && !c.is_whitespace()) {
            labels.push("special chars");
        }
        labels
    }
}

impl ConsistencyRule for PhoneFormatRule {
    fn kind(&self) -> FindingKind {
        FindingKind::PhoneFormat
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<Finding> {
        ctx.snapshot
            .orders
            .iter()
            .filter_map(|order| {
                let raw = order.phone()?;
                let digits = normalize(raw);
                if raw == digits {
                    return None;
                }
                let mut finding = Finding::new(self.kind(), &order.storage_key, ConflictType::Different)
                    .with_current(raw)
                    .with_proposed(suggest_canonical_form(&digits))
                    .with_customer_name(order.customer_name());
                finding.metadata.labels = Self::labels(raw).into_iter().map(String::from).collect();
                Some(finding)
            })
            .collect()
    }
}

/// Customers sharing a canonical phone key; the first one seen is kept
pub struct DuplicateCustomerRule;

impl ConsistencyRule for DuplicateCustomerRule {
    fn kind(&self) -> FindingKind {
        FindingKind::DuplicateCustomer
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (key, members) in ctx.customers_by_key.iter() {
            let Some((keep, duplicates)) = members.split_first() else {
                continue;
            };
            for duplicate in duplicates {
                if duplicate.storage_key == keep.storage_key {
                    continue;
                }
                let mut finding = Finding::new(self.kind(), &duplicate.storage_key, ConflictType::Different)
                    .with_current(duplicate.phone.clone().unwrap_or_else(|| duplicate.storage_key.clone()))
                    .with_proposed(keep.storage_key.clone())
                    .with_customer_name(duplicate.name.as_deref())
                    .with_label(format!("duplicate of {key}"));
                finding.metadata.related_keys = vec![keep.storage_key.clone()];
                findings.push(finding);
            }
        }
        findings
    }
}

/// Customer first/last order ids that do not match their orders
pub struct OrderIdMismatchRule;

impl ConsistencyRule for OrderIdMismatchRule {
    fn kind(&self) -> FindingKind {
        FindingKind::OrderIdMismatch
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (key, _) in ctx.orders_by_key.iter() {
            let (Some(customer), Some(span)) = (ctx.customer_for(key), ctx.order_span(key)) else {
                continue;
            };
            let stored_first = customer.first_order_id();
            let stored_last = customer.last_order_id();

            let mut labels = Vec::new();
            match stored_first {
                None => labels.push("Missing firstOrderId"),
                Some(id) if id != span.first_order_id => labels.push("Wrong firstOrderId"),
                Some(_) => {}
            }
            match stored_last {
                None => labels.push("Missing lastOrderId"),
                Some(id) if id != span.last_order_id => labels.push("Wrong lastOrderId"),
                Some(_) => {}
            }
            if labels.is_empty() {
                continue;
            }

            let conflict = if stored_first.is_none() || stored_last.is_none() {
                ConflictType::Missing
            } else {
                ConflictType::Different
            };
            let mut finding = Finding::new(self.kind(), &customer.storage_key, conflict)
                .with_current(json!({ "firstOrderId": stored_first, "lastOrderId": stored_last }))
                .with_proposed(json!({
                    "firstOrderId": span.first_order_id,
                    "lastOrderId": span.last_order_id,
                }))
                .with_customer_name(customer.name.as_deref());
            finding.metadata.labels = labels.into_iter().map(String::from).collect();
            finding.metadata.order_count = Some(span.order_count);
            findings.push(finding);
        }
        findings
    }
}

/// Orders stored under a key other than their own id
pub struct WrongStorageKeyRule;

impl ConsistencyRule for WrongStorageKeyRule {
    fn kind(&self) -> FindingKind {
        FindingKind::WrongStorageKey
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<Finding> {
        ctx.snapshot
            .orders
            .iter()
            .filter(|order| order.storage_key != order.id)
            .map(|order| {
                let mut finding = Finding::new(self.kind(), &order.storage_key, ConflictType::Different)
                    .with_current(order.storage_key.clone())
                    .with_customer_name(order.customer_name());
                // ids containing a separator would land in a nested path
                if order.id.contains('/') {
                    finding = finding.with_label("id is not a valid key");
                } else {
                    finding = finding.with_proposed(order.id.clone());
                }
                finding.metadata.related_keys = vec![order.id.clone()];
                finding.metadata.record = Some(order.raw.clone());
                finding
            })
            .collect()
    }
}

/// Line items whose names are spelling variants of a known product
pub struct NonStandardProductNameRule;

impl ConsistencyRule for NonStandardProductNameRule {
    fn kind(&self) -> FindingKind {
        FindingKind::NonStandardProductName
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for order in &ctx.snapshot.orders {
            let fixes: Vec<(usize, &str, &'static str)> = order
                .items
                .iter()
                .enumerate()
                .filter_map(|(index, item)| {
                    let name = item.name.as_deref()?;
                    standardize(name).map(|canonical| (index, name, canonical))
                })
                .collect();
            if fixes.is_empty() {
                continue;
            }

            let mut items = order.raw_items();
            for (index, _, canonical) in &fixes {
                if let Some(Value::Object(item)) = items.get_mut(*index) {
                    item.insert("name".to_string(), Value::from(*canonical));
                }
            }

            let mut proposed = Map::new();
            proposed.insert(ORDER_ITEMS_FIELD.to_string(), Value::Array(items));

            let mut finding = Finding::new(self.kind(), &order.storage_key, ConflictType::Different)
                .with_current(fixes.iter().map(|(_, name, _)| Value::from(*name)).collect::<Vec<_>>())
                .with_proposed(proposed)
                .with_customer_name(order.customer_name());
            finding.metadata.labels = fixes
                .iter()
                .map(|(_, name, canonical)| format!("{} -> {canonical}", name.trim()))
                .collect();
            findings.push(finding);
        }
        findings
    }
}

/// Customers with orders but without name, phone or order id references
pub struct MissingRequiredFieldRule;

impl ConsistencyRule for MissingRequiredFieldRule {
    fn kind(&self) -> FindingKind {
        FindingKind::MissingRequiredField
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (key, members) in ctx.customers_by_key.iter() {
            let Some(customer) = members.first() else {
                continue;
            };
            let orders = ctx.chronological_orders(key);
            let (Some(first), Some(last)) = (orders.first(), orders.last()) else {
                continue;
            };

            let mut fixes = Map::new();
            let mut current = Map::new();
            if !customer.has_name() {
                let name = first.customer_name().or_else(|| last.customer_name()).unwrap_or("Unknown");
                fixes.insert("name".into(), name.into());
                current.insert("name".into(), customer.name.clone().into());
            }
            if !customer.has_phone() {
                fixes.insert("phone".into(), first.phone().unwrap_or_default().into());
                current.insert("phone".into(), customer.phone.clone().into());
            }
            if customer.first_order_id().is_none() {
                fixes.insert("firstOrderId".into(), first.id.clone().into());
                current.insert("firstOrderId".into(), customer.first_order_id.clone().into());
            }
            if customer.last_order_id().is_none() {
                fixes.insert("lastOrderId".into(), last.id.clone().into());
                current.insert("lastOrderId".into(), customer.last_order_id.clone().into());
            }
            if fixes.is_empty() {
                continue;
            }

            let labels = fixes.keys().map(|field| format!("Missing {field}")).collect();
            let mut finding = Finding::new(self.kind(), &customer.storage_key, ConflictType::Missing)
                .with_current(current)
                .with_proposed(fixes)
                .with_customer_name(customer.name.as_deref());
            finding.metadata.labels = labels;
            finding.metadata.order_count = Some(orders.len());
            findings.push(finding);
        }
        findings
    }
}

/// Customer phones that are blank, too short or too long, or not digit-only
pub struct InvalidPhoneShapeRule;

impl ConsistencyRule for InvalidPhoneShapeRule {
    fn kind(&self) -> FindingKind {
        FindingKind::InvalidPhoneShape
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<Finding> {
        let valid_length = |digits: &str| (PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&digits.len());

        ctx.snapshot
            .customers
            .iter()
            .filter_map(|customer| {
                let raw = customer.phone.as_deref().unwrap_or_default();
                let digits = normalize(raw);
                let blank = raw.trim().is_empty();
                if !blank && valid_length(&digits) && raw == digits {
                    return None;
                }

                let conflict = if blank { ConflictType::Missing } else { ConflictType::Different };
                let mut finding = Finding::new(self.kind(), &customer.storage_key, conflict)
                    .with_current(raw)
                    .with_customer_name(customer.name.as_deref());
                if valid_length(&digits) {
                    finding = finding.with_proposed(digits);
                } else {
                    finding = finding.with_label("manual fix required");
                }
                if blank {
                    finding = finding.with_label("empty phone");
                }
                Some(finding)
            })
            .collect()
    }
}

/// Orders without a delivery time slot
pub struct MissingTimeSlotRule;

impl ConsistencyRule for MissingTimeSlotRule {
    fn kind(&self) -> FindingKind {
        FindingKind::MissingTimeSlot
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<Finding> {
        ctx.snapshot
            .orders
            .iter()
            .filter(|order| non_blank(order.delivery_time_slot.as_deref()).is_none())
            .map(|order| {
                let mut finding = Finding::new(self.kind(), &order.storage_key, ConflictType::Missing)
                    .with_customer_name(order.customer_name());
                finding.metadata.suggestion = order
                    .received_at
                    .or(order.ordered_at)
                    .and_then(|at| suggest_time_slot(at, ctx.utc_offset_hours))
                    .map(String::from);
                finding
            })
            .collect()
    }
}

/// Social link and delivery addresses known from orders but not on the customer
pub struct ProfileSyncRule;

impl ConsistencyRule for ProfileSyncRule {
    fn kind(&self) -> FindingKind {
        FindingKind::ProfileSync
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (key, orders) in ctx.orders_by_key.iter() {
            let Some(customer) = ctx.customer_for(key) else {
                continue;
            };

            let order_social = orders
                .iter()
                .find_map(|order| non_blank(order.customer.social_link.as_deref()));
            let social_status = order_social.map(|link| match customer.social_link() {
                None => ConflictType::Missing,
                Some(current) if current != link => ConflictType::Different,
                Some(_) => ConflictType::Same,
            });

            let mut order_addresses: Vec<&str> = Vec::new();
            for address in orders.iter().filter_map(|order| order.delivery_address()) {
                if !order_addresses.contains(&address) {
                    order_addresses.push(address);
                }
            }
            let missing_addresses: Vec<&str> = order_addresses
                .iter()
                .copied()
                .filter(|address| !customer.addresses.iter().any(|known| known == address))
                .collect();
            let address_status = if !missing_addresses.is_empty() {
                Some(ConflictType::Missing)
            } else if !customer.addresses.is_empty() && !order_addresses.is_empty() {
                Some(ConflictType::Same)
            } else {
                None
            };

            if social_status.is_none() && address_status.is_none() {
                continue;
            }

            let conflict = if social_status == Some(ConflictType::Missing) || address_status == Some(ConflictType::Missing) {
                ConflictType::Missing
            } else if social_status == Some(ConflictType::Different) {
                ConflictType::Different
            } else {
                ConflictType::Same
            };

            let mut finding = Finding::new(self.kind(), &customer.storage_key, conflict)
                .with_current(json!({
                    "socialLink": customer.social_link,
                    "addresses": customer.addresses,
                }))
                .with_customer_name(customer.name.as_deref());

            if conflict != ConflictType::Same {
                let mut proposed = Map::new();
                if matches!(social_status, Some(ConflictType::Missing | ConflictType::Different)) {
                    proposed.insert("socialLink".into(), order_social.into());
                }
                if !missing_addresses.is_empty() {
                    let mut addresses = customer.addresses.clone();
                    addresses.extend(missing_addresses.iter().map(|a| (*a).to_string()));
                    proposed.insert("addresses".into(), addresses.into());
                }
                finding = finding.with_proposed(proposed);
            }

            match social_status {
                Some(ConflictType::Missing) => finding = finding.with_label("socialLink missing"),
                Some(ConflictType::Different) => finding = finding.with_label("socialLink different"),
                _ => {}
            }
            if !missing_addresses.is_empty() {
                finding = finding.with_label(format!("{} addresses missing", missing_addresses.len()));
            }
            finding.metadata.order_count = Some(orders.len());
            findings.push(finding);
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Customer, Order, Snapshot};

    fn order(key: &str, record: Value) -> Order {
        Order::from_record(key, &record).unwrap()
    }

    fn customer(key: &str, record: Value) -> Customer {
        Customer::from_record(key, &record).unwrap()
    }

    fn run(rule: &dyn ConsistencyRule, snapshot: &Snapshot) -> Vec<Finding> {
        rule.detect(&DetectionContext::new(snapshot, 7))
    }

    #[test]
    fn phone_format_labels_and_proposal() {
        let snapshot = Snapshot::new(
            vec![
                order("o1", json!({ "id": "o1", "customer": { "phone": "+84 901 234 567" } })),
                order("o2", json!({ "id": "o2", "customer": { "phone": "0901-234-567" } })),
                order("o3", json!({ "id": "o3", "customer": { "phone": "0901234567" } })),
                order("o4", json!({ "id": "o4" })),
            ],
            vec![],
        );
        let findings = run(&PhoneFormatRule, &snapshot);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].proposed_str(), Some("0901234567"));
        assert_eq!(findings[0].metadata.labels, vec!["+84 format", "whitespace"]);
        assert_eq!(findings[1].metadata.labels, vec!["special chars"]);
    }

    #[test]
    fn duplicate_customer_keeps_first_seen() {
        let snapshot = Snapshot::new(
            vec![],
            vec![
                customer("0901234567", json!({ "phone": "0901234567" })),
                customer("+84 901 234 567", json!({ "phone": "+84 901 234 567" })),
            ],
        );
        let findings = run(&DuplicateCustomerRule, &snapshot);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].subject_key, "+84 901 234 567");
        assert_eq!(findings[0].proposed_str(), Some("0901234567"));
    }

    #[test]
    fn order_ids_follow_received_time() {
        let snapshot = Snapshot::new(
            vec![
                order("A", json!({ "id": "A", "customerPhone": "0901234567", "orderDate": 100 })),
                order("B", json!({ "id": "B", "customerPhone": "0901234567", "orderDate": 300 })),
                order("C", json!({ "id": "C", "customerPhone": "0901234567", "orderDate": 200 })),
            ],
            vec![customer("0901234567", json!({ "phone": "0901234567", "firstOrderId": "C", "lastOrderId": "B" }))],
        );
        let findings = run(&OrderIdMismatchRule, &snapshot);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].conflict_type, ConflictType::Different);
        assert_eq!(findings[0].proposed_value, Some(json!({ "firstOrderId": "A", "lastOrderId": "B" })));
        assert_eq!(findings[0].metadata.labels, vec!["Wrong firstOrderId"]);
    }

    #[test]
    fn wrong_storage_key_carries_record() {
        let snapshot = Snapshot::new(vec![order("tmp-1", json!({ "id": "o-1", "state": "new" }))], vec![]);
        let findings = run(&WrongStorageKeyRule, &snapshot);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].proposed_str(), Some("o-1"));
        assert_eq!(findings[0].metadata.record.as_ref().unwrap()["state"], "new");
    }

    #[test]
    fn product_names_rewrite_only_names() {
        let snapshot = Snapshot::new(
            vec![order(
                "o1",
                json!({ "id": "o1", "cakes": [
                    { "name": "cheese bread", "amount": 2, "price": 30000 },
                    { "name": "Tiramisu", "amount": 1 }
                ] }),
            )],
            vec![],
        );
        let findings = run(&NonStandardProductNameRule, &snapshot);
        assert_eq!(findings.len(), 1);
        let proposed = findings[0].proposed_value.as_ref().unwrap();
        assert_eq!(proposed["cakes"][0], json!({ "name": "Brazilian Cheesebread", "amount": 2, "price": 30000 }));
        assert_eq!(proposed["cakes"][1]["name"], "Tiramisu");
    }

    #[test]
    fn missing_first_order_id_is_proposed() {
        let snapshot = Snapshot::new(
            vec![order("X", json!({ "id": "X", "customerPhone": "0901234567", "customer": { "name": "Lan" } }))],
            vec![customer("0901234567", json!({ "name": "Lan", "phone": "0901234567", "lastOrderId": "X" }))],
        );
        let findings = run(&MissingRequiredFieldRule, &snapshot);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].proposed_value, Some(json!({ "firstOrderId": "X" })));
    }

    #[test]
    fn missing_name_falls_back_to_unknown() {
        let snapshot = Snapshot::new(
            vec![order("X", json!({ "id": "X", "customerPhone": "0901234567" }))],
            vec![customer("0901234567", json!({ "phone": "0901234567", "firstOrderId": "X", "lastOrderId": "X" }))],
        );
        let findings = run(&MissingRequiredFieldRule, &snapshot);
        assert_eq!(findings[0].proposed_value, Some(json!({ "name": "Unknown" })));
    }

    #[test]
    fn invalid_phone_shapes() {
        let snapshot = Snapshot::new(
            vec![],
            vec![
                customer("a", json!({ "phone": "0901 234 567" })),
                customer("b", json!({ "phone": "123" })),
                customer("c", json!({ "phone": "" })),
                customer("0901234567", json!({ "phone": "0901234567" })),
            ],
        );
        let findings = run(&InvalidPhoneShapeRule, &snapshot);
        assert_eq!(findings.len(), 3);
        assert_eq!(findings[0].proposed_str(), Some("0901234567"));
        assert!(findings[1].proposed_value.is_none());
        assert_eq!(findings[2].conflict_type, ConflictType::Missing);
    }

    #[test]
    fn missing_time_slot_suggests_from_received_time() {
        // 07:00 UTC is 14:00 at UTC+7
        let snapshot = Snapshot::new(
            vec![
                order("o1", json!({ "id": "o1", "orderDate": 25200 })),
                order("o2", json!({ "id": "o2", "deliveryTimeSlot": "10:00 - 12:00" })),
            ],
            vec![],
        );
        let findings = run(&MissingTimeSlotRule, &snapshot);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].proposed_value.is_none());
        assert_eq!(findings[0].metadata.suggestion.as_deref(), Some("14:00 - 16:00"));
    }

    #[test]
    fn profile_sync_merges_addresses() {
        let snapshot = Snapshot::new(
            vec![
                order("o1", json!({ "id": "o1", "customer": { "phone": "0901234567", "address": "1 Le Loi", "socialLink": "fb.com/lan" } })),
                order("o2", json!({ "id": "o2", "customer": { "phone": "0901234567", "address": "2 Hai Ba Trung" } })),
            ],
            vec![customer("0901234567", json!({ "phone": "0901234567", "addresses": ["1 Le Loi"] }))],
        );
        let findings = run(&ProfileSyncRule, &snapshot);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].conflict_type, ConflictType::Missing);
        assert_eq!(
            findings[0].proposed_value,
            Some(json!({ "socialLink": "fb.com/lan", "addresses": ["1 Le Loi", "2 Hai Ba Trung"] }))
        );
    }

    #[test]
    fn profile_sync_reports_in_sync_customers_as_same() {
        let snapshot = Snapshot::new(
            vec![order("o1", json!({ "id": "o1", "customer": { "phone": "0901234567", "address": "1 Le Loi" } }))],
            vec![customer("0901234567", json!({ "phone": "0901234567", "addresses": ["1 Le Loi"] }))],
        );
        let findings = run(&ProfileSyncRule, &snapshot);
        assert_eq!(findings.len(), 1);
        assert!(!findings[0].is_actionable());
        assert!(findings[0].proposed_value.is_none());
    }

    #[test]
    fn rules_for_keeps_reporting_order() {
        let kinds: Vec<_> = rules_for(&[FindingKind::ProfileSync, FindingKind::PhoneFormat])
            .iter()
            .map(|r| r.kind())
            .collect();
        assert_eq!(kinds, vec![FindingKind::PhoneFormat, FindingKind::ProfileSync]);
    }
}
