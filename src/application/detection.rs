//! Per-pass detection context
//!
//! Groupings are computed once from an immutable snapshot and shared by every
//! rule. Groups keep snapshot order: the first member of a group is the first
//! record seen under that key.

use std::collections::HashMap;

use crate::domain::entities::{Customer, Order, Snapshot};

/// Insertion-ordered `key -> members` grouping
#[derive(Debug)]
pub struct KeyGroups<'a, T> {
    groups: Vec<(String, Vec<&'a T>)>,
    index: HashMap<String, usize>,
}

impl<'a, T> KeyGroups<'a, T> {
    /// Group `items` by `key_of`; items without a key are left out.
    pub fn group_by<I, F>(items: I, key_of: F) -> Self
    where
        I: IntoIterator<Item = &'a T>,
        F: Fn(&T) -> Option<String>,
    {
        let mut groups: Vec<(String, Vec<&'a T>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for item in items {
            let Some(key) = key_of(item).filter(|k| !k.is_empty()) else {
                continue;
            };
            match index.get(&key) {
                Some(&slot) => groups[slot].1.push(item),
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push((key, vec![item]));
                }
            }
        }

        Self { groups, index }
    }

    pub fn get(&self, key: &str) -> Option<&[&'a T]> {
        self.index.get(key).map(|&slot| self.groups[slot].1.as_slice())
    }

    pub fn first(&self, key: &str) -> Option<&'a T> {
        self.get(key).and_then(|members| members.first().copied())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[&'a T])> {
        self.groups.iter().map(|(key, members)| (key.as_str(), members.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Expected first/last order ids for one customer key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpan {
    pub first_order_id: String,
    pub last_order_id: String,
    pub order_count: usize,
}

pub struct DetectionContext<'a> {
    pub snapshot: &'a Snapshot,
    pub customers_by_key: KeyGroups<'a, Customer>,
    pub orders_by_key: KeyGroups<'a, Order>,
    /// Local time offset used to suggest delivery slots
    pub utc_offset_hours: i32,
}

impl<'a> DetectionContext<'a> {
    pub fn new(snapshot: &'a Snapshot, utc_offset_hours: i32) -> Self {
        Self {
            snapshot,
            customers_by_key: KeyGroups::group_by(&snapshot.customers, |c| Some(c.phone_key())),
            orders_by_key: KeyGroups::group_by(&snapshot.orders, Order::phone_key),
            utc_offset_hours,
        }
    }

    /// First-seen customer for a key; later ones are duplicates.
    pub fn customer_for(&self, key: &str) -> Option<&'a Customer> {
        self.customers_by_key.first(key)
    }

    /// Orders for a key sorted oldest first. The sort is stable, so orders
    /// with equal timestamps keep snapshot order.
    pub fn chronological_orders(&self, key: &str) -> Vec<&'a Order> {
        let mut orders = self.orders_by_key.get(key).map(<[_]>::to_vec).unwrap_or_default();
        orders.sort_by(|a, b| a.chronology_key().total_cmp(&b.chronology_key()));
        orders
    }

    pub fn order_span(&self, key: &str) -> Option<OrderSpan> {
        let orders = self.chronological_orders(key);
        let (first, last) = (orders.first()?, orders.last()?);
        Some(OrderSpan {
            first_order_id: first.id.clone(),
            last_order_id: last.id.clone(),
            order_count: orders.len(),
        })
    }
}
