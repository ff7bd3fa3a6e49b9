//! Order and customer entities parsed from the schemaless record store
//!
//! Records come from two collections written by different tools over the
//! years, so parsing is deliberately lenient: phones and ids may be numbers,
//! amounts may be strings, and unknown fields are kept in the raw record.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::constants::{CF_ABSOLUTE_EPOCH_OFFSET_SECS, CF_TIME_HEURISTIC_LIMIT, ORDER_ITEMS_FIELD};
use crate::domain::phone::canonical_key;

/// One line item of an order (`cakes` in the store)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub price: Option<f64>,
}

/// Customer sub-record embedded in an order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCustomer {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub social_link: Option<String>,
}

/// Store shape of `orders/<key>`
#[derive(Debug, Deserialize)]
struct OrderRecord {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    id: Option<String>,
    #[serde(default)]
    customer: Option<OrderCustomer>,
    #[serde(default, rename = "customerPhone", deserialize_with = "lenient::opt_string")]
    customer_phone: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    address: Option<String>,
    #[serde(default, rename = "cakes", alias = "items", deserialize_with = "lenient::item_list")]
    items: Vec<LineItem>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    state: Option<String>,
    #[serde(default, rename = "orderDate", deserialize_with = "lenient::opt_number")]
    received_at: Option<f64>,
    #[serde(default, rename = "createDate", deserialize_with = "lenient::opt_number")]
    ordered_at: Option<f64>,
    #[serde(default, rename = "deliveryTimeSlot", deserialize_with = "lenient::opt_string")]
    delivery_time_slot: Option<String>,
}

/// An order as seen by the consistency rules
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Logical id the record should be stored under
    pub id: String,
    /// Key the record is actually stored under
    pub storage_key: String,
    pub customer: OrderCustomer,
    pub customer_phone: Option<String>,
    pub address: Option<String>,
    pub items: Vec<LineItem>,
    pub status: Option<String>,
    /// CFAbsoluteTime seconds
    pub received_at: Option<f64>,
    /// CFAbsoluteTime seconds
    pub ordered_at: Option<f64>,
    pub delivery_time_slot: Option<String>,
    #[serde(skip)]
    pub raw: Value,
}

impl Order {
    /// Parse `orders/<storage_key>`. Returns `None` for records that are not
    /// objects or cannot be read at all.
    pub fn from_record(storage_key: &str, raw: &Value) -> Option<Self> {
        if !raw.is_object() {
            return None;
        }
        let record: OrderRecord = serde_json::from_value(raw.clone()).ok()?;

        Some(Self {
            id: record
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| storage_key.to_string()),
            storage_key: storage_key.to_string(),
            customer: record.customer.unwrap_or_default(),
            customer_phone: record.customer_phone,
            address: record.address,
            items: record.items,
            status: record.state,
            received_at: record.received_at,
            ordered_at: record.ordered_at,
            delivery_time_slot: record.delivery_time_slot,
            raw: raw.clone(),
        })
    }

    /// Raw phone as typed: embedded customer phone first, then the root field.
    pub fn phone(&self) -> Option<&str> {
        non_blank(self.customer.phone.as_deref()).or_else(|| non_blank(self.customer_phone.as_deref()))
    }

    /// Join key, `None` when the order carries no usable phone
    pub fn phone_key(&self) -> Option<String> {
        self.phone().map(canonical_key).filter(|k| !k.is_empty())
    }

    /// Sort key for "first/last order": received, then ordered, then 0.
    pub fn chronology_key(&self) -> f64 {
        self.received_at.or(self.ordered_at).unwrap_or(0.0)
    }

    /// Delivery address, embedded customer address first
    pub fn delivery_address(&self) -> Option<&str> {
        non_blank(self.customer.address.as_deref()).or_else(|| non_blank(self.address.as_deref()))
    }

    pub fn customer_name(&self) -> Option<&str> {
        non_blank(self.customer.name.as_deref())
    }

    pub fn received_at_utc(&self) -> Option<DateTime<Utc>> {
        self.received_at.and_then(cf_absolute_to_utc)
    }

    /// Line items exactly as stored, index-aligned with `items`
    pub fn raw_items(&self) -> Vec<Value> {
        self.raw
            .get(ORDER_ITEMS_FIELD)
            .or_else(|| self.raw.get("items"))
            .cloned()
            .map(lenient::entries)
            .unwrap_or_default()
    }
}

/// Store shape of `newCustomers/<key>`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerRecord {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    phone: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    email: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    address: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    addresses: Vec<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    first_order_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    last_order_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    social_link: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    create_date: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub storage_key: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub addresses: Vec<String>,
    pub first_order_id: Option<String>,
    pub last_order_id: Option<String>,
    pub social_link: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Customer {
    pub fn from_record(storage_key: &str, raw: &Value) -> Option<Self> {
        if !raw.is_object() {
            return None;
        }
        let record: CustomerRecord = serde_json::from_value(raw.clone()).ok()?;

        Some(Self {
            storage_key: storage_key.to_string(),
            name: record.name,
            phone: record.phone,
            email: record.email,
            address: record.address,
            addresses: record.addresses,
            first_order_id: record.first_order_id,
            last_order_id: record.last_order_id,
            social_link: record.social_link,
            created_at: record.create_date.and_then(customer_created_at),
        })
    }

    /// Join key. Customers are stored under their phone, so the storage key
    /// stands in when the phone field itself is blank.
    pub fn phone_key(&self) -> String {
        match non_blank(self.phone.as_deref()) {
            Some(phone) => canonical_key(phone),
            None => canonical_key(&self.storage_key),
        }
    }

    pub fn has_name(&self) -> bool {
        non_blank(self.name.as_deref()).is_some()
    }

    pub fn has_phone(&self) -> bool {
        non_blank(self.phone.as_deref()).is_some()
    }

    pub fn first_order_id(&self) -> Option<&str> {
        non_blank(self.first_order_id.as_deref())
    }

    pub fn last_order_id(&self) -> Option<&str> {
        non_blank(self.last_order_id.as_deref())
    }

    pub fn social_link(&self) -> Option<&str> {
        non_blank(self.social_link.as_deref())
    }
}

/// Immutable view of both collections taken at one point in time
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub orders: Vec<Order>,
    pub customers: Vec<Customer>,
}

impl Snapshot {
    pub fn new(orders: Vec<Order>, customers: Vec<Customer>) -> Self {
        Self { orders, customers }
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// CFAbsoluteTime (seconds since 2001-01-01 UTC) to a UTC timestamp
pub fn cf_absolute_to_utc(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let millis = ((seconds + CF_ABSOLUTE_EPOCH_OFFSET_SECS as f64) * 1000.0).round() as i64;
    Utc.timestamp_millis_opt(millis).single()
}

/// Customer `createDate` is either CFAbsoluteTime seconds or Unix milliseconds.
fn customer_created_at(raw: f64) -> Option<DateTime<Utc>> {
    if raw < CF_TIME_HEURISTIC_LIMIT {
        cf_absolute_to_utc(raw)
    } else if raw.is_finite() {
        #[allow(clippy::cast_possible_truncation)]
        let millis = raw.round() as i64;
        Utc.timestamp_millis_opt(millis).single()
    } else {
        None
    }
}

mod lenient {
    //! Deserializers tolerant of the type drift found in the store.

    use super::{Deserialize, Deserializer, LineItem, Value};

    /// Lists written by the realtime store sometimes come back keyed by index.
    pub fn entries(value: Value) -> Vec<Value> {
        match value {
            Value::Array(items) => items,
            Value::Object(map) => {
                // map keys iterate as strings, so "10" would sort before "2"
                let mut indexed: Vec<(Option<u64>, String, Value)> = map
                    .into_iter()
                    .map(|(k, v)| (k.parse().ok(), k, v))
                    .collect();
                indexed.sort_by(|a, b| (a.0.is_none(), a.0, &a.1).cmp(&(b.0.is_none(), b.0, &b.1)));
                indexed.into_iter().map(|(_, _, v)| v).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    pub fn opt_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    /// Keeps one entry per stored item so indices line up with the raw record.
    pub fn item_list<'de, D>(deserializer: D) -> Result<Vec<LineItem>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(entries(Value::deserialize(deserializer)?)
            .into_iter()
            .map(|v| {
                serde_json::from_value(v).unwrap_or(LineItem {
                    name: None,
                    amount: None,
                    price: None,
                })
            })
            .collect())
    }

    pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(entries(Value::deserialize(deserializer)?)
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect())
    }
}
