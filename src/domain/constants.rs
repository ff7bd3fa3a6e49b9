//! Store layout and domain constants shared across layers

/// Collection holding orders, keyed by (ideally) the order id
pub const ORDERS_COLLECTION: &str = "orders";

/// Collection holding customers, keyed by phone
pub const CUSTOMERS_COLLECTION: &str = "newCustomers";

/// Field of an order record holding its line items
pub const ORDER_ITEMS_FIELD: &str = "cakes";

/// Literal the operator must type before any storage-key rename runs
pub const RENAME_CONFIRMATION_TOKEN: &str = "RENAME";

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z
pub const CF_ABSOLUTE_EPOCH_OFFSET_SECS: i64 = 978_307_200;

/// Customer `createDate` values below this are CFAbsoluteTime seconds,
/// values above are Unix milliseconds
pub const CF_TIME_HEURISTIC_LIMIT: f64 = 2_000_000_000.0;

/// Valid digit-only phone lengths (inclusive)
pub const PHONE_MIN_DIGITS: usize = 9;
pub const PHONE_MAX_DIGITS: usize = 11;

/// Build a store path from segments
pub fn record_path(collection: &str, key: &str) -> String {
    format!("{collection}/{key}")
}
