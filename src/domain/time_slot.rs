//! Delivery time slot suggestion for orders that lack one

use chrono::{FixedOffset, Timelike};

use crate::domain::entities::cf_absolute_to_utc;

pub const DELIVERY_TIME_SLOTS: [&str; 5] = [
    "10:00 - 12:00",
    "12:00 - 14:00",
    "14:00 - 16:00",
    "16:00 - 18:00",
    "18:00 - 20:00",
];

/// Local hour of the first slot
const FIRST_SLOT_HOUR: u32 = 10;
const SLOT_LENGTH_HOURS: u32 = 2;

/// Slot for the hour an order was received, in the shop's local time.
///
/// Hours before opening map to the first slot and hours after closing to the
/// last one. `None` when the timestamp or offset is out of range.
pub fn suggest_time_slot(received_at_cf: f64, utc_offset_hours: i32) -> Option<&'static str> {
    let offset = FixedOffset::east_opt(utc_offset_hours.checked_mul(3600)?)?;
    let local = cf_absolute_to_utc(received_at_cf)?.with_timezone(&offset);
    Some(slot_for_hour(local.hour()))
}

pub fn slot_for_hour(hour: u32) -> &'static str {
    let index = (hour.saturating_sub(FIRST_SLOT_HOUR) / SLOT_LENGTH_HOURS) as usize;
    DELIVERY_TIME_SLOTS[index.min(DELIVERY_TIME_SLOTS.len() - 1)]
}
