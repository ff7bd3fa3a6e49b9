//! Phone key normalization
//!
//! Orders and customers are only linked through a phone number that has been
//! typed in by hand, imported from spreadsheets and migrated by scripts. Every
//! join between the two collections goes through [`canonical_key`].

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;

/// Capacity of the process-wide canonical key cache
pub const PHONE_CACHE_CAPACITY: usize = 1_000;

/// Country prefix rewritten to a domestic leading zero
const COUNTRY_PREFIX: &str = "84";

static CANONICAL_KEYS: Lazy<PhoneKeyCache> = Lazy::new(|| PhoneKeyCache::new(PHONE_CACHE_CAPACITY));

/// Strip every non-digit character.
///
/// `normalize(normalize(x)) == normalize(x)` for every input.
pub fn normalize(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

/// `normalize` for optional fields; a missing phone normalizes to `""`.
pub fn normalize_opt(phone: Option<&str>) -> String {
    phone.map(normalize).unwrap_or_default()
}

/// Rewrite a leading `84` country code to `0` when the number is long enough
/// to carry one. Anything else is returned unchanged.
pub fn suggest_canonical_form(digits: &str) -> String {
    match digits.strip_prefix(COUNTRY_PREFIX) {
        Some(rest) if digits.len() > 9 => format!("0{rest}"),
        _ => digits.to_string(),
    }
}

/// Join key between orders and customers: digits only, country prefix folded.
pub fn canonical_key(phone: &str) -> String {
    CANONICAL_KEYS.get_or_compute(phone, |raw| suggest_canonical_form(&normalize(raw)))
}

/// Bounded memo for canonical keys. Cleared wholesale when full; results never
/// depend on what is cached.
pub struct PhoneKeyCache {
    capacity: usize,
    entries: Mutex<HashMap<String, String>>,
}

impl PhoneKeyCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::with_capacity(capacity.min(PHONE_CACHE_CAPACITY))),
        }
    }

    pub fn get_or_compute<F>(&self, raw: &str, compute: F) -> String
    where
        F: FnOnce(&str) -> String,
    {
        // A poisoned lock only means another thread panicked mid-insert;
        // fall back to computing without the cache.
        let Ok(mut entries) = self.entries.lock() else {
            return compute(raw);
        };

        if let Some(hit) = entries.get(raw) {
            return hit.clone();
        }

        let value = compute(raw);
        if entries.len() >= self.capacity {
            entries.clear();
        }
        entries.insert(raw.to_string(), value.clone());
        value
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
