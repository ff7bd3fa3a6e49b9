//! Product name standardization rules

use once_cell::sync::Lazy;

/// One canonical product name and the spellings that should be folded into it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductNameRule {
    pub canonical_name: &'static str,
    /// Lowercase, trimmed
    pub variants: &'static [&'static str],
}

impl ProductNameRule {
    fn matches(&self, folded: &str) -> bool {
        self.variants.contains(&folded) || self.canonical_name.to_lowercase() == folded
    }
}

pub static PRODUCT_NAME_RULES: Lazy<Vec<ProductNameRule>> = Lazy::new(|| {
    vec![ProductNameRule {
        canonical_name: "Brazilian Cheesebread",
        variants: &[
            "brazilian cheese bread",
            "brazilian cheesebread",
            "cheese bread",
            "cheesebread",
            "brazillian cheesebread",
            "cheesebreead",
            "pão de queijo",
        ],
    }]
});

/// Canonical name for `name`, or `None` when it is unknown or already canonical.
pub fn standardize(name: &str) -> Option<&'static str> {
    standardize_with(&PRODUCT_NAME_RULES, name)
}

pub fn standardize_with(rules: &[ProductNameRule], name: &str) -> Option<&'static str> {
    let trimmed = name.trim();
    let folded = trimmed.to_lowercase();
    rules
        .iter()
        .find(|rule| rule.matches(&folded))
        .map(|rule| rule.canonical_name)
        .filter(|canonical| *canonical != trimmed)
}
