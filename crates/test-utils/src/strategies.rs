//! Proptest strategies for Mod Garden values.
//!
//! Strategies produce plain strings and JSON so that every crate can use them
//! without this crate depending on the schema or auth crates.
//!
//! ```no_run
//! use modgarden_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn ids_parse(id in strategies::arb_account_id()) {
//!         prop_assert!(modgarden_types::AccountId::parse(&id).is_ok());
//!     }
//! }
//! ```

use proptest::prelude::*;
use serde_json::{Map, Value};

/// Field names reserved for the record envelope.
const RESERVED_FIELDS: [&str; 2] = ["schema_version", "id"];

/// Generates a natural id, `[a-z]{5}`.
pub fn arb_natural_id() -> impl Strategy<Value = String> {
    "[a-z]{5}"
}

/// Generates a legacy all-digit account id.
pub fn arb_legacy_id() -> impl Strategy<Value = String> {
    "[1-9][0-9]{0,17}"
}

/// Generates an account id of either form, natural ids three times as often.
pub fn arb_account_id() -> impl Strategy<Value = String> {
    prop_oneof![3 => arb_natural_id(), 1 => arb_legacy_id()]
}

/// Generates a lowercase slug of 1-32 bytes.
pub fn arb_slug() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9-]{0,31}"
}

/// Generates a capability name: one of the well-known names or a random
/// valid one.
pub fn arb_capability_name() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::sample::select(vec!["administrator", "submit", "read", "manage_events"])
            .prop_map(str::to_string),
        "[a-z][a-z_]{0,15}",
    ]
}

/// Generates a record field name that is not reserved by the envelope.
pub fn arb_field_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,11}".prop_filter("reserved field name", |name| {
        !RESERVED_FIELDS.contains(&name.as_str())
    })
}

/// Generates a JSON scalar: null, boolean, integer or short string.
pub fn arb_json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,16}".prop_map(Value::String),
    ]
}

/// Generates a JSON value nested at most three levels deep.
pub fn arb_json_value() -> impl Strategy<Value = Value> {
    arb_json_leaf().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(arb_field_name(), inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Generates a record body of up to `max_fields` fields.
pub fn arb_fields(max_fields: usize) -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map(arb_field_name(), arb_json_value(), 0..=max_fields)
        .prop_map(|map| map.into_iter().collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use modgarden_types::validation;

    use super::*;

    proptest! {
        #[test]
        fn account_ids_are_valid(id in arb_account_id()) {
            prop_assert!(validation::validate_account_id(&id).is_ok());
        }

        #[test]
        fn slugs_are_valid(slug in arb_slug()) {
            prop_assert!(validation::validate_slug(&slug).is_ok());
        }

        #[test]
        fn capability_names_are_valid(name in arb_capability_name()) {
            prop_assert!(validation::validate_capability_name(&name).is_ok());
        }

        #[test]
        fn field_maps_avoid_reserved_names(fields in arb_fields(6)) {
            prop_assert!(fields.len() <= 6);
            for name in fields.keys() {
                prop_assert!(validation::validate_field_name(name).is_ok());
                prop_assert!(!RESERVED_FIELDS.contains(&name.as_str()));
            }
        }
    }
}
