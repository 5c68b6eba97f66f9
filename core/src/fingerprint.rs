//! Canonical action fingerprints.
//!
//! A [`Fingerprint`] is the compact JSON rendering of an action's body with
//! every object's keys sorted, at every depth. The metadata envelope is never
//! part of it, so a request action and the response action that echoes the
//! same body share one fingerprint.
//!
//! The writer sorts keys itself instead of relying on `serde_json::Map`
//! ordering, which flips to insertion order when any crate in the build
//! enables `preserve_order`.

use crate::action::Action;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Ledger key derived from an action body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint an action, ignoring its metadata.
    #[must_use]
    pub fn of(action: &Action) -> Self {
        fingerprint(action)
    }

    /// Borrow the canonical string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the fingerprint of `action`.
///
/// Deterministic and total: any body yields a string, equal bodies yield
/// equal strings regardless of key insertion order, and bodies differing
/// anywhere yield different strings.
///
/// # Example
///
/// ```
/// use datalayer_core::action::Action;
/// use datalayer_core::fingerprint::fingerprint;
/// use serde_json::json;
///
/// let a = Action::new("LIKE").with("post", json!({ "id": 1, "site": 2 }));
/// let b = Action::new("LIKE").with("post", json!({ "site": 2, "id": 1 }));
///
/// assert_eq!(fingerprint(&a), fingerprint(&b));
/// assert_eq!(
///     fingerprint(&a).as_str(),
///     r#"{"post":{"id":1,"site":2},"type":"LIKE"}"#
/// );
/// ```
#[must_use]
pub fn fingerprint(action: &Action) -> Fingerprint {
    let mut out = String::with_capacity(64);
    write_object(&action.body, &mut out);
    Fingerprint(out)
}

/// Canonical rendering of an arbitrary JSON value.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        },
        // Scalars already have exactly one compact rendering
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_object(map: &Map<String, Value>, out: &mut String) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

    out.push('{');
    for (index, (key, value)) in entries.into_iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        out.push_str(&Value::from(key.as_str()).to_string());
        out.push(':');
        write_value(value, out);
    }
    out.push('}');
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn body_from(pairs: &[(String, i64)]) -> Map<String, Value> {
        let mut body = Map::new();
        for (key, value) in pairs {
            body.insert(key.clone(), json!(value));
        }
        body
    }

    #[test]
    fn metadata_never_changes_the_fingerprint() {
        let plain = Action::new("X").with("a", json!(1));
        let decorated = plain
            .clone()
            .with_data(json!({ "ok": true }))
            .with_error(json!("E"))
            .with_request_id("r-9")
            .with_meta("analytics", json!("on"));

        assert_eq!(fingerprint(&plain), fingerprint(&decorated));
    }

    #[test]
    fn nested_keys_are_sorted() {
        let value = json!({ "b": [ { "z": 1, "y": 2 } ], "a": null });
        assert_eq!(canonical_json(&value), r#"{"a":null,"b":[{"y":2,"z":1}]}"#);
    }

    #[test]
    fn keys_are_escaped() {
        let action = Action::from_body(body_from(&[("a\"b".to_string(), 1)]));
        assert_eq!(fingerprint(&action).as_str(), r#"{"a\"b":1}"#);
    }

    #[test]
    fn value_types_are_distinguished() {
        let number = Action::new("X").with("id", json!(1));
        let string = Action::new("X").with("id", json!("1"));
        assert_ne!(fingerprint(&number), fingerprint(&string));
    }

    proptest! {
        #[test]
        fn insertion_order_is_irrelevant(
            pairs in proptest::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..12)
        ) {
            let forward: Vec<(String, i64)> = pairs.clone().into_iter().collect();
            let mut backward = forward.clone();
            backward.reverse();

            let a = Action::from_body(body_from(&forward));
            let b = Action::from_body(body_from(&backward));
            prop_assert_eq!(fingerprint(&a), fingerprint(&b));
        }

        #[test]
        fn different_bodies_have_different_fingerprints(
            left in proptest::collection::btree_map("[a-c]{1,2}", 0i64..4, 0..5),
            right in proptest::collection::btree_map("[a-c]{1,2}", 0i64..4, 0..5),
        ) {
            let a = Action::from_body(body_from(&left.clone().into_iter().collect::<Vec<_>>()));
            let b = Action::from_body(body_from(&right.clone().into_iter().collect::<Vec<_>>()));
            prop_assert_eq!(left == right, fingerprint(&a) == fingerprint(&b));
        }
    }
}
