//! Diff computation between actual and desired task state
//!
//! Only fields the desired state sets take part in the comparison: an unset
//! desired field means "don't manage", never "must be empty".

use crate::value::{Fields, Value};
use serde::Serialize;
use std::collections::BTreeMap;

/// Field comparator: `(actual, desired) -> equal`
///
/// Registered per field where literal equality is wrong, e.g. a policy
/// document the provider re-serializes.
pub type Comparator = fn(&serde_json::Value, &serde_json::Value) -> bool;

/// One differing field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    /// Live value, `None` if the resource or the field is missing
    pub actual: Option<serde_json::Value>,
    /// Wanted value
    pub desired: Value,
}

/// Sparse set of differing fields for one task
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet(BTreeMap<String, FieldChange>);

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.0.get(field)
    }

    /// Whether `field` differs
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldChange)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Names of the differing fields, in order
    pub fn fields(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    fn insert(&mut self, field: &str, change: FieldChange) {
        self.0.insert(field.to_string(), change);
    }
}

/// Compute the change set of `desired` against `actual`
///
/// `comparator` looks up a custom comparator by field name. Unresolved
/// references and unknown values always count as changed.
pub fn diff<F>(actual: Option<&Fields>, desired: &Fields, comparator: F) -> ChangeSet
where
    F: Fn(&str) -> Option<Comparator>,
{
    let mut changes = ChangeSet::default();

    for (name, want) in desired.iter() {
        let have = actual.and_then(|a| a.literal(name));
        let equal = match (want, have) {
            (Value::Literal(want), Some(have)) => match comparator(name) {
                Some(cmp) => cmp(have, want),
                None => have == want,
            },
            _ => false,
        };

        if !equal {
            changes.insert(
                name,
                FieldChange {
                    actual: have.cloned(),
                    desired: want.clone(),
                },
            );
        }
    }

    changes
}

/// Built-in comparators
pub mod compare {
    use serde_json::Value;

    /// Compare two JSON documents held as text by their parsed structure
    ///
    /// Falls back to literal equality when either side is not valid JSON text.
    pub fn json_document(actual: &Value, desired: &Value) -> bool {
        match (actual.as_str(), desired.as_str()) {
            (Some(a), Some(d)) => {
                match (
                    serde_json::from_str::<Value>(a),
                    serde_json::from_str::<Value>(d),
                ) {
                    (Ok(a), Ok(d)) => a == d,
                    _ => a == d,
                }
            }
            _ => actual == desired,
        }
    }

    /// Compare two arrays ignoring element order (duplicates still count)
    pub fn unordered_list(actual: &Value, desired: &Value) -> bool {
        match (actual.as_array(), desired.as_array()) {
            (Some(a), Some(d)) => {
                let mut a: Vec<String> = a.iter().map(ToString::to_string).collect();
                let mut d: Vec<String> = d.iter().map(ToString::to_string).collect();
                a.sort();
                d.sort();
                a == d
            }
            _ => actual == desired,
        }
    }
}

/// Count of planned changes by kind of action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub additions: usize,
    pub removals: usize,
    pub modifications: usize,
}

impl DiffSummary {
    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TaskKey;
    use serde_json::json;

    fn no_comparators(_: &str) -> Option<Comparator> {
        None
    }

    #[test]
    fn test_diff_empty_when_desired_fields_match() {
        let actual = Fields::new()
            .with("name", "masters")
            .with("id", "AROA123")
            .with("tags", json!({"k": "v"}));
        let desired = Fields::new()
            .with("name", "masters")
            .with("tags", json!({"k": "v"}));

        assert!(diff(Some(&actual), &desired, no_comparators).is_empty());
    }

    #[test]
    fn test_unset_desired_field_is_not_managed() {
        let actual = Fields::new()
            .with("name", "masters")
            .with("permissions_boundary", "arn:aws:iam::1:policy/b");
        let desired = Fields::new().with("name", "masters");

        assert!(diff(Some(&actual), &desired, no_comparators).is_empty());
    }

    #[test]
    fn test_diff_reports_changed_and_missing_fields() {
        let actual = Fields::new().with("name", "masters").with("ttl", 60u32);
        let desired = Fields::new()
            .with("name", "masters")
            .with("ttl", 300u32)
            .with("zone", "example.com");

        let changes = diff(Some(&actual), &desired, no_comparators);
        assert_eq!(changes.fields(), ["ttl", "zone"]);
        assert_eq!(changes.get("ttl").unwrap().actual, Some(json!(60)));
        assert_eq!(changes.get("zone").unwrap().actual, None);
    }

    #[test]
    fn test_diff_against_absent_actual_lists_every_field() {
        let desired = Fields::new().with("name", "masters").with("ttl", 60u32);
        let changes = diff(None, &desired, no_comparators);
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn test_unresolved_values_always_differ() {
        let actual = Fields::new().with("service_account", "arn:1");
        let desired = Fields::new().with(
            "service_account",
            TaskKey::new("iam_role", "nodes").attr("arn"),
        );
        assert!(diff(Some(&actual), &desired, no_comparators).contains("service_account"));

        let mut unknown = Fields::new();
        unknown.insert("service_account", Value::Unknown);
        assert!(diff(Some(&actual), &unknown, no_comparators).contains("service_account"));
    }

    #[test]
    fn test_custom_comparator_overrides_equality() {
        let actual = Fields::new().with("policy", r#"{"b":1,"a":[1,2]}"#);
        let desired = Fields::new().with("policy", "{\n  \"a\": [1, 2],\n  \"b\": 1\n}");

        assert!(diff(Some(&actual), &desired, no_comparators).contains("policy"));
        let changes = diff(Some(&actual), &desired, |field| {
            (field == "policy").then_some(compare::json_document as Comparator)
        });
        assert!(changes.is_empty());
    }

    #[test]
    fn test_json_document_falls_back_to_text() {
        assert!(compare::json_document(&json!("not json"), &json!("not json")));
        assert!(!compare::json_document(&json!("not json"), &json!("{}")));
    }

    #[test]
    fn test_unordered_list() {
        assert!(compare::unordered_list(
            &json!(["10.0.0.2", "10.0.0.1"]),
            &json!(["10.0.0.1", "10.0.0.2"])
        ));
        assert!(!compare::unordered_list(
            &json!(["10.0.0.1", "10.0.0.1"]),
            &json!(["10.0.0.1"])
        ));
    }
}
