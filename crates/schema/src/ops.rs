//! Field-level building blocks for migration steps.
//!
//! Each helper edits a record body owned by the step. Absent optional
//! source fields are skipped; an edit that would silently lose data (a
//! rename onto an existing field, nesting into a non-object) is reported as
//! a [`StepError`].
//!
//! ```
//! # use modgarden_schema::{ops, record::Fields, chain::StepError};
//! # use serde_json::json;
//! fn v2_to_v3(mut fields: Fields) -> Result<Fields, StepError> {
//!     ops::add_field(&mut fields, "category", json!("unknown"));
//!     ops::rename_field(&mut fields, "name", "title")?;
//!     Ok(fields)
//! }
//! ```

use serde_json::{Map, Value};

use crate::{chain::StepError, record::Fields};

/// Inserts `field` with `value` unless it is already present.
pub fn add_field(fields: &mut Fields, field: &str, value: Value) {
    fields.entry(field.to_string()).or_insert(value);
}

/// Removes `field`, returning its value.
pub fn drop_field(fields: &mut Fields, field: &str) -> Option<Value> {
    fields.remove(field)
}

/// Moves the value of `from` to `to`.
///
/// # Errors
///
/// Fails if both fields are present.
pub fn rename_field(fields: &mut Fields, from: &str, to: &str) -> Result<(), StepError> {
    let Some(value) = fields.remove(from) else { return Ok(()) };
    if fields.contains_key(to) {
        return Err(StepError::field(to, format!("already present, cannot rename {from} onto it")));
    }
    fields.insert(to.to_string(), value);
    Ok(())
}

/// Replaces the value of `field` with `f(value)` when the field is present.
///
/// # Errors
///
/// Propagates the error returned by `f`.
pub fn map_field<F>(fields: &mut Fields, field: &str, f: F) -> Result<(), StepError>
where
    F: FnOnce(Value) -> Result<Value, StepError>,
{
    if let Some(value) = fields.remove(field) {
        fields.insert(field.to_string(), f(value)?);
    }
    Ok(())
}

/// Moves top-level `field` to the nested location `path`, creating
/// intermediate objects as needed. A null source is dropped.
///
/// # Errors
///
/// Fails if an intermediate path segment exists but is not an object, or
/// the destination is already occupied.
pub fn nest_field(fields: &mut Fields, field: &str, path: &[&str]) -> Result<(), StepError> {
    let Some((leaf, parents)) = path.split_last() else {
        return Err(StepError::field(field, "empty destination path"));
    };
    let value = match fields.remove(field) {
        None | Some(Value::Null) => return Ok(()),
        Some(value) => value,
    };

    let mut target = fields;
    let mut walked = String::new();
    for segment in parents {
        if !walked.is_empty() {
            walked.push('.');
        }
        walked.push_str(segment);
        let slot =
            target.entry((*segment).to_string()).or_insert_with(|| Value::Object(Map::new()));
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
        target = match slot {
            Value::Object(map) => map,
            _ => return Err(StepError::field(walked, "expected object")),
        };
    }

    if target.contains_key(*leaf) {
        return Err(StepError::field(path.join("."), "already present"));
    }
    target.insert((*leaf).to_string(), value);
    Ok(())
}

/// Requires `field` to be an array and maps each element with `f`.
///
/// # Errors
///
/// Fails if the field is present but not an array, or if `f` fails for any
/// element.
pub fn map_elements<F>(fields: &mut Fields, field: &str, mut f: F) -> Result<(), StepError>
where
    F: FnMut(usize, Value) -> Result<Value, StepError>,
{
    map_field(fields, field, |value| match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| f(index, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        _ => Err(StepError::field(field, "expected array")),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_add_field_keeps_existing_value() {
        let mut f = fields(json!({"category": "tools"}));
        add_field(&mut f, "category", json!("unknown"));
        add_field(&mut f, "invites", json!([]));
        assert_eq!(Value::Object(f), json!({"category": "tools", "invites": []}));
    }

    #[test]
    fn test_drop_field() {
        let mut f = fields(json!({"description": "x", "name": "y"}));
        assert_eq!(drop_field(&mut f, "description"), Some(json!("x")));
        assert_eq!(drop_field(&mut f, "description"), None);
        assert_eq!(Value::Object(f), json!({"name": "y"}));
    }

    #[test]
    fn test_rename_field() {
        let mut f = fields(json!({"name": "Foo"}));
        rename_field(&mut f, "name", "title").unwrap();
        assert_eq!(Value::Object(f), json!({"title": "Foo"}));
    }

    #[test]
    fn test_rename_absent_field_is_noop() {
        let mut f = fields(json!({"title": "Foo"}));
        rename_field(&mut f, "name", "title").unwrap();
        assert_eq!(Value::Object(f), json!({"title": "Foo"}));
    }

    #[test]
    fn test_rename_onto_existing_field_fails() {
        let mut f = fields(json!({"name": "Foo", "title": "Bar"}));
        let err = rename_field(&mut f, "name", "title").unwrap_err();
        assert_eq!(err.violations[0].field, "title");
    }

    #[test]
    fn test_map_field() {
        let mut f = fields(json!({"downloads": 4}));
        map_field(&mut f, "downloads", |v| Ok(json!(v.as_i64().unwrap_or(0) * 2))).unwrap();
        map_field(&mut f, "absent", |_| Err(StepError::field("absent", "never called"))).unwrap();
        assert_eq!(Value::Object(f), json!({"downloads": 8}));
    }

    #[test]
    fn test_nest_field_creates_parents() {
        let mut f = fields(json!({"modrinth_id": "AANobbMI", "integrations": {"github": {}}}));
        nest_field(&mut f, "modrinth_id", &["integrations", "modrinth", "project_id"]).unwrap();
        assert_eq!(
            Value::Object(f),
            json!({"integrations": {"github": {}, "modrinth": {"project_id": "AANobbMI"}}})
        );
    }

    #[test]
    fn test_nest_null_field_is_dropped() {
        let mut f = fields(json!({"modrinth_id": null}));
        nest_field(&mut f, "modrinth_id", &["integrations", "modrinth", "project_id"]).unwrap();
        assert_eq!(Value::Object(f), json!({}));
    }

    #[test]
    fn test_nest_through_scalar_fails() {
        let mut f = fields(json!({"modrinth_id": "x", "integrations": 5}));
        let err = nest_field(&mut f, "modrinth_id", &["integrations", "modrinth"]).unwrap_err();
        assert_eq!(err.violations[0].field, "integrations");
    }

    #[test]
    fn test_nest_onto_occupied_leaf_fails() {
        let mut f = fields(json!({"a": 1, "b": {"c": 2}}));
        let err = nest_field(&mut f, "a", &["b", "c"]).unwrap_err();
        assert_eq!(err.violations[0].field, "b.c");
    }

    #[test]
    fn test_map_elements() {
        let mut f = fields(json!({"authors": ["abcde", "fghij"]}));
        map_elements(&mut f, "authors", |i, v| Ok(json!({"user_id": v, "position": i}))).unwrap();
        assert_eq!(
            Value::Object(f),
            json!({"authors": [
                {"user_id": "abcde", "position": 0},
                {"user_id": "fghij", "position": 1},
            ]})
        );
    }

    #[test]
    fn test_map_elements_rejects_non_array() {
        let mut f = fields(json!({"authors": "abcde"}));
        let err = map_elements(&mut f, "authors", |_, v| Ok(v)).unwrap_err();
        assert_eq!(err.to_string(), "authors: expected array");
    }
}
