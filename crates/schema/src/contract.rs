//! Structural contracts a record must satisfy at a given schema version.
//!
//! A [`ShapeContract`] lists the fields valid at one version: their kinds,
//! whether they are required, and the default filled in when an optional
//! field is absent on ingestion. Validation collects every violation rather
//! than stopping at the first one.

use std::collections::BTreeMap;

use modgarden_types::{FieldViolation, SchemaError, validation};
use serde_json::Value;

use crate::record::{Fields, ID_FIELD, VERSION_FIELD, kind_of};

/// Expected JSON kind of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// JSON string.
    String,
    /// JSON integer (signed or unsigned, no fraction).
    Integer,
    /// JSON boolean.
    Boolean,
    /// JSON array whose elements all have the given kind.
    Array(Box<FieldKind>),
    /// Any JSON object.
    Object,
    /// JSON object that must itself satisfy a contract.
    Record(Box<ShapeContract>),
    /// Anything, including null.
    Any,
}

impl FieldKind {
    /// Array of `element`.
    pub fn array_of(element: FieldKind) -> Self {
        Self::Array(Box::new(element))
    }

    /// Nested object satisfying `contract`.
    pub fn record(contract: ShapeContract) -> Self {
        Self::Record(Box::new(contract))
    }

    fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array(_) => "array",
            Self::Object | Self::Record(_) => "object",
            Self::Any => "any",
        }
    }

    fn check(&self, path: &str, value: &Value, out: &mut Vec<FieldViolation>) {
        match (self, value) {
            (Self::Any, _)
            | (Self::String, Value::String(_))
            | (Self::Boolean, Value::Bool(_))
            | (Self::Object, Value::Object(_)) => {},
            (Self::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => {},
            (Self::Array(element), Value::Array(items)) => {
                for (index, item) in items.iter().enumerate() {
                    element.check(&format!("{path}[{index}]"), item, out);
                }
            },
            (Self::Record(contract), Value::Object(fields)) => {
                contract.check_fields(Some(path), fields, out);
            },
            _ => out.push(FieldViolation::new(
                path,
                format!("expected {}, found {}", self.name(), kind_of(value)),
            )),
        }
    }
}

/// Textual format a string field must follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    /// Five lowercase letters, or a legacy all-digit id.
    NaturalId,
    /// URL-safe slug.
    Slug,
}

impl StringFormat {
    fn check(self, path: &str, value: &Value, out: &mut Vec<FieldViolation>) {
        let Value::String(s) = value else { return };
        let result = match self {
            Self::NaturalId => validation::validate_account_id(s),
            Self::Slug => validation::validate_slug(s),
        };
        if let Err(e) = result {
            out.push(FieldViolation::new(path, e.constraint));
        }
    }
}

/// Declaration of a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Expected kind.
    pub kind: FieldKind,
    /// Whether the field must be present and non-null.
    pub required: bool,
    /// Value inserted on ingestion when the field is absent.
    pub default: Option<Value>,
    /// Format constraint for string fields.
    pub format: Option<StringFormat>,
}

/// Set of fields valid at one schema version.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShapeContract {
    fields: BTreeMap<String, FieldSpec>,
    allow_unknown_fields: bool,
}

impl ShapeContract {
    /// Starts declaring a contract.
    pub fn builder() -> ShapeContractBuilder {
        ShapeContractBuilder::default()
    }

    /// Returns the declaration of `field`.
    pub fn field(&self, field: &str) -> Option<&FieldSpec> {
        self.fields.get(field)
    }

    /// Iterates field declarations in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    /// Whether fields not declared here are tolerated.
    pub fn allows_unknown_fields(&self) -> bool {
        self.allow_unknown_fields
    }

    /// Checks `fields` against the contract.
    ///
    /// # Errors
    ///
    /// Returns every violation found, in field-name order.
    pub fn validate(&self, fields: &Fields) -> Result<(), Vec<FieldViolation>> {
        let mut violations = Vec::new();
        self.check_fields(None, fields, &mut violations);
        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Returns `fields` with declared defaults filled in for absent fields.
    ///
    /// Present fields, including explicit nulls, are left alone.
    pub fn with_defaults(&self, mut fields: Fields) -> Fields {
        for (name, spec) in &self.fields {
            if let Some(default) = &spec.default
                && !fields.contains_key(name)
            {
                fields.insert(name.clone(), default.clone());
            }
        }
        fields
    }

    fn check_fields(&self, prefix: Option<&str>, fields: &Fields, out: &mut Vec<FieldViolation>) {
        let path = |name: &str| match prefix {
            Some(prefix) => format!("{prefix}.{name}"),
            None => name.to_string(),
        };

        for (name, spec) in &self.fields {
            match fields.get(name) {
                None | Some(Value::Null) if spec.required => {
                    out.push(FieldViolation::new(path(name), "missing required field"));
                },
                None | Some(Value::Null) => {},
                Some(value) => {
                    let field_path = path(name);
                    spec.kind.check(&field_path, value, out);
                    if let Some(format) = spec.format {
                        format.check(&field_path, value, out);
                    }
                },
            }
        }

        if !self.allow_unknown_fields {
            for name in fields.keys().filter(|name| !self.fields.contains_key(*name)) {
                out.push(FieldViolation::new(path(name), "unknown field"));
            }
        }
    }
}

/// Builder for [`ShapeContract`].
///
/// Declaration errors are reported from [`build`](Self::build) so a chain of
/// calls stays readable.
#[derive(Debug, Default)]
pub struct ShapeContractBuilder {
    fields: Vec<(String, FieldSpec)>,
    allow_unknown_fields: bool,
}

impl ShapeContractBuilder {
    /// Declares a field that must be present and non-null.
    #[must_use]
    pub fn required(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.push(name, FieldSpec { kind, required: true, default: None, format: None })
    }

    /// Declares a field that may be absent or null.
    #[must_use]
    pub fn optional(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.push(name, FieldSpec { kind, required: false, default: None, format: None })
    }

    /// Declares an optional field filled with `default` on ingestion.
    #[must_use]
    pub fn defaulted(self, name: impl Into<String>, kind: FieldKind, default: Value) -> Self {
        self.push(name, FieldSpec { kind, required: false, default: Some(default), format: None })
    }

    /// Declares a required string field with a format constraint.
    #[must_use]
    pub fn formatted(self, name: impl Into<String>, format: StringFormat) -> Self {
        self.push(
            name,
            FieldSpec {
                kind: FieldKind::String,
                required: true,
                default: None,
                format: Some(format),
            },
        )
    }

    /// Tolerates fields the contract does not declare.
    #[must_use]
    pub fn allow_unknown_fields(mut self, allow: bool) -> Self {
        self.allow_unknown_fields = allow;
        self
    }

    fn push(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.push((name.into(), spec));
        self
    }

    /// Finishes the contract.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidContract`] if a field name is invalid,
    /// reserved, or declared twice, or if a default does not satisfy its
    /// field's own declaration.
    pub fn build(self) -> Result<ShapeContract, SchemaError> {
        let mut fields = BTreeMap::new();
        for (name, spec) in self.fields {
            if let Err(e) = validation::validate_field_name(&name) {
                return Err(invalid(&name, e.constraint));
            }
            if name == VERSION_FIELD || name == ID_FIELD {
                return Err(invalid(&name, "reserved for the record envelope"));
            }
            if let Some(default) = &spec.default {
                let mut violations = Vec::new();
                spec.kind.check(&name, default, &mut violations);
                if let Some(format) = spec.format {
                    format.check(&name, default, &mut violations);
                }
                if let Some(first) = violations.first() {
                    return Err(invalid(&name, format!("default {}", first.reason)));
                }
            }
            if fields.insert(name.clone(), spec).is_some() {
                return Err(invalid(&name, "declared twice"));
            }
        }
        Ok(ShapeContract { fields, allow_unknown_fields: self.allow_unknown_fields })
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> SchemaError {
    SchemaError::InvalidContract { field: field.to_string(), reason: reason.into() }
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

    fn project() -> ShapeContract {
        ShapeContract::builder()
            .formatted("slug", StringFormat::Slug)
            .required("name", FieldKind::String)
            .required("authors", FieldKind::array_of(FieldKind::String))
            .defaulted("freeze_time", FieldKind::Integer, json!(0))
            .optional("integrations", FieldKind::Object)
            .build()
            .unwrap()
    }

    #[test]
    fn test_valid_record_passes() {
        let record = fields(json!({"slug": "mod-garden", "name": "Garden", "authors": ["abcde"]}));
        assert!(project().validate(&record).is_ok());
    }

    #[test]
    fn test_reports_every_violation() {
        let record = fields(json!({"slug": "bad slug", "authors": [1], "extra": true}));
        let violations = project().validate(&record).unwrap_err();
        let summary: Vec<_> = violations.iter().map(ToString::to_string).collect();
        assert_eq!(violations.len(), 4, "{summary:?}");
        assert!(summary.iter().any(|v| v.starts_with("authors[0]: expected string")));
        assert!(summary.iter().any(|v| v == "name: missing required field"));
        assert!(summary.iter().any(|v| v.starts_with("slug:")));
        assert!(summary.iter().any(|v| v == "extra: unknown field"));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let record = fields(json!({"slug": "a", "name": null, "authors": [], "freeze_time": null}));
        let violations = project().validate(&record).unwrap_err();
        assert_eq!(violations, vec![FieldViolation::new("name", "missing required field")]);
    }

    #[test]
    fn test_integer_rejects_fraction() {
        let record = fields(json!({"slug": "a", "name": "b", "authors": [], "freeze_time": 1.5}));
        let violations = project().validate(&record).unwrap_err();
        assert_eq!(violations[0].field, "freeze_time");
        assert!(violations[0].reason.contains("found number"));
    }

    #[test]
    fn test_nested_record_paths() {
        let role = ShapeContract::builder()
            .formatted("user_id", StringFormat::NaturalId)
            .required("permissions", FieldKind::Integer)
            .build()
            .unwrap();
        let contract = ShapeContract::builder()
            .required("roles", FieldKind::array_of(FieldKind::record(role)))
            .build()
            .unwrap();
        let record = fields(json!({
            "roles": [{"user_id": "abcde", "permissions": 1}, {"user_id": "X"}],
        }));
        let violations = contract.validate(&record).unwrap_err();
        let fields: Vec<_> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["roles[1].permissions", "roles[1].user_id"]);
    }

    #[test]
    fn test_allow_unknown_fields() {
        let contract = ShapeContract::builder().allow_unknown_fields(true).build().unwrap();
        assert!(contract.validate(&fields(json!({"anything": 1}))).is_ok());
        assert!(contract.allows_unknown_fields());
    }

    #[test]
    fn test_with_defaults_fills_only_absent_fields() {
        let contract = project();
        let filled = contract.with_defaults(fields(json!({"name": "x"})));
        assert_eq!(filled.get("freeze_time"), Some(&json!(0)));

        let kept = contract.with_defaults(fields(json!({"freeze_time": 17})));
        assert_eq!(kept.get("freeze_time"), Some(&json!(17)));

        let explicit_null = contract.with_defaults(fields(json!({"freeze_time": null})));
        assert_eq!(explicit_null.get("freeze_time"), Some(&Value::Null));
    }

    #[test]
    fn test_builder_rejects_bad_declarations() {
        let cases = [
            ShapeContract::builder().required("Name", FieldKind::String),
            ShapeContract::builder().required("schema_version", FieldKind::Integer),
            ShapeContract::builder().required("id", FieldKind::String),
            ShapeContract::builder()
                .required("name", FieldKind::String)
                .optional("name", FieldKind::Any),
            ShapeContract::builder().defaulted("count", FieldKind::Integer, json!("zero")),
        ];
        for builder in cases {
            let err = builder.build().unwrap_err();
            assert!(matches!(err, SchemaError::InvalidContract { .. }), "{err}");
        }
    }

    #[test]
    fn test_fields_iterates_in_name_order() {
        let contract = project();
        let names: Vec<_> = contract.fields().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["authors", "freeze_time", "integrations", "name", "slug"]);
    }
}
