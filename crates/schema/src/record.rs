//! Schema-tagged records.

use modgarden_types::{RecordId, SchemaError, SchemaVersion};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field map of a record body.
pub type Fields = Map<String, Value>;

/// JSON key carrying the schema version tag.
pub const VERSION_FIELD: &str = "schema_version";

/// JSON key carrying the permanent record identifier, once assigned.
pub const ID_FIELD: &str = "id";

/// A structured value tagged with the schema version it was authored under.
///
/// Records are immutable: migration and id assignment consume a record and
/// return a new one.
///
/// # Wire form
///
/// ```json
/// { "schema_version": 3, "id": "8712391230", "name": "Foo" }
/// ```
///
/// `id` is written as a decimal string so 64-bit values survive JSON
/// consumers that parse numbers as doubles; a bare integer is accepted on
/// input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct VersionedRecord {
    version: SchemaVersion,
    id: Option<RecordId>,
    fields: Fields,
}

impl VersionedRecord {
    /// Creates an unidentified record.
    pub fn new(version: SchemaVersion, fields: Fields) -> Self {
        Self { version, id: None, fields }
    }

    /// Returns this record carrying `id`.
    #[must_use]
    pub fn with_id(self, id: RecordId) -> Self {
        Self { id: Some(id), ..self }
    }

    /// Schema version the record conforms to.
    #[inline]
    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    /// Permanent identifier, if one has been assigned.
    #[inline]
    pub fn id(&self) -> Option<RecordId> {
        self.id
    }

    /// Record body, without the version tag or id.
    #[inline]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Looks up a top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Splits the record into its parts.
    pub fn into_parts(self) -> (SchemaVersion, Option<RecordId>, Fields) {
        (self.version, self.id, self.fields)
    }

    /// Parses a tagged JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MalformedRecord`] if `value` is not an object,
    /// lacks a `schema_version` that fits in a `u32`, or carries an `id` that
    /// is neither an unsigned integer nor a decimal string.
    pub fn from_json(value: Value) -> Result<Self, SchemaError> {
        let Value::Object(mut fields) = value else {
            return Err(malformed(format!("expected a JSON object, found {}", kind_of(&value))));
        };

        let version = match fields.remove(VERSION_FIELD) {
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(SchemaVersion::new)
                .ok_or_else(|| malformed(format!("{VERSION_FIELD} {n} is not a valid version")))?,
            Some(other) => {
                return Err(malformed(format!(
                    "{VERSION_FIELD} must be an integer, found {}",
                    kind_of(&other)
                )));
            },
            None => return Err(malformed(format!("missing {VERSION_FIELD}"))),
        };

        let id = match fields.remove(ID_FIELD) {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(
                n.as_u64()
                    .map(RecordId::new)
                    .ok_or_else(|| malformed(format!("{ID_FIELD} {n} is not a valid id")))?,
            ),
            Some(Value::String(s)) => Some(
                s.parse::<RecordId>()
                    .map_err(|_| malformed(format!("{ID_FIELD} {s:?} is not a valid id")))?,
            ),
            Some(other) => {
                return Err(malformed(format!(
                    "{ID_FIELD} must be an integer or string, found {}",
                    kind_of(&other)
                )));
            },
        };

        Ok(Self { version, id, fields })
    }

    /// Parses a tagged record from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MalformedRecord`] for invalid JSON or any
    /// condition listed on [`from_json`](Self::from_json).
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SchemaError> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| malformed(e.to_string()))?;
        Self::from_json(value)
    }

    /// Renders the record as a tagged JSON object.
    pub fn to_json(&self) -> Value {
        Value::from(self.clone())
    }
}

impl TryFrom<Value> for VersionedRecord {
    type Error = SchemaError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(value)
    }
}

impl From<VersionedRecord> for Value {
    fn from(record: VersionedRecord) -> Self {
        let mut out = Map::with_capacity(record.fields.len() + 2);
        out.insert(VERSION_FIELD.to_string(), Value::from(record.version.value()));
        if let Some(id) = record.id {
            out.insert(ID_FIELD.to_string(), Value::String(id.value().to_string()));
        }
        out.extend(record.fields);
        Value::Object(out)
    }
}

fn malformed(reason: impl Into<String>) -> SchemaError {
    SchemaError::MalformedRecord { reason: reason.into() }
}

/// Human-readable JSON type name, used in diagnostics.
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
