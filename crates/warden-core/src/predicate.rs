//! Where-clause values shared by the query builders and the runtime.

use crate::error::ValidationError;
use crate::schema::{ModelDescriptor, PrimaryKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A boolean expression in the store's where shape:
/// `{field: {operator: value}}` plus `{AND: [...]}` / `{OR: [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Predicate(Map<String, Value>);

impl Predicate {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Wrap a JSON value. Anything but an object becomes the empty predicate.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Insert a condition, replacing any existing condition on `key`.
    pub fn insert(&mut self, key: impl Into<String>, condition: Value) {
        self.0.insert(key.into(), condition);
    }

    /// Add a condition on `field`. A second condition on the same field is
    /// AND-ed with the first instead of overwriting it.
    pub fn constrain(&mut self, field: &str, condition: Value) {
        let Some(existing) = self.0.remove(field) else {
            self.0.insert(field.to_string(), condition);
            return;
        };

        let mut first = Map::new();
        first.insert(field.to_string(), existing);
        let mut second = Map::new();
        second.insert(field.to_string(), condition);

        match self.0.get_mut("AND") {
            Some(Value::Array(items)) => {
                items.push(Value::Object(first));
                items.push(Value::Object(second));
            }
            _ => {
                self.0.insert(
                    "AND".to_string(),
                    Value::Array(vec![Value::Object(first), Value::Object(second)]),
                );
            }
        }
    }

    /// Conjunction of predicates. Empty parts are dropped; a single part is
    /// returned as is.
    pub fn and(parts: impl IntoIterator<Item = Predicate>) -> Predicate {
        let mut parts: Vec<Predicate> = parts.into_iter().filter(|p| !p.is_empty()).collect();
        match parts.len() {
            0 => Predicate::new(),
            1 => parts.remove(0),
            _ => {
                let mut map = Map::new();
                map.insert(
                    "AND".to_string(),
                    Value::Array(parts.into_iter().map(Value::from).collect()),
                );
                Predicate(map)
            }
        }
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Predicate> for Value {
    fn from(p: Predicate) -> Self {
        p.into_value()
    }
}

/// Identifies one record by primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordKey {
    /// Column values of a composite primary key.
    Composite(Map<String, Value>),
    /// Value of a single-column primary key.
    Single(Value),
}

impl RecordKey {
    /// Flat `{column: value}` map for this key.
    pub fn columns(&self, pk: &PrimaryKey, model: &str) -> Result<Map<String, Value>, ValidationError> {
        match (self, pk) {
            (RecordKey::Single(v), PrimaryKey::Single(field)) => {
                if v.is_null() || v.is_object() || v.is_array() {
                    return Err(ValidationError::invalid_key(model, "key must be a scalar value"));
                }
                let mut map = Map::new();
                map.insert(field.clone(), v.clone());
                Ok(map)
            }
            (RecordKey::Single(_), PrimaryKey::Composite(fields)) => Err(ValidationError::invalid_key(
                model,
                format!("composite key requires values for {}", fields.join(", ")),
            )),
            (RecordKey::Composite(values), pk) => {
                let fields = pk.fields();
                if let Some(extra) = values.keys().find(|k| !fields.contains(&k.as_str())) {
                    return Err(ValidationError::invalid_key(
                        model,
                        format!("'{}' is not part of the primary key", extra),
                    ));
                }
                let mut map = Map::new();
                for field in fields {
                    match values.get(field) {
                        Some(v) if !v.is_null() => {
                            map.insert(field.to_string(), v.clone());
                        }
                        _ => {
                            return Err(ValidationError::invalid_key(
                                model,
                                format!("missing value for key column '{}'", field),
                            ));
                        }
                    }
                }
                Ok(map)
            }
        }
    }

    /// Unique selector: `{id: v}` or the compound form `{a_b: {a: .., b: ..}}`.
    pub fn unique_where(&self, pk: &PrimaryKey, model: &str) -> Result<Map<String, Value>, ValidationError> {
        let columns = self.columns(pk, model)?;
        match pk {
            PrimaryKey::Single(_) => Ok(columns),
            PrimaryKey::Composite(_) => {
                let mut map = Map::new();
                map.insert(pk.compound_name(), Value::Object(columns));
                Ok(map)
            }
        }
    }

    /// Extract the key of `record`, if every key column is present.
    pub fn from_record(record: &Value, pk: &PrimaryKey) -> Option<RecordKey> {
        match pk {
            PrimaryKey::Single(field) => match record.get(field) {
                Some(v) if !v.is_null() => Some(RecordKey::Single(v.clone())),
                _ => None,
            },
            PrimaryKey::Composite(fields) => {
                let mut map = Map::new();
                for field in fields {
                    match record.get(field) {
                        Some(v) if !v.is_null() => {
                            map.insert(field.clone(), v.clone());
                        }
                        _ => return None,
                    }
                }
                Some(RecordKey::Composite(map))
            }
        }
    }

    /// Convert string key values to the scalar type of their primary key
    /// column, so a path id `"5"` addresses an `Int` key as `5`.
    pub fn coerce(&self, model: &ModelDescriptor) -> Result<RecordKey, ValidationError> {
        let convert = |column: &str, value: &Value| -> Result<Value, ValidationError> {
            let Value::String(raw) = value else {
                return Ok(value.clone());
            };
            let Some(scalar) = model.field(column).and_then(|f| f.scalar_type()) else {
                return Ok(value.clone());
            };
            scalar.parse_text(raw).ok_or_else(|| {
                ValidationError::invalid_key(
                    &model.name,
                    format!("'{}' is not a valid {:?} value for '{}'", raw, scalar, column),
                )
            })
        };

        match (self, &model.primary_key) {
            (RecordKey::Single(value), PrimaryKey::Single(column)) => {
                Ok(RecordKey::Single(convert(column.as_str(), value)?))
            }
            (RecordKey::Composite(values), _) => {
                let mut map = Map::new();
                for (column, value) in values {
                    map.insert(column.clone(), convert(column.as_str(), value)?);
                }
                Ok(RecordKey::Composite(map))
            }
            // Shape mismatches are reported by `columns`.
            (RecordKey::Single(_), PrimaryKey::Composite(_)) => Ok(self.clone()),
        }
    }

    /// Whether `record` carries exactly this key.
    pub fn matches(&self, record: &Value, pk: &PrimaryKey) -> bool {
        RecordKey::from_record(record, pk).is_some_and(|other| other.normalized() == self.normalized())
    }

    fn normalized(&self) -> Value {
        match self {
            RecordKey::Single(v) => v.clone(),
            RecordKey::Composite(map) => Value::Object(map.clone()),
        }
    }
}

impl From<&str> for RecordKey {
    fn from(s: &str) -> Self {
        RecordKey::Single(Value::String(s.to_string()))
    }
}

impl From<i64> for RecordKey {
    fn from(n: i64) -> Self {
        RecordKey::Single(Value::from(n))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Single(Value::String(s)) => write!(f, "{}", s),
            RecordKey::Single(v) => write!(f, "{}", v),
            RecordKey::Composite(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(f, "{}", parts.join(";"))
            }
        }
    }
}
