//! Model and field descriptors.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Scalar column types understood by the filter parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScalarType {
    #[default]
    String,
    Int,
    BigInt,
    Float,
    Decimal,
    Boolean,
    DateTime,
    Json,
    Bytes,
    Enum,
}

impl ScalarType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::BigInt | Self::Float | Self::Decimal)
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, Self::String | Self::Enum)
    }

    /// Convert a textual value to this type's JSON representation. Types
    /// carried as strings come back unchanged; `None` when `raw` does not
    /// parse.
    pub fn parse_text(&self, raw: &str) -> Option<Value> {
        match self {
            Self::Int | Self::BigInt => raw.trim().parse::<i64>().ok().map(Value::from),
            Self::Float | Self::Decimal => {
                let raw = raw.trim();
                if let Ok(n) = raw.parse::<i64>() {
                    return Some(Value::from(n));
                }
                raw.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
            }
            Self::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => Some(Value::String(raw.to_string())),
        }
    }
}

/// Relation side of a field: target model and foreign-key mapping.
///
/// `fields` lists the local foreign-key columns and `references` the target
/// columns they point at. Both are empty on the side that does not own the
/// foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationTarget {
    pub model: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

impl RelationTarget {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            fields: Vec::new(),
            references: Vec::new(),
        }
    }

    pub fn with_foreign_key(mut self, fields: &[&str], references: &[&str]) -> Self {
        self.fields = fields.iter().map(|s| s.to_string()).collect();
        self.references = references.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Whether this side holds the foreign key columns.
    pub fn owns_foreign_key(&self) -> bool {
        !self.fields.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(ScalarType),
    Relation(RelationTarget),
}

/// One field of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub is_id: bool,
    pub is_list: bool,
    pub is_required: bool,
    pub is_unique: bool,
    pub has_default: bool,
}

impl FieldDescriptor {
    pub fn scalar(name: impl Into<String>, scalar_type: ScalarType) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Scalar(scalar_type),
            is_id: false,
            is_list: false,
            is_required: false,
            is_unique: false,
            has_default: false,
        }
    }

    pub fn relation(name: impl Into<String>, target: RelationTarget) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Relation(target),
            is_id: false,
            is_list: false,
            is_required: false,
            is_unique: false,
            has_default: false,
        }
    }

    /// Mark as the (single) primary key column. Implies required and unique.
    pub fn id(mut self) -> Self {
        self.is_id = true;
        self.is_required = true;
        self.is_unique = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn list(mut self) -> Self {
        self.is_list = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, FieldKind::Scalar(_))
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.kind, FieldKind::Relation(_))
    }

    pub fn scalar_type(&self) -> Option<ScalarType> {
        match &self.kind {
            FieldKind::Scalar(t) => Some(*t),
            FieldKind::Relation(_) => None,
        }
    }

    pub fn relation_target(&self) -> Option<&RelationTarget> {
        match &self.kind {
            FieldKind::Relation(target) => Some(target),
            FieldKind::Scalar(_) => None,
        }
    }

    /// Whether a `null` value is acceptable for this field.
    pub fn is_nullable(&self) -> bool {
        !self.is_required && !self.is_list
    }
}

/// Primary key: a single column or an ordered list of columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Single(String),
    Composite(Vec<String>),
}

impl PrimaryKey {
    pub fn fields(&self) -> Vec<&str> {
        match self {
            PrimaryKey::Single(f) => vec![f.as_str()],
            PrimaryKey::Composite(fields) => fields.iter().map(|s| s.as_str()).collect(),
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields().contains(&field)
    }

    /// Name of the compound unique selector (`orgId_slug`).
    pub fn compound_name(&self) -> String {
        self.fields().join("_")
    }
}

/// One model of the schema. Immutable once the catalog is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub primary_key: PrimaryKey,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>, primary_key: PrimaryKey, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
            primary_key,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn scalar_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_scalar())
    }

    pub fn relations(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_relation())
    }

    pub fn relation(&self, name: &str) -> Option<&FieldDescriptor> {
        self.field(name).filter(|f| f.is_relation())
    }

    /// The singular relation whose foreign key includes `column`, if any.
    pub fn foreign_key_owner(&self, column: &str) -> Option<&FieldDescriptor> {
        self.relations().find(|f| {
            !f.is_list
                && f.relation_target()
                    .is_some_and(|t| t.fields.iter().any(|c| c == column))
        })
    }
}

/// Derived view over a relation field, with the target's own relations
/// down to a bounded depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipConfig {
    pub name: String,
    pub target: String,
    pub is_list: bool,
    pub foreign_key: Vec<String>,
    pub references: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RelationshipConfig>,
}

impl RelationshipConfig {
    /// Build the config for a relation field, without children.
    pub fn from_field(field: &FieldDescriptor) -> Option<Self> {
        let target = field.relation_target()?;
        Some(Self {
            name: field.name.clone(),
            target: target.model.clone(),
            is_list: field.is_list,
            foreign_key: target.fields.clone(),
            references: target.references.clone(),
            children: Vec::new(),
        })
    }
}
