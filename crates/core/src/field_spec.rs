use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Labels a view uses in place of `true`/`false`, e.g. `"Admin"` / `"User"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BooleanLabels {
    pub truthy: String,
    pub falsy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Boolean { labels: Option<BooleanLabels> },
    Integer,
    Decimal,
    Date,
    Text,
    Enum(Vec<String>),
}

impl FieldKind {
    pub fn boolean() -> Self {
        Self::Boolean { labels: None }
    }

    pub fn role_labels(truthy: &str, falsy: &str) -> Self {
        Self::Boolean {
            labels: Some(BooleanLabels {
                truthy: truthy.to_string(),
                falsy: falsy.to_string(),
            }),
        }
    }

    pub fn options<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(options.into_iter().map(Into::into).collect())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean { .. } => "boolean",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Date => "date",
            Self::Text => "text",
            Self::Enum(_) => "enum",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub editable: bool,
}

impl FieldSpec {
    pub fn editable(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            editable: true,
        }
    }

    pub fn read_only(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            editable: false,
        }
    }
}

/// Static, per-view field declarations. Order is the view's default column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRegistry {
    fields: Vec<FieldSpec>,
    index: BTreeMap<String, usize>,
}

impl FieldRegistry {
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, CoreError> {
        let mut index = BTreeMap::new();
        for (pos, spec) in fields.iter().enumerate() {
            if spec.name.trim().is_empty() {
                return Err(CoreError::InvalidFieldSpec(format!(
                    "field at position {pos} has an empty name"
                )));
            }
            if index.insert(spec.name.clone(), pos).is_some() {
                return Err(CoreError::InvalidFieldSpec(format!(
                    "duplicate field name: {}",
                    spec.name
                )));
            }
        }
        Ok(Self { fields, index })
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.index.get(name).map(|&pos| &self.fields[pos])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn is_editable(&self, name: &str) -> bool {
        self.get(name).is_some_and(|spec| spec.editable)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|spec| spec.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Registry order with every field visible.
    pub fn default_layout(&self) -> (Vec<String>, BTreeMap<String, bool>) {
        let order: Vec<String> = self.names().map(str::to_string).collect();
        let visibility = order.iter().map(|name| (name.clone(), true)).collect();
        (order, visibility)
    }
}
