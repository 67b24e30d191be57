//! Extraction schemas and the field mappings they produce.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors from schema validation and lookup.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Schema '{0}' has no fields")]
    Empty(String),

    #[error("Schema '{schema}' declares field '{field}' more than once")]
    DuplicateField { schema: String, field: String },

    #[error("Schema '{schema}' has an invalid field name '{field}' (must be non-empty with no whitespace)")]
    InvalidFieldName { schema: String, field: String },

    #[error("Unknown schema '{0}'")]
    Unknown(String),
}

/// One field the model is asked to extract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Key the model must use in its answer.
    pub name: String,
    /// Natural-language description used in the instruction.
    #[serde(default)]
    pub description: String,
    /// Example value shown in the response pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

impl FieldSpec {
    pub fn new(name: &str, description: &str, example: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            example: Some(example.to_string()),
        }
    }
}

/// An ordered list of fields plus the prompts that request them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    /// System message sent ahead of the user instruction.
    #[serde(default)]
    pub system_prompt: String,
    /// User instruction. `{response_pattern}` is replaced with the JSON pattern.
    #[serde(default)]
    pub instruction: String,
    pub fields: Vec<FieldSpec>,
}

impl FieldSchema {
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Resolve a user-typed field name (exact, then case-insensitive).
    pub fn canonical_field(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name)))
            .map(|f| f.name.as_str())
    }

    /// Check field names are present, unique and whitespace-free.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.fields.is_empty() {
            return Err(SchemaError::Empty(self.name.clone()));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if field.name.is_empty() || field.name.chars().any(char::is_whitespace) {
                return Err(SchemaError::InvalidFieldName {
                    schema: self.name.clone(),
                    field: field.name.clone(),
                });
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(SchemaError::DuplicateField {
                    schema: self.name.clone(),
                    field: field.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// JSON object of field name to example value, in schema order.
    ///
    /// Fields without an example fall back to their description.
    pub fn response_pattern(&self) -> String {
        let entries: Vec<String> = self
            .fields
            .iter()
            .map(|f| {
                let sample = f.example.as_deref().unwrap_or(&f.description);
                format!(
                    "{}: {}",
                    serde_json::Value::from(f.name.as_str()),
                    serde_json::Value::from(sample)
                )
            })
            .collect();
        format!("{{{}}}", entries.join(", "))
    }
}

/// Field name to extracted value, ordered by schema.
///
/// `None` marks a field the model could not find. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldMapping {
    entries: Vec<(String, Option<String>)>,
}

impl FieldMapping {
    /// Build from (name, value) pairs, keeping their order.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.map(Into::into)))
            .collect();
        Self { entries }
    }

    /// Extracted value for a field; `None` if absent or not a key.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of fields with a value.
    pub fn found_count(&self) -> usize {
        self.entries.iter().filter(|(_, v)| v.is_some()).count()
    }

    /// True if the keys are exactly the schema's fields, in order.
    pub fn matches_schema(&self, schema: &FieldSchema) -> bool {
        self.entries.len() == schema.len()
            && self
                .entries
                .iter()
                .zip(schema.field_names())
                .all(|((k, _), name)| k == name)
    }
}

impl FromIterator<(String, Option<String>)> for FieldMapping {
    fn from_iter<T: IntoIterator<Item = (String, Option<String>)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Serialize for FieldMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MappingVisitor;

        impl<'de> Visitor<'de> for MappingVisitor {
            type Value = FieldMapping;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of field names to string or null")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, Option<String>>()? {
                    entries.push((key, value));
                }
                Ok(FieldMapping { entries })
            }
        }

        deserializer.deserialize_map(MappingVisitor)
    }
}
