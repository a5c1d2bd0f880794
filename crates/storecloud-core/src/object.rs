//! Storage object model
//!
//! A `StorageObject` is the value every driver hands back when it resolves or
//! creates a node: a key, a path and an optional bag of typed properties.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::error::{StorageError, StorageResult};
use crate::property_names::{BaseType, StoragePropertyNames};

/// Property bag keyed by property name.
pub type Metadata = BTreeMap<String, PropertyValue>;

/// A typed metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    String(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::String(_) => "string",
            PropertyValue::Integer(_) => "integer",
            PropertyValue::Decimal(_) => "decimal",
            PropertyValue::Boolean(_) => "boolean",
            PropertyValue::DateTime(_) => "datetime",
            PropertyValue::List(_) => "list",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl Display for PropertyValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            PropertyValue::String(s) => write!(f, "{}", s),
            PropertyValue::Integer(i) => write!(f, "{}", i),
            PropertyValue::Decimal(d) => write!(f, "{}", d),
            PropertyValue::Boolean(b) => write!(f, "{}", b),
            PropertyValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            PropertyValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        PropertyValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Decimal(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Boolean(value)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        PropertyValue::DateTime(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(value: Vec<String>) -> Self {
        PropertyValue::List(value.into_iter().map(PropertyValue::String).collect())
    }
}

/// Extraction of a concrete type from a `PropertyValue`.
///
/// Returns `None` when the tag does not match; the caller turns that into a
/// `StorageError::TypeMismatch`.
pub trait FromPropertyValue: Sized {
    const TYPE_NAME: &'static str;

    fn from_property_value(value: &PropertyValue) -> Option<Self>;
}

impl FromPropertyValue for String {
    const TYPE_NAME: &'static str = "string";

    fn from_property_value(value: &PropertyValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromPropertyValue for i64 {
    const TYPE_NAME: &'static str = "integer";

    fn from_property_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromPropertyValue for u64 {
    const TYPE_NAME: &'static str = "unsigned integer";

    fn from_property_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Integer(i) => u64::try_from(*i).ok(),
            _ => None,
        }
    }
}

impl FromPropertyValue for f64 {
    const TYPE_NAME: &'static str = "decimal";

    fn from_property_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Decimal(d) => Some(*d),
            PropertyValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl FromPropertyValue for bool {
    const TYPE_NAME: &'static str = "boolean";

    fn from_property_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromPropertyValue for DateTime<Utc> {
    const TYPE_NAME: &'static str = "datetime";

    fn from_property_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
}

impl FromPropertyValue for Vec<String> {
    const TYPE_NAME: &'static str = "list of strings";

    fn from_property_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::List(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => None,
        }
    }
}

/// A document or folder as seen by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageObject {
    key: String,
    path: String,
    metadata: Option<Metadata>,
}

impl StorageObject {
    pub fn new(key: impl Into<String>, path: impl Into<String>, metadata: Option<Metadata>) -> Self {
        StorageObject {
            key: key.into(),
            path: path.into(),
            metadata,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Raw property lookup. Absent property or absent metadata yields `None`.
    pub fn get_property_value(&self, name: &str) -> Option<&PropertyValue> {
        self.metadata.as_ref().and_then(|m| m.get(name))
    }

    /// Typed property lookup.
    ///
    /// `Ok(None)` when the property is absent, `TypeMismatch` when it holds a
    /// value of another type.
    pub fn property<T: FromPropertyValue>(&self, name: &str) -> StorageResult<Option<T>> {
        match self.get_property_value(name) {
            None => Ok(None),
            Some(value) => T::from_property_value(value).map(Some).ok_or_else(|| {
                StorageError::TypeMismatch {
                    name: name.to_string(),
                    expected: T::TYPE_NAME,
                    found: value.type_name(),
                }
            }),
        }
    }

    fn string_property(&self, name: StoragePropertyNames) -> Option<&str> {
        self.get_property_value(name.value())
            .and_then(PropertyValue::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.string_property(StoragePropertyNames::Name)
    }

    pub fn title(&self) -> Option<&str> {
        self.string_property(StoragePropertyNames::Title)
    }

    pub fn description(&self) -> Option<&str> {
        self.string_property(StoragePropertyNames::Description)
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.string_property(StoragePropertyNames::ContentStreamMimeType)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.property::<u64>(StoragePropertyNames::ContentStreamLength.value())
            .ok()
            .flatten()
    }

    pub fn is_folder(&self) -> bool {
        self.string_property(StoragePropertyNames::BaseTypeId) == Some(BaseType::Folder.value())
    }

    pub fn is_document(&self) -> bool {
        self.string_property(StoragePropertyNames::BaseTypeId) == Some(BaseType::Document.value())
    }

    /// Aspect ids attached to the node; empty when none are set.
    pub fn aspects(&self) -> Vec<String> {
        self.property::<Vec<String>>(StoragePropertyNames::SecondaryObjectTypeIds.value())
            .ok()
            .flatten()
            .unwrap_or_default()
    }
}

impl Display for StorageObject {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "StorageObject{{key='{}', path='{}', metadata=", self.key, self.path)?;
        match &self.metadata {
            None => write!(f, "null")?,
            Some(metadata) => {
                write!(f, "{{")?;
                for (i, (name, value)) in metadata.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", name, value)?;
                }
                write!(f, "}}")?;
            }
        }
        write!(f, "}}")
    }
}
