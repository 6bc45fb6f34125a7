//! Attribute value model
//!
//! OTLP carries attribute values as a tagged union (`AnyValue`). This module
//! maps it onto a closed sum type, [`AttributeValue`], that the converters and
//! the event payloads consume. Conversion is total: every `AnyValue`, including
//! an unset one, maps to exactly one variant.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use opentelemetry_proto::tonic::common::v1::{
    AnyValue, InstrumentationScope, KeyValue, any_value::Value as AnyValueKind,
};
use opentelemetry_proto::tonic::resource::v1::Resource as ProtoResource;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// A single attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// UTF-8 string
    String(String),
    /// Boolean
    Bool(bool),
    /// Signed 64-bit integer
    Int(i64),
    /// 64-bit float
    Double(f64),
    /// Opaque bytes, no encoding assumed
    Bytes(Vec<u8>),
    /// Ordered list of values
    Array(Vec<AttributeValue>),
    /// Ordered key/value list; duplicate keys are preserved
    Map(Vec<(String, AttributeValue)>),
    /// Unset value
    Null,
}

/// Convert an OTLP `AnyValue` into an [`AttributeValue`]. Never fails.
pub fn convert(value: &AnyValue) -> AttributeValue {
    match &value.value {
        Some(kind) => convert_kind(kind),
        None => AttributeValue::Null,
    }
}

fn convert_kind(kind: &AnyValueKind) -> AttributeValue {
    match kind {
        AnyValueKind::StringValue(s) => AttributeValue::String(s.clone()),
        AnyValueKind::BoolValue(b) => AttributeValue::Bool(*b),
        AnyValueKind::IntValue(i) => AttributeValue::Int(*i),
        AnyValueKind::DoubleValue(d) => AttributeValue::Double(*d),
        AnyValueKind::BytesValue(b) => AttributeValue::Bytes(b.clone()),
        AnyValueKind::ArrayValue(array) => {
            AttributeValue::Array(array.values.iter().map(convert).collect())
        }
        AnyValueKind::KvlistValue(list) => AttributeValue::Map(convert_key_values(&list.values)),
        #[allow(unreachable_patterns)]
        _ => AttributeValue::Null,
    }
}

fn convert_key_values(values: &[KeyValue]) -> Vec<(String, AttributeValue)> {
    values
        .iter()
        .map(|kv| {
            let value = kv.value.as_ref().map(convert).unwrap_or(AttributeValue::Null);
            (kv.key.clone(), value)
        })
        .collect()
}

impl From<&AnyValue> for AttributeValue {
    fn from(value: &AnyValue) -> Self {
        convert(value)
    }
}

impl AttributeValue {
    /// String slice if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; numeric strings are accepted since some SDKs stringify counts
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            AttributeValue::Double(d) if d.fract() == 0.0 && d.is_finite() => Some(*d as i64),
            AttributeValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Float view
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Double(d) => Some(*d),
            AttributeValue::Int(i) => Some(*i as f64),
            AttributeValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Number of leaf (non-container) values in this tree
    pub fn leaf_count(&self) -> usize {
        match self {
            AttributeValue::Array(items) => items.iter().map(AttributeValue::leaf_count).sum(),
            AttributeValue::Map(entries) => entries.iter().map(|(_, v)| v.leaf_count()).sum(),
            _ => 1,
        }
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AttributeValue::String(s) => serializer.serialize_str(s),
            AttributeValue::Bool(b) => serializer.serialize_bool(*b),
            AttributeValue::Int(i) => serializer.serialize_i64(*i),
            AttributeValue::Double(d) if d.is_finite() => serializer.serialize_f64(*d),
            // JSON has no NaN/Infinity
            AttributeValue::Double(d) => serializer.serialize_str(&d.to_string()),
            AttributeValue::Bytes(b) => serializer.serialize_str(&BASE64.encode(b)),
            AttributeValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            AttributeValue::Map(entries) => serialize_entries(entries, serializer),
            AttributeValue::Null => serializer.serialize_unit(),
        }
    }
}

fn serialize_entries<S: Serializer>(
    entries: &[(String, AttributeValue)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(entries.len()))?;
    for (key, value) in entries {
        map.serialize_entry(key, value)?;
    }
    map.end()
}

/// Ordered attribute list of one record, scope, or resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(Vec<(String, AttributeValue)>);

impl Attributes {
    /// Convert a list of OTLP key/values, keeping order and duplicate keys
    pub fn from_proto(values: &[KeyValue]) -> Self {
        Self(convert_key_values(values))
    }

    /// Last value recorded under `key`
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Whether any value is recorded under `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Iterate entries in wire order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append an entry
    pub fn push(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.0.push((key.into(), value));
    }
}

impl FromIterator<(String, AttributeValue)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (String, AttributeValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_entries(&self.0, serializer)
    }
}

/// Emitting entity, shared by every record beneath one resource group
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Resource {
    /// Resource attributes
    pub attributes: Attributes,
    /// Attributes the sender had to drop
    #[serde(skip_serializing_if = "is_zero")]
    pub dropped_attributes_count: u32,
}

impl Resource {
    /// Convert an optional OTLP resource; absence means no attributes
    pub fn from_proto(resource: Option<&ProtoResource>) -> Self {
        match resource {
            Some(r) => Self {
                attributes: Attributes::from_proto(&r.attributes),
                dropped_attributes_count: r.dropped_attributes_count,
            },
            None => Self::default(),
        }
    }
}

/// Instrumentation scope, shared by every record beneath one scope group
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Scope {
    /// Instrumentation library name
    pub name: String,
    /// Instrumentation library version
    pub version: String,
    /// Scope attributes
    pub attributes: Attributes,
}

impl Scope {
    /// Convert an optional OTLP instrumentation scope
    pub fn from_proto(scope: Option<&InstrumentationScope>) -> Self {
        match scope {
            Some(s) => Self {
                name: s.name.clone(),
                version: s.version.clone(),
                attributes: Attributes::from_proto(&s.attributes),
            },
            None => Self::default(),
        }
    }
}

/// Read-only view over record, scope and resource attributes.
///
/// Nothing is merged by key; lookups prefer the record, then the scope, then
/// the resource.
#[derive(Debug, Clone, Copy)]
pub struct MergedAttributes<'a> {
    /// Record-level attributes
    pub record: &'a Attributes,
    /// Enclosing scope
    pub scope: &'a Scope,
    /// Enclosing resource
    pub resource: &'a Resource,
}

impl<'a> MergedAttributes<'a> {
    /// Create a view
    pub fn new(record: &'a Attributes, scope: &'a Scope, resource: &'a Resource) -> Self {
        Self {
            record,
            scope,
            resource,
        }
    }

    /// First value found for `key`
    pub fn get(&self, key: &str) -> Option<&'a AttributeValue> {
        self.record
            .get(key)
            .or_else(|| self.scope.attributes.get(key))
            .or_else(|| self.resource.attributes.get(key))
    }

    /// First string value found for `key`
    pub fn get_str(&self, key: &str) -> Option<&'a str> {
        self.get(key).and_then(AttributeValue::as_str)
    }

    /// First integer value found for `key`
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(AttributeValue::as_i64)
    }
}

pub(crate) fn is_zero(value: &u32) -> bool {
    *value == 0
}
