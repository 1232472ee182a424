//! Document value model.
//!
//! [`Value`] is the store's scalar/array/map value type and [`Document`] is a
//! top-level field map. Dotted paths (`"events.support"`) address nested map
//! fields; intermediate maps are created on write.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{StoreError, StoreResult};

/// A value stored in a document field.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Double(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Convert from a JSON value. Integer-valued numbers become [`Value::Int`].
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(a) => {
                Value::Array(a.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(o) => Value::Map(
                o.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to a JSON value. Non-finite doubles degrade to null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Double(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Array(a) => serde_json::Value::Array(a.iter().map(Value::to_json).collect()),
            Value::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from_json(json))
    }
}

/// Total order over values for sort stages: null < bool < numbers < strings <
/// arrays < maps, numeric types compared by magnitude.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Double(_) => 2,
            Value::Str(_) => 3,
            Value::Array(_) => 4,
            Value::Map(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (xa, ya) in x.iter().zip(y.iter()) {
                let ord = compare_values(xa, ya);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ if rank(a) == 2 && rank(b) == 2 => {
            let x = a.as_double().unwrap_or(f64::NAN);
            let y = b.as_double().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

// =============================================================================
// Conversion traits
// =============================================================================

/// Convert a Rust value to a store [`Value`].
pub trait ToValue {
    fn to_value(&self) -> Value;
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }
}

impl ToValue for &str {
    fn to_value(&self) -> Value {
        Value::Str(self.to_string())
    }
}

impl ToValue for i64 {
    fn to_value(&self) -> Value {
        Value::Int(*self)
    }
}

impl ToValue for i32 {
    fn to_value(&self) -> Value {
        Value::Int(*self as i64)
    }
}

impl ToValue for u32 {
    fn to_value(&self) -> Value {
        Value::Int(*self as i64)
    }
}

impl ToValue for u64 {
    fn to_value(&self) -> Value {
        Value::Int(*self as i64)
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Double(*self)
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Double(*self as f64)
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(|v| v.to_value()).collect())
    }
}

impl<T: ToValue> ToValue for BTreeMap<String, T> {
    fn to_value(&self) -> Value {
        Value::Map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_value()))
                .collect(),
        )
    }
}

/// Convert a store [`Value`] to a Rust type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(|s| s.to_string())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_int()
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_int().and_then(|n| u32::try_from(n).ok())
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_int().and_then(|n| u64::try_from(n).ok())
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_double()
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_array().map(|a| {
            a.iter().filter_map(T::from_value).collect()
        })
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

// =============================================================================
// Document
// =============================================================================

/// A stored document: a named-field map with dotted-path access.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }

    /// Serialize any model type into a document. Fails if the type does not
    /// serialize to a map.
    pub fn from_serialize<T: Serialize>(value: &T) -> StoreResult<Self> {
        let json = serde_json::to_value(value)?;
        match Value::from_json(json) {
            Value::Map(fields) => Ok(Self { fields }),
            other => Err(StoreError::conversion(format!(
                "expected a map-like value, got {:?}",
                other
            ))),
        }
    }

    /// Deserialize the document into a model type.
    pub fn deserialize_into<T: for<'de> Deserialize<'de>>(&self) -> StoreResult<T> {
        let json = Value::Map(self.fields.clone()).to_json();
        Ok(serde_json::from_value(json)?)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl ToValue) {
        self.fields.insert(name.into(), value.to_value());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// The document's `_id`, if set.
    pub fn id(&self) -> Option<&str> {
        self.get("_id").and_then(Value::as_str)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.set("_id", Value::Str(id.into()));
    }

    /// Resolve a dotted path through nested maps. Paths through arrays or
    /// scalars resolve to `None`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.fields.get(first)?;
        for part in parts {
            current = current.as_map()?.get(part)?;
        }
        Some(current)
    }

    /// Set a dotted path, creating intermediate maps as needed. Existing
    /// non-map intermediates are replaced.
    pub fn set_path(&mut self, path: &str, value: impl ToValue) {
        let value = value.to_value();
        let mut parts: Vec<&str> = path.split('.').collect();
        let leaf = match parts.pop() {
            Some(leaf) => leaf,
            None => return,
        };

        if parts.is_empty() {
            self.fields.insert(leaf.to_string(), value);
            return;
        }

        let mut current = self
            .fields
            .entry(parts[0].to_string())
            .or_insert_with(|| Value::Map(BTreeMap::new()));
        if !matches!(current, Value::Map(_)) {
            *current = Value::Map(BTreeMap::new());
        }

        for part in &parts[1..] {
            let map = match current.as_map_mut() {
                Some(m) => m,
                None => return,
            };
            current = map
                .entry(part.to_string())
                .or_insert_with(|| Value::Map(BTreeMap::new()));
            if !matches!(current, Value::Map(_)) {
                *current = Value::Map(BTreeMap::new());
            }
        }

        if let Some(map) = current.as_map_mut() {
            map.insert(leaf.to_string(), value);
        }
    }

    /// Remove a dotted path. Missing intermediates are a no-op.
    pub fn remove_path(&mut self, path: &str) -> Option<Value> {
        let mut parts: Vec<&str> = path.split('.').collect();
        let leaf = parts.pop()?;

        if parts.is_empty() {
            return self.fields.remove(leaf);
        }

        let mut current = self.fields.get_mut(parts[0])?;
        for part in &parts[1..] {
            current = current.as_map_mut()?.get_mut(*part)?;
        }
        current.as_map_mut()?.remove(leaf)
    }
}

impl ToValue for Document {
    fn to_value(&self) -> Value {
        Value::Map(self.fields.clone())
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> Document {
        let mut doc = Document::new();
        doc.set("_id", "abc");
        doc.set("filepath", "/videos/a.mp4");
        doc.set_path("events.label", "meeting");
        doc.set_path("events.support", vec![1u32, 10]);
        doc
    }

    #[test]
    fn test_path_get_set() {
        let doc = sample_doc();
        assert_eq!(doc.id(), Some("abc"));
        assert_eq!(
            doc.get_path("events.label").and_then(Value::as_str),
            Some("meeting")
        );
        assert!(doc.get_path("events.missing").is_none());
        assert!(doc.get_path("missing.label").is_none());
    }

    #[test]
    fn test_path_remove() {
        let mut doc = sample_doc();
        let removed = doc.remove_path("events.support");
        assert!(removed.is_some());
        assert!(doc.get_path("events.support").is_none());
        assert!(doc.get_path("events.label").is_some());
    }

    #[test]
    fn test_set_path_creates_intermediates() {
        let mut doc = Document::new();
        doc.set_path("a.b.c", 5i64);
        assert_eq!(doc.get_path("a.b.c").and_then(Value::as_int), Some(5));
    }

    #[test]
    fn test_value_json_round_trip() {
        let doc = sample_doc();
        let json = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_int_double_compare() {
        use std::cmp::Ordering;
        assert_eq!(
            compare_values(&Value::Int(3), &Value::Double(3.5)),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&Value::Double(2.0), &Value::Int(2)),
            Ordering::Equal
        );
        assert_eq!(compare_values(&Value::Null, &Value::Int(0)), Ordering::Less);
    }

    #[test]
    fn test_from_serialize_requires_map() {
        assert!(Document::from_serialize(&42u32).is_err());
        assert!(Document::from_serialize(&serde_json::json!({"a": 1})).is_ok());
    }
}
