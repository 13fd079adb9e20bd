//! Property values on both sides of the bridge
//!
//! The resource protocol carries loosely-typed property bags ([`ResourceRecord`])
//! whose values are one of a closed set of kinds. The bus protocol carries
//! signature-typed arguments ([`BusValue`]). Conversion between the two lives in
//! [`crate::signature`].

use bytes::Bytes;
use serde_json::{Map, Number, Value as Json};
use std::fmt;

use crate::{Error, Result, MAX_ARRAY_DEPTH};

/// Kind tag of a [`ResourceValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Int,
    Double,
    Bool,
    String,
    Bytes,
    Record,
    Array,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Int => "integer",
            ValueKind::Double => "double",
            ValueKind::Bool => "boolean",
            ValueKind::String => "string",
            ValueKind::Bytes => "byte string",
            ValueKind::Record => "record",
            ValueKind::Array => "array",
        };
        f.write_str(name)
    }
}

/// A resource-protocol property value
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceValue {
    Null,
    Int(i64),
    Double(f64),
    Bool(bool),
    String(String),
    Bytes(Bytes),
    Record(ResourceRecord),
    Array(ResourceArray),
}

impl ResourceValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ResourceValue::Null => ValueKind::Null,
            ResourceValue::Int(_) => ValueKind::Int,
            ResourceValue::Double(_) => ValueKind::Double,
            ResourceValue::Bool(_) => ValueKind::Bool,
            ResourceValue::String(_) => ValueKind::String,
            ResourceValue::Bytes(_) => ValueKind::Bytes,
            ResourceValue::Record(_) => ValueKind::Record,
            ResourceValue::Array(_) => ValueKind::Array,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ResourceValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResourceValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ResourceValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&ResourceRecord> {
        match self {
            ResourceValue::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ResourceArray> {
        match self {
            ResourceValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Build a value from JSON.
    ///
    /// Integral numbers become [`ResourceValue::Int`], other numbers
    /// [`ResourceValue::Double`]. Nested JSON arrays become one multi-dimensional
    /// [`ResourceArray`]; they must be rectangular and at most
    /// [`MAX_ARRAY_DEPTH`] deep.
    pub fn from_json(json: &Json) -> Result<Self> {
        Ok(match json {
            Json::Null => ResourceValue::Null,
            Json::Bool(b) => ResourceValue::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => ResourceValue::Int(i),
                None => ResourceValue::Double(n.as_f64().unwrap_or_default()),
            },
            Json::String(s) => ResourceValue::String(s.clone()),
            Json::Object(map) => ResourceValue::Record(ResourceRecord::from_json_map(map)?),
            Json::Array(items) => ResourceValue::Array(ResourceArray::from_json(items)?),
        })
    }

    pub fn to_json(&self) -> Json {
        match self {
            ResourceValue::Null => Json::Null,
            ResourceValue::Int(i) => Json::from(*i),
            ResourceValue::Double(d) => Number::from_f64(*d).map(Json::Number).unwrap_or(Json::Null),
            ResourceValue::Bool(b) => Json::Bool(*b),
            ResourceValue::String(s) => Json::String(s.clone()),
            ResourceValue::Bytes(b) => Json::Array(b.iter().map(|x| Json::from(*x)).collect()),
            ResourceValue::Record(r) => r.to_json(),
            ResourceValue::Array(a) => a.to_json(),
        }
    }
}

impl From<i64> for ResourceValue {
    fn from(v: i64) -> Self {
        ResourceValue::Int(v)
    }
}

impl From<i32> for ResourceValue {
    fn from(v: i32) -> Self {
        ResourceValue::Int(v as i64)
    }
}

impl From<f64> for ResourceValue {
    fn from(v: f64) -> Self {
        ResourceValue::Double(v)
    }
}

impl From<bool> for ResourceValue {
    fn from(v: bool) -> Self {
        ResourceValue::Bool(v)
    }
}

impl From<&str> for ResourceValue {
    fn from(v: &str) -> Self {
        ResourceValue::String(v.to_string())
    }
}

impl From<String> for ResourceValue {
    fn from(v: String) -> Self {
        ResourceValue::String(v)
    }
}

impl From<Bytes> for ResourceValue {
    fn from(v: Bytes) -> Self {
        ResourceValue::Bytes(v)
    }
}

impl From<ResourceRecord> for ResourceValue {
    fn from(v: ResourceRecord) -> Self {
        ResourceValue::Record(v)
    }
}

impl From<ResourceArray> for ResourceValue {
    fn from(v: ResourceArray) -> Self {
        ResourceValue::Array(v)
    }
}

/// A homogeneous, rectangular array of up to [`MAX_ARRAY_DEPTH`] dimensions.
///
/// Elements are stored flattened in row-major order. Arrays of arrays are
/// expressed through the dimensions, never through an element kind of
/// [`ValueKind::Array`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceArray {
    kind: ValueKind,
    depth: usize,
    dimensions: [usize; MAX_ARRAY_DEPTH],
    items: Vec<ResourceValue>,
}

impl ResourceArray {
    /// Create an array from its element kind, dimensions and flattened items.
    ///
    /// The depth is the number of leading non-zero dimensions (at least one).
    pub fn new(
        kind: ValueKind,
        dimensions: [usize; MAX_ARRAY_DEPTH],
        items: Vec<ResourceValue>,
    ) -> Result<Self> {
        let depth = dimensions.iter().take_while(|d| **d != 0).count().max(1);
        Self::with_depth(kind, depth, dimensions, items)
    }

    /// One-dimensional array
    pub fn from_items(kind: ValueKind, items: Vec<ResourceValue>) -> Result<Self> {
        Self::new(kind, [items.len(), 0, 0], items)
    }

    /// An empty array that still declares `depth` dimensions
    pub fn empty(kind: ValueKind, depth: usize) -> Result<Self> {
        Self::with_depth(kind, depth, [0; MAX_ARRAY_DEPTH], Vec::new())
    }

    fn with_depth(
        kind: ValueKind,
        depth: usize,
        dimensions: [usize; MAX_ARRAY_DEPTH],
        items: Vec<ResourceValue>,
    ) -> Result<Self> {
        if kind == ValueKind::Array {
            return Err(Error::UnsupportedValue(ValueKind::Array));
        }
        if depth == 0 || depth > MAX_ARRAY_DEPTH {
            return Err(Error::ArrayTooDeep { depth });
        }
        if dimensions[depth..].iter().any(|d| *d != 0) {
            return Err(Error::JaggedArray);
        }
        let expected = total(&dimensions[..depth]);
        if items.len() != expected {
            return Err(Error::ArrayShape {
                expected,
                found: items.len(),
            });
        }
        if let Some(item) = items.iter().find(|i| i.kind() != kind) {
            return Err(Error::MixedArray {
                expected: kind,
                found: item.kind(),
            });
        }
        Ok(Self {
            kind,
            depth,
            dimensions,
            items,
        })
    }

    /// Element kind
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Number of dimensions
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn dimensions(&self) -> &[usize] {
        &self.dimensions[..self.depth]
    }

    /// Flattened elements in row-major order
    pub fn items(&self) -> &[ResourceValue] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Records of a one-dimensional record array
    pub fn records(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.items.iter().filter_map(ResourceValue::as_record)
    }

    fn from_json(items: &[Json]) -> Result<Self> {
        let mut shape = JsonShape::default();
        shape.visit(items, 0)?;
        let depth = shape.dims.iter().filter(|d| d.is_some()).count();
        let mut dimensions = [0; MAX_ARRAY_DEPTH];
        for (i, d) in shape.dims.iter().enumerate() {
            dimensions[i] = d.unwrap_or(0);
        }

        let kinds: Vec<ValueKind> = shape.flat.iter().map(ResourceValue::kind).collect();
        let kind = match kinds.first() {
            None => ValueKind::Null,
            Some(first) => *first,
        };
        let numeric = kinds
            .iter()
            .all(|k| matches!(k, ValueKind::Int | ValueKind::Double));
        let (kind, flat) = if numeric && kinds.contains(&ValueKind::Double) {
            let promoted = shape
                .flat
                .into_iter()
                .map(|v| match v {
                    ResourceValue::Int(i) => ResourceValue::Double(i as f64),
                    other => other,
                })
                .collect();
            (ValueKind::Double, promoted)
        } else {
            (kind, shape.flat)
        };
        Self::with_depth(kind, depth, dimensions, flat)
    }

    fn to_json(&self) -> Json {
        nest_json(&self.items, self.dimensions())
    }
}

fn total(dims: &[usize]) -> usize {
    dims.iter().product()
}

fn nest_json(items: &[ResourceValue], dims: &[usize]) -> Json {
    match dims {
        [] | [_] => Json::Array(items.iter().map(ResourceValue::to_json).collect()),
        [outer, inner @ ..] => {
            let stride = total(inner);
            let rows = (0..*outer)
                .map(|i| {
                    let start = (i * stride).min(items.len());
                    let end = (start + stride).min(items.len());
                    nest_json(&items[start..end], inner)
                })
                .collect();
            Json::Array(rows)
        }
    }
}

#[derive(Default)]
struct JsonShape {
    dims: [Option<usize>; MAX_ARRAY_DEPTH],
    leaf: Option<usize>,
    flat: Vec<ResourceValue>,
}

impl JsonShape {
    fn visit(&mut self, items: &[Json], level: usize) -> Result<()> {
        if level >= MAX_ARRAY_DEPTH {
            return Err(Error::ArrayTooDeep { depth: level + 1 });
        }
        match self.dims[level] {
            None => self.dims[level] = Some(items.len()),
            Some(n) if n != items.len() => return Err(Error::JaggedArray),
            Some(_) => {}
        }
        for item in items {
            match item {
                Json::Array(inner) => {
                    if self.leaf == Some(level) {
                        return Err(Error::JaggedArray);
                    }
                    self.visit(inner, level + 1)?;
                }
                other => {
                    match self.leaf {
                        None => self.leaf = Some(level),
                        Some(l) if l != level => return Err(Error::JaggedArray),
                        Some(_) => {}
                    }
                    if self.dims[level + 1..].iter().any(Option::is_some) {
                        return Err(Error::JaggedArray);
                    }
                    self.flat.push(ResourceValue::from_json(other)?);
                }
            }
        }
        Ok(())
    }
}

/// An ordered, string-keyed property bag.
///
/// Insertion order is preserved; setting an existing name replaces the value
/// in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceRecord {
    values: Vec<(String, ResourceValue)>,
}

impl ResourceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`ResourceRecord::set`]
    pub fn with(mut self, name: &str, value: impl Into<ResourceValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<ResourceValue>) {
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value,
            None => self.values.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ResourceValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ResourceValue::as_str)
    }

    pub fn get_array(&self, name: &str) -> Option<&ResourceArray> {
        self.get(name).and_then(ResourceValue::as_array)
    }

    pub fn remove(&mut self, name: &str) -> Option<ResourceValue> {
        let pos = self.values.iter().position(|(n, _)| n == name)?;
        Some(self.values.remove(pos).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResourceValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn from_json(json: &Json) -> Result<Self> {
        match json {
            Json::Object(map) => Self::from_json_map(map),
            other => Err(Error::UnsupportedValue(ResourceValue::from_json(other)?.kind())),
        }
    }

    fn from_json_map(map: &Map<String, Json>) -> Result<Self> {
        let mut record = Self::new();
        for (name, value) in map {
            record.set(name, ResourceValue::from_json(value)?);
        }
        Ok(record)
    }

    pub fn to_json(&self) -> Json {
        let map: Map<String, Json> = self
            .values
            .iter()
            .map(|(n, v)| (n.clone(), v.to_json()))
            .collect();
        Json::Object(map)
    }
}

impl<'a> IntoIterator for &'a ResourceRecord {
    type Item = (&'a str, &'a ResourceValue);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a ResourceValue)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// A bus-protocol argument.
///
/// Only the subset of the bus type system the bridge produces is modelled.
#[derive(Debug, Clone, PartialEq)]
pub enum BusValue {
    /// `y`
    Byte(u8),
    /// `b`
    Bool(bool),
    /// `i`
    Int32(i32),
    /// `d`
    Double(f64),
    /// `s`
    String(String),
    /// `ay`
    ByteArray(Bytes),
    /// `a<element>`
    Array { element: String, items: Vec<BusValue> },
    /// `a{sv}`; entry values are the variant contents
    Dictionary(Vec<(String, BusValue)>),
    /// `v`
    Variant(Box<BusValue>),
}

impl BusValue {
    /// Type signature of this value
    pub fn signature(&self) -> String {
        match self {
            BusValue::Byte(_) => "y".to_string(),
            BusValue::Bool(_) => "b".to_string(),
            BusValue::Int32(_) => "i".to_string(),
            BusValue::Double(_) => "d".to_string(),
            BusValue::String(_) => "s".to_string(),
            BusValue::ByteArray(_) => "ay".to_string(),
            BusValue::Array { element, .. } => format!("a{}", element),
            BusValue::Dictionary(_) => "a{sv}".to_string(),
            BusValue::Variant(_) => "v".to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BusValue::String(s) => Some(s),
            BusValue::Variant(v) => v.as_str(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BusValue::Bool(b) => Some(*b),
            BusValue::Variant(v) => v.as_bool(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BusValue::ByteArray(b) => Some(b),
            BusValue::Variant(v) => v.as_bytes(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            BusValue::Byte(b) => Json::from(*b),
            BusValue::Bool(b) => Json::Bool(*b),
            BusValue::Int32(i) => Json::from(*i),
            BusValue::Double(d) => Number::from_f64(*d).map(Json::Number).unwrap_or(Json::Null),
            BusValue::String(s) => Json::String(s.clone()),
            BusValue::ByteArray(b) => Json::Array(b.iter().map(|x| Json::from(*x)).collect()),
            BusValue::Array { items, .. } => Json::Array(items.iter().map(BusValue::to_json).collect()),
            BusValue::Dictionary(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            BusValue::Variant(v) => v.to_json(),
        }
    }
}

impl From<&str> for BusValue {
    fn from(v: &str) -> Self {
        BusValue::String(v.to_string())
    }
}

impl From<String> for BusValue {
    fn from(v: String) -> Self {
        BusValue::String(v)
    }
}

impl From<bool> for BusValue {
    fn from(v: bool) -> Self {
        BusValue::Bool(v)
    }
}

impl From<i32> for BusValue {
    fn from(v: i32) -> Self {
        BusValue::Int32(v)
    }
}

impl From<f64> for BusValue {
    fn from(v: f64) -> Self {
        BusValue::Double(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_preserves_order_and_replaces() {
        let mut record = ResourceRecord::new().with("b", 1).with("a", "x");
        record.set("b", 2);
        let names: Vec<&str> = record.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(record.get("b"), Some(&ResourceValue::Int(2)));
    }

    #[test]
    fn test_array_shape_checked() {
        let result = ResourceArray::new(
            ValueKind::Int,
            [2, 2, 0],
            vec![ResourceValue::Int(1), ResourceValue::Int(2)],
        );
        assert_eq!(
            result.unwrap_err(),
            Error::ArrayShape {
                expected: 4,
                found: 2
            }
        );
    }

    #[test]
    fn test_array_of_arrays_rejected() {
        let result = ResourceArray::from_items(ValueKind::Array, vec![]);
        assert_eq!(
            result.unwrap_err(),
            Error::UnsupportedValue(ValueKind::Array)
        );
    }

    #[test]
    fn test_json_nested_array() {
        let value = ResourceValue::from_json(&json!([[1, 2, 3], [4, 5, 6]])).unwrap();
        let array = value.as_array().unwrap();
        assert_eq!(array.depth(), 2);
        assert_eq!(array.dimensions(), &[2, 3]);
        assert_eq!(array.items()[4], ResourceValue::Int(5));
        assert_eq!(value.to_json(), json!([[1, 2, 3], [4, 5, 6]]));
    }

    #[test]
    fn test_json_jagged_and_deep_arrays() {
        assert_eq!(
            ResourceValue::from_json(&json!([[1, 2], [3]])).unwrap_err(),
            Error::JaggedArray
        );
        assert_eq!(
            ResourceValue::from_json(&json!([[[[1]]]])).unwrap_err(),
            Error::ArrayTooDeep { depth: 4 }
        );
    }

    #[test]
    fn test_json_numeric_promotion() {
        let value = ResourceValue::from_json(&json!([1, 2.5])).unwrap();
        let array = value.as_array().unwrap();
        assert_eq!(array.kind(), ValueKind::Double);
        assert_eq!(array.items()[0], ResourceValue::Double(1.0));
    }

    #[test]
    fn test_bus_signature() {
        let value = BusValue::Array {
            element: "ai".to_string(),
            items: vec![],
        };
        assert_eq!(value.signature(), "aai");
        assert_eq!(BusValue::Dictionary(vec![]).signature(), "a{sv}");
    }
}
