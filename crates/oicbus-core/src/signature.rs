//! Bus type-signature derivation and value conversion
//!
//! | Resource kind | Bus signature |
//! |---------------|---------------|
//! | integer       | `i`           |
//! | double        | `d`           |
//! | boolean       | `b`           |
//! | string        | `s`           |
//! | byte string   | `ay`          |
//! | record        | `a{sv}`       |
//! | array         | one `a` per dimension, then the element signature |
//!
//! Null values and arrays whose element kind is itself an array have no bus
//! representation. Callers are expected to filter them out before translation;
//! reaching this module with one is a caller bug reported as an error.

use crate::{BusValue, Error, ResourceArray, ResourceRecord, ResourceValue, Result, ValueKind};
use crate::MAX_ARRAY_DEPTH;

const DICTIONARY: &str = "a{sv}";
const BYTES: &str = "ay";

fn primitive(kind: ValueKind) -> Result<&'static str> {
    match kind {
        ValueKind::Int => Ok("i"),
        ValueKind::Double => Ok("d"),
        ValueKind::Bool => Ok("b"),
        ValueKind::String => Ok("s"),
        ValueKind::Bytes => Ok(BYTES),
        ValueKind::Record => Ok(DICTIONARY),
        ValueKind::Null | ValueKind::Array => Err(Error::UnsupportedValue(kind)),
    }
}

/// Derive the bus signature of a resource value
pub fn signature_of(value: &ResourceValue) -> Result<String> {
    match value {
        ResourceValue::Array(array) => {
            let element = primitive(array.kind())?;
            let mut sig = "a".repeat(array.depth());
            sig.push_str(element);
            Ok(sig)
        }
        other => primitive(other.kind()).map(str::to_string),
    }
}

/// Derive the signature and convert in one step
pub fn to_bus(value: &ResourceValue) -> Result<(String, BusValue)> {
    let sig = signature_of(value)?;
    let converted = to_bus_value(&sig, value)?;
    Ok((sig, converted))
}

/// Convert a resource value into a bus value of the given signature
pub fn to_bus_value(signature: &str, value: &ResourceValue) -> Result<BusValue> {
    let derived = signature_of(value)?;
    if derived != signature {
        return Err(Error::SignatureMismatch {
            expected: signature.to_string(),
            found: derived,
        });
    }
    convert_to_bus(value)
}

fn convert_to_bus(value: &ResourceValue) -> Result<BusValue> {
    match value {
        ResourceValue::Null => Err(Error::UnsupportedValue(ValueKind::Null)),
        ResourceValue::Int(i) => i32::try_from(*i)
            .map(BusValue::Int32)
            .map_err(|_| Error::IntegerOutOfRange(*i)),
        ResourceValue::Double(d) => Ok(BusValue::Double(*d)),
        ResourceValue::Bool(b) => Ok(BusValue::Bool(*b)),
        ResourceValue::String(s) => Ok(BusValue::String(s.clone())),
        ResourceValue::Bytes(b) => Ok(BusValue::ByteArray(b.clone())),
        ResourceValue::Record(record) => record_to_bus(record),
        ResourceValue::Array(array) => array_to_bus(array),
    }
}

fn record_to_bus(record: &ResourceRecord) -> Result<BusValue> {
    let entries = record
        .iter()
        .map(|(name, value)| Ok((name.to_string(), convert_to_bus(value)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(BusValue::Dictionary(entries))
}

fn array_to_bus(array: &ResourceArray) -> Result<BusValue> {
    let element = primitive(array.kind())?;
    let leaves = array
        .items()
        .iter()
        .map(convert_to_bus)
        .collect::<Result<Vec<_>>>()?;
    Ok(nest_bus(leaves, array.dimensions(), element))
}

fn nest_bus(leaves: Vec<BusValue>, dims: &[usize], element: &str) -> BusValue {
    // Element signature of the outermost level: one `a` per remaining inner dimension
    let inner_sig = format!("{}{}", "a".repeat(dims.len().saturating_sub(1)), element);
    match dims {
        [] | [_] => BusValue::Array {
            element: inner_sig,
            items: leaves,
        },
        [outer, inner @ ..] => {
            let stride: usize = inner.iter().product();
            let mut rest = leaves.into_iter();
            let rows = (0..*outer)
                .map(|_| nest_bus(rest.by_ref().take(stride).collect(), inner, element))
                .collect();
            BusValue::Array {
                element: inner_sig,
                items: rows,
            }
        }
    }
}

/// Convert a bus value of the given signature back into a resource value.
///
/// This is the exact inverse of [`to_bus_value`] for every supported kind.
pub fn to_native_value(signature: &str, value: &BusValue) -> Result<ResourceValue> {
    let mismatch = || Error::SignatureMismatch {
        expected: signature.to_string(),
        found: value.signature(),
    };
    match (signature, value) {
        (_, BusValue::Variant(inner)) if signature == "v" => {
            to_native_value(&inner.signature(), inner)
        }
        ("i", BusValue::Int32(i)) => Ok(ResourceValue::Int(*i as i64)),
        ("d", BusValue::Double(d)) => Ok(ResourceValue::Double(*d)),
        ("b", BusValue::Bool(b)) => Ok(ResourceValue::Bool(*b)),
        ("s", BusValue::String(s)) => Ok(ResourceValue::String(s.clone())),
        (BYTES, BusValue::ByteArray(b)) => Ok(ResourceValue::Bytes(b.clone())),
        (DICTIONARY, BusValue::Dictionary(entries)) => {
            let mut record = ResourceRecord::new();
            for (name, entry) in entries {
                let entry = match entry {
                    BusValue::Variant(inner) => inner.as_ref(),
                    other => other,
                };
                record.set(name, to_native_value(&entry.signature(), entry)?);
            }
            Ok(ResourceValue::Record(record))
        }
        (sig, BusValue::Array { .. }) if sig.starts_with('a') => {
            array_to_native(sig, value).map(ResourceValue::Array)
        }
        ("i" | "d" | "b" | "s" | BYTES | DICTIONARY | "v", _) => Err(mismatch()),
        (sig, _) if sig.starts_with('a') => Err(mismatch()),
        (sig, _) => Err(Error::InvalidSignature(sig.to_string())),
    }
}

/// Split an array signature into its depth and element signature
fn split_array_signature(signature: &str) -> Result<(usize, &str, ValueKind)> {
    let mut depth = 0;
    let mut rest = signature;
    while rest.starts_with('a') && rest != BYTES && rest != DICTIONARY {
        depth += 1;
        rest = &rest[1..];
    }
    let kind = match element_kind(rest) {
        Some(kind) if depth > 0 => kind,
        _ => return Err(Error::InvalidSignature(signature.to_string())),
    };
    if depth > MAX_ARRAY_DEPTH {
        return Err(Error::ArrayTooDeep { depth });
    }
    Ok((depth, rest, kind))
}

fn element_kind(signature: &str) -> Option<ValueKind> {
    match signature {
        "i" => Some(ValueKind::Int),
        "d" => Some(ValueKind::Double),
        "b" => Some(ValueKind::Bool),
        "s" => Some(ValueKind::String),
        BYTES => Some(ValueKind::Bytes),
        DICTIONARY => Some(ValueKind::Record),
        _ => None,
    }
}

fn array_to_native(signature: &str, value: &BusValue) -> Result<ResourceArray> {
    let (depth, element, kind) = split_array_signature(signature)?;

    let mut dims: [Option<usize>; MAX_ARRAY_DEPTH] = [None; MAX_ARRAY_DEPTH];
    let mut flat = Vec::new();
    collect_leaves(signature, value, 0, depth, element, &mut dims, &mut flat)?;

    // Outer dimensions around empty inner arrays carry no elements
    if flat.is_empty() {
        return ResourceArray::empty(kind, depth);
    }
    let mut dimensions = [0; MAX_ARRAY_DEPTH];
    for (i, d) in dims.iter().enumerate() {
        dimensions[i] = d.unwrap_or(0);
    }
    ResourceArray::new(kind, dimensions, flat)
}

fn collect_leaves(
    signature: &str,
    value: &BusValue,
    level: usize,
    depth: usize,
    element: &str,
    dims: &mut [Option<usize>; MAX_ARRAY_DEPTH],
    flat: &mut Vec<ResourceValue>,
) -> Result<()> {
    let expected = &signature[level..];
    let items = match value {
        BusValue::Array { element: e, items } if format!("a{}", e) == expected => items,
        other => {
            return Err(Error::SignatureMismatch {
                expected: expected.to_string(),
                found: other.signature(),
            })
        }
    };
    match dims[level] {
        None => dims[level] = Some(items.len()),
        Some(n) if n != items.len() => return Err(Error::JaggedArray),
        Some(_) => {}
    }
    for item in items {
        if level + 1 == depth {
            flat.push(to_native_value(element, item)?);
        } else {
            collect_leaves(signature, item, level + 1, depth, element, dims, flat)?;
        }
    }
    Ok(())
}
