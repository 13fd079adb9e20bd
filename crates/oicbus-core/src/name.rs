//! Name translation between the two protocols' naming grammars
//!
//! Resource-protocol names are dot-separated segments of lowercase letters,
//! digits and hyphens (IDN labels appear in their `xn--` punycode form). A
//! leading `x.` segment marks a vendor-defined name.
//!
//! Bus-protocol names are dot-separated segments of ASCII letters, digits and
//! underscores.
//!
//! ```text
//! resource                bus
//! x.example.foo-     ->   example.foo_
//! x.example.foo--    ->   example.foo__
//! x.example.foo---   ->   example.foo__      (runs of 3+ hyphens collapse)
//! xn--90ae.example   <->  xn__90ae.example
//! ```
//!
//! The vendor prefix is dropped on the way to the bus protocol and never
//! restored; bus names whose first segment is `x` are therefore lossy.

use crate::{Error, Result, VENDOR_PREFIX};

/// Longest hyphen run that survives translation
const MAX_HYPHEN_RUN: usize = 2;

/// Translate a resource-protocol name into a bus-protocol name
pub fn to_bus_name(name: &str) -> String {
    let name = name.strip_prefix(VENDOR_PREFIX).unwrap_or(name);
    let mut out = String::with_capacity(name.len());
    let mut run = 0;
    for c in name.chars() {
        if c == '-' {
            run += 1;
            continue;
        }
        push_underscores(&mut out, run);
        run = 0;
        out.push(c);
    }
    push_underscores(&mut out, run);
    out
}

fn push_underscores(out: &mut String, run: usize) {
    for _ in 0..run.min(MAX_HYPHEN_RUN) {
        out.push('_');
    }
}

/// Translate a bus-protocol name into a resource-protocol name.
///
/// Letters and digits are preserved; each underscore becomes a hyphen.
pub fn to_resource_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == '_' { '-' } else { c })
        .collect()
}

/// Whether the name carries the vendor-scope prefix
pub fn is_vendor_name(name: &str) -> bool {
    name.starts_with(VENDOR_PREFIX)
}

fn is_segment_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_segment_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Validate a bus-protocol interface or error name.
///
/// A valid name has at least two segments joined by single dots; each segment
/// starts with a letter or underscore and continues with letters, digits or
/// underscores. Returns whether a valid name was found and the byte offset just
/// past the longest valid prefix, so trailing characters can be detected
/// without rejecting the whole string.
pub fn is_valid_name(name: &str) -> (bool, usize) {
    let bytes = name.as_bytes();
    let mut segments = 0;
    let mut pos = 0;
    let mut end = 0;

    loop {
        let start = if segments == 0 { pos } else { pos + 1 };
        match bytes.get(start) {
            Some(b) if is_segment_start(*b) => {}
            _ => break,
        }
        let mut i = start + 1;
        while i < bytes.len() && is_segment_char(bytes[i]) {
            i += 1;
        }
        segments += 1;
        pos = i;
        if segments >= 2 {
            end = pos;
        }
        if bytes.get(pos) != Some(&b'.') {
            break;
        }
    }

    if segments >= 2 {
        (true, end)
    } else {
        (false, pos)
    }
}

/// Validate a name in full, rejecting trailing characters
pub fn check_name(name: &str) -> Result<()> {
    match is_valid_name(name) {
        (true, end) if end == name.len() => Ok(()),
        _ => Err(Error::InvalidName(name.to_string())),
    }
}

/// Validate a bus-protocol member (property) name: a single segment
pub fn check_member_name(name: &str) -> Result<()> {
    let mut bytes = name.bytes();
    if bytes.next().is_some_and(is_segment_start) && bytes.all(is_segment_char) {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

/// Translate a resource-protocol name to the bus protocol and validate it
/// as an interface name
pub fn to_bus_interface_name(name: &str) -> Result<String> {
    let bus_name = to_bus_name(name);
    check_name(&bus_name)?;
    Ok(bus_name)
}

/// Translate a resource-protocol property name to the bus protocol and
/// validate it as a member name
pub fn to_bus_member_name(name: &str) -> Result<String> {
    let bus_name = to_bus_name(name);
    check_member_name(&bus_name)?;
    Ok(bus_name)
}

/// Translate a resource URI into a bus object path.
///
/// Characters outside `[A-Za-z0-9/]` are escaped as `_xx` (lowercase hex of
/// each UTF-8 byte); a trailing slash is dropped.
pub fn uri_to_object_path(uri: &str) -> String {
    let trimmed = if uri.len() > 1 { uri.trim_end_matches('/') } else { uri };
    let mut path = String::with_capacity(trimmed.len() + 1);
    if !trimmed.starts_with('/') {
        path.push('/');
    }
    for b in trimmed.bytes() {
        if b.is_ascii_alphanumeric() || b == b'/' {
            path.push(b as char);
        } else {
            path.push_str(&format!("_{:02x}", b));
        }
    }
    path
}

/// Inverse of [`uri_to_object_path`]
pub fn object_path_to_uri(path: &str) -> Result<String> {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'_' {
            let hex = path
                .get(i + 1..i + 3)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| Error::InvalidName(path.to_string()))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| Error::InvalidName(path.to_string()))
}
