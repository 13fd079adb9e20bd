//! Deterministic identifier derivation
//!
//! When no identifier exists that is valid in both protocols, a stable one is
//! derived from the facts at hand. No randomness or clock input is involved:
//! the same inputs yield the same identifier across restarts, which keeps
//! discovery stable.

use uuid::Uuid;

use crate::{Error, Result};

/// Length of a hyphenated UUID string
pub const UUID_STRING_SIZE: usize = 36;

/// Namespace for name-based identifiers derived by the bridge
pub const BRIDGE_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6f, 0x1c, 0x3b, 0x52, 0x0e, 0x4d, 0x4a, 0x8f, 0x9d, 0x21, 0x5b, 0x7e, 0xc4, 0x13, 0xa0, 0x66,
]);

/// Derive the 16-byte application id from a device id.
///
/// Hex digits are consumed two per byte; a single `-` before each byte is
/// skipped. Characters that are not hex digits occupy a position without
/// contributing bits, and short input leaves the remaining bytes zero.
pub fn app_id_from_device_id(device_id: &str) -> [u8; 16] {
    let mut app_id = [0u8; 16];
    let bytes = device_id.as_bytes();
    let mut pos = 0;
    for byte in app_id.iter_mut() {
        if pos >= bytes.len() {
            break;
        }
        if bytes[pos] == b'-' {
            pos += 1;
        }
        for _ in 0..2 {
            let Some(&c) = bytes.get(pos) else { break };
            if let Some(nibble) = (c as char).to_digit(16) {
                *byte = (*byte << 4) | nibble as u8;
            }
            pos += 1;
        }
    }
    app_id
}

/// One-way hash of a device id and application id, as a UUID
pub fn derive_unique_id(device_id: &str, app_id: &[u8]) -> Uuid {
    let mut name = Vec::with_capacity(device_id.len() + app_id.len());
    name.extend_from_slice(device_id.as_bytes());
    name.extend_from_slice(app_id);
    Uuid::new_v5(&BRIDGE_NAMESPACE, &name)
}

/// Parse a 32-hex-digit bus-unique peer id
fn parse_peer_id(peer_id: &str) -> Option<Uuid> {
    if peer_id.len() != 32 || !peer_id.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Uuid::try_parse(peer_id).ok()
}

/// Derive the protocol-independent id of a device.
///
/// Preference order:
/// 1. `explicit`, verbatim, when it is exactly [`UUID_STRING_SIZE`] long
/// 2. the peer connection id, when it is 32 hex digits
/// 3. a hash over the device id and application id
pub fn protocol_independent_id(
    explicit: Option<&str>,
    peer_id: Option<&str>,
    device_id: Option<&str>,
    app_id: &[u8],
) -> Result<String> {
    if let Some(piid) = explicit.filter(|s| s.len() == UUID_STRING_SIZE) {
        return Ok(piid.to_string());
    }
    if let Some(peer) = peer_id.and_then(parse_peer_id) {
        return Ok(peer.hyphenated().to_string());
    }
    let device_id = device_id.ok_or(Error::MissingDeviceId)?;
    Ok(derive_unique_id(device_id, app_id).hyphenated().to_string())
}

/// Derive the platform id of a device.
///
/// A hyphenated UUID device id is used verbatim, a 32-hex-digit one is
/// reformatted with hyphens, anything else is hashed.
pub fn platform_id(device_id: Option<&str>) -> Result<String> {
    let device_id = device_id.ok_or(Error::MissingDeviceId)?;
    match device_id.len() {
        UUID_STRING_SIZE if Uuid::try_parse(device_id).is_ok() => Ok(device_id.to_string()),
        32 => match parse_peer_id(device_id) {
            Some(uuid) => Ok(uuid.hyphenated().to_string()),
            None => Ok(derive_unique_id(device_id, &[]).hyphenated().to_string()),
        },
        _ => Ok(derive_unique_id(device_id, &[]).hyphenated().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP_ID: [u8; 16] = [
        0x46, 0xe8, 0x0b, 0xf8, 0x9f, 0xf5, 0x47, 0x8a, 0xbe, 0x9f, 0x7f, 0xa3, 0x4a, 0xdc, 0x49,
        0x7b,
    ];

    #[test]
    fn test_app_id_from_uuid() {
        let app_id = app_id_from_device_id("7d529297-6f9f-83e8-aec0-72dd5392b584");
        assert_eq!(
            app_id,
            [
                0x7d, 0x52, 0x92, 0x97, 0x6f, 0x9f, 0x83, 0xe8, 0xae, 0xc0, 0x72, 0xdd, 0x53, 0x92,
                0xb5, 0x84
            ]
        );
    }

    #[test]
    fn test_app_id_short_input() {
        let app_id = app_id_from_device_id("AB-c");
        assert_eq!(app_id[0], 0xab);
        assert_eq!(app_id[1], 0x0c);
        assert!(app_id[2..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_explicit_piid() {
        let piid = "c208d3b0-169b-4ace-bf5a-54ad2d6549f7";
        assert_eq!(
            protocol_independent_id(Some(piid), Some("10f70cc4239841f580624c1facbfc41b"), None, &[])
                .unwrap(),
            piid
        );
    }

    #[test]
    fn test_explicit_piid_wrong_length_ignored() {
        let derived = protocol_independent_id(
            Some(""),
            Some("10f70cc4239841f580624c1facbfc41b"),
            None,
            &[],
        )
        .unwrap();
        assert_eq!(derived, "10f70cc4-2398-41f5-8062-4c1facbfc41b");
    }

    #[test]
    fn test_hash_fallback_deterministic() {
        let device_id = "0ce43c8b-b997-4a05-b77d-1c92e01fe7ae";
        let first = protocol_independent_id(None, None, Some(device_id), &APP_ID).unwrap();
        let second = protocol_independent_id(None, None, Some(device_id), &APP_ID).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, derive_unique_id(device_id, &APP_ID).hyphenated().to_string());
        assert_eq!(first.len(), UUID_STRING_SIZE);
    }

    #[test]
    fn test_bad_peer_falls_through() {
        let device_id = "device";
        let derived =
            protocol_independent_id(None, Some(":1.42"), Some(device_id), &APP_ID).unwrap();
        assert_eq!(derived, derive_unique_id(device_id, &APP_ID).hyphenated().to_string());
    }

    #[test]
    fn test_missing_device_id() {
        assert_eq!(
            protocol_independent_id(None, None, None, &APP_ID).unwrap_err(),
            Error::MissingDeviceId
        );
        assert_eq!(platform_id(None).unwrap_err(), Error::MissingDeviceId);
    }

    #[test]
    fn test_platform_id_forms() {
        let dashed = "0ce43c8b-b997-4a05-b77d-1c92e01fe7ae";
        assert_eq!(platform_id(Some(dashed)).unwrap(), dashed);
        assert_eq!(
            platform_id(Some("0ce43c8bb9974a05b77d1c92e01fe7ae")).unwrap(),
            dashed
        );
        assert_eq!(
            platform_id(Some("device-id")).unwrap(),
            derive_unique_id("device-id", &[]).hyphenated().to_string()
        );
    }
}
