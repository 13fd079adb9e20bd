//! Announcement record
//!
//! The bus-protocol metadata advertised for one virtual device. Fields are
//! either plain values or per-language values; each known field carries
//! details (signature, whether it is announced, required or localized).
//! Fields set without prior details are registered on first use with the
//! signature of the value.

use oicbus_core::BusValue;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;

use crate::{BridgeError, Result};

/// Announcement field names
pub mod field {
    pub const APP_ID: &str = "AppId";
    pub const DEFAULT_LANGUAGE: &str = "DefaultLanguage";
    pub const DEVICE_NAME: &str = "DeviceName";
    pub const DEVICE_ID: &str = "DeviceId";
    pub const APP_NAME: &str = "AppName";
    pub const MANUFACTURER: &str = "Manufacturer";
    pub const MODEL_NUMBER: &str = "ModelNumber";
    pub const DESCRIPTION: &str = "Description";
    pub const DATE_OF_MANUFACTURE: &str = "DateOfManufacture";
    pub const SOFTWARE_VERSION: &str = "SoftwareVersion";
    pub const HARDWARE_VERSION: &str = "HardwareVersion";
    pub const SUPPORT_URL: &str = "SupportUrl";

    pub const PROTOCOL_INDEPENDENT_ID: &str = "org.openconnectivity.piid";
    pub const FIRMWARE_VERSION: &str = "org.openconnectivity.mnfv";
    pub const MANUFACTURER_URL: &str = "org.openconnectivity.mnml";
    pub const OS_VERSION: &str = "org.openconnectivity.mnos";
    pub const PLATFORM_VERSION: &str = "org.openconnectivity.mnpv";
    pub const SYSTEM_TIME: &str = "org.openconnectivity.st";

    /// Marks a purely virtual (non golden unit) device
    pub const VIRTUAL: &str = "com.intel.Virtual";
}

/// Field details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDetails {
    pub signature: String,
    pub announced: bool,
    pub required: bool,
    pub localized: bool,
}

impl FieldDetails {
    pub fn new(signature: &str) -> Self {
        Self {
            signature: signature.to_string(),
            announced: false,
            required: false,
            localized: false,
        }
    }

    pub fn announced(mut self) -> Self {
        self.announced = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn localized(mut self) -> Self {
        self.localized = true;
        self
    }
}

/// Value of one field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Plain(BusValue),
    /// (language, value) in insertion order
    Localized(Vec<(String, BusValue)>),
}

const STANDARD_FIELDS: &[&str] = &[
    field::APP_ID,
    field::DEFAULT_LANGUAGE,
    field::DEVICE_NAME,
    field::DEVICE_ID,
    field::APP_NAME,
    field::MANUFACTURER,
    field::MODEL_NUMBER,
    field::DESCRIPTION,
    field::DATE_OF_MANUFACTURE,
    field::SOFTWARE_VERSION,
    field::HARDWARE_VERSION,
    field::SUPPORT_URL,
];

const NAMESPACED_FIELDS: &[&str] = &[
    field::PROTOCOL_INDEPENDENT_ID,
    field::FIRMWARE_VERSION,
    field::MANUFACTURER_URL,
    field::OS_VERSION,
    field::PLATFORM_VERSION,
    field::SYSTEM_TIME,
];

/// Whether a field is neither a standard nor a bridge-defined field
pub fn is_vendor_field(name: &str) -> bool {
    !STANDARD_FIELDS.contains(&name)
        && !NAMESPACED_FIELDS.contains(&name)
        && name != field::VIRTUAL
}

/// The bus-protocol announcement record of one virtual device
#[derive(Debug, Clone, PartialEq)]
pub struct AnnouncementRecord {
    details: BTreeMap<String, FieldDetails>,
    values: BTreeMap<String, FieldValue>,
    supported_languages: Vec<String>,
    fallback_app_name: Option<String>,
}

impl Default for AnnouncementRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnouncementRecord {
    pub fn new() -> Self {
        let mut record = Self {
            details: BTreeMap::new(),
            values: BTreeMap::new(),
            supported_languages: Vec::new(),
            fallback_app_name: None,
        };
        let standard = [
            (field::APP_ID, FieldDetails::new("ay").announced().required()),
            (field::DEFAULT_LANGUAGE, FieldDetails::new("s").announced().required()),
            (field::DEVICE_NAME, FieldDetails::new("s").announced().localized()),
            (field::DEVICE_ID, FieldDetails::new("s").announced().required()),
            (field::APP_NAME, FieldDetails::new("s").announced().required().localized()),
            (field::MANUFACTURER, FieldDetails::new("s").announced().required().localized()),
            (field::MODEL_NUMBER, FieldDetails::new("s").announced().required()),
            (field::DESCRIPTION, FieldDetails::new("s").required().localized()),
            (field::DATE_OF_MANUFACTURE, FieldDetails::new("s")),
            (field::SOFTWARE_VERSION, FieldDetails::new("s").required()),
            (field::HARDWARE_VERSION, FieldDetails::new("s")),
            (field::SUPPORT_URL, FieldDetails::new("s")),
            (field::PROTOCOL_INDEPENDENT_ID, FieldDetails::new("s").announced()),
            (field::FIRMWARE_VERSION, FieldDetails::new("s")),
            (field::MANUFACTURER_URL, FieldDetails::new("s")),
            (field::OS_VERSION, FieldDetails::new("s")),
            (field::PLATFORM_VERSION, FieldDetails::new("s")),
            (field::SYSTEM_TIME, FieldDetails::new("s")),
        ];
        for (name, details) in standard {
            record.details.insert(name.to_string(), details);
        }
        record
    }

    pub fn with_default_language(language: &str) -> Self {
        let mut record = Self::new();
        record.set_default_language(language);
        record
    }

    /// Register or replace the details of a field
    /// Define a new field.
    ///
    /// Returns `false` and leaves the record untouched when the field is
    /// already defined.
    pub fn set_new_field_details(&mut self, name: &str, details: FieldDetails) -> bool {
        if self.details.contains_key(name) {
            return false;
        }
        self.details.insert(name.to_string(), details);
        true
    }

    pub fn field_details(&self, name: &str) -> Option<&FieldDetails> {
        self.details.get(name)
    }

    /// Set a field.
    ///
    /// Localized fields are stored under `language`, or under the default
    /// language when none is given. Unknown fields are registered with the
    /// value's signature, localized when a language is given.
    pub fn set_field(&mut self, name: &str, value: BusValue, language: Option<&str>) -> Result<()> {
        let details = match self.details.get(name) {
            Some(details) => details.clone(),
            None => {
                let mut details = FieldDetails::new(&value.signature());
                details.localized = language.is_some();
                self.details.insert(name.to_string(), details.clone());
                details
            }
        };
        if details.signature != value.signature() {
            return Err(BridgeError::field(
                name,
                format!(
                    "signature {} does not match {}",
                    value.signature(),
                    details.signature
                ),
            ));
        }

        if !details.localized {
            self.values.insert(name.to_string(), FieldValue::Plain(value));
            return Ok(());
        }

        let language = match language {
            Some(language) => language.to_string(),
            None => self
                .default_language()
                .map(str::to_string)
                .ok_or_else(|| BridgeError::field(name, "no language and no default language"))?,
        };
        self.add_supported_language(&language);
        let entry = self
            .values
            .entry(name.to_string())
            .or_insert_with(|| FieldValue::Localized(Vec::new()));
        match entry {
            FieldValue::Localized(entries) => {
                match entries.iter_mut().find(|(l, _)| *l == language) {
                    Some((_, existing)) => *existing = value,
                    None => entries.push((language, value)),
                }
            }
            FieldValue::Plain(_) => *entry = FieldValue::Localized(vec![(language, value)]),
        }
        Ok(())
    }

    /// Get a field; localized fields resolve `language` or the default language
    pub fn get_field(&self, name: &str, language: Option<&str>) -> Option<&BusValue> {
        match self.values.get(name)? {
            FieldValue::Plain(value) => Some(value),
            FieldValue::Localized(entries) => {
                let language = language.or_else(|| self.default_language())?;
                entries.iter().find(|(l, _)| l == language).map(|(_, v)| v)
            }
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Names of all fields that have a value
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Names of the announced fields that have a value
    pub fn announced_field_names(&self) -> impl Iterator<Item = &str> {
        self.values
            .keys()
            .filter(|name| self.details.get(*name).is_some_and(|d| d.announced))
            .map(String::as_str)
    }

    pub fn supported_languages(&self) -> &[String] {
        &self.supported_languages
    }

    fn add_supported_language(&mut self, language: &str) {
        if !self.supported_languages.iter().any(|l| l == language) {
            self.supported_languages.push(language.to_string());
        }
    }

    /// Plain device name used as the app name when no localized one is set
    pub fn set_fallback_app_name(&mut self, name: &str) {
        self.fallback_app_name = Some(name.to_string());
    }

    pub fn fallback_app_name(&self) -> Option<&str> {
        self.fallback_app_name.as_deref()
    }

    fn get_str(&self, name: &str, language: Option<&str>) -> Option<&str> {
        self.get_field(name, language).and_then(BusValue::as_str)
    }

    fn set_str(&mut self, name: &str, value: &str, language: Option<&str>) -> Result<()> {
        self.set_field(name, BusValue::String(value.to_string()), language)
    }

    pub fn set_default_language(&mut self, language: &str) {
        self.values.insert(
            field::DEFAULT_LANGUAGE.to_string(),
            FieldValue::Plain(BusValue::String(language.to_string())),
        );
        self.add_supported_language(language);
    }

    pub fn default_language(&self) -> Option<&str> {
        match self.values.get(field::DEFAULT_LANGUAGE) {
            Some(FieldValue::Plain(value)) => value.as_str(),
            _ => None,
        }
    }

    pub fn set_app_id(&mut self, app_id: &[u8]) {
        self.values.insert(
            field::APP_ID.to_string(),
            FieldValue::Plain(BusValue::ByteArray(bytes::Bytes::copy_from_slice(app_id))),
        );
    }

    pub fn app_id(&self) -> Option<&[u8]> {
        self.get_field(field::APP_ID, None).and_then(BusValue::as_bytes)
    }

    pub fn set_app_name(&mut self, value: &str, language: Option<&str>) -> Result<()> {
        self.set_str(field::APP_NAME, value, language)
    }

    pub fn app_name(&self, language: Option<&str>) -> Option<&str> {
        self.get_str(field::APP_NAME, language)
    }

    pub fn set_device_name(&mut self, value: &str, language: Option<&str>) -> Result<()> {
        self.set_str(field::DEVICE_NAME, value, language)
    }

    pub fn device_name(&self, language: Option<&str>) -> Option<&str> {
        self.get_str(field::DEVICE_NAME, language)
    }

    pub fn set_manufacturer(&mut self, value: &str, language: Option<&str>) -> Result<()> {
        self.set_str(field::MANUFACTURER, value, language)
    }

    pub fn manufacturer(&self, language: Option<&str>) -> Option<&str> {
        self.get_str(field::MANUFACTURER, language)
    }

    pub fn set_description(&mut self, value: &str, language: Option<&str>) -> Result<()> {
        self.set_str(field::DESCRIPTION, value, language)
    }

    pub fn description(&self, language: Option<&str>) -> Option<&str> {
        self.get_str(field::DESCRIPTION, language)
    }

    pub fn set_device_id(&mut self, value: &str) -> Result<()> {
        self.set_str(field::DEVICE_ID, value, None)
    }

    pub fn device_id(&self) -> Option<&str> {
        self.get_str(field::DEVICE_ID, None)
    }

    pub fn set_model_number(&mut self, value: &str) -> Result<()> {
        self.set_str(field::MODEL_NUMBER, value, None)
    }

    pub fn model_number(&self) -> Option<&str> {
        self.get_str(field::MODEL_NUMBER, None)
    }

    pub fn set_date_of_manufacture(&mut self, value: &str) -> Result<()> {
        self.set_str(field::DATE_OF_MANUFACTURE, value, None)
    }

    pub fn date_of_manufacture(&self) -> Option<&str> {
        self.get_str(field::DATE_OF_MANUFACTURE, None)
    }

    pub fn set_software_version(&mut self, value: &str) -> Result<()> {
        self.set_str(field::SOFTWARE_VERSION, value, None)
    }

    pub fn software_version(&self) -> Option<&str> {
        self.get_str(field::SOFTWARE_VERSION, None)
    }

    pub fn set_hardware_version(&mut self, value: &str) -> Result<()> {
        self.set_str(field::HARDWARE_VERSION, value, None)
    }

    pub fn hardware_version(&self) -> Option<&str> {
        self.get_str(field::HARDWARE_VERSION, None)
    }

    pub fn set_support_url(&mut self, value: &str) -> Result<()> {
        self.set_str(field::SUPPORT_URL, value, None)
    }

    pub fn support_url(&self) -> Option<&str> {
        self.get_str(field::SUPPORT_URL, None)
    }

    pub fn set_protocol_independent_id(&mut self, piid: &str) -> Result<()> {
        self.set_str(field::PROTOCOL_INDEPENDENT_ID, piid, None)
    }

    pub fn protocol_independent_id(&self) -> Option<&str> {
        self.get_str(field::PROTOCOL_INDEPENDENT_ID, None)
    }

    /// Check the record against the announcement compatibility rule.
    ///
    /// The default language must be set, every required field must have a
    /// value (localized ones in the default language) and the app id must be
    /// 16 bytes.
    pub fn check_compatible(&self) -> Result<()> {
        let language = self
            .default_language()
            .ok_or_else(|| BridgeError::field(field::DEFAULT_LANGUAGE, "missing"))?;
        for (name, details) in self.details.iter().filter(|(_, d)| d.required) {
            let present = if details.localized {
                self.get_field(name, Some(language)).is_some()
            } else {
                self.values.contains_key(name)
            };
            if !present {
                return Err(BridgeError::field(name, "required field missing"));
            }
        }
        match self.app_id() {
            Some(app_id) if app_id.len() == 16 => Ok(()),
            Some(app_id) => Err(BridgeError::field(
                field::APP_ID,
                format!("expected 16 bytes, have {}", app_id.len()),
            )),
            None => Err(BridgeError::field(field::APP_ID, "missing")),
        }
    }

    pub fn to_json(&self) -> Json {
        let mut map = Map::new();
        for (name, value) in &self.values {
            let json = match value {
                FieldValue::Plain(value) => value.to_json(),
                FieldValue::Localized(entries) => Json::Object(
                    entries
                        .iter()
                        .map(|(language, value)| (language.clone(), value.to_json()))
                        .collect(),
                ),
            };
            map.insert(name.clone(), json);
        }
        map.insert(
            "SupportedLanguages".to_string(),
            Json::Array(
                self.supported_languages
                    .iter()
                    .map(|l| Json::String(l.clone()))
                    .collect(),
            ),
        );
        Json::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_localized_uses_default_language() {
        let mut record = AnnouncementRecord::with_default_language("en");
        record.set_app_name("name", None).unwrap();
        record.set_app_name("nom", Some("fr")).unwrap();
        assert_eq!(record.app_name(None), Some("name"));
        assert_eq!(record.app_name(Some("en")), Some("name"));
        assert_eq!(record.app_name(Some("fr")), Some("nom"));
        assert_eq!(record.supported_languages(), &["en", "fr"]);
    }

    #[test]
    fn test_localized_without_any_language_fails() {
        let mut record = AnnouncementRecord::new();
        assert!(record.set_manufacturer("acme", None).is_err());
    }

    #[test]
    fn test_signature_enforced() {
        let mut record = AnnouncementRecord::new();
        let err = record
            .set_field(field::MODEL_NUMBER, BusValue::Int32(1), None)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Field { .. }));
    }

    #[test]
    fn test_unknown_field_registered() {
        let mut record = AnnouncementRecord::new();
        record
            .set_field("org.example.Count", BusValue::Int32(3), None)
            .unwrap();
        assert_eq!(
            record.field_details("org.example.Count").unwrap().signature,
            "i"
        );
        assert!(is_vendor_field("org.example.Count"));
        assert!(!is_vendor_field(field::SYSTEM_TIME));
        assert!(!is_vendor_field(field::VIRTUAL));
    }

    #[test]
    fn test_field_details_not_redefined() {
        let mut record = AnnouncementRecord::new();
        assert!(record.set_new_field_details("org.example.Count", FieldDetails::new("i")));
        assert!(!record.set_new_field_details("org.example.Count", FieldDetails::new("s")));
        assert_eq!(record.field_details("org.example.Count").unwrap().signature, "i");
    }

    #[test]
    fn test_empty_record_not_compatible() {
        let record = AnnouncementRecord::new();
        assert!(record.check_compatible().is_err());
    }
}
