//! Metadata mapping between resource records and the announcement record
//!
//! Four resource record kinds (device, platform, device configuration and
//! platform configuration) map onto one announcement record. The forward
//! direction folds a record into the announcement; the reverse functions
//! build each record back out of an announcement.
//!
//! | resource key | announcement field |
//! |---|---|
//! | `di` | `AppId` (hex transform) |
//! | `dmn` | `Manufacturer` (localized) |
//! | `dmno` | `ModelNumber` |
//! | `ld` | `Description` (localized) |
//! | `piid` | `org.openconnectivity.piid` |
//! | `sv` | `SoftwareVersion` |
//! | `mndt` | `DateOfManufacture` |
//! | `mnfv` | `org.openconnectivity.mnfv` |
//! | `mnhw` | `HardwareVersion` |
//! | `mnml` | `org.openconnectivity.mnml` |
//! | `mnos` | `org.openconnectivity.mnos` |
//! | `mnpv` | `org.openconnectivity.mnpv` |
//! | `mnsl` | `SupportUrl` |
//! | `pi` | `DeviceId` |
//! | `st` | `org.openconnectivity.st` |
//! | `dl` | `DefaultLanguage` |
//! | `ln` | `AppName` (localized) |
//! | `mnpn` | `DeviceName` (localized) |
//! | `x.<name>` | `<name>`, signature derived from the value |

use oicbus_core::identity::app_id_from_device_id;
use oicbus_core::signature::{to_bus, to_native_value};
use oicbus_core::{
    platform_id, protocol_independent_id, BusValue, ResourceArray,
    ResourceRecord, ResourceValue, ValueKind, VENDOR_PREFIX,
};
use tracing::{debug, warn};

use crate::about::{field, is_vendor_field, AnnouncementRecord, FieldDetails, FieldValue};
use crate::{BridgeError, Result};

/// Resource record keys
pub mod key {
    pub const DEVICE_NAME: &str = "n";
    pub const DEVICE_ID: &str = "di";
    pub const MANUFACTURER_NAME: &str = "dmn";
    pub const MODEL_NUMBER: &str = "dmno";
    pub const DESCRIPTION: &str = "ld";
    pub const PROTOCOL_INDEPENDENT_ID: &str = "piid";
    pub const SOFTWARE_VERSION: &str = "sv";
    pub const DATA_MODEL_VERSION: &str = "dmv";

    pub const PLATFORM_ID: &str = "pi";
    pub const PLATFORM_MANUFACTURER: &str = "mnmn";
    pub const MANUFACTURER_URL: &str = "mnml";
    pub const PLATFORM_MODEL_NUMBER: &str = "mnmo";
    pub const DATE_OF_MANUFACTURE: &str = "mndt";
    pub const PLATFORM_VERSION: &str = "mnpv";
    pub const OS_VERSION: &str = "mnos";
    pub const HARDWARE_VERSION: &str = "mnhw";
    pub const FIRMWARE_VERSION: &str = "mnfv";
    pub const SUPPORT_URL: &str = "mnsl";
    pub const SYSTEM_TIME: &str = "st";
    pub const VENDOR_ID: &str = "vid";

    pub const DEFAULT_LANGUAGE: &str = "dl";
    pub const LOCALIZED_NAMES: &str = "ln";
    pub const PLATFORM_NAMES: &str = "mnpn";

    pub const LANGUAGE: &str = "language";
    pub const VALUE: &str = "value";
}

/// Longest platform manufacturer name, in bytes
pub const MAX_MANUFACTURER_NAME_LENGTH: usize = 16;

/// Default data model version of an interface without one
pub const DEFAULT_INTERFACE_VERSION: u32 = 1;

/// Kind of a resource metadata record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Device,
    Platform,
    DeviceConfiguration,
    PlatformConfiguration,
}

impl RecordKind {
    pub fn resource_type(self) -> &'static str {
        match self {
            RecordKind::Device => "oic.wk.d",
            RecordKind::Platform => "oic.wk.p",
            RecordKind::DeviceConfiguration => "oic.wk.con",
            RecordKind::PlatformConfiguration => "oic.wk.con.p",
        }
    }

    pub fn from_resource_type(rt: &str) -> Option<Self> {
        match rt {
            "oic.wk.d" => Some(RecordKind::Device),
            "oic.wk.p" => Some(RecordKind::Platform),
            "oic.wk.con" => Some(RecordKind::DeviceConfiguration),
            "oic.wk.con.p" => Some(RecordKind::PlatformConfiguration),
            _ => None,
        }
    }
}

/// Fold a resource record of the given kind into the announcement.
///
/// Keys absent from the record leave the announcement untouched.
pub fn apply_record(
    about: &mut AnnouncementRecord,
    kind: RecordKind,
    record: &ResourceRecord,
) -> Result<()> {
    debug!(kind = kind.resource_type(), fields = record.len(), "Mapping resource record");
    match kind {
        RecordKind::Device => apply_device(about, record),
        RecordKind::Platform => apply_platform(about, record),
        RecordKind::DeviceConfiguration => apply_device_configuration(about, record),
        RecordKind::PlatformConfiguration => apply_platform_configuration(about, record),
    }
}

fn apply_device(about: &mut AnnouncementRecord, record: &ResourceRecord) -> Result<()> {
    if let Some(name) = record.get_str(key::DEVICE_NAME) {
        about.set_fallback_app_name(name);
    }
    if let Some(di) = record.get_str(key::DEVICE_ID) {
        about.set_app_id(&app_id_from_device_id(di));
    }
    for (language, value) in localized_strings(record, key::MANUFACTURER_NAME) {
        about.set_manufacturer(value, Some(language))?;
    }
    if let Some(value) = record.get_str(key::MODEL_NUMBER) {
        about.set_model_number(value)?;
    }
    for (language, value) in localized_strings(record, key::DESCRIPTION) {
        about.set_description(value, Some(language))?;
    }
    if let Some(value) = record.get_str(key::PROTOCOL_INDEPENDENT_ID) {
        about.set_protocol_independent_id(value)?;
    }
    if let Some(value) = record.get_str(key::SOFTWARE_VERSION) {
        about.set_software_version(value)?;
    }
    apply_vendor_fields(about, record)
}

fn apply_platform(about: &mut AnnouncementRecord, record: &ResourceRecord) -> Result<()> {
    if let Some(value) = record.get_str(key::DATE_OF_MANUFACTURE) {
        about.set_date_of_manufacture(value)?;
    }
    if let Some(value) = record.get_str(key::HARDWARE_VERSION) {
        about.set_hardware_version(value)?;
    }
    if let Some(value) = record.get_str(key::SUPPORT_URL) {
        about.set_support_url(value)?;
    }
    if let Some(value) = record.get_str(key::PLATFORM_ID) {
        about.set_device_id(value)?;
    }
    let namespaced = [
        (key::FIRMWARE_VERSION, field::FIRMWARE_VERSION),
        (key::MANUFACTURER_URL, field::MANUFACTURER_URL),
        (key::OS_VERSION, field::OS_VERSION),
        (key::PLATFORM_VERSION, field::PLATFORM_VERSION),
        (key::SYSTEM_TIME, field::SYSTEM_TIME),
    ];
    for (property, name) in namespaced {
        if let Some(value) = record.get_str(property) {
            about.set_field(name, BusValue::String(value.to_string()), None)?;
        }
    }
    apply_vendor_fields(about, record)
}

fn apply_device_configuration(
    about: &mut AnnouncementRecord,
    record: &ResourceRecord,
) -> Result<()> {
    if let Some(language) = record.get_str(key::DEFAULT_LANGUAGE) {
        about.set_default_language(language);
    }
    for (language, value) in localized_strings(record, key::LOCALIZED_NAMES) {
        about.set_app_name(value, Some(language))?;
    }
    Ok(())
}

fn apply_platform_configuration(
    about: &mut AnnouncementRecord,
    record: &ResourceRecord,
) -> Result<()> {
    for (language, value) in localized_strings(record, key::PLATFORM_NAMES) {
        about.set_device_name(value, Some(language))?;
    }
    Ok(())
}

/// Copy every `x.`-prefixed property into a dynamically typed field
fn apply_vendor_fields(about: &mut AnnouncementRecord, record: &ResourceRecord) -> Result<()> {
    for (name, value) in record {
        let Some(field_name) = name.strip_prefix(VENDOR_PREFIX) else {
            continue;
        };
        if value.is_null() {
            warn!(property = name, "Skipping null vendor property");
            continue;
        }
        if !is_vendor_field(field_name) {
            warn!(property = name, "Skipping vendor property shadowing a standard field");
            continue;
        }
        let (signature, bus_value) = to_bus(value)?;
        debug!(field = field_name, signature = %signature, "Vendor field");
        about.set_new_field_details(field_name, FieldDetails::new(&signature));
        if let Err(e) = about.set_field(field_name, bus_value, None) {
            warn!(property = name, error = %e, "Skipping vendor property");
        }
    }
    Ok(())
}

/// `(language, value)` pairs of a localized string array
fn localized_strings<'a>(
    record: &'a ResourceRecord,
    property: &str,
) -> impl Iterator<Item = (&'a str, &'a str)> {
    record
        .get_array(property)
        .into_iter()
        .flat_map(|array| array.records())
        .filter_map(|entry| Some((entry.get_str(key::LANGUAGE)?, entry.get_str(key::VALUE)?)))
}

/// Fill every unset mandatory field with its default.
///
/// The default language falls back to the first supported language, the app
/// name to the device record's plain name, everything else to empty or zero.
pub fn fill_mandatory_defaults(about: &mut AnnouncementRecord) -> Result<()> {
    if !about.has_field(field::DEFAULT_LANGUAGE) {
        let language = about
            .supported_languages()
            .first()
            .cloned()
            .unwrap_or_default();
        about.set_default_language(&language);
    }
    if !about.has_field(field::APP_NAME) {
        let name = about.fallback_app_name().unwrap_or_default().to_string();
        about.set_app_name(&name, None)?;
    }
    if !about.has_field(field::DESCRIPTION) {
        about.set_description("", None)?;
    }
    if !about.has_field(field::SOFTWARE_VERSION) {
        about.set_software_version("")?;
    }
    if !about.has_field(field::DEVICE_ID) {
        about.set_device_id("")?;
    }
    if !about.has_field(field::MANUFACTURER) {
        about.set_manufacturer("", None)?;
    }
    if !about.has_field(field::MODEL_NUMBER) {
        about.set_model_number("")?;
    }
    if !about.has_field(field::DATE_OF_MANUFACTURE) {
        about.set_date_of_manufacture("")?;
    }
    if !about.has_field(field::HARDWARE_VERSION) {
        about.set_hardware_version("")?;
    }
    if !about.has_field(field::SUPPORT_URL) {
        about.set_support_url("")?;
    }
    if !about.has_field(field::APP_ID) {
        about.set_app_id(&[0u8; 16]);
    }
    Ok(())
}

/// Apply mandatory defaults, then check announcement compatibility
pub fn is_valid(about: &mut AnnouncementRecord) -> bool {
    let result = fill_mandatory_defaults(about).and_then(|_| about.check_compatible());
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "Announcement record not valid");
            false
        }
    }
}

/// One announced object: its path and the interfaces it implements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDescription {
    pub path: String,
    pub interfaces: Vec<String>,
}

impl ObjectDescription {
    pub fn new(path: &str, interfaces: &[&str]) -> Self {
        Self {
            path: path.to_string(),
            interfaces: interfaces.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Build the device record (`oic.wk.d`) of an announced bus device.
///
/// `interface_version` looks up the data model version of an interface;
/// unknown interfaces count as [`DEFAULT_INTERFACE_VERSION`].
pub fn device_properties<F>(
    about: &AnnouncementRecord,
    objects: &[ObjectDescription],
    interface_version: F,
    peer_id: Option<&str>,
) -> Result<ResourceRecord>
where
    F: Fn(&str) -> Option<u32>,
{
    let mut record = ResourceRecord::new();
    if let Some(name) = about.app_name(None) {
        record.set(key::DEVICE_NAME, name);
    }

    let app_id = about.app_id().unwrap_or_default();
    let piid = protocol_independent_id(
        about.protocol_independent_id(),
        peer_id,
        about.device_id(),
        app_id,
    )?;
    record.set(key::PROTOCOL_INDEPENDENT_ID, piid);

    let versions = data_model_versions(objects, interface_version);
    if !versions.is_empty() {
        record.set(key::DATA_MODEL_VERSION, versions.join(","));
    }
    if let Some(FieldValue::Localized(entries)) = about.field(field::DESCRIPTION) {
        record.set(key::DESCRIPTION, localized_array(entries)?);
    }
    if let Some(value) = about.software_version() {
        record.set(key::SOFTWARE_VERSION, value);
    }
    if let Some(FieldValue::Localized(entries)) = about.field(field::MANUFACTURER) {
        record.set(key::MANUFACTURER_NAME, localized_array(entries)?);
    }
    if let Some(value) = about.model_number() {
        record.set(key::MODEL_NUMBER, value);
    }

    let vendor: Vec<&str> = about.field_names().filter(|n| is_vendor_field(n)).collect();
    for name in vendor {
        let Some(value) = about.field(name) else { continue };
        let property = format!("{}{}", VENDOR_PREFIX, name);
        let native = match value {
            FieldValue::Plain(value) => to_native_value(&value.signature(), value)?,
            FieldValue::Localized(entries) => ResourceValue::Array(localized_array(entries)?),
        };
        debug!(field = name, property = %property, "Vendor property");
        record.set(&property, native);
    }
    Ok(record)
}

/// `<interface>.<version>` for every announced interface, first appearance wins
fn data_model_versions<F>(objects: &[ObjectDescription], interface_version: F) -> Vec<String>
where
    F: Fn(&str) -> Option<u32>,
{
    let mut seen: Vec<&str> = Vec::new();
    for iface in objects.iter().flat_map(|o| o.interfaces.iter()) {
        if !seen.contains(&iface.as_str()) {
            seen.push(iface);
        }
    }
    seen.into_iter()
        .map(|iface| {
            let version = interface_version(iface).unwrap_or(DEFAULT_INTERFACE_VERSION);
            format!("{}.{}", iface, version)
        })
        .collect()
}

/// Build the platform record (`oic.wk.p`) of an announced bus device
pub fn platform_properties(about: &AnnouncementRecord) -> Result<ResourceRecord> {
    let mut record = ResourceRecord::new();
    record.set(key::PLATFORM_ID, platform_id(about.device_id())?);

    if let Some(manufacturer) = about.manufacturer(None) {
        record.set(
            key::PLATFORM_MANUFACTURER,
            truncate(manufacturer, MAX_MANUFACTURER_NAME_LENGTH),
        );
    }
    let fields = [
        (key::MANUFACTURER_URL, field::MANUFACTURER_URL),
        (key::PLATFORM_MODEL_NUMBER, field::MODEL_NUMBER),
        (key::DATE_OF_MANUFACTURE, field::DATE_OF_MANUFACTURE),
        (key::PLATFORM_VERSION, field::PLATFORM_VERSION),
        (key::OS_VERSION, field::OS_VERSION),
        (key::HARDWARE_VERSION, field::HARDWARE_VERSION),
        (key::FIRMWARE_VERSION, field::FIRMWARE_VERSION),
        (key::SUPPORT_URL, field::SUPPORT_URL),
        (key::SYSTEM_TIME, field::SYSTEM_TIME),
        (key::VENDOR_ID, field::DEVICE_ID),
    ];
    for (property, name) in fields {
        if let Some(value) = about.get_field(name, None).and_then(BusValue::as_str) {
            record.set(property, value);
        }
    }
    Ok(record)
}

/// Build the device configuration record (`oic.wk.con`)
pub fn device_configuration_properties(about: &AnnouncementRecord) -> Result<ResourceRecord> {
    let mut record = ResourceRecord::new();
    if let Some(name) = about.app_name(None) {
        record.set(key::DEVICE_NAME, name);
    }
    if let Some(language) = about.default_language() {
        record.set(key::DEFAULT_LANGUAGE, language);
    }
    if let Some(FieldValue::Localized(entries)) = about.field(field::APP_NAME) {
        record.set(key::LOCALIZED_NAMES, localized_array(entries)?);
    }
    Ok(record)
}

/// Build the platform configuration record (`oic.wk.con.p`)
pub fn platform_configuration_properties(about: &AnnouncementRecord) -> Result<ResourceRecord> {
    let mut record = ResourceRecord::new();
    if let Some(FieldValue::Localized(entries)) = about.field(field::DEVICE_NAME) {
        record.set(key::PLATFORM_NAMES, localized_array(entries)?);
    }
    Ok(record)
}

/// Localized values as an array of `{language, value}` records
fn localized_array(entries: &[(String, BusValue)]) -> Result<ResourceArray> {
    let items = entries
        .iter()
        .map(|(language, value)| {
            let native = to_native_value(&value.signature(), value)?;
            Ok(ResourceValue::Record(
                ResourceRecord::new()
                    .with(key::LANGUAGE, language.as_str())
                    .with(key::VALUE, native),
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    ResourceArray::from_items(ValueKind::Record, items).map_err(BridgeError::from)
}

/// Truncate to at most `max` bytes on a character boundary
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
