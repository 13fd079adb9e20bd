//! Bus interface descriptions derived from resource representations

use oicbus_core::name::{to_bus_interface_name, to_bus_member_name};
use oicbus_core::{signature_of, ResourceRecord};
use tracing::debug;

use crate::Result;

/// Annotation controlling property change signals
pub const EMITS_CHANGED_ANNOTATION: &str = "org.freedesktop.DBus.Property.EmitsChangedSignal";

/// Annotation carrying an interface's data model version
pub const VERSION_ANNOTATION: &str = "org.gtk.GDBus.Since";

/// Interface names with this prefix are device types and carry no members
pub const DEVICE_TYPE_PREFIX: &str = "oic.d.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescription {
    pub name: String,
    pub signature: String,
    pub access: Access,
    pub annotations: Vec<(String, String)>,
}

impl PropertyDescription {
    pub fn annotation(&self, name: &str) -> Option<&str> {
        find_annotation(&self.annotations, name)
    }
}

/// A bus interface: a name, its properties and annotations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescription {
    pub name: String,
    pub properties: Vec<PropertyDescription>,
    pub annotations: Vec<(String, String)>,
}

impl InterfaceDescription {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            properties: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn with_annotation(mut self, name: &str, value: &str) -> Self {
        self.annotations.push((name.to_string(), value.to_string()));
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescription> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn annotation(&self, name: &str) -> Option<&str> {
        find_annotation(&self.annotations, name)
    }

    /// Data model version from the version annotation, when it parses
    pub fn version(&self) -> Option<u32> {
        self.annotation(VERSION_ANNOTATION)?.parse().ok()
    }

    pub fn is_device_type(&self) -> bool {
        self.name.starts_with(DEVICE_TYPE_PREFIX)
    }
}

fn find_annotation<'a>(annotations: &'a [(String, String)], name: &str) -> Option<&'a str> {
    annotations
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

/// A payload handed over by the resource-protocol stack
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Representation(ResourceRecord),
    Discovery,
    Presence,
    Security,
}

impl Payload {
    pub fn as_representation(&self) -> Option<&ResourceRecord> {
        match self {
            Payload::Representation(record) => Some(record),
            _ => None,
        }
    }
}

/// Empty interface named after a resource type, translated to a bus name
pub fn bus_interface(resource_type: &str) -> Result<InterfaceDescription> {
    Ok(InterfaceDescription::new(&to_bus_interface_name(resource_type)?))
}

/// Derive an interface from a resource representation.
///
/// The resource type and every property name are translated to bus names
/// and rejected when the result is not a valid bus name. Each value becomes a
/// read-write property typed by its derived signature and annotated with
/// whether it emits change signals. Device-type names yield an empty
/// interface.
pub fn derive_interface(
    resource_type: &str,
    representation: &ResourceRecord,
    emits_changed: bool,
) -> Result<InterfaceDescription> {
    let mut iface = bus_interface(resource_type)?;
    if iface.is_device_type() {
        return Ok(iface);
    }
    let emits = if emits_changed { "true" } else { "false" };
    for (property, value) in representation {
        let member = to_bus_member_name(property)?;
        let signature = signature_of(value)?;
        debug!(interface = %iface.name, property = %member, signature = %signature, "Interface property");
        iface.properties.push(PropertyDescription {
            name: member,
            signature,
            access: Access::ReadWrite,
            annotations: vec![(EMITS_CHANGED_ANNOTATION.to_string(), emits.to_string())],
        });
    }
    Ok(iface)
}
