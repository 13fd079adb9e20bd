//! Virtual bus objects

use oicbus_core::name::{check_name, to_bus_name, uri_to_object_path};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::interface::InterfaceDescription;
use crate::traits::ResourceObserver;
use crate::Result;

/// Lightweight handle identifying the attachment that owns an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentHandle(Uuid);

impl AttachmentHandle {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for AttachmentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One bridged resource exposed as a bus object
pub struct VirtualObject {
    path: String,
    uri: String,
    interfaces: Vec<String>,
    /// Property name to bus signature
    properties: BTreeMap<String, String>,
    owner: Option<AttachmentHandle>,
    observer: Arc<dyn ResourceObserver>,
    observing: bool,
}

impl VirtualObject {
    /// Create an object for the resource at `uri` implementing the resource
    /// types `interfaces`.
    ///
    /// The path derives from the URI and the interface names are translated
    /// to bus names.
    pub fn new(uri: &str, interfaces: Vec<String>, observer: Arc<dyn ResourceObserver>) -> Self {
        Self {
            path: uri_to_object_path(uri),
            uri: uri.to_string(),
            interfaces: interfaces.iter().map(|i| to_bus_name(i)).collect(),
            properties: BTreeMap::new(),
            owner: None,
            observer,
            observing: false,
        }
    }

    /// Add a created bus interface along with the signatures of its properties
    pub fn with_interface(mut self, iface: &InterfaceDescription) -> Self {
        if !self.interfaces.contains(&iface.name) {
            self.interfaces.push(iface.name.clone());
        }
        for property in &iface.properties {
            self.add_property(&property.name, &property.signature);
        }
        self
    }

    /// Reject interface names that are not valid bus names
    pub(crate) fn check_interfaces(&self) -> Result<()> {
        for iface in &self.interfaces {
            check_name(iface)?;
        }
        Ok(())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn add_property(&mut self, name: &str, signature: &str) {
        self.properties.insert(name.to_string(), signature.to_string());
    }

    pub fn property_signature(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn owner(&self) -> Option<AttachmentHandle> {
        self.owner
    }

    pub(crate) fn set_owner(&mut self, owner: AttachmentHandle) {
        self.owner = Some(owner);
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    /// Begin observing the underlying resource
    pub fn observe(&mut self) -> Result<()> {
        debug!(path = %self.path, uri = %self.uri, "Observe");
        self.observer.observe(&self.uri)?;
        self.observing = true;
        Ok(())
    }

    /// Stop observing the underlying resource
    pub fn cancel_observation(&mut self) -> Result<()> {
        debug!(path = %self.path, uri = %self.uri, "Cancel observation");
        self.observing = false;
        self.observer.cancel_observe(&self.uri)
    }
}

impl fmt::Debug for VirtualObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualObject")
            .field("path", &self.path)
            .field("uri", &self.uri)
            .field("interfaces", &self.interfaces)
            .field("properties", &self.properties)
            .field("owner", &self.owner)
            .field("observing", &self.observing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::derive_interface;
    use oicbus_core::ResourceRecord;

    struct Idle;

    impl ResourceObserver for Idle {
        fn observe(&self, _uri: &str) -> Result<()> {
            Ok(())
        }
        fn cancel_observe(&self, _uri: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_interfaces_translated() {
        let object = VirtualObject::new(
            "/a/light",
            vec!["x.org.example.my-light".into(), "oic.r.switch.binary".into()],
            Arc::new(Idle),
        );
        assert_eq!(object.interfaces(), ["org.example.my_light", "oic.r.switch.binary"]);
        assert!(object.check_interfaces().is_ok());
    }

    #[test]
    fn test_invalid_interface_rejected() {
        let object = VirtualObject::new("/a/light", vec!["x.light".into()], Arc::new(Idle));
        assert!(object.check_interfaces().is_err());
    }

    #[test]
    fn test_properties_from_interface() {
        let rep = ResourceRecord::new().with("on-off", true).with("level", 3i64);
        let iface = derive_interface("oic.r.light", &rep, true).unwrap();
        let object = VirtualObject::new("/a/light", vec!["oic.r.light".into()], Arc::new(Idle))
            .with_interface(&iface);
        assert_eq!(object.interfaces(), ["oic.r.light"]);
        assert_eq!(object.property_signature("on_off"), Some("b"));
        assert_eq!(object.property_signature("level"), Some("i"));
        assert_eq!(object.property_signature("missing"), None);
    }
}
