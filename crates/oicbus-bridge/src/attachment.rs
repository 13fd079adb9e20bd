//! Per-device bus attachment
//!
//! A [`BridgeAttachment`] is the bus-protocol presence of one bridged device.
//! It owns the announcement record and the registered [`VirtualObject`]s,
//! counts active bus sessions and starts or stops observation of the
//! underlying resources when the first session arrives or the last departs.
//!
//! All mutable state sits behind one lock held for the full duration of each
//! operation, including the observation calls issued to child objects.
//! Observers must therefore never call back into the attachment that drives
//! them.

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use oicbus_core::identity::app_id_from_device_id;
use oicbus_core::{BusValue, ResourceRecord};

use crate::about::{field, AnnouncementRecord, FieldDetails};
use crate::config::AttachmentConfig;
use crate::interface::{bus_interface, derive_interface, InterfaceDescription, Payload, DEVICE_TYPE_PREFIX};
use crate::metadata::{self, RecordKind};
use crate::object::{AttachmentHandle, VirtualObject};
use crate::traits::{BridgeEvent, BusConnection, SessionId};
use crate::{BridgeError, BusError, Result};

/// Attachment lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    Initializing,
    Connected,
    Announced,
    Stopped,
}

impl fmt::Display for AttachmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttachmentState::Initializing => "initializing",
            AttachmentState::Connected => "connected",
            AttachmentState::Announced => "announced",
            AttachmentState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

struct Inner {
    state: AttachmentState,
    about: AnnouncementRecord,
    /// Registration order
    objects: Vec<VirtualObject>,
    sessions: usize,
    announced: bool,
    destroyed: bool,
}

/// One bus-protocol presence for one bridged device
pub struct BridgeAttachment {
    handle: AttachmentHandle,
    config: AttachmentConfig,
    bus: Arc<dyn BusConnection>,
    events: Option<mpsc::UnboundedSender<BridgeEvent>>,
    inner: Mutex<Inner>,
}

impl BridgeAttachment {
    /// Bring up an attachment: start the bus, connect and bind the session
    /// port.
    ///
    /// Any failing step disconnects the bus again and the attachment is not
    /// returned.
    pub fn create(
        config: AttachmentConfig,
        bus: Arc<dyn BusConnection>,
        events: Option<mpsc::UnboundedSender<BridgeEvent>>,
    ) -> Result<Self> {
        let about = initial_record(&config)?;
        let attachment = Self {
            handle: AttachmentHandle::new(),
            config,
            bus,
            events,
            inner: Mutex::new(Inner {
                state: AttachmentState::Initializing,
                about,
                objects: Vec::new(),
                sessions: 0,
                announced: false,
                destroyed: false,
            }),
        };

        if let Err((step, source)) = attachment.bring_up() {
            error!(device_id = %attachment.config.device_id, step, error = %source, "Attachment construction failed");
            attachment.bus.disconnect();
            attachment.inner.lock().destroyed = true;
            let err = BridgeError::Construction { step, source };
            attachment.emit(BridgeEvent::Error(err.to_string()));
            return Err(err);
        }

        attachment.inner.lock().state = AttachmentState::Connected;
        info!(device_id = %attachment.config.device_id, handle = %attachment.handle, "Attachment connected");
        attachment.emit(BridgeEvent::Attached {
            device_id: attachment.config.device_id.clone(),
        });
        Ok(attachment)
    }

    fn bring_up(&self) -> std::result::Result<(), (&'static str, BusError)> {
        self.bus.start().map_err(|e| ("start", e))?;
        self.bus.connect().map_err(|e| ("connect", e))?;
        self.bus
            .bind_session_port(self.config.session_port)
            .map_err(|e| ("bind session port", e))?;
        Ok(())
    }

    fn emit(&self, event: BridgeEvent) {
        if let Some(events) = &self.events {
            // A closed receiver only means nobody is listening
            let _ = events.send(event);
        }
    }

    pub fn handle(&self) -> AttachmentHandle {
        self.handle
    }

    pub fn device_id(&self) -> &str {
        &self.config.device_id
    }

    pub fn protocol_independent_id(&self) -> Option<&str> {
        self.config.protocol_independent_id.as_deref()
    }

    pub fn is_golden_unit(&self) -> bool {
        self.config.golden_unit
    }

    pub fn session_port(&self) -> u16 {
        self.config.session_port
    }

    pub fn state(&self) -> AttachmentState {
        self.inner.lock().state
    }

    pub fn sessions(&self) -> usize {
        self.inner.lock().sessions
    }

    pub fn is_announced(&self) -> bool {
        self.inner.lock().announced
    }

    /// Snapshot of the announcement record
    pub fn announcement(&self) -> AnnouncementRecord {
        self.inner.lock().about.clone()
    }

    /// Paths of the registered objects in registration order
    pub fn object_paths(&self) -> Vec<String> {
        self.inner
            .lock()
            .objects
            .iter()
            .map(|o| o.path().to_string())
            .collect()
    }

    /// Look up a registered object by path.
    ///
    /// The attachment stays locked while the returned guard is alive.
    pub fn object(&self, path: &str) -> Option<MappedMutexGuard<'_, VirtualObject>> {
        MutexGuard::try_map(self.inner.lock(), |inner| {
            inner.objects.iter_mut().find(|o| o.path() == path)
        })
        .ok()
    }

    /// Register an object with the bus and add it to the registry.
    ///
    /// Objects whose interface names are not valid bus names are rejected
    /// before the bus sees them.
    pub fn register_object(&self, mut object: VirtualObject) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.destroyed || inner.state == AttachmentState::Stopped {
            return Err(BridgeError::InvalidState {
                op: "register object",
                state: inner.state,
            });
        }
        object.check_interfaces()?;
        if let Err(e) = self.bus.register_object(object.path(), object.interfaces()) {
            error!(device_id = %self.config.device_id, path = object.path(), error = %e, "Object registration failed");
            return Err(e.into());
        }
        object.set_owner(self.handle);
        info!(device_id = %self.config.device_id, path = object.path(), "Registered object");
        inner.objects.push(object);
        Ok(())
    }

    /// Remove a registered object, cancelling its observation first
    pub fn unregister_object(&self, path: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let index = inner
            .objects
            .iter()
            .position(|o| o.path() == path)
            .ok_or_else(|| BridgeError::ObjectNotFound(path.to_string()))?;
        let mut object = inner.objects.remove(index);
        if object.is_observing() {
            if let Err(e) = object.cancel_observation() {
                warn!(path, error = %e, "Cancel observation failed");
            }
        }
        self.bus.unregister_object(path);
        info!(device_id = %self.config.device_id, path, "Unregistered object");
        Ok(())
    }

    /// Create the bus interface for resource type `resource_type` from a
    /// resource payload.
    ///
    /// The interface and its members carry translated bus names. An interface
    /// that already exists on the bus is returned as defined there.
    /// Non-representation payloads are ignored and yield `None`, except for
    /// device-type interfaces which are always empty.
    pub fn create_interface(
        &self,
        resource_type: &str,
        payload: &Payload,
    ) -> Result<Option<InterfaceDescription>> {
        let _inner = self.inner.lock();
        let iface = match payload.as_representation() {
            Some(rep) => derive_interface(resource_type, rep, self.config.emits_changed)?,
            None if resource_type.starts_with(DEVICE_TYPE_PREFIX) => bus_interface(resource_type)?,
            None => {
                warn!(interface = resource_type, "Ignoring non-representation payload");
                return Ok(None);
            }
        };
        let name = iface.name.clone();
        match self.bus.create_interface(&iface) {
            Ok(()) => Ok(Some(iface)),
            Err(BusError::AlreadyExists) => {
                debug!(interface = %name, "Interface already exists");
                self.bus
                    .interface(&name)
                    .map(Some)
                    .ok_or_else(|| BusError::Failed(format!("interface {} vanished", name)).into())
            }
            Err(e) => {
                error!(interface = %name, error = %e, "Interface creation failed");
                Err(e.into())
            }
        }
    }

    /// Fold a resource metadata record into the announcement record
    pub fn update_announcement(&self, kind: RecordKind, record: &ResourceRecord) -> Result<()> {
        let mut inner = self.inner.lock();
        metadata::apply_record(&mut inner.about, kind, record)
    }

    /// Publish the announcement.
    ///
    /// Each call publishes again; callers announce once.
    pub fn announce(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            AttachmentState::Connected | AttachmentState::Announced => {}
            state => {
                return Err(BridgeError::InvalidState {
                    op: "announce",
                    state,
                })
            }
        }
        metadata::fill_mandatory_defaults(&mut inner.about)?;
        inner.about.check_compatible()?;
        if let Err(e) = self.bus.announce(self.config.session_port, &inner.about) {
            error!(device_id = %self.config.device_id, error = %e, "Announce failed");
            return Err(e.into());
        }
        inner.state = AttachmentState::Announced;
        inner.announced = true;
        info!(device_id = %self.config.device_id, port = self.config.session_port, "Announced");
        drop(inner);
        self.emit(BridgeEvent::Announced {
            device_id: self.config.device_id.clone(),
        });
        Ok(())
    }

    /// Decide whether a peer may join a session; always accepted here
    pub fn accept_join(&self, port: u16, peer: &str) -> bool {
        debug!(device_id = %self.config.device_id, port, peer, "Accepting session join");
        true
    }

    /// A session joined; the first one starts observation on every object
    pub fn session_joined(&self, session: SessionId) {
        let mut inner = self.inner.lock();
        inner.sessions += 1;
        let sessions = inner.sessions;
        info!(device_id = %self.config.device_id, session, sessions, "Session joined");
        let started = sessions == 1;
        let mut failures = Vec::new();
        if started {
            for object in inner.objects.iter_mut() {
                if let Err(e) = object.observe() {
                    warn!(path = object.path(), error = %e, "Observe failed");
                    failures.push(format!("observe {}: {}", object.path(), e));
                }
            }
        }
        drop(inner);
        for failure in failures {
            self.emit(BridgeEvent::Error(failure));
        }
        self.emit(BridgeEvent::SessionJoined {
            device_id: self.config.device_id.clone(),
            session,
            sessions,
        });
        if started {
            self.emit(BridgeEvent::ObservationStarted {
                device_id: self.config.device_id.clone(),
            });
        }
    }

    /// A session was lost; the last one stops observation on every object
    pub fn session_lost(&self, session: SessionId) {
        let mut inner = self.inner.lock();
        debug_assert!(inner.sessions > 0, "session lost without a joined session");
        let Some(sessions) = inner.sessions.checked_sub(1) else {
            error!(device_id = %self.config.device_id, session, "Session lost without a joined session");
            return;
        };
        inner.sessions = sessions;
        info!(device_id = %self.config.device_id, session, sessions, "Session lost");
        let stopped = sessions == 0;
        if stopped {
            cancel_all(&mut inner.objects);
        }
        drop(inner);
        self.emit(BridgeEvent::SessionLost {
            device_id: self.config.device_id.clone(),
            session,
            sessions,
        });
        if stopped {
            self.emit(BridgeEvent::ObservationStopped {
                device_id: self.config.device_id.clone(),
            });
        }
    }

    /// Stop observation on every object without waiting for sessions to drain
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        cancel_all(&mut inner.objects);
        inner.state = AttachmentState::Stopped;
        info!(device_id = %self.config.device_id, "Attachment stopped");
        drop(inner);
        self.emit(BridgeEvent::ObservationStopped {
            device_id: self.config.device_id.clone(),
        });
    }

    /// Release the announcement and every registered object
    pub fn destroy(&self) {
        let mut inner = self.inner.lock();
        if inner.destroyed {
            return;
        }
        if inner.announced {
            self.bus.unannounce();
            inner.announced = false;
        }
        for object in inner.objects.drain(..) {
            self.bus.unregister_object(object.path());
        }
        self.bus.disconnect();
        inner.state = AttachmentState::Stopped;
        inner.destroyed = true;
        info!(device_id = %self.config.device_id, "Attachment destroyed");
        drop(inner);
        self.emit(BridgeEvent::Detached {
            device_id: self.config.device_id.clone(),
        });
    }
}

fn cancel_all(objects: &mut [VirtualObject]) {
    for object in objects.iter_mut() {
        if let Err(e) = object.cancel_observation() {
            warn!(path = object.path(), error = %e, "Cancel observation failed");
        }
    }
}

/// Announcement record of a fresh attachment: every mandatory field empty,
/// the app id derived from the device id.
fn initial_record(config: &AttachmentConfig) -> Result<AnnouncementRecord> {
    let mut about = AnnouncementRecord::with_default_language(&config.default_language);
    about.set_description("", None)?;
    about.set_software_version("")?;
    about.set_device_id("")?;
    about.set_manufacturer("", None)?;
    about.set_model_number("")?;
    about.set_date_of_manufacture("")?;
    about.set_hardware_version("")?;
    about.set_support_url("")?;
    about.set_app_name("", None)?;
    about.set_app_id(&app_id_from_device_id(&config.device_id));
    if let Some(piid) = &config.protocol_independent_id {
        about.set_protocol_independent_id(piid)?;
    }
    if !config.golden_unit {
        about.set_new_field_details(field::VIRTUAL, FieldDetails::new("b").announced());
        about.set_field(field::VIRTUAL, BusValue::Bool(true), None)?;
    }
    Ok(about)
}

impl Drop for BridgeAttachment {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for BridgeAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("BridgeAttachment")
            .field("device_id", &self.config.device_id)
            .field("handle", &self.handle)
            .field("state", &inner.state)
            .field("sessions", &inner.sessions)
            .field("objects", &inner.objects.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ResourceObserver;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct NullBus;

    impl BusConnection for NullBus {
        fn start(&self) -> std::result::Result<(), BusError> {
            Ok(())
        }
        fn connect(&self) -> std::result::Result<(), BusError> {
            Ok(())
        }
        fn bind_session_port(&self, _port: u16) -> std::result::Result<(), BusError> {
            Ok(())
        }
        fn register_object(&self, _path: &str, _interfaces: &[String]) -> std::result::Result<(), BusError> {
            Ok(())
        }
        fn unregister_object(&self, _path: &str) {}
        fn create_interface(&self, _iface: &InterfaceDescription) -> std::result::Result<(), BusError> {
            Ok(())
        }
        fn interface(&self, _name: &str) -> Option<InterfaceDescription> {
            None
        }
        fn announce(&self, _port: u16, _about: &AnnouncementRecord) -> std::result::Result<(), BusError> {
            Ok(())
        }
        fn unannounce(&self) {}
        fn disconnect(&self) {}
    }

    #[derive(Default)]
    struct CountingObserver {
        observed: AtomicUsize,
        cancelled: AtomicUsize,
    }

    impl ResourceObserver for CountingObserver {
        fn observe(&self, _uri: &str) -> Result<()> {
            self.observed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn cancel_observe(&self, _uri: &str) -> Result<()> {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn attachment() -> BridgeAttachment {
        BridgeAttachment::create(AttachmentConfig::new("dev"), Arc::new(NullBus), None).unwrap()
    }

    #[test]
    fn test_initial_record() {
        let attachment = BridgeAttachment::create(
            AttachmentConfig::new("7d529297-6f9f-83e8-aec0-72dd5392b584"),
            Arc::new(NullBus),
            None,
        )
        .unwrap();
        let about = attachment.announcement();
        assert_eq!(about.app_id().unwrap()[0], 0x7d);
        assert_eq!(about.manufacturer(None), Some(""));
        assert_eq!(
            about.get_field(field::VIRTUAL, None),
            Some(&BusValue::Bool(true))
        );
        assert_eq!(attachment.state(), AttachmentState::Connected);
    }

    #[test]
    fn test_golden_unit_has_no_virtual_marker() {
        let mut config = AttachmentConfig::new("dev");
        config.golden_unit = true;
        let attachment = BridgeAttachment::create(config, Arc::new(NullBus), None).unwrap();
        assert!(!attachment.announcement().has_field(field::VIRTUAL));
    }

    #[test]
    fn test_object_lookup() {
        let attachment = attachment();
        let observer = Arc::new(CountingObserver::default());
        attachment
            .register_object(VirtualObject::new("/a/light", vec![], observer))
            .unwrap();
        let object = attachment.object("/a/light").unwrap();
        assert_eq!(object.owner(), Some(attachment.handle()));
        drop(object);
        assert!(attachment.object("/a/missing").is_none());
    }

    #[test]
    fn test_stop_cancels_without_draining() {
        let attachment = attachment();
        let observer = Arc::new(CountingObserver::default());
        attachment
            .register_object(VirtualObject::new("/a/light", vec![], observer.clone()))
            .unwrap();
        attachment.session_joined(1);
        attachment.stop();
        assert_eq!(observer.cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(attachment.sessions(), 1);
        assert_eq!(attachment.state(), AttachmentState::Stopped);
        assert!(attachment.announce().is_err());
    }

    #[test]
    fn test_destroy_releases_objects() {
        let attachment = attachment();
        let observer = Arc::new(CountingObserver::default());
        attachment
            .register_object(VirtualObject::new("/a/light", vec![], observer))
            .unwrap();
        attachment.announce().unwrap();
        attachment.destroy();
        assert!(attachment.object_paths().is_empty());
        assert!(!attachment.is_announced());
    }
}
