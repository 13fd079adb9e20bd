//! Common test helpers for oicbus tests
//!
//! - `MockBus`: in-memory bus connection that records every call and can be
//!   told to fail any construction step
//! - `RecordingObserver`: counts observe and cancel calls per URI
//! - event draining for bridge event channels

use oicbus_bridge::{
    AnnouncementRecord, BridgeError, BridgeEvent, BusConnection, BusError, InterfaceDescription,
    ResourceObserver,
};
use oicbus_core::{ResourceArray, ResourceRecord, ResourceValue, ValueKind};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

// ============================================================================
// Bus connection
// ============================================================================

/// A bus call recorded by [`MockBus`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusCall {
    Start,
    Connect,
    BindSessionPort(u16),
    RegisterObject(String),
    UnregisterObject(String),
    CreateInterface(String),
    Announce(u16),
    Unannounce,
    Disconnect,
}

/// Construction steps that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailStep {
    Start,
    Connect,
    BindSessionPort,
    RegisterObject,
    CreateInterface,
    Announce,
}

/// In-memory [`BusConnection`]
#[derive(Default)]
pub struct MockBus {
    calls: Mutex<Vec<BusCall>>,
    failures: Mutex<HashSet<FailStep>>,
    interfaces: Mutex<BTreeMap<String, InterfaceDescription>>,
    announcements: Mutex<Vec<AnnouncementRecord>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `step` fail from now on
    pub fn fail(&self, step: FailStep) {
        self.failures.lock().insert(step);
    }

    /// Builder-style [`MockBus::fail`]
    pub fn failing(self, step: FailStep) -> Self {
        self.fail(step);
        self
    }

    /// Define an interface as if another attachment had created it
    pub fn define_interface(&self, iface: InterfaceDescription) {
        self.interfaces.lock().insert(iface.name.clone(), iface);
    }

    pub fn calls(&self) -> Vec<BusCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &BusCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn announcements(&self) -> Vec<AnnouncementRecord> {
        self.announcements.lock().clone()
    }

    fn record(&self, call: BusCall) {
        self.calls.lock().push(call);
    }

    fn check(&self, step: FailStep) -> Result<(), BusError> {
        if self.failures.lock().contains(&step) {
            Err(BusError::Failed(format!("{:?} failed", step)))
        } else {
            Ok(())
        }
    }
}

impl BusConnection for MockBus {
    fn start(&self) -> Result<(), BusError> {
        self.record(BusCall::Start);
        self.check(FailStep::Start)
    }

    fn connect(&self) -> Result<(), BusError> {
        self.record(BusCall::Connect);
        self.check(FailStep::Connect)
    }

    fn bind_session_port(&self, port: u16) -> Result<(), BusError> {
        self.record(BusCall::BindSessionPort(port));
        self.check(FailStep::BindSessionPort)
    }

    fn register_object(&self, path: &str, _interfaces: &[String]) -> Result<(), BusError> {
        self.record(BusCall::RegisterObject(path.to_string()));
        self.check(FailStep::RegisterObject)
    }

    fn unregister_object(&self, path: &str) {
        self.record(BusCall::UnregisterObject(path.to_string()));
    }

    fn create_interface(&self, iface: &InterfaceDescription) -> Result<(), BusError> {
        self.record(BusCall::CreateInterface(iface.name.clone()));
        self.check(FailStep::CreateInterface)?;
        let mut interfaces = self.interfaces.lock();
        if interfaces.contains_key(&iface.name) {
            return Err(BusError::AlreadyExists);
        }
        interfaces.insert(iface.name.clone(), iface.clone());
        Ok(())
    }

    fn interface(&self, name: &str) -> Option<InterfaceDescription> {
        self.interfaces.lock().get(name).cloned()
    }

    fn announce(&self, port: u16, about: &AnnouncementRecord) -> Result<(), BusError> {
        self.record(BusCall::Announce(port));
        self.check(FailStep::Announce)?;
        self.announcements.lock().push(about.clone());
        Ok(())
    }

    fn unannounce(&self) {
        self.record(BusCall::Unannounce);
    }

    fn disconnect(&self) {
        self.record(BusCall::Disconnect);
    }
}

// ============================================================================
// Resource observer
// ============================================================================

/// [`ResourceObserver`] counting calls per URI
#[derive(Default)]
pub struct RecordingObserver {
    observed: Mutex<BTreeMap<String, usize>>,
    cancelled: Mutex<BTreeMap<String, usize>>,
    total: AtomicUsize,
    fail_observe: Mutex<bool>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following observe call fail
    pub fn fail_observe(&self) {
        *self.fail_observe.lock() = true;
    }

    pub fn observed(&self, uri: &str) -> usize {
        self.observed.lock().get(uri).copied().unwrap_or(0)
    }

    pub fn cancelled(&self, uri: &str) -> usize {
        self.cancelled.lock().get(uri).copied().unwrap_or(0)
    }

    /// Observe plus cancel calls over all URIs
    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

impl ResourceObserver for RecordingObserver {
    fn observe(&self, uri: &str) -> oicbus_bridge::Result<()> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.observed.lock().entry(uri.to_string()).or_default() += 1;
        if *self.fail_observe.lock() {
            return Err(BridgeError::Observe(format!("observe {} refused", uri)));
        }
        Ok(())
    }

    fn cancel_observe(&self, uri: &str) -> oicbus_bridge::Result<()> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.cancelled.lock().entry(uri.to_string()).or_default() += 1;
        Ok(())
    }
}

// ============================================================================
// Events and fixtures
// ============================================================================

/// Drain every event currently queued on a bridge event channel
pub fn drain_events(rx: &mut mpsc::UnboundedReceiver<BridgeEvent>) -> Vec<BridgeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// A `{language, value}` record as used by localized arrays
pub fn localized(language: &str, value: &str) -> ResourceRecord {
    ResourceRecord::new()
        .with("language", language)
        .with("value", value)
}

/// A localized string array from `(language, value)` pairs
pub fn localized_array(entries: &[(&str, &str)]) -> ResourceArray {
    let items = entries
        .iter()
        .map(|(language, value)| ResourceValue::Record(localized(language, value)))
        .collect();
    ResourceArray::from_items(ValueKind::Record, items).expect("records form a valid array")
}
