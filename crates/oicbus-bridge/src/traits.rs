//! Collaborator traits and bridge events

use crate::about::AnnouncementRecord;
use crate::interface::InterfaceDescription;
use crate::{BusError, Result};

/// Bus-protocol session identifier
pub type SessionId = u32;

/// Events from a bridge
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Attachment is connected and bound to its session port
    Attached { device_id: String },
    /// Announcement published
    Announced { device_id: String },
    /// A bus session joined; `sessions` is the count afterwards
    SessionJoined {
        device_id: String,
        session: SessionId,
        sessions: usize,
    },
    /// A bus session was lost; `sessions` is the count afterwards
    SessionLost {
        device_id: String,
        session: SessionId,
        sessions: usize,
    },
    /// First session arrived, objects began observing
    ObservationStarted { device_id: String },
    /// Last session departed or the attachment stopped
    ObservationStopped { device_id: String },
    /// Attachment torn down
    Detached { device_id: String },
    /// Error occurred
    Error(String),
}

/// Bus-protocol stack as seen by one attachment.
///
/// Implementations are driven from the attachment while its lock is held and
/// must not call back into the same attachment.
pub trait BusConnection: Send + Sync {
    /// Start the bus machinery
    fn start(&self) -> std::result::Result<(), BusError>;

    /// Connect to the bus network
    fn connect(&self) -> std::result::Result<(), BusError>;

    /// Bind the advertised session port
    fn bind_session_port(&self, port: u16) -> std::result::Result<(), BusError>;

    /// Register an object at `path` implementing `interfaces`
    fn register_object(&self, path: &str, interfaces: &[String]) -> std::result::Result<(), BusError>;

    fn unregister_object(&self, path: &str);

    /// Create and activate an interface.
    ///
    /// Returns [`BusError::AlreadyExists`] when an interface of the same name
    /// is already defined.
    fn create_interface(&self, iface: &InterfaceDescription) -> std::result::Result<(), BusError>;

    /// Look up a defined interface
    fn interface(&self, name: &str) -> Option<InterfaceDescription>;

    /// Publish the announcement on `port`
    fn announce(&self, port: u16, about: &AnnouncementRecord) -> std::result::Result<(), BusError>;

    /// Withdraw the announcement
    fn unannounce(&self);

    fn disconnect(&self);
}

/// Observation of one resource on the resource-protocol side
pub trait ResourceObserver: Send + Sync {
    /// Begin observing `uri`
    fn observe(&self, uri: &str) -> Result<()>;

    /// Cancel observation of `uri`
    fn cancel_observe(&self, uri: &str) -> Result<()>;
}
