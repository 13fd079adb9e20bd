//! Bus/resource protocol bridge
//!
//! Exposes resource-protocol devices as virtual bus-protocol presences:
//! - announcement records and their mapping from resource metadata
//! - bus interfaces derived from resource representations
//! - per-device attachments with session-driven observation
//! - the process-wide [`Bridge`] owning all attachments

pub mod about;
pub mod attachment;
pub mod bridge;
pub mod config;
pub mod error;
pub mod interface;
pub mod metadata;
pub mod object;
pub mod traits;

pub use about::{AnnouncementRecord, FieldDetails, FieldValue};
pub use attachment::{AttachmentState, BridgeAttachment};
pub use bridge::Bridge;
pub use config::{AttachmentConfig, BridgeConfig};
pub use error::{BridgeError, BusError, Result};
pub use interface::{derive_interface, InterfaceDescription, Payload, PropertyDescription};
pub use metadata::{ObjectDescription, RecordKind};
pub use object::{AttachmentHandle, VirtualObject};
pub use traits::{BridgeEvent, BusConnection, ResourceObserver, SessionId};
