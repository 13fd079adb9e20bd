//! oicbus Core
//!
//! Protocol-independent translation primitives for the oicbus bridge.
//!
//! This crate provides:
//! - Closed value models for both sides of the bridge ([`ResourceValue`], [`BusValue`])
//! - Name grammar translation and validation ([`name`])
//! - Bus type-signature derivation and value conversion ([`signature`])
//! - Deterministic identifier derivation ([`identity`])

pub mod error;
pub mod identity;
pub mod name;
pub mod signature;
pub mod value;

pub use error::{Error, Result};
pub use identity::{platform_id, protocol_independent_id, UUID_STRING_SIZE};
pub use name::{is_valid_name, to_bus_name, to_resource_name};
pub use signature::{signature_of, to_bus_value, to_native_value};
pub use value::{BusValue, ResourceArray, ResourceRecord, ResourceValue, ValueKind};

/// Maximum number of dimensions of a resource-protocol array
pub const MAX_ARRAY_DEPTH: usize = 3;

/// Leading segment marking a vendor-defined resource-protocol name
pub const VENDOR_PREFIX: &str = "x.";
