//! Bridge error types

use thiserror::Error;

use crate::attachment::AttachmentState;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors reported by the bus-protocol stack
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("already exists")]
    AlreadyExists,

    #[error("{0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("attachment construction failed at {step}: {source}")]
    Construction {
        step: &'static str,
        #[source]
        source: BusError,
    },

    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("observe error: {0}")]
    Observe(String),

    #[error("cannot {op} while {state}")]
    InvalidState {
        op: &'static str,
        state: AttachmentState,
    },

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("field {name}: {reason}")]
    Field { name: String, reason: String },

    #[error("translation error: {0}")]
    Translation(#[from] oicbus_core::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub(crate) fn field(name: &str, reason: impl Into<String>) -> Self {
        BridgeError::Field {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
