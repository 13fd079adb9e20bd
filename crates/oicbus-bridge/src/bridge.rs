//! Bridge process state
//!
//! [`Bridge`] owns what the whole process shares: the server instance id, the
//! configuration and the attachments keyed by device id. It is created once
//! at startup and shut down explicitly.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::attachment::BridgeAttachment;
use crate::config::BridgeConfig;
use crate::traits::{BridgeEvent, BusConnection};
use crate::{BridgeError, BusError, Result};

pub struct Bridge {
    instance_id: String,
    config: BridgeConfig,
    attachments: DashMap<String, Arc<BridgeAttachment>>,
    events: mpsc::UnboundedSender<BridgeEvent>,
}

impl Bridge {
    /// Create the bridge and the receiver for its events.
    ///
    /// The instance id comes from the configuration or is generated once here.
    pub fn new(config: BridgeConfig) -> (Self, mpsc::UnboundedReceiver<BridgeEvent>) {
        let instance_id = config
            .instance_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let (tx, rx) = mpsc::unbounded_channel();
        info!(instance_id = %instance_id, "Bridge initialised");
        let bridge = Self {
            instance_id,
            config,
            attachments: DashMap::new(),
            events: tx,
        };
        (bridge, rx)
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Attach a discovered device over `bus`.
    ///
    /// Golden units come from the configuration. A device id that is already
    /// attached is rejected.
    pub fn attach(
        &self,
        device_id: &str,
        protocol_independent_id: Option<&str>,
        bus: Arc<dyn BusConnection>,
    ) -> Result<Arc<BridgeAttachment>> {
        match self.attachments.entry(device_id.to_string()) {
            Entry::Occupied(_) => Err(BridgeError::Construction {
                step: "attach",
                source: BusError::AlreadyExists,
            }),
            Entry::Vacant(slot) => {
                let config = self.config.attachment(device_id, protocol_independent_id);
                let attachment =
                    BridgeAttachment::create(config, bus, Some(self.events.clone()))?;
                Ok(slot.insert(Arc::new(attachment)).value().clone())
            }
        }
    }

    pub fn attachment(&self, device_id: &str) -> Option<Arc<BridgeAttachment>> {
        self.attachments.get(device_id).map(|a| a.value().clone())
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.attachments.iter().map(|a| a.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }

    /// Stop and destroy the attachment of a removed device
    pub fn detach(&self, device_id: &str) -> bool {
        match self.attachments.remove(device_id) {
            Some((_, attachment)) => {
                attachment.stop();
                attachment.destroy();
                true
            }
            None => false,
        }
    }

    /// Stop every attachment, then destroy them all
    pub fn shutdown(&self) {
        let attachments: Vec<Arc<BridgeAttachment>> =
            self.attachments.iter().map(|a| a.value().clone()).collect();
        for attachment in &attachments {
            attachment.stop();
        }
        for attachment in &attachments {
            attachment.destroy();
        }
        self.attachments.clear();
        info!(instance_id = %self.instance_id, count = attachments.len(), "Bridge shut down");
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if !self.attachments.is_empty() {
            self.shutdown();
        }
    }
}
