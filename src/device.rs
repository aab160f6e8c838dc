//! Device snapshots and the device registry
//!
//! A [`Device`] copies the metadata of a host port at the time of the
//! snapshot and keeps the port itself only to forward `open`/`close`.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::host::{HostPort, PortKind};

/// Snapshot of a MIDI endpoint
#[derive(Clone, Serialize)]
pub struct Device {
    /// Stable identifier of the endpoint
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    pub kind: PortKind,
    #[serde(skip)]
    port: Arc<dyn HostPort>,
}

impl Device {
    /// Normalize a host port into a device snapshot
    pub fn from_port(port: &Arc<dyn HostPort>) -> Self {
        Self {
            id: port.id(),
            name: port.name(),
            manufacturer: port.manufacturer(),
            kind: port.kind(),
            port: port.clone(),
        }
    }

    /// Activate the underlying endpoint
    pub fn open(&self) -> Result<()> {
        self.port.open()
    }

    /// Deactivate the underlying endpoint
    pub fn close(&self) -> Result<()> {
        self.port.close()
    }

    pub fn is_open(&self) -> bool {
        self.port.is_open()
    }

    /// Name for display, falling back to the id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.manufacturer == other.manufacturer
            && self.kind == other.kind
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("manufacturer", &self.manufacturer)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Known inputs and outputs, in host enumeration order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceRegistry {
    pub inputs: Vec<Device>,
    pub outputs: Vec<Device>,
}

impl DeviceRegistry {
    /// Registry with no devices
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }

    /// Find a device by id among inputs, then outputs
    pub fn find(&self, id: &str) -> Option<&Device> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .find(|d| d.id == id)
    }
}
