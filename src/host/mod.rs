//! Host MIDI capability
//!
//! The facade never talks to a MIDI API directly. It asks a [`MidiHost`] for
//! access, enumerates the [`HostPort`]s exposed by the granted
//! [`MidiAccess`], and installs hooks on them. Two hosts ship with the crate:
//! [`MidirHost`] for real hardware and [`VirtualHost`] for in-process use.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

pub mod hooks;
pub mod midir_host;
pub mod virtual_host;

pub use hooks::{HookSeed, PortHooks};
pub use midir_host::MidirHost;
pub use virtual_host::{VirtualAccess, VirtualHost, VirtualPort};

/// Called with the raw bytes of every message received on an input port
pub type MessageHook = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Called whenever a port appears, disappears or changes state
pub type StateChangeHook = Arc<dyn Fn(&StateChange) + Send + Sync>;

/// Direction of a MIDI endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    Input,
    Output,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortKind::Input => write!(f, "input"),
            PortKind::Output => write!(f, "output"),
        }
    }
}

/// Connectivity of a port as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Connected,
    Disconnected,
}

/// Payload of a state-change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub port_id: String,
    pub kind: PortKind,
    pub state: PortState,
}

/// A host-owned MIDI endpoint.
///
/// All methods take `&self`; implementations use interior mutability so the
/// same port can be shared between the host and any number of device
/// snapshots.
pub trait HostPort: Send + Sync {
    /// Stable identifier of the endpoint
    fn id(&self) -> String;

    fn name(&self) -> Option<String>;

    fn manufacturer(&self) -> Option<String>;

    fn kind(&self) -> PortKind;

    fn is_open(&self) -> bool;

    /// Activate the endpoint. Opening an open port is a no-op.
    fn open(&self) -> Result<()>;

    /// Deactivate the endpoint. Closing a closed port is a no-op.
    fn close(&self) -> Result<()>;

    /// Install the inbound message hook, replacing any previous one.
    ///
    /// Installing the hook opens an input port. Output ports ignore it.
    fn set_message_hook(&self, hook: MessageHook);

    /// Install the state-change hook, replacing any previous one
    fn set_state_change_hook(&self, hook: StateChangeHook);
}

/// Live connection to the host MIDI capability
pub trait MidiAccess: Send + Sync {
    /// Current inputs, in host enumeration order
    fn inputs(&self) -> Vec<Arc<dyn HostPort>>;

    /// Current outputs, in host enumeration order
    fn outputs(&self) -> Vec<Arc<dyn HostPort>>;
}

/// Source of MIDI capability
#[async_trait]
pub trait MidiHost: Send + Sync {
    /// Request access to MIDI devices.
    ///
    /// Fails with [`Error::AccessDenied`](crate::Error::AccessDenied) when the
    /// host refuses or cannot provide it.
    async fn request_access(&self) -> Result<Arc<dyn MidiAccess>>;
}
