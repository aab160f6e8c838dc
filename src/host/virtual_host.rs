//! In-process MIDI host
//!
//! Devices, hot-plug events and incoming messages are driven from code. Used
//! by the test suites and for wiring the facade to software instruments.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use super::{
    HookSeed, HostPort, MessageHook, MidiAccess, MidiHost, PortHooks, PortKind, PortState,
    StateChange, StateChangeHook,
};
use crate::error::{Error, Result};

/// Host whose capability request is answered from memory
pub struct VirtualHost {
    access: Arc<VirtualAccess>,
    denial: Option<String>,
}

impl VirtualHost {
    /// Host that grants access
    pub fn new() -> Self {
        Self {
            access: Arc::new(VirtualAccess::new()),
            denial: None,
        }
    }

    /// Host that refuses every capability request with `reason`
    pub fn denying(reason: impl Into<String>) -> Self {
        Self {
            access: Arc::new(VirtualAccess::new()),
            denial: Some(reason.into()),
        }
    }

    /// The access object handed out on a granted request
    pub fn access(&self) -> Arc<VirtualAccess> {
        self.access.clone()
    }
}

impl Default for VirtualHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MidiHost for VirtualHost {
    async fn request_access(&self) -> Result<Arc<dyn MidiAccess>> {
        if let Some(reason) = &self.denial {
            debug!("Virtual host denying MIDI access: {}", reason);
            return Err(Error::AccessDenied(reason.clone()));
        }

        Ok(self.access.clone() as Arc<dyn MidiAccess>)
    }
}

/// Device collections of a [`VirtualHost`]
pub struct VirtualAccess {
    inputs: RwLock<Vec<Arc<VirtualPort>>>,
    outputs: RwLock<Vec<Arc<VirtualPort>>>,
    seed: HookSeed,
}

impl VirtualAccess {
    fn new() -> Self {
        Self {
            inputs: RwLock::new(Vec::new()),
            outputs: RwLock::new(Vec::new()),
            seed: HookSeed::default(),
        }
    }

    /// Plug in an input device and announce it
    pub fn add_input(
        &self,
        id: &str,
        name: Option<&str>,
        manufacturer: Option<&str>,
    ) -> Arc<VirtualPort> {
        self.add(PortKind::Input, id, name, manufacturer)
    }

    /// Plug in an output device and announce it
    pub fn add_output(
        &self,
        id: &str,
        name: Option<&str>,
        manufacturer: Option<&str>,
    ) -> Arc<VirtualPort> {
        self.add(PortKind::Output, id, name, manufacturer)
    }

    fn add(
        &self,
        kind: PortKind,
        id: &str,
        name: Option<&str>,
        manufacturer: Option<&str>,
    ) -> Arc<VirtualPort> {
        let port = Arc::new(VirtualPort {
            id: id.to_string(),
            name: name.map(str::to_string),
            manufacturer: manufacturer.map(str::to_string),
            kind,
            open: AtomicBool::new(false),
            hooks: PortHooks::new(self.seed.clone()),
        });

        self.ports(kind).write().push(port.clone());
        debug!("Virtual {} '{}' connected", kind, id);

        port.hooks.deliver_state_change(&port.state_change(PortState::Connected));
        port
    }

    /// Unplug a device and announce it. Returns false for unknown ids.
    pub fn remove(&self, id: &str) -> bool {
        let removed = [PortKind::Input, PortKind::Output]
            .into_iter()
            .find_map(|kind| {
                let mut ports = self.ports(kind).write();
                let index = ports.iter().position(|p| p.id == id)?;
                Some(ports.remove(index))
            });

        match removed {
            Some(port) => {
                port.open.store(false, Ordering::SeqCst);
                debug!("Virtual {} '{}' disconnected", port.kind, id);
                port.hooks
                    .deliver_state_change(&port.state_change(PortState::Disconnected));
                true
            }
            None => false,
        }
    }

    /// Feed a message into an input device.
    ///
    /// Returns false when the input is unknown or closed.
    pub fn send(&self, id: &str, data: &[u8]) -> bool {
        let port = self.inputs.read().iter().find(|p| p.id == id).cloned();

        match port {
            Some(port) if port.is_open() => {
                port.hooks.deliver_message(data);
                true
            }
            Some(_) => {
                trace!("Virtual input '{}' is closed, dropping message", id);
                false
            }
            None => false,
        }
    }

    /// Look up a connected device by id
    pub fn port(&self, id: &str) -> Option<Arc<VirtualPort>> {
        let inputs = self.inputs.read();
        let outputs = self.outputs.read();
        inputs.iter().chain(outputs.iter()).find(|p| p.id == id).cloned()
    }

    fn ports(&self, kind: PortKind) -> &RwLock<Vec<Arc<VirtualPort>>> {
        match kind {
            PortKind::Input => &self.inputs,
            PortKind::Output => &self.outputs,
        }
    }
}

impl MidiAccess for VirtualAccess {
    fn inputs(&self) -> Vec<Arc<dyn HostPort>> {
        self.inputs
            .read()
            .iter()
            .map(|p| p.clone() as Arc<dyn HostPort>)
            .collect()
    }

    fn outputs(&self) -> Vec<Arc<dyn HostPort>> {
        self.outputs
            .read()
            .iter()
            .map(|p| p.clone() as Arc<dyn HostPort>)
            .collect()
    }
}

/// Endpoint of a [`VirtualAccess`]
pub struct VirtualPort {
    id: String,
    name: Option<String>,
    manufacturer: Option<String>,
    kind: PortKind,
    open: AtomicBool,
    hooks: PortHooks,
}

impl VirtualPort {
    fn state_change(&self, state: PortState) -> StateChange {
        StateChange {
            port_id: self.id.clone(),
            kind: self.kind,
            state,
        }
    }

    pub fn has_message_hook(&self) -> bool {
        self.hooks.has_message_hook()
    }

    pub fn has_state_change_hook(&self) -> bool {
        self.hooks.has_state_change_hook()
    }
}

impl HostPort for VirtualPort {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn manufacturer(&self) -> Option<String> {
        self.manufacturer.clone()
    }

    fn kind(&self) -> PortKind {
        self.kind
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn open(&self) -> Result<()> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_message_hook(&self, hook: MessageHook) {
        if self.kind == PortKind::Output {
            trace!("Ignoring message hook on virtual output '{}'", self.id);
            return;
        }

        self.hooks.set_message(hook);
        self.open.store(true, Ordering::SeqCst);
    }

    fn set_state_change_hook(&self, hook: StateChangeHook) {
        self.hooks.set_state_change(hook);
    }
}
