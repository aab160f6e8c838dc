//! MIDI facade
//!
//! Requests MIDI capability from a host, mirrors its devices into a
//! [`DeviceRegistry`], and republishes hardware events as three listener
//! streams: note-on, note-off and device-change.
//!
//! Lifecycle: `Uninitialized` -> (access granted) -> `Live`, or
//! (access denied) -> `Failed`. A failed facade stays failed.
//!
//! Listener callbacks run synchronously on whatever thread the host delivers
//! the triggering event on, and every listener of an event has returned
//! before the hook that delivered it returns.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, trace};

use crate::device::{Device, DeviceRegistry};
use crate::error::{Error, Result};
use crate::host::{HostPort, MidiAccess, MidiHost, StateChange};
use crate::listeners::{
    DeviceChangeHandler, ListenerKind, ListenerList, NoteOffHandler, NoteOnHandler, Subscription,
};
use crate::midi::{decode_note, format_hex, NoteEvent};

/// Observable lifecycle state of a [`MidiFacade`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacadeStatus {
    /// Access has not been granted (yet)
    Uninitialized,
    /// Access granted, registry is live
    Live,
    /// Access was denied; terminal
    Failed,
}

enum AccessState {
    Pending,
    Requesting,
    Granted(Arc<dyn MidiAccess>),
    Denied(String),
}

/// Subscription facade over a host MIDI capability
///
/// Cloning is cheap; clones share the registry and listener lists.
#[derive(Clone)]
pub struct MidiFacade {
    inner: Arc<Inner>,
}

struct Inner {
    host: Arc<dyn MidiHost>,
    access: RwLock<AccessState>,
    registry: RwLock<DeviceRegistry>,
    note_on: ListenerList<NoteOnHandler>,
    note_off: ListenerList<NoteOffHandler>,
    device_change: ListenerList<DeviceChangeHandler>,
}

impl MidiFacade {
    /// Create a facade that has not requested access yet
    pub fn new(host: Arc<dyn MidiHost>) -> Self {
        Self {
            inner: Arc::new(Inner {
                host,
                access: RwLock::new(AccessState::Pending),
                registry: RwLock::new(DeviceRegistry::empty()),
                note_on: ListenerList::new(ListenerKind::NoteOn),
                note_off: ListenerList::new(ListenerKind::NoteOff),
                device_change: ListenerList::new(ListenerKind::DeviceChange),
            }),
        }
    }

    /// Create a facade and request access in one step
    pub async fn connect(host: Arc<dyn MidiHost>) -> Result<Self> {
        let facade = Self::new(host);
        facade.initialize().await?;
        Ok(facade)
    }

    /// Request MIDI capability from the host.
    ///
    /// On success the registry is populated from the granted access and every
    /// device is wired for event delivery. On failure the facade becomes
    /// [`FacadeStatus::Failed`]. Access can only be requested once.
    pub async fn initialize(&self) -> Result<()> {
        {
            let mut state = self.inner.access.write();
            if !matches!(*state, AccessState::Pending) {
                return Err(Error::AlreadyInitialized);
            }
            *state = AccessState::Requesting;
        }

        debug!("Requesting MIDI access");

        match self.inner.host.request_access().await {
            Ok(access) => {
                *self.inner.access.write() = AccessState::Granted(access);
                self.inner.on_access()
            }
            Err(e) => {
                let reason = match e {
                    Error::AccessDenied(reason) => reason,
                    other => other.to_string(),
                };
                error!("Error getting MIDI access: {}", reason);
                *self.inner.access.write() = AccessState::Denied(reason.clone());
                Err(Error::AccessDenied(reason))
            }
        }
    }

    pub fn status(&self) -> FacadeStatus {
        match &*self.inner.access.read() {
            AccessState::Pending | AccessState::Requesting => FacadeStatus::Uninitialized,
            AccessState::Granted(_) => FacadeStatus::Live,
            AccessState::Denied(_) => FacadeStatus::Failed,
        }
    }

    /// Reason the host gave for refusing access, if it did
    pub fn failure_reason(&self) -> Option<String> {
        match &*self.inner.access.read() {
            AccessState::Denied(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Copy of the current registry
    pub fn device_registry(&self) -> DeviceRegistry {
        self.inner.registry.read().clone()
    }

    /// Rebuild the registry from the live host enumeration.
    ///
    /// Fails with [`Error::AccessNotEstablished`] before access is granted.
    /// Listeners are not notified; that only happens for host state changes.
    pub fn sync_devices(&self) -> Result<DeviceRegistry> {
        self.inner.sync_io()
    }

    /// Register a key-press listener: `(key, velocity)`
    pub fn on_note_on(&self, handler: NoteOnHandler) -> Subscription {
        self.inner.note_on.add(handler)
    }

    /// Register a key-release listener: `(key)`
    pub fn on_note_off(&self, handler: NoteOffHandler) -> Subscription {
        self.inner.note_off.add(handler)
    }

    /// Register a listener for device registry changes
    pub fn on_device_change(&self, handler: DeviceChangeHandler) -> Subscription {
        self.inner.device_change.add(handler)
    }

    /// Remove a registration. Returns false if it was already removed.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        match subscription.kind {
            ListenerKind::NoteOn => self.inner.note_on.remove(&subscription),
            ListenerKind::NoteOff => self.inner.note_off.remove(&subscription),
            ListenerKind::DeviceChange => self.inner.device_change.remove(&subscription),
        }
    }
}

impl Inner {
    fn on_access(self: &Arc<Self>) -> Result<()> {
        let registry = self.sync_io()?;
        info!(
            "MIDI facade live: {} inputs, {} outputs",
            registry.inputs.len(),
            registry.outputs.len()
        );
        Ok(())
    }

    fn wire_input(self: &Arc<Self>, input: &Arc<dyn HostPort>) {
        let weak = Arc::downgrade(self);
        input.set_message_hook(Arc::new(move |data: &[u8]| {
            if let Some(inner) = weak.upgrade() {
                inner.on_message(data);
            }
        }));

        self.wire_state_change(input);
    }

    fn wire_state_change(self: &Arc<Self>, port: &Arc<dyn HostPort>) {
        let weak = Arc::downgrade(self);
        port.set_state_change_hook(Arc::new(move |change: &StateChange| {
            if let Some(inner) = weak.upgrade() {
                inner.on_state_change(change);
            }
        }));
    }

    /// Full rebuild of both device lists.
    ///
    /// The rebuilt registry is published before any hook is installed, and
    /// the set of unseen ids is taken under the same write lock. A state
    /// change fired while wiring (by the host, or by another thread) sees
    /// every current device as known, so each id is wired exactly once.
    /// Devices that were already known keep their hooks and open/closed state.
    fn sync_io(self: &Arc<Self>) -> Result<DeviceRegistry> {
        let access = match &*self.access.read() {
            AccessState::Granted(access) => access.clone(),
            _ => return Err(Error::AccessNotEstablished),
        };

        let inputs = access.inputs();
        let outputs = access.outputs();

        let rebuilt = DeviceRegistry {
            inputs: inputs.iter().map(Device::from_port).collect(),
            outputs: outputs.iter().map(Device::from_port).collect(),
        };

        let (new_inputs, new_outputs) = {
            let mut registry = self.registry.write();
            let known_inputs = device_ids(&registry.inputs);
            let known_outputs = device_ids(&registry.outputs);
            *registry = rebuilt.clone();

            (unseen(inputs, &known_inputs), unseen(outputs, &known_outputs))
        };

        for input in &new_inputs {
            debug!("Wiring new MIDI input: {}", input.id());
            self.wire_input(input);
        }
        for output in &new_outputs {
            debug!("Wiring new MIDI output: {}", output.id());
            self.wire_state_change(output);
        }

        Ok(rebuilt)
    }

    fn on_state_change(self: &Arc<Self>, change: &StateChange) {
        debug!(
            "MIDI {} '{}' is now {:?}",
            change.kind, change.port_id, change.state
        );

        let registry = match self.sync_io() {
            Ok(registry) => registry,
            Err(e) => {
                error!("Failed to resync MIDI devices: {}", e);
                return;
            }
        };

        for listener in self.device_change.snapshot() {
            listener(registry.clone());
        }
    }

    fn on_message(&self, data: &[u8]) {
        match decode_note(data) {
            Some(NoteEvent::On { key, velocity }) => {
                trace!("Note on: key={} velocity={}", key, velocity);
                for listener in self.note_on.snapshot() {
                    listener(key, velocity);
                }
            }
            Some(NoteEvent::Off { key }) => {
                trace!("Note off: key={}", key);
                for listener in self.note_off.snapshot() {
                    listener(key);
                }
            }
            // Includes status 0x80: only Note On with velocity 0 counts as a release
            None => trace!("Ignoring MIDI message: {}", format_hex(data)),
        }
    }
}

fn device_ids(devices: &[Device]) -> HashSet<String> {
    devices.iter().map(|d| d.id.clone()).collect()
}

fn unseen(ports: Vec<Arc<dyn HostPort>>, known: &HashSet<String>) -> Vec<Arc<dyn HostPort>> {
    ports.into_iter().filter(|p| !known.contains(&p.id())).collect()
}

#[cfg(test)]
mod tests;
