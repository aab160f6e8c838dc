//! Hardware MIDI host backed by `midir`
//!
//! midir has no hot-plug notifications, so the granted access re-enumerates
//! the system ports on a fixed interval and turns differences into
//! state-change events on the affected ports.

use async_trait::async_trait;
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    HookSeed, HostPort, MessageHook, MidiAccess, MidiHost, PortHooks, PortKind, PortState,
    StateChange, StateChangeHook,
};
use crate::config::AppConfig;
use crate::error::{Error, Result};

/// MIDI host for system devices
pub struct MidirHost {
    client_name: String,
    poll_interval: Duration,
}

impl MidirHost {
    /// Create a host
    ///
    /// # Arguments
    /// * `client_name` - Client name registered with the system MIDI service
    /// * `poll_interval` - How often ports are re-enumerated for hot-plug
    pub fn new(client_name: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            client_name: client_name.into(),
            poll_interval,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.midi.client_name.clone(), config.poll_interval())
    }
}

#[async_trait]
impl MidiHost for MidirHost {
    async fn request_access(&self) -> Result<Arc<dyn MidiAccess>> {
        // Probe both directions up front so a missing MIDI service is a denial
        MidiInput::new(&self.client_name).map_err(|e| Error::AccessDenied(e.to_string()))?;
        MidiOutput::new(&self.client_name).map_err(|e| Error::AccessDenied(e.to_string()))?;

        let access = Arc::new(MidirAccess::new(self.client_name.clone()));
        access
            .refresh()
            .map_err(|e| Error::AccessDenied(e.to_string()))?;

        let watcher = spawn_watcher(Arc::downgrade(&access), self.poll_interval);
        *access.watcher.lock() = Some(watcher);

        info!(
            "MIDI access granted: {} inputs, {} outputs",
            access.inputs.read().len(),
            access.outputs.read().len()
        );

        Ok(access as Arc<dyn MidiAccess>)
    }
}

/// Re-enumerate ports until the access is dropped
fn spawn_watcher(weak: Weak<MidirAccess>, poll_interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(access) = weak.upgrade() else {
                debug!("MIDI access dropped, stopping port watcher");
                break;
            };

            if let Err(e) = access.refresh() {
                warn!("MIDI port scan failed: {}", e);
            }
        }
    })
}

/// Port as seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
struct PortDescriptor {
    id: String,
    name: String,
}

fn scan_inputs(client_name: &str) -> Result<Vec<PortDescriptor>> {
    let midi_in = MidiInput::new(&format!("{}-scan", client_name))?;

    Ok(midi_in
        .ports()
        .iter()
        .filter_map(|port| {
            midi_in.port_name(port).ok().map(|name| PortDescriptor {
                id: port.id(),
                name,
            })
        })
        .collect())
}

fn scan_outputs(client_name: &str) -> Result<Vec<PortDescriptor>> {
    let midi_out = MidiOutput::new(&format!("{}-scan", client_name))?;

    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|port| {
            midi_out.port_name(port).ok().map(|name| PortDescriptor {
                id: port.id(),
                name,
            })
        })
        .collect())
}

/// Granted access to the system MIDI ports
pub struct MidirAccess {
    client_name: String,
    inputs: RwLock<Vec<Arc<MidirPort>>>,
    outputs: RwLock<Vec<Arc<MidirPort>>>,
    seed: HookSeed,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl MidirAccess {
    fn new(client_name: String) -> Self {
        Self {
            client_name,
            inputs: RwLock::new(Vec::new()),
            outputs: RwLock::new(Vec::new()),
            seed: HookSeed::default(),
            watcher: Mutex::new(None),
        }
    }

    /// Scan the system ports and announce additions and removals
    fn refresh(&self) -> Result<()> {
        let inputs = scan_inputs(&self.client_name)?;
        let outputs = scan_outputs(&self.client_name)?;

        let mut changes = self.reconcile(PortKind::Input, inputs);
        changes.extend(self.reconcile(PortKind::Output, outputs));

        announce(changes);
        Ok(())
    }

    /// Replace the port list of one direction with a fresh scan.
    ///
    /// Ports still present keep their identity (and open connections).
    /// Vanished ports are reported but left connected; the caller
    /// disconnects them once the port list lock is released.
    fn reconcile(
        &self,
        kind: PortKind,
        found: Vec<PortDescriptor>,
    ) -> Vec<(Arc<MidirPort>, PortState)> {
        let mut ports = match kind {
            PortKind::Input => self.inputs.write(),
            PortKind::Output => self.outputs.write(),
        };

        let mut changes = Vec::new();
        let mut next = Vec::with_capacity(found.len());

        for desc in found {
            match ports.iter().find(|p| p.id == desc.id) {
                Some(existing) => next.push(existing.clone()),
                None => {
                    debug!("MIDI {} appeared: '{}' ({})", kind, desc.name, desc.id);
                    let port = Arc::new(MidirPort::new(
                        desc,
                        kind,
                        self.client_name.clone(),
                        self.seed.clone(),
                    ));
                    changes.push((port.clone(), PortState::Connected));
                    next.push(port);
                }
            }
        }

        for old in ports.iter() {
            if !next.iter().any(|p| p.id == old.id) {
                debug!("MIDI {} vanished: '{}' ({})", kind, old.name, old.id);
                changes.push((old.clone(), PortState::Disconnected));
            }
        }

        *ports = next;
        changes
    }
}

/// Close vanished ports and report every change to its port's hook.
///
/// Must run without any port list lock held: closing joins midir's callback
/// thread, whose listeners may enumerate ports through `inputs()`/`outputs()`.
fn announce(changes: Vec<(Arc<MidirPort>, PortState)>) {
    for (port, state) in changes {
        if state == PortState::Disconnected {
            port.disconnect();
        }
        port.hooks.deliver_state_change(&StateChange {
            port_id: port.id.clone(),
            kind: port.kind,
            state,
        });
    }
}

impl MidiAccess for MidirAccess {
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

impl Drop for MidirAccess {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }
    }
}

/// A system MIDI port
pub struct MidirPort {
    id: String,
    name: String,
    kind: PortKind,
    client_name: String,
    hooks: Arc<PortHooks>,
    input: Mutex<Option<MidiInputConnection<()>>>,
    output: Mutex<Option<MidiOutputConnection>>,
}

impl MidirPort {
    fn new(desc: PortDescriptor, kind: PortKind, client_name: String, seed: HookSeed) -> Self {
        Self {
            id: desc.id,
            name: desc.name,
            kind,
            client_name,
            hooks: Arc::new(PortHooks::new(seed)),
            input: Mutex::new(None),
            output: Mutex::new(None),
        }
    }

    fn connection_name(&self) -> String {
        format!("{}-{}", self.client_name, self.name)
    }

    fn port_error(&self, reason: impl ToString) -> Error {
        Error::Port {
            id: self.id.clone(),
            reason: reason.to_string(),
        }
    }

    fn open_input(&self) -> Result<()> {
        let mut slot = self.input.lock();
        if slot.is_some() {
            return Ok(());
        }

        let mut midi_in = MidiInput::new(&self.client_name)?;
        midi_in.ignore(Ignore::None);

        let port = midi_in
            .find_port_by_id(self.id.clone())
            .ok_or_else(|| Error::PortUnavailable(self.id.clone()))?;

        let hooks = self.hooks.clone();
        let connection = midi_in
            .connect(
                &port,
                &self.connection_name(),
                move |_timestamp, data, _| hooks.deliver_message(data),
                (),
            )
            .map_err(|e| self.port_error(e))?;

        *slot = Some(connection);
        info!("Opened MIDI input: {}", self.name);
        Ok(())
    }

    fn open_output(&self) -> Result<()> {
        let mut slot = self.output.lock();
        if slot.is_some() {
            return Ok(());
        }

        let midi_out = MidiOutput::new(&self.client_name)?;

        let port = midi_out
            .find_port_by_id(self.id.clone())
            .ok_or_else(|| Error::PortUnavailable(self.id.clone()))?;

        let connection = midi_out
            .connect(&port, &self.connection_name())
            .map_err(|e| self.port_error(e))?;

        *slot = Some(connection);
        info!("Opened MIDI output: {}", self.name);
        Ok(())
    }

    /// Drop any live connection.
    ///
    /// The slot lock is released before closing: closing an input joins the
    /// callback thread, which may be querying this port.
    fn disconnect(&self) {
        let input = self.input.lock().take();
        if let Some(connection) = input {
            connection.close();
        }

        let output = self.output.lock().take();
        if let Some(connection) = output {
            connection.close();
        }
    }
}

impl HostPort for MidirPort {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn manufacturer(&self) -> Option<String> {
        None
    }

    fn kind(&self) -> PortKind {
        self.kind
    }

    fn is_open(&self) -> bool {
        match self.kind {
            PortKind::Input => self.input.lock().is_some(),
            PortKind::Output => self.output.lock().is_some(),
        }
    }

    fn open(&self) -> Result<()> {
        match self.kind {
            PortKind::Input => self.open_input(),
            PortKind::Output => self.open_output(),
        }
    }

    fn close(&self) -> Result<()> {
        if self.is_open() {
            self.disconnect();
            info!("Closed MIDI {}: {}", self.kind, self.name);
        }
        Ok(())
    }

    fn set_message_hook(&self, hook: MessageHook) {
        if self.kind == PortKind::Output {
            return;
        }

        self.hooks.set_message(hook);
        if let Err(e) = self.open_input() {
            warn!("Failed to open MIDI input '{}': {}", self.name, e);
        }
    }

    fn set_state_change_hook(&self, hook: StateChangeHook) {
        self.hooks.set_state_change(hook);
    }
}
