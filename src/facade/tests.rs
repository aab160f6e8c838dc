//! Tests for the MIDI facade

use super::*;
use crate::host::{MessageHook, PortKind, PortState, StateChangeHook, VirtualAccess, VirtualHost};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Host with two keyboards and one synth, plus a handle to drive it
fn make_test_host() -> (Arc<VirtualHost>, Arc<VirtualAccess>) {
    let host = Arc::new(VirtualHost::new());
    let access = host.access();
    access.add_input("in-1", Some("Keystation 49"), Some("M-Audio"));
    access.add_input("in-2", Some("microKEY"), Some("KORG"));
    access.add_output("out-1", Some("Synth"), None);
    (host, access)
}

async fn make_live_facade() -> (MidiFacade, Arc<VirtualAccess>) {
    let (host, access) = make_test_host();
    let facade = MidiFacade::connect(host).await.unwrap();
    (facade, access)
}

fn ids(devices: &[Device]) -> Vec<String> {
    devices.iter().map(|d| d.id.clone()).collect()
}

type NoteOnLog = Arc<Mutex<Vec<(i16, u8)>>>;
type NoteOffLog = Arc<Mutex<Vec<i16>>>;

fn record_note_on(facade: &MidiFacade) -> NoteOnLog {
    let log = NoteOnLog::default();
    let sink = log.clone();
    facade.on_note_on(Arc::new(move |key, velocity| sink.lock().push((key, velocity))));
    log
}

fn record_note_off(facade: &MidiFacade) -> NoteOffLog {
    let log = NoteOffLog::default();
    let sink = log.clone();
    facade.on_note_off(Arc::new(move |key| sink.lock().push(key)));
    log
}

fn record_device_changes(facade: &MidiFacade) -> Arc<Mutex<Vec<DeviceRegistry>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    facade.on_device_change(Arc::new(move |registry| sink.lock().push(registry)));
    log
}

#[tokio::test]
async fn test_registry_mirrors_host_after_initialization() {
    let (facade, _access) = make_live_facade().await;

    assert_eq!(facade.status(), FacadeStatus::Live);

    let registry = facade.device_registry();
    assert_eq!(ids(&registry.inputs), vec!["in-1", "in-2"]);
    assert_eq!(ids(&registry.outputs), vec!["out-1"]);
    assert_eq!(registry.inputs[0].name.as_deref(), Some("Keystation 49"));
    assert_eq!(registry.inputs[1].manufacturer.as_deref(), Some("KORG"));
    assert_eq!(registry.outputs[0].kind, PortKind::Output);
}

#[tokio::test]
async fn test_initialization_wires_hooks() {
    let (_facade, access) = make_live_facade().await;

    let input = access.port("in-1").unwrap();
    assert!(input.has_message_hook());
    assert!(input.has_state_change_hook());
    assert!(input.is_open());

    let output = access.port("out-1").unwrap();
    assert!(!output.has_message_hook());
    assert!(output.has_state_change_hook());
}

#[tokio::test]
async fn test_new_facade_is_uninitialized() {
    let (host, _access) = make_test_host();
    let facade = MidiFacade::new(host);

    assert_eq!(facade.status(), FacadeStatus::Uninitialized);
    assert!(facade.device_registry().is_empty());
    assert!(facade.failure_reason().is_none());
}

#[tokio::test]
async fn test_resync_before_access_is_refused() {
    let (host, _access) = make_test_host();
    let facade = MidiFacade::new(host);

    assert!(matches!(
        facade.sync_devices(),
        Err(Error::AccessNotEstablished)
    ));
}

#[tokio::test]
async fn test_denied_access_is_terminal() {
    let host = Arc::new(VirtualHost::denying("SecurityError"));
    let facade = MidiFacade::new(host);

    let err = facade.initialize().await.unwrap_err();
    assert!(matches!(err, Error::AccessDenied(ref reason) if reason == "SecurityError"));
    assert_eq!(err.to_string(), "Error getting MIDI access: SecurityError");

    assert_eq!(facade.status(), FacadeStatus::Failed);
    assert_eq!(facade.failure_reason().as_deref(), Some("SecurityError"));
    assert!(matches!(
        facade.sync_devices(),
        Err(Error::AccessNotEstablished)
    ));
    assert!(matches!(
        facade.initialize().await,
        Err(Error::AlreadyInitialized)
    ));
}

#[tokio::test]
async fn test_connect_propagates_denial() {
    let host = Arc::new(VirtualHost::denying("no MIDI service"));

    match MidiFacade::connect(host).await {
        Err(Error::AccessDenied(reason)) => assert_eq!(reason, "no MIDI service"),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("connect should fail"),
    }
}

#[tokio::test]
async fn test_second_initialize_is_rejected() {
    let (facade, _access) = make_live_facade().await;

    assert!(matches!(
        facade.initialize().await,
        Err(Error::AlreadyInitialized)
    ));
    assert_eq!(facade.device_registry().inputs.len(), 2);
}

#[tokio::test]
async fn test_note_on_dispatch() {
    let (facade, access) = make_live_facade().await;
    let on = record_note_on(&facade);
    let off = record_note_off(&facade);

    assert!(access.send("in-1", &[144, 60, 100]));

    assert_eq!(*on.lock(), vec![(48, 100)]);
    assert!(off.lock().is_empty());
}

#[tokio::test]
async fn test_note_on_with_zero_velocity_is_note_off() {
    let (facade, access) = make_live_facade().await;
    let on = record_note_on(&facade);
    let off = record_note_off(&facade);

    access.send("in-2", &[144, 60, 0]);

    assert!(on.lock().is_empty());
    assert_eq!(*off.lock(), vec![48]);
}

#[tokio::test]
async fn test_true_note_off_status_is_not_dispatched() {
    let (facade, access) = make_live_facade().await;
    let on = record_note_on(&facade);
    let off = record_note_off(&facade);

    access.send("in-1", &[128, 60, 0]);
    access.send("in-1", &[128, 60, 64]);

    assert!(on.lock().is_empty());
    assert!(off.lock().is_empty());
}

#[tokio::test]
async fn test_non_note_messages_reach_no_listener() {
    let (facade, access) = make_live_facade().await;
    let on = record_note_on(&facade);
    let off = record_note_off(&facade);
    let changes = record_device_changes(&facade);

    access.send("in-1", &[176, 7, 64]); // CC volume
    access.send("in-1", &[0xC0, 5]); // Program change
    access.send("in-1", &[144, 60]); // Truncated note on
    access.send("in-1", &[0xF8]); // Timing clock

    assert!(on.lock().is_empty());
    assert!(off.lock().is_empty());
    assert!(changes.lock().is_empty());
}

#[tokio::test]
async fn test_duplicate_registration_is_invoked_twice() {
    let (facade, access) = make_live_facade().await;

    let on_calls = Arc::new(AtomicUsize::new(0));
    let counter = on_calls.clone();
    let on_handler: NoteOnHandler = Arc::new(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    facade.on_note_on(on_handler.clone());
    facade.on_note_on(on_handler);

    let off_calls = Arc::new(AtomicUsize::new(0));
    let counter = off_calls.clone();
    let off_handler: NoteOffHandler = Arc::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    facade.on_note_off(off_handler.clone());
    facade.on_note_off(off_handler);

    let change_calls = Arc::new(AtomicUsize::new(0));
    let counter = change_calls.clone();
    let change_handler: DeviceChangeHandler = Arc::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    facade.on_device_change(change_handler.clone());
    facade.on_device_change(change_handler);

    access.send("in-1", &[144, 64, 90]);
    access.send("in-1", &[144, 64, 0]);
    access.add_output("out-2", None, None);

    assert_eq!(on_calls.load(Ordering::SeqCst), 2);
    assert_eq!(off_calls.load(Ordering::SeqCst), 2);
    assert_eq!(change_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_listeners_run_in_registration_order() {
    let (facade, access) = make_live_facade().await;
    let order = Arc::new(Mutex::new(Vec::new()));

    for tag in ["first", "second", "third"] {
        let sink = order.clone();
        facade.on_note_on(Arc::new(move |_, _| sink.lock().push(tag)));
    }

    access.send("in-1", &[144, 60, 1]);
    assert_eq!(*order.lock(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let (facade, access) = make_live_facade().await;
    let on = NoteOnLog::default();
    let sink = on.clone();
    let subscription = facade.on_note_on(Arc::new(move |key, velocity| {
        sink.lock().push((key, velocity))
    }));

    access.send("in-1", &[144, 60, 100]);
    assert!(facade.unsubscribe(subscription));
    assert!(!facade.unsubscribe(subscription));
    access.send("in-1", &[144, 62, 100]);

    assert_eq!(*on.lock(), vec![(48, 100)]);
}

#[tokio::test]
async fn test_device_added_rebuilds_registry_and_notifies_once() {
    let (facade, access) = make_live_facade().await;
    let changes = record_device_changes(&facade);
    let before = facade.device_registry();

    access.add_input("in-3", Some("Launchkey"), Some("Novation"));

    let changes = changes.lock();
    assert_eq!(changes.len(), 1);

    let registry = facade.device_registry();
    assert_eq!(ids(&registry.inputs), vec!["in-1", "in-2", "in-3"]);
    assert_eq!(changes[0], registry);
    assert_ne!(before, registry);
}

#[tokio::test]
async fn test_device_removed_rebuilds_registry() {
    let (facade, access) = make_live_facade().await;
    let changes = record_device_changes(&facade);

    assert!(access.remove("in-1"));
    assert!(access.remove("out-1"));

    let changes = changes.lock();
    assert_eq!(changes.len(), 2);
    assert_eq!(ids(&changes[0].inputs), vec!["in-2"]);
    assert_eq!(ids(&changes[0].outputs), vec!["out-1"]);
    assert_eq!(ids(&changes[1].inputs), vec!["in-2"]);
    assert!(changes[1].outputs.is_empty());
    assert_eq!(facade.device_registry(), changes[1]);
}

#[tokio::test]
async fn test_listener_copy_does_not_alias_registry() {
    let (facade, access) = make_live_facade().await;

    facade.on_device_change(Arc::new(|mut registry: DeviceRegistry| {
        registry.inputs.clear();
        registry.outputs.clear();
    }));

    access.add_output("out-2", None, None);

    let registry = facade.device_registry();
    assert_eq!(registry.inputs.len(), 2);
    assert_eq!(ids(&registry.outputs), vec!["out-1", "out-2"]);
}

#[tokio::test]
async fn test_every_device_change_listener_gets_equal_snapshot() {
    let (facade, access) = make_live_facade().await;
    let first = record_device_changes(&facade);
    let second = record_device_changes(&facade);

    access.add_input("in-3", None, None);

    assert_eq!(first.lock().len(), 1);
    assert_eq!(*first.lock(), *second.lock());
}

#[tokio::test]
async fn test_hot_plugged_input_delivers_notes() {
    let (facade, access) = make_live_facade().await;
    let on = record_note_on(&facade);

    access.add_input("in-3", Some("Launchkey"), None);
    assert!(access.send("in-3", &[144, 72, 64]));

    assert_eq!(*on.lock(), vec![(60, 64)]);
}

#[tokio::test]
async fn test_closed_device_stays_closed_across_resync() {
    let (facade, access) = make_live_facade().await;
    let on = record_note_on(&facade);

    facade.device_registry().inputs[0].close().unwrap();
    access.add_output("out-2", None, None);

    assert!(!access.port("in-1").unwrap().is_open());
    assert!(!access.send("in-1", &[144, 60, 100]));
    assert!(access.send("in-2", &[144, 60, 100]));
    assert_eq!(on.lock().len(), 1);

    facade.device_registry().inputs[0].open().unwrap();
    assert!(access.send("in-1", &[144, 61, 100]));
    assert_eq!(on.lock().len(), 2);
}

#[tokio::test]
async fn test_sync_devices_does_not_notify_listeners() {
    let (facade, _access) = make_live_facade().await;
    let changes = record_device_changes(&facade);

    let registry = facade.sync_devices().unwrap();

    assert_eq!(registry, facade.device_registry());
    assert!(changes.lock().is_empty());
}

#[tokio::test]
async fn test_listener_may_read_registry_during_dispatch() {
    let (facade, access) = make_live_facade().await;
    let seen = Arc::new(AtomicUsize::new(0));

    let reader = facade.clone();
    let counter = seen.clone();
    facade.on_device_change(Arc::new(move |registry| {
        assert_eq!(reader.device_registry(), registry);
        counter.store(registry.len(), Ordering::SeqCst);
    }));

    access.add_input("in-3", None, None);
    assert_eq!(seen.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_dropped_facade_ignores_host_events() {
    let (facade, access) = make_live_facade().await;
    drop(facade);

    // Hooks hold a weak reference; events after drop are ignored
    assert!(access.send("in-1", &[144, 60, 100]));
    access.add_input("in-3", None, None);
    assert!(access.remove("in-1"));
}

/// Port that reports itself as connected every time a state hook is
/// installed, the way an implicit open does on some hosts
struct AnnouncingPort {
    id: String,
    kind: PortKind,
    installs: AtomicUsize,
    message: Mutex<Option<MessageHook>>,
    state_change: Mutex<Option<StateChangeHook>>,
}

impl AnnouncingPort {
    fn new(id: &str, kind: PortKind) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
            installs: AtomicUsize::new(0),
            message: Mutex::new(None),
            state_change: Mutex::new(None),
        })
    }
}

impl HostPort for AnnouncingPort {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> Option<String> {
        None
    }

    fn manufacturer(&self) -> Option<String> {
        None
    }

    fn kind(&self) -> PortKind {
        self.kind
    }

    fn is_open(&self) -> bool {
        self.message.lock().is_some()
    }

    fn open(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn set_message_hook(&self, hook: MessageHook) {
        *self.message.lock() = Some(hook);
    }

    fn set_state_change_hook(&self, hook: StateChangeHook) {
        *self.state_change.lock() = Some(hook.clone());
        self.installs.fetch_add(1, Ordering::SeqCst);

        hook(&StateChange {
            port_id: self.id.clone(),
            kind: self.kind,
            state: PortState::Connected,
        });
    }
}

struct AnnouncingHost {
    inputs: Vec<Arc<AnnouncingPort>>,
    outputs: Vec<Arc<AnnouncingPort>>,
}

impl MidiAccess for AnnouncingHost {
    fn inputs(&self) -> Vec<Arc<dyn HostPort>> {
        self.inputs
            .iter()
            .map(|p| p.clone() as Arc<dyn HostPort>)
            .collect()
    }

    fn outputs(&self) -> Vec<Arc<dyn HostPort>> {
        self.outputs
            .iter()
            .map(|p| p.clone() as Arc<dyn HostPort>)
            .collect()
    }
}

struct AnnouncingHostHandle(Arc<AnnouncingHost>);

#[async_trait]
impl MidiHost for AnnouncingHostHandle {
    async fn request_access(&self) -> Result<Arc<dyn MidiAccess>> {
        Ok(self.0.clone() as Arc<dyn MidiAccess>)
    }
}

fn make_announcing_host() -> Arc<AnnouncingHost> {
    Arc::new(AnnouncingHost {
        inputs: vec![
            AnnouncingPort::new("a", PortKind::Input),
            AnnouncingPort::new("b", PortKind::Input),
        ],
        outputs: vec![AnnouncingPort::new("c", PortKind::Output)],
    })
}

#[tokio::test]
async fn test_state_change_during_initialization_keeps_registry_exact() {
    let host = make_announcing_host();
    let facade = MidiFacade::connect(Arc::new(AnnouncingHostHandle(host.clone())))
        .await
        .unwrap();

    let registry = facade.device_registry();
    assert_eq!(ids(&registry.inputs), vec!["a", "b"]);
    assert_eq!(ids(&registry.outputs), vec!["c"]);
}

#[tokio::test]
async fn test_hook_install_that_announces_wires_each_port_once() {
    let host = make_announcing_host();
    let facade = MidiFacade::new(Arc::new(AnnouncingHostHandle(host.clone())));
    let changes = record_device_changes(&facade);

    facade.initialize().await.unwrap();

    for port in host.inputs.iter().chain(host.outputs.iter()) {
        assert_eq!(port.installs.load(Ordering::SeqCst), 1, "port {}", port.id);
    }
    assert!(host.inputs.iter().all(|p| p.is_open()));

    // One announcement per port, each carrying the complete registry
    let changes = changes.lock();
    assert_eq!(changes.len(), 3);
    assert!(changes.iter().all(|r| *r == facade.device_registry()));

    // A later resync sees nothing new and installs nothing
    facade.sync_devices().unwrap();
    assert!(host.inputs.iter().all(|p| p.installs.load(Ordering::SeqCst) == 1));
}
