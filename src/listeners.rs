//! Observer lists for facade events
//!
//! Listeners run in insertion order. Registering the same handler twice
//! makes it run twice. Every registration returns a [`Subscription`] that can
//! later be handed back to remove exactly that registration.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::device::DeviceRegistry;

/// Called with (key, velocity) for every key press
pub type NoteOnHandler = Arc<dyn Fn(i16, u8) + Send + Sync>;

/// Called with the key of every key release
pub type NoteOffHandler = Arc<dyn Fn(i16) + Send + Sync>;

/// Called with a copy of the registry after every device change
pub type DeviceChangeHandler = Arc<dyn Fn(DeviceRegistry) + Send + Sync>;

/// Event stream a listener was registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    NoteOn,
    NoteOff,
    DeviceChange,
}

/// Token identifying one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub kind: ListenerKind,
    id: u64,
}

/// Ordered, append-only list of handlers of one kind
pub struct ListenerList<T: Clone> {
    kind: ListenerKind,
    next_id: AtomicU64,
    entries: RwLock<Vec<(u64, T)>>,
}

impl<T: Clone> ListenerList<T> {
    pub fn new(kind: ListenerKind) -> Self {
        Self {
            kind,
            next_id: AtomicU64::new(0),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn add(&self, handler: T) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().push((id, handler));

        Subscription {
            kind: self.kind,
            id,
        }
    }

    /// Remove one registration. Returns false if it was already gone or
    /// belongs to another list.
    pub fn remove(&self, subscription: &Subscription) -> bool {
        if subscription.kind != self.kind {
            return false;
        }

        let mut entries = self.entries.write();
        match entries.iter().position(|(id, _)| *id == subscription.id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Handlers in invocation order.
    ///
    /// Callers invoke the returned copies so handlers may subscribe or
    /// unsubscribe while an event is being dispatched.
    pub fn snapshot(&self) -> Vec<T> {
        self.entries
            .read()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
