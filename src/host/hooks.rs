//! Hook storage shared by the host backends

use parking_lot::RwLock;
use std::sync::Arc;

use super::{MessageHook, StateChange, StateChangeHook};

/// Last state-change hook installed on any port of an access.
///
/// Ports created after the hook was installed start out with it, so a
/// device that appears later can still report its own arrival.
pub type HookSeed = Arc<RwLock<Option<StateChangeHook>>>;

/// Message and state-change hooks of a single port
pub struct PortHooks {
    message: RwLock<Option<MessageHook>>,
    state_change: RwLock<Option<StateChangeHook>>,
    seed: HookSeed,
}

impl PortHooks {
    pub fn new(seed: HookSeed) -> Self {
        let inherited = seed.read().clone();

        Self {
            message: RwLock::new(None),
            state_change: RwLock::new(inherited),
            seed,
        }
    }

    pub fn set_message(&self, hook: MessageHook) {
        *self.message.write() = Some(hook);
    }

    pub fn set_state_change(&self, hook: StateChangeHook) {
        *self.seed.write() = Some(hook.clone());
        *self.state_change.write() = Some(hook);
    }

    pub fn has_message_hook(&self) -> bool {
        self.message.read().is_some()
    }

    pub fn has_state_change_hook(&self) -> bool {
        self.state_change.read().is_some()
    }

    /// Hand a message to the installed hook, if any.
    ///
    /// The hook runs after the lock is released so it may reinstall hooks.
    pub fn deliver_message(&self, data: &[u8]) {
        let hook = self.message.read().clone();
        if let Some(hook) = hook {
            hook(data);
        }
    }

    pub fn deliver_state_change(&self, change: &StateChange) {
        let hook = self.state_change.read().clone();
        if let Some(hook) = hook {
            hook(change);
        }
    }
}
