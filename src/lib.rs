//! humidi - subscription facade over a host MIDI capability
//!
//! Discovers MIDI devices, keeps a live registry of inputs and outputs, and
//! republishes hardware activity as note-on, note-off and device-change
//! callbacks.
//!
//! ```no_run
//! use std::sync::Arc;
//! use humidi::{MidiFacade, MidirHost};
//!
//! # async fn run() -> humidi::Result<()> {
//! let host = Arc::new(MidirHost::new("humidi", std::time::Duration::from_millis(500)));
//! let facade = MidiFacade::connect(host).await?;
//!
//! facade.on_note_on(Arc::new(|key, velocity| println!("down {key} {velocity}")));
//! facade.on_note_off(Arc::new(|key| println!("up {key}")));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod facade;
pub mod host;
pub mod listeners;
pub mod midi;

pub use config::AppConfig;
pub use device::{Device, DeviceRegistry};
pub use error::{Error, Result};
pub use facade::{FacadeStatus, MidiFacade};
pub use host::{
    HostPort, MidiAccess, MidiHost, MidirHost, PortKind, PortState, StateChange, VirtualAccess,
    VirtualHost, VirtualPort,
};
pub use listeners::{DeviceChangeHandler, NoteOffHandler, NoteOnHandler, Subscription};
pub use midi::NoteEvent;
