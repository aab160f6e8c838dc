//! MIDI note decoding
//!
//! Turns raw input bytes into the two application events the facade
//! publishes. Only channel-0 Note On (status 0x90) is recognized; a Note On
//! with velocity 0 is reported as a release. Status 0x80 (true Note Off) is
//! not recognized and is dropped like any other message.

/// Status byte of a channel-0 Note On message
pub const NOTE_ON_STATUS: u8 = 0x90;

/// Fixed octave shift between MIDI note numbers and application keys
pub const KEY_OFFSET: i16 = 12;

/// Note event extracted from an input message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEvent {
    /// Key pressed: application key, velocity (1-127)
    On { key: i16, velocity: u8 },

    /// Key released: application key
    Off { key: i16 },
}

impl NoteEvent {
    /// Application key carried by the event
    pub fn key(&self) -> i16 {
        match *self {
            NoteEvent::On { key, .. } | NoteEvent::Off { key } => key,
        }
    }
}

/// Decode a raw input message into a note event.
///
/// Returns `None` for anything that is not a channel-0 Note On with at
/// least three bytes.
pub fn decode_note(data: &[u8]) -> Option<NoteEvent> {
    let [command, note, velocity, ..] = *data else {
        return None;
    };

    if command != NOTE_ON_STATUS {
        return None;
    }

    let key = note_to_key(note);

    if velocity == 0 {
        Some(NoteEvent::Off { key })
    } else {
        Some(NoteEvent::On { key, velocity })
    }
}

/// Convert a MIDI note number into an application key
pub fn note_to_key(note: u8) -> i16 {
    note as i16 - KEY_OFFSET
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
