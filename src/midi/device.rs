//! MIDI backend seam and the midir implementation
//!
//! The reconciler talks to hardware through [`MidiBackend`], so its state
//! machine can be exercised with a counting fake in tests. The production
//! implementation wraps midir: a fresh `MidiInput` client per enumeration
//! and per connection, with the connection handle closing the port (and
//! cancelling its callback) when dropped.

use midir::{MidiInput, MidiInputConnection};
use serde::Serialize;
use std::sync::Arc;

/// Externally visible snapshot of one tracked MIDI input port.
///
/// `index` carries the same positional-identity caveat as audio devices:
/// it is an enumeration-order artifact, not a stable hardware identifier.
#[derive(Debug, Clone, Serialize)]
pub struct MidiDeviceInfo {
    pub index: usize,
    pub name: String,
    pub connected: bool,
}

/// Handler for raw incoming MIDI bytes, invoked synchronously from the
/// backend's own thread. Messages are forwarded as-is: no buffering,
/// filtering, or reordering.
pub type MidiMessageFn = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Seam to the platform MIDI backend.
pub trait MidiBackend: Send {
    /// Native handle for one open input port. Dropping it cancels the
    /// message callback and closes the port.
    type Connection: Send;

    /// Names of the currently visible input ports, in enumeration order.
    fn port_names(&self) -> Result<Vec<String>, String>;

    /// Open the port at `index`, verifying it is still named `name`, and
    /// start delivering its messages to `on_message`.
    fn connect(
        &self,
        index: usize,
        name: &str,
        on_message: MidiMessageFn,
    ) -> Result<Self::Connection, String>;
}

/// MIDI backend backed by midir.
pub struct MidirBackend {
    client_name: String,
}

impl MidirBackend {
    /// Probe the platform MIDI system once so a missing backend surfaces as
    /// a construction failure rather than a string of per-poll errors.
    pub fn new() -> Result<Self, String> {
        let client_name = "patchbay".to_string();
        MidiInput::new(&client_name)
            .map_err(|e| format!("Failed to create MIDI backend: {}", e))?;
        Ok(Self { client_name })
    }
}

impl MidiBackend for MidirBackend {
    type Connection = MidiInputConnection<()>;

    fn port_names(&self) -> Result<Vec<String>, String> {
        let midi_in = MidiInput::new(&self.client_name)
            .map_err(|e| format!("Failed to create MIDI input: {}", e))?;

        let ports = midi_in.ports();
        Ok(ports
            .iter()
            .enumerate()
            .map(|(index, port)| {
                midi_in
                    .port_name(port)
                    .unwrap_or_else(|_| format!("Unknown Device {}", index))
            })
            .collect())
    }

    fn connect(
        &self,
        index: usize,
        name: &str,
        on_message: MidiMessageFn,
    ) -> Result<Self::Connection, String> {
        let midi_in = MidiInput::new(&self.client_name)
            .map_err(|e| format!("Failed to create MIDI input: {}", e))?;

        let ports = midi_in.ports();
        let port = ports
            .get(index)
            .ok_or_else(|| format!("MIDI port index {} not found", index))?;

        // The port list may have shifted since enumeration; a name mismatch
        // means this index now belongs to different hardware.
        let current_name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| format!("Unknown Device {}", index));
        if current_name != name {
            return Err(format!(
                "MIDI port {} is now '{}', expected '{}'",
                index, current_name, name
            ));
        }

        midi_in
            .connect(
                port,
                "patchbay-midi-in",
                move |_timestamp, message, _| {
                    on_message(message);
                },
                (),
            )
            .map_err(|e| format!("Failed to connect to MIDI port '{}': {}", name, e))
    }
}
