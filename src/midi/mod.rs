//! MIDI input side of the device layer
//!
//! Hot-plug reconciliation of MIDI input ports against a connection policy,
//! with raw message forwarding to the hosting application.

pub mod device;
pub mod policy;
pub mod reconciler;

pub use device::{MidiBackend, MidiDeviceInfo, MidiMessageFn, MidirBackend};
pub use policy::ConnectionPolicy;
pub use reconciler::MidiPortReconciler;
