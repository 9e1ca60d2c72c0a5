//! Device lifecycle layer for a live-coding audio workstation
//!
//! Discovers, opens, and continuously reconciles the audio output stream and
//! the set of MIDI input ports against a user-declared connection policy,
//! forwarding audio frames and MIDI bytes to an external synthesis engine.
//!
//! Two components do the real work:
//!
//! - [`AudioStreamController`] owns at most one open audio stream, with
//!   open/switch/close semantics and a realtime callback that stays off the
//!   control-plane locks.
//! - [`MidiPortReconciler`] runs a background poll loop that keeps open MIDI
//!   input handles converged on the hardware port list and the
//!   [`ConnectionPolicy`], emitting one coalesced notification per cycle
//!   that changed anything.
//!
//! Device indices are positional enumeration artifacts, not stable hardware
//! identifiers; both components re-resolve identity as `(index, name)` pairs
//! and callers are expected to re-read snapshots after each notification.

pub mod audio;
pub mod midi;

pub use audio::{
    AudioBackend, AudioDeviceInfo, AudioStreamController, CpalBackend, RenderFn, StreamRequest,
    StreamTick, TickFn,
};
pub use midi::{
    ConnectionPolicy, MidiBackend, MidiDeviceInfo, MidiMessageFn, MidiPortReconciler, MidirBackend,
};
