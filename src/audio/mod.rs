//! Audio output side of the device layer
//!
//! Device enumeration, the single-stream controller, and the cpal backend
//! that carries the realtime callback.

pub mod cpal_backend;
pub mod device;
pub mod stream;

pub use cpal_backend::CpalBackend;
pub use device::{list_audio_devices, AudioDeviceInfo};
pub use stream::{AudioBackend, AudioStreamController, RenderFn, StreamRequest, StreamTick, TickFn};
