//! Audio stream controller
//!
//! Owns at most one open duplex stream at a time and mediates between slow
//! control-plane calls (open/close/switch) and the driver-owned realtime
//! callback. The realtime path never takes the controller mutex: it reads a
//! single atomic playback flag and delegates straight to the render callback
//! supplied at construction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::device::AudioDeviceInfo;

/// Per-buffer context handed to the realtime callback.
#[derive(Debug, Clone, Copy)]
pub struct StreamTick {
    /// Effective sample rate negotiated at open time.
    pub sample_rate: u32,
    /// Frames in this buffer.
    pub frames: u32,
    pub input_channels: u16,
    pub output_channels: u16,
    /// Set when the driver reports an output underflow for this tick. The
    /// backend is responsible for silence; the callback must not write data.
    pub output_underflow: bool,
}

/// Stream parameters requested by `AudioStreamController::open`.
///
/// A zero channel count means "do not request this direction" — the backend
/// must not build stream parameters for it.
#[derive(Debug, Clone, Copy)]
pub struct StreamRequest {
    pub device_index: usize,
    pub sample_rate: u32,
    pub buffer_frames: u32,
    pub input_channels: u16,
    pub output_channels: u16,
}

/// Realtime callback installed into the backend for one open stream.
/// Invoked once per buffer with interleaved f32 input and output samples.
pub type TickFn = Box<dyn FnMut(&[f32], &mut [f32], &StreamTick) + Send>;

/// Render callback supplied by the hosting application, normally wired to
/// the synthesis engine's fill entry point. Must not allocate or block.
pub type RenderFn = Arc<dyn Fn(&[f32], &mut [f32], &StreamTick) + Send + Sync>;

/// Seam to the platform audio backend.
///
/// Production code uses [`CpalBackend`](super::CpalBackend); tests substitute
/// a counting fake. Implementations close any open stream when dropped.
pub trait AudioBackend: Send {
    /// Point-in-time snapshot of the hardware devices.
    fn devices(&self) -> Result<Vec<AudioDeviceInfo>, String>;

    /// Open a stream on the requested device and start invoking `tick` per
    /// buffer. Implementations close any previously open stream first.
    fn open(&mut self, request: &StreamRequest, tick: TickFn) -> Result<(), String>;

    /// Close the open stream, if any. Idempotent.
    fn close(&mut self);
}

struct ControllerInner<B> {
    backend: B,
    /// `(index, name)` recorded at the last successful open. The name is the
    /// identity half of the check: positional indices shift when hardware
    /// comes and goes.
    current: Option<(usize, String)>,
}

/// Controls the single active audio stream.
///
/// All methods may be called concurrently from arbitrary threads; they
/// serialize on an internal mutex that the realtime callback never touches.
pub struct AudioStreamController<B: AudioBackend> {
    inner: Mutex<ControllerInner<B>>,
    playing: Arc<AtomicBool>,
    render: RenderFn,
}

impl<B: AudioBackend> AudioStreamController<B> {
    /// Create a controller around `backend`. `render` is invoked from the
    /// driver thread for every buffer while a stream is open and playback is
    /// enabled.
    pub fn new(backend: B, render: RenderFn) -> Self {
        Self {
            inner: Mutex::new(ControllerInner {
                backend,
                current: None,
            }),
            playing: Arc::new(AtomicBool::new(true)),
            render,
        }
    }

    /// Snapshot of the devices currently visible to the backend. Enumeration
    /// failure is logged and returns an empty list — it never fails the
    /// caller.
    pub fn devices(&self) -> Vec<AudioDeviceInfo> {
        match self.inner.lock().backend.devices() {
            Ok(devices) => devices,
            Err(e) => {
                log::warn!("Audio device enumeration failed: {}", e);
                Vec::new()
            }
        }
    }

    /// The device the stream was last successfully opened on, re-resolved
    /// against a fresh enumeration. Returns `None` when nothing is open or
    /// when the recorded position no longer holds the same device.
    pub fn current(&self) -> Option<AudioDeviceInfo> {
        let inner = self.inner.lock();
        let (index, ref name) = *inner.current.as_ref()?;
        let devices = inner.backend.devices().ok()?;
        let device = devices.into_iter().nth(index)?;
        if device.name == *name {
            Some(device)
        } else {
            None
        }
    }

    /// Open a stream on the device at `index` with the given parameters,
    /// closing any previously open stream first.
    ///
    /// An out-of-range index is a deliberate silent no-op that leaves any
    /// open stream untouched: device topology may have changed between UI
    /// intent and execution, and acting on a stale index would tear down a
    /// working stream. Backend open failures are logged and leave the
    /// controller closed; callers detect both cases by polling `current()`.
    pub fn open(
        &self,
        index: usize,
        sample_rate: u32,
        buffer_frames: u32,
        input_channels: u16,
        output_channels: u16,
    ) {
        let mut inner = self.inner.lock();

        let devices = match inner.backend.devices() {
            Ok(devices) => devices,
            Err(e) => {
                log::warn!("Audio device enumeration failed: {}", e);
                return;
            }
        };
        let name = match devices.get(index) {
            Some(device) => device.name.clone(),
            None => {
                log::debug!("Ignoring open for stale audio device index {}", index);
                return;
            }
        };

        if inner.current.take().is_some() {
            inner.backend.close();
        }

        let request = StreamRequest {
            device_index: index,
            sample_rate,
            buffer_frames,
            input_channels,
            output_channels,
        };

        let playing = Arc::clone(&self.playing);
        let render = Arc::clone(&self.render);
        let tick: TickFn = Box::new(move |input, output, tick| {
            if tick.output_underflow {
                return;
            }
            if !playing.load(Ordering::Relaxed) {
                output.fill(0.0);
                return;
            }
            render(input, output, tick);
        });

        match inner.backend.open(&request, tick) {
            Ok(()) => {
                log::info!(
                    "Opened audio stream on '{}' ({} Hz, {} frames, {} in / {} out)",
                    name,
                    sample_rate,
                    buffer_frames,
                    input_channels,
                    output_channels
                );
                inner.current = Some((index, name));
            }
            Err(e) => {
                log::warn!("Failed to open audio stream on '{}': {}", name, e);
            }
        }
    }

    /// Close the open stream, if any.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.current.take().is_some() {
            inner.backend.close();
        }
    }

    /// Enable or disable playback. While disabled the realtime callback
    /// writes silence instead of invoking the render callback.
    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Relaxed);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }
}

impl<B: AudioBackend> Drop for AudioStreamController<B> {
    fn drop(&mut self) {
        // The backend's own Drop releases its resources; closing here keeps
        // the close accounting exact even for backends without a Drop.
        let mut inner = self.inner.lock();
        if inner.current.take().is_some() {
            inner.backend.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Counting fake backend. Captures the tick callback so tests can drive
    /// the "realtime" path by hand.
    struct FakeBackend {
        devices: Vec<AudioDeviceInfo>,
        stats: Arc<FakeStats>,
        fail_open: bool,
        fail_enumeration: bool,
        captured_tick: Arc<Mutex<Option<TickFn>>>,
        last_request: Arc<Mutex<Option<StreamRequest>>>,
    }

    #[derive(Default)]
    struct FakeStats {
        opens: AtomicUsize,
        closes: AtomicUsize,
        open_now: AtomicBool,
    }

    fn fake_device(index: usize, name: &str) -> AudioDeviceInfo {
        AudioDeviceInfo {
            index,
            name: name.to_string(),
            sample_rates: vec![44_100, 48_000],
            default_sample_rate: 44_100,
            input_channels: 2,
            output_channels: 2,
        }
    }

    impl FakeBackend {
        fn new(names: &[&str]) -> Self {
            Self {
                devices: names
                    .iter()
                    .enumerate()
                    .map(|(i, n)| fake_device(i, n))
                    .collect(),
                stats: Arc::new(FakeStats::default()),
                fail_open: false,
                fail_enumeration: false,
                captured_tick: Arc::new(Mutex::new(None)),
                last_request: Arc::new(Mutex::new(None)),
            }
        }
    }

    impl AudioBackend for FakeBackend {
        fn devices(&self) -> Result<Vec<AudioDeviceInfo>, String> {
            if self.fail_enumeration {
                return Err("enumeration failed".to_string());
            }
            Ok(self.devices.clone())
        }

        fn open(&mut self, request: &StreamRequest, tick: TickFn) -> Result<(), String> {
            assert!(
                !self.stats.open_now.load(Ordering::SeqCst),
                "two streams open simultaneously"
            );
            if self.fail_open {
                return Err("open failed".to_string());
            }
            self.stats.opens.fetch_add(1, Ordering::SeqCst);
            self.stats.open_now.store(true, Ordering::SeqCst);
            *self.captured_tick.lock() = Some(tick);
            *self.last_request.lock() = Some(*request);
            Ok(())
        }

        fn close(&mut self) {
            if self.stats.open_now.swap(false, Ordering::SeqCst) {
                self.stats.closes.fetch_add(1, Ordering::SeqCst);
                *self.captured_tick.lock() = None;
            }
        }
    }

    impl Drop for FakeBackend {
        fn drop(&mut self) {
            self.close();
        }
    }

    fn counting_render(counter: Arc<AtomicUsize>) -> RenderFn {
        Arc::new(move |_input, output, _tick| {
            counter.fetch_add(1, Ordering::SeqCst);
            output.fill(0.5);
        })
    }

    fn silent_render() -> RenderFn {
        Arc::new(|_input, _output, _tick| {})
    }

    #[test]
    fn test_open_switches_streams_exclusively() {
        let backend = FakeBackend::new(&["Speakers", "Interface"]);
        let stats = Arc::clone(&backend.stats);
        let controller = AudioStreamController::new(backend, silent_render());

        controller.open(0, 44_100, 512, 0, 2);
        controller.open(1, 48_000, 256, 2, 2);

        // The fake asserts inside open() that no two streams coexist.
        assert_eq!(stats.opens.load(Ordering::SeqCst), 2);
        assert_eq!(stats.closes.load(Ordering::SeqCst), 1);
        assert_eq!(controller.current().unwrap().name, "Interface");
    }

    #[test]
    fn test_out_of_range_open_is_a_no_op() {
        let backend = FakeBackend::new(&["Speakers", "Interface"]);
        let stats = Arc::clone(&backend.stats);
        let controller = AudioStreamController::new(backend, silent_render());

        controller.open(0, 44_100, 512, 0, 2);
        controller.open(2, 44_100, 512, 0, 2);
        controller.open(usize::MAX, 44_100, 512, 0, 2);

        // The stale requests neither opened nor disturbed the live stream.
        assert_eq!(stats.opens.load(Ordering::SeqCst), 1);
        assert_eq!(stats.closes.load(Ordering::SeqCst), 0);
        assert_eq!(controller.current().unwrap().name, "Speakers");
    }

    #[test]
    fn test_drop_closes_the_stream() {
        let backend = FakeBackend::new(&["Speakers"]);
        let stats = Arc::clone(&backend.stats);
        let controller = AudioStreamController::new(backend, silent_render());

        controller.open(0, 44_100, 512, 0, 2);
        drop(controller);

        assert_eq!(stats.opens.load(Ordering::SeqCst), 1);
        assert_eq!(stats.closes.load(Ordering::SeqCst), 1);
        assert!(!stats.open_now.load(Ordering::SeqCst));
    }

    #[test]
    fn test_open_failure_leaves_controller_closed() {
        let mut backend = FakeBackend::new(&["Speakers"]);
        backend.fail_open = true;
        let stats = Arc::clone(&backend.stats);
        let controller = AudioStreamController::new(backend, silent_render());

        controller.open(0, 44_100, 512, 0, 2);

        assert_eq!(stats.opens.load(Ordering::SeqCst), 0);
        assert!(controller.current().is_none());
    }

    #[test]
    fn test_enumeration_failure_returns_empty_snapshot() {
        let mut backend = FakeBackend::new(&["Speakers"]);
        backend.fail_enumeration = true;
        let controller = AudioStreamController::new(backend, silent_render());

        assert!(controller.devices().is_empty());
        controller.open(0, 44_100, 512, 0, 2);
        assert!(controller.current().is_none());
    }

    #[test]
    fn test_current_rejects_identity_change() {
        let backend = FakeBackend::new(&["Speakers", "Interface"]);
        let tick_slot = Arc::clone(&backend.captured_tick);
        let controller = AudioStreamController::new(backend, silent_render());

        controller.open(1, 44_100, 512, 0, 2);
        assert_eq!(controller.current().unwrap().name, "Interface");

        // Simulate the device at index 1 being replaced by different
        // hardware between enumerations.
        {
            let mut inner = controller.inner.lock();
            inner.backend.devices[1] = fake_device(1, "Headset");
        }
        assert!(controller.current().is_none());
        // The stream handle itself is still live; only the snapshot resolution
        // reports "no device".
        assert!(tick_slot.lock().is_some());
    }

    #[test]
    fn test_zero_channel_directions_are_not_requested() {
        let backend = FakeBackend::new(&["Speakers"]);
        let request_slot = Arc::clone(&backend.last_request);
        let controller = AudioStreamController::new(backend, silent_render());

        controller.open(0, 44_100, 512, 0, 2);

        let request = (*request_slot.lock()).unwrap();
        assert_eq!(request.input_channels, 0);
        assert_eq!(request.output_channels, 2);
    }

    #[test]
    fn test_underflow_tick_is_a_no_op() {
        let backend = FakeBackend::new(&["Speakers"]);
        let tick_slot = Arc::clone(&backend.captured_tick);
        let renders = Arc::new(AtomicUsize::new(0));
        let controller = AudioStreamController::new(backend, counting_render(Arc::clone(&renders)));

        controller.open(0, 44_100, 4, 0, 2);

        let mut output = vec![1.0f32; 8];
        let mut tick_guard = tick_slot.lock();
        let tick = tick_guard.as_mut().unwrap();
        tick(
            &[],
            &mut output,
            &StreamTick {
                sample_rate: 44_100,
                frames: 4,
                input_channels: 0,
                output_channels: 2,
                output_underflow: true,
            },
        );

        // Callback returned immediately: no render, no writes.
        assert_eq!(renders.load(Ordering::SeqCst), 0);
        assert!(output.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_disabled_playback_writes_silence() {
        let backend = FakeBackend::new(&["Speakers"]);
        let tick_slot = Arc::clone(&backend.captured_tick);
        let renders = Arc::new(AtomicUsize::new(0));
        let controller = AudioStreamController::new(backend, counting_render(Arc::clone(&renders)));

        controller.open(0, 44_100, 4, 0, 2);
        controller.set_playing(false);

        let info = StreamTick {
            sample_rate: 44_100,
            frames: 4,
            input_channels: 0,
            output_channels: 2,
            output_underflow: false,
        };
        let mut output = vec![1.0f32; 8];
        {
            let mut tick_guard = tick_slot.lock();
            let tick = tick_guard.as_mut().unwrap();
            tick(&[], &mut output, &info);
        }
        assert_eq!(renders.load(Ordering::SeqCst), 0);
        assert!(output.iter().all(|&s| s == 0.0));

        // Re-enabled playback delegates to the render callback again.
        controller.set_playing(true);
        {
            let mut tick_guard = tick_slot.lock();
            let tick = tick_guard.as_mut().unwrap();
            tick(&[], &mut output, &info);
        }
        assert_eq!(renders.load(Ordering::SeqCst), 1);
        assert!(output.iter().all(|&s| s == 0.5));
    }
}
