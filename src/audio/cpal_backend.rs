//! cpal implementation of the audio backend
//!
//! cpal streams are not `Send`, so each open stream lives on a dedicated
//! worker thread that builds the streams, reports the outcome back to the
//! opener, and parks until told to shut down. Duplex is realised as one
//! input and one output stream on the same device, bridged by a lock-free
//! ring buffer; the input callback only pushes samples, the output callback
//! pops them and drives the tick.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender};
use ringbuf::{traits::*, HeapRb};
use std::thread;

use super::device::{list_audio_devices, AudioDeviceInfo};
use super::stream::{AudioBackend, StreamRequest, StreamTick, TickFn};

/// Upper bound on frames per buffer used to pre-size the input scratch
/// buffer, so the output callback never allocates.
const MAX_FRAMES: usize = 8_192;

struct StreamWorker {
    stop_tx: Sender<()>,
    handle: thread::JoinHandle<()>,
}

/// Audio backend backed by the default cpal host.
pub struct CpalBackend {
    worker: Option<StreamWorker>,
}

impl CpalBackend {
    /// Probe the default host once so a missing audio backend surfaces as a
    /// construction failure rather than a string of per-call errors.
    pub fn new() -> Result<Self, String> {
        let host = cpal::default_host();
        host.devices()
            .map_err(|e| format!("Failed to create audio backend: {}", e))?;
        Ok(Self { worker: None })
    }
}

impl AudioBackend for CpalBackend {
    fn devices(&self) -> Result<Vec<AudioDeviceInfo>, String> {
        list_audio_devices()
    }

    fn open(&mut self, request: &StreamRequest, tick: TickFn) -> Result<(), String> {
        self.close();

        let request = *request;
        let (ready_tx, ready_rx): (Sender<Result<(), String>>, Receiver<Result<(), String>>) =
            bounded(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::spawn(move || match build_streams(&request, tick) {
            Ok(streams) => {
                let _ = ready_tx.send(Ok(()));
                // Park until close; the streams stay alive until dropped.
                let _ = stop_rx.recv();
                drop(streams);
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
            }
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(StreamWorker { stop_tx, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err("Audio worker exited before reporting stream state".to_string())
            }
        }
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.handle.join();
        }
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.close();
    }
}

fn stream_config(channels: u16, request: &StreamRequest) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(request.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(request.buffer_frames),
    }
}

/// Build and start the streams for `request` on the calling thread. Returns
/// the live streams; dropping them closes the device.
fn build_streams(request: &StreamRequest, tick: TickFn) -> Result<Vec<cpal::Stream>, String> {
    let host = cpal::default_host();
    let device = host
        .devices()
        .map_err(|e| format!("Failed to enumerate devices: {}", e))?
        .nth(request.device_index)
        .ok_or_else(|| format!("Audio device index {} not found", request.device_index))?;

    let err_fn = |e| log::error!("Audio stream error: {}", e);

    let mut streams = Vec::with_capacity(2);
    let in_channels = request.input_channels;
    let out_channels = request.output_channels;

    if in_channels > 0 && out_channels > 0 {
        // Duplex: capture feeds a ring buffer, the output side drives the
        // tick with whatever input has arrived. Queue depth of a few buffers
        // absorbs scheduling jitter between the two callbacks.
        let ring = HeapRb::<f32>::new(request.buffer_frames as usize * in_channels as usize * 8);
        let (mut producer, mut consumer) = ring.split();

        let input_stream = device
            .build_input_stream(
                &stream_config(in_channels, request),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Overruns drop the newest samples; the output side zero
                    // fills whatever is missing.
                    let _ = producer.push_slice(data);
                },
                err_fn,
                None,
            )
            .map_err(|e| format!("Failed to build input stream: {}", e))?;

        let mut tick = tick;
        let mut scratch = vec![0.0f32; MAX_FRAMES * in_channels as usize];
        let sample_rate = request.sample_rate;
        let output_stream = device
            .build_output_stream(
                &stream_config(out_channels, request),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / out_channels as usize;
                    let wanted = (frames * in_channels as usize).min(scratch.len());
                    let got = consumer.pop_slice(&mut scratch[..wanted]);
                    scratch[got..wanted].fill(0.0);
                    tick(
                        &scratch[..wanted],
                        data,
                        &StreamTick {
                            sample_rate,
                            frames: frames as u32,
                            input_channels: in_channels,
                            output_channels: out_channels,
                            output_underflow: false,
                        },
                    );
                },
                err_fn,
                None,
            )
            .map_err(|e| format!("Failed to build output stream: {}", e))?;

        input_stream
            .play()
            .map_err(|e| format!("Failed to start input stream: {}", e))?;
        output_stream
            .play()
            .map_err(|e| format!("Failed to start output stream: {}", e))?;
        streams.push(input_stream);
        streams.push(output_stream);
    } else if out_channels > 0 {
        let mut tick = tick;
        let sample_rate = request.sample_rate;
        let output_stream = device
            .build_output_stream(
                &stream_config(out_channels, request),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = (data.len() / out_channels as usize) as u32;
                    tick(
                        &[],
                        data,
                        &StreamTick {
                            sample_rate,
                            frames,
                            input_channels: 0,
                            output_channels: out_channels,
                            output_underflow: false,
                        },
                    );
                },
                err_fn,
                None,
            )
            .map_err(|e| format!("Failed to build output stream: {}", e))?;
        output_stream
            .play()
            .map_err(|e| format!("Failed to start output stream: {}", e))?;
        streams.push(output_stream);
    } else if in_channels > 0 {
        // Capture-only: the tick runs from the input callback with an empty
        // output buffer.
        let mut tick = tick;
        let sample_rate = request.sample_rate;
        let input_stream = device
            .build_input_stream(
                &stream_config(in_channels, request),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let frames = (data.len() / in_channels as usize) as u32;
                    tick(
                        data,
                        &mut [],
                        &StreamTick {
                            sample_rate,
                            frames,
                            input_channels: in_channels,
                            output_channels: 0,
                            output_underflow: false,
                        },
                    );
                },
                err_fn,
                None,
            )
            .map_err(|e| format!("Failed to build input stream: {}", e))?;
        input_stream
            .play()
            .map_err(|e| format!("Failed to start input stream: {}", e))?;
        streams.push(input_stream);
    } else {
        return Err("Refusing to open a stream with no channels in either direction".to_string());
    }

    Ok(streams)
}
