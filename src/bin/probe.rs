//! Device-layer probe
//!
//! Lists the audio and MIDI devices, opens the first output-capable audio
//! device with a test tone standing in for the synthesis engine, and runs
//! the MIDI reconciler with auto-connect for a few seconds, logging raw
//! messages and topology changes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use patchbay::{
    AudioStreamController, ConnectionPolicy, CpalBackend, MidiMessageFn, MidiPortReconciler,
    MidirBackend, RenderFn,
};

const RUN_FOR: Duration = Duration::from_secs(10);
const TONE_HZ: f32 = 440.0;

/// Sine render callback. Phase is carried as f32 bits in an atomic so the
/// realtime path stays lock-free.
fn tone_render() -> RenderFn {
    let phase_bits = AtomicU32::new(0.0f32.to_bits());
    Arc::new(move |_input, output, tick| {
        let mut phase = f32::from_bits(phase_bits.load(Ordering::Relaxed));
        let step = TONE_HZ / tick.sample_rate as f32;
        let channels = tick.output_channels as usize;
        for frame in output.chunks_mut(channels) {
            let sample = (phase * std::f32::consts::TAU).sin() * 0.2;
            for slot in frame {
                *slot = sample;
            }
            phase += step;
            if phase >= 1.0 {
                phase -= 1.0;
            }
        }
        phase_bits.store(phase.to_bits(), Ordering::Relaxed);
    })
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let audio_backend = match CpalBackend::new() {
        Ok(backend) => backend,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };
    let controller = AudioStreamController::new(audio_backend, tone_render());

    let devices = controller.devices();
    println!("Audio devices:");
    for device in &devices {
        println!(
            "  [{}] {} ({} in / {} out, default {} Hz)",
            device.index,
            device.name,
            device.input_channels,
            device.output_channels,
            device.default_sample_rate
        );
    }

    if let Some(device) = devices.iter().find(|d| d.output_channels > 0) {
        controller.open(device.index, device.default_sample_rate, 512, 0, 2);
        match controller.current() {
            Some(current) => println!("Playing a test tone on '{}'", current.name),
            None => println!("Audio stream did not open; continuing without audio"),
        }
    } else {
        println!("No output-capable audio device found");
    }

    let midi_backend = match MidirBackend::new() {
        Ok(backend) => backend,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };
    let on_message: MidiMessageFn = Arc::new(|message: &[u8]| {
        let hex: Vec<String> = message.iter().map(|b| format!("{:02X}", b)).collect();
        log::info!("MIDI message: {}", hex.join(" "));
    });
    let (notify_tx, notify_rx) = crossbeam_channel::bounded(8);
    let reconciler = MidiPortReconciler::new(
        midi_backend,
        ConnectionPolicy::new(true),
        on_message,
        notify_tx,
    );

    println!("Watching MIDI ports for {:?} (play something!)", RUN_FOR);
    let deadline = std::time::Instant::now() + RUN_FOR;
    loop {
        let now = std::time::Instant::now();
        if now >= deadline {
            break;
        }
        match notify_rx.recv_timeout(deadline - now) {
            Ok(()) => {
                println!("MIDI topology changed:");
                for device in reconciler.devices() {
                    println!(
                        "  [{}] {} ({})",
                        device.index,
                        device.name,
                        if device.connected {
                            "connected"
                        } else {
                            "disconnected"
                        }
                    );
                }
            }
            Err(_) => break,
        }
    }

    drop(reconciler);
    drop(controller);
}
