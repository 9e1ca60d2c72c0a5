//! MIDI port reconciler
//!
//! A background poll loop that keeps the set of open MIDI input handles in
//! sync with the live hardware port list and the connection policy. Each
//! cycle enumerates, prunes tracked ports whose `(index, name)` pair no
//! longer matches, reconciles survivors against the policy, discovers new
//! ports, and emits at most one coalesced "state changed" notification.
//!
//! Policy setters wake the loop immediately so changes take effect within
//! one cycle instead of waiting out the full poll interval.

use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

use super::device::{MidiBackend, MidiDeviceInfo, MidiMessageFn};
use super::policy::ConnectionPolicy;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One tracked port. The native connection handle lives here and nowhere
/// else; dropping it closes the port.
struct TrackedPort<C> {
    index: usize,
    name: String,
    conn: Option<C>,
}

struct Tracked<C> {
    ports: Vec<TrackedPort<C>>,
    policy: ConnectionPolicy,
}

struct Shared<C> {
    state: Mutex<Tracked<C>>,
}

/// Keeps MIDI input connections converged on the connection policy.
///
/// Owns one background poll thread for its whole lifetime; dropping the
/// reconciler signals shutdown, joins the thread, and closes every tracked
/// handle before the backend itself is released.
pub struct MidiPortReconciler<B: MidiBackend + 'static> {
    shared: Arc<Shared<B::Connection>>,
    wake_tx: Sender<()>,
    exit_tx: Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl<B: MidiBackend + 'static> MidiPortReconciler<B> {
    /// Start a reconciler polling once per second.
    ///
    /// `on_message` receives the raw bytes of every message from every
    /// connected port. `notify` carries the coalesced change signal: one
    /// send per cycle that changed anything, delivered non-blocking (a full
    /// channel drops the signal rather than stalling the poll loop).
    pub fn new(
        backend: B,
        policy: ConnectionPolicy,
        on_message: MidiMessageFn,
        notify: Sender<()>,
    ) -> Self {
        Self::with_poll_interval(backend, policy, on_message, notify, POLL_INTERVAL)
    }

    /// Same as [`new`](Self::new) with an explicit poll interval.
    pub fn with_poll_interval(
        backend: B,
        policy: ConnectionPolicy,
        on_message: MidiMessageFn,
        notify: Sender<()>,
        interval: Duration,
    ) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(Tracked {
                ports: Vec::new(),
                policy,
            }),
        });
        let (wake_tx, wake_rx) = bounded(1);
        let (exit_tx, exit_rx) = bounded(1);

        let thread = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                poll_loop(backend, shared, on_message, notify, interval, wake_rx, exit_rx)
            })
        };

        Self {
            shared,
            wake_tx,
            exit_tx,
            thread: Some(thread),
        }
    }

    /// Set the global auto-connect default and wake the poll loop.
    pub fn set_auto_connect(&self, auto_connect: bool) {
        self.shared.state.lock().policy.set_auto_connect(auto_connect);
        self.wake();
    }

    pub fn auto_connect(&self) -> bool {
        self.shared.state.lock().policy.auto_connect()
    }

    /// Set a per-name connect override and wake the poll loop.
    pub fn set_connect(&self, name: &str, connect: bool) {
        self.shared.state.lock().policy.set_connect(name, connect);
        self.wake();
    }

    /// Read-only copy of the tracked set. Never exposes native handles.
    pub fn devices(&self) -> Vec<MidiDeviceInfo> {
        self.shared
            .state
            .lock()
            .ports
            .iter()
            .map(|port| MidiDeviceInfo {
                index: port.index,
                name: port.name.clone(),
                connected: port.conn.is_some(),
            })
            .collect()
    }

    fn wake(&self) {
        // Capacity 1: a wake already pending covers this one too.
        let _ = self.wake_tx.try_send(());
    }
}

impl<B: MidiBackend + 'static> Drop for MidiPortReconciler<B> {
    fn drop(&mut self) {
        let _ = self.exit_tx.try_send(());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn poll_loop<B: MidiBackend>(
    backend: B,
    shared: Arc<Shared<B::Connection>>,
    on_message: MidiMessageFn,
    notify: Sender<()>,
    interval: Duration,
    wake_rx: Receiver<()>,
    exit_rx: Receiver<()>,
) {
    let ticker = tick(interval);
    loop {
        if let Err(e) = poll_cycle(&backend, &shared, &on_message, &notify) {
            log::warn!("MIDI poll cycle failed: {}", e);
        }
        select! {
            recv(exit_rx) -> _ => break,
            recv(wake_rx) -> _ => {}
            recv(ticker) -> _ => {}
        }
    }
    // Teardown: every tracked handle closes before the backend goes away.
    shared.state.lock().ports.clear();
}

/// One reconciliation cycle. Enumeration failure aborts the cycle without
/// touching tracked state; everything else degrades to a log line.
///
/// Native open/close calls happen outside the tracked-set mutex so that
/// `devices()` callers are never blocked on a slow port open: the cycle
/// computes a plan under the lock, applies it unlocked, then re-locks to
/// install the successfully opened handles.
fn poll_cycle<B: MidiBackend>(
    backend: &B,
    shared: &Shared<B::Connection>,
    on_message: &MidiMessageFn,
    notify: &Sender<()>,
) -> Result<(), String> {
    let names = backend.port_names()?;

    let mut changed = false;
    let mut to_close: Vec<B::Connection> = Vec::new();
    let mut to_open: Vec<(usize, String)> = Vec::new();

    {
        let mut state = shared.state.lock();
        let Tracked { ports, policy } = &mut *state;

        // Prune before discover: a port that vanished and was replaced at
        // the same index within one cycle is treated as fresh hardware,
        // never silently kept connected across the identity change.
        let mut kept = Vec::with_capacity(names.len());
        for mut port in ports.drain(..) {
            let still_present = port.index < names.len() && names[port.index] == port.name;
            if still_present {
                kept.push(port);
            } else {
                log::info!("MIDI port '{}' at index {} is gone", port.name, port.index);
                if let Some(conn) = port.conn.take() {
                    to_close.push(conn);
                }
                changed = true;
            }
        }
        *ports = kept;

        // Reconcile survivors against the policy.
        for port in ports.iter_mut() {
            let desired = policy.should_connect(&port.name);
            if desired && port.conn.is_none() {
                to_open.push((port.index, port.name.clone()));
            } else if !desired && port.conn.is_some() {
                log::info!("Disconnecting MIDI port '{}'", port.name);
                to_close.extend(port.conn.take());
                changed = true;
            }
        }

        // Discover ports with no matching tracked entry. A new port the
        // policy declines is tracked silently without marking the cycle
        // changed; with auto-connect off, notifying on every first sighting
        // would amount to a notification storm.
        for (index, name) in names.iter().enumerate() {
            if ports.iter().any(|p| p.index == index && p.name == *name) {
                continue;
            }
            log::info!("Discovered MIDI port '{}' at index {}", name, index);
            if policy.should_connect(name) {
                to_open.push((index, name.clone()));
            }
            ports.push(TrackedPort {
                index,
                name: name.clone(),
                conn: None,
            });
        }
    }

    drop(to_close);

    let mut opened = Vec::with_capacity(to_open.len());
    for (index, name) in to_open {
        match backend.connect(index, &name, Arc::clone(on_message)) {
            Ok(conn) => opened.push((index, name, conn)),
            Err(e) => log::warn!("Failed to connect MIDI port '{}': {}", name, e),
        }
    }

    if !opened.is_empty() {
        let mut state = shared.state.lock();
        let Tracked { ports, policy } = &mut *state;
        for (index, name, conn) in opened {
            let slot = ports
                .iter_mut()
                .find(|p| p.index == index && p.name == name && p.conn.is_none());
            match slot {
                Some(port) if policy.should_connect(&port.name) => {
                    log::info!("Connected MIDI port '{}'", port.name);
                    port.conn = Some(conn);
                    changed = true;
                }
                // The port vanished or the policy flipped while the open was
                // in flight; drop the fresh handle and let the next cycle
                // settle it.
                _ => drop(conn),
            }
        }
    }

    if changed {
        // Coalesced: exactly one signal per cycle, dropped if the listener
        // is not draining.
        let _ = notify.try_send(());
    }

    Ok(())
}
