//! Connection policy for MIDI input ports
//!
//! A global auto-connect default plus per-name overrides. The reconciler
//! owns the live instance and consults it inside its critical section; the
//! hosting application mutates it only through the reconciler's setters.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Desired-connection rules for discovered MIDI ports.
///
/// An override present for a name takes precedence over the global flag;
/// absent a name, the global flag decides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionPolicy {
    auto_connect: bool,
    overrides: HashMap<String, bool>,
}

impl ConnectionPolicy {
    /// Policy with the given global default and no overrides.
    pub fn new(auto_connect: bool) -> Self {
        Self {
            auto_connect,
            overrides: HashMap::new(),
        }
    }

    /// Whether a port with this name should be connected.
    pub fn should_connect(&self, name: &str) -> bool {
        self.overrides
            .get(name)
            .copied()
            .unwrap_or(self.auto_connect)
    }

    pub fn auto_connect(&self) -> bool {
        self.auto_connect
    }

    pub fn set_auto_connect(&mut self, auto_connect: bool) {
        self.auto_connect = auto_connect;
    }

    /// Record an explicit per-name decision.
    pub fn set_connect(&mut self, name: &str, connect: bool) {
        self.overrides.insert(name.to_string(), connect);
    }
}
