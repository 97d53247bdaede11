use std::collections::HashMap;

use crate::value::Payload;

/// Construction-time configuration for an [`crate::Engine`].
///
/// Mirrors the teacher's `nakamoto_node::Config` — a plain data struct with
/// a [`Default`] impl, handed to the engine constructor rather than threaded
/// through individual arguments.
#[derive(Debug, Clone)]
pub struct Config {
    /// OSC address namespace every datagram is prefixed with.
    pub namespace: String,
    /// State entries to seed before the first `poll`. `/BPM` is added
    /// automatically if absent.
    pub initial_state: HashMap<String, Payload>,
}

impl Config {
    /// A config using the default namespace and no initial state beyond
    /// `/BPM`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an additional state entry before construction.
    pub fn with_state(mut self, address: impl Into<String>, value: impl Into<Payload>) -> Self {
        self.initial_state.insert(address.into(), value.into());
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: crate::constants::NAMESPACE.to_string(),
            initial_state: HashMap::new(),
        }
    }
}
