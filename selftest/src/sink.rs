use provider_agent::artifacts::ArtifactSink;
use serde_json::Value;
use std::sync::{Mutex, PoisonError};

/// One fired artifact hook.
#[derive(Debug, Clone, PartialEq)]
pub struct HookEvent {
    pub node_id: String,
    pub hook: String,
    pub data: Value,
}

/// An [`ArtifactSink`] that remembers every hook it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<HookEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<HookEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ArtifactSink for RecordingSink {
    fn fire_test_hook(&self, node_id: &str, hook: &str, data: Value) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(HookEvent {
                node_id: node_id.to_string(),
                hook: hook.to_string(),
                data,
            });
    }
}
