use log::info;
use serde_json::Value;

/// The hook that records why a test was skipped.
pub use provsys_model::constants::SKIP_TEST_HOOK;

/// Where the harness reports per-test events for reporting tools.
pub trait ArtifactSink: Send + Sync {
    fn fire_test_hook(&self, node_id: &str, hook: &str, data: Value);
}

/// An [`ArtifactSink`] that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ArtifactSink for LogSink {
    fn fire_test_hook(&self, node_id: &str, hook: &str, data: Value) {
        info!("{} '{}': {}", hook, node_id, data);
    }
}
