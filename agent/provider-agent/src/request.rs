use crate::artifacts::{ArtifactSink, LogSink};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// The test on whose behalf the harness is acting.
#[derive(Clone)]
pub struct TestRequest {
    node_id: String,
    artifacts: Arc<dyn ArtifactSink>,
}

impl Debug for TestRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRequest")
            .field("node_id", &self.node_id)
            .finish()
    }
}

impl TestRequest {
    pub fn new<S: Into<String>>(node_id: S, artifacts: Arc<dyn ArtifactSink>) -> Self {
        Self {
            node_id: node_id.into(),
            artifacts,
        }
    }

    /// A request whose artifact hooks are only logged.
    pub fn logged<S: Into<String>>(node_id: S) -> Self {
        Self::new(node_id, Arc::new(LogSink))
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactSink> {
        &self.artifacts
    }
}
