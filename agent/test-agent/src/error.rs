use provider_agent::error::AgentError;
use provider_agent::Interrupt;
use snafu::Snafu;

/// Errors that stop the collection of a test. These are problems with how the test is written, not
/// with the providers, and are never turned into skips.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CollectionError {
    #[snafu(display(
        "Test '{}' has more than one provider marker for '{}' and none of them overrides the others",
        function,
        fixture
    ))]
    DuplicateProviderMarkers { function: String, fixture: String },

    #[snafu(display(
        "Test '{}' uses fixture '{}' but no provider marker parametrizes it",
        function,
        fixture
    ))]
    MissingFixture { function: String, fixture: String },

    #[snafu(display("Invalid provider marker on test '{}': {}", function, source))]
    InvalidMarker {
        function: String,
        source: serde_yaml::Error,
    },
}

/// Errors raised while a fixture value is produced for a running test.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FixtureError {
    /// The test must be skipped or uncollected. This is the expected way for a fixture to give up.
    #[snafu(display("{}", source))]
    Interrupted { source: Interrupt },

    #[snafu(display("Unable to prepare provider for '{}': {}", node_id, source))]
    Agent { node_id: String, source: AgentError },

    #[snafu(display("Unknown fixture '{}'", name))]
    UnknownFixture { name: String },

    #[snafu(display(
        "Fixture '{}' needs a parametrized provider but test '{}' was not given one",
        fixture,
        node_id
    ))]
    MissingParameter { fixture: String, node_id: String },
}

impl FixtureError {
    /// The skip or uncollect the runner has to apply, if that is what the error is.
    pub fn interrupt(&self) -> Option<&Interrupt> {
        match self {
            FixtureError::Interrupted { source } => Some(source),
            _ => None,
        }
    }
}

impl From<Interrupt> for FixtureError {
    fn from(source: Interrupt) -> Self {
        FixtureError::Interrupted { source }
    }
}

pub type CollectionResult<T> = std::result::Result<T, CollectionError>;
pub type FixtureResult<T> = std::result::Result<T, FixtureError>;
