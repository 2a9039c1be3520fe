use crate::clients::ClientError;
use crate::provider::ProviderError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// The error type returned when the harness cannot turn catalog data into something usable, for
/// example when a credential reference does not resolve. It is fatal for the test that needed the
/// provider and nothing else.
#[derive(Debug)]
pub enum AgentError {
    Catalog(provsys_model::Error),
    Client(ClientError),
    Credentials(agent_common::credentials::Error),
    Provider(ProviderError),
}

/// The result type returned by the provider factory and the setup engine's fallible helpers.
pub type AgentResult<T> = std::result::Result<T, AgentError>;

impl KindedError for AgentError {
    fn kind(&self) -> &'static str {
        match self {
            AgentError::Catalog(_) => "Invalid catalog data",
            AgentError::Client(_) => "Appliance or tracker failure",
            AgentError::Credentials(_) => "Unresolved credential",
            AgentError::Provider(_) => "Provider operation failed",
        }
    }

    fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        let cause: &(dyn Error + Send + Sync + 'static) = match self {
            AgentError::Catalog(e) => e,
            AgentError::Client(e) => e,
            AgentError::Credentials(e) => e,
            AgentError::Provider(e) => e,
        };
        Some(cause)
    }
}

impl Display for AgentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.write_kind_and_cause(f)
    }
}

impl Error for AgentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause_as_source()
    }
}

impl From<provsys_model::Error> for AgentError {
    fn from(e: provsys_model::Error) -> Self {
        Self::Catalog(e)
    }
}

impl From<ClientError> for AgentError {
    fn from(e: ClientError) -> Self {
        Self::Client(e)
    }
}

impl From<agent_common::credentials::Error> for AgentError {
    fn from(e: agent_common::credentials::Error) -> Self {
        Self::Credentials(e)
    }
}

impl From<ProviderError> for AgentError {
    fn from(e: ProviderError) -> Self {
        Self::Provider(e)
    }
}

/// A plain message usable wherever a boxed error is expected, for errors the clients and their
/// fakes detect themselves rather than receive from a library.
///
/// ```
/// # use provider_agent::error::ErrorMessage;
/// let message: ErrorMessage = "provider vc1 is not known to the appliance".into();
/// assert_eq!(message.to_string(), "provider vc1 is not known to the appliance");
/// ```
#[derive(Debug)]
pub struct ErrorMessage(String);

impl<S: Into<String>> From<S> for ErrorMessage {
    fn from(message: S) -> Self {
        Self(message.into())
    }
}

impl Display for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for ErrorMessage {}

/// Errors of this crate display as `<kind>: <cause>` and expose the cause as their source.
pub(crate) trait KindedError {
    fn kind(&self) -> &'static str;
    fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)>;

    fn write_kind_and_cause(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())?;
        if let Some(cause) = self.cause() {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }

    fn cause_as_source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause().map(|cause| cause as &(dyn Error + 'static))
    }
}
