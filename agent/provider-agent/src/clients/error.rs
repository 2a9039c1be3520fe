use crate::error::{ErrorMessage, KindedError};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// The result type returned by [`Appliance`], [`Tracker`] and [`KeyValueCache`] implementations.
///
/// [`Appliance`]: crate::clients::Appliance
/// [`Tracker`]: crate::clients::Tracker
/// [`KeyValueCache`]: crate::clients::KeyValueCache
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// The error type returned by the clients of the appliance, the tracker and the cache.
#[derive(Debug)]
pub enum ClientError {
    /// The client could not be created.
    InitializationFailed(Option<Box<dyn std::error::Error + Send + Sync + 'static>>),

    /// Some data that was expected to be present was not found.
    MissingData(Option<ErrorMessage>),

    /// A request to the appliance or the tracker failed.
    RequestFailed(Option<Box<dyn std::error::Error + Send + Sync + 'static>>),

    /// An error occurred serializing or deserializing.
    Serialization(Option<Box<dyn std::error::Error + Send + Sync + 'static>>),

    /// Reading or writing the persistent cache failed.
    Storage(Option<Box<dyn std::error::Error + Send + Sync + 'static>>),

    /// A condition was still not met when the wait timed out.
    Timeout(Option<ErrorMessage>),

    /// The client cannot perform the operation at all.
    Unsupported(Option<ErrorMessage>),
}

impl ClientError {
    pub fn missing_data<S: Into<String>>(message: S) -> Self {
        ClientError::MissingData(Some(message.into().into()))
    }

    pub fn request_failed<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        ClientError::RequestFailed(Some(source.into()))
    }

    pub fn unsupported<S: Into<String>>(message: S) -> Self {
        ClientError::Unsupported(Some(message.into().into()))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout(_))
    }
}

impl KindedError for ClientError {
    fn kind(&self) -> &'static str {
        match self {
            ClientError::InitializationFailed(_) => "Initialization failed",
            ClientError::MissingData(_) => "Missing data",
            ClientError::RequestFailed(_) => "Request failed",
            ClientError::Serialization(_) => "Serialization error",
            ClientError::Storage(_) => "Storage error",
            ClientError::Timeout(_) => "Timed out",
            ClientError::Unsupported(_) => "Unsupported",
        }
    }

    fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        match self {
            ClientError::InitializationFailed(e)
            | ClientError::RequestFailed(e)
            | ClientError::Serialization(e)
            | ClientError::Storage(e) => e.as_deref(),
            ClientError::MissingData(message)
            | ClientError::Timeout(message)
            | ClientError::Unsupported(message) => message
                .as_ref()
                .map(|message| message as &(dyn Error + Send + Sync + 'static)),
        }
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause_as_source()
    }
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.write_kind_and_cause(f)
    }
}
