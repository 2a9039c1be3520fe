use std::fmt::{Display, Formatter};

/// When a provider operation returns an error, it must state whether the provider record may
/// still be present on the appliance.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Remnant {
    /// The operation failed and nothing of the provider is left on the appliance.
    /// - The setup engine does **not** check for a half-created provider.
    Clear,

    /// The operation failed after the appliance accepted the provider.
    /// - The setup engine **will** delete the provider.
    Remaining,

    /// It is unknown whether the appliance has a record of the provider.
    /// - The setup engine **will** check and delete it if it exists.
    Unknown,
}

/// The error type returned by [`LiveProvider`](super::LiveProvider) operations.
#[derive(Debug)]
pub struct ProviderError {
    /// Whether or not the error has left the provider on the appliance.
    remnant: Remnant,

    /// Any message to be included with the error. This will be included in the formatted display
    /// before `inner`.
    context: Option<String>,

    /// The error that caused this error.
    inner: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

/// The result type returned by [`LiveProvider`](super::LiveProvider) operations.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    pub fn new_with_source_and_context<S, E>(remnant: Remnant, context: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Self {
            remnant,
            context: Some(context.into()),
            inner: Some(source.into()),
        }
    }

    pub fn new_with_source<E>(remnant: Remnant, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Self {
            remnant,
            context: None,
            inner: Some(source.into()),
        }
    }

    pub fn new_with_context<S>(remnant: Remnant, context: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            remnant,
            context: Some(context.into()),
            inner: None,
        }
    }

    pub fn remnant(&self) -> Remnant {
        self.remnant
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn inner(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.inner.as_ref().map(|some| some.as_ref())
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.remnant())?;
        if let Some(context) = self.context() {
            write!(f, ", {}", context)?;
        }
        if let Some(inner) = self.inner() {
            write!(f, ": {}", inner)?;
        }
        Ok(())
    }
}

impl Remnant {
    pub fn message(&self) -> &'static str {
        match self {
            Remnant::Clear => "An error occurred but the provider was not left on the appliance",
            Remnant::Remaining => "An error left the provider on the appliance",
            Remnant::Unknown => {
                "An error occurred and it is unknown whether the provider was left on the appliance"
            }
        }
    }
}

impl Display for Remnant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self.message(), f)
    }
}

// Make `ProviderError` function as a standard error.
impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// A trait that makes it possible to convert error types to `ProviderError` using a familiar
/// `context` function.
pub trait IntoProviderError<T> {
    /// Convert `self` into a `ProviderError`.
    fn context<S>(self, remnant: Remnant, message: S) -> ProviderResult<T>
    where
        S: Into<String>;
}

// Implement `IntoProviderError` for all standard `Error + Send + Sync + 'static` types.
impl<T, E> IntoProviderError<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<S>(self, remnant: Remnant, message: S) -> ProviderResult<T>
    where
        S: Into<String>,
    {
        self.map_err(|e| ProviderError::new_with_source_and_context(remnant, message, e))
    }
}

// Implement `IntoProviderError` for options where `None` is converted into an error.
impl<T> IntoProviderError<T> for std::option::Option<T> {
    fn context<S>(self, remnant: Remnant, message: S) -> ProviderResult<T>
    where
        S: Into<String>,
    {
        self.ok_or_else(|| ProviderError::new_with_context(remnant, message))
    }
}

#[test]
fn display_includes_remnant_context_and_source() {
    use crate::clients::ClientError;
    let result: Result<(), ClientError> = Err(ClientError::missing_data("no such provider"));
    let error = result
        .context(Remnant::Unknown, "Unable to create provider 'vc1'")
        .unwrap_err();
    let display = error.to_string();
    assert!(display.starts_with("An error occurred and it is unknown"));
    assert!(display.contains("Unable to create provider 'vc1'"));
    assert!(display.contains("no such provider"));
    assert_eq!(error.remnant(), Remnant::Unknown);
}
