use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
pub struct Error(OpaqueError);
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error means that a catalog lookup found nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(self.0, OpaqueError::ProviderNotFound { .. })
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum OpaqueError {
    #[snafu(display("Unable to read catalog file '{}': {}", path.display(), source))]
    CatalogRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to parse catalog {}: {}", what, source))]
    CatalogParse {
        what: String,
        source: serde_yaml::Error,
    },

    #[snafu(display("Catalog section '{}' must be a mapping", section))]
    CatalogShape { section: String },

    #[snafu(display("Invalid class reference '{}'", value))]
    InvalidClassRef { value: String },

    #[snafu(display("Provider '{}' has invalid data: {}", key, what))]
    InvalidProviderData { key: String, what: String },

    #[snafu(display("Invalid version restriction '{}'", restriction))]
    InvalidVersionRestriction { restriction: String },

    #[snafu(display("Provider '{}' has no usable '{}' endpoint", key, endpoint))]
    MissingDefaultEndpoint { key: String, endpoint: String },

    #[snafu(display("Unknown provider: '{}'", key))]
    ProviderNotFound { key: String },

    #[snafu(display("Parse error: {}", source))]
    SerdePlain { source: serde_plain::Error },

    #[snafu(display("Provider '{}' has unknown provider type '{}'", key, type_name))]
    UnknownProviderType { key: String, type_name: String },
}
