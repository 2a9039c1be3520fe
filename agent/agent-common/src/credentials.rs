use log::debug;
use provsys_model::CredentialRef;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};
use std::path::Path;

/// A resolved credential. Catalog credentials are written either with `principal`/`secret` or
/// with `username`/`password`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(alias = "username")]
    pub principal: String,
    #[serde(alias = "password")]
    pub secret: String,
    #[serde(default)]
    pub verify_secret: Option<String>,
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("principal", &self.principal)
            .field("secret", &"********")
            .finish()
    }
}

/// Resolves the credential references found in the provider catalog.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    credentials: BTreeMap<String, Credential>,
}

#[derive(Debug)]
pub struct Error {
    name: CredentialRef,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(name: CredentialRef) -> Self {
        Self { name, source: None }
    }

    pub fn new_with_source<E>(name: CredentialRef, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Self {
            name,
            source: Some(source.into()),
        }
    }

    /// The credential that could not be resolved.
    pub fn name(&self) -> &CredentialRef {
        &self.name
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            None => write!(f, "Unable to resolve credential '{}'", self.name),
            Some(e) => write!(f, "Unable to resolve credential '{}': {}", self.name, e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|some| some.as_ref() as &(dyn std::error::Error + 'static))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl CredentialStore {
    pub fn new(credentials: BTreeMap<String, Credential>) -> Self {
        Self { credentials }
    }

    /// Read the credential store from a YAML mapping of `<name>: {principal, secret}`.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let credentials =
            serde_yaml::from_str(yaml).context(error::ParseSnafu { what: "document" })?;
        Ok(Self { credentials })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading credentials from '{}'", path.display());
        let contents = std::fs::read_to_string(path).context(error::ReadFileSnafu { path })?;
        let credentials = serde_yaml::from_str(&contents).context(error::ParseSnafu {
            what: path.display().to_string(),
        })?;
        Ok(Self { credentials })
    }

    pub fn get(&self, name: &CredentialRef) -> Result<&Credential> {
        Ok(self
            .credentials
            .get(name.as_str())
            .context(error::NotFoundSnafu { name: name.clone() })?)
    }

    pub fn contains(&self, name: &CredentialRef) -> bool {
        self.credentials.contains_key(name.as_str())
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

mod error {
    use provsys_model::CredentialRef;
    use snafu::Snafu;
    use std::path::PathBuf;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub enum OpaqueError {
        #[snafu(display("Credential not found"))]
        NotFound { name: CredentialRef },

        #[snafu(display("Unable to parse credentials {}: {}", what, source))]
        Parse {
            what: String,
            source: serde_yaml::Error,
        },

        #[snafu(display("Unable to read file '{}': {}", path.display(), source))]
        ReadFile {
            path: PathBuf,
            source: std::io::Error,
        },
    }

    impl OpaqueError {
        fn credential_name(&self) -> CredentialRef {
            match self {
                OpaqueError::NotFound { name } => name.clone(),
                OpaqueError::Parse { .. } | OpaqueError::ReadFile { .. } => {
                    CredentialRef::new("*")
                }
            }
        }
    }

    impl From<OpaqueError> for super::Error {
        fn from(e: OpaqueError) -> Self {
            let name = e.credential_name();
            super::Error::new_with_source(name, e)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    const CREDENTIALS: &str = r#"
vsphere:
  principal: administrator@vsphere.local
  secret: hunter2
rhv:
  username: admin@internal
  password: redhat
  verify_secret: redhat
"#;

    #[test]
    fn resolves_both_spellings() {
        let store = CredentialStore::from_yaml_str(CREDENTIALS).unwrap();
        assert_eq!(store.len(), 2);
        let vsphere = store.get(&CredentialRef::new("vsphere")).unwrap();
        assert_eq!(vsphere.principal, "administrator@vsphere.local");
        assert_eq!(vsphere.verify_secret, None);
        let rhv = store.get(&CredentialRef::new("rhv")).unwrap();
        assert_eq!(rhv.principal, "admin@internal");
        assert_eq!(rhv.secret, "redhat");
        assert_eq!(rhv.verify_secret.as_deref(), Some("redhat"));
    }

    #[test]
    fn unknown_reference_names_the_credential() {
        let store = CredentialStore::from_yaml_str(CREDENTIALS).unwrap();
        let err = store.get(&CredentialRef::new("aws")).unwrap_err();
        assert_eq!(err.name().as_str(), "aws");
        assert!(err.to_string().contains("'aws'"));
    }

    #[test]
    fn secrets_are_not_logged() {
        let store = CredentialStore::from_yaml_str(CREDENTIALS).unwrap();
        let debug = format!("{:?}", store.get(&CredentialRef::new("vsphere")).unwrap());
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn reads_file() {
        let tempdir = tempfile::TempDir::new().unwrap();
        let path = tempdir.path().join("credentials.yaml");
        fs::write(&path, CREDENTIALS).unwrap();
        let store = CredentialStore::from_file(&path).unwrap();
        assert!(store.contains(&CredentialRef::new("rhv")));
        assert!(CredentialStore::from_file(tempdir.path().join("missing.yaml")).is_err());
    }
}
