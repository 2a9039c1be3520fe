use crate::class::{Category, ProviderClass};
use crate::constants::{DEFAULT_ENDPOINT, EXCLUDED_TEST_FLAGS, TAG_DO_NOT_PREFER};
use crate::error::{self, Result};
use crate::version::LooseVersion;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::{ensure, OptionExt};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

/// The name of a credential in the credential store, e.g. `vsphere67`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CredentialRef(String);

impl CredentialRef {
    pub fn new<S: Into<String>>(s: S) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CredentialRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The configuration of one provider endpoint as written in the catalog.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Endpoint {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub ipaddress: Option<String>,
    #[serde(default)]
    pub api_port: Option<u16>,
    #[serde(default)]
    pub credentials: Option<CredentialRef>,
    /// Everything else (`verify_tls`, `security_protocol`, `api_version`, ...).
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl Endpoint {
    pub fn is_empty(&self) -> bool {
        self.hostname.is_none()
            && self.ipaddress.is_none()
            && self.api_port.is_none()
            && self.credentials.is_none()
            && self.settings.is_empty()
    }
}

/// An immutable catalog entry for a provider. Descriptors are cheap to pass around at collection
/// time: they hold no connection to the provider or to the appliance.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ProviderDescriptor {
    key: String,
    name: String,
    class: ProviderClass,
    version: Option<String>,
    tags: BTreeSet<String>,
    flags: BTreeSet<String>,
    endpoints: BTreeMap<String, Endpoint>,
    credential_refs: BTreeMap<String, CredentialRef>,
    data: Value,
}

impl ProviderDescriptor {
    /// Build a descriptor from the `management_systems.<key>` entry of the catalog. `test_flags`
    /// are the catalog-wide flags that the provider may narrow with `excluded_test_flags`.
    pub fn from_config(key: &str, data: Value, test_flags: &BTreeSet<String>) -> Result<Self> {
        let map = data.as_object().context(error::InvalidProviderDataSnafu {
            key,
            what: "entry is not a mapping",
        })?;

        let type_name = map
            .get("type")
            .and_then(Value::as_str)
            .context(error::InvalidProviderDataSnafu {
                key,
                what: "missing 'type'",
            })?;
        let class: ProviderClass =
            type_name
                .parse()
                .map_err(|_| error::OpaqueError::UnknownProviderType {
                    key: key.to_string(),
                    type_name: type_name.to_string(),
                })?;

        let name = map
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(key)
            .to_string();

        let version = map.get("version").and_then(scalar_to_string);

        let tags = string_set(map.get("tags"));
        let excluded = string_set(map.get(EXCLUDED_TEST_FLAGS));
        let flags = test_flags.difference(&excluded).cloned().collect();

        let endpoints: BTreeMap<String, Endpoint> = match map.get("endpoints") {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                error::OpaqueError::InvalidProviderData {
                    key: key.to_string(),
                    what: format!("malformed endpoints: {}", e),
                }
            })?,
            None => BTreeMap::new(),
        };
        ensure!(
            endpoints
                .get(DEFAULT_ENDPOINT)
                .map(|e| !e.is_empty())
                .unwrap_or(false),
            error::MissingDefaultEndpointSnafu {
                key,
                endpoint: DEFAULT_ENDPOINT,
            }
        );

        let credential_refs = endpoints
            .iter()
            .filter_map(|(role, endpoint)| {
                endpoint
                    .credentials
                    .as_ref()
                    .map(|cred| (role.clone(), cred.clone()))
            })
            .collect();

        Ok(Self {
            key: key.to_string(),
            name,
            class,
            version,
            tags,
            flags,
            endpoints,
            credential_refs,
            data,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The display name the provider is registered under on the appliance.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> ProviderClass {
        self.class
    }

    pub fn type_name(&self) -> &'static str {
        self.class.type_name()
    }

    pub fn category(&self) -> Category {
        self.class.category()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// The version used for ordering, `0` when the catalog declares none.
    pub fn loose_version(&self) -> LooseVersion {
        self.version
            .as_deref()
            .map(LooseVersion::new)
            .unwrap_or_default()
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn flags(&self) -> &BTreeSet<String> {
        &self.flags
    }

    /// Whether the provider should only be used when nothing else matches.
    pub fn is_preferred(&self) -> bool {
        let flagged = self
            .data
            .get(TAG_DO_NOT_PREFER)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        !(flagged || self.has_tag(TAG_DO_NOT_PREFER))
    }

    pub fn endpoints(&self) -> &BTreeMap<String, Endpoint> {
        &self.endpoints
    }

    pub fn default_endpoint(&self) -> &Endpoint {
        // Construction guarantees the default endpoint.
        &self.endpoints[DEFAULT_ENDPOINT]
    }

    pub fn credential_refs(&self) -> &BTreeMap<String, CredentialRef> {
        &self.credential_refs
    }

    /// The cloud region the provider lives in, if any.
    pub fn region(&self) -> Option<&str> {
        self.data.get("region").and_then(Value::as_str)
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Resolve a path of mapping keys in the provider's data.
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        path.iter()
            .try_fold(&self.data, |value, segment| value.get(segment.as_ref()))
    }

    /// Resolve a dotted path, e.g. `templates.small_template.name`.
    pub fn lookup_dotted(&self, path: &str) -> Option<&Value> {
        let segments: Vec<&str> = path.split('.').collect();
        self.lookup(&segments)
    }

    /// The id used when legacy ids are off: `<type>-<version>` or just `<type>`.
    pub fn the_id(&self) -> String {
        match &self.version {
            Some(version) => format!("{}-{}", self.type_name(), version),
            None => self.type_name().to_string(),
        }
    }
}

impl Display for ProviderDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({})[{}]",
            self.type_name(),
            self.category(),
            self.version.as_deref().unwrap_or("")
        )
    }
}

pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accept either a list of strings or a comma-separated string.
pub(crate) fn string_set(value: Option<&Value>) -> BTreeSet<String> {
    match value {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(scalar_to_string)
            .map(|s| s.trim().to_string())
            .collect(),
        _ => BTreeSet::new(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn flags() -> BTreeSet<String> {
        ["provision", "v2v"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn builds_from_catalog_entry() {
        let data = json!({
            "name": "vSphere 6.7",
            "type": "virtualcenter",
            "version": 6.7,
            "tags": ["perf"],
            "excluded_test_flags": "v2v",
            "endpoints": {
                "default": {"hostname": "vc1.example.com", "credentials": "vsphere"},
                "ssh": {"hostname": "vc1.example.com", "credentials": "vsphere_ssh"}
            },
            "templates": {"small_template": {"name": "small_vm", "creds": "ssh"}}
        });
        let d = ProviderDescriptor::from_config("vc1", data, &flags()).unwrap();
        assert_eq!(d.key(), "vc1");
        assert_eq!(d.name(), "vSphere 6.7");
        assert_eq!(d.type_name(), "virtualcenter");
        assert_eq!(d.category(), Category::Infra);
        assert_eq!(d.version(), Some("6.7"));
        assert!(d.has_tag("perf"));
        assert!(d.flags().contains("provision"));
        assert!(!d.flags().contains("v2v"));
        assert_eq!(d.credential_refs().len(), 2);
        assert_eq!(
            d.lookup_dotted("templates.small_template.name"),
            Some(&json!("small_vm"))
        );
        assert_eq!(d.the_id(), "virtualcenter-6.7");
    }

    #[test]
    fn default_endpoint_is_mandatory() {
        let data = json!({"type": "rhevm", "endpoints": {"candu": {"hostname": "db"}}});
        assert!(ProviderDescriptor::from_config("rhv", data, &flags()).is_err());
        let data = json!({"type": "rhevm", "endpoints": {"default": {}}});
        assert!(ProviderDescriptor::from_config("rhv", data, &flags()).is_err());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let data = json!({"type": "kubevirt", "endpoints": {"default": {"hostname": "h"}}});
        assert!(ProviderDescriptor::from_config("kv", data, &flags()).is_err());
    }

    #[test]
    fn do_not_prefer_by_tag_or_data() {
        let tagged = json!({
            "type": "ec2", "tags": ["do_not_prefer"],
            "endpoints": {"default": {"credentials": "aws"}}
        });
        let flagged = json!({
            "type": "ec2", "do_not_prefer": true,
            "endpoints": {"default": {"credentials": "aws"}}
        });
        let plain = json!({"type": "ec2", "endpoints": {"default": {"credentials": "aws"}}});
        assert!(!ProviderDescriptor::from_config("a", tagged, &flags())
            .unwrap()
            .is_preferred());
        assert!(!ProviderDescriptor::from_config("b", flagged, &flags())
            .unwrap()
            .is_preferred());
        assert!(ProviderDescriptor::from_config("c", plain, &flags())
            .unwrap()
            .is_preferred());
    }
}
