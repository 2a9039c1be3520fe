use crate::constants::{MANAGEMENT_SYSTEMS, TEST_FLAGS};
use crate::descriptor::{string_set, ProviderDescriptor};
use crate::error::{self, Result};
use crate::filter::{apply_filters, GlobalFilters, ProviderFilter};
use log::{debug, trace, warn};
use serde_json::Value;
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeSet;
use std::path::Path;

/// The provider catalog: every `management_systems` entry of the layered configuration, as
/// immutable descriptors in the order they first appear. Entries that do not describe a usable
/// provider are kept aside; only looking them up by key fails.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    providers: Vec<ProviderDescriptor>,
    invalid: Vec<(String, Value)>,
    test_flags: BTreeSet<String>,
}

impl Catalog {
    /// Load the catalog from YAML files. Later files are merged over earlier ones.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut layers = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            debug!("Reading catalog layer '{}'", path.display());
            let contents =
                std::fs::read_to_string(path).context(error::CatalogReadSnafu { path })?;
            layers.push(parse_layer(&contents, &path.display().to_string())?);
        }
        Self::from_layers(layers)
    }

    /// Load the catalog from a single YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Self::from_value(parse_layer(yaml, "document")?)
    }

    /// Deep-merge the given layers in order and build the catalog from the result.
    pub fn from_layers<I>(layers: I) -> Result<Self>
    where
        I: IntoIterator<Item = Value>,
    {
        let merged = layers
            .into_iter()
            .fold(Value::Null, |mut base, layer| {
                merge(&mut base, layer);
                base
            });
        Self::from_value(merged)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let root = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(root) => root,
            _ => {
                return error::CatalogShapeSnafu { section: "<root>" }
                    .fail()
                    .map_err(Into::into)
            }
        };
        let test_flags = string_set(root.get(TEST_FLAGS));
        let systems = match root.get(MANAGEMENT_SYSTEMS) {
            None | Some(Value::Null) => return Ok(Self::with_flags(test_flags)),
            Some(systems) => systems.as_object().context(error::CatalogShapeSnafu {
                section: MANAGEMENT_SYSTEMS,
            })?,
        };
        let mut providers = Vec::with_capacity(systems.len());
        let mut invalid = Vec::new();
        for (key, data) in systems {
            match ProviderDescriptor::from_config(key, data.clone(), &test_flags) {
                Ok(provider) => providers.push(provider),
                Err(e) => {
                    warn!("Ignoring catalog entry '{}': {}", key, e);
                    invalid.push((key.clone(), data.clone()));
                }
            }
        }
        debug!(
            "Catalog holds {} providers and {} invalid entries",
            providers.len(),
            invalid.len()
        );
        Ok(Self {
            providers,
            invalid,
            test_flags,
        })
    }

    fn with_flags(test_flags: BTreeSet<String>) -> Self {
        Self {
            test_flags,
            ..Self::default()
        }
    }

    pub fn all(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    /// The provider under `key`. An entry that was kept aside as invalid yields the error that
    /// made it unusable.
    pub fn get(&self, key: &str) -> Result<&ProviderDescriptor> {
        if let Some(provider) = self.providers.iter().find(|p| p.key() == key) {
            return Ok(provider);
        }
        if let Some((_, data)) = self.invalid.iter().find(|(invalid, _)| invalid == key) {
            ProviderDescriptor::from_config(key, data.clone(), &self.test_flags)?;
        }
        error::ProviderNotFoundSnafu { key }.fail().map_err(Into::into)
    }

    /// Keys of the entries that do not describe a usable provider.
    pub fn invalid_keys(&self) -> Vec<&str> {
        self.invalid.iter().map(|(key, _)| key.as_str()).collect()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.providers.iter().map(ProviderDescriptor::key).collect()
    }

    /// Find the provider registered on an appliance under the display `name`.
    pub fn by_name(&self, name: &str) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|p| p.name() == name)
    }

    /// The catalog-wide test flags before any provider's exclusions.
    pub fn test_flags(&self) -> &BTreeSet<String> {
        &self.test_flags
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Providers passing every filter in `filters` and, when given, every global filter. The
    /// catalog order is kept.
    pub fn list(
        &self,
        filters: &[ProviderFilter],
        global: Option<&GlobalFilters>,
    ) -> Vec<&ProviderDescriptor> {
        let mut all_filters: Vec<ProviderFilter> = filters.to_vec();
        if let Some(global) = global {
            all_filters.extend(global.filters().cloned());
        }
        let listed = apply_filters(&all_filters, &self.providers);
        trace!(
            "Listed providers {:?}",
            listed.iter().map(|p| p.key()).collect::<Vec<_>>()
        );
        listed
    }
}

fn parse_layer(yaml: &str, what: &str) -> Result<Value> {
    Ok(serde_yaml::from_str::<Value>(yaml).context(error::CatalogParseSnafu { what })?)
}

/// Mappings merge key by key, anything else in `overlay` replaces what is in `base`.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    const BASE: &str = r#"
test_flags: [provision, v2v]
management_systems:
  vc1:
    name: vSphere 6.7
    type: virtualcenter
    version: "6.7"
    endpoints: {default: {hostname: vc1.example.com, credentials: vsphere}}
  vc2:
    name: vSphere 7.0
    type: virtualcenter
    version: "7.0"
    endpoints: {default: {hostname: vc2.example.com, credentials: vsphere}}
  rhv1:
    name: RHV 4.3
    type: rhevm
    version: "4.3"
    endpoints: {default: {hostname: rhv1.example.com, credentials: rhv}}
"#;

    #[test]
    fn keeps_catalog_order() {
        let catalog = Catalog::from_yaml_str(BASE).unwrap();
        assert_eq!(catalog.keys(), vec!["vc1", "vc2", "rhv1"]);
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get("rhv1").unwrap().type_name(), "rhevm");
        assert_eq!(catalog.by_name("vSphere 7.0").unwrap().key(), "vc2");
    }

    #[test]
    fn unknown_key_is_not_found() {
        let catalog = Catalog::from_yaml_str(BASE).unwrap();
        let err = catalog.get("scvmm").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn later_layers_merge_over_earlier_ones() {
        let base = serde_yaml::from_str::<Value>(BASE).unwrap();
        let overlay = json!({
            "management_systems": {
                "vc1": {"tags": ["disabled"], "endpoints": {"default": {"hostname": "vc1.local"}}},
                "ec2": {"type": "ec2", "endpoints": {"default": {"credentials": "aws"}}}
            }
        });
        let catalog = Catalog::from_layers(vec![base, overlay]).unwrap();
        assert_eq!(catalog.keys(), vec!["vc1", "vc2", "rhv1", "ec2"]);
        let vc1 = catalog.get("vc1").unwrap();
        assert!(vc1.has_tag("disabled"));
        assert_eq!(
            vc1.default_endpoint().hostname.as_deref(),
            Some("vc1.local")
        );
        // The credentials of the base layer survive the merge.
        assert_eq!(vc1.credential_refs()["default"].as_str(), "vsphere");
    }

    #[test]
    fn reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("cfme_data.yaml");
        let local = dir.path().join("cfme_data.local.yaml");
        std::fs::File::create(&base)
            .unwrap()
            .write_all(BASE.as_bytes())
            .unwrap();
        std::fs::File::create(&local)
            .unwrap()
            .write_all(b"management_systems:\n  vc2:\n    version: '7.0.3'\n")
            .unwrap();
        let catalog = Catalog::from_files(&[base, local]).unwrap();
        assert_eq!(catalog.get("vc2").unwrap().version(), Some("7.0.3"));
        assert!(catalog.test_flags().contains("v2v"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Catalog::from_files(&["/nonexistent/cfme_data.yaml"]).is_err());
    }

    #[test]
    fn empty_catalog() {
        let catalog = Catalog::from_yaml_str("test_flags: provision").unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.list(&[], Some(&GlobalFilters::default())).is_empty());
    }

    #[test]
    fn invalid_entries_only_fail_their_own_lookup() {
        let catalog = Catalog::from_yaml_str(
            r#"
management_systems:
  vc1:
    name: vSphere 6.7
    type: virtualcenter
    endpoints: {default: {hostname: vc1.example.com, credentials: vsphere}}
  kv1:
    name: KubeVirt
    type: kubevirt
    endpoints: {default: {hostname: kv1.example.com}}
"#,
        )
        .unwrap();
        assert_eq!(catalog.keys(), vec!["vc1"]);
        assert_eq!(catalog.invalid_keys(), vec!["kv1"]);
        assert_eq!(catalog.list(&[], None).len(), 1);
        assert_eq!(catalog.get("vc1").unwrap().key(), "vc1");
        let err = catalog.get("kv1").unwrap_err();
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("kubevirt"), "{}", err);
    }

    #[test]
    fn malformed_sections_are_rejected() {
        assert!(Catalog::from_yaml_str("management_systems: [vc1, vc2]").is_err());
        assert!(Catalog::from_yaml_str("- just\n- a list").is_err());
    }
}
