/*!

The template cache: which templates are currently usable on each provider. The lists come from
the tracker and are persisted between runs in the runner's key/value cache under
`miq-trackerbot/<provider key>`.

!*/

use crate::clients::{KeyValueCache, ProviderTemplates, Tracker};
use crate::outcome::Outcome;
use log::{debug, info, warn};
use provsys_model::constants::template_cache_key;
use provsys_model::{Catalog, ProviderDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One template the tracker knows to be usable on a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creds: Option<String>,
    /// The tracker group (stream) the template belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// The usable templates of every provider, published once at runner configuration and read-only
/// afterwards. An empty map means that template tracking is disabled for the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Templates {
    by_provider: ProviderTemplates,
}

impl From<ProviderTemplates> for Templates {
    fn from(by_provider: ProviderTemplates) -> Self {
        Self { by_provider }
    }
}

impl Templates {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_provider.is_empty()
    }

    pub fn get(&self, provider_key: &str) -> Option<&[TemplateRecord]> {
        self.by_provider.get(provider_key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<TemplateRecord>)> {
        self.by_provider.iter()
    }

    /// Resolve the template name found at `location` in the provider's data. `location` may point
    /// at the name itself or at a `{name, creds}` mapping. The name is only returned if the tracker
    /// lists it for the provider, or if template tracking is disabled.
    pub fn template<S: AsRef<str>>(
        &self,
        location: &[S],
        provider: &ProviderDescriptor,
    ) -> Outcome<String> {
        let name = match provider.lookup(location) {
            Some(value) => match template_name(value) {
                Some(name) => name,
                None => {
                    return Outcome::skip(format!(
                        "Template at {} of provider {} has no template name: {}",
                        join(location),
                        provider.key(),
                        value
                    ))
                }
            },
            None => {
                info!(
                    "Cannot resolve {} in the data of provider '{}'",
                    join(location),
                    provider.key()
                );
                return Outcome::skip("Template not available");
            }
        };
        if self.is_empty() {
            return Outcome::Proceed(name.to_string());
        }
        let listed = self
            .get(provider.key())
            .map(|records| records.iter().any(|record| record.name == name))
            .unwrap_or(false);
        if listed {
            Outcome::Proceed(name.to_string())
        } else {
            info!(
                "Wanted template '{}' on '{}' but it is not there",
                name,
                provider.key()
            );
            Outcome::skip("Template not available")
        }
    }
}

/// A template is written either as its bare name or as a `{name, creds}` mapping.
fn template_name(value: &Value) -> Option<&str> {
    match value {
        Value::String(name) => Some(name),
        Value::Object(entry) => entry.get("name").and_then(Value::as_str),
        _ => None,
    }
}

fn join<S: AsRef<str>>(location: &[S]) -> String {
    location
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(".")
}

/// What the runner knows about itself when templates are loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadContext {
    /// The runner only prints help.
    pub help_mode: bool,
    /// This process only distributes tests to parallel workers.
    pub parallel_master: bool,
    /// Some appliance under test runs from a development checkout.
    pub dev_appliance: bool,
}

/// Populates [`Templates`] from the tracker and the persistent cache.
#[derive(Clone)]
pub struct TemplateLoader {
    tracker: Option<Arc<dyn Tracker>>,
    cache: Arc<dyn KeyValueCache>,
    use_template_cache: bool,
}

impl TemplateLoader {
    /// `tracker` is `None` when no tracker URL is configured.
    pub fn new(
        tracker: Option<Arc<dyn Tracker>>,
        cache: Arc<dyn KeyValueCache>,
        use_template_cache: bool,
    ) -> Self {
        Self {
            tracker,
            cache,
            use_template_cache,
        }
    }

    pub async fn load(&self, context: &LoadContext, catalog: &Catalog) -> Templates {
        let tracker = match &self.tracker {
            Some(tracker) => tracker,
            None => {
                debug!("No tracker configured, template tracking is disabled");
                return Templates::empty();
            }
        };
        if context.help_mode || context.parallel_master || context.dev_appliance {
            debug!("Not loading templates: {:?}", context);
            return Templates::empty();
        }
        if self.use_template_cache {
            self.load_cached(tracker.as_ref(), catalog).await
        } else {
            self.load_fresh(tracker.as_ref(), catalog).await
        }
    }

    async fn fetch(tracker: &dyn Tracker) -> Option<ProviderTemplates> {
        match tracker.provider_templates().await {
            Ok(templates) => Some(templates),
            Err(e) => {
                warn!("Tracker unavailable, continuing without templates: {}", e);
                None
            }
        }
    }

    /// Use cache entries where present and ask the tracker once for the rest.
    async fn load_cached(&self, tracker: &dyn Tracker, catalog: &Catalog) -> Templates {
        let mut loaded = ProviderTemplates::new();
        let mut missing = Vec::new();
        for key in catalog.keys() {
            match self.read_entry(key) {
                Some(records) => {
                    loaded.insert(key.to_string(), records);
                }
                None => missing.push(key),
            }
        }
        if !missing.is_empty() {
            debug!("Template cache misses: {}", missing.join(", "));
            if let Some(mut fetched) = Self::fetch(tracker).await {
                for key in missing {
                    let records = fetched.remove(key).unwrap_or_default();
                    self.write_entry(key, &records);
                    loaded.insert(key.to_string(), records);
                }
            }
        }
        Templates::from(loaded)
    }

    /// Ask the tracker for everything and overwrite the cache of every catalog provider.
    async fn load_fresh(&self, tracker: &dyn Tracker, catalog: &Catalog) -> Templates {
        let mut fetched = match Self::fetch(tracker).await {
            Some(fetched) => fetched,
            None => return Templates::empty(),
        };
        let mut loaded = BTreeMap::new();
        for key in catalog.keys() {
            let records = fetched.remove(key).unwrap_or_default();
            self.write_entry(key, &records);
            loaded.insert(key.to_string(), records);
        }
        Templates::from(loaded)
    }

    fn read_entry(&self, provider_key: &str) -> Option<Vec<TemplateRecord>> {
        let cache_key = template_cache_key(provider_key);
        match self.cache.get(&cache_key) {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(records) => Some(records),
                Err(e) => {
                    warn!("Ignoring malformed cache entry '{}': {}", cache_key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Unable to read cache entry '{}': {}", cache_key, e);
                None
            }
        }
    }

    fn write_entry(&self, provider_key: &str, records: &[TemplateRecord]) {
        let cache_key = template_cache_key(provider_key);
        let result = serde_json::to_value(records)
            .map_err(|e| e.to_string())
            .and_then(|value| {
                self.cache
                    .set(&cache_key, &value)
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = result {
            warn!("Unable to write cache entry '{}': {}", cache_key, e);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::btreemap;

    fn record(name: &str) -> TemplateRecord {
        TemplateRecord {
            name: name.into(),
            creds: None,
            group: None,
        }
    }

    fn catalog() -> Catalog {
        Catalog::from_yaml_str(
            r#"
management_systems:
  vc1:
    name: vc1
    type: virtualcenter
    version: '6.7'
    endpoints:
      default: {hostname: vc1.example.com}
    templates:
      small_template: {name: small_vm, creds: guest}
      big_template: {name: big_vm, creds: guest}
      broken_template: [not, a, mapping]
"#,
        )
        .unwrap()
    }

    #[test]
    fn empty_templates_return_the_name() {
        let catalog = catalog();
        let vc1 = catalog.get("vc1").unwrap();
        let outcome = Templates::empty().template(&["templates", "small_template", "name"], vc1);
        assert_eq!(outcome, Outcome::Proceed("small_vm".to_string()));
    }

    #[test]
    fn listed_templates_resolve() {
        let catalog = catalog();
        let vc1 = catalog.get("vc1").unwrap();
        let templates = Templates::from(btreemap! { "vc1".to_string() => vec![record("small_vm")] });
        assert_eq!(
            templates.template(&["templates", "small_template", "name"], vc1),
            Outcome::Proceed("small_vm".to_string())
        );
        assert_eq!(
            templates.template(&["templates", "big_template", "name"], vc1),
            Outcome::skip("Template not available")
        );
        assert_eq!(
            templates.template(&["templates", "missing", "name"], vc1),
            Outcome::skip("Template not available")
        );
        assert!(!templates
            .template(&["templates", "broken_template"], vc1)
            .is_proceed());
    }

    #[test]
    fn template_mappings_resolve_to_their_name() {
        let catalog = catalog();
        let vc1 = catalog.get("vc1").unwrap();
        let templates = Templates::from(btreemap! { "vc1".to_string() => vec![record("small_vm")] });
        assert_eq!(
            templates.template(&["templates", "small_template"], vc1),
            Outcome::Proceed("small_vm".to_string())
        );
        assert_eq!(
            templates.template(&["templates", "big_template"], vc1),
            Outcome::skip("Template not available")
        );
        assert_eq!(
            Templates::empty().template(&["templates", "big_template"], vc1),
            Outcome::Proceed("big_vm".to_string())
        );
    }

    #[test]
    fn unlisted_provider_skips() {
        let catalog = catalog();
        let vc1 = catalog.get("vc1").unwrap();
        let templates = Templates::from(btreemap! { "rhv1".to_string() => vec![record("small_vm")] });
        assert_eq!(
            templates.template(&["templates", "small_template", "name"], vc1),
            Outcome::skip("Template not available")
        );
    }

    #[test]
    fn records_tolerate_missing_fields() {
        let records: Vec<TemplateRecord> =
            serde_json::from_str(r#"[{"name": "small_vm"}, {"name": "x", "creds": "root"}]"#)
                .unwrap();
        assert_eq!(records[0], record("small_vm"));
        assert_eq!(records[1].creds.as_deref(), Some("root"));
    }
}
