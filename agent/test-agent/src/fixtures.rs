/*!

Run-time fixtures. A parametrized test receives a [`ProviderDescriptor`] at collection time; when
the test actually runs, [`Fixtures::provider`] turns it into a [`LiveProvider`] and the other
fixtures set it up, look up its templates or clear the appliance.

Every value is cached per scope instance and parametrized provider, so asking twice within the same
scope returns the same value. Skips are not cached.

!*/

use crate::error::{self, FixtureResult};
use crate::marker::Scope;
use log::{debug, info};
use provider_agent::artifacts::{ArtifactSink, LogSink};
use provider_agent::provider::LiveProvider;
use provider_agent::{Outcome, SetupEngine, Templates, TestRequest};
use provsys_model::constants::{PROVIDER_FIXTURE_NAME, TAG_PERF};
use provsys_model::{Category, ClassRef, ProviderClass, ProviderDescriptor, ProviderFilter};
use serde::Serialize;
use serde_json::Value;
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

/// Template fixtures. Each is also available with a `_modscope` suffix.
pub const TEMPLATE_FIXTURES: &[&str] = &[
    "small_template",
    "big_template",
    "full_template",
    "console_template",
    "ubuntu16_template",
    "rhel69_template",
    "rhel74_template",
    "rhel7_minimal",
    "win7_template",
    "win10_template",
    "win2012_template",
    "win2016_template",
    "dual_network_template",
    "dual_disk_template",
    "dportgroup_template",
    "s3_template",
];

const MODSCOPE_SUFFIX: &str = "_modscope";

/// The running test as the fixtures see it.
#[derive(Clone)]
pub struct FixtureRequest {
    node_id: String,
    module_id: String,
    class_id: Option<String>,
    provider: Option<(Scope, Arc<ProviderDescriptor>)>,
    artifacts: Arc<dyn ArtifactSink>,
}

impl FixtureRequest {
    pub fn new<S1, S2>(node_id: S1, module_id: S2, artifacts: Arc<dyn ArtifactSink>) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            node_id: node_id.into(),
            module_id: module_id.into(),
            class_id: None,
            provider: None,
            artifacts,
        }
    }

    /// A request whose artifacts only go to the log.
    pub fn logged<S1: Into<String>, S2: Into<String>>(node_id: S1, module_id: S2) -> Self {
        Self::new(node_id, module_id, Arc::new(LogSink))
    }

    pub fn in_class<S: Into<String>>(mut self, class_id: S) -> Self {
        self.class_id = Some(class_id.into());
        self
    }

    /// The provider this test was parametrized with and the scope of that parametrization.
    pub fn with_provider(mut self, provider: Arc<ProviderDescriptor>, scope: Scope) -> Self {
        self.provider = Some((scope, provider));
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Identifies the instance of `scope` the test runs in. Outside a class the class scope is the
    /// module.
    pub fn scope_id(&self, scope: Scope) -> &str {
        match scope {
            Scope::Function => &self.node_id,
            Scope::Class => self.class_id.as_deref().unwrap_or(&self.module_id),
            Scope::Module => &self.module_id,
            Scope::Session => "session",
        }
    }

    fn provider_key(&self) -> Option<&str> {
        self.provider.as_ref().map(|(_, provider)| provider.key())
    }

    fn test_request(&self) -> TestRequest {
        TestRequest::new(self.node_id.clone(), self.artifacts.clone())
    }
}

/// A template entry from a provider's `templates` section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateFixture {
    pub name: String,
    pub creds: String,
    /// The whole entry, including keys beyond `name` and `creds`.
    pub data: Value,
}

#[derive(Debug, Clone)]
pub enum FixtureValue {
    Provider(Arc<LiveProvider>),
    Template(Arc<TemplateFixture>),
    Data(Value),
    /// Keys of the providers removed from the appliance.
    Cleared(Vec<String>),
}

impl FixtureValue {
    pub fn provider(&self) -> Option<&Arc<LiveProvider>> {
        match self {
            FixtureValue::Provider(provider) => Some(provider),
            _ => None,
        }
    }

    pub fn template(&self) -> Option<&Arc<TemplateFixture>> {
        match self {
            FixtureValue::Template(template) => Some(template),
            _ => None,
        }
    }
}

/// What a generated per-class fixture does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisteredFixture {
    /// `<class>_provider`: set up any one provider of the class.
    SetupOne(ClassRef),
    /// `has_no_<class>_providers`: remove every provider of the class from the appliance.
    HasNone(ClassRef),
}

/// The `<class>_provider` and `has_no_<class>_providers` fixtures for every category and provider
/// type.
#[derive(Debug, Clone)]
pub struct ProviderFixtureRegistry {
    fixtures: BTreeMap<String, RegisteredFixture>,
}

impl Default for ProviderFixtureRegistry {
    fn default() -> Self {
        let mut registry = Self {
            fixtures: BTreeMap::new(),
        };
        let classes = Category::all()
            .iter()
            .map(|category| ClassRef::Category(*category))
            .chain(ProviderClass::all().iter().map(|class| ClassRef::Type(*class)));
        for class in classes {
            registry.register(class);
        }
        registry
    }
}

impl ProviderFixtureRegistry {
    fn register(&mut self, class: ClassRef) {
        let stem = class.fixture_stem();
        self.fixtures
            .insert(format!("{}_provider", stem), RegisteredFixture::SetupOne(class));
        self.fixtures
            .insert(format!("has_no_{}_providers", stem), RegisteredFixture::HasNone(class));
    }

    pub fn resolve(&self, name: &str) -> Option<RegisteredFixture> {
        self.fixtures.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fixtures.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CacheKey {
    scope: Scope,
    scope_id: String,
    provider: Option<String>,
    fixture: String,
}

/// Produces fixture values for running tests.
pub struct Fixtures {
    engine: Arc<SetupEngine>,
    templates: Arc<Templates>,
    registry: ProviderFixtureRegistry,
    cache: Mutex<BTreeMap<CacheKey, FixtureValue>>,
}

impl Fixtures {
    pub fn new(engine: Arc<SetupEngine>, templates: Arc<Templates>) -> Self {
        Self {
            engine,
            templates,
            registry: ProviderFixtureRegistry::default(),
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<SetupEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &ProviderFixtureRegistry {
        &self.registry
    }

    /// Resolve any fixture by name.
    pub async fn fixture(
        &self,
        request: &FixtureRequest,
        name: &str,
    ) -> FixtureResult<FixtureValue> {
        match name {
            PROVIDER_FIXTURE_NAME => self.provider(request).await.map(FixtureValue::Provider),
            "setup_provider" | "setup_provider_funcscope" => self
                .setup_provider(request, name, Scope::Function)
                .await
                .map(FixtureValue::Provider),
            "setup_provider_clsscope" => self
                .setup_provider(request, name, Scope::Class)
                .await
                .map(FixtureValue::Provider),
            "setup_provider_modscope" => self
                .setup_provider(request, name, Scope::Module)
                .await
                .map(FixtureValue::Provider),
            "setup_only_one_provider" => self
                .setup_only_one_provider(request)
                .await
                .map(FixtureValue::Provider),
            "setup_perf_provider" => self
                .setup_perf_provider(request)
                .await
                .map(FixtureValue::Provider),
            "has_no_providers" => self
                .clear(request, name, Scope::Function, ClassRef::Base)
                .await
                .map(FixtureValue::Cleared),
            "has_no_providers_modscope" => self
                .clear(request, name, Scope::Module, ClassRef::Base)
                .await
                .map(FixtureValue::Cleared),
            "provisioning" => self.provisioning(request).await.map(FixtureValue::Data),
            _ => self.generated_fixture(request, name).await,
        }
    }

    async fn generated_fixture(
        &self,
        request: &FixtureRequest,
        name: &str,
    ) -> FixtureResult<FixtureValue> {
        if let Some(registered) = self.registry.resolve(name) {
            return match registered {
                RegisteredFixture::SetupOne(class) => self
                    .cached(request, name, Scope::Function, || async move {
                        let filter = ProviderFilter::default().classes(vec![class]);
                        self.setup_one(request, &[filter]).await
                    })
                    .await,
                RegisteredFixture::HasNone(class) => self
                    .clear(request, name, Scope::Function, class)
                    .await
                    .map(FixtureValue::Cleared),
            };
        }
        let (template_type, scope) = match name.strip_suffix(MODSCOPE_SUFFIX) {
            Some(base) => (base, Scope::Module),
            None => (name, Scope::Function),
        };
        if TEMPLATE_FIXTURES.contains(&template_type) {
            return self
                .template_fixture(request, template_type, scope)
                .await
                .map(FixtureValue::Template);
        }
        error::UnknownFixtureSnafu { name }.fail()
    }

    /// The live provider for the test's parametrized descriptor. It is created once per instance
    /// of the parametrization scope and never touches the appliance.
    pub async fn provider(&self, request: &FixtureRequest) -> FixtureResult<Arc<LiveProvider>> {
        let (scope, descriptor) =
            request
                .provider
                .clone()
                .context(error::MissingParameterSnafu {
                    fixture: PROVIDER_FIXTURE_NAME,
                    node_id: request.node_id(),
                })?;
        let value = self
            .cached(request, PROVIDER_FIXTURE_NAME, scope, || async move {
                let provider = self
                    .engine
                    .factory()
                    .materialize(descriptor)
                    .context(error::AgentSnafu {
                        node_id: request.node_id(),
                    })?;
                Ok(FixtureValue::Provider(Arc::new(provider)))
            })
            .await?;
        expect_provider(value, PROVIDER_FIXTURE_NAME)
    }

    /// `setup_provider` and its scoped variants: the parametrized provider, set up, or a skip.
    pub async fn setup_provider(
        &self,
        request: &FixtureRequest,
        name: &str,
        scope: Scope,
    ) -> FixtureResult<Arc<LiveProvider>> {
        let provider = self.provider(request).await?;
        let value = self
            .cached(request, name, scope, || async move {
                let provider = self
                    .engine
                    .setup_or_skip(&request.test_request(), provider)
                    .await
                    .into_result()?;
                Ok(FixtureValue::Provider(provider))
            })
            .await?;
        expect_provider(value, name)
    }

    /// Clear the appliance and set up one provider matching the global filters.
    pub async fn setup_only_one_provider(
        &self,
        request: &FixtureRequest,
    ) -> FixtureResult<Arc<LiveProvider>> {
        self.clear(request, "has_no_providers", Scope::Function, ClassRef::Base)
            .await?;
        let value = self
            .cached(request, "setup_only_one_provider", Scope::Function, || {
                self.setup_one(request, &[])
            })
            .await?;
        expect_provider(value, "setup_only_one_provider")
    }

    /// Set up any one provider tagged for performance testing.
    pub async fn setup_perf_provider(
        &self,
        request: &FixtureRequest,
    ) -> FixtureResult<Arc<LiveProvider>> {
        let value = self
            .cached(request, "setup_perf_provider", Scope::Function, || async move {
                let filter = ProviderFilter::default().required_tags(vec![TAG_PERF]);
                self.setup_one(request, &[filter]).await
            })
            .await?;
        expect_provider(value, "setup_perf_provider")
    }

    /// The template named at `location` in the provider's data, if the tracker lists it for the
    /// provider.
    pub async fn template<S: AsRef<str>>(
        &self,
        request: &FixtureRequest,
        location: &[S],
    ) -> FixtureResult<String> {
        let provider = self.provider(request).await?;
        let name = self
            .templates
            .template(location, provider.descriptor())
            .into_result()?;
        Ok(name)
    }

    /// A template entry such as `small_template`, which must map to a `name` and `creds`.
    pub async fn template_fixture(
        &self,
        request: &FixtureRequest,
        template_type: &str,
        scope: Scope,
    ) -> FixtureResult<Arc<TemplateFixture>> {
        let provider = self.provider(request).await?;
        let fixture = if scope == Scope::Module {
            format!("{}{}", template_type, MODSCOPE_SUFFIX)
        } else {
            template_type.to_string()
        };
        let value = self
            .cached(request, &fixture, scope, || async move {
                let template = template_entry(&provider, template_type).into_result()?;
                Ok(FixtureValue::Template(Arc::new(template)))
            })
            .await?;
        value
            .template()
            .cloned()
            .context(error::UnknownFixtureSnafu { name: fixture })
    }

    /// The provider's `provisioning` section.
    pub async fn provisioning(&self, request: &FixtureRequest) -> FixtureResult<Value> {
        let provider = self.provider(request).await?;
        let provisioning: Outcome<Value> = match provider.data().get("provisioning") {
            Some(provisioning) => Outcome::Proceed(provisioning.clone()),
            None => Outcome::skip(format!(
                "No provisioning data for provider {}",
                provider.key()
            )),
        };
        Ok(provisioning.into_result()?)
    }

    async fn setup_one(
        &self,
        request: &FixtureRequest,
        filters: &[ProviderFilter],
    ) -> FixtureResult<FixtureValue> {
        let provider = self
            .engine
            .setup_one_or_skip(&request.test_request(), filters, true)
            .await
            .into_result()?;
        Ok(FixtureValue::Provider(provider))
    }

    async fn clear(
        &self,
        request: &FixtureRequest,
        name: &str,
        scope: Scope,
        class: ClassRef,
    ) -> FixtureResult<Vec<String>> {
        let value = self
            .cached(request, name, scope, || async move {
                let cleared = self
                    .engine
                    .clear_providers(class)
                    .await
                    .context(error::AgentSnafu {
                        node_id: request.node_id(),
                    })?;
                Ok(FixtureValue::Cleared(cleared))
            })
            .await?;
        match value {
            FixtureValue::Cleared(cleared) => Ok(cleared),
            _ => error::UnknownFixtureSnafu { name }.fail(),
        }
    }

    /// Drop every value cached for the instance `scope_id` of `scope`. The runner calls this when
    /// the scope ends.
    pub fn finish_scope(&self, scope: Scope, scope_id: &str) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let before = cache.len();
        cache.retain(|key, _| !(key.scope == scope && key.scope_id == scope_id));
        debug!(
            "Finished {} scope '{}', dropped {} fixture values",
            scope,
            scope_id,
            before - cache.len()
        );
    }

    async fn cached<F, Fut>(
        &self,
        request: &FixtureRequest,
        fixture: &str,
        scope: Scope,
        make: F,
    ) -> FixtureResult<FixtureValue>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FixtureResult<FixtureValue>>,
    {
        let key = CacheKey {
            scope,
            scope_id: request.scope_id(scope).to_string(),
            provider: request.provider_key().map(String::from),
            fixture: fixture.to_string(),
        };
        if let Some(value) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(value.clone());
        }

        let value = make().await?;
        info!(
            "Fixture '{}' ready for {} scope '{}'",
            fixture, scope, key.scope_id
        );
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        // A concurrent request for the same key may have finished first, keep its value.
        Ok(cache.entry(key).or_insert(value).clone())
    }
}

fn expect_provider(value: FixtureValue, name: &str) -> FixtureResult<Arc<LiveProvider>> {
    match value {
        FixtureValue::Provider(provider) => Ok(provider),
        _ => error::UnknownFixtureSnafu { name }.fail(),
    }
}

fn template_entry(provider: &LiveProvider, template_type: &str) -> Outcome<TemplateFixture> {
    let entry = match provider
        .data()
        .get("templates")
        .and_then(|templates| templates.get(template_type))
    {
        Some(entry) => entry,
        None => {
            return Outcome::skip(format!(
                "No {} for provider {}",
                template_type,
                provider.key()
            ))
        }
    };
    let name = entry.get("name").and_then(Value::as_str);
    let creds = entry.get("creds").and_then(Value::as_str);
    match (entry.is_object(), name, creds) {
        (true, Some(name), Some(creds)) => Outcome::Proceed(TemplateFixture {
            name: name.to_string(),
            creds: creds.to_string(),
            data: entry.clone(),
        }),
        _ => Outcome::skip(format!(
            "Template mapping is incorrect, {} on provider {}",
            template_type,
            provider.key()
        )),
    }
}
