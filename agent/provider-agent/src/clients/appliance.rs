use super::error::{ClientError, ClientResult};
use agent_common::credentials::Credential;
use log::{debug, trace};
use provsys_model::LooseVersion;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// How an operation reaches the appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    Rest,
    /// The web UI. Driving it is the job of an external UI driver that the [`Appliance`]
    /// implementation may or may not have.
    Ui,
}

serde_plain::derive_display_from_serialize!(Interface);

/// The body of a provider creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPayload {
    /// The appliance's database type of the provider, e.g. `ManageIQ::Providers::Vmware::InfraManager`.
    #[serde(rename = "type")]
    pub db_type: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", rename = "provider_region")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    pub connection_configurations: Vec<ConnectionConfiguration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfiguration {
    pub endpoint: EndpointPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthenticationPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointPayload {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(flatten)]
    pub settings: serde_json::Map<String, Value>,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationPayload {
    pub role: String,
    pub userid: String,
    pub password: String,
}

impl std::fmt::Debug for AuthenticationPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationPayload")
            .field("role", &self.role)
            .field("userid", &self.userid)
            .finish()
    }
}

/// What the appliance last recorded about refreshing a provider's inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshStatus {
    pub last_refresh_date: Option<String>,
    pub last_refresh_error: Option<String>,
}

/// Inventory counters of a provider as shown by the appliance, e.g. `num_vm` or `num_host`.
pub type ProviderStats = BTreeMap<String, u64>;

/// The narrow view of the appliance under test that provider setup needs. Providers are addressed
/// by the display name they are registered under.
///
/// This is provided as a trait so that fake implementations can be injected for testing purposes.
/// In practice you will use the [`RestAppliance`].
#[async_trait::async_trait]
pub trait Appliance: Send + Sync {
    /// The product version of the appliance.
    fn version(&self) -> LooseVersion;

    /// Whether the appliance runs from a development checkout.
    fn is_dev(&self) -> bool;

    /// The names of every provider currently managed by the appliance.
    async fn managed_provider_names(&self) -> ClientResult<Vec<String>>;

    async fn provider_exists(&self, name: &str) -> ClientResult<bool>;

    async fn create_provider(&self, payload: &ProviderPayload, via: Interface) -> ClientResult<()>;

    /// Request deletion. The provider may remain visible for a while after this returns.
    async fn delete_provider(&self, name: &str, via: Interface) -> ClientResult<()>;

    async fn refresh_provider(&self, name: &str) -> ClientResult<()>;

    async fn refresh_status(&self, name: &str) -> ClientResult<RefreshStatus>;

    async fn provider_stats(&self, name: &str) -> ClientResult<ProviderStats>;

    async fn provider_hosts(&self, name: &str) -> ClientResult<Vec<String>>;

    async fn provider_templates(&self, name: &str) -> ClientResult<Vec<String>>;

    /// The regions disabled for the provider family stored under `settings_key`.
    async fn disabled_regions(&self, settings_key: &str) -> ClientResult<Vec<String>>;

    async fn set_disabled_regions(&self, settings_key: &str, regions: &[String])
        -> ClientResult<()>;
}

/// An [`Appliance`] backed by the appliance's REST API. It cannot drive the UI, so operations
/// requested through [`Interface::Ui`] fail with [`ClientError::Unsupported`].
#[derive(Clone)]
pub struct RestAppliance {
    client: Client,
    base_url: Url,
    credential: Credential,
    version: LooseVersion,
    is_dev: bool,
}

#[derive(Deserialize)]
struct Collection {
    #[serde(default)]
    resources: Vec<Value>,
}

impl RestAppliance {
    /// Connect to the appliance at `base_url` (e.g. `https://10.0.0.1`) and read its version.
    pub async fn connect(base_url: &str, credential: Credential, is_dev: bool) -> ClientResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::InitializationFailed(Some(e.into())))?;
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| ClientError::InitializationFailed(Some(e.into())))?;
        let mut appliance = Self {
            client,
            base_url,
            credential,
            version: LooseVersion::zero(),
            is_dev,
        };
        let entrypoint = appliance.get("api").await?;
        let version = entrypoint
            .get("server_info")
            .and_then(|info| info.get("version"))
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::missing_data("The API entrypoint has no server version"))?;
        appliance.version = LooseVersion::new(version);
        debug!(
            "Connected to appliance {} version {}",
            appliance.base_url, appliance.version
        );
        Ok(appliance)
    }

    fn url(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InitializationFailed(Some(e.into())))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        trace!("{} {}", method, url);
        self.client
            .request(method, url)
            .basic_auth(&self.credential.principal, Some(&self.credential.secret))
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<Value> {
        request
            .send()
            .await
            .map_err(ClientError::request_failed)?
            .error_for_status()
            .map_err(ClientError::request_failed)?
            .json::<Value>()
            .await
            .map_err(|e| ClientError::Serialization(Some(e.into())))
    }

    async fn get(&self, path: &str) -> ClientResult<Value> {
        let url = self.url(path)?;
        self.send(self.request(Method::GET, url)).await
    }

    /// Find the provider named `name`, returning its record with the requested attributes.
    async fn find_provider(&self, name: &str, attributes: &str) -> ClientResult<Option<Value>> {
        let mut url = self.url("api/providers")?;
        url.query_pairs_mut()
            .append_pair("expand", "resources")
            .append_pair("attributes", attributes)
            .append_pair("filter[]", &format!("name='{}'", name));
        let collection: Collection = serde_json::from_value(
            self.send(self.request(Method::GET, url)).await?,
        )
        .map_err(|e| ClientError::Serialization(Some(e.into())))?;
        Ok(collection.resources.into_iter().next())
    }

    async fn provider_record(&self, name: &str, attributes: &str) -> ClientResult<Value> {
        self.find_provider(name, attributes)
            .await?
            .ok_or_else(|| ClientError::missing_data(format!("No provider named '{}'", name)))
    }

    async fn provider_action(&self, name: &str, action: &str) -> ClientResult<()> {
        let record = self.provider_record(name, "id").await?;
        let href = record
            .get("href")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::missing_data(format!("Provider '{}' has no href", name)))?;
        let url = Url::parse(href).map_err(|e| ClientError::Serialization(Some(e.into())))?;
        self.send(self.request(Method::POST, url).json(&json!({ "action": action })))
            .await?;
        Ok(())
    }

    fn unsupported(operation: &str) -> ClientError {
        ClientError::unsupported(format!("{} through the UI needs a UI driver", operation))
    }
}

fn names(records: Option<&Value>) -> Vec<String> {
    records
        .and_then(Value::as_array)
        .map(|records| {
            records
                .iter()
                .filter_map(|r| r.get("name").and_then(Value::as_str))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl Appliance for RestAppliance {
    fn version(&self) -> LooseVersion {
        self.version.clone()
    }

    fn is_dev(&self) -> bool {
        self.is_dev
    }

    async fn managed_provider_names(&self) -> ClientResult<Vec<String>> {
        let mut url = self.url("api/providers")?;
        url.query_pairs_mut()
            .append_pair("expand", "resources")
            .append_pair("attributes", "name");
        let collection = self.send(self.request(Method::GET, url)).await?;
        Ok(names(collection.get("resources")))
    }

    async fn provider_exists(&self, name: &str) -> ClientResult<bool> {
        Ok(self.find_provider(name, "name").await?.is_some())
    }

    async fn create_provider(&self, payload: &ProviderPayload, via: Interface) -> ClientResult<()> {
        if via == Interface::Ui {
            return Err(Self::unsupported("Creating providers"));
        }
        let url = self.url("api/providers")?;
        self.send(self.request(Method::POST, url).json(payload))
            .await?;
        Ok(())
    }

    async fn delete_provider(&self, name: &str, via: Interface) -> ClientResult<()> {
        if via == Interface::Ui {
            return Err(Self::unsupported("Deleting providers"));
        }
        self.provider_action(name, "delete").await
    }

    async fn refresh_provider(&self, name: &str) -> ClientResult<()> {
        self.provider_action(name, "refresh").await
    }

    async fn refresh_status(&self, name: &str) -> ClientResult<RefreshStatus> {
        let record = self
            .provider_record(name, "last_refresh_date,last_refresh_error")
            .await?;
        serde_json::from_value(record).map_err(|e| ClientError::Serialization(Some(e.into())))
    }

    async fn provider_stats(&self, name: &str) -> ClientResult<ProviderStats> {
        let record = self
            .provider_record(
                name,
                "total_vms,total_hosts,total_miq_templates,total_clusters,total_storages",
            )
            .await?;
        Ok(record
            .as_object()
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|(k, v)| {
                        let count = v.as_u64()?;
                        Some((k.trim_start_matches("total_").to_string(), count))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn provider_hosts(&self, name: &str) -> ClientResult<Vec<String>> {
        let record = self.provider_record(name, "hosts").await?;
        Ok(names(record.get("hosts")))
    }

    async fn provider_templates(&self, name: &str) -> ClientResult<Vec<String>> {
        let record = self.provider_record(name, "miq_templates").await?;
        Ok(names(record.get("miq_templates")))
    }

    async fn disabled_regions(&self, settings_key: &str) -> ClientResult<Vec<String>> {
        let settings = self.get("api/settings").await?;
        Ok(settings
            .pointer(&format!("/ems/{}/disabled_regions", settings_key))
            .and_then(Value::as_array)
            .map(|regions| {
                regions
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_disabled_regions(
        &self,
        settings_key: &str,
        regions: &[String],
    ) -> ClientResult<()> {
        let url = self.url("api/settings")?;
        let mut ems = serde_json::Map::new();
        ems.insert(
            settings_key.to_string(),
            json!({ "disabled_regions": regions }),
        );
        let body = json!({ "ems": ems });
        self.send(self.request(Method::PATCH, url).json(&body))
            .await?;
        Ok(())
    }
}
