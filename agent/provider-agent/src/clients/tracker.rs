use super::error::{ClientError, ClientResult};
use crate::templates::TemplateRecord;
use log::{debug, trace};
use provsys_model::constants::TRACKERBOT_TEMPLATE_ENDPOINT;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Templates known to be usable, keyed by provider key.
pub type ProviderTemplates = BTreeMap<String, Vec<TemplateRecord>>;

/// The external service that lists the templates currently usable on each provider.
///
/// This is provided as a trait so that fake implementations can be injected for testing purposes.
/// In practice you will use the [`TrackerbotClient`].
#[async_trait::async_trait]
pub trait Tracker: Send + Sync {
    async fn provider_templates(&self) -> ClientResult<ProviderTemplates>;
}

/// A [`Tracker`] that talks to a trackerbot instance over HTTP.
#[derive(Debug, Clone)]
pub struct TrackerbotClient {
    client: Client,
    api_url: Url,
}

/// One page of a paginated trackerbot listing.
#[derive(Debug, Deserialize)]
struct Page {
    meta: PageMeta,
    #[serde(default)]
    objects: Vec<TemplateObject>,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TemplateObject {
    name: String,
    #[serde(default)]
    providers: Vec<String>,
    #[serde(default)]
    group: Option<Value>,
}

impl TemplateObject {
    fn group_name(&self) -> Option<String> {
        match &self.group {
            Some(Value::String(name)) => Some(name.clone()),
            Some(Value::Object(group)) => group
                .get("name")
                .and_then(Value::as_str)
                .map(String::from),
            _ => None,
        }
    }
}

impl TrackerbotClient {
    /// `api_url` is the base of the tracker API, e.g. `http://trackerbot/api/`.
    pub fn new(api_url: &str) -> ClientResult<Self> {
        let mut api_url =
            Url::parse(api_url).map_err(|e| ClientError::InitializationFailed(Some(e.into())))?;
        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            api_url,
        })
    }

    async fn get_page(&self, url: Url) -> ClientResult<Page> {
        trace!("GET {}", url);
        self.client
            .get(url)
            .send()
            .await
            .map_err(ClientError::request_failed)?
            .error_for_status()
            .map_err(ClientError::request_failed)?
            .json::<Page>()
            .await
            .map_err(|e| ClientError::Serialization(Some(e.into())))
    }

    /// Follow `meta.next` links until the listing is exhausted and return every object.
    async fn depaginate(&self, first: Url) -> ClientResult<Vec<TemplateObject>> {
        let mut visited = BTreeSet::new();
        visited.insert(first.clone());
        let mut page = self.get_page(first).await?;
        let mut objects = std::mem::take(&mut page.objects);
        while let Some(url) = next_url(&self.api_url, page.meta.next.take(), &mut visited)? {
            page = self.get_page(url).await?;
            objects.append(&mut page.objects);
        }
        debug!("Tracker listed {} templates", objects.len());
        Ok(objects)
    }
}

/// Resolve a `meta.next` link. A link back to a page that was already read is an error.
fn next_url(
    api_url: &Url,
    next: Option<String>,
    visited: &mut BTreeSet<Url>,
) -> ClientResult<Option<Url>> {
    let next = match next {
        Some(next) => next,
        None => return Ok(None),
    };
    let url = api_url
        .join(&next)
        .map_err(|e| ClientError::Serialization(Some(e.into())))?;
    if !visited.insert(url.clone()) {
        return Err(ClientError::missing_data(format!(
            "Tracker pagination returns to {}",
            url
        )));
    }
    Ok(Some(url))
}

/// Group the tracker's template objects by provider key.
fn group_by_provider(objects: Vec<TemplateObject>) -> ProviderTemplates {
    let mut templates = ProviderTemplates::new();
    for object in objects {
        let group = object.group_name();
        for provider in &object.providers {
            templates
                .entry(provider.clone())
                .or_default()
                .push(TemplateRecord {
                    name: object.name.clone(),
                    creds: None,
                    group: group.clone(),
                });
        }
    }
    templates
}

#[async_trait::async_trait]
impl Tracker for TrackerbotClient {
    async fn provider_templates(&self) -> ClientResult<ProviderTemplates> {
        let url = self
            .api_url
            .join(&format!("{}/", TRACKERBOT_TEMPLATE_ENDPOINT))
            .map_err(|e| ClientError::InitializationFailed(Some(e.into())))?;
        Ok(group_by_provider(self.depaginate(url).await?))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn groups_templates_by_provider() {
        let page: Page = serde_json::from_value(json!({
            "meta": {"next": null, "total_count": 2},
            "objects": [
                {"name": "small_vm", "providers": ["vc1", "rhv1"], "group": {"name": "downstream"}},
                {"name": "cfme-5.11", "providers": ["vc1"], "group": "downstream-511z"},
                {"name": "orphan", "providers": []}
            ]
        }))
        .unwrap();
        let templates = group_by_provider(page.objects);
        assert_eq!(templates.len(), 2);
        let vc1: Vec<_> = templates["vc1"].iter().map(|t| t.name.as_str()).collect();
        assert_eq!(vc1, vec!["small_vm", "cfme-5.11"]);
        assert_eq!(templates["vc1"][1].group.as_deref(), Some("downstream-511z"));
        assert_eq!(templates["rhv1"][0].group.as_deref(), Some("downstream"));
    }

    #[test]
    fn pagination_stops_at_revisited_pages() {
        let api_url = Url::parse("http://trackerbot.example.com/api/").unwrap();
        let first = api_url.join("template/").unwrap();
        let mut visited = BTreeSet::new();
        visited.insert(first);

        let second = next_url(
            &api_url,
            Some("/api/template/?offset=20".to_string()),
            &mut visited,
        )
        .unwrap();
        assert_eq!(
            second.unwrap().as_str(),
            "http://trackerbot.example.com/api/template/?offset=20"
        );
        assert!(next_url(&api_url, None, &mut visited).unwrap().is_none());
        assert!(next_url(&api_url, Some("/api/template/".to_string()), &mut visited).is_err());
        assert!(next_url(
            &api_url,
            Some("/api/template/?offset=20".to_string()),
            &mut visited
        )
        .is_err());
    }

    #[test]
    fn api_url_gets_trailing_slash() {
        let client = TrackerbotClient::new("http://trackerbot.example.com/api").unwrap();
        assert_eq!(
            client.api_url.join("template/").unwrap().as_str(),
            "http://trackerbot.example.com/api/template/"
        );
        assert!(TrackerbotClient::new("not a url").is_err());
    }
}
