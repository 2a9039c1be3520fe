use async_trait::async_trait;
use provider_agent::clients::{ClientError, ClientResult, KeyValueCache, ProviderTemplates, Tracker};
use provider_agent::TemplateRecord;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// A [`Tracker`] serving a fixed template listing and counting how often it was asked.
#[derive(Debug, Default)]
pub struct FakeTracker {
    templates: ProviderTemplates,
    unavailable: bool,
    requests: AtomicUsize,
}

impl FakeTracker {
    pub fn new(templates: ProviderTemplates) -> Self {
        Self {
            templates,
            unavailable: false,
            requests: AtomicUsize::new(0),
        }
    }

    /// A tracker whose every request fails.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Build a listing from provider keys and template names.
    pub fn listing(entries: &[(&str, Vec<&str>)]) -> ProviderTemplates {
        entries
            .iter()
            .map(|(key, names)| (key.to_string(), names.iter().map(|n| record(n)).collect()))
            .collect()
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

/// A template record with only a name.
pub fn record(name: &str) -> TemplateRecord {
    TemplateRecord {
        name: name.to_string(),
        creds: None,
        group: None,
    }
}

#[async_trait]
impl Tracker for FakeTracker {
    async fn provider_templates(&self) -> ClientResult<ProviderTemplates> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(ClientError::request_failed("tracker is down"));
        }
        Ok(self.templates.clone())
    }
}

/// A [`KeyValueCache`] held in memory.
#[derive(Debug, Default)]
pub struct MemoryCache {
    values: Mutex<BTreeMap<String, Value>>,
    writes: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, key: &str, value: Value) -> Self {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        self
    }

    pub fn entries(&self) -> BTreeMap<String, Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl KeyValueCache for MemoryCache {
    fn get(&self, key: &str) -> ClientResult<Option<Value>> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &Value) -> ClientResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.clone());
        Ok(())
    }
}
