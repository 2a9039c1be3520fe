use super::error::{ClientError, ClientResult};
use log::trace;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A key/value store that survives between runs. Keys are `/`-separated names such as
/// `miq-trackerbot/vc1`.
pub trait KeyValueCache: Send + Sync {
    fn get(&self, key: &str) -> ClientResult<Option<Value>>;

    fn set(&self, key: &str, value: &Value) -> ClientResult<()>;
}

/// A [`KeyValueCache`] that stores each value as a JSON file under `<dir>/v/<key>`, the layout
/// used by the test runner's own cache directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> ClientResult<PathBuf> {
        let mut path = self.dir.join("v");
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(ClientError::Storage(Some(
                    format!("Invalid cache key '{}'", key).into(),
                )));
            }
            path.push(segment);
        }
        Ok(path)
    }
}

impl KeyValueCache for FileCache {
    fn get(&self, key: &str) -> ClientResult<Option<Value>> {
        let path = self.path(key)?;
        trace!("Reading cache entry '{}'", path.display());
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ClientError::Storage(Some(e.into()))),
        };
        // A corrupt entry counts as a miss so that the caller refetches and overwrites it.
        Ok(serde_json::from_str(&contents).ok())
    }

    fn set(&self, key: &str, value: &Value) -> ClientResult<()> {
        let path = self.path(key)?;
        trace!("Writing cache entry '{}'", path.display());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ClientError::Storage(Some(e.into())))?;
        }
        let contents = serde_json::to_string_pretty(value)
            .map_err(|e| ClientError::Serialization(Some(e.into())))?;
        std::fs::write(&path, contents).map_err(|e| ClientError::Storage(Some(e.into())))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn stores_values_under_v() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        assert_eq!(cache.get("miq-trackerbot/vc1").unwrap(), None);
        let value = json!([{"name": "small_vm"}]);
        cache.set("miq-trackerbot/vc1", &value).unwrap();
        assert!(dir.path().join("v/miq-trackerbot/vc1").is_file());
        assert_eq!(cache.get("miq-trackerbot/vc1").unwrap(), Some(value));
    }

    #[test]
    fn corrupt_entries_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        std::fs::create_dir_all(dir.path().join("v")).unwrap();
        std::fs::write(dir.path().join("v/broken"), "{not json").unwrap();
        assert_eq!(cache.get("broken").unwrap(), None);
    }

    #[test]
    fn rejects_escaping_keys() {
        let cache = FileCache::new("/tmp/unused");
        assert!(cache.get("../etc/passwd").is_err());
        assert!(cache.set("a//b", &json!(1)).is_err());
    }
}
