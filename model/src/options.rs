use crate::constants::DEFAULT_PROVIDER_LIMIT;
use serde::{Deserialize, Serialize};

/// Runner-level switches that change how providers are parametrized and set up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RunnerOptions {
    /// Use the provider key as the test id regardless of the selector.
    pub legacy_ids: bool,
    /// Use the plain provider id instead of the selector-specific one.
    pub disable_selectors: bool,
    /// The maximum number of providers configured on the appliance at once, `0` for no limit.
    pub provider_limit: usize,
    /// Prefer template lists persisted by an earlier run over asking the tracker.
    pub use_template_cache: bool,
    /// Makes provider shuffling reproducible.
    pub seed: Option<u64>,
    pub trackerbot_url: Option<String>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            legacy_ids: false,
            disable_selectors: false,
            provider_limit: DEFAULT_PROVIDER_LIMIT,
            use_template_cache: false,
            seed: None,
            trackerbot_url: None,
        }
    }
}

impl RunnerOptions {
    /// The shuffle seed for the test `node_id`, if the run is seeded. The same seed and node id
    /// always give the same value.
    pub fn seed_for(&self, node_id: &str) -> Option<u64> {
        self.seed.map(|seed| seed ^ fnv1a(node_id.as_bytes()))
    }

    /// Whether `count` configured providers leave no room for another one.
    pub fn at_capacity(&self, count: usize) -> bool {
        self.provider_limit != 0 && count >= self.provider_limit
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[cfg(test)]
mod test {
    use super::RunnerOptions;
    use maplit::btreeset;

    #[test]
    fn defaults() {
        let options: RunnerOptions = serde_yaml::from_str("legacy_ids: true").unwrap();
        assert!(options.legacy_ids);
        assert_eq!(options.provider_limit, 1);
        assert_eq!(options.seed_for("test_a"), None);
    }

    #[test]
    fn seeds_depend_on_node_id() {
        let options = RunnerOptions {
            seed: Some(42),
            ..RunnerOptions::default()
        };
        assert_eq!(options.seed_for("test_a"), options.seed_for("test_a"));
        let seeds = btreeset! {
            options.seed_for("test_a"),
            options.seed_for("test_b"),
            options.seed_for("test_c"),
        };
        assert_eq!(seeds.len(), 3);
    }

    #[test]
    fn capacity() {
        let unlimited = RunnerOptions {
            provider_limit: 0,
            ..RunnerOptions::default()
        };
        assert!(!unlimited.at_capacity(100));
        let one = RunnerOptions::default();
        assert!(!one.at_capacity(0));
        assert!(one.at_capacity(1));
    }
}
