use std::time::Duration;

/// Helper macro to avoid retyping the name of the tracker cache namespace when creating further
/// string constants from it. When given no parameters, this returns the namespace. When given a
/// string literal parameter it adds `/parameter` to the end.
macro_rules! trackerbot {
    () => {
        "miq-trackerbot"
    };
    ($s:literal) => {
        concat!(trackerbot!(), "/", $s)
    };
}

// Setup engine
pub const SETUP_FAIL_LIMIT: u32 = 3;
pub const DEFAULT_PROVIDER_LIMIT: usize = 1;

// Timeouts and polling
pub const WAIT_FOR_DELETE_TIMEOUT: Duration = Duration::from_secs(600);
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(5);

// Catalog keys
pub const MANAGEMENT_SYSTEMS: &str = "management_systems";
pub const TEST_FLAGS: &str = "test_flags";
pub const EXCLUDED_TEST_FLAGS: &str = "excluded_test_flags";
pub const DEFAULT_ENDPOINT: &str = "default";

// Tags
pub const TAG_DISABLED: &str = "disabled";
pub const TAG_DO_NOT_PREFER: &str = "do_not_prefer";
pub const TAG_PERF: &str = "perf";

// Fixture names
pub const PROVIDER_FIXTURE_NAME: &str = "provider";

// Template cache
pub const TRACKERBOT_CACHE: &str = trackerbot!();
pub const TRACKERBOT_TEMPLATE_ENDPOINT: &str = "template";

// Artifact hooks
pub const SKIP_TEST_HOOK: &str = "skip_test";

// Environment variables
pub const ENV_SEED: &str = "PROVSYS_SEED";
pub const ENV_TRACKERBOT_URL: &str = "PROVSYS_TRACKERBOT_URL";

/// The key under which the template list of `provider_key` is persisted between runs.
pub fn template_cache_key(provider_key: &str) -> String {
    format!("{}/{}", TRACKERBOT_CACHE, provider_key)
}

#[test]
fn trackerbot_constants_macro_test() {
    assert_eq!("miq-trackerbot", trackerbot!());
    assert_eq!("miq-trackerbot/vc1", trackerbot!("vc1"));
    assert_eq!("miq-trackerbot/vc1", template_cache_key("vc1"));
}
