use serde::Deserialize;

/// Knobs for the integration tests, read once from `PROVSYS_SELFTEST_*` environment variables.
pub struct TestSettings {}

impl TestSettings {
    /// The seed that makes provider shuffling in integration tests reproducible.
    pub fn seed() -> u64 {
        TEST_SETTINGS.seed
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename = "SCREAMING_SNAKE_CASE")]
struct Inner {
    /// The shuffle seed. Defaults to `1234`.
    ///
    /// # Example
    ///
    /// ```text
    /// PROVSYS_SELFTEST_SEED=42
    /// ```
    #[serde(default = "seed")]
    seed: u64,
}

lazy_static::lazy_static! {
    static ref TEST_SETTINGS: Inner =
        envy::prefixed("PROVSYS_SELFTEST_")
            .from_env::<Inner>()
            .expect("Error parsing TestSettings environment variables");
}

/// Serde default for `PROVSYS_SELFTEST_SEED`.
fn seed() -> u64 {
    1234
}
