/*!

The `test-agent` library connects tests to providers. At collection time the [`Collector`] reads a
test's [`ProviderMarker`]s and parametrizes the test with matching providers from the catalog. At
run time [`Fixtures`] turns the parametrized providers into live ones and sets them up on the
appliance through the [`SetupEngine`](provider_agent::SetupEngine).

The test runner itself is reached through the [`Metafunc`] trait and [`FixtureRequest`].

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

pub mod error;
mod fixtures;
mod marker;
mod parametrize;

pub use error::{CollectionError, FixtureError};
pub use fixtures::{
    FixtureRequest, FixtureValue, Fixtures, ProviderFixtureRegistry, RegisteredFixture,
    TemplateFixture, TEMPLATE_FIXTURES,
};
pub use marker::{GenFunc, ProviderMarker, Scope};
pub use parametrize::{providers_by_class, Collector, Metafunc, Parametrization};
