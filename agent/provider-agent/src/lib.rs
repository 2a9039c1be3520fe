/*!

The `provider-agent` library brings providers from the catalog to life on the appliance under
test. A [`ProviderFactory`] turns a [`ProviderDescriptor`](provsys_model::ProviderDescriptor) into
a [`LiveProvider`](provider::LiveProvider), and the [`SetupEngine`] sets providers up for tests,
enforces the provider limit and quarantines providers that keep failing. The [`TemplateLoader`]
publishes which templates are usable on each provider.

The appliance, the template tracker and the persistent cache are reached through the traits in
[`clients`] so that fakes can be injected for testing.

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

pub mod artifacts;
pub mod clients;
mod crud;
mod engine;
pub mod error;
mod outcome;
pub mod provider;
mod request;
mod state;
pub mod templates;
mod wait;

pub use crud::ProviderFactory;
pub use engine::SetupEngine;
pub use outcome::{Interrupt, Outcome, Skip};
pub use request::TestRequest;
pub use state::{HarnessState, StateSnapshot};
pub use templates::{LoadContext, TemplateLoader, TemplateRecord, Templates};
pub use wait::{wait_for, WaitSettings};
