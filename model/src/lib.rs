/*!

This library provides the provider data model: the provider catalog, provider filters and
selectors, the provider class taxonomy and the options that steer provider parametrization.

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

pub use catalog::Catalog;
pub use class::{Capabilities, Category, ClassRef, EndpointSchema, ProviderClass};
pub use descriptor::{CredentialRef, Endpoint, ProviderDescriptor};
pub use error::{Error, Result};
pub use filter::{apply_filters, GlobalFilters, ProviderFilter, RequiredField};
pub use options::RunnerOptions;
pub use selector::Selector;
pub use version::LooseVersion;

mod catalog;
mod class;
pub mod constants;
mod descriptor;
mod error;
mod filter;
mod options;
mod selector;
mod version;
