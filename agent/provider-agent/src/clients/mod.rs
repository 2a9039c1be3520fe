/*!

This module provides the clients the provider agent uses to talk to the appliance under test, the
template tracker and the persistent cache.

!*/

mod appliance;
mod cache;
mod error;
mod tracker;

pub use appliance::{
    Appliance, AuthenticationPayload, ConnectionConfiguration, EndpointPayload, Interface,
    ProviderPayload, ProviderStats, RefreshStatus, RestAppliance,
};
pub use cache::{FileCache, KeyValueCache};
pub use error::{ClientError, ClientResult};
pub use tracker::{ProviderTemplates, Tracker, TrackerbotClient};
