//! BBS state cache and auto-discovery config provider for Cloud Foundry.
//!
//! This library keeps an in-memory copy of the actual and desired LRPs of a
//! Cloud Foundry foundation and turns the `AD_DATADOGHQ_COM` environment
//! variable of each desired LRP into monitoring config templates.
//!
//! - [`cache::StateCache`]: periodic dual fetch, atomic snapshot publication
//! - [`lrp`]: raw BBS records and their projections
//! - [`action`]: breadth-first walk of launch action trees
//! - [`template`]: auto-discovery payload parsing
//! - [`collector::ConfigCollector`]: snapshot to templates

pub mod action;
pub mod cache;
pub mod client;
pub mod collector;
pub mod error;
pub mod fixture;
pub mod lrp;
pub mod template;

#[cfg(test)]
pub(crate) mod testing;

/// Environment variable holding the auto-discovery payload.
pub const AD_ENV_VAR: &str = "AD_DATADOGHQ_COM";

/// Environment variable holding the service bindings of an app.
pub const VCAP_SERVICES_ENV_VAR: &str = "VCAP_SERVICES";

pub use cache::{CacheRegistry, CacheSettings, CacheState, RefreshStatus, Snapshot, StateCache};
pub use client::{BbsHttpClient, ClientError, ClientSettings, RemoteStateClient};
pub use collector::{Collection, ConfigCollector};
pub use error::DiscoveryError;
pub use fixture::FixtureClient;
pub use lrp::{ActualInstance, DesiredInstance};
pub use template::{ConfigTemplate, Extraction};
