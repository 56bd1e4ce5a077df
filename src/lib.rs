mod api_resolver;
mod composition;
mod config;
mod consts;
mod crd_watcher;
mod discovery;
mod error_codes;
mod render;
mod server;
mod service_registry;
mod shutdown;
mod spawn_service;
mod tracer;
mod utils;
mod values;

pub use crate::api_resolver::ApiResolver;
pub use crate::config::Config;
pub use crate::crd_watcher::{handle_crd_event, start_crd_watcher, CrdEvent, CrdTracker};
pub use crate::discovery::{CacheStatus, DiscoveryCache, DiscoveryError, Invalidate};
pub use crate::render::{ChartRenderer, ChartSpec, HelmRenderer, RenderError};
pub use crate::server::{start_server, ApiError};
pub use crate::service_registry::ServiceRegistry;
pub use crate::shutdown::Shutdown;
pub use crate::tracer::{decode_path, ResourceReference, ResourceTrace, TraceLayer, TraceService};
pub use crate::values::{add_or_update_field, inject_values, CompositionValues, InjectError};

#[cfg(test)]
mod tests;

#[cfg(test)]
#[macro_use]
extern crate assert_matches;
