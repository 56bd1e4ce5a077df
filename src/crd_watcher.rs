use std::collections::{HashMap, HashSet};
use std::future::Future;

use eyre::Result;
use futures::StreamExt;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceDefinitionSpec,
};
use kube::runtime::watcher::Event;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, ResourceExt};
use tracing::{debug, error, span, trace, Instrument, Level};

use crate::api_resolver::ApiResolver;
use crate::discovery::Invalidate;
use crate::error_codes::is_410_expired_error_response;
use crate::service_registry::{ServiceRegistry, ServiceSignal};
use crate::shutdown::Shutdown;
use crate::spawn_service::spawn_service;

/// A change in the set of custom resource definitions.
#[derive(Clone, Debug, PartialEq)]
pub enum CrdEvent {
    Added {
        name: String,
    },
    Updated {
        name: String,
        old: Box<CustomResourceDefinitionSpec>,
        new: Box<CustomResourceDefinitionSpec>,
    },
    Deleted {
        name: String,
    },
}

/// Invalidate `invalidator` if `event` may have changed what the API server
/// serves. Returns whether it did.
///
/// Updates that leave the spec untouched (status, metadata) are ignored.
pub fn handle_crd_event(invalidator: &dyn Invalidate, event: &CrdEvent) -> bool {
    match event {
        CrdEvent::Added { name } => {
            invalidator.invalidate();
            debug!(%name, "discovery cache invalidated: CRD added");
            true
        }
        CrdEvent::Updated { name, old, new } => {
            if old == new {
                trace!(%name, "CRD updated without spec change");
                return false;
            }

            invalidator.invalidate();
            debug!(%name, "discovery cache invalidated: CRD spec changed");
            true
        }
        CrdEvent::Deleted { name } => {
            invalidator.invalidate();
            debug!(%name, "discovery cache invalidated: CRD deleted");
            true
        }
    }
}

/// Turns watch events, which only carry the latest object, into
/// [`CrdEvent`]s by remembering the last spec seen for each CRD.
#[derive(Default)]
pub struct CrdTracker {
    known: HashMap<String, CustomResourceDefinitionSpec>,
    relisted: Option<HashSet<String>>,
}

impl CrdTracker {
    pub fn observe(&mut self, event: Event<CustomResourceDefinition>) -> Vec<CrdEvent> {
        match event {
            Event::Apply(crd) => vec![self.apply(crd)],
            Event::InitApply(crd) => {
                if let Some(relisted) = self.relisted.as_mut() {
                    relisted.insert(crd.name_any());
                }
                vec![self.apply(crd)]
            }
            Event::Delete(crd) => {
                let name = crd.name_any();
                self.known.remove(&name);
                vec![CrdEvent::Deleted { name }]
            }
            Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            Event::InitDone => {
                let Some(relisted) = self.relisted.take() else {
                    return Vec::new();
                };

                let mut gone: Vec<String> = self
                    .known
                    .keys()
                    .filter(|name| !relisted.contains(*name))
                    .cloned()
                    .collect();
                gone.sort();

                gone.into_iter()
                    .map(|name| {
                        self.known.remove(&name);
                        CrdEvent::Deleted { name }
                    })
                    .collect()
            }
        }
    }

    fn apply(&mut self, crd: CustomResourceDefinition) -> CrdEvent {
        let name = crd.name_any();
        let new = crd.spec;
        match self.known.insert(name.clone(), new.clone()) {
            Some(old) => CrdEvent::Updated {
                name,
                old: Box::new(old),
                new: Box::new(new),
            },
            None => CrdEvent::Added { name },
        }
    }
}

/// Watch CRDs for the lifetime of the process and invalidate `invalidator`
/// whenever the served API may have changed.
pub fn start_crd_watcher<I>(
    api_resolver: &ApiResolver,
    invalidator: &I,
    service_registry: &ServiceRegistry,
    shutdown: &Shutdown,
) -> Result<()>
where
    I: Invalidate + Clone + 'static,
{
    let api: Api<CustomResourceDefinition> = Api::all(api_resolver.client.clone());
    let signal = service_registry.register("crd-watcher");
    spawn_service(
        shutdown,
        "crd-watcher",
        run_crd_watcher(api, invalidator.clone(), signal, shutdown.clone()),
    )?;

    Ok(())
}

fn run_crd_watcher<I>(
    api: Api<CustomResourceDefinition>,
    invalidator: I,
    signal: ServiceSignal,
    shutdown: Shutdown,
) -> impl Future<Output = ()>
where
    I: Invalidate + 'static,
{
    async move {
        // backoff resubscribes after disconnects; until then the cache may be stale
        let mut results = Box::pin(
            watcher(api, watcher::Config::default())
                .default_backoff()
                .take_until(shutdown.wait_shutdown_triggered()),
        );

        let mut tracker = CrdTracker::default();
        let mut signal = Some(signal);
        while let Some(result) = results.next().await {
            match result {
                Ok(event) => {
                    let init_done = matches!(event, Event::InitDone);
                    for crd_event in tracker.observe(event) {
                        handle_crd_event(&invalidator, &crd_event);
                    }

                    if init_done {
                        if let Some(signal) = signal.take() {
                            signal.ready();
                        }
                    }
                }
                Err(watcher::Error::WatchFailed(err)) => {
                    debug!(?err, "watch failed. stream will restart soon");
                }
                Err(watcher::Error::WatchError(resp)) if is_410_expired_error_response(&resp) => {
                    debug!(?resp, "watch expired. stream will restart");
                }
                Err(err) => {
                    error!(?err, "CRD watcher error");
                }
            }
        }
    }
    .instrument(span!(Level::ERROR, "crd-watcher"))
}
