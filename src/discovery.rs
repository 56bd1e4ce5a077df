use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResourceList;
use kube::Client;
use thiserror::Error;
use tracing::{debug, trace};

/// Something holding state derived from the cluster's API schema.
pub trait Invalidate: Send + Sync {
    fn invalidate(&self);
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to discover resources of '{group_version}'")]
    Fetch {
        group_version: String,
        #[source]
        source: kube::Error,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    Empty,
    Populated,
    Invalidated,
}

/// Resources served per group version, fetched lazily and kept until the
/// next [`Invalidate::invalidate`].
#[derive(Clone)]
pub struct DiscoveryCache {
    client: Client,
    state: Arc<RwLock<CacheState>>,
}

struct CacheState {
    status: CacheStatus,
    // bumped on invalidate so a fetch that raced with it isn't stored
    generation: u64,
    entries: HashMap<String, Arc<Vec<String>>>,
}

impl DiscoveryCache {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            state: Arc::new(RwLock::new(CacheState {
                status: CacheStatus::Empty,
                generation: 0,
                entries: HashMap::new(),
            })),
        }
    }

    pub fn status(&self) -> CacheStatus {
        self.read().status
    }

    /// Plural names of the resources served by `group_version` (`v1` for
    /// the core group, `{group}/{version}` otherwise), in server order.
    /// Subresources are left out.
    pub async fn lookup(&self, group_version: &str) -> Result<Arc<Vec<String>>, DiscoveryError> {
        let generation = {
            let state = self.read();
            if let Some(resources) = state.entries.get(group_version) {
                trace!(group_version, "discovery cache hit");
                return Ok(Arc::clone(resources));
            }
            state.generation
        };

        debug!(group_version, "discovering resources");
        let list = self
            .fetch(group_version)
            .await
            .map_err(|source| DiscoveryError::Fetch {
                group_version: group_version.to_string(),
                source,
            })?;

        let resources: Arc<Vec<String>> = Arc::new(
            list.resources
                .into_iter()
                .map(|resource| resource.name)
                .filter(|name| !name.contains('/'))
                .collect(),
        );

        let mut state = self.write();
        if state.generation == generation {
            state
                .entries
                .insert(group_version.to_string(), Arc::clone(&resources));
            state.status = CacheStatus::Populated;
        }

        Ok(resources)
    }

    /// The first resource served by `group_version`, if any.
    pub async fn first_resource(&self, group_version: &str) -> Result<Option<String>, DiscoveryError> {
        let resources = self.lookup(group_version).await?;
        Ok(resources.first().cloned())
    }

    async fn fetch(&self, group_version: &str) -> kube::Result<APIResourceList> {
        if group_version.contains('/') {
            self.client.list_api_group_resources(group_version).await
        } else {
            self.client.list_core_api_resources(group_version).await
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Invalidate for DiscoveryCache {
    fn invalidate(&self) {
        let mut state = self.write();
        state.generation += 1;
        state.entries.clear();
        if state.status == CacheStatus::Populated {
            state.status = CacheStatus::Invalidated;
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::tests::utils::fake_api::FakeApi;
    use crate::ApiResolver;

    fn resource_list(group_version: &str, resources: &[(&str, &str)]) -> Value {
        let resources: Vec<Value> = resources
            .iter()
            .map(|(name, kind)| {
                json!({
                    "name": name,
                    "singularName": "",
                    "namespaced": true,
                    "kind": kind,
                    "verbs": ["get", "list"],
                })
            })
            .collect();

        json!({
            "kind": "APIResourceList",
            "apiVersion": "v1",
            "groupVersion": group_version,
            "resources": resources,
        })
    }

    fn cache_with(api: &FakeApi) -> DiscoveryCache {
        DiscoveryCache::new(ApiResolver::with_service(api.clone()).client)
    }

    #[tokio::test]
    async fn should_fetch_once_until_invalidated() {
        let api = FakeApi::default();
        api.respond(
            "/apis/apps/v1",
            200,
            resource_list(
                "apps/v1",
                &[
                    ("deployments", "Deployment"),
                    ("deployments/status", "Deployment"),
                    ("statefulsets", "StatefulSet"),
                ],
            ),
        );
        let cache = cache_with(&api);
        assert_eq!(cache.status(), CacheStatus::Empty);

        let first = cache.lookup("apps/v1").await.unwrap();
        let second = cache.lookup("apps/v1").await.unwrap();

        assert_eq!(*first, vec!["deployments", "statefulsets"]);
        assert_eq!(first, second);
        assert_eq!(api.requests_to("/apis/apps/v1"), 1);
        assert_eq!(cache.status(), CacheStatus::Populated);

        cache.invalidate();
        assert_eq!(cache.status(), CacheStatus::Invalidated);

        cache.lookup("apps/v1").await.unwrap();
        assert_eq!(api.requests_to("/apis/apps/v1"), 2);
        assert_eq!(cache.status(), CacheStatus::Populated);
    }

    #[tokio::test]
    async fn should_use_legacy_path_for_core_group() {
        let api = FakeApi::default();
        api.respond(
            "/api/v1",
            200,
            resource_list("v1", &[("pods", "Pod"), ("pods/log", "Pod")]),
        );
        let cache = cache_with(&api);

        let resources = cache.lookup("v1").await.unwrap();

        assert_eq!(*resources, vec!["pods"]);
    }

    #[tokio::test]
    async fn should_keep_state_on_fetch_failure() {
        let api = FakeApi::default();
        let cache = cache_with(&api);

        let result = cache.lookup("composition.krateo.io/v1").await;

        assert_matches!(result, Err(DiscoveryError::Fetch { .. }));
        assert_eq!(cache.status(), CacheStatus::Empty);

        api.respond(
            "/apis/composition.krateo.io/v1",
            200,
            resource_list("composition.krateo.io/v1", &[("fireworksapps", "FireworksApp")]),
        );
        let resource = cache.first_resource("composition.krateo.io/v1").await.unwrap();

        assert_eq!(resource.as_deref(), Some("fireworksapps"));
        assert_eq!(api.requests_to("/apis/composition.krateo.io/v1"), 2);
    }

    #[tokio::test]
    async fn should_not_invalidate_empty_cache_into_invalidated() {
        let api = FakeApi::default();
        let cache = cache_with(&api);

        cache.invalidate();

        assert_eq!(cache.status(), CacheStatus::Empty);
    }
}
