mod path;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use axum::http::Request;
use tower::{Layer, Service};
use tracing::trace;

pub use crate::tracer::path::{decode_path, ResourceReference};

/// Objects addressed by the requests of one render, in call order.
///
/// Repeated requests for the same object are kept, so the length follows
/// the number of calls rather than the number of distinct objects.
#[derive(Clone, Default)]
pub struct ResourceTrace {
    resources: Arc<Mutex<Vec<ResourceReference>>>,
}

impl ResourceTrace {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, reference: ResourceReference) {
        self.lock().push(reference);
    }

    pub fn resources(&self) -> Vec<ResourceReference> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ResourceReference>> {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Records the object each request addresses into a [`ResourceTrace`],
/// then hands the request to the wrapped service untouched.
#[derive(Clone)]
pub struct TraceLayer {
    trace: ResourceTrace,
}

impl TraceLayer {
    pub fn new(trace: ResourceTrace) -> Self {
        Self { trace }
    }
}

impl<S> Layer<S> for TraceLayer {
    type Service = TraceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceService {
            inner,
            trace: self.trace.clone(),
        }
    }
}

#[derive(Clone)]
pub struct TraceService<S> {
    inner: S,
    trace: ResourceTrace,
}

impl<S, B> Service<Request<B>> for TraceService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let path = request.uri().path();
        match decode_path(path) {
            Some(reference) => {
                trace!(method = %request.method(), path, "object request");
                self.trace.record(reference);
            }
            None => trace!(method = %request.method(), path, "not an object request"),
        }

        self.inner.call(request)
    }
}

#[cfg(test)]
mod tests {
    use futures::future::join_all;
    use k8s_openapi::api::core::v1::Pod;
    use kube::api::ListParams;
    use kube::client::Body;
    use kube::Api;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::tests::utils::fake_api::FakeApi;
    use crate::ApiResolver;

    fn get(path: &str) -> Request<Body> {
        Request::get(path).body(Body::empty()).unwrap()
    }

    fn pod(namespace: &str, name: &str) -> serde_json::Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": name, "namespace": namespace },
        })
    }

    #[tokio::test]
    async fn should_record_object_requests_in_call_order() {
        let api = FakeApi::default();
        let trace = ResourceTrace::new();
        let mut service = TraceLayer::new(trace.clone()).layer(api.clone());

        for path in [
            "/api/v1/namespaces/ns/pods/foo",
            "/apis/apps/v1",
            "/apis/apps/v1/namespaces/ns/deployments",
            "/apis/apps/v1/namespaces/ns/deployments/web",
            "/api/v1/namespaces/ns/pods/foo",
        ] {
            let _ = ServiceExt::<Request<Body>>::ready(&mut service)
                .await
                .unwrap()
                .call(get(path))
                .await;
        }

        let resources = trace.resources();
        assert_eq!(resources.len(), 3);
        assert_eq!(resources[0].resource, "pods");
        assert_eq!(resources[1].resource, "deployments");
        assert_eq!(resources[1].group, "apps");
        assert_eq!(resources[0], resources[2], "repeated calls are kept");
    }

    #[tokio::test]
    async fn should_not_drop_concurrent_requests() {
        let api = FakeApi::default();
        let trace = ResourceTrace::new();
        let service = TraceLayer::new(trace.clone()).layer(api.clone());

        let calls = (0..64).map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                let path = if i % 2 == 0 {
                    format!("/api/v1/namespaces/ns/configmaps/cm-{i}")
                } else {
                    String::from("/api/v1/namespaces/ns/configmaps")
                };
                service.oneshot(get(&path)).await
            })
        });
        join_all(calls).await;

        assert_eq!(trace.resources().len(), 32);
        assert_eq!(api.requests().len(), 64, "every call is forwarded");
    }

    #[tokio::test]
    async fn should_forward_responses_unchanged() {
        let api = FakeApi::default();
        api.respond("/api/v1/namespaces/ns/pods/foo", 200, pod("ns", "foo"));
        let resolver = ApiResolver::with_service(api.clone());
        let trace = ResourceTrace::new();
        let client = resolver.traced_client(&trace).unwrap();

        let pods: Api<Pod> = Api::namespaced(client, "ns");
        let found = pods.get("foo").await.unwrap();
        let missing = pods.get("bar").await;

        assert_eq!(found.metadata.name.as_deref(), Some("foo"));
        assert_matches!(missing, Err(kube::Error::Api(err)) if err.code == 404);
        assert_eq!(
            trace.resources(),
            vec![
                ResourceReference {
                    version: String::from("v1"),
                    resource: String::from("pods"),
                    name: String::from("foo"),
                    namespace: String::from("ns"),
                    ..Default::default()
                },
                ResourceReference {
                    version: String::from("v1"),
                    resource: String::from("pods"),
                    name: String::from("bar"),
                    namespace: String::from("ns"),
                    ..Default::default()
                },
            ]
        );
    }

    #[tokio::test]
    async fn should_trace_mixed_groups_end_to_end() {
        let api = FakeApi::default();
        let resolver = ApiResolver::with_service(api.clone());
        let trace = ResourceTrace::new();
        let client = resolver.traced_client(&trace).unwrap();

        for path in [
            "/api/v1/namespaces/ns/pods/foo",
            "/apis/finops.example.io/v1alpha1/namespaces/ns/widgets/bar",
        ] {
            client.send(get(path)).await.unwrap();
        }

        assert_eq!(
            serde_json::to_value(trace.resources()).unwrap(),
            json!([
                {"group": "", "version": "v1", "resource": "pods", "name": "foo", "namespace": "ns"},
                {"group": "finops.example.io", "version": "v1alpha1", "resource": "widgets", "name": "bar", "namespace": "ns"},
            ])
        );
    }

    #[tokio::test]
    async fn should_trace_nothing_for_list_calls() {
        let api = FakeApi::default();
        api.respond(
            "/api/v1/namespaces/ns/pods",
            200,
            json!({ "apiVersion": "v1", "kind": "PodList", "metadata": {}, "items": [] }),
        );
        let resolver = ApiResolver::with_service(api.clone());
        let trace = ResourceTrace::new();
        let client = resolver.traced_client(&trace).unwrap();

        let pods: Api<Pod> = Api::namespaced(client, "ns");
        pods.list(&ListParams::default()).await.unwrap();

        assert_eq!(serde_json::to_string(&trace.resources()).unwrap(), "[]");
    }
}
