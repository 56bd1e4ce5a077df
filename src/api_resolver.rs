use std::sync::Arc;

use kube::client::ClientBuilder;
use kube::{Client, Config};

use crate::tracer::{ResourceTrace, TraceLayer};

type TracedClientFactory = Arc<dyn Fn(TraceLayer) -> kube::Result<Client> + Send + Sync>;

#[derive(Clone)]
pub struct ApiResolver {
    pub client: Client,
    traced: TracedClientFactory,
}

impl ApiResolver {
    pub fn try_new(config: Config) -> kube::Result<Self> {
        let client = Client::try_from(config.clone())?;
        let traced: TracedClientFactory = Arc::new(move |layer: TraceLayer| {
            let client = ClientBuilder::try_from(config.clone())?
                .with_layer(&layer)
                .build();
            Ok(client)
        });

        Ok(Self { client, traced })
    }

    /// A fresh client whose requests are recorded into `trace`.
    ///
    /// The client shares nothing with [`ApiResolver::client`] so traces of
    /// concurrent renders never mix.
    pub fn traced_client(&self, trace: &ResourceTrace) -> kube::Result<Client> {
        (self.traced)(TraceLayer::new(trace.clone()))
    }
}

#[cfg(test)]
impl ApiResolver {
    pub(crate) fn with_service<S>(service: S) -> Self
    where
        S: tower::Service<
                axum::http::Request<kube::client::Body>,
                Response = axum::http::Response<kube::client::Body>,
                Error = std::convert::Infallible,
            > + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        use tower::Layer;

        let client = Client::new(service.clone(), "default");
        let traced: TracedClientFactory = Arc::new(move |layer: TraceLayer| {
            Ok(Client::new(layer.layer(service.clone()), "default"))
        });

        Self { client, traced }
    }
}
