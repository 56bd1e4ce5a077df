use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use kube::Client;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Plain HTTP endpoint on loopback that forwards every request through a
/// [`Client`], so out-of-process tools reach the API server via its
/// transport and credentials.
pub struct ApiProxy {
    local_addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<io::Result<()>>,
}

impl ApiProxy {
    pub async fn start(client: Client) -> io::Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let local_addr = listener.local_addr()?;

        let app = Router::new().fallback(forward).with_state(client);
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    _ = stopped.await;
                })
                .await
        });

        debug!(%local_addr, "api proxy listening");
        Ok(Self {
            local_addr,
            stop: Some(stop),
            task,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            _ = stop.send(());
        }

        match tokio::time::timeout(STOP_GRACE_PERIOD, &mut self.task).await {
            Ok(Ok(Ok(()))) => debug!("api proxy stopped"),
            Ok(Ok(Err(err))) => warn!(%err, "api proxy failed"),
            Ok(Err(err)) => warn!(%err, "api proxy panicked"),
            Err(_) => warn!("api proxy did not stop in time"),
        }
    }
}

impl Drop for ApiProxy {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn forward(State(client): State<Client>, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();
    // the client sets its own host and credentials
    parts.headers.remove(header::HOST);
    parts.headers.remove(header::AUTHORIZATION);

    let body = match axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES).await {
        Ok(body) => body,
        Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    };

    let request = axum::http::Request::from_parts(parts, kube::client::Body::from(body.to_vec()));
    match client.send(request).await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(err) => {
            debug!(%err, "proxied request failed");
            (StatusCode::BAD_GATEWAY, err.to_string()).into_response()
        }
    }
}
