use std::collections::HashMap;
use std::convert::Infallible;
use std::future::{ready, Ready};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use axum::http::{Request, Response, StatusCode};
use kube::client::Body;
use serde_json::{json, Value};
use tower::Service;

/// In-process stand-in for an API server.
///
/// Answers GETs from canned responses keyed by path, 404 `Status` otherwise,
/// and remembers every request path it has seen. Watch requests are looked
/// up under `{path}?watch`.
#[derive(Clone, Default)]
pub struct FakeApi {
    responses: Arc<Mutex<HashMap<String, (u16, Value)>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeApi {
    pub fn respond(&self, path: &str, status: u16, body: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> usize {
        self.requests().iter().filter(|it| *it == path).count()
    }

    fn handle<B>(&self, request: &Request<B>) -> Response<Body> {
        let path = request.uri().path().to_string();
        self.requests.lock().unwrap().push(path.clone());

        let key = match request.uri().query() {
            Some(query) if query.split('&').any(|it| it == "watch=true") => {
                format!("{path}?watch")
            }
            _ => path.clone(),
        };

        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| (404, not_found(&path)));

        Response::builder()
            .status(StatusCode::from_u16(status).unwrap())
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }
}

fn not_found(path: &str) -> Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": format!("{path} not found"),
        "reason": "NotFound",
        "code": 404,
    })
}

impl<B> Service<Request<B>> for FakeApi {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = Ready<Result<Response<Body>, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        ready(Ok(self.handle(&request)))
    }
}
