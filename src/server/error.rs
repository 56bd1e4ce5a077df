use std::error::Error;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use crate::composition::CompositionError;
use crate::discovery::DiscoveryError;
use crate::render::RenderError;
use crate::values::InjectError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing required query parameters: {}", .0.join(", "))]
    MissingParameters(Vec<&'static str>),

    #[error("no resource served by '{group_version}'")]
    UnknownResource { group_version: String },

    #[error("composition definition '{namespace}/{name}' has no chart")]
    NoChart { namespace: String, name: String },

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("unable to inject values")]
    Values(#[from] InjectError),

    #[error("unable to build a traced client")]
    Client(#[from] kube::Error),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingParameters(_) => StatusCode::BAD_REQUEST,
            ApiError::UnknownResource { .. } => StatusCode::NOT_FOUND,
            ApiError::Composition(CompositionError::NotFound { .. }) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message with every cause appended.
    fn chain(&self) -> String {
        let mut message = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            message.push_str(": ");
            message.push_str(&err.to_string());
            source = err.source();
        }

        message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let message = self.chain();
        if status_code.is_server_error() {
            error!(%status_code, %message, "request failed");
        } else {
            debug!(%status_code, %message, "request rejected");
        }

        (status_code, Json(json!({ "error": message }))).into_response()
    }
}
