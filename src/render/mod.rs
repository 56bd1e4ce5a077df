mod helm;
mod proxy;

use std::process::ExitStatus;
use std::time::Duration;

use futures::future::BoxFuture;
use kube::Client;
use thiserror::Error;

pub use crate::render::helm::HelmRenderer;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unable to start the api proxy")]
    Proxy(#[source] std::io::Error),

    #[error("unable to run '{command}'")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("render failed ({status}): {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("render did not finish within {0:?}")]
    Timeout(Duration),
}

/// Everything needed to render one chart release.
#[derive(Clone, Debug, Default)]
pub struct ChartSpec {
    pub release_name: String,
    pub namespace: String,
    /// Chart reference: an archive URL, an `oci://` reference, or a chart
    /// name within `repo`.
    pub chart_name: String,
    pub version: String,
    pub repo: String,
    pub values_yaml: String,
    pub insecure_skip_tls_verify: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Renders a chart, sending every API call of the render through `client`.
///
/// Implementations must only issue the reads a real install would issue
/// and never create, update or delete anything.
pub trait ChartRenderer: Send + Sync + 'static {
    fn render<'a>(
        &'a self,
        client: Client,
        chart: &'a ChartSpec,
    ) -> BoxFuture<'a, Result<(), RenderError>>;
}
