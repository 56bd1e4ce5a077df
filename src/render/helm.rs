use std::process::Stdio;
use std::time::Duration;

use futures::future::BoxFuture;
use kube::Client;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::render::proxy::ApiProxy;
use crate::render::{ChartRenderer, ChartSpec, RenderError};

/// Renders with `helm template --validate`.
///
/// Validation against the cluster makes helm look up every object the
/// release would own, the same reads an install performs before applying.
/// Helm talks to a loopback proxy that relays through the given client.
pub struct HelmRenderer {
    binary: String,
    timeout: Duration,
}

impl HelmRenderer {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    async fn run(&self, client: Client, chart: &ChartSpec) -> Result<(), RenderError> {
        let proxy = ApiProxy::start(client).await.map_err(RenderError::Proxy)?;
        let args = template_args(chart, &proxy.url());

        let result = tokio::time::timeout(self.timeout, self.helm(&args, chart)).await;
        proxy.stop().await;

        match result {
            Ok(result) => result,
            Err(_) => Err(RenderError::Timeout(self.timeout)),
        }
    }

    async fn helm(&self, args: &[String], chart: &ChartSpec) -> Result<(), RenderError> {
        debug!(release = %chart.release_name, chart = %chart.chart_name, "rendering chart");

        let spawn_error = |source| RenderError::Spawn {
            command: self.binary.clone(),
            source,
        };

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(chart.values_yaml.as_bytes())
                .await
                .map_err(spawn_error)?;
        }

        let output = child.wait_with_output().await.map_err(spawn_error)?;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        trace!(exit_code = output.status.code(), %stderr, "helm exited");

        if !output.status.success() {
            return Err(RenderError::Failed {
                status: output.status,
                stderr,
            });
        }

        Ok(())
    }
}

impl ChartRenderer for HelmRenderer {
    fn render<'a>(
        &'a self,
        client: Client,
        chart: &'a ChartSpec,
    ) -> BoxFuture<'a, Result<(), RenderError>> {
        Box::pin(self.run(client, chart))
    }
}

fn template_args(chart: &ChartSpec, api_server: &str) -> Vec<String> {
    let mut args: Vec<String> = [
        "template",
        &chart.release_name,
        &chart.chart_name,
        "--namespace",
        &chart.namespace,
        "--values",
        "-",
        "--validate",
        "--kube-apiserver",
        api_server,
    ]
    .iter()
    .map(|it| it.to_string())
    .collect();

    if !chart.version.is_empty() {
        args.extend([String::from("--version"), chart.version.clone()]);
    }
    if !chart.repo.is_empty() {
        args.extend([String::from("--repo"), chart.repo.clone()]);
    }
    if chart.insecure_skip_tls_verify {
        args.push(String::from("--insecure-skip-tls-verify"));
    }
    if let Some(username) = &chart.username {
        args.extend([String::from("--username"), username.clone()]);
    }
    if let Some(password) = &chart.password {
        args.extend([String::from("--password"), password.clone()]);
    }

    args
}
