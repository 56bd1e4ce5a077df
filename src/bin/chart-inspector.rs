use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::config::Frame;
use eyre::Result;
use tokio::select;
use tracing::{debug, error, info, Level};
use tracing_error::ErrorLayer;
use tracing_subscriber::filter::FromEnvError;
use tracing_subscriber::fmt::Layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{filter::Directive, EnvFilter};

use chart_inspector::{
    start_crd_watcher, start_server, ApiResolver, Config, DiscoveryCache, HelmRenderer,
    ServiceRegistry, Shutdown,
};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let config = Config::parse();

    init_tracing_subscriber(&config)?;
    install_color_eyre()?;

    print_build_info();

    let shutdown = Shutdown::new();
    if let Err(err) = try_main(config, &shutdown).await {
        error!(?err, "Failed to start server");
        shutdown.trigger_shutdown();
    }

    shutdown.wait_shutdown_triggered().await;

    select! {
        _ = shutdown.wait_shutdown_complete() => {},
        _ = tokio::time::sleep(Duration::from_secs(1)) => {
            info!("Waiting for graceful shutdown");
            shutdown.wait_shutdown_complete().await;
        }
    }

    info!("Bye!");
    Ok(ExitCode::SUCCESS)
}

async fn try_main(config: Config, shutdown: &Shutdown) -> Result<()> {
    let api_resolver = ApiResolver::try_new(kube::Config::infer().await?)?;
    let service_registry = ServiceRegistry::default();
    let discovery = DiscoveryCache::new(api_resolver.client.clone());

    info!("Starting");

    start_crd_watcher(&api_resolver, &discovery, &service_registry, shutdown)?;
    let renderer = Arc::new(HelmRenderer::new(
        config.helm_binary.clone(),
        config.render_timeout,
    ));
    start_server(
        &api_resolver,
        &discovery,
        renderer,
        &config,
        &service_registry,
        shutdown,
    )
    .await?;

    info!("Services started");
    loop {
        let not_ready = service_registry.get_not_ready_services();
        if not_ready.is_empty() {
            info!("Service ready");
            break;
        }

        select! {
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
            _ = shutdown.wait_shutdown_triggered() => {
                break
            },
        }
    }

    Ok(())
}

fn selfish_frame_filter(frames: &mut Vec<&Frame>) {
    frames.retain(|frame| {
        matches!(frame.name.as_ref(),
            Some(name) if name == "chart_inspector"
            || name.starts_with("chart_inspector::"))
    });
}

fn init_tracing_subscriber(config: &Config) -> Result<()> {
    let level = if config.debug { Level::DEBUG } else { Level::INFO };

    tracing_subscriber::registry()
        .with({
            let layer = Layer::default();
            let filter = env_filter(level)?;
            layer.with_filter(filter)
        })
        .with({
            let layer = ErrorLayer::default();
            let filter = env_filter(level)?;
            layer.with_filter(filter)
        })
        .try_init()?;

    return Ok(());

    fn env_filter(level: Level) -> Result<EnvFilter, FromEnvError> {
        EnvFilter::builder()
            .with_default_directive(Directive::from(level))
            .from_env()
    }
}

fn install_color_eyre() -> Result<()> {
    color_eyre::config::HookBuilder::new()
        .capture_span_trace_by_default(true)
        .add_frame_filter(Box::new(selfish_frame_filter))
        .install()?;
    Ok(())
}

fn print_build_info() {
    info!("tag: {}", env!("VERGEN_GIT_DESCRIBE"));
    debug!("branch: {}", env!("VERGEN_GIT_BRANCH"));
    debug!("commit: {}", env!("VERGEN_GIT_SHA"));
    debug!("commit date: {}", env!("VERGEN_GIT_COMMIT_DATE"));

    debug!("rustc: {}", env!("VERGEN_RUSTC_SEMVER"));
    debug!("build date: {}", env!("VERGEN_BUILD_TIMESTAMP"));
}
