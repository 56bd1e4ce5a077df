use std::time::Duration;

use clap::Parser;
use eyre::{eyre, Result};
use humantime::parse_duration;

#[derive(Clone, Debug, Parser)]
#[command(version, about)]
pub struct Config {
    /// Port the HTTP API listens on.
    #[arg(long, env = "PLUGIN_PORT", default_value_t = 8081)]
    pub port: u16,

    /// Dump verbose output.
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Namespace the platform itself is installed in, exposed to charts.
    #[arg(long, env = "KRATEO_NAMESPACE", default_value = "krateo-system")]
    pub krateo_namespace: String,

    #[arg(long, env = "HELM_BINARY", default_value = "helm")]
    pub helm_binary: String,

    /// Upper bound for a single chart render.
    #[arg(long, env = "RENDER_TIMEOUT", default_value = "2m", value_parser = parse_render_timeout)]
    pub render_timeout: Duration,
}

fn parse_render_timeout(input: &str) -> Result<Duration> {
    let duration = parse_duration(input)?;
    if duration.is_zero() {
        return Err(eyre!("render-timeout should be > 0"));
    }

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_defaults() {
        let config = Config::try_parse_from(["chart-inspector"]).unwrap();

        assert_eq!(config.port, 8081);
        assert!(!config.debug);
        assert_eq!(config.krateo_namespace, "krateo-system");
        assert_eq!(config.render_timeout, Duration::from_secs(120));
    }

    #[test]
    fn should_reject_zero_timeout() {
        let result = Config::try_parse_from(["chart-inspector", "--render-timeout", "0s"]);

        assert!(result.is_err());
    }
}
