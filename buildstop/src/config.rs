use gateway::config::{Config as GatewayConfig, SlackConfig};
use serde::Deserialize;
use std::fs::File;
use url::Url;

fn default_metrics_prefix() -> String {
    "buildstop".into()
}

fn default_log_filter() -> String {
    "info".into()
}

#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directives. `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub sentry_dsn: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: default_log_filter(),
            sentry_dsn: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CommonConfig {
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub gateway: GatewayConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    /// Overrides connection settings and secrets with environment values.
    /// Unset and empty variables are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let jenkins = &mut self.gateway.jenkins;

        if let Some(value) = var("JENKINS_URL") {
            jenkins.url = parse_url("JENKINS_URL", &value)?;
        }
        if let Some(value) = var("JENKINS_USER") {
            jenkins.username = Some(value);
        }
        if let Some(value) = var("JENKINS_API_TOKEN") {
            jenkins.api_token = Some(value);
        }

        if let Some(value) = var("SLACK_WEBHOOK_URL") {
            let webhook_url = parse_url("SLACK_WEBHOOK_URL", &value)?;
            match &mut self.gateway.slack {
                Some(slack) => slack.webhook_url = webhook_url,
                None => self.gateway.slack = Some(SlackConfig::new(webhook_url)),
            }
        }
        if let Some(value) = var("SLACK_CHANNEL") {
            if let Some(slack) = &mut self.gateway.slack {
                slack.channel = value;
            }
        }

        Ok(())
    }
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidEnv { name, source })
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("{name} is not a valid URL: {source}")]
    InvalidEnv {
        name: &'static str,
        source: url::ParseError,
    },
}
