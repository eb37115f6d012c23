use crate::cancel::CancelPolicy;
use jenkins::JenkinsConfig;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("auth.{0} is required when auth.mode is enforce")]
    MissingAuthSetting(&'static str),

    #[error("auth.bypass_claims must contain a non-empty sub claim")]
    InvalidBypassIdentity,

    #[error("slack.channel cannot be empty")]
    EmptySlackChannel,
}

/// Gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    pub jenkins: JenkinsConfig,
    pub auth: AuthConfig,
    /// Cancellation notifications are skipped when absent.
    #[serde(default)]
    pub slack: Option<SlackConfig>,
    #[serde(default)]
    pub cancel_policy: CancelPolicy,
    /// Directory of static web assets served for paths outside `/api`.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.auth.validate()?;

        if let Some(slack) = &self.slack {
            if slack.channel.trim().is_empty() {
                return Err(ValidationError::EmptySlackChannel);
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 5000,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Every API request must carry a valid bearer token.
    #[default]
    Enforce,
    /// Tokens are not checked and every request runs as `bypass_claims`.
    /// Only meant for local testing.
    Bypass,
}

fn default_region() -> String {
    "us-east-1".into()
}

fn default_jwks_timeout_secs() -> u64 {
    5
}

/// Settings of the Cognito user pool that issues the bearer tokens.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub user_pool_id: String,
    /// App client id, expected as the audience of id tokens.
    #[serde(default)]
    pub client_id: String,
    /// Overrides the key set location derived from the issuer.
    #[serde(default)]
    pub jwks_url: Option<Url>,
    #[serde(default = "default_jwks_timeout_secs")]
    pub jwks_timeout_secs: u64,
    #[serde(default)]
    pub bypass_claims: Option<Map<String, Value>>,
}

impl AuthConfig {
    pub fn issuer(&self) -> String {
        format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            self.region, self.user_pool_id
        )
    }

    pub fn jwks_url(&self) -> Result<Url, url::ParseError> {
        match &self.jwks_url {
            Some(url) => Ok(url.clone()),
            None => Url::parse(&format!("{}/.well-known/jwks.json", self.issuer())),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.mode {
            AuthMode::Enforce => {
                if self.region.trim().is_empty() {
                    return Err(ValidationError::MissingAuthSetting("region"));
                }
                if self.user_pool_id.trim().is_empty() {
                    return Err(ValidationError::MissingAuthSetting("user_pool_id"));
                }
                if self.client_id.trim().is_empty() {
                    return Err(ValidationError::MissingAuthSetting("client_id"));
                }
            }
            AuthMode::Bypass => {
                if let Some(claims) = &self.bypass_claims {
                    let has_sub = claims
                        .get("sub")
                        .and_then(Value::as_str)
                        .is_some_and(|sub| !sub.is_empty());
                    if !has_sub {
                        return Err(ValidationError::InvalidBypassIdentity);
                    }
                }
            }
        }
        Ok(())
    }
}

fn default_slack_channel() -> String {
    "jenkins-notifications".into()
}

fn default_slack_timeout_secs() -> u64 {
    5
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SlackConfig {
    /// Incoming webhook URL. Treated as a secret.
    pub webhook_url: Url,
    #[serde(default = "default_slack_channel")]
    pub channel: String,
    #[serde(default = "default_slack_timeout_secs")]
    pub timeout_secs: u64,
}

impl SlackConfig {
    pub fn new(webhook_url: Url) -> Self {
        SlackConfig {
            webhook_url,
            channel: default_slack_channel(),
            timeout_secs: default_slack_timeout_secs(),
        }
    }
}
