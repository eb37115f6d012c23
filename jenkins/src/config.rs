use serde::Deserialize;
use std::fmt;
use url::Url;

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Clone, Deserialize, PartialEq)]
pub struct JenkinsConfig {
    /// Base URL of the Jenkins controller, including any path prefix.
    pub url: Url,
    #[serde(default)]
    pub username: Option<String>,
    /// API token (or password) for `username`.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Applies to every call made against Jenkins.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl JenkinsConfig {
    pub fn new(url: Url) -> Self {
        JenkinsConfig {
            url,
            username: None,
            api_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl fmt::Debug for JenkinsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JenkinsConfig")
            .field("url", &self.url.as_str())
            .field("username", &self.username)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
