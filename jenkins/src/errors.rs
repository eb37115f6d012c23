use reqwest::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum JenkinsError {
    #[error("jenkins resource not found: {0}")]
    NotFound(String),
    #[error("jenkins request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("jenkins returned {status} for {path}")]
    Status { status: StatusCode, path: String },
    #[error("invalid jenkins url: {0}")]
    InvalidUrl(String),
}

impl JenkinsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, JenkinsError::NotFound(_))
    }

    /// True when Jenkins could not be reached or did not answer in time.
    pub fn is_unavailable(&self) -> bool {
        match self {
            JenkinsError::Request(e) => e.is_connect() || e.is_timeout(),
            JenkinsError::Status { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}
