//! Chat notifications about cancelled builds.

use crate::config::SlackConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook responded with {0}")]
    Status(StatusCode),
}

/// What gets announced after a build was stopped.
#[derive(Clone, Debug, PartialEq)]
pub struct CancellationNotice {
    pub job_name: String,
    pub build_number: u64,
    pub cancelled_by: String,
    pub reason: String,
    pub timestamp: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &CancellationNotice) -> Result<(), NotifyError>;
}

/// Used when no webhook is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, notice: &CancellationNotice) -> Result<(), NotifyError> {
        tracing::info!(
            job = %notice.job_name,
            build = notice.build_number,
            "Slack webhook not configured, skipping notification"
        );
        Ok(())
    }
}

/// Posts to a Slack incoming webhook.
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook_url: Url,
    channel: String,
}

impl SlackNotifier {
    pub fn new(config: &SlackConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(SlackNotifier {
            client,
            webhook_url: config.webhook_url.clone(),
            channel: config.channel.clone(),
        })
    }

    fn message(&self, notice: &CancellationNotice) -> Value {
        json!({
            "text": format!(
                "Build {} #{} cancelled by {}",
                notice.job_name, notice.build_number, notice.cancelled_by
            ),
            "channel": self.channel,
            "blocks": [
                {
                    "type": "header",
                    "text": {"type": "plain_text", "text": "Jenkins Build Cancelled"}
                },
                {
                    "type": "section",
                    "fields": [
                        {"type": "mrkdwn", "text": format!("*Job:* {}", notice.job_name)},
                        {"type": "mrkdwn", "text": format!("*Build #:* {}", notice.build_number)},
                        {"type": "mrkdwn", "text": format!("*Cancelled by:* {}", notice.cancelled_by)},
                        {"type": "mrkdwn", "text": format!("*Time:* {}", notice.timestamp)}
                    ]
                },
                {
                    "type": "section",
                    "text": {"type": "mrkdwn", "text": format!("*Reason:* {}", notice.reason)}
                }
            ]
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, notice: &CancellationNotice) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.webhook_url.clone())
            .json(&self.message(notice))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status));
        }

        tracing::info!(
            job = %notice.job_name,
            build = notice.build_number,
            "Slack notification sent"
        );
        Ok(())
    }
}
