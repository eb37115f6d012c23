//! HTTP gateway for listing and cancelling running Jenkins builds.

pub mod api;
pub mod auth;
pub mod cancel;
pub mod config;
pub mod discovery;
pub mod identity;
pub mod metrics_defs;
pub mod notify;

#[cfg(test)]
mod testutils;

use crate::api::AppState;
use crate::auth::{AuthError, Authenticator};
use crate::cancel::Canceller;
use crate::config::Config;
use crate::notify::{NoopNotifier, Notifier, NotifyError, SlackNotifier};
use jenkins::{CiServer, JenkinsClient, JenkinsError};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ValidationError),
    #[error("could not create jenkins client: {0}")]
    Jenkins(#[from] JenkinsError),
    #[error("could not set up authentication: {0}")]
    Auth(#[from] AuthError),
    #[error("could not create slack notifier: {0}")]
    Notifier(#[from] NotifyError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn serve(config: Config) -> Result<(), GatewayError> {
    config.validate()?;

    let client = JenkinsClient::new(&config.jenkins)?;
    match client.whoami().await {
        Ok(me) => tracing::info!(url = %client.base_url(), user = %me.id, "Connected to Jenkins"),
        Err(e) => tracing::warn!(url = %client.base_url(), error = %e, "Jenkins is not reachable yet"),
    }
    let ci: Arc<dyn CiServer> = Arc::new(client);

    let notifier: Arc<dyn Notifier> = match &config.slack {
        Some(slack) => Arc::new(SlackNotifier::new(slack)?),
        None => Arc::new(NoopNotifier),
    };
    let canceller = Arc::new(Canceller::new(ci.clone(), notifier, config.cancel_policy));
    let authenticator = Authenticator::from_config(&config.auth)?;

    let app = api::router(
        AppState { ci, canceller },
        authenticator,
        config.static_dir.as_deref(),
    );

    let addr = format!("{}:{}", config.listener.host, config.listener.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        address = %addr,
        cancel_policy = ?config.cancel_policy,
        "Gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shared::shutdown::shutdown_signal())
        .await?;
    tracing::info!("Gateway stopped");
    Ok(())
}
