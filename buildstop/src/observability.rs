use crate::config::{CommonConfig, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use shared::metrics_defs::describe_all;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(thiserror::Error, Debug)]
pub enum ObservabilityError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
    #[error("invalid sentry dsn: {0}")]
    SentryDsn(#[from] sentry::types::ParseDsnError),
    #[error("could not install log subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
    #[error("could not create statsd exporter: {0}")]
    Statsd(#[from] metrics_exporter_statsd::StatsdError),
    #[error("a metrics recorder is already installed")]
    RecorderInstalled,
}

/// Keeps the Sentry client alive. Pending events are flushed on drop.
pub struct Guard {
    _sentry: Option<sentry::ClientInitGuard>,
}

pub fn init(config: &CommonConfig) -> Result<Guard, ObservabilityError> {
    let default_logging = LoggingConfig::default();
    let logging = config.logging.as_ref().unwrap_or(&default_logging);

    let sentry = match &logging.sentry_dsn {
        Some(dsn) => Some(sentry::init(sentry::ClientOptions {
            dsn: Some(dsn.parse()?),
            release: sentry::release_name!(),
            ..Default::default()
        })),
        None => None,
    };

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.filter)?,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .try_init()?;

    if let Some(metrics) = &config.metrics {
        install_statsd(metrics)?;
    }

    Ok(Guard { _sentry: sentry })
}

fn install_statsd(config: &MetricsConfig) -> Result<(), ObservabilityError> {
    let recorder =
        StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port).build(Some(&config.prefix))?;
    metrics::set_global_recorder(recorder).map_err(|_| ObservabilityError::RecorderInstalled)?;

    describe_all(jenkins::metrics_defs::ALL_METRICS);
    describe_all(gateway::metrics_defs::ALL_METRICS);
    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "Reporting metrics to statsd"
    );
    Ok(())
}
