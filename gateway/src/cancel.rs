//! Cancellation of running builds.

use crate::discovery::resolve_started_by;
use crate::identity::AuthenticatedUser;
use crate::metrics_defs::{CANCELLATIONS, NOTIFICATION_FAILED};
use crate::notify::{CancellationNotice, Notifier};
use chrono::{SecondsFormat, Utc};
use jenkins::{CiServer, JenkinsError};
use serde::{Deserialize, Serialize};
use shared::counter;
use std::sync::Arc;
use thiserror::Error;

/// Who may stop a build.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelPolicy {
    /// Any authenticated caller may stop any build.
    #[default]
    AnyUser,
    /// Only the user that started a build may stop it.
    OwnerOnly,
}

impl CancelPolicy {
    pub fn allows(self, caller: &str, started_by: &str) -> bool {
        match self {
            CancelPolicy::AnyUser => true,
            CancelPolicy::OwnerOnly => caller == started_by,
        }
    }
}

#[derive(Error, Debug)]
pub enum CancelError {
    #[error("Cancellation reason is required")]
    MissingReason,

    #[error("Build not found")]
    NotFound,

    #[error("Build is not currently running")]
    NotRunning,

    #[error("Build was started by {started_by}, only they can cancel it")]
    NotOwner { started_by: String },

    #[error("Jenkins connection failed")]
    Upstream(#[source] JenkinsError),

    #[error("Failed to cancel build")]
    StopFailed(#[source] JenkinsError),

    #[error("Internal server error")]
    Lookup(#[source] JenkinsError),
}

impl CancelError {
    fn outcome(&self) -> &'static str {
        match self {
            CancelError::MissingReason => "missing_reason",
            CancelError::NotFound => "not_found",
            CancelError::NotRunning => "not_running",
            CancelError::NotOwner { .. } => "not_owner",
            CancelError::Upstream(_) => "upstream",
            CancelError::StopFailed(_) => "stop_failed",
            CancelError::Lookup(_) => "lookup_failed",
        }
    }
}

fn lookup_error(e: JenkinsError) -> CancelError {
    if e.is_not_found() {
        CancelError::NotFound
    } else if e.is_unavailable() {
        CancelError::Upstream(e)
    } else {
        tracing::error!(error = %e, "Failed to look up build");
        CancelError::Lookup(e)
    }
}

fn stop_error(e: JenkinsError) -> CancelError {
    if e.is_not_found() {
        CancelError::NotFound
    } else if e.is_unavailable() {
        CancelError::Upstream(e)
    } else {
        CancelError::StopFailed(e)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CancellationResult {
    pub success: bool,
    pub message: String,
    pub job_name: String,
    pub build_number: u64,
    pub cancelled_by: String,
    pub reason: String,
    pub timestamp: String,
}

pub struct Canceller {
    ci: Arc<dyn CiServer>,
    notifier: Arc<dyn Notifier>,
    policy: CancelPolicy,
}

impl Canceller {
    pub fn new(ci: Arc<dyn CiServer>, notifier: Arc<dyn Notifier>, policy: CancelPolicy) -> Self {
        Canceller {
            ci,
            notifier,
            policy,
        }
    }

    pub fn policy(&self) -> CancelPolicy {
        self.policy
    }

    /// Stops a running build on behalf of `caller`.
    ///
    /// The reason is checked before any upstream call. The stop request is sent once and
    /// the notification that follows it cannot fail the cancellation.
    pub async fn cancel(
        &self,
        job_name: &str,
        build_number: u64,
        caller: &AuthenticatedUser,
        reason: Option<&str>,
    ) -> Result<CancellationResult, CancelError> {
        let result = self.try_cancel(job_name, build_number, caller, reason).await;
        let outcome = match &result {
            Ok(_) => "cancelled",
            Err(e) => e.outcome(),
        };
        counter!(CANCELLATIONS, "outcome" => outcome).increment(1);
        result
    }

    async fn try_cancel(
        &self,
        job_name: &str,
        build_number: u64,
        caller: &AuthenticatedUser,
        reason: Option<&str>,
    ) -> Result<CancellationResult, CancelError> {
        let username = caller.display_name();
        let reason = reason
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .ok_or(CancelError::MissingReason)?;

        let build = self
            .ci
            .build_detail(job_name, build_number)
            .await
            .map_err(lookup_error)?;
        if !build.building {
            return Err(CancelError::NotRunning);
        }

        let started_by = resolve_started_by(&build);
        tracing::info!(
            user = %username,
            started_by = %started_by,
            job = %job_name,
            build = build_number,
            "Cancellation requested"
        );
        if !self.policy.allows(&username, &started_by) {
            return Err(CancelError::NotOwner { started_by });
        }

        if let Err(e) = self.ci.stop_build(job_name, build_number).await {
            tracing::error!(job = %job_name, build = build_number, error = %e, "Failed to stop build");
            return Err(stop_error(e));
        }

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        tracing::info!(
            target: "audit",
            job = %job_name,
            build = build_number,
            cancelled_by = %username,
            started_by = %started_by,
            reason = %reason,
            "Build cancelled"
        );

        let notice = CancellationNotice {
            job_name: job_name.to_string(),
            build_number,
            cancelled_by: username.clone(),
            reason: reason.to_string(),
            timestamp: timestamp.clone(),
        };
        if let Err(e) = self.notifier.notify(&notice).await {
            counter!(NOTIFICATION_FAILED).increment(1);
            tracing::error!(job = %job_name, build = build_number, error = %e, "Failed to send notification");
        }

        Ok(CancellationResult {
            success: true,
            message: format!("Build {job_name}#{build_number} has been cancelled"),
            job_name: job_name.to_string(),
            build_number,
            cancelled_by: username,
            reason: reason.to_string(),
            timestamp,
        })
    }
}
