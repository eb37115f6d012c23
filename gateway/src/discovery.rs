//! Discovery of the builds currently executing on the CI server.

use crate::metrics_defs::{SCAN_FAILED, SCAN_JOB_SKIPPED, SCAN_RUNNING_BUILDS};
use jenkins::cause::initiator;
use jenkins::types::{BuildDetail, JobSummary};
use jenkins::{CiServer, JenkinsError};
use serde::Serialize;
use shared::{counter, histogram};

/// Reported as the initiator when no user cause identifies one.
pub const DEFAULT_STARTED_BY: &str = "admin";
/// Reported as the node of builds that ran on the controller itself.
pub const DEFAULT_NODE: &str = "built-in";
pub const UNKNOWN_DURATION: i64 = -1;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunningBuild {
    pub job_name: String,
    pub build_number: u64,
    pub started_by: String,
    /// Epoch milliseconds.
    pub start_time: i64,
    pub url: String,
    pub estimated_duration: i64,
    pub description: String,
    pub node: String,
    pub display_name: String,
}

impl RunningBuild {
    fn new(job: &JobSummary, build_number: u64, detail: BuildDetail) -> Self {
        let started_by = resolve_started_by(&detail);
        RunningBuild {
            display_name: detail
                .full_display_name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| format!("{} #{}", job.name, build_number)),
            job_name: job.name.clone(),
            build_number,
            started_by,
            start_time: detail.timestamp.unwrap_or_default(),
            url: detail.url.unwrap_or_default(),
            estimated_duration: detail.estimated_duration.unwrap_or(UNKNOWN_DURATION),
            description: detail.description.unwrap_or_default(),
            node: detail
                .built_on
                .filter(|node| !node.is_empty())
                .unwrap_or_else(|| DEFAULT_NODE.to_string()),
        }
    }
}

/// The user that started the build, or [`DEFAULT_STARTED_BY`].
pub fn resolve_started_by(detail: &BuildDetail) -> String {
    initiator(&detail.actions)
        .unwrap_or(DEFAULT_STARTED_BY)
        .to_string()
}

/// Lists every job whose last build is executing.
///
/// Never fails. An unreachable job list yields an empty result and a job whose detail
/// cannot be fetched is left out. Results follow the order of the upstream job list.
pub async fn scan_running_builds(ci: &dyn CiServer) -> Vec<RunningBuild> {
    let jobs = match ci.list_jobs().await {
        Ok(jobs) => jobs,
        Err(e) => {
            counter!(SCAN_FAILED).increment(1);
            tracing::error!(error = %e, "Failed to list jobs");
            return Vec::new();
        }
    };

    let mut builds = Vec::new();
    for job in &jobs {
        match inspect_job(ci, job).await {
            Ok(Some(build)) => builds.push(build),
            Ok(None) => {}
            Err(e) => {
                counter!(SCAN_JOB_SKIPPED).increment(1);
                tracing::warn!(job = %job.name, error = %e, "Skipping job");
            }
        }
    }

    histogram!(SCAN_RUNNING_BUILDS).record(builds.len() as f64);
    tracing::debug!(jobs = jobs.len(), running = builds.len(), "Scan complete");
    builds
}

async fn inspect_job(
    ci: &dyn CiServer,
    job: &JobSummary,
) -> Result<Option<RunningBuild>, JenkinsError> {
    let detail = ci.job_detail(&job.name).await?;
    if !detail.is_running_candidate() {
        return Ok(None);
    }
    let Some(last_build) = detail.last_build else {
        return Ok(None);
    };

    let build = ci.build_detail(&job.name, last_build.number).await?;
    if !build.building {
        tracing::debug!(
            job = %job.name,
            build = last_build.number,
            "Status indicator is stale, last build already finished"
        );
        return Ok(None);
    }

    Ok(Some(RunningBuild::new(job, last_build.number, build)))
}
