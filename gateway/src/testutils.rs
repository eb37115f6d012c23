use crate::notify::{CancellationNotice, Notifier, NotifyError};
use async_trait::async_trait;
use jenkins::types::{Action, BuildDetail, BuildRef, Cause, JobDetail, JobSummary, WhoAmI};
use jenkins::{CiServer, JenkinsError};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    ListJobs,
    JobDetail(String),
    BuildDetail(String, u64),
    StopBuild(String, u64),
    WhoAmI,
}

/// In-memory CI server that records every call made against it.
#[derive(Default)]
pub struct FakeCiServer {
    pub jobs: Vec<JobSummary>,
    pub details: HashMap<String, JobDetail>,
    pub builds: HashMap<(String, u64), BuildDetail>,
    pub list_fails: bool,
    /// Error status returned by every build detail lookup.
    pub build_status: Option<reqwest::StatusCode>,
    pub stop_fails: bool,
    pub offline: bool,
    calls: Mutex<Vec<Call>>,
}

impl FakeCiServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a job with the given color. A last build is attached when `build` is set.
    pub fn with_job(mut self, name: &str, color: &str, build: Option<(u64, BuildDetail)>) -> Self {
        self.jobs.push(JobSummary {
            name: name.into(),
            url: format!("http://jenkins:8080/job/{name}/"),
            color: Some(color.into()),
        });
        let last_build = build.as_ref().map(|(number, _)| BuildRef {
            number: *number,
            url: None,
        });
        self.details.insert(
            name.into(),
            JobDetail {
                name: name.into(),
                color: Some(color.into()),
                last_build,
            },
        );
        if let Some((number, detail)) = build {
            self.builds.insert((name.into(), number), detail);
        }
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn stop_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::StopBuild(..)))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_online(&self) -> Result<(), JenkinsError> {
        if self.offline {
            return Err(JenkinsError::Status {
                status: reqwest::StatusCode::BAD_GATEWAY,
                path: "/".into(),
            });
        }
        Ok(())
    }
}

pub fn running_build(actions: Vec<Action>) -> BuildDetail {
    BuildDetail {
        building: true,
        timestamp: Some(1_718_000_000_000),
        actions,
        ..Default::default()
    }
}

pub fn started_by(user: &str) -> Vec<Action> {
    vec![Action::Causes {
        causes: vec![Cause::UserId {
            user_id: Some(user.into()),
        }],
    }]
}

#[async_trait]
impl CiServer for FakeCiServer {
    async fn list_jobs(&self) -> Result<Vec<JobSummary>, JenkinsError> {
        self.record(Call::ListJobs);
        self.check_online()?;
        if self.list_fails {
            return Err(JenkinsError::Status {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                path: "/api/json".into(),
            });
        }
        Ok(self.jobs.clone())
    }

    async fn job_detail(&self, job_name: &str) -> Result<JobDetail, JenkinsError> {
        self.record(Call::JobDetail(job_name.into()));
        self.check_online()?;
        self.details
            .get(job_name)
            .cloned()
            .ok_or_else(|| JenkinsError::NotFound(format!("/job/{job_name}")))
    }

    async fn build_detail(
        &self,
        job_name: &str,
        build_number: u64,
    ) -> Result<BuildDetail, JenkinsError> {
        self.record(Call::BuildDetail(job_name.into(), build_number));
        self.check_online()?;
        if let Some(status) = self.build_status {
            return Err(JenkinsError::Status {
                status,
                path: format!("/job/{job_name}/{build_number}/api/json"),
            });
        }
        self.builds
            .get(&(job_name.to_string(), build_number))
            .cloned()
            .ok_or_else(|| JenkinsError::NotFound(format!("/job/{job_name}/{build_number}")))
    }

    async fn stop_build(&self, job_name: &str, build_number: u64) -> Result<(), JenkinsError> {
        self.record(Call::StopBuild(job_name.into(), build_number));
        self.check_online()?;
        if self.stop_fails {
            return Err(JenkinsError::Status {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                path: format!("/job/{job_name}/{build_number}/stop"),
            });
        }
        Ok(())
    }

    async fn whoami(&self) -> Result<WhoAmI, JenkinsError> {
        self.record(Call::WhoAmI);
        self.check_online()?;
        Ok(WhoAmI {
            id: "ci-bot".into(),
            full_name: None,
        })
    }
}

/// Notifier that keeps every notice it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    pub fail: bool,
    sent: Mutex<Vec<CancellationNotice>>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        RecordingNotifier {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<CancellationNotice> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notice: &CancellationNotice) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notice.clone());
        if self.fail {
            return Err(NotifyError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
        }
        Ok(())
    }
}
