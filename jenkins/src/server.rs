use crate::errors::JenkinsError;
use crate::types::{BuildDetail, JobDetail, JobSummary, WhoAmI};
use async_trait::async_trait;

/// Operations the gateway needs from a CI server.
///
/// Every method is a single remote call with no retry.
#[async_trait]
pub trait CiServer: Send + Sync {
    async fn list_jobs(&self) -> Result<Vec<JobSummary>, JenkinsError>;

    async fn job_detail(&self, job_name: &str) -> Result<JobDetail, JenkinsError>;

    async fn build_detail(
        &self,
        job_name: &str,
        build_number: u64,
    ) -> Result<BuildDetail, JenkinsError>;

    async fn stop_build(&self, job_name: &str, build_number: u64) -> Result<(), JenkinsError>;

    /// Identity of the configured credentials. Used as a connectivity probe.
    async fn whoami(&self) -> Result<WhoAmI, JenkinsError>;
}
