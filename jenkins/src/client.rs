use crate::config::JenkinsConfig;
use crate::errors::JenkinsError;
use crate::metrics_defs::{JENKINS_REQUEST_DURATION, JENKINS_REQUEST_FAILED};
use crate::server::CiServer;
use crate::types::{BuildDetail, Crumb, JobDetail, JobList, JobSummary, WhoAmI};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{counter, histogram};
use std::time::{Duration, Instant};
use url::Url;

/// HTTP client for a Jenkins controller.
///
/// Built once at startup and shared by every request handler.
#[derive(Clone)]
pub struct JenkinsClient {
    client: reqwest::Client,
    base_url: Url,
    credentials: Option<(String, Option<String>)>,
}

impl JenkinsClient {
    pub fn new(config: &JenkinsConfig) -> Result<Self, JenkinsError> {
        if config.url.cannot_be_a_base() {
            return Err(JenkinsError::InvalidUrl(config.url.to_string()));
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            // Jenkins answers a stop request with a redirect to the build page.
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("buildstop/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let credentials = config
            .username
            .clone()
            .map(|user| (user, config.api_token.clone()));

        Ok(JenkinsClient {
            client,
            base_url: config.url.clone(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url<S: AsRef<str>>(&self, segments: &[S]) -> Result<Url, JenkinsError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| JenkinsError::InvalidUrl(self.base_url.to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.credentials {
            Some((user, token)) => builder.basic_auth(user, token.as_deref()),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, JenkinsError> {
        let path = url.path().to_string();
        let response = self.request(Method::GET, url).send().await?;
        let response = check_status(response, path)?;
        Ok(response.json::<T>().await?)
    }

    async fn crumb(&self) -> Result<Option<Crumb>, JenkinsError> {
        let url = self.url(&["crumbIssuer", "api", "json"])?;
        match self.get_json::<Crumb>(url).await {
            Ok(crumb) => Ok(Some(crumb)),
            // CSRF protection is disabled on this controller.
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn post_stop(&self, job_name: &str, build_number: u64) -> Result<(), JenkinsError> {
        let mut segments = job_segments(job_name);
        segments.extend([build_number.to_string(), "stop".to_string()]);
        let url = self.url(&segments)?;
        let path = url.path().to_string();

        let mut request = self.request(Method::POST, url);
        if let Some(crumb) = self.crumb().await? {
            request = request.header(crumb.crumb_request_field, crumb.crumb);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() || status.is_redirection() {
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            Err(JenkinsError::NotFound(path))
        } else {
            Err(JenkinsError::Status { status, path })
        }
    }
}

fn check_status(response: Response, path: String) -> Result<Response, JenkinsError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(JenkinsError::NotFound(path)),
        status => Err(JenkinsError::Status { status, path }),
    }
}

/// `folder/job` addresses a job inside a folder: `/job/folder/job/job`.
fn job_segments(job_name: &str) -> Vec<String> {
    job_name
        .split('/')
        .filter(|part| !part.is_empty())
        .flat_map(|part| ["job".to_string(), part.to_string()])
        .collect()
}

fn api_json(mut segments: Vec<String>) -> Vec<String> {
    segments.extend(["api".to_string(), "json".to_string()]);
    segments
}

fn record<T>(operation: &'static str, started: Instant, result: &Result<T, JenkinsError>) {
    histogram!(JENKINS_REQUEST_DURATION, "operation" => operation)
        .record(started.elapsed().as_secs_f64());

    if let Err(e) = result {
        counter!(JENKINS_REQUEST_FAILED, "operation" => operation).increment(1);
        tracing::debug!(operation, error = %e, "Jenkins request failed");
    }
}

#[async_trait]
impl CiServer for JenkinsClient {
    async fn list_jobs(&self) -> Result<Vec<JobSummary>, JenkinsError> {
        let started = Instant::now();
        let result = async {
            let mut url = self.url(&["api", "json"])?;
            url.query_pairs_mut()
                .append_pair("tree", "jobs[name,url,color]");
            let list: JobList = self.get_json(url).await?;
            Ok::<_, JenkinsError>(list.jobs)
        }
        .await;
        record("list_jobs", started, &result);
        result
    }

    async fn job_detail(&self, job_name: &str) -> Result<JobDetail, JenkinsError> {
        let started = Instant::now();
        let result = async {
            let url = self.url(&api_json(job_segments(job_name)))?;
            self.get_json(url).await
        }
        .await;
        record("job_detail", started, &result);
        result
    }

    async fn build_detail(
        &self,
        job_name: &str,
        build_number: u64,
    ) -> Result<BuildDetail, JenkinsError> {
        let started = Instant::now();
        let result = async {
            let mut segments = job_segments(job_name);
            segments.push(build_number.to_string());
            let url = self.url(&api_json(segments))?;
            self.get_json(url).await
        }
        .await;
        record("build_detail", started, &result);
        result
    }

    async fn stop_build(&self, job_name: &str, build_number: u64) -> Result<(), JenkinsError> {
        let started = Instant::now();
        let result = self.post_stop(job_name, build_number).await;
        record("stop_build", started, &result);
        result
    }

    async fn whoami(&self) -> Result<WhoAmI, JenkinsError> {
        let started = Instant::now();
        let result = async {
            let url = self.url(&["me", "api", "json"])?;
            self.get_json(url).await
        }
        .await;
        record("whoami", started, &result);
        result
    }
}
