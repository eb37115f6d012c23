//! Payloads returned by the Jenkins JSON API.
//!
//! Jenkins returns loosely typed documents tagged with a `_class` field. Only the parts
//! needed to find running builds and their initiator are modelled; everything else is ignored.

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;

/// Jenkins marks jobs with a build in progress by appending this to the ball color.
pub const RUNNING_COLOR_SUFFIX: &str = "_anime";

/// An entry of `GET /api/json?tree=jobs[name,url,color]`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct JobSummary {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct JobList {
    #[serde(default)]
    pub jobs: Vec<JobSummary>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobDetail {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub last_build: Option<BuildRef>,
}

impl JobDetail {
    /// Whether the status indicator claims a build is executing. Needs to be confirmed
    /// against the build detail since the color can be stale.
    pub fn is_running_candidate(&self) -> bool {
        self.color
            .as_deref()
            .is_some_and(|color| color.ends_with(RUNNING_COLOR_SUFFIX))
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BuildRef {
    pub number: u64,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildDetail {
    #[serde(default)]
    pub building: bool,
    /// Start time in epoch milliseconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub estimated_duration: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub built_on: Option<String>,
    #[serde(default)]
    pub full_display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub actions: Vec<Action>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "_class")]
pub enum Action {
    #[serde(rename = "hudson.model.CauseAction")]
    Causes {
        #[serde(default, deserialize_with = "lenient_list")]
        causes: Vec<Cause>,
    },
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "_class")]
pub enum Cause {
    #[serde(rename = "hudson.model.Cause$UserIdCause")]
    UserId {
        #[serde(rename = "userId", default)]
        user_id: Option<String>,
    },
    #[serde(rename = "hudson.model.Cause$UserCause")]
    User {
        #[serde(rename = "userName", default)]
        user_name: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// `GET /me/api/json`
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WhoAmI {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Crumb {
    pub crumb: String,
    pub crumb_request_field: String,
}

// Jenkins emits `{}` and `null` placeholders in action lists. Those cannot be matched
// against the `_class` tag, so they are dropped instead of failing the whole payload.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let values = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect())
}
