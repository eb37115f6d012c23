//! Metrics definitions for the Jenkins client.

use shared::metrics_defs::{MetricDef, MetricType};

pub const JENKINS_REQUEST_DURATION: MetricDef = MetricDef {
    name: "jenkins.request.duration",
    metric_type: MetricType::Histogram,
    description: "Time taken by a Jenkins API call in seconds, tagged by operation",
};

pub const JENKINS_REQUEST_FAILED: MetricDef = MetricDef {
    name: "jenkins.request.failed",
    metric_type: MetricType::Counter,
    description: "Number of Jenkins API calls that returned an error, tagged by operation",
};

pub const ALL_METRICS: &[MetricDef] = &[JENKINS_REQUEST_DURATION, JENKINS_REQUEST_FAILED];
