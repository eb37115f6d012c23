//! Metrics definitions for the gateway.

use shared::metrics_defs::{MetricDef, MetricType};

pub const SCAN_RUNNING_BUILDS: MetricDef = MetricDef {
    name: "scan.running_builds",
    metric_type: MetricType::Histogram,
    description: "Number of running builds found by a discovery scan",
};

pub const SCAN_JOB_SKIPPED: MetricDef = MetricDef {
    name: "scan.job_skipped",
    metric_type: MetricType::Counter,
    description: "Jobs dropped from a scan because Jenkins returned an error for them",
};

pub const SCAN_FAILED: MetricDef = MetricDef {
    name: "scan.failed",
    metric_type: MetricType::Counter,
    description: "Scans that returned nothing because the job list could not be fetched",
};

pub const CANCELLATIONS: MetricDef = MetricDef {
    name: "cancel.requests",
    metric_type: MetricType::Counter,
    description: "Cancellation requests, tagged by outcome",
};

pub const NOTIFICATION_FAILED: MetricDef = MetricDef {
    name: "notify.failed",
    metric_type: MetricType::Counter,
    description: "Cancellation notifications that could not be delivered",
};

pub const AUTH_REJECTED: MetricDef = MetricDef {
    name: "auth.rejected",
    metric_type: MetricType::Counter,
    description: "Requests rejected by the authentication middleware, tagged by reason",
};

pub const ALL_METRICS: &[MetricDef] = &[
    SCAN_RUNNING_BUILDS,
    SCAN_JOB_SKIPPED,
    SCAN_FAILED,
    CANCELLATIONS,
    NOTIFICATION_FAILED,
    AUTH_REJECTED,
];
