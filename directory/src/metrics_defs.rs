//! Metrics definitions for the directory client.

use shared::metrics_defs::{MetricDef, MetricType};

pub const LIST_APPLICATIONS_DURATION: MetricDef = MetricDef {
    name: "directory.list_applications.duration",
    metric_type: MetricType::Histogram,
    description: "Time to list applications from the directory in seconds",
};

pub const UPSERT_DURATION: MetricDef = MetricDef {
    name: "directory.upsert.duration",
    metric_type: MetricType::Histogram,
    description: "Time to upsert one endpoint record in seconds, tagged by result",
};

pub const ALL_METRICS: &[MetricDef] = &[LIST_APPLICATIONS_DURATION, UPSERT_DURATION];
