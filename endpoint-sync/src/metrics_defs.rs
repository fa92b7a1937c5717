//! Metrics definitions for batch processing.

use shared::metrics_defs::{MetricDef, MetricType};

pub const BATCH_PROCESSED: MetricDef = MetricDef {
    name: "batch.processed",
    metric_type: MetricType::Counter,
    description: "Number of batches handled, tagged by result (completed or failed)",
};

pub const BATCH_DURATION: MetricDef = MetricDef {
    name: "batch.duration",
    metric_type: MetricType::Histogram,
    description: "Time to process a batch in seconds",
};

pub const BATCH_SIZE: MetricDef = MetricDef {
    name: "batch.size",
    metric_type: MetricType::Histogram,
    description: "Number of records received per batch",
};

pub const RECORD_OUTCOME: MetricDef = MetricDef {
    name: "record.outcome",
    metric_type: MetricType::Counter,
    description: "Per-record outcomes, tagged by result and error kind",
};

pub const ALL_METRICS: &[MetricDef] = &[BATCH_PROCESSED, BATCH_DURATION, BATCH_SIZE, RECORD_OUTCOME];
