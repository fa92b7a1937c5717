use crate::errors::RecordError;
use serde::{Deserialize, Serialize};

/// Result of processing one message.
#[derive(Debug, PartialEq)]
pub struct Outcome {
    pub message_id: String,
    pub result: Result<(), RecordError>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutcomeStatus {
    Success,
    Error,
}

impl Outcome {
    pub fn status(&self) -> OutcomeStatus {
        match self.result {
            Ok(()) => OutcomeStatus::Success,
            Err(_) => OutcomeStatus::Error,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessOutcome {
    pub message_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutcome {
    pub message_id: String,
    pub error_message: String,
}

/// Per-record outcomes of one batch. Each list keeps input order and every
/// message appears in exactly one of them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub success: Vec<SuccessOutcome>,
    pub error: Vec<ErrorOutcome>,
}

impl BatchReport {
    pub fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = Outcome>,
    {
        outcomes
            .into_iter()
            .fold(BatchReport::default(), |mut report, outcome| {
                match outcome.result {
                    Ok(()) => report.success.push(SuccessOutcome {
                        message_id: outcome.message_id,
                    }),
                    Err(e) => report.error.push(ErrorOutcome {
                        message_id: outcome.message_id,
                        error_message: e.to_string(),
                    }),
                }
                report
            })
    }

    pub fn success_count(&self) -> usize {
        self.success.len()
    }

    pub fn error_count(&self) -> usize {
        self.error.len()
    }

    pub fn len(&self) -> usize {
        self.success_count() + self.error_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages the transport should not treat as consumed.
    pub fn failed_message_ids(&self) -> impl Iterator<Item = &str> {
        self.error.iter().map(|e| e.message_id.as_str())
    }
}
