use crate::config::Config;
use crate::errors::{BatchError, RecordError};
use crate::message::{Batch, IncomingMessage, parse_event};
use crate::metrics_defs::{BATCH_DURATION, BATCH_PROCESSED, BATCH_SIZE, RECORD_OUTCOME};
use crate::report::{BatchReport, Outcome};
use directory::{DeliveryEvent, DirectoryClient};
use shared::{counter, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::sleep;

pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

type RecordResult = Result<(), RecordError>;

/// Synchronizes batches of delivery events into the directory.
///
/// Every batch resolves the application id once, then processes each record
/// independently. Records with the same endpoint key share a lane and are
/// written one after another in input order; distinct lanes run concurrently,
/// at most `max_concurrency` at a time.
pub struct BatchProcessor {
    directory: DirectoryClient,
    application_name: String,
    max_concurrency: usize,
    batch_timeout: Option<Duration>,
}

impl BatchProcessor {
    pub fn new(directory: DirectoryClient, application_name: impl Into<String>) -> Self {
        BatchProcessor {
            directory,
            application_name: application_name.into(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            batch_timeout: None,
        }
    }

    pub fn from_config(directory: DirectoryClient, config: &Config) -> Self {
        BatchProcessor::new(directory, config.application_name.clone())
            .with_max_concurrency(config.max_concurrency)
            .with_batch_timeout(config.batch_timeout_secs.map(Duration::from_secs))
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_batch_timeout(mut self, batch_timeout: Option<Duration>) -> Self {
        self.batch_timeout = batch_timeout;
        self
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn directory(&self) -> &DirectoryClient {
        &self.directory
    }

    /// Processes one batch.
    ///
    /// Fails only when the application id cannot be resolved, in which case no
    /// record has been touched. Otherwise returns a report with exactly one
    /// outcome per input message.
    pub async fn process(&self, batch: Batch) -> Result<BatchReport, BatchError> {
        let started = Instant::now();
        let batch_size = batch.len();
        histogram!(BATCH_SIZE).record(batch_size as f64);

        let application_id = match self
            .directory
            .resolve_application_id(&self.application_name)
            .await
        {
            Ok(id) => id,
            Err(source) => {
                counter!(BATCH_PROCESSED, "result" => "failed").increment(1);
                tracing::error!(
                    application = %self.application_name,
                    batch_size,
                    error = %source,
                    "Could not resolve application, rejecting batch"
                );
                return Err(BatchError::ApplicationResolution {
                    name: self.application_name.clone(),
                    source,
                });
            }
        };

        let results = self
            .process_records(Arc::from(application_id), &batch.records)
            .await;

        let outcomes = batch
            .records
            .into_iter()
            .zip(results)
            .map(|(message, result)| {
                match &result {
                    Ok(()) => {
                        counter!(RECORD_OUTCOME, "result" => "success", "kind" => "none")
                            .increment(1);
                    }
                    Err(e) => {
                        counter!(RECORD_OUTCOME, "result" => "error", "kind" => e.kind())
                            .increment(1);
                        tracing::warn!(
                            message_id = %message.message_id,
                            kind = e.kind(),
                            error = %e,
                            "Record failed"
                        );
                    }
                }
                Outcome {
                    message_id: message.message_id,
                    result,
                }
            });

        let report = BatchReport::from_outcomes(outcomes);

        counter!(BATCH_PROCESSED, "result" => "completed").increment(1);
        histogram!(BATCH_DURATION).record(started.elapsed().as_secs_f64());
        tracing::info!(
            batch_size,
            succeeded = report.success_count(),
            failed = report.error_count(),
            "Batch processed"
        );

        Ok(report)
    }

    /// Returns one result per record, indexed like `records`.
    async fn process_records(
        &self,
        application_id: Arc<str>,
        records: &[IncomingMessage],
    ) -> Vec<RecordResult> {
        let mut slots: Vec<Option<RecordResult>> = records.iter().map(|_| None).collect();

        // Parse and validate everything up front; only valid records reach the directory.
        let mut lanes: Vec<Vec<(usize, DeliveryEvent)>> = Vec::new();
        let mut lane_by_key: HashMap<String, usize> = HashMap::new();
        for (index, message) in records.iter().enumerate() {
            match parse_event(&message.body) {
                Ok(event) => {
                    let lane = *lane_by_key.entry(event.endpoint_key()).or_insert_with(|| {
                        lanes.push(Vec::new());
                        lanes.len() - 1
                    });
                    lanes[lane].push((index, event));
                }
                Err(e) => slots[index] = Some(Err(e)),
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, RecordResult)>();
        let mut tasks = JoinSet::new();

        for lane in lanes {
            let directory = self.directory.clone();
            let application_id = application_id.clone();
            let semaphore = semaphore.clone();
            let tx = tx.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };

                for (index, event) in lane {
                    let endpoint_key = event.endpoint_key();
                    let result = directory
                        .upsert_endpoint(&application_id, &endpoint_key, &event)
                        .await
                        .map_err(RecordError::from);

                    if tx.send((index, result)).is_err() {
                        return;
                    }
                }
            });
        }
        drop(tx);

        let deadline = sleep(self.batch_timeout.unwrap_or_default());
        tokio::pin!(deadline);
        let mut deadline_exceeded = false;

        loop {
            tokio::select! {
                _ = &mut deadline, if self.batch_timeout.is_some() => {
                    deadline_exceeded = true;
                    break;
                }
                received = rx.recv() => match received {
                    Some((index, result)) => slots[index] = Some(result),
                    // Every lane has finished or died
                    None => break,
                }
            }
        }

        if deadline_exceeded {
            tracing::warn!(
                pending = tasks.len(),
                "Batch deadline exceeded, aborting outstanding records"
            );
        }

        tasks.abort_all();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined
                && e.is_panic()
            {
                tracing::error!("Record task panicked: {e}");
            }
        }

        // Results that arrived between the deadline and the abort still count.
        while let Ok((index, result)) = rx.try_recv() {
            slots[index] = Some(result);
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or(Err(if deadline_exceeded {
                    RecordError::DeadlineExceeded
                } else {
                    RecordError::TaskFailed
                }))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::event_body;
    use crate::report::{ErrorOutcome, SuccessOutcome};
    use crate::testutils::FakeDirectory;
    use directory::DirectoryError;
    use directory::types::OptOut;
    use serde_json::json;

    fn message(id: &str, body: String) -> IncomingMessage {
        IncomingMessage::new(id, body)
    }

    fn processor(client: DirectoryClient) -> BatchProcessor {
        BatchProcessor::new(client, "fdr")
    }

    fn success(ids: &[&str]) -> Vec<SuccessOutcome> {
        ids.iter()
            .map(|id| SuccessOutcome {
                message_id: id.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn two_valid_records() {
        let (fake, client) = FakeDirectory::with_application("fdr", "app-1").into_client();

        let report = processor(client)
            .process(Batch::new(vec![
                message("1", event_body("r1", "v1", "created")),
                message("2", event_body("r2", "v1", "created")),
            ]))
            .await
            .unwrap();

        assert_eq!(report.success, success(&["1", "2"]));
        assert!(report.error.is_empty());

        let upserts = fake.upserts();
        assert_eq!(upserts.len(), 2);
        assert!(upserts.iter().all(|u| u.application_id == "app-1"));
        let mut ids = fake.upserted_endpoint_ids();
        ids.sort();
        assert_eq!(ids, vec!["r1-v1", "r2-v1"]);
        assert_eq!(fake.list_calls(), 1);
    }

    #[tokio::test]
    async fn missing_email_is_reported_without_directory_call() {
        let (fake, client) = FakeDirectory::with_application("fdr", "app-1").into_client();

        let mut invalid: serde_json::Value =
            serde_json::from_str(&event_body("r2", "v1", "created")).unwrap();
        invalid.as_object_mut().unwrap().remove("recipientEmail");

        let report = processor(client)
            .process(Batch::new(vec![
                message("1", event_body("r1", "v1", "created")),
                message("2", invalid.to_string()),
            ]))
            .await
            .unwrap();

        assert_eq!(report.success, success(&["1"]));
        assert_eq!(
            report.error,
            vec![ErrorOutcome {
                message_id: "2".into(),
                error_message: "invalid message: missing required field `recipientEmail`".into(),
            }]
        );
        assert_eq!(fake.upserted_endpoint_ids(), vec!["r1-v1"]);
    }

    #[tokio::test]
    async fn unparseable_body_makes_no_directory_call() {
        let (fake, client) = FakeDirectory::with_application("fdr", "app-1").into_client();

        let report = processor(client)
            .process(Batch::new(vec![message("m-1", "Invalid JSON".into())]))
            .await
            .unwrap();

        assert!(report.success.is_empty());
        assert_eq!(report.error.len(), 1);
        assert_eq!(report.error[0].message_id, "m-1");
        assert!(
            report.error[0]
                .error_message
                .starts_with("failed to parse message body:")
        );
        assert!(fake.upserts().is_empty());
    }

    #[tokio::test]
    async fn unresolvable_application_aborts_batch() {
        let (fake, client) = FakeDirectory::with_application("other", "app-9").into_client();

        let result = processor(client)
            .process(Batch::new(vec![message("1", event_body("r1", "v1", "created"))]))
            .await;

        match result {
            Err(BatchError::ApplicationResolution { name, source }) => {
                assert_eq!(name, "fdr");
                assert!(matches!(source, DirectoryError::NotFound(_)));
            }
            other => panic!("expected batch error, got {other:?}"),
        }
        assert!(fake.upserts().is_empty());
    }

    #[tokio::test]
    async fn unavailable_directory_aborts_batch() {
        let (fake, client) = FakeDirectory::with_applications(Err(
            DirectoryError::RemoteUnavailable("connection refused".into()),
        ))
        .into_client();

        let result = processor(client)
            .process(Batch::new(vec![message("1", event_body("r1", "v1", "created"))]))
            .await;

        assert!(matches!(
            result,
            Err(BatchError::ApplicationResolution {
                source: DirectoryError::RemoteUnavailable(_),
                ..
            })
        ));
        assert!(fake.upserts().is_empty());
    }

    #[tokio::test]
    async fn upsert_failure_does_not_stop_other_records() {
        let (fake, client) = FakeDirectory::with_application("fdr", "app-1")
            .failing(
                "r2-v1",
                DirectoryError::RemoteRejected("Address is invalid".into()),
            )
            .failing("r3-v1", DirectoryError::RemoteUnavailable("throttled".into()))
            .into_client();

        let report = processor(client)
            .process(Batch::new(vec![
                message("1", event_body("r1", "v1", "created")),
                message("2", event_body("r2", "v1", "created")),
                message("3", event_body("r3", "v1", "updated")),
                message("4", event_body("r4", "v1", "deleted")),
            ]))
            .await
            .unwrap();

        assert_eq!(report.success, success(&["1", "4"]));
        assert_eq!(
            report.error,
            vec![
                ErrorOutcome {
                    message_id: "2".into(),
                    error_message: "directory rejected request: Address is invalid".into(),
                },
                ErrorOutcome {
                    message_id: "3".into(),
                    error_message: "directory unavailable: throttled".into(),
                },
            ]
        );
        assert_eq!(fake.upserts().len(), 4);
    }

    #[tokio::test]
    async fn report_follows_input_order_not_completion_order() {
        let (_fake, client) = FakeDirectory::with_application("fdr", "app-1")
            .delayed("r1-v1", Duration::from_millis(150))
            .delayed("r2-v1", Duration::from_millis(75))
            .into_client();

        let report = processor(client)
            .with_max_concurrency(4)
            .process(Batch::new(vec![
                message("1", event_body("r1", "v1", "created")),
                message("2", event_body("r2", "v1", "created")),
                message("3", event_body("r3", "v1", "created")),
            ]))
            .await
            .unwrap();

        assert_eq!(report.success, success(&["1", "2", "3"]));
    }

    #[tokio::test]
    async fn same_endpoint_key_is_written_in_input_order() {
        let (fake, client) = FakeDirectory::with_application("fdr", "app-1")
            .delayed("r1-v1", Duration::from_millis(20))
            .into_client();

        let report = processor(client)
            .with_max_concurrency(8)
            .process(Batch::new(vec![
                message("1", event_body("r1", "v1", "created")),
                message("2", event_body("r2", "v1", "created")),
                message("3", event_body("r1", "v1", "deleted")),
                message("4", event_body("r1", "v1", "updated")),
            ]))
            .await
            .unwrap();

        assert_eq!(report.len(), 4);
        let opt_outs: Vec<OptOut> = fake
            .upserts()
            .into_iter()
            .filter(|u| u.endpoint_id == "r1-v1")
            .map(|u| u.request.opt_out)
            .collect();
        assert_eq!(opt_outs, vec![OptOut::None, OptOut::All, OptOut::None]);
    }

    #[tokio::test]
    async fn deleted_event_opts_out() {
        let (fake, client) = FakeDirectory::with_application("fdr", "app-1").into_client();
        let processor = processor(client);

        processor
            .process(Batch::new(vec![message("1", event_body("r1", "v1", "deleted"))]))
            .await
            .unwrap();
        processor
            .process(Batch::new(vec![message("2", event_body("r1", "v1", "updated"))]))
            .await
            .unwrap();

        let upserts = fake.upserts();
        assert_eq!(upserts[0].endpoint_id, upserts[1].endpoint_id);
        assert_eq!(upserts[0].request.opt_out, OptOut::All);
        assert_eq!(upserts[1].request.opt_out, OptOut::None);
        assert_eq!(fake.list_calls(), 2);
    }

    #[tokio::test]
    async fn deadline_fails_pending_records_only() {
        let (_fake, client) = FakeDirectory::with_application("fdr", "app-1")
            .delayed("r2-v1", Duration::from_secs(30))
            .into_client();

        let report = processor(client)
            .with_batch_timeout(Some(Duration::from_millis(200)))
            .process(Batch::new(vec![
                message("1", event_body("r1", "v1", "created")),
                message("2", event_body("r2", "v1", "created")),
                message("3", "nope".into()),
            ]))
            .await
            .unwrap();

        assert_eq!(report.success, success(&["1"]));
        assert_eq!(report.error.len(), 2);
        assert_eq!(report.error[0].message_id, "2");
        assert_eq!(
            report.error[0].error_message,
            RecordError::DeadlineExceeded.to_string()
        );
        assert_eq!(report.error[1].message_id, "3");
    }

    #[tokio::test]
    async fn panicking_record_is_isolated() {
        let (_fake, client) = FakeDirectory::with_application("fdr", "app-1")
            .panicking("r2-v1")
            .into_client();

        let report = processor(client)
            .process(Batch::new(vec![
                message("1", event_body("r1", "v1", "created")),
                message("2", event_body("r2", "v1", "created")),
                message("3", event_body("r3", "v1", "created")),
            ]))
            .await
            .unwrap();

        assert_eq!(report.success, success(&["1", "3"]));
        assert_eq!(
            report.error,
            vec![ErrorOutcome {
                message_id: "2".into(),
                error_message: RecordError::TaskFailed.to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn every_record_reported_exactly_once() {
        let (_fake, client) = FakeDirectory::with_application("fdr", "app-1")
            .failing("r5-v1", DirectoryError::RemoteRejected("bad".into()))
            .into_client();
        let processor = processor(client).with_max_concurrency(3);

        let mut records = Vec::new();
        for i in 0..40 {
            let body = match i % 4 {
                0 => "{".to_string(),
                1 => json!({"recipientId": format!("r{i}"), "type": "created"}).to_string(),
                _ => event_body(&format!("r{}", i % 7), "v1", "updated"),
            };
            records.push(message(&i.to_string(), body));
        }

        let report = processor.process(Batch::new(records)).await.unwrap();

        assert_eq!(report.len(), 40);
        let mut seen: Vec<usize> = report
            .success
            .iter()
            .map(|s| s.message_id.parse().unwrap())
            .chain(report.error.iter().map(|e| e.message_id.parse().unwrap()))
            .collect();
        seen.sort();
        assert_eq!(seen, (0..40).collect::<Vec<_>>());

        let success_ids: Vec<usize> =
            report.success.iter().map(|s| s.message_id.parse().unwrap()).collect();
        assert!(success_ids.windows(2).all(|w| w[0] < w[1]));
        let error_ids: Vec<usize> =
            report.error.iter().map(|e| e.message_id.parse().unwrap()).collect();
        assert!(error_ids.windows(2).all(|w| w[0] < w[1]));
    }

    fn distinct_key_batch(size: usize) -> Batch {
        Batch::new(
            (0..size)
                .map(|i| message(&i.to_string(), event_body(&format!("r{i}"), "v1", "created")))
                .collect(),
        )
    }

    fn slow_directory(size: usize) -> FakeDirectory {
        (0..size).fold(FakeDirectory::with_application("fdr", "app-1"), |fake, i| {
            fake.delayed(&format!("r{i}-v1"), Duration::from_millis(20))
        })
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        for max_concurrency in [2, 3, 5] {
            let (fake, client) = slow_directory(12).into_client();

            let report = processor(client)
                .with_max_concurrency(max_concurrency)
                .process(distinct_key_batch(12))
                .await
                .unwrap();

            assert_eq!(report.success_count(), 12);
            assert!(
                fake.peak_in_flight() <= max_concurrency,
                "peak {} above limit {max_concurrency}",
                fake.peak_in_flight()
            );
            assert!(fake.peak_in_flight() > 1);
        }
    }

    #[tokio::test]
    async fn single_concurrency_is_sequential() {
        for max_concurrency in [0, 1] {
            let (fake, client) = slow_directory(4).into_client();

            let report = processor(client)
                .with_max_concurrency(max_concurrency)
                .process(distinct_key_batch(4))
                .await
                .unwrap();

            assert_eq!(report.success, success(&["0", "1", "2", "3"]));
            assert_eq!(fake.upserts().len(), 4);
            assert_eq!(fake.peak_in_flight(), 1);
        }
    }

    #[tokio::test]
    async fn array_body_is_not_an_event() {
        let (fake, client) = FakeDirectory::with_application("fdr", "app-1").into_client();

        let report = processor(client)
            .process(Batch::new(vec![message(
                "1",
                r#"["r1", "v1", "r1@example.com", null, null, null, "deleted"]"#.into(),
            )]))
            .await
            .unwrap();

        assert!(report.success.is_empty());
        assert_eq!(report.error.len(), 1);
        assert!(
            report.error[0]
                .error_message
                .starts_with("failed to parse message body:")
        );
        assert!(fake.upserts().is_empty());
    }

    #[tokio::test]
    async fn empty_batch() {
        let (fake, client) = FakeDirectory::with_application("fdr", "app-1").into_client();

        let report = processor(client).process(Batch::default()).await.unwrap();
        assert!(report.is_empty());
        assert_eq!(fake.list_calls(), 1);
    }
}
