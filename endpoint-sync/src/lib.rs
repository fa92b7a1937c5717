//! Batch synchronization of delivery events into the audience directory.

pub mod config;
pub mod errors;
pub mod message;
pub mod metrics_defs;
pub mod processor;
pub mod report;
pub mod service;

#[cfg(test)]
mod testutils;

pub use config::Config;
pub use errors::{BatchError, EndpointSyncError, RecordError};
pub use message::{Batch, IncomingMessage};
pub use processor::BatchProcessor;
pub use report::BatchReport;

use directory::DirectoryClient;
use service::IntakeService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const READINESS_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Builds a processor from validated configuration.
pub fn build_processor(config: &Config) -> Result<BatchProcessor, EndpointSyncError> {
    config.validate()?;
    let directory = DirectoryClient::from_config(&config.directory)?;
    Ok(BatchProcessor::from_config(directory, config))
}

/// Serves batch intake and the admin probes until either listener fails.
pub async fn run(config: Config) -> Result<(), EndpointSyncError> {
    let processor = Arc::new(build_processor(&config)?);

    let ready = Arc::new(AtomicBool::new(false));
    tokio::spawn(probe_readiness(processor.clone(), ready.clone()));

    let intake_service = IntakeService::new(processor, config.max_body_bytes);
    let intake_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        intake_service,
    );

    let admin_service = AdminService::new(move || ready.load(Ordering::Relaxed));
    let admin_task = run_http_service::<_, EndpointSyncError>(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(intake_task, admin_task)?;
    Ok(())
}

/// Ready while the configured application resolves in the directory.
async fn probe_readiness(processor: Arc<BatchProcessor>, ready: Arc<AtomicBool>) {
    let directory = processor.directory().clone();
    loop {
        let is_ready = match directory
            .resolve_application_id(processor.application_name())
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    application = processor.application_name(),
                    error = %e,
                    "Readiness probe failed"
                );
                false
            }
        };

        if ready.swap(is_ready, Ordering::Relaxed) != is_ready {
            tracing::info!(ready = is_ready, "Readiness changed");
        }

        tokio::time::sleep(READINESS_PROBE_INTERVAL).await;
    }
}
