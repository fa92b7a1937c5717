use crate::errors::EndpointSyncError;
use crate::message::Batch;
use crate::processor::BatchProcessor;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use shared::http::{make_boxed_error_response, make_json_response};
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;

pub const BATCH_PATH: &str = "/batch";

#[derive(Debug, Serialize)]
struct ApiErrorResponse {
    error_message: String,
}

/// Accepts batches over HTTP and answers with the batch report.
///
/// `POST /batch` with a queue event envelope responds 200 and the report,
/// 400 for an unreadable envelope, 413 for an oversized body and 503 when the
/// batch could not be processed at all.
pub struct IntakeService {
    processor: Arc<BatchProcessor>,
    max_body_bytes: usize,
}

impl IntakeService {
    pub fn new(processor: Arc<BatchProcessor>, max_body_bytes: usize) -> Self {
        IntakeService {
            processor,
            max_body_bytes,
        }
    }
}

impl Service<Request<Incoming>> for IntakeService {
    type Response = Response<BoxBody<Bytes, Self::Error>>;
    type Error = EndpointSyncError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let processor = self.processor.clone();
        let max_body_bytes = self.max_body_bytes;
        Box::pin(async move { Ok(route(&processor, max_body_bytes, req).await) })
    }
}

async fn route<B, E>(
    processor: &BatchProcessor,
    max_body_bytes: usize,
    req: Request<B>,
) -> Response<BoxBody<Bytes, E>>
where
    B: Body,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    if req.uri().path() != BATCH_PATH {
        return make_boxed_error_response(StatusCode::NOT_FOUND);
    }
    if req.method() != Method::POST {
        return make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED);
    }

    let body = match Limited::new(req.into_body(), max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            tracing::warn!(max_body_bytes, "Rejected oversized batch");
            return make_boxed_error_response(StatusCode::PAYLOAD_TOO_LARGE);
        }
        Err(e) => {
            tracing::warn!("Failed to read request body: {e}");
            return make_boxed_error_response(StatusCode::BAD_REQUEST);
        }
    };

    handle_batch(processor, &body).await
}

/// Decodes a batch envelope, processes it and renders the outcome.
pub async fn handle_batch<E>(processor: &BatchProcessor, body: &[u8]) -> Response<BoxBody<Bytes, E>> {
    let batch = match Batch::from_json(body) {
        Ok(batch) => batch,
        Err(e) => {
            tracing::warn!("Rejected batch envelope: {e}");
            return make_json_response(
                StatusCode::BAD_REQUEST,
                &ApiErrorResponse {
                    error_message: format!("invalid batch envelope: {e}"),
                },
            );
        }
    };

    match processor.process(batch).await {
        Ok(report) => make_json_response(StatusCode::OK, &report),
        Err(e) => make_json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &ApiErrorResponse {
                error_message: e.to_string(),
            },
        ),
    }
}
