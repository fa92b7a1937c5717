//! Client for the audience directory: application lookup and endpoint upserts.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod memory;
pub mod metrics_defs;
pub mod service;
pub mod types;

#[cfg(test)]
mod testutils;

pub use client::DirectoryClient;
pub use error::{ClientBuildError, DirectoryError};
pub use service::DirectoryService;
pub use types::{DeliveryEvent, EndpointRequest, EventType};
