//! Upstream music API client.

mod auth;
mod client;
mod error;
mod models;
mod retry_policy;
mod transport;

pub use auth::AccessTokenClient;
pub use client::SpotifyClient;
pub use error::{ExtractError, TransportError};
pub use models::{RawRecord, RecordShape};
pub use retry_policy::RetryPolicy;
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};

use crate::resource::Resource;

/// Source of raw records for one resource, fully materialized.
pub trait Extractor {
    fn extract(&self, resource: Resource) -> Result<Vec<RawRecord>, ExtractError>;
}
