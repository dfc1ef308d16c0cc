//! HTTP boundary of the API client.
//!
//! The client only talks to the network through [`HttpTransport`], which keeps
//! retry and pagination logic testable against canned responses.

use super::error::TransportError;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// Parsed `Retry-After` header, in seconds.
    pub retry_after_secs: Option<u64>,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            retry_after_secs: None,
        }
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after_secs: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str, bearer_token: &str) -> Result<HttpResponse, TransportError>;

    fn post_form(
        &self,
        url: &str,
        basic_credentials: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError>;
}

/// Blocking reqwest implementation used by the binary.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(concat!("playlist-etl/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn into_response(
        response: reqwest::blocking::Response,
    ) -> Result<HttpResponse, TransportError> {
        let status = response.status().as_u16();
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response
            .text()
            .map_err(|e| TransportError(format!("failed to read response body: {}", e)))?;
        Ok(HttpResponse {
            status,
            body,
            retry_after_secs,
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, bearer_token: &str) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(bearer_token)
            .send()
            .map_err(|e| TransportError(e.to_string()))?;
        Self::into_response(response)
    }

    fn post_form(
        &self,
        url: &str,
        basic_credentials: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Basic {}", basic_credentials))
            .form(form)
            .send()
            .map_err(|e| TransportError(e.to_string()))?;
        Self::into_response(response)
    }
}
