//! Error handling utilities for the crate
use thiserror::Error;

use reqwest::{Error as ReqwestError, Response};

/// All errors raised by this crate are instances of ForgeError
#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Authentication failed ({status}): {detail}")]
    Authentication { status: u16, detail: String },
    #[error("Request failed ({status}): {detail}")]
    Request { status: u16, detail: String },
    #[error("Internal HTTP error: {0}")]
    Http(#[from] ReqwestError),
}

impl ForgeError {
    pub(crate) fn required(field_name: &str) -> Self {
        ForgeError::InvalidInput(format!("{} is required", field_name))
    }

    /// Consumes a non-success response from a resource endpoint, carrying
    /// the status code and the server-provided error body.
    pub(crate) async fn request(response: Response) -> Self {
        let (status, detail) = Self::status_and_detail(response).await;
        tracing::debug!(status, "request failed: {}", detail);
        ForgeError::Request { status, detail }
    }

    /// Consumes a non-success response from the token endpoint.
    pub(crate) async fn authentication(response: Response) -> Self {
        let (status, detail) = Self::status_and_detail(response).await;
        tracing::debug!(status, "token request failed: {}", detail);
        ForgeError::Authentication { status, detail }
    }

    async fn status_and_detail(response: Response) -> (u16, String) {
        let status = response.status();
        let detail = match response.text().await {
            Ok(body) if !body.is_empty() => body,
            _ => status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
        };
        (status.as_u16(), detail)
    }
}

pub type Result<T> = std::result::Result<T, ForgeError>;
