//! Gateway error types

use thiserror::Error;

/// Errors raised while talking to the virtualization control plane
#[derive(Error, Debug)]
pub enum ApiError {
    /// The control plane answered with a non-2xx status
    #[error("[API error {status}] @ {endpoint} - {body}")]
    Status {
        status: u16,
        endpoint: String,
        body: String,
    },

    /// A 2xx answer that is not the one the operation contracts for
    /// (e.g. 200 where a creation must return 201)
    #[error("unexpected status {status} from {endpoint}")]
    UnexpectedStatus { status: u16, endpoint: String },

    #[error("invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    /// A disk size that does not fit the API's byte count
    #[error("disk size {size_gb}GB is out of range")]
    SizeOutOfRange { size_gb: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ApiError {
    /// HTTP status carried by the error, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } | ApiError::UnexpectedStatus { status, .. } => {
                Some(*status)
            }
            ApiError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub(crate) fn invalid_response(endpoint: &str, reason: impl Into<String>) -> Self {
        ApiError::InvalidResponse {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
