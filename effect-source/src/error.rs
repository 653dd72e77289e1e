//! Fetch error types

use thiserror::Error;

/// Errors that can occur while fetching effect pack resources
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Request for {resource} failed with status {status}")]
    Status { resource: String, status: u16 },

    #[error("Invalid resource name: {0}")]
    InvalidResource(String),

    #[error("I/O error reading {resource}: {message}")]
    Io { resource: String, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Malformed {resource}: {message}")]
    Decode { resource: String, message: String },

    #[error("Unsupported source location: {0}")]
    Unsupported(String),
}

impl FetchError {
    /// Name of the resource the error refers to, when known
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::NotFound(r) | Self::InvalidResource(r) => Some(r),
            Self::Status { resource, .. }
            | Self::Io { resource, .. }
            | Self::Decode { resource, .. } => Some(resource),
            Self::Http(_) | Self::Unsupported(_) => None,
        }
    }

    pub(crate) fn io(resource: &str, e: &std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(resource.to_string())
        } else {
            Self::Io {
                resource: resource.to_string(),
                message: e.to_string(),
            }
        }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Http(e.to_string())
    }
}
