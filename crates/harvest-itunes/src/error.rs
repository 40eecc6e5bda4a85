// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ItunesError>;

#[derive(Debug, Error)]
pub enum ItunesError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Throttled by iTunes Search API (HTTP {status})")]
    Throttled { status: u16 },

    #[error("Invalid response from iTunes Search API: {0}")]
    InvalidResponse(String),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
}

impl ItunesError {
    /// Whether a later attempt at the same request may succeed.
    ///
    /// Transport failures and throttling statuses are transient; anything the
    /// server answered in a way we cannot use is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RequestFailed(_) | Self::Throttled { .. })
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Throttled { status } | Self::ApiError { status, .. } => Some(*status),
            Self::RequestFailed(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_throttling_and_transport_are_retryable() {
        assert!(ItunesError::Throttled { status: 429 }.is_retryable());
        assert!(!ItunesError::InvalidResponse("not json".to_string()).is_retryable());
        assert!(!ItunesError::ApiError {
            status: 400,
            message: "bad".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_status_of_unparsable_body_is_none() {
        assert_eq!(ItunesError::InvalidResponse("x".to_string()).status(), None);
        assert_eq!(ItunesError::Throttled { status: 503 }.status(), Some(503));
    }
}
