use thiserror::Error;

/// Failure of a single page fetch, as seen by the feed.
///
/// Every transport problem is folded into one of these variants at the
/// fetcher boundary, so the controller only ever stores and displays them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("not found")]
    NotFound,

    #[error("request rejected {status}: {message}")]
    Client { status: u16, message: String },

    #[error("malformed payload: {0}")]
    Decode(String),

    #[error("request abandoned")]
    Cancelled,
}

impl FetchError {
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        match status {
            404 => FetchError::NotFound,
            500..=599 => FetchError::Server { status, message },
            _ => FetchError::Client { status, message },
        }
    }

    /// Whether retrying the same request can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Network(_) | FetchError::Server { .. } | FetchError::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_taxonomy() {
        assert_eq!(FetchError::from_status(404, ""), FetchError::NotFound);
        assert!(matches!(
            FetchError::from_status(503, "busy"),
            FetchError::Server { status: 503, .. }
        ));
        assert!(matches!(
            FetchError::from_status(422, "bad facet"),
            FetchError::Client { status: 422, .. }
        ));
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(FetchError::Network("reset".to_string()).is_retryable());
        assert!(FetchError::from_status(502, "").is_retryable());
        assert!(!FetchError::from_status(400, "").is_retryable());
        assert!(!FetchError::Decode("eof".to_string()).is_retryable());
    }
}
