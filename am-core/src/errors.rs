use reqwest::StatusCode;

/// Failure taxonomy of the fetch layer. Transient failures are absorbed by
/// the retry middleware and only reach callers once retries are exhausted;
/// rate limiting never surfaces at all because the budget only delays.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchErrorKind {
    #[error("transient network error")]
    TransientNetwork,
    #[error("retries exhausted")]
    ExhaustedRetries,
    #[error("rejected by upstream (status {0})")]
    Rejected(u16),
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("undecodable response body")]
    Decode,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        FetchError { kind, message: message.into() }
    }

    pub fn exhausted(message: impl Into<String>) -> Self {
        FetchError::new(FetchErrorKind::ExhaustedRetries, message)
    }

    pub fn deadline() -> Self {
        FetchError::new(FetchErrorKind::DeadlineExceeded, "deadline expired before the batch resolved")
    }

    pub fn decode(message: impl Into<String>) -> Self {
        FetchError::new(FetchErrorKind::Decode, message)
    }

    /// Whether a retry could ever have helped; terminal kinds are reported
    /// per-batch instead of failing the whole call.
    pub fn is_transient(&self) -> bool {
        self.kind == FetchErrorKind::TransientNetwork
    }
}

/// Per-attempt status classification: 429 and 5xx are transient (the retry
/// middleware keeps trying them), any other 4xx is a hard rejection.
pub fn classify_status(status: StatusCode) -> Option<FetchErrorKind> {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Some(FetchErrorKind::TransientNetwork)
    } else if status.is_client_error() {
        Some(FetchErrorKind::Rejected(status.as_u16()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_server_errors_are_transient() {
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), Some(FetchErrorKind::TransientNetwork));
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), Some(FetchErrorKind::TransientNetwork));
        assert_eq!(classify_status(StatusCode::INTERNAL_SERVER_ERROR), Some(FetchErrorKind::TransientNetwork));
    }

    #[test]
    fn other_client_errors_are_hard_rejections() {
        assert_eq!(classify_status(StatusCode::NOT_FOUND), Some(FetchErrorKind::Rejected(404)));
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), Some(FetchErrorKind::Rejected(400)));
    }

    #[test]
    fn success_is_not_an_error() {
        assert_eq!(classify_status(StatusCode::OK), None);
    }

    #[test]
    fn transient_kinds_are_flagged_retryable() {
        assert!(FetchError::new(FetchErrorKind::TransientNetwork, "x").is_transient());
        assert!(!FetchError::exhausted("x").is_transient());
        assert!(!FetchError::deadline().is_transient());
    }
}
