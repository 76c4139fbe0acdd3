//! Error taxonomy for the flag relay.
//!
//! Every failure that crosses a component boundary is represented as a
//! [`RelayError`] variant. Variants map directly onto the error kinds named
//! in the design: config errors fail startup, upstream auth errors are
//! terminal for the affected environment, upstream transient errors drive
//! reconnect/retry, and so on. [`RelayError::category`] exposes that
//! classification so callers can decide to retry, disconnect, or log and
//! continue without matching on every variant.

use super::{ErrorCategory, ErrorSeverity};

/// Primary error type for the relay's data and event pipelines.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Invalid startup configuration; the process must not start.
    #[error("configuration error: {message}")]
    Config {
        /// What was wrong with the configuration.
        message: String,
    },

    /// Upstream rejected the SDK credential (HTTP 401). Terminal for the
    /// affected environment's stream and event poster.
    #[error("upstream rejected credential for environment {environment}")]
    UpstreamAuth {
        /// Name of the environment whose credential was rejected.
        environment: String,
    },

    /// Network failure or 5xx talking to LaunchDarkly; retryable.
    #[error("transient upstream failure: {message}")]
    UpstreamTransient {
        /// Underlying failure description.
        message: String,
    },

    /// A non-401 4xx from upstream. For events, abandon the payload; for
    /// the stream, reconnect.
    #[error("upstream rejected request with status {status}: {message}")]
    UpstreamClient {
        /// HTTP status code returned by upstream.
        status: u16,
        /// Response body or error description.
        message: String,
    },

    /// A single event or SSE frame failed to parse. The caller drops just
    /// that item and continues.
    #[error("malformed payload: {message}")]
    MalformedPayload {
        /// Description of what failed to parse.
        message: String,
    },

    /// The backing store behind a `PersistentAdapter` is unreachable right
    /// now. Reads may fall back to the in-memory cache; writes fail.
    #[error("backend store unavailable: {message}")]
    BackendUnavailable {
        /// Description of the transient backend failure.
        message: String,
    },

    /// The backing store behind a `PersistentAdapter` failed in a way that
    /// retrying will not fix.
    #[error("backend store error: {message}")]
    BackendError {
        /// Description of the permanent backend failure.
        message: String,
    },

    /// A downstream subscriber's outbound queue overflowed; it has been
    /// marked degraded and will be disconnected.
    #[error("downstream subscriber {subscriber_id} is degraded")]
    DownstreamClientSlow {
        /// Identifier of the degraded subscriber.
        subscriber_id: u64,
    },

    /// A bounded queue (event relay or subscriber channel) is full.
    #[error("queue full: {queue}")]
    QueueFull {
        /// Name of the queue that overflowed.
        queue: String,
    },

    /// Failed to serialize a value to JSON.
    #[error("serialization error: {message}")]
    Serialization {
        /// Details about the serialization failure.
        message: String,
    },

    /// Failed to deserialize JSON into the expected shape.
    #[error("deserialization error: {message}")]
    Deserialization {
        /// Details about the deserialization failure.
        message: String,
    },
}

impl RelayError {
    /// Classification used to decide retry/disconnect/log-and-continue
    /// behavior without matching on every variant.
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::Config { .. } => ErrorCategory::User,
            RelayError::UpstreamAuth { .. } => ErrorCategory::Permanent,
            RelayError::UpstreamTransient { .. } => ErrorCategory::Transient,
            RelayError::UpstreamClient { .. } => ErrorCategory::Permanent,
            RelayError::MalformedPayload { .. } => ErrorCategory::User,
            RelayError::BackendUnavailable { .. } => ErrorCategory::Transient,
            RelayError::BackendError { .. } => ErrorCategory::System,
            RelayError::DownstreamClientSlow { .. } => ErrorCategory::System,
            RelayError::QueueFull { .. } => ErrorCategory::System,
            RelayError::Serialization { .. } | RelayError::Deserialization { .. } => {
                ErrorCategory::User
            }
        }
    }

    /// Severity used for structured logging.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RelayError::Config { .. } => ErrorSeverity::Critical,
            RelayError::UpstreamAuth { .. } => ErrorSeverity::Error,
            RelayError::UpstreamTransient { .. } => ErrorSeverity::Warning,
            RelayError::UpstreamClient { .. } => ErrorSeverity::Warning,
            RelayError::MalformedPayload { .. } => ErrorSeverity::Warning,
            RelayError::BackendUnavailable { .. } => ErrorSeverity::Warning,
            RelayError::BackendError { .. } => ErrorSeverity::Error,
            RelayError::DownstreamClientSlow { .. } => ErrorSeverity::Info,
            RelayError::QueueFull { .. } => ErrorSeverity::Warning,
            RelayError::Serialization { .. } | RelayError::Deserialization { .. } => {
                ErrorSeverity::Warning
            }
        }
    }

    /// True if retrying the same operation might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Transient)
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(error: serde_json::Error) -> Self {
        RelayError::Deserialization {
            message: error.to_string(),
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            RelayError::UpstreamClient {
                status: status.as_u16(),
                message: error.to_string(),
            }
        } else {
            RelayError::UpstreamTransient {
                message: error.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_auth_is_not_retryable() {
        let err = RelayError::UpstreamAuth {
            environment: "prod".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.category(), ErrorCategory::Permanent);
    }

    #[test]
    fn transient_backend_is_retryable() {
        let err = RelayError::BackendUnavailable {
            message: "redis timeout".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn reqwest_status_maps_to_client_error() {
        // Constructing a reqwest::Error requires a live request; category
        // mapping itself is exercised via the manual variants above.
        let err = RelayError::UpstreamClient {
            status: 429,
            message: "rate limited".to_string(),
        };
        assert!(!err.is_retryable());
    }
}
