//! Error handling for the relay.
//!
//! [`RelayError`] (in [`types`]) is the single error currency crossing
//! component boundaries; [`ErrorCategory`]/[`ErrorSeverity`] classify it for
//! retry decisions and structured logging. [`backoff_delay`] is the
//! reconnect/backoff sequence shared by the upstream stream client and the
//! event poster.

pub mod types;

pub use types::RelayError;

use serde::{Deserialize, Serialize};

/// Error severity levels for monitoring and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - should be investigated.
    Warning,
    /// Error - requires attention.
    Error,
    /// Critical - immediate action required.
    Critical,
}

/// Error categories for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Transient errors that may succeed on retry.
    Transient,
    /// Permanent errors that won't succeed on retry.
    Permanent,
    /// Bad input from a caller (config, malformed payload).
    User,
    /// System/infrastructure errors.
    System,
}

/// Result type aliased to [`RelayError`].
pub type Result<T> = std::result::Result<T, RelayError>;

/// Compute the delay before the next reconnect/retry attempt given how many
/// attempts have already failed. Fixed base delay with capped exponential
/// backoff and jitter, per the upstream reconnect policy.
pub fn backoff_delay(attempt: u32, base: std::time::Duration, max: std::time::Duration) -> std::time::Duration {
    let exp = base.as_millis().saturating_mul(1u128 << attempt.min(10));
    let capped = exp.min(max.as_millis());
    let jitter = {
        use rand::Rng;
        rand::thread_rng().gen_range(0..=(capped / 4).max(1))
    };
    std::time::Duration::from_millis((capped + jitter) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_but_stays_capped() {
        let base = std::time::Duration::from_secs(2);
        let max = std::time::Duration::from_secs(60);
        let d0 = backoff_delay(0, base, max);
        let d5 = backoff_delay(5, base, max);
        let d20 = backoff_delay(20, base, max);
        assert!(d0.as_millis() >= base.as_millis());
        assert!(d5 >= d0);
        assert!(d20.as_millis() <= max.as_millis() + max.as_millis() / 4);
    }
}
