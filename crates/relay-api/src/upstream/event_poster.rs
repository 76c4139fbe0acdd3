//! Shared HTTP client wrapper used by both relays to deliver a batch of
//! events upstream: one POST, body discarded, retry up to 2 attempts with
//! a fixed 1s sleep, no retry on `401`/`404`/`408`/`429`.

use relay_core::{RelayError, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_secs(1);
const NON_RETRYABLE: [u16; 4] = [401, 404, 408, 429];

/// Posts a single JSON array of events to `{eventsBase}/bulk`. One instance
/// is shared across every relay (verbatim and summarizing) for a given
/// environment since they all hit the same upstream events endpoint.
#[derive(Clone)]
pub struct UpstreamEventPoster {
    client: Client,
    events_uri: String,
    sdk_key: String,
    user_agent: String,
}

impl UpstreamEventPoster {
    pub fn new(client: Client, events_uri: impl Into<String>, sdk_key: impl Into<String>) -> Self {
        Self {
            client,
            events_uri: events_uri.into(),
            sdk_key: sdk_key.into(),
            user_agent: format!("flag-relay/{}", relay_core::VERSION),
        }
    }

    /// POST `body` (a pre-serialized JSON array of events) to the bulk
    /// endpoint, retrying transient failures. Returns `Ok(())` once a 2xx
    /// response is observed, or the last error if retries are exhausted or
    /// the failure is non-retryable.
    pub async fn post_bulk(&self, body: Vec<u8>, schema_version: u32) -> Result<()> {
        let url = format!("{}/bulk", self.events_uri.trim_end_matches('/'));
        let mut last_error = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(RETRY_DELAY).await;
            }

            let result = self
                .client
                .post(&url)
                .header("Authorization", &self.sdk_key)
                .header("Content-Type", "application/json")
                .header("User-Agent", &self.user_agent)
                .header("X-LaunchDarkly-Event-Schema", schema_version.to_string())
                .body(body.clone())
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    let status = response.status();
                    if is_non_retryable(status) {
                        tracing::warn!(status = status.as_u16(), "event POST rejected, not retrying");
                        return Err(RelayError::UpstreamClient {
                            status: status.as_u16(),
                            message: status.to_string(),
                        });
                    }
                    last_error = Some(RelayError::UpstreamTransient {
                        message: format!("event POST returned {}", status),
                    });
                }
                Err(error) => {
                    let status = error.status();
                    if let Some(status) = status {
                        if is_non_retryable(status) {
                            return Err(RelayError::UpstreamClient { status: status.as_u16(), message: error.to_string() });
                        }
                    }
                    last_error = Some(RelayError::UpstreamTransient { message: error.to_string() });
                }
            }
        }

        Err(last_error.unwrap_or(RelayError::UpstreamTransient { message: "event POST exhausted retries".to_string() }))
    }
}

/// True if an HTTP status should end the retry loop rather than continue it.
pub fn is_non_retryable(status: StatusCode) -> bool {
    NON_RETRYABLE.contains(&status.as_u16())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn non_retryable_statuses_are_auth_and_rate_limit_errors() {
        assert!(is_non_retryable(StatusCode::UNAUTHORIZED));
        assert!(is_non_retryable(StatusCode::NOT_FOUND));
        assert!(is_non_retryable(StatusCode::REQUEST_TIMEOUT));
        assert!(is_non_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_non_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_non_retryable(StatusCode::BAD_GATEWAY));
    }

    #[tokio::test]
    async fn a_401_response_ends_the_retry_loop_after_one_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bulk"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let poster = UpstreamEventPoster::new(Client::new(), server.uri(), "sdk-key".to_string());
        let err = poster.post_bulk(b"[]".to_vec(), 3).await.unwrap_err();
        assert!(matches!(err, RelayError::UpstreamClient { status: 401, .. }));
    }

    #[tokio::test]
    async fn a_500_response_is_retried_up_to_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bulk"))
            .respond_with(ResponseTemplate::new(500))
            .expect(MAX_ATTEMPTS as u64)
            .mount(&server)
            .await;

        let poster = UpstreamEventPoster::new(Client::new(), server.uri(), "sdk-key".to_string());
        let err = poster.post_bulk(b"[]".to_vec(), 3).await.unwrap_err();
        assert!(matches!(err, RelayError::UpstreamTransient { .. }));
    }
}
