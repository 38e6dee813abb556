//! Request transport and the retry schedule.
//!
//! The transport exchanges one encoded request for one response body.
//! Transient failures are retried indefinitely with a linearly growing,
//! capped delay, resending the byte-identical payload each time; the
//! sequence number in the payload makes the retries idempotent server-side.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::ClientConfig;
use crate::error::TransportError;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// One request/response exchange with the server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Posts `body` to `url` and returns the response body.
    ///
    /// # Errors
    ///
    /// `TransportError::Network` for failures that may be transient,
    /// `TransportError::Invalid` when the exchange cannot be initiated at
    /// all.
    async fn exchange(&self, url: &str, body: &str) -> Result<String, TransportError>;
}

/// HTTP transport over a shared connection pool.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn exchange(&self, url: &str, body: &str) -> Result<String, TransportError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/xml; charset=UTF-8")
            .body(body.to_string())
            .send()
            .await
            .map_err(|err| TransportError::Network(err.into()))?;

        let status = response.status();
        if status.is_server_error() {
            // 5xx may clear up; let the retry schedule handle it.
            return Err(TransportError::Network(anyhow::anyhow!(
                "server returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(TransportError::Invalid(format!(
                "unexpected status {status}"
            )));
        }
        response
            .text()
            .await
            .map_err(|err| TransportError::Network(err.into()))
    }
}

// ---------------------------------------------------------------------------
// Retry schedule
// ---------------------------------------------------------------------------

/// Delay before retry number `attempt` (1-based).
///
/// The first retry is immediate; each further retry adds the configured
/// increment, up to the cap.
#[must_use]
pub fn retry_delay(attempt: u32, config: &ClientConfig) -> Duration {
    let steps = attempt.saturating_sub(1);
    config
        .retry_delay_increment
        .saturating_mul(steps)
        .min(config.retry_max_delay)
}

/// Counts retry attempts for one in-flight request.
#[derive(Debug, Default, Clone, Copy)]
pub struct RetrySchedule {
    attempt: u32,
}

impl RetrySchedule {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of retries performed so far.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Registers the next retry and returns its delay.
    pub fn next_delay(&mut self, config: &ClientConfig) -> Duration {
        self.attempt += 1;
        retry_delay(self.attempt, config)
    }
}

/// Sends `body` and parses the response, retrying per the schedule.
///
/// Both network failures and unparseable response bodies count as transient:
/// a proxy error page or a truncated body looks exactly like a flaky
/// network, and the byte-identical resend is idempotent thanks to the
/// sequence number in the payload.
///
/// # Errors
///
/// Returns `TransportError::Invalid` unchanged; transient failures never
/// surface, they are retried until an exchange parses.
pub async fn exchange_with_retry<T, F>(
    transport: &dyn Transport,
    url: &str,
    body: &str,
    config: &ClientConfig,
    parse: F,
) -> Result<T, TransportError>
where
    F: Fn(&str) -> Result<T, liveform_core::ProtocolError>,
{
    let mut schedule = RetrySchedule::new();
    loop {
        let failure = match transport.exchange(url, body).await {
            Ok(text) => match parse(&text) {
                Ok(parsed) => return Ok(parsed),
                Err(err) => anyhow::Error::from(err).context("unparseable response body"),
            },
            Err(TransportError::Invalid(reason)) => {
                return Err(TransportError::Invalid(reason));
            }
            Err(TransportError::Network(err)) => err,
        };
        let delay = schedule.next_delay(config);
        tracing::warn!(
            error = %failure,
            attempt = schedule.attempt(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "request failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn delay_grows_linearly_then_caps() {
        let config = ClientConfig::default();
        assert_eq!(retry_delay(1, &config), Duration::ZERO);
        assert_eq!(retry_delay(2, &config), Duration::from_secs(5));
        assert_eq!(retry_delay(3, &config), Duration::from_secs(10));
        assert_eq!(retry_delay(7, &config), Duration::from_secs(30));
        assert_eq!(retry_delay(100, &config), Duration::from_secs(30));
    }

    /// Fails a fixed number of times, recording every payload received.
    struct FlakyTransport {
        failures_left: Mutex<u32>,
        payloads: Mutex<Vec<String>>,
    }

    impl FlakyTransport {
        fn new(failures: u32) -> Self {
            Self {
                failures_left: Mutex::new(failures),
                payloads: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn exchange(&self, _url: &str, body: &str) -> Result<String, TransportError> {
            self.payloads.lock().unwrap().push(body.to_string());
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(TransportError::Network(anyhow::anyhow!("connection reset")));
            }
            Ok("ok".to_string())
        }
    }

    fn passthrough(text: &str) -> Result<String, liveform_core::ProtocolError> {
        Ok(text.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn retries_resend_identical_payload() {
        let transport = FlakyTransport::new(3);
        let config = ClientConfig::default();
        let start = tokio::time::Instant::now();

        let body = exchange_with_retry(&transport, "http://test/ajax", "<payload/>", &config, passthrough)
            .await
            .unwrap();
        assert_eq!(body, "ok");

        let payloads = transport.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 4);
        assert!(payloads.iter().all(|p| p == "<payload/>"));
        // Immediate, then 5s, then 10s.
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_body_is_retried_like_a_network_failure() {
        let transport = FlakyTransport::new(0);
        let config = ClientConfig::default();
        let attempts = Mutex::new(0u32);
        let parsed = exchange_with_retry(
            &transport,
            "http://test/ajax",
            "<payload/>",
            &config,
            |text| {
                let mut n = attempts.lock().unwrap();
                *n += 1;
                if *n < 3 {
                    Err(liveform_core::ProtocolError::Malformed {
                        offset: 0,
                        reason: "proxy error page".to_string(),
                    })
                } else {
                    Ok(text.to_string())
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(parsed, "ok");
        assert_eq!(transport.payloads.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_is_not_retried() {
        struct Rejecting;

        #[async_trait]
        impl Transport for Rejecting {
            async fn exchange(&self, _url: &str, _body: &str) -> Result<String, TransportError> {
                Err(TransportError::Invalid("bad endpoint".into()))
            }
        }

        let err = exchange_with_retry(
            &Rejecting,
            "http://test/ajax",
            "x",
            &ClientConfig::default(),
            passthrough,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransportError::Invalid(_)));
    }
}
