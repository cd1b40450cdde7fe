use std::time::Duration;

use tokio::time::sleep;

use crate::{
    transport::{HttpRequest, RawResponse, Transport},
    ClientConfig, MongoHttpError, Result, StatsTracker, TransportError,
};

/// Bounded retries with exponential backoff around a [`Transport`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// Delay before the first retry; doubled for each further one.
    pub base_delay: Duration,
}

/// What the policy does with the outcome of one attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Success,
    Retry,
    Fail,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.max_retries, config.retry_backoff())
    }

    /// Retryable transport failures and 5xx are retried; any other non-2xx
    /// status or a malformed request fails fast.
    pub fn classify(outcome: &std::result::Result<RawResponse, TransportError>) -> Disposition {
        match outcome {
            Ok(response) if response.is_success() => Disposition::Success,
            Ok(response) if (500..600).contains(&response.status) => Disposition::Retry,
            Ok(_) => Disposition::Fail,
            Err(err) if err.is_retryable() => Disposition::Retry,
            Err(_) => Disposition::Fail,
        }
    }

    /// Delay after failed attempt `attempt` (0-based): `base * 2^attempt`.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exp = attempt.min(16) as u32;
        let multiplier = 1u32 << exp;
        self.base_delay.saturating_mul(multiplier)
    }

    /// Runs `request` until it succeeds, fails terminally, or retries run out.
    ///
    /// Every re-attempt is counted on `stats`. The sleep between attempts
    /// only suspends the calling task.
    pub async fn execute(
        &self,
        transport: &dyn Transport,
        request: &HttpRequest,
        stats: &StatsTracker,
    ) -> Result<RawResponse> {
        if request.timeout.is_zero() {
            return Err(MongoHttpError::Validation(
                "request timeout must be positive".to_owned(),
            ));
        }

        let mut attempt = 0usize;
        loop {
            let outcome = transport.execute(request).await;
            let disposition = Self::classify(&outcome);

            let err = match outcome {
                Ok(response) if disposition == Disposition::Success => return Ok(response),
                Ok(response) => MongoHttpError::Http {
                    status: response.status,
                    body: response.body,
                },
                Err(err) => MongoHttpError::Transport(err),
            };

            if disposition == Disposition::Retry && attempt < self.max_retries {
                let delay = self.backoff(attempt);

                #[cfg(feature = "tracing")]
                tracing::debug!(
                    method = %request.method,
                    url = %request.url,
                    attempt = attempt + 1,
                    max_retries = self.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying request"
                );

                stats.record_retry();
                sleep(delay).await;
                attempt += 1;
                continue;
            }

            return Err(err);
        }
    }
}
