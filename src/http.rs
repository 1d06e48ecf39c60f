//! JSON-over-HTTP client shared by the embedding and completion providers.
//!
//! Every request is bounded by the configured timeout. Transient failures
//! are retried with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use crate::error::ProviderError;

pub(crate) struct JsonClient {
    client: reqwest::Client,
    provider: &'static str,
    max_retries: u32,
}

impl JsonClient {
    pub(crate) fn new(
        provider: &'static str,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|source| ProviderError::Transport { provider, source })?;
        Ok(Self {
            client,
            provider,
            max_retries,
        })
    }

    /// POST `body` to `url` and return the parsed JSON response.
    pub(crate) async fn post(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let mut attempt = 0u32;
        loop {
            match self.post_once(url, bearer, body).await {
                Ok(json) => return Ok(json),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = backoff(attempt);
                    tracing::warn!(
                        provider = self.provider,
                        attempt,
                        error = %err,
                        "transient provider failure, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn post_once(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let mut request = self.client.post(url).json(body);
        if let Some(key) = bearer {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|source| self.transport(source))?;
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| ProviderError::invalid(self.provider, e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::Api {
            provider: self.provider,
            status: status.as_u16(),
            body,
        })
    }

    fn transport(&self, source: reqwest::Error) -> ProviderError {
        ProviderError::Transport {
            provider: self.provider,
            source,
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}
