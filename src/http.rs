//! Shared JSON-over-HTTP client for OpenAI-compatible endpoints.
//!
//! Both the embedding and the generation boundary talk to the same family
//! of APIs, so they share one retry loop:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Failures come back as a plain message; each caller wraps it in its own
//! error kind.

use std::time::Duration;

use serde_json::Value;

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    api_key: String,
    max_retries: u32,
    http: reqwest::Client,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        api_key: String,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {}", e))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries,
            http,
        })
    }

    /// POST `body` to `{base_url}{path}` and return the parsed JSON response.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, String> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                tracing::warn!(
                    url = %url,
                    attempt,
                    delay_secs = delay.as_secs(),
                    error = last_err.as_deref().unwrap_or(""),
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .json::<Value>()
                            .await
                            .map_err(|e| format!("malformed response body: {}", e));
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(format!("API error {}: {}", status, body_text));
                        continue;
                    }

                    return Err(format!("API error {}: {}", status, body_text));
                }
                Err(e) if e.is_timeout() => {
                    last_err = Some(format!("request timed out: {}", e));
                }
                Err(e) => {
                    last_err = Some(format!("network error: {}", e));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| "request failed after retries".to_string()))
    }
}

/// Exponential backoff for retry `attempt` (1-based): 1s, 2s, 4s, … capped at 32s.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}
