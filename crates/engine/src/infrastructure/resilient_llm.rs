//! Resilient LLM client wrapper with exponential backoff retry.
//!
//! Wraps any LlmPort implementation with retry logic to handle transient
//! failures. Auth and bad-request failures are not retried.

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::infrastructure::ports::{LlmError, LlmPort, LlmRequest, LlmResponse, ToolDefinition};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries, just the initial attempt)
    pub max_retries: u32,
    /// Base delay in milliseconds before first retry
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,
    /// Jitter factor (0.0-1.0) for randomizing delays
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            jitter_factor: 0.2,
        }
    }
}

/// Wrapper that adds retry logic to any LLM client
pub struct ResilientLlmClient {
    inner: Arc<dyn LlmPort>,
    config: RetryConfig,
}

impl ResilientLlmClient {
    pub fn new(inner: Arc<dyn LlmPort>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Delay for a given attempt number: exponential backoff with jitter.
    fn calculate_delay(&self, attempt: u32) -> u64 {
        let base = self.config.base_delay_ms;
        let exponential = base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let capped = exponential.min(self.config.max_delay_ms);

        let jitter_range = (capped as f64 * self.config.jitter_factor) as i64;
        if jitter_range > 0 {
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped as i64 + jitter).max(0) as u64
        } else {
            capped
        }
    }

    fn is_retryable(error: &LlmError) -> bool {
        match error {
            // Network/request failures are typically transient, but auth
            // and bad-request errors will not fix themselves
            LlmError::RequestFailed(msg) => {
                !msg.contains("401") && !msg.contains("403") && !msg.contains("400")
            }
            // Could be a truncated body from a dropped connection
            LlmError::InvalidResponse(_) => true,
        }
    }

    async fn execute_with_retry<F, Fut>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> Result<LlmResponse, LlmError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<LlmResponse, LlmError>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(
                            operation = operation_name,
                            attempt,
                            "LLM call succeeded after retry"
                        );
                    }
                    return Ok(response);
                }
                Err(e) if Self::is_retryable(&e) && attempt < self.config.max_retries => {
                    let delay = self.calculate_delay(attempt + 1);
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay,
                        error = %e,
                        "LLM call failed, retrying"
                    );
                    last_error = Some(e);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::RequestFailed("retry loop exhausted".to_string())))
    }
}

#[async_trait]
impl LlmPort for ResilientLlmClient {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        self.execute_with_retry("generate", || self.inner.generate(request.clone()))
            .await
    }

    async fn generate_with_tools(
        &self,
        request: LlmRequest,
        tools: Vec<ToolDefinition>,
    ) -> Result<LlmResponse, LlmError> {
        self.execute_with_retry("generate_with_tools", || {
            self.inner.generate_with_tools(request.clone(), tools.clone())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{ChatMessage, FinishReason};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails a configured number of times, then succeeds.
    struct FlakyLlm {
        failures: usize,
        calls: AtomicUsize,
        error: LlmError,
    }

    impl FlakyLlm {
        fn new(failures: usize, error: LlmError) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
                error,
            }
        }
    }

    #[async_trait]
    impl LlmPort for FlakyLlm {
        async fn generate(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok(LlmResponse {
                    content: "ok".to_string(),
                    tool_calls: vec![],
                    finish_reason: FinishReason::Stop,
                    usage: None,
                })
            }
        }

        async fn generate_with_tools(
            &self,
            request: LlmRequest,
            _tools: Vec<ToolDefinition>,
        ) -> Result<LlmResponse, LlmError> {
            self.generate(request).await
        }
    }

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter_factor: 0.0,
        }
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let inner = Arc::new(FlakyLlm::new(
            2,
            LlmError::RequestFailed("connection reset".to_string()),
        ));
        let client = ResilientLlmClient::new(inner.clone(), fast_config());

        let response = client
            .generate(LlmRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .expect("should eventually succeed");
        assert_eq!(response.content, "ok");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_auth_failures() {
        let inner = Arc::new(FlakyLlm::new(
            5,
            LlmError::RequestFailed("401 unauthorized".to_string()),
        ));
        let client = ResilientLlmClient::new(inner.clone(), fast_config());

        let result = client
            .generate(LlmRequest::new(vec![ChatMessage::user("hi")]))
            .await;
        assert!(result.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let inner = Arc::new(FlakyLlm::new(
            10,
            LlmError::InvalidResponse("truncated".to_string()),
        ));
        let client = ResilientLlmClient::new(inner.clone(), fast_config());

        let result = client
            .generate(LlmRequest::new(vec![ChatMessage::user("hi")]))
            .await;
        assert!(result.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4); // initial + 3 retries
    }
}
