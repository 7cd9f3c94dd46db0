// Bounded retries with exponential backoff around a single provider call.
//
// Every attempt waits for a rate-limit slot first and runs under a fixed
// per-call timeout. In-flight executions are registered by request id so
// they can be aborted from outside.

use std::{
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use dashmap::DashMap;
use futures::future::{AbortHandle, Abortable};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    config::RetryConfig,
    error::SearchError,
    rate_limiter::RateLimiter,
    transport::{ProviderRequest, Transport},
};

#[derive(Debug, Default)]
pub struct ExecutorStats {
    pub attempts: AtomicUsize,
    pub retries: AtomicUsize,
    pub failures: AtomicUsize,
    pub cancellations: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorSnapshot {
    pub attempts: usize,
    pub retries: usize,
    pub failures: usize,
    pub cancellations: usize,
    pub active_requests: usize,
}

pub type ResponseCheck = dyn Fn(&Value) -> Result<(), SearchError> + Send + Sync;

// base * 2^attempt, attempt counted from zero
pub fn calculate_backoff(retry_attempt: u32, base_delay: Duration) -> Duration {
    let factor = 1u32.checked_shl(retry_attempt).unwrap_or(u32::MAX);
    base_delay.saturating_mul(factor)
}

pub struct RetryExecutor {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    retry_config: RetryConfig,
    timeout: Duration,
    active: DashMap<String, (u64, AbortHandle)>,
    next_registration: AtomicU64,
    stats: ExecutorStats,
}

impl RetryExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: Arc<RateLimiter>,
        retry_config: RetryConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            limiter,
            retry_config,
            timeout,
            active: DashMap::new(),
            next_registration: AtomicU64::new(0),
            stats: ExecutorStats::default(),
        }
    }

    pub async fn execute(
        &self,
        request_id: &str,
        request: &ProviderRequest,
    ) -> Result<Value, SearchError> {
        let base_delay = Duration::from_millis(self.retry_config.base_delay_ms);
        self.execute_with(request_id, request, self.retry_config.max_attempts, base_delay)
            .await
    }

    pub async fn execute_with(
        &self,
        request_id: &str,
        request: &ProviderRequest,
        max_attempts: u32,
        base_delay: Duration,
    ) -> Result<Value, SearchError> {
        self.execute_inner(request_id, request, max_attempts, base_delay, &|_| Ok(()))
            .await
    }

    // Like `execute`, but a successful response body is passed through `check`
    // first. A check error is classified and retried like a transport error.
    pub async fn execute_checked(
        &self,
        request_id: &str,
        request: &ProviderRequest,
        check: &ResponseCheck,
    ) -> Result<Value, SearchError> {
        let base_delay = Duration::from_millis(self.retry_config.base_delay_ms);
        self.execute_inner(
            request_id,
            request,
            self.retry_config.max_attempts,
            base_delay,
            check,
        )
        .await
    }

    async fn execute_inner(
        &self,
        request_id: &str,
        request: &ProviderRequest,
        max_attempts: u32,
        base_delay: Duration,
        check: &ResponseCheck,
    ) -> Result<Value, SearchError> {
        let (handle, registration) = AbortHandle::new_pair();
        let generation = self.next_registration.fetch_add(1, Ordering::Relaxed);
        if self
            .active
            .insert(request_id.to_string(), (generation, handle))
            .is_some()
        {
            warn!("request id {request_id} reused while still in flight");
        }

        let outcome = Abortable::new(
            self.run(request, max_attempts.max(1), base_delay, check),
            registration,
        )
        .await;

        // only drop our own registration, a reused id may belong to a newer call
        self.active
            .remove_if(request_id, |_, (g, _)| *g == generation);

        match outcome {
            Ok(result) => result,
            Err(_aborted) => {
                self.stats.cancellations.fetch_add(1, Ordering::Relaxed);
                info!("request {request_id} cancelled");
                Err(SearchError::Cancelled(request_id.to_string()))
            }
        }
    }

    async fn run(
        &self,
        request: &ProviderRequest,
        max_attempts: u32,
        base_delay: Duration,
        check: &ResponseCheck,
    ) -> Result<Value, SearchError> {
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if let Err(e) = self.limiter.acquire().await {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }

            self.stats.attempts.fetch_add(1, Ordering::Relaxed);
            if attempt > 0 {
                self.stats.retries.fetch_add(1, Ordering::Relaxed);
            }

            let outcome =
                match tokio::time::timeout(self.timeout, self.transport.get_json(request)).await {
                    Ok(result) => result.and_then(|value| check(&value).map(|_| value)),
                    Err(_) => Err(SearchError::Timeout(self.timeout.as_millis() as u64)),
                };

            match outcome {
                Ok(value) => {
                    debug!("{request} succeeded on attempt {}", attempt + 1);
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    debug!("{request} failed with non-retryable error: {e}");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "{request} attempt {}/{} failed: {e}",
                        attempt + 1,
                        max_attempts
                    );
                    if attempt + 1 < max_attempts {
                        tokio::time::sleep(calculate_backoff(attempt, base_delay)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        self.stats.failures.fetch_add(1, Ordering::Relaxed);
        Err(SearchError::RequestFailed {
            attempts: max_attempts,
            source: Box::new(
                last_error.unwrap_or_else(|| SearchError::Network("no attempt made".to_string())),
            ),
        })
    }

    pub fn cancel(&self, request_id: &str) -> bool {
        match self.active.remove(request_id) {
            Some((_, (_, handle))) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let ids: Vec<String> = self.active.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    pub fn is_active(&self, request_id: &str) -> bool {
        self.active.contains_key(request_id)
    }

    pub fn active_requests(&self) -> Vec<String> {
        self.active.iter().map(|e| e.key().clone()).collect()
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn stats(&self) -> ExecutorSnapshot {
        ExecutorSnapshot {
            attempts: self.stats.attempts.load(Ordering::Relaxed),
            retries: self.stats.retries.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
            cancellations: self.stats.cancellations.load(Ordering::Relaxed),
            active_requests: self.active.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::mock_provider::{sample_places_payload, MockProvider, ProviderMode};
    use crate::transport::ProviderKind;
    use tokio::time::Instant;

    const PATH: &str = "textsearch/json";

    fn executor(provider: Arc<MockProvider>) -> RetryExecutor {
        RetryExecutor::new(
            provider,
            Arc::new(RateLimiter::new(RateLimitConfig::default())),
            RetryConfig::default(),
            Duration::from_secs(15),
        )
    }

    fn request() -> ProviderRequest {
        ProviderRequest::new(ProviderKind::Places, PATH).param("query", "pizza")
    }

    #[test]
    fn test_backoff_schedule() {
        let base = Duration::from_millis(1000);
        assert_eq!(calculate_backoff(0, base), Duration::from_millis(1000));
        assert_eq!(calculate_backoff(1, base), Duration::from_millis(2000));
        assert_eq!(calculate_backoff(2, base), Duration::from_millis(4000));
        assert_eq!(calculate_backoff(64, base), base.saturating_mul(u32::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_backoff() {
        let provider = Arc::new(MockProvider::new());
        provider.add_response(PATH, sample_places_payload());
        provider.fail_next_requests(2);
        let executor = executor(provider.clone());

        let start = Instant::now();
        let value = executor.execute("req-1", &request()).await.unwrap();

        assert_eq!(value["status"], "OK");
        assert_eq!(provider.request_count(), 3);
        // 1000ms after the first failure, 2000ms after the second
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(3000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(3100), "{elapsed:?}");

        let stats = executor.stats();
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.active_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_are_not_retried() {
        for status in [400, 403] {
            let provider = Arc::new(MockProvider::new());
            provider.add_response(PATH, sample_places_payload());
            provider.fail_next_with_status(1, status);
            let executor = executor(provider.clone());

            let err = executor.execute("req-1", &request()).await.unwrap_err();
            assert!(matches!(err, SearchError::ApiError { status: s, .. } if s == status));
            assert_eq!(provider.request_count(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_wrap_last_error() {
        let provider = Arc::new(MockProvider::new());
        provider.set_mode(ProviderMode::CompleteOutage);
        let executor = executor(provider.clone());

        let err = executor.execute("req-1", &request()).await.unwrap_err();
        match err {
            SearchError::RequestFailed { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, SearchError::Network(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(provider.request_count(), 3);
        assert_eq!(executor.stats().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_body_is_retried_when_transient() {
        let provider = Arc::new(MockProvider::new());
        provider.add_response(PATH, serde_json::json!({ "status": "OVER_QUERY_LIMIT" }));
        let executor = executor(provider.clone());

        let check = |value: &Value| match value["status"].as_str() {
            Some("OVER_QUERY_LIMIT") => Err(SearchError::ApiError {
                status: 429,
                message: "over query limit".to_string(),
            }),
            _ => Ok(()),
        };
        let err = executor
            .execute_checked("req-1", &request(), &check)
            .await
            .unwrap_err();

        assert!(matches!(err, SearchError::RequestFailed { attempts: 3, .. }));
        assert_eq!(provider.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_call_timeout() {
        let provider = Arc::new(MockProvider::new());
        provider.add_response(PATH, sample_places_payload());
        provider.set_delay(20_000);
        let executor = executor(provider.clone());

        let err = executor
            .execute_with("req-1", &request(), 1, Duration::from_millis(10))
            .await
            .unwrap_err();

        match err {
            SearchError::RequestFailed { source, .. } => {
                assert!(matches!(*source, SearchError::Timeout(15_000)))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_aborts_in_flight() {
        let provider = Arc::new(MockProvider::new());
        provider.add_response(PATH, sample_places_payload());
        provider.set_delay(10_000);
        let executor = Arc::new(executor(provider.clone()));

        let running = executor.clone();
        let handle = tokio::spawn(async move { running.execute("req-7", &request()).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(executor.is_active("req-7"));
        assert_eq!(executor.cancel_all(), 1);

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, SearchError::Cancelled(ref id) if id == "req-7"));
        assert!(executor.active_requests().is_empty());
        assert_eq!(executor.stats().cancellations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let provider = Arc::new(MockProvider::new());
        provider.set_mode(ProviderMode::CompleteOutage);
        let executor = Arc::new(executor(provider.clone()));

        let running = executor.clone();
        let handle = tokio::spawn(async move { running.execute("req-9", &request()).await });

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(executor.cancel("req-9"));
        assert!(!executor.cancel("req-9"));

        assert!(handle.await.unwrap().unwrap_err().is_cancelled());
        assert_eq!(provider.request_count(), 1);
    }
}
