//! Retry mechanism with exponential backoff
//!
//! The first attempt runs immediately. A failure is retried only when the
//! classifier accepts it, after a delay that grows by `backoff_multiplier`
//! each time. The policy never looks at what the operation does, only at the
//! classification of its error.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::time::sleep;
use tower::{Layer, Service, ServiceExt};
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{PredictError, Result};

/// Retry policy for operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    attempt: usize,
    next_delay: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(config: RetryConfig) -> Self {
        Self {
            next_delay: config.initial_delay,
            config,
            attempt: 0,
        }
    }

    /// Check if we should retry
    pub fn should_retry(&self) -> bool {
        self.attempt < self.config.max_retries
    }

    /// Number of retries taken so far
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Calculate next delay with exponential backoff
    pub fn next_delay(&mut self) -> Duration {
        let mut delay = self.next_delay;

        if self.config.jitter {
            use rand::Rng;
            let mut rng = rand::thread_rng();
            let jitter = rng.gen_range(0.0..0.3);
            let jitter_ms = (delay.as_millis() as f64 * jitter) as u64;
            delay += Duration::from_millis(jitter_ms);
        }

        self.attempt += 1;
        self.next_delay = Duration::from_secs_f32(
            (self.next_delay.as_secs_f32() * self.multiplier())
                .min(self.config.max_delay.as_secs_f32()),
        );

        delay
    }

    /// Growth factor actually applied; anything below 1.0 or non-finite
    /// keeps the delay constant.
    fn multiplier(&self) -> f32 {
        let m = self.config.backoff_multiplier;
        if m.is_finite() && m >= 1.0 {
            m
        } else {
            1.0
        }
    }

    /// Reset the retry policy
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.next_delay = self.config.initial_delay;
    }
}

/// Decides whether a failure is worth another attempt.
pub trait RetryClassifier: Send + Sync + 'static {
    fn retryable(&self, error: &PredictError) -> bool;
}

impl<F> RetryClassifier for F
where
    F: Fn(&PredictError) -> bool + Send + Sync + 'static,
{
    fn retryable(&self, error: &PredictError) -> bool {
        self(error)
    }
}

/// Default classifier: server errors and network-level failures retry,
/// client errors never do.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusClassifier;

impl RetryClassifier for StatusClassifier {
    fn retryable(&self, error: &PredictError) -> bool {
        is_retryable(error)
    }
}

/// Determine if an error is retryable
pub fn is_retryable(error: &PredictError) -> bool {
    match error {
        PredictError::Timeout { .. } => true,
        PredictError::Transient { status: None, .. } => true,
        PredictError::Transient {
            status: Some(code), ..
        } => *code >= 500,
        PredictError::Rejected { status, .. } => *status >= 500,
        PredictError::Exhausted { .. } => false,
        PredictError::BulkFailure { .. } => false,
        PredictError::Misaligned { .. } => false,
        PredictError::Decode(_) => false,
        PredictError::Config { .. } => false,
    }
}

/// Retry an async operation with exponential backoff
pub async fn retry_async<F, Fut, T, C>(
    mut operation: F,
    policy: &mut RetryPolicy,
    classifier: &C,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    C: RetryClassifier + ?Sized,
{
    loop {
        match operation().await {
            Ok(result) => {
                if policy.attempt() > 0 {
                    debug!(
                        "Operation succeeded after {} attempts",
                        policy.attempt() + 1
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if !classifier.retryable(&error) {
                    debug!("Non-retryable error: {}", error);
                    return Err(error);
                }

                if !policy.should_retry() {
                    warn!(
                        "Max retries ({}) exceeded. Last error: {}",
                        policy.config.max_retries, error
                    );
                    return Err(PredictError::Exhausted {
                        attempts: policy.attempt() + 1,
                        last: Box::new(error),
                    });
                }

                let delay = policy.next_delay();
                warn!(
                    "Attempt {} failed: {}. Retrying in {:?}...",
                    policy.attempt(),
                    error,
                    delay
                );

                sleep(delay).await;
            }
        }
    }
}

/// Builder for retry operations
pub struct RetryBuilder<C = StatusClassifier> {
    policy: RetryPolicy,
    classifier: C,
}

impl Default for RetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryBuilder {
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::new(RetryConfig::default()),
            classifier: StatusClassifier,
        }
    }
}

impl<C: RetryClassifier> RetryBuilder<C> {
    pub fn max_retries(mut self, max: usize) -> Self {
        self.policy.config.max_retries = max;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy.config.initial_delay = delay;
        self.policy.next_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.config.max_delay = delay;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f32) -> Self {
        self.policy.config.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.policy.config.jitter = enabled;
        self
    }

    /// Swap in a different retryability classifier.
    pub fn classifier<C2: RetryClassifier>(self, classifier: C2) -> RetryBuilder<C2> {
        RetryBuilder {
            policy: self.policy,
            classifier,
        }
    }

    pub async fn run_async<F, Fut, T>(mut self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry_async(operation, &mut self.policy, &self.classifier).await
    }
}

/// Tower layer that retries the wrapped service per [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryLayer<C = StatusClassifier> {
    config: RetryConfig,
    classifier: C,
}

impl RetryLayer {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            classifier: StatusClassifier,
        }
    }
}

impl<C> RetryLayer<C> {
    pub fn with_classifier<C2>(self, classifier: C2) -> RetryLayer<C2> {
        RetryLayer {
            config: self.config,
            classifier,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Retry<S, C> {
    inner: S,
    config: RetryConfig,
    classifier: C,
}

impl<S, C: Clone> Layer<S> for RetryLayer<C> {
    type Service = Retry<S, C>;
    fn layer(&self, inner: S) -> Self::Service {
        Retry {
            inner,
            config: self.config.clone(),
            classifier: self.classifier.clone(),
        }
    }
}

impl<S, C, Req> Service<Req> for Retry<S, C>
where
    Req: Clone + Send + 'static,
    S: Service<Req, Error = PredictError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    C: RetryClassifier + Clone,
{
    type Response = S::Response;
    type Error = PredictError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let inner = self.inner.clone();
        let classifier = self.classifier.clone();
        let mut policy = RetryPolicy::new(self.config.clone());
        Box::pin(async move {
            retry_async(
                move || {
                    let svc = inner.clone();
                    let req = req.clone();
                    async move { svc.oneshot(req).await }
                },
                &mut policy,
                &classifier,
            )
            .await
        })
    }
}
