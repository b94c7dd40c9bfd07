//! Deadline guard
//!
//! Races an operation against a wall-clock budget. When the budget elapses the
//! guard stops waiting and reports [`PredictError::Timeout`]; the abandoned
//! future is dropped together with its timer, so a late result is never
//! observed and no timer outlives the call.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::time::timeout;
use tower::{Layer, Service};

use crate::error::{PredictError, Result};

/// Await `fut` for at most `budget`.
pub async fn guard<F, T>(fut: F, budget: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(PredictError::Timeout { budget }),
    }
}

/// Applies [`guard`] to every call of the wrapped service.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineLayer {
    budget: Duration,
}

impl DeadlineLayer {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }
}

#[derive(Debug, Clone)]
pub struct Deadline<S> {
    inner: S,
    budget: Duration,
}

impl<S> Layer<S> for DeadlineLayer {
    type Service = Deadline<S>;
    fn layer(&self, inner: S) -> Self::Service {
        Deadline {
            inner,
            budget: self.budget,
        }
    }
}

impl<S, Req> Service<Req> for Deadline<S>
where
    S: Service<Req, Error = PredictError> + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
{
    type Response = S::Response;
    type Error = PredictError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let fut = self.inner.call(req);
        Box::pin(guard(fut, self.budget))
    }
}
