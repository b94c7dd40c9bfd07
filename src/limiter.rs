//! Concurrency limiter
//!
//! A FIFO admission queue bounding how many operations run at once. Admission
//! is a [`Ticket`] taken from a fair semaphore: waiters are served strictly in
//! the order they asked, and a ticket is returned when it is dropped, so every
//! exit path (success, error, or the caller abandoning the future) frees the
//! slot for the next queued operation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower::{Layer, Service, ServiceExt};

use crate::error::{PredictError, Result};

/// Shared admission gate; clones share the same slots.
#[derive(Debug, Clone)]
pub struct Limiter {
    sem: Arc<Semaphore>,
    max: usize,
}

/// An admission slot. Held for the lifetime of one operation.
#[derive(Debug)]
pub struct Ticket {
    _permit: OwnedSemaphorePermit,
}

impl Limiter {
    /// `max_concurrent` of zero is treated as one.
    pub fn new(max_concurrent: usize) -> Self {
        let max = max_concurrent.max(1);
        Self {
            sem: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max
    }

    /// Operations currently holding a ticket.
    pub fn in_flight(&self) -> usize {
        self.max - self.sem.available_permits()
    }

    /// Wait for a slot in FIFO order.
    pub async fn acquire(&self) -> Result<Ticket> {
        // the semaphore is owned here and never closed
        let permit = self
            .sem
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PredictError::config("limiter closed"))?;
        Ok(Ticket { _permit: permit })
    }

    /// Run `operation` once a slot is free and report its own result.
    pub async fn submit<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _ticket = self.acquire().await?;
        operation().await
    }
}

/// Tower layer gating the wrapped service behind a shared [`Limiter`].
#[derive(Debug, Clone)]
pub struct LimitLayer {
    limiter: Limiter,
}

impl LimitLayer {
    pub fn new(limiter: Limiter) -> Self {
        Self { limiter }
    }
}

#[derive(Debug, Clone)]
pub struct Limited<S> {
    inner: S,
    limiter: Limiter,
}

impl<S> Layer<S> for LimitLayer {
    type Service = Limited<S>;
    fn layer(&self, inner: S) -> Self::Service {
        Limited {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

impl<S, Req> Service<Req> for Limited<S>
where
    Req: Send + 'static,
    S: Service<Req, Error = PredictError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
{
    type Response = S::Response;
    type Error = PredictError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let limiter = self.limiter.clone();
        let svc = self.inner.clone();
        Box::pin(async move { limiter.submit(|| svc.oneshot(req)).await })
    }
}
