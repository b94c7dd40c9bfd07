//! Request gateway
//!
//! One network call to a named endpoint, with the resilience stack applied
//! around it:
//!
//! ```text
//! Retry ─▶ Deadline ─▶ status check ─▶ transport
//! ```
//!
//! Non-success responses become typed failures inside the retry loop, so 5xx
//! answers and timeouts are retried while 4xx answers surface immediately. The
//! gateway keeps no state between calls beyond its fixed configuration.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tower::util::MapResult;
use tower::{ServiceBuilder, ServiceExt};
use tracing::debug;

use crate::config::RetryConfig;
use crate::deadline::{Deadline, DeadlineLayer};
use crate::error::Result;
use crate::retry::{Retry, RetryClassifier, RetryLayer, StatusClassifier};
use crate::transport::{check_status, HttpRequest, HttpResponse, Method, Transport};

type StatusCheck = fn(Result<HttpResponse>) -> Result<HttpResponse>;

type Stack<T, C> = Retry<Deadline<MapResult<T, StatusCheck>>, C>;

#[derive(Debug, Clone)]
pub struct Gateway<T, C = StatusClassifier> {
    stack: Stack<T, C>,
    timeout: Duration,
}

impl<T> Gateway<T>
where
    T: Transport,
    T::Future: Send + 'static,
{
    pub fn new(transport: T, timeout: Duration, retry: RetryConfig) -> Self {
        Self::with_classifier(transport, timeout, retry, StatusClassifier)
    }
}

impl<T, C> Gateway<T, C>
where
    T: Transport,
    T::Future: Send + 'static,
    C: RetryClassifier + Clone,
{
    pub fn with_classifier(
        transport: T,
        timeout: Duration,
        retry: RetryConfig,
        classifier: C,
    ) -> Self {
        let checked = transport.map_result(check_status as StatusCheck);
        let stack = ServiceBuilder::new()
            .layer(RetryLayer::new(retry).with_classifier(classifier))
            .layer(DeadlineLayer::new(timeout))
            .service(checked);
        Self { stack, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `body` (if any) as JSON to `endpoint` and decode the JSON answer.
    pub async fn call<B, R>(&self, endpoint: &str, method: Method, body: Option<&B>) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = body.map(serde_json::to_vec).transpose()?;
        let req = HttpRequest {
            method,
            path: endpoint.to_string(),
            body,
        };
        debug!(endpoint, "sending request");
        let resp = self.stack.clone().oneshot(req).await?;
        Ok(serde_json::from_str(&resp.body)?)
    }

    pub async fn get<R: DeserializeOwned>(&self, endpoint: &str) -> Result<R> {
        self.call::<(), R>(endpoint, Method::GET, None).await
    }

    pub async fn post<B, R>(&self, endpoint: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.call(endpoint, Method::POST, Some(body)).await
    }
}
