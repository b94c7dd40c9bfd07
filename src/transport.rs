//! HTTP transport
//!
//! The gateway talks to the network through any
//! `Service<HttpRequest, Response = HttpResponse, Error = PredictError>`.
//! [`ReqwestTransport`] is the production implementation; tests plug in
//! `tower::service_fn` fakes.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::Service;

use crate::error::{PredictError, Result};

pub use reqwest::Method;

/// One network round trip, relative to the transport's base address.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    /// Serialized JSON payload
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }
}

/// Raw response: status code and body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Anything the gateway can send requests through.
pub trait Transport:
    Service<HttpRequest, Response = HttpResponse, Error = PredictError> + Clone + Send + 'static
{
}

impl<T> Transport for T where
    T: Service<HttpRequest, Response = HttpResponse, Error = PredictError>
        + Clone
        + Send
        + 'static
{
}

/// Turn a non-success response into a typed failure carrying its status.
pub fn check_status(result: Result<HttpResponse>) -> Result<HttpResponse> {
    let resp = result?;
    if resp.is_success() {
        return Ok(resp);
    }
    if resp.status >= 500 {
        Err(PredictError::Transient {
            status: Some(resp.status),
            message: resp.body,
        })
    } else {
        Err(PredictError::Rejected {
            status: resp.status,
            body: resp.body,
        })
    }
}

/// `reqwest`-backed transport bound to one base address.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PredictError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl Service<HttpRequest> for ReqwestTransport {
    type Response = HttpResponse;
    type Error = PredictError;
    type Future = Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: HttpRequest) -> Self::Future {
        let mut builder = self
            .client
            .request(req.method, self.url_for(&req.path))
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(body) = req.body {
            builder = builder.body(body);
        }
        Box::pin(async move {
            let resp = builder.send().await?;
            let status = resp.status().as_u16();
            let body = resp.text().await?;
            Ok(HttpResponse { status, body })
        })
    }
}
