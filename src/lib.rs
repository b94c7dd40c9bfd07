//! # tower-predict
//!
//! A resilient bulk-prediction client built from small Tower-style pieces.
//! It turns a large collection of input records into an order-preserving list
//! of predictions from a remote model server, surviving slow servers,
//! transient failures and overload without flooding the server with
//! unbounded parallel requests.
//!
//! ## Components
//!
//! - **Deadline guard** ([`deadline`]): races each network attempt against a budget
//! - **Retry policy** ([`retry`]): exponential backoff with a pluggable classifier
//! - **Concurrency limiter** ([`limiter`]): FIFO admission bounding in-flight calls
//! - **Request gateway** ([`gateway`]): retry + deadline + status normalization around one call
//! - **Schema coercer** ([`schema`]): maps free-form samples onto the server's feature schema
//! - **Bulk orchestrator** ([`bulk`]): chunking, limited dispatch, positional reassembly
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use tower_predict::{BulkOptions, ClientConfig, PredictionClient};
//!
//! # async fn example() -> tower_predict::Result<()> {
//! let client = PredictionClient::new(ClientConfig::new("http://localhost:8000"))?;
//!
//! let info = client.info().await?;
//! let samples = vec![
//!     serde_json::json!({ "age_years": 57, "bmi_category": "OVERWEIGHT" })
//!         .as_object()
//!         .cloned()
//!         .unwrap_or_default(),
//! ];
//!
//! let opts = BulkOptions::new(200, 8).with_schema(info.features);
//! let predictions = client.bulk_predict(&samples, &opts).await?;
//! assert_eq!(predictions.len(), samples.len());
//! # Ok(())
//! # }
//! ```

pub mod bulk;
pub mod client;
pub mod config;
pub mod deadline;
pub mod error;
pub mod gateway;
pub mod limiter;
pub mod retry;
pub mod schema;
pub mod transport;

pub use bulk::{assemble, chunk_samples, run_chunks, BulkOptions, Chunk, ChunkOutcome};
pub use client::{ModelInfo, PredictResponse, PredictionClient, Scores};
pub use config::{BulkDefaults, ClientConfig, ConfigBuilder, RetryConfig};
pub use deadline::{guard, DeadlineLayer};
pub use error::{PredictError, Result};
pub use gateway::Gateway;
pub use limiter::{LimitLayer, Limiter, Ticket};
pub use retry::{
    is_retryable, retry_async, RetryBuilder, RetryClassifier, RetryLayer, RetryPolicy,
    StatusClassifier,
};
pub use schema::{coerce, into_sample, FeatureSchema, Sample};
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};

// Re-export Tower traits that users need
pub use tower::{Layer, Service, ServiceExt};
