//! Prediction client
//!
//! Typed access to the prediction server's endpoints on top of a [`Gateway`]:
//!
//! - `GET /info` returns model metadata and the feature schema
//! - `POST /predict` accepts one record or an array of records and answers
//!   `{ "predictions": [..] }` in submission order

use serde::{Deserialize, Serialize};

use crate::bulk::{assemble, run_chunks, BulkOptions, ChunkOutcome};
use crate::config::{BulkDefaults, ClientConfig};
use crate::error::Result;
use crate::gateway::Gateway;
use crate::retry::{RetryClassifier, StatusClassifier};
use crate::schema::{FeatureSchema, Sample};
use crate::transport::{ReqwestTransport, Transport};

pub const INFO_ENDPOINT: &str = "/info";
pub const PREDICT_ENDPOINT: &str = "/predict";

/// Model metadata reported by `GET /info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub scores: Option<Scores>,
    pub features: FeatureSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    #[serde(default)]
    pub r2_best: Option<f64>,
}

/// Answer of `POST /predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predictions: Vec<f64>,
    #[serde(default)]
    pub n: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PredictionClient<T = ReqwestTransport, C = StatusClassifier> {
    gateway: Gateway<T, C>,
    defaults: BulkDefaults,
}

impl PredictionClient {
    /// Client talking HTTP to `config.base_url`.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(&config.base_url)?;
        Ok(Self::with_transport(transport, &config))
    }
}

impl<T> PredictionClient<T>
where
    T: Transport,
    T::Future: Send + 'static,
{
    /// Client over an arbitrary transport; `config.base_url` is not consulted.
    pub fn with_transport(transport: T, config: &ClientConfig) -> Self {
        Self {
            gateway: Gateway::new(transport, config.timeout, config.retry.clone()),
            defaults: config.bulk,
        }
    }
}

impl<T, C> PredictionClient<T, C>
where
    T: Transport,
    T::Future: Send + 'static,
    C: RetryClassifier + Clone,
{
    pub fn from_gateway(gateway: Gateway<T, C>, defaults: BulkDefaults) -> Self {
        Self { gateway, defaults }
    }

    pub fn gateway(&self) -> &Gateway<T, C> {
        &self.gateway
    }

    /// Bulk options seeded from the client's configured defaults.
    pub fn bulk_options(&self) -> BulkOptions {
        self.defaults.into()
    }

    pub async fn info(&self) -> Result<ModelInfo> {
        self.gateway.get(INFO_ENDPOINT).await
    }

    pub async fn predict_one(&self, sample: &Sample) -> Result<PredictResponse> {
        self.gateway.post(PREDICT_ENDPOINT, sample).await
    }

    pub async fn predict_batch(&self, samples: &[Sample]) -> Result<PredictResponse> {
        self.gateway.post(PREDICT_ENDPOINT, samples).await
    }

    /// Predict every sample; `result[i]` belongs to `samples[i]`. Any chunk
    /// that fails after its retries fails the whole call.
    pub async fn bulk_predict(&self, samples: &[Sample], opts: &BulkOptions) -> Result<Vec<f64>> {
        let outcomes = self.bulk_predict_outcomes(samples, opts).await?;
        assemble(outcomes)
    }

    /// Like [`bulk_predict`](Self::bulk_predict) but returns every chunk's
    /// outcome, so successful chunks can be kept when others fail.
    pub async fn bulk_predict_outcomes(
        &self,
        samples: &[Sample],
        opts: &BulkOptions,
    ) -> Result<Vec<ChunkOutcome>> {
        run_chunks(samples, opts, |records| self.predict_records(records)).await
    }

    async fn predict_records(&self, records: Vec<Sample>) -> Result<Vec<f64>> {
        let resp: PredictResponse = self.gateway.post(PREDICT_ENDPOINT, &records).await?;
        Ok(resp.predictions)
    }
}
