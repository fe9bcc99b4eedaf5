use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::config::SeedTarget;
use crate::fixture::Dataset;
use crate::seed::{seed, SeedError, SeedReport};
use crate::store::RecordStore;

#[derive(Error, Debug)]
pub enum InvokeError {
    #[error(transparent)]
    Seed(#[from] SeedError),
    #[error("Seed worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("Seed endpoint request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Seed endpoint returned {status}: {cause}")]
    Rejected { status: u16, cause: String },
    #[error("Seed invocation timed out after {0:?}")]
    TimedOut(Duration),
}

/// How the provisioning trigger reaches the seed routine.
#[async_trait]
pub trait SeedInvoker: Send + Sync {
    async fn invoke(&self) -> Result<SeedReport, InvokeError>;
}

/// Runs the seed routine in this process on a blocking worker thread.
pub struct LocalSeedInvoker {
    store: Arc<dyn RecordStore>,
    dataset: Arc<Dataset>,
}

impl LocalSeedInvoker {
    pub fn new(store: Arc<dyn RecordStore>, dataset: Arc<Dataset>) -> Self {
        Self { store, dataset }
    }
}

#[async_trait]
impl SeedInvoker for LocalSeedInvoker {
    async fn invoke(&self) -> Result<SeedReport, InvokeError> {
        let store = Arc::clone(&self.store);
        let dataset = Arc::clone(&self.dataset);
        let report = tokio::task::spawn_blocking(move || seed(store.as_ref(), &dataset, Utc::now())).await??;
        Ok(report)
    }
}

/// Calls a seed endpoint served by another process (`POST <endpoint>`).
pub struct RemoteSeedInvoker {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteSeedInvoker {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl SeedInvoker for RemoteSeedInvoker {
    async fn invoke(&self) -> Result<SeedReport, InvokeError> {
        info!(endpoint = %self.endpoint, "Invoking remote seed function");
        let response = self.client.post(&self.endpoint).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<SeedReport>().await?);
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let cause = body["cause"]
            .as_str()
            .or_else(|| body["error"].as_str())
            .unwrap_or("no details")
            .to_string();
        Err(InvokeError::Rejected {
            status: status.as_u16(),
            cause,
        })
    }
}

/// Picks the invoker named by the configured seed-function reference.
pub fn invoker_for(
    target: &SeedTarget,
    store: Arc<dyn RecordStore>,
    dataset: Arc<Dataset>,
    client: reqwest::Client,
) -> Arc<dyn SeedInvoker> {
    match target {
        SeedTarget::Local => Arc::new(LocalSeedInvoker::new(store, dataset)),
        SeedTarget::Remote(url) => Arc::new(RemoteSeedInvoker::new(client, url.clone())),
    }
}
