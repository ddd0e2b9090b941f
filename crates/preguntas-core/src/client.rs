use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ServiceError;

/// The remote question-answering service.
#[async_trait]
pub trait AnswerService: Send + Sync {
    /// Ask one question and return the answer text.
    async fn ask(&self, query: &str) -> Result<String, ServiceError>;

    /// Liveness probe. The payload is whatever the service reports.
    async fn health(&self) -> Result<serde_json::Value, ServiceError>;
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    response: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: serde_json::Value,
}

/// Pull `detail` out of an error body. Validation errors carry a list or
/// object there, which is shown as its JSON text.
fn error_detail(body: &str) -> Option<String> {
    let body: ErrorBody = serde_json::from_str(body).ok()?;
    match body.detail {
        serde_json::Value::Null => None,
        serde_json::Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

#[derive(Clone)]
pub struct HttpAnswerClient {
    client: Client,
    base_url: String,
}

impl HttpAnswerClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl AnswerService for HttpAnswerClient {
    async fn ask(&self, query: &str) -> Result<String, ServiceError> {
        let url = format!("{}/qa/query", self.base_url);
        debug!(%url, "sending query");

        let response = self
            .client
            .post(&url)
            .json(&QueryRequest { query })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(&body);
            warn!(status = status.as_u16(), ?detail, "answer service rejected query");
            return Err(ServiceError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        let body = response.text().await?;
        let answer: QueryResponse = serde_json::from_str(&body)
            .map_err(|e| ServiceError::MalformedPayload(e.to_string()))?;
        Ok(answer.response)
    }

    async fn health(&self) -> Result<serde_json::Value, ServiceError> {
        let url = format!("{}/health", self.base_url);

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                detail: None,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ServiceError::MalformedPayload(e.to_string()))
    }
}
