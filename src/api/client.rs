use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::api::models::{
    ChatRequest, ChatResponse, HistoricalRecord, PredictResponse, StatLine, CHAT_ENDPOINT,
    DATA_ENDPOINT, PREDICT_ENDPOINT,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:5001";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Request to {endpoint} timed out")]
    Timeout { endpoint: &'static str },
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },
    #[error("{endpoint} response is missing '{field}'")]
    ContractViolation {
        endpoint: &'static str,
        field: &'static str,
    },
}

impl FetchError {
    /// 応答は届いたが期待したフィールドが無い
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, FetchError::ContractViolation { .. })
    }

    /// 応答そのものが得られなかった（タイムアウト・HTTPエラー含む）
    pub fn is_transport(&self) -> bool {
        !self.is_contract_violation()
    }
}

/// Contract of the prediction/chat service.
#[async_trait]
pub trait PredictionApi: Send + Sync {
    async fn predict(&self, stats: &StatLine) -> Result<PredictResponse, FetchError>;

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, FetchError>;

    async fn fetch_history(&self) -> Result<Vec<HistoricalRecord>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpPredictionClient {
    pub base_url: String,
    pub timeout: Duration,
    pub http_client: reqwest::Client,
}

impl HttpPredictionClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        tracing::debug!(
            base_url = %base_url,
            timeout_ms = timeout.as_millis() as u64,
            "🌐 HTTP client ready"
        );

        Ok(Self {
            base_url,
            timeout,
            http_client,
        })
    }

    pub fn with_defaults() -> Result<Self, FetchError> {
        Self::new(DEFAULT_BASE_URL, Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn post_json<B: Serialize + Sync>(
        &self,
        endpoint: &'static str,
        body: &B,
    ) -> Result<Value, FetchError> {
        let response = self
            .http_client
            .post(self.url(endpoint))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| classify(endpoint, e))?;

        read_body(endpoint, response).await
    }
}

#[async_trait]
impl PredictionApi for HttpPredictionClient {
    async fn predict(&self, stats: &StatLine) -> Result<PredictResponse, FetchError> {
        tracing::debug!("📡 POST {}", PREDICT_ENDPOINT);
        let value = self.post_json(PREDICT_ENDPOINT, stats).await?;
        PredictResponse::from_value(value)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, FetchError> {
        tracing::debug!(
            message_len = request.message.len(),
            has_context = request.prediction_data.is_some(),
            "📡 POST {}",
            CHAT_ENDPOINT
        );
        let value = self.post_json(CHAT_ENDPOINT, request).await?;
        ChatResponse::from_value(value)
    }

    async fn fetch_history(&self) -> Result<Vec<HistoricalRecord>, FetchError> {
        tracing::debug!("📡 GET {}", DATA_ENDPOINT);
        let response = self
            .http_client
            .get(self.url(DATA_ENDPOINT))
            .send()
            .await
            .map_err(|e| classify(DATA_ENDPOINT, e))?;

        let value = read_body(DATA_ENDPOINT, response).await?;
        let records = HistoricalRecord::rows_from_value(value)?;
        tracing::debug!("📄 Received {} historical records", records.len());
        Ok(records)
    }
}

fn classify(endpoint: &'static str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        tracing::error!("❌ {} timed out", endpoint);
        FetchError::Timeout { endpoint }
    } else {
        tracing::error!("❌ HTTP request to {} failed: {}", endpoint, error);
        FetchError::Request(error)
    }
}

/// 2xx以外はエラー、JSONとして読めない本文はnullとして扱う
async fn read_body(
    endpoint: &'static str,
    response: reqwest::Response,
) -> Result<Value, FetchError> {
    let status = response.status();
    if !status.is_success() {
        tracing::error!("❌ {} responded with status: {}", endpoint, status);
        return Err(FetchError::Status {
            endpoint,
            status: status.as_u16(),
        });
    }

    let text = response.text().await.map_err(|e| classify(endpoint, e))?;
    tracing::debug!("📄 {} response length: {} chars", endpoint, text.len());

    match serde_json::from_str(&text) {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::debug!(
                "🔍 Non-JSON body from {}: {} (preview: {})",
                endpoint,
                e,
                &text[..text.char_indices().nth(200).map(|(i, _)| i).unwrap_or(text.len())]
            );
            Ok(Value::Null)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation_trims_trailing_slash() {
        let client =
            HttpPredictionClient::new("http://localhost:5001/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url, "http://localhost:5001");
        assert_eq!(client.url(PREDICT_ENDPOINT), "http://localhost:5001/predict");
        assert_eq!(client.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_default_client() {
        let client = HttpPredictionClient::with_defaults().unwrap();
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
        assert_eq!(client.timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
    }

    #[test]
    fn test_fetch_error_classification() {
        let violation = FetchError::ContractViolation {
            endpoint: CHAT_ENDPOINT,
            field: "response",
        };
        assert!(violation.is_contract_violation());
        assert!(!violation.is_transport());
        assert!(violation.to_string().contains("'response'"));

        let status = FetchError::Status {
            endpoint: PREDICT_ENDPOINT,
            status: 500,
        };
        assert!(status.is_transport());
        assert!(format!("{}", status).contains("HTTP 500"));

        let timeout = FetchError::Timeout {
            endpoint: CHAT_ENDPOINT,
        };
        assert!(timeout.is_transport());
    }
}
