//! GraphQL-over-HTTP transport.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::request::MergedQuery;
use crate::transport::SyncTransport;

/// HTTP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpTransportConfig {
    /// GraphQL endpoint (e.g. `https://example.appsync-api.us-east-1.amazonaws.com/graphql`).
    pub endpoint: String,
    /// Static headers sent with every request (API keys and the like).
    pub headers: HashMap<String, String>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:20002/graphql".to_string(),
            headers: HashMap::new(),
            timeout_ms: 30_000,
        }
    }
}

/// Posts composite queries as `{"query", "variables"}` JSON.
pub struct HttpTransport {
    config: HttpTransportConfig,
    client: Client,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| SyncError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

fn map_reqwest(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Timeout
    } else {
        SyncError::Network(e.to_string())
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn execute(&self, query: &MergedQuery) -> SyncResult<Value> {
        let body = json!({
            "query": query.document,
            "variables": query.variables,
        });

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        debug!(endpoint = %self.config.endpoint, models = query.children.len(), "executing sync query");
        let resp = request.send().await.map_err(map_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(SyncError::Network(format!("HTTP {status}: {text}")));
        }

        let text = resp.text().await.map_err(map_reqwest)?;
        serde_json::from_str(&text)
            .map_err(|e| SyncError::Protocol(format!("response is not JSON: {e}")))
    }
}
