//! HTTP client for the AI microservice.

use crate::config::AiConfig;
use crate::error::{ApiError, ApiResult};
use colmeia_core::AiServiceType;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::fmt;

/// Raw result of a call that reached the AI service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiCallOutcome {
    pub status: u16,
    pub body: Vec<u8>,
}

impl AiCallOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The call never produced an HTTP response (connect failure, timeout, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiTransportError {
    pub message: String,
}

impl fmt::Display for AiTransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AI service unreachable: {}", self.message)
    }
}

impl std::error::Error for AiTransportError {}

/// Posts JSON to `{base_url}{service path}`.
#[derive(Clone)]
pub struct AiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl fmt::Debug for AiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl AiClient {
    /// Build a client from configuration. Returns `None` without a base URL.
    pub fn from_config(config: &AiConfig) -> ApiResult<Option<Self>> {
        let Some(base_url) = config.base_url.clone() else {
            return Ok(None);
        };
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::internal_error(format!("Failed to build AI client: {}", e)))?;
        Ok(Some(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn call<T: Serialize + ?Sized>(
        &self,
        service: AiServiceType,
        payload: &T,
    ) -> Result<AiCallOutcome, AiTransportError> {
        let url = format!("{}{}", self.base_url, service.endpoint_path());
        let mut request = self.http.post(&url).json(payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| AiTransportError {
            message: e.to_string(),
        })?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| AiTransportError {
            message: e.to_string(),
        })?;

        tracing::debug!(service = %service, status, bytes = body.len(), "AI service responded");
        Ok(AiCallOutcome {
            status,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_no_base_url_means_no_client() {
        let client = AiClient::from_config(&AiConfig::default()).unwrap();
        assert!(client.is_none());
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = AiConfig {
            base_url: Some("http://ai.local/".to_string()),
            api_key: Some(SecretString::from("sk-secret".to_string())),
            timeout: Duration::from_secs(1),
        };
        let client = AiClient::from_config(&config).unwrap().unwrap();
        assert_eq!(client.base_url(), "http://ai.local");
        let debug = format!("{:?}", client);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        let config = AiConfig {
            base_url: Some("http://127.0.0.1:1".to_string()),
            api_key: None,
            timeout: Duration::from_secs(2),
        };
        let client = AiClient::from_config(&config).unwrap().unwrap();
        let result = client
            .call(AiServiceType::TextSummary, &serde_json::json!({"text": "x"}))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_outcome_success_range() {
        let ok = AiCallOutcome { status: 204, body: Vec::new() };
        let bad = AiCallOutcome { status: 422, body: Vec::new() };
        assert!(ok.is_success());
        assert!(!bad.is_success());
    }
}
