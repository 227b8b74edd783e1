//! Gemini API client
//!
//! Uses a long-lived reqwest::Client for connection pooling.
//! One attempt per call; retries are left to callers.

use crate::config::ClientConfig;
use crate::error::InsightError;
use crate::generator::{
    prompt_digest, GenerationOutcome, GenerationRequest, TextGenerator, UNABLE_TO_GENERATE,
};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    config: ClientConfig,
}

impl GeminiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self { client, config })
    }

    pub fn build_request(&self, prompt: &str, max_tokens: u32) -> GenerationRequest {
        GenerationRequest::new(prompt, max_tokens, self.config.sampling)
    }

    /// Send one request. Transport and status failures are returned as errors.
    pub async fn try_generate(&self, request: &GenerationRequest) -> Result<String> {
        if self.config.api_key.trim().is_empty() {
            return Err(InsightError::Config(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = self.config.endpoint();
        let payload = GeminiRequest::from(request);

        debug!(
            model = %self.config.model,
            prompt_digest = %prompt_digest(&request.prompt),
            max_tokens = request.max_tokens,
            "Calling Gemini API"
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| InsightError::from(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(InsightError::Generation(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let body: GeminiResponse = response.json().await.map_err(|e| {
            InsightError::Generation(format!("Gemini parse error: {}", e.without_url()))
        })?;

        match extract_text(body) {
            Some(text) => {
                info!(chars = text.len(), "Gemini response received");
                Ok(text)
            }
            None => Ok(UNABLE_TO_GENERATE.to_string()),
        }
    }

    /// Same as `try_generate` but never fails; the error is logged and kept
    pub async fn generate_outcome(&self, prompt: &str, max_tokens: u32) -> GenerationOutcome {
        let request = self.build_request(prompt, max_tokens);
        match self.try_generate(&request).await {
            Ok(text) => GenerationOutcome::Text(text),
            Err(e) => {
                error!("Error calling Gemini API: {}", e);
                GenerationOutcome::Failed(e)
            }
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> String {
        self.generate_outcome(prompt, max_tokens).await.into_text()
    }
}

/// First text part of the first candidate, if any
fn extract_text(response: GeminiResponse) -> Option<String> {
    response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .next()?
        .text
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

impl From<&GenerationRequest> for GeminiRequest {
    fn from(request: &GenerationRequest) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(request.prompt.clone()),
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.sampling.temperature,
                top_p: request.sampling.top_p,
                top_k: request.sampling.top_k,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SamplingParams;
    use crate::generator::{is_failure_sentinel, ERROR_MARKER};

    #[test]
    fn test_request_serialization() {
        let request = GenerationRequest::new("What is compound interest?", 2048, SamplingParams::default());
        let json = serde_json::to_value(GeminiRequest::from(&request)).unwrap();

        assert_eq!(
            json["contents"][0]["parts"][0]["text"],
            "What is compound interest?"
        );
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
        assert_eq!(json["generationConfig"]["topK"], 40);
        assert!((json["generationConfig"]["topP"].as_f64().unwrap() - 0.8).abs() < 1e-6);
        assert!((json["generationConfig"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_extract_text_from_candidate() {
        let body: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"₹525"}],"role":"model"},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(body), Some("₹525".to_string()));
    }

    #[test]
    fn test_extract_text_missing_candidates() {
        let body: GeminiResponse = serde_json::from_str(r#"{"promptFeedback":{}}"#).unwrap();
        assert_eq!(extract_text(body), None);

        let body: GeminiResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert_eq!(extract_text(body), None);

        let body: GeminiResponse =
            serde_json::from_str(r#"{"candidates":[{"content":{"parts":[]}}]}"#).unwrap();
        assert_eq!(extract_text(body), None);
    }

    #[tokio::test]
    async fn test_missing_api_key_returns_sentinel() {
        let client = GeminiClient::new(ClientConfig::default()).unwrap();
        let reply = client.generate("anything", 64).await;

        assert!(reply.starts_with(ERROR_MARKER));
        assert!(reply.to_lowercase().contains("gemini_api_key"));
    }

    #[tokio::test]
    async fn test_transport_error_returns_sentinel() {
        let config = ClientConfig {
            api_key: "test-key".to_string(),
            base_url: "http://127.0.0.1:1/v1beta/models".to_string(),
            ..ClientConfig::default()
        };
        let client = GeminiClient::new(config).unwrap();

        let reply = client.generate("anything", 64).await;
        assert!(is_failure_sentinel(&reply));
        assert!(reply.starts_with(ERROR_MARKER));
    }

    #[tokio::test]
    async fn test_api_key_never_in_failure_reply() {
        let key = "SUPER-SECRET-KEY";
        let config = ClientConfig {
            api_key: key.to_string(),
            base_url: "http://127.0.0.1:1/v1beta/models".to_string(),
            ..ClientConfig::default()
        };
        let client = GeminiClient::new(config).unwrap();

        let outcome = client.generate_outcome("anything", 64).await;
        assert!(matches!(outcome, GenerationOutcome::Failed(_)));
        let reply = outcome.into_text();
        assert!(reply.starts_with(ERROR_MARKER));
        assert!(!reply.contains(key));
        assert!(!reply.contains("127.0.0.1"));
    }
}
