use crate::core::{InferenceClient, InferenceConnector};
use crate::domain::model::{AnalysisSettings, Credential};
use crate::utils::error::{AnalysisError, Result};
use crate::utils::validation::validate_url;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

const API_KEY_HEADER: &str = "x-goog-api-key";
const ERROR_EXCERPT_LEN: usize = 300;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Builds [`GeminiClient`]s from a credential and the shared settings.
#[derive(Debug, Clone)]
pub struct GeminiConnector {
    settings: AnalysisSettings,
}

impl GeminiConnector {
    pub fn new(settings: AnalysisSettings) -> Self {
        Self { settings }
    }
}

impl InferenceConnector for GeminiConnector {
    type Client = GeminiClient;

    fn connect(&self, credential: &Credential) -> Result<GeminiClient> {
        GeminiClient::new(credential, &self.settings)
    }
}

/// `generateContent` client. The key travels only in a header so it never
/// shows up in URLs or in `reqwest` error messages.
pub struct GeminiClient {
    client: reqwest::Client,
    url: String,
}

impl GeminiClient {
    pub fn new(credential: &Credential, settings: &AnalysisSettings) -> Result<Self> {
        let key = credential.expose().trim();
        if key.is_empty() {
            return Err(AnalysisError::ConfigError {
                message: "API key is empty".to_string(),
            });
        }

        let mut key_value = HeaderValue::from_str(key).map_err(|_| AnalysisError::ConfigError {
            message: "API key contains characters that cannot be sent in a header".to_string(),
        })?;
        key_value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(API_KEY_HEADER), key_value);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        validate_url("model.endpoint", &settings.endpoint).map_err(|e| {
            AnalysisError::ConfigError {
                message: e.to_string(),
            }
        })?;

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| AnalysisError::ConfigError {
            message: format!("Failed to build HTTP client: {}", e),
        })?;

        let url = format!(
            "{}/models/{}:generateContent",
            settings.endpoint.trim_end_matches('/'),
            settings.model.trim()
        );

        Ok(Self { client, url })
    }

    fn extract_text(response: GenerateResponse) -> Result<String> {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(AnalysisError::malformed(format!("prompt blocked: {}", reason)));
        }

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AnalysisError::malformed("response has no candidates"))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
            return Err(AnalysisError::malformed(format!(
                "empty response (finish reason: {})",
                reason
            )));
        }
        Ok(text)
    }
}

#[async_trait]
impl InferenceClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        tracing::debug!("POST {}", self.url);
        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        tracing::debug!("Inference response status: {}", status);

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&text)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| text.chars().take(ERROR_EXCERPT_LEN).collect());
            return Err(AnalysisError::InferenceStatus {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        Self::extract_text(parsed)
    }
}
