//! Gemini vision client.
//! Sends an instruction prompt plus inline JPEG images to the
//! `generateContent` endpoint and returns the model's raw text.
//! Latency: network + inference, typically 2-8s for two images.
//! Requires GEMINI_API_KEY environment variable.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const TIMEOUT_SECS: u64 = 30;

/// Default model route: higher-tier first, quota failures fall back to
/// the flash tier once.
pub const DEFAULT_MODEL: &str = "gemini-1.5-pro-latest";
pub const DEFAULT_FALLBACK_MODEL: &str = "gemini-1.5-flash";

// *************** Request/Response Types ***************

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

// *************** Errors ***************

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("request to Gemini failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Gemini API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Gemini returned no candidates")]
    EmptyResponse,
}

impl VisionError {
    /// Quota/rate-limit classification. Checks the structured HTTP status
    /// first; the body marker catches quota errors Gemini reports inside
    /// a 200-level envelope.
    pub fn is_quota(&self) -> bool {
        match self {
            VisionError::Api { status, body } => {
                *status == 429 || body.contains("RESOURCE_EXHAUSTED")
            }
            _ => false,
        }
    }
}

// *************** Public API ***************

/// Seam between the turn processor and the external model. Tests swap in
/// canned responses here so they never touch the network.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Sends `prompt` plus JPEG `images` to the model, returns raw text.
    async fn generate(&self, prompt: &str, images: &[Vec<u8>]) -> Result<String, VisionError>;
}

pub struct GeminiClient {
    http: Client,
    api_key: String,
    /// Ordered model routes. On a quota-classified failure the call
    /// advances to the next route; any other failure surfaces as-is.
    routes: Vec<String>,
}

impl GeminiClient {
    pub fn new(api_key: String, routes: Vec<String>) -> anyhow::Result<Self> {
        anyhow::ensure!(!routes.is_empty(), "at least one model route is required");
        let http = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, api_key, routes })
    }

    async fn call_model(&self, model: &str, request: &GenerateRequest) -> Result<String, VisionError> {
        let url = format!("{API_BASE}/{model}:generateContent");
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(VisionError::Api { status, body });
        }

        let parsed: GenerateResponse = response.json().await?;
        first_text(parsed)
    }
}

#[async_trait]
impl VisionBackend for GeminiClient {
    async fn generate(&self, prompt: &str, images: &[Vec<u8>]) -> Result<String, VisionError> {
        let request = build_request(prompt, images);

        let mut last_error = None;
        for (i, model) in self.routes.iter().enumerate() {
            match self.call_model(model, &request).await {
                Ok(text) => {
                    tracing::debug!(model, "model call succeeded");
                    return Ok(text);
                }
                Err(e) if e.is_quota() && i + 1 < self.routes.len() => {
                    tracing::warn!(model, next = %self.routes[i + 1], "quota exceeded, falling back");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        // Quota exhausted on every route.
        Err(last_error.unwrap_or(VisionError::EmptyResponse))
    }
}

// *************** Internal Functions ***************

fn build_request(prompt: &str, images: &[Vec<u8>]) -> GenerateRequest {
    let mut parts = vec![Part::Text {
        text: prompt.to_string(),
    }];
    for image in images {
        parts.push(Part::InlineData {
            inline_data: InlineData {
                mime_type: "image/jpeg".to_string(),
                data: general_purpose::STANDARD.encode(image),
            },
        });
    }
    GenerateRequest {
        contents: vec![Content { parts }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json".to_string(),
        },
    }
}

fn first_text(response: GenerateResponse) -> Result<String, VisionError> {
    let text = response
        .candidates
        .into_iter()
        .next()
        .map(|c| {
            c.content
                .parts
                .into_iter()
                .map(|p| p.text)
                .collect::<String>()
        })
        .ok_or(VisionError::EmptyResponse)?;
    if text.is_empty() {
        return Err(VisionError::EmptyResponse);
    }
    Ok(text)
}

// *************** Tests ***************
