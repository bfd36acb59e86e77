//! Oracle capability: structured request in, raw text out
//!
//! The oracle enforces no schema; all validation of its reply belongs to
//! the decision adapter.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// One oracle request: instructions, serialized market context and an
/// optional chart image.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub instructions: String,
    pub context: String,
    pub image_png: Option<Vec<u8>>,
}

#[async_trait]
pub trait Oracle: Send + Sync {
    async fn generate(&self, request: &OracleRequest) -> anyhow::Result<String>;
}

/// Gemini generateContent REST client
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    /// Override the API endpoint (tests)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl Oracle for GeminiClient {
    async fn generate(&self, request: &OracleRequest) -> anyhow::Result<String> {
        let mut parts = vec![Part {
            text: Some(format!("{}\n\n{}", request.instructions, request.context)),
            inline_data: None,
        }];
        if let Some(image) = &request.image_png {
            parts.push(Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: "image/png".to_string(),
                    data: BASE64.encode(image),
                }),
            });
        }

        let body = GenerateRequest {
            contents: vec![Content { parts }],
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("oracle request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("oracle call failed: {} - {}", status, text));
        }

        let payload: GenerateResponse = response.json().await.context("invalid oracle payload")?;
        payload
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow::anyhow!("oracle reply carried no text"))
    }
}
