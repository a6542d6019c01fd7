use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::GeminiConfig;
use crate::error::{OverlayError, Result};
use crate::models::{Contents, GenerationRequest, GenerationResponse, Part, ReasoningEffort};
use crate::translator::Tier;

#[cfg(test)]
use mockall::automock;

/// One call to the external generation service. Implementations make exactly one
/// attempt; retries, if any, belong to the caller.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResponse>;
}

pub struct GeminiTransport {
    client: Client,
    api_key: String,
    base_url: String,
    model_fast: String,
    model_vision: String,
}

impl GeminiTransport {
    pub fn new(cfg: &GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| OverlayError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: cfg.api_key.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model_fast: cfg.model_fast.clone(),
            model_vision: cfg.model_vision.clone(),
        })
    }

    fn model_name(&self, tier: Tier) -> &str {
        match tier {
            Tier::Fast => &self.model_fast,
            Tier::Vision => &self.model_vision,
        }
    }

    fn endpoint(&self, tier: Tier) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url,
            self.model_name(tier)
        )
    }
}

#[async_trait]
impl Transport for GeminiTransport {
    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResponse> {
        let start_time = Instant::now();
        let url = self.endpoint(req.model);
        let body = GeminiRequest::from(req);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(OverlayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = parse_response(&response.bytes().await?)?;

        tracing::debug!(
            model = self.model_name(req.model),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Gemini generateContent completed"
        );

        Ok(parsed)
    }
}

fn parse_response(body: &[u8]) -> Result<GenerationResponse> {
    let parsed: GeminiResponse = serde_json::from_slice(body)?;
    Ok(parsed.into())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiRequest<'a> {
    system_instruction: WireContent<'a>,
    contents: Vec<WireContent<'a>>,
    generation_config: WireGenerationConfig,
}

#[derive(Debug, Serialize)]
struct WireContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<WirePart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WirePart<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: WireBlob<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireBlob<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    thinking_config: WireThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireThinkingConfig {
    thinking_budget: u32,
}

impl<'a> From<&'a GenerationRequest> for GeminiRequest<'a> {
    fn from(req: &'a GenerationRequest) -> Self {
        let parts = match &req.contents {
            Contents::Text(text) => vec![WirePart::Text { text }],
            Contents::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    Part::Inline { mime_type, data } => WirePart::Inline {
                        inline_data: WireBlob { mime_type, data },
                    },
                    Part::Text(text) => WirePart::Text { text },
                })
                .collect(),
        };

        let thinking_budget = match req.reasoning_effort {
            ReasoningEffort::Disabled => 0,
        };

        Self {
            system_instruction: WireContent {
                role: None,
                parts: vec![WirePart::Text {
                    text: &req.system_instruction,
                }],
            },
            contents: vec![WireContent {
                role: Some("user"),
                parts,
            }],
            generation_config: WireGenerationConfig {
                temperature: req.temperature,
                max_output_tokens: req.max_output_tokens,
                thinking_config: WireThinkingConfig { thinking_budget },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
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

impl From<GeminiResponse> for GenerationResponse {
    /// Text of the first candidate, concatenated across its text parts.
    fn from(resp: GeminiResponse) -> Self {
        let texts: Vec<String> = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if texts.is_empty() {
            GenerationResponse { text: None }
        } else {
            GenerationResponse {
                text: Some(texts.concat()),
            }
        }
    }
}
