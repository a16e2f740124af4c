//! LLM 모듈 - 근거 기반 답변 생성
//!
//! `LanguageModel` 트레이트와 Gemini `generateContent` 구현체입니다.
//! 스트리밍 없이 한 번의 completion만 요청하며, 모든 호출에 타임아웃이 걸립니다.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::embedding::GeminiError;
use crate::knowledge::NOT_AVAILABLE_MESSAGE;

// ============================================================================
// LanguageModel Trait
// ============================================================================

/// completion 요청
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    /// 검색된 패시지로만 구성된 컨텍스트
    pub context: String,
    pub question: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// 언어 모델 트레이트
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 단일 completion (non-streaming)
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// 모델 이름
    fn name(&self) -> &str;
}

/// 근거 기반 시스템 프롬프트
pub fn grounded_system_prompt() -> String {
    format!(
        "You are an agriculture assistant for Indian farmers.\n\
         \n\
         Rules:\n\
         1. Answer ONLY from the provided Context.\n\
         2. Do NOT use outside knowledge or make up information.\n\
         3. If the Context does not contain the answer, reply exactly:\n\
         {}\n\
         4. Do not mix information from different crops or entries.\n\
         5. Be concise and practical. Use short bullet points.",
        NOT_AVAILABLE_MESSAGE
    )
}

/// 사용자 턴 본문
pub fn user_prompt(request: &CompletionRequest) -> String {
    format!(
        "Context:\n{}\n\nQuestion: {}\n\nAnswer:",
        request.context, request.question
    )
}

// ============================================================================
// Gemini Chat
// ============================================================================

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini generateContent 구현체
#[derive(Debug)]
pub struct GeminiChat {
    api_key: String,
    model: String,
    top_p: f32,
    client: reqwest::Client,
}

impl GeminiChat {
    /// 설정으로 생성
    pub fn new(config: &LlmConfig, timeout: Duration) -> Result<Self> {
        if config.api_key.is_empty() {
            anyhow::bail!("Gemini API key is empty");
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            top_p: config.top_p,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", GEMINI_API_BASE, self.model)
    }

    fn build_request(&self, request: &CompletionRequest) -> GenerateRequest {
        GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: request.system_prompt.clone(),
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: user_prompt(request),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                top_p: self.top_p,
                max_output_tokens: request.max_tokens,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateResponse {
    /// 첫 후보의 텍스트 파트를 이어붙임
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for GeminiChat {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = self.build_request(request);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send completion request")?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read completion response")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<GeminiError>(&text) {
                anyhow::bail!(
                    "Gemini API error ({}): {}",
                    error.error.status,
                    error.error.message
                );
            }
            anyhow::bail!("Gemini API error ({}): {}", status, text);
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&text).context("Failed to parse completion response")?;
        Ok(parsed.text().trim().to_string())
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: grounded_system_prompt(),
            context: "Tomato (Fertilizer):\nApply DAP at planting.".to_string(),
            question: "Which fertilizer for tomato?".to_string(),
            temperature: 0.2,
            max_tokens: 500,
        }
    }

    #[test]
    fn test_system_prompt_contains_sentinel() {
        assert!(grounded_system_prompt().contains(NOT_AVAILABLE_MESSAGE));
    }

    #[test]
    fn test_request_body_shape() {
        let chat = GeminiChat::new(
            &LlmConfig::gemini("fake_key".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        let json = serde_json::to_value(chat.build_request(&request())).unwrap();

        assert!(json["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("ONLY"));
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["contents"][0]["role"], "user");
        assert!(json["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Apply DAP"));
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 500);
        assert!(chat.endpoint().ends_with("gemini-1.5-flash:generateContent"));
    }

    #[test]
    fn test_parse_response_text() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Use "},{"text":"DAP."}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.text(), "Use DAP.");

        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.text(), "");
    }

    #[test]
    fn test_empty_key_rejected() {
        let config = LlmConfig::gemini(String::new());
        assert!(GeminiChat::new(&config, Duration::from_secs(5)).is_err());
    }
}
