//! Google Gemini 协议适配器
//!
//! 与 OpenAI 形状差异最大的一家：
//!
//! - 消息映射为 `contents`，`assistant` 角色改名 `model`，
//!   内容包成 `{parts: [{text}]}`
//! - system 消息单独成为 `systemInstruction`
//! - 采样参数挪进 `generationConfig` 并改名（`maxOutputTokens` / `topP`）
//! - API key 作为查询参数附在 URL 上，不走请求头

use super::{build_headers, ProviderAdapter, ProviderRequest};
use crate::credential::ResolvedCredential;
use crate::error::GatewayError;
use crate::protocol::{ChatRequest, ChatResponse, FinishReason, Role, Usage};
use crate::stream::StreamFormat;
use serde::{Deserialize, Serialize};

pub struct GeminiAdapter;

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent<'a>>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(rename = "stopSequences", skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: GeminiUsageMetadata,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiResponseContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiUsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
}

impl ProviderAdapter for GeminiAdapter {
    fn build_request(
        &self,
        request: &ChatRequest,
        credential: &ResolvedCredential,
    ) -> Result<ProviderRequest, GatewayError> {
        let (system, messages) = request.split_system();

        let contents = messages
            .iter()
            .map(|m| GeminiContent {
                role: Some(match m.role {
                    // assistant 在 Gemini 里叫 model
                    Role::Assistant => "model",
                    _ => "user",
                }),
                parts: vec![GeminiPart { text: &m.content }],
            })
            .collect();

        let has_sampling = request.max_tokens.is_some()
            || request.temperature.is_some()
            || request.top_p.is_some()
            || request.stop.is_some();

        let body = GeminiRequest {
            contents,
            system_instruction: system.map(|text| GeminiContent {
                role: None,
                parts: vec![GeminiPart { text }],
            }),
            generation_config: has_sampling.then(|| GeminiGenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
                top_p: request.top_p,
                stop_sequences: request.stop.clone(),
            }),
        };

        // key 走查询参数
        let separator = if credential.url.contains('?') { '&' } else { '?' };
        let url = format!(
            "{}{}key={}",
            credential.url,
            separator,
            urlencoding::encode(&credential.api_key)
        );

        Ok(ProviderRequest {
            url,
            headers: build_headers(credential),
            body: serde_json::to_value(body)?,
        })
    }

    fn parse_response(&self, bytes: &[u8], model: &str) -> Result<ChatResponse, GatewayError> {
        let response: GeminiResponse = serde_json::from_slice(bytes)
            .map_err(|e| GatewayError::UpstreamParse(e.to_string()))?;
        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::UpstreamParse("response has no candidates".to_string()))?;
        let content = candidate
            .content
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .unwrap_or_default();
        let finish = candidate
            .finish_reason
            .as_deref()
            .map(FinishReason::from_provider_str)
            .unwrap_or(FinishReason::Stop);
        Ok(ChatResponse::single(
            model,
            content,
            finish,
            Usage::new(
                response.usage_metadata.prompt_token_count,
                response.usage_metadata.candidates_token_count,
            ),
        ))
    }

    fn stream_format(&self) -> StreamFormat {
        StreamFormat::GeminiJsonLines
    }
}
