//! Anthropic Messages 协议适配器
//!
//! 与 OpenAI 形状的三处关键差异：
//!
//! - system 消息提升为顶层 `system` 字段
//! - `max_tokens` 必填，调用方没给时默认 4096（Anthropic 缺它会拒绝请求）
//! - 鉴权走 `x-api-key` 头，没有 Bearer 前缀

use super::{build_headers, ProviderAdapter, ProviderRequest};
use crate::credential::ResolvedCredential;
use crate::error::GatewayError;
use crate::protocol::{ChatMessage, ChatRequest, ChatResponse, FinishReason, Usage};
use crate::stream::StreamFormat;
use serde::{Deserialize, Serialize};

/// 调用方未指定时的输出上限
const DEFAULT_MAX_TOKENS: u32 = 4096;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter;

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<&'a ChatMessage>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<&'a [String]>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl ProviderAdapter for AnthropicAdapter {
    fn build_request(
        &self,
        request: &ChatRequest,
        credential: &ResolvedCredential,
    ) -> Result<ProviderRequest, GatewayError> {
        let (system, messages) = request.split_system();
        let body = AnthropicRequest {
            model: &credential.upstream_model,
            system,
            messages,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            stream: request.stream,
            temperature: request.temperature,
            top_p: request.top_p,
            stop_sequences: request.stop.as_deref(),
        };

        let mut headers = build_headers(credential);
        if !headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("anthropic-version"))
        {
            headers.push(("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()));
        }

        Ok(ProviderRequest {
            url: credential.url.clone(),
            headers,
            body: serde_json::to_value(body)?,
        })
    }

    fn parse_response(&self, bytes: &[u8], model: &str) -> Result<ChatResponse, GatewayError> {
        let response: AnthropicResponse = serde_json::from_slice(bytes)
            .map_err(|e| GatewayError::UpstreamParse(e.to_string()))?;
        let content = response
            .content
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::UpstreamParse("response has no content".to_string()))?
            .text;
        let finish = response
            .stop_reason
            .as_deref()
            .map(FinishReason::from_provider_str)
            .unwrap_or(FinishReason::Stop);
        Ok(ChatResponse::single(
            model,
            content,
            finish,
            Usage::new(response.usage.input_tokens, response.usage.output_tokens),
        ))
    }

    fn stream_format(&self) -> StreamFormat {
        StreamFormat::AnthropicSse
    }
}
