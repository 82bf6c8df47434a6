//! OpenAI 兼容协议适配器
//!
//! 规范化协议本身就是 OpenAI 形状，请求基本透传：
//! 模型名换成上游 ID，采样参数原样带过去。

use super::{build_headers, ProviderAdapter, ProviderRequest};
use crate::credential::ResolvedCredential;
use crate::error::GatewayError;
use crate::protocol::{ChatRequest, ChatResponse, FinishReason, Usage};
use crate::stream::StreamFormat;
use serde::{Deserialize, Serialize};

pub struct OpenAiAdapter;

/// 上游请求体
#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [crate::protocol::ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

/// 上游响应体
#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: OpenAiUsage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl ProviderAdapter for OpenAiAdapter {
    fn build_request(
        &self,
        request: &ChatRequest,
        credential: &ResolvedCredential,
    ) -> Result<ProviderRequest, GatewayError> {
        let body = OpenAiRequest {
            model: &credential.upstream_model,
            messages: &request.messages,
            stream: request.stream,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            stop: request.stop.as_deref(),
        };
        Ok(ProviderRequest {
            url: credential.url.clone(),
            headers: build_headers(credential),
            body: serde_json::to_value(body)?,
        })
    }

    fn parse_response(&self, bytes: &[u8], model: &str) -> Result<ChatResponse, GatewayError> {
        let response: OpenAiResponse = serde_json::from_slice(bytes)
            .map_err(|e| GatewayError::UpstreamParse(e.to_string()))?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::UpstreamParse("response has no choices".to_string()))?;
        let finish = choice
            .finish_reason
            .as_deref()
            .map(FinishReason::from_provider_str)
            .unwrap_or(FinishReason::Stop);
        Ok(ChatResponse::single(
            model,
            choice.message.content,
            finish,
            Usage::new(response.usage.prompt_tokens, response.usage.completion_tokens),
        ))
    }

    fn stream_format(&self) -> StreamFormat {
        StreamFormat::OpenAiSse
    }
}
