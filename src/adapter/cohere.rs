//! Cohere Chat 协议适配器
//!
//! 接近 OpenAI 形状，唯一的改名是 `top_p` → `p`。
//! 响应的结束原因用 Cohere 自己的词表（`COMPLETE` / `MAX_TOKENS`）。

use super::{build_headers, ProviderAdapter, ProviderRequest};
use crate::credential::ResolvedCredential;
use crate::error::GatewayError;
use crate::protocol::{ChatMessage, ChatRequest, ChatResponse, FinishReason, Usage};
use crate::stream::StreamFormat;
use serde::{Deserialize, Serialize};

pub struct CohereAdapter;

#[derive(Debug, Serialize)]
struct CohereRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    /// Cohere 把 top_p 叫 p
    #[serde(skip_serializing_if = "Option::is_none")]
    p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<&'a [String]>,
}

#[derive(Debug, Deserialize)]
struct CohereResponse {
    message: CohereMessage,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    usage: CohereUsage,
}

#[derive(Debug, Deserialize)]
struct CohereMessage {
    #[serde(default)]
    content: Vec<CohereContentBlock>,
}

#[derive(Debug, Deserialize)]
struct CohereContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct CohereUsage {
    #[serde(default)]
    tokens: CohereTokens,
}

#[derive(Debug, Default, Deserialize)]
struct CohereTokens {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl ProviderAdapter for CohereAdapter {
    fn build_request(
        &self,
        request: &ChatRequest,
        credential: &ResolvedCredential,
    ) -> Result<ProviderRequest, GatewayError> {
        let body = CohereRequest {
            model: &credential.upstream_model,
            messages: &request.messages,
            stream: request.stream,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            p: request.top_p,
            stop_sequences: request.stop.as_deref(),
        };
        Ok(ProviderRequest {
            url: credential.url.clone(),
            headers: build_headers(credential),
            body: serde_json::to_value(body)?,
        })
    }

    fn parse_response(&self, bytes: &[u8], model: &str) -> Result<ChatResponse, GatewayError> {
        let response: CohereResponse = serde_json::from_slice(bytes)
            .map_err(|e| GatewayError::UpstreamParse(e.to_string()))?;
        let content = response
            .message
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .unwrap_or_default();
        let finish = response
            .finish_reason
            .as_deref()
            .map(FinishReason::from_provider_str)
            .unwrap_or(FinishReason::Stop);
        Ok(ChatResponse::single(
            model,
            content,
            finish,
            Usage::new(
                response.usage.tokens.input_tokens,
                response.usage.tokens.output_tokens,
            ),
        ))
    }

    fn stream_format(&self) -> StreamFormat {
        // Cohere 的流式输出按 OpenAI 风格 SSE 处理
        StreamFormat::OpenAiSse
    }
}
