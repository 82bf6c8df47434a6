//! Provider 协议适配器
//!
//! 每个 Provider 一个适配器，实现同一套接口：构建上游请求、
//! 解析非流式响应、声明流式格式（流式翻译由 `stream::transcoder`
//! 承担）。适配器按 Provider 查表选择一次，之后不再做字符串分支。
//!
//! 上游载荷全部走类型化结构：畸形响应在适配器边界以
//! `UpstreamParse` 失败，而不是把缺失字段悄悄传进规范化类型。

mod anthropic;
mod cohere;
mod gemini;
mod openai;

pub use anthropic::AnthropicAdapter;
pub use cohere::CohereAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;

use crate::credential::ResolvedCredential;
use crate::error::GatewayError;
use crate::protocol::{ChatRequest, ChatResponse};
use crate::stream::StreamFormat;
use crate::Provider;

/// 构建完成的上游请求
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// 完整 URL（Gemini 的 key 已作为查询参数附在其后）
    pub url: String,
    /// 请求头（含鉴权头与额外静态头）
    pub headers: Vec<(String, String)>,
    /// JSON 请求体
    pub body: serde_json::Value,
}

/// Provider 适配器接口
pub trait ProviderAdapter: Send + Sync {
    /// 把规范化请求翻译成上游请求
    fn build_request(
        &self,
        request: &ChatRequest,
        credential: &ResolvedCredential,
    ) -> Result<ProviderRequest, GatewayError>;

    /// 解析非流式上游响应体
    ///
    /// `model` 是对外的规范模型名，写回响应。
    fn parse_response(&self, bytes: &[u8], model: &str) -> Result<ChatResponse, GatewayError>;

    /// 该 Provider 的流式帧格式
    fn stream_format(&self) -> StreamFormat;
}

/// 按 Provider 查表取适配器
///
/// 内部网关走 OpenAI 兼容协议，复用 OpenAI 适配器。
pub fn adapter_for(provider: Provider) -> &'static dyn ProviderAdapter {
    static OPENAI: OpenAiAdapter = OpenAiAdapter;
    static ANTHROPIC: AnthropicAdapter = AnthropicAdapter;
    static GEMINI: GeminiAdapter = GeminiAdapter;
    static COHERE: CohereAdapter = CohereAdapter;
    match provider {
        Provider::OpenAi | Provider::Internal => &OPENAI,
        Provider::Anthropic => &ANTHROPIC,
        Provider::Gemini => &GEMINI,
        Provider::Cohere => &COHERE,
    }
}

/// 组装鉴权头与额外静态头
///
/// 鉴权头缺失（Gemini，key 走查询参数）时只附加额外头。
pub(crate) fn build_headers(credential: &ResolvedCredential) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    if let Some(name) = &credential.auth_header {
        headers.push((
            name.clone(),
            format!("{}{}", credential.auth_prefix, credential.api_key),
        ));
    }
    for (name, value) in &credential.extra_headers {
        headers.push((name.clone(), value.clone()));
    }
    headers
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use indexmap::IndexMap;

    /// 测试用的已解析凭证
    pub fn resolved(provider: Provider, url: &str) -> ResolvedCredential {
        let (auth_header, auth_prefix) = match provider {
            Provider::Anthropic => (Some("x-api-key".to_string()), String::new()),
            Provider::Gemini => (None, String::new()),
            _ => (Some("Authorization".to_string()), "Bearer ".to_string()),
        };
        ResolvedCredential {
            provider,
            upstream_model: "upstream-model".to_string(),
            api_key: "test-key".to_string(),
            url: url.to_string(),
            auth_header,
            auth_prefix,
            extra_headers: IndexMap::new(),
        }
    }
}
