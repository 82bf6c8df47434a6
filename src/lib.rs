//! modelgate - 模型路由与协议规范化网关
//!
//! 将 OpenAI 兼容、Anthropic、Google Gemini、Cohere 四类上游协议
//! 折叠为一套规范化的请求/响应/流式格式：
//!
//! - `credential`: 凭证与端点的多层回退解析
//! - `scoring`: 按查询意图对目录模型打分并做多 Provider 多样性选择
//! - `adapter`: 每个 Provider 一个协议适配器（构建请求 / 解析响应）
//! - `stream`: 增量流式转码（字节缓冲 → 规范化块 → SSE）
//! - `gateway`: 单请求编排（认证 → 解析 → 分发 → 流式/缓冲）
//! - `server`: axum HTTP 入口

pub mod adapter;
pub mod catalog;
pub mod config;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod logger;
pub mod protocol;
pub mod scoring;
pub mod server;
pub mod stream;

pub use error::GatewayError;
pub use protocol::{ChatMessage, ChatRequest, ChatResponse, FinishReason, Role, StreamChunk, Usage};

use serde::{Deserialize, Serialize};

/// 上游 Provider 类型
///
/// `Internal` 是走 OpenAI 兼容协议的内部网关，复用 OpenAI 适配器。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI 及兼容服务
    OpenAi,
    /// Anthropic
    Anthropic,
    /// Google Gemini
    Gemini,
    /// Cohere
    Cohere,
    /// 内部网关（OpenAI 兼容）
    Internal,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Gemini => "gemini",
            Provider::Cohere => "cohere",
            Provider::Internal => "internal",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 通配符模式匹配
///
/// 支持的模式：
/// - 精确匹配: `claude-sonnet-4-5`
/// - 前缀匹配: `claude-*`
/// - 后缀匹配: `*-preview`
/// - 包含匹配: `*flash*`
/// - 前缀+后缀: `claude-*-preview`
///
/// 用于虚拟 key 的模型授权范围判断。
pub fn pattern_matches(pattern: &str, model: &str) -> bool {
    // 精确匹配
    if !pattern.contains('*') {
        return pattern == model;
    }

    // 通配符匹配
    let parts: Vec<&str> = pattern.split('*').collect();

    match parts.as_slice() {
        // 前缀匹配: `claude-*`
        [prefix, ""] => model.starts_with(prefix),
        // 后缀匹配: `*-preview`
        ["", suffix] => model.ends_with(suffix),
        // 包含匹配: `*flash*`
        ["", middle, ""] => model.contains(middle),
        // 前缀+后缀匹配: `claude-*-preview`
        [prefix, suffix] => model.starts_with(prefix) && model.ends_with(suffix),
        // 其他复杂模式暂不支持
        _ => false,
    }
}
