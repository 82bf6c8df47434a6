//! 统一协议类型
//!
//! 定义网关对外暴露的规范化 (canonical) 请求/响应/流式块类型。
//! 所有上游 Provider 的差异都在 adapter 层被折叠到这组类型上。
//!
//! # 设计原则
//!
//! - 请求/响应的 JSON 形状与 OpenAI Chat Completions 保持兼容
//! - `Usage` 字段永远有值（默认 0），下游统计不需要判空
//! - 流式块的不变式：非空 delta 不携带 finish_reason；
//!   携带 finish_reason 的块 delta 必须为空

use serde::{Deserialize, Serialize};

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 系统提示
    System,
    /// 用户消息
    User,
    /// 助手回复
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// 单条对话消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// 角色
    pub role: Role,
    /// 文本内容
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// 规范化聊天请求
///
/// `model` 是面向调用方的规范名，不是上游模型 ID；
/// 两者的映射由 catalog + credential resolver 完成。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// 规范模型名
    pub model: String,
    /// 有序消息列表
    pub messages: Vec<ChatMessage>,
    /// 是否流式返回
    #[serde(default)]
    pub stream: bool,
    /// 采样温度
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// 最大输出 token 数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// top-p 采样
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// 停止序列
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl ChatRequest {
    /// 提取 system 消息（如果有）
    ///
    /// 返回 system 消息内容和去掉 system 后的消息列表。
    /// Anthropic / Gemini 需要把 system 提升为独立字段时使用；
    /// OpenAI 兼容协议保持内联，不调用此方法。
    pub fn split_system(&self) -> (Option<&str>, Vec<&ChatMessage>) {
        let mut system = None;
        let mut rest = Vec::with_capacity(self.messages.len());
        for msg in &self.messages {
            if msg.role == Role::System && system.is_none() {
                system = Some(msg.content.as_str());
            } else {
                rest.push(msg);
            }
        }
        (system, rest)
    }

    /// 校验请求的基本约束
    ///
    /// - 消息列表非空
    /// - 至多一条 system 消息
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("model must not be empty".to_string());
        }
        if self.messages.is_empty() {
            return Err("messages must not be empty".to_string());
        }
        let system_count = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .count();
        if system_count > 1 {
            return Err(format!(
                "at most one system message is allowed, got {}",
                system_count
            ));
        }
        Ok(())
    }
}

/// 结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    /// 正常结束
    Stop,
    /// 达到长度上限
    Length,
    /// 上游错误
    Error,
}

impl FinishReason {
    /// 从上游 Provider 的停止原因字符串解析
    ///
    /// 不认识的值一律归为 `Stop`，保持与源系统一致。
    pub fn from_provider_str(s: &str) -> Self {
        match s {
            "stop" | "end_turn" | "STOP" | "stop_sequence" | "COMPLETE" => FinishReason::Stop,
            "length" | "max_tokens" | "MAX_TOKENS" => FinishReason::Length,
            "error" | "ERROR" => FinishReason::Error,
            _ => FinishReason::Stop,
        }
    }
}

/// Token 使用量
///
/// 字段默认 0，永远不为 null。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl Usage {
    /// 由输入/输出 token 数构造，total 自动求和
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// 响应中的单个选择
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: FinishReason,
}

/// 规范化聊天响应（非流式）
///
/// JSON 形状与 OpenAI chat.completion 兼容。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// 响应 ID
    pub id: String,
    /// 固定为 "chat.completion"
    pub object: String,
    /// Unix 秒级时间戳
    pub created: u64,
    /// 规范模型名
    pub model: String,
    /// 单个选择
    pub choices: Vec<ChatChoice>,
    /// Token 使用量
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    /// 构造单选择响应
    pub fn single(
        model: impl Into<String>,
        content: impl Into<String>,
        finish_reason: FinishReason,
        usage: Usage,
    ) -> Self {
        Self {
            id: new_response_id(),
            object: "chat.completion".to_string(),
            created: unix_timestamp(),
            model: model.into(),
            choices: vec![ChatChoice {
                index: 0,
                message: ChatMessage::assistant(content),
                finish_reason,
            }],
            usage,
        }
    }

    /// 取第一个选择的文本内容
    pub fn content(&self) -> &str {
        self.choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("")
    }
}

/// 规范化流式块
///
/// # 不变式
///
/// - `delta` 非空时 `finish_reason` 必须为 `None`
/// - 携带 `finish_reason` 的块 `delta` 必须为空字符串
/// - finish 块之后由序列化层追加 `data: [DONE]` 哨兵关闭流
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// 响应 ID
    pub id: String,
    /// 规范模型名
    pub model: String,
    /// 增量文本（可为空）
    pub delta: String,
    /// 结束原因（仅终止块携带）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl StreamChunk {
    /// 内容增量块
    pub fn delta(id: &str, model: &str, text: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            model: model.to_string(),
            delta: text.into(),
            finish_reason: None,
        }
    }

    /// 终止块（delta 为空）
    pub fn finish(id: &str, model: &str, reason: FinishReason) -> Self {
        Self {
            id: id.to_string(),
            model: model.to_string(),
            delta: String::new(),
            finish_reason: Some(reason),
        }
    }

    /// 检查块是否满足排序不变式
    pub fn is_well_formed(&self) -> bool {
        match self.finish_reason {
            Some(_) => self.delta.is_empty(),
            None => true,
        }
    }
}

/// 生成 `chatcmpl-` 前缀的响应 ID
pub fn new_response_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

/// 当前 Unix 秒级时间戳
pub fn unix_timestamp() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_empty_messages() {
        let req = ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![],
            stream: false,
            temperature: None,
            max_tokens: None,
            top_p: None,
            stop: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_validate_multiple_system_messages() {
        let req = ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![
                ChatMessage::system("a"),
                ChatMessage::system("b"),
                ChatMessage::user("hi"),
            ],
            stream: false,
            temperature: None,
            max_tokens: None,
            top_p: None,
            stop: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_split_system() {
        let req = ChatRequest {
            model: "claude-sonnet".to_string(),
            messages: vec![
                ChatMessage::system("be brief"),
                ChatMessage::user("hi"),
                ChatMessage::assistant("hello"),
            ],
            stream: false,
            temperature: None,
            max_tokens: None,
            top_p: None,
            stop: None,
        };
        let (system, rest) = req.split_system();
        assert_eq!(system, Some("be brief"));
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].role, Role::User);
    }

    #[test]
    fn test_split_system_absent() {
        let req = ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![ChatMessage::user("hi")],
            stream: false,
            temperature: None,
            max_tokens: None,
            top_p: None,
            stop: None,
        };
        let (system, rest) = req.split_system();
        assert!(system.is_none());
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn test_usage_arithmetic() {
        let usage = Usage::new(12, 30);
        assert_eq!(usage.total_tokens, 42);
    }

    #[test]
    fn test_usage_default_is_zero() {
        // usage 缺失时应反序列化为全 0，而不是 null
        let resp: ChatResponse = serde_json::from_str(
            r#"{"id":"chatcmpl-x","object":"chat.completion","created":0,"model":"m",
                "choices":[{"index":0,"message":{"role":"assistant","content":"hi"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(resp.usage, Usage::default());
    }

    #[test]
    fn test_finish_reason_from_provider_str() {
        assert_eq!(FinishReason::from_provider_str("end_turn"), FinishReason::Stop);
        assert_eq!(FinishReason::from_provider_str("STOP"), FinishReason::Stop);
        assert_eq!(FinishReason::from_provider_str("max_tokens"), FinishReason::Length);
        assert_eq!(FinishReason::from_provider_str("MAX_TOKENS"), FinishReason::Length);
        assert_eq!(FinishReason::from_provider_str("whatever"), FinishReason::Stop);
    }

    #[test]
    fn test_stream_chunk_invariants() {
        let delta = StreamChunk::delta("id", "m", "Hello");
        assert!(delta.is_well_formed());
        assert!(delta.finish_reason.is_none());

        let finish = StreamChunk::finish("id", "m", FinishReason::Stop);
        assert!(finish.is_well_formed());
        assert!(finish.delta.is_empty());
    }

    #[test]
    fn test_stream_chunk_serialization_omits_null_finish() {
        let chunk = StreamChunk::delta("id", "m", "x");
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(!json.contains("finish_reason"));

        let chunk = StreamChunk::finish("id", "m", FinishReason::Stop);
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains("\"finish_reason\":\"stop\""));
    }

    #[test]
    fn test_stream_defaults_to_false() {
        let req: ChatRequest =
            serde_json::from_str(r#"{"model":"m","messages":[{"role":"user","content":"hi"}]}"#)
                .unwrap();
        assert!(!req.stream);
    }
}
