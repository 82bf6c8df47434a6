//! 网关错误类型
//!
//! 统一的错误分类，覆盖认证、解析、上游调用和超时/取消。
//!
//! # 传播策略
//!
//! - 认证与解析错误在任何网络调用之前快速失败
//! - 上游非 2xx 原样透传（状态码 + 响应体），不重试、不静默切换 Provider
//! - 流式帧级别的损坏只记录日志、跳过，不会变成错误
//! - 本层不做任何自动重试，重试策略属于外层调用方

use axum::http::StatusCode;
use serde::Serialize;

/// 网关错误
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 缺失或无效的调用方身份
    #[error("unauthenticated")]
    Unauthenticated,

    /// 请求本身不合法（校验失败）
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// 模型不存在或调用方无权访问
    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    /// 模型和 Provider 层都没有可用的 API key
    #[error("no credential configured for model {model} (provider {provider})")]
    NoCredential { model: String, provider: String },

    /// 没有任何层级解析出端点
    #[error("no endpoint configured for provider {provider}")]
    NoEndpoint { provider: String },

    /// 没有任何层级解析出 API 路径
    #[error("no api path configured for provider {provider}")]
    NoApiPath { provider: String },

    /// 上游返回非 2xx，原样透传
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// 上游响应体无法按类型化结构解析
    #[error("failed to parse upstream response: {0}")]
    UpstreamParse(String),

    /// 请求超时（区别于上游拒绝）
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// 请求被取消
    #[error("request cancelled")]
    Cancelled,

    /// 底层 HTTP 客户端错误
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// 序列化/反序列化错误
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 所有端点共用的错误信封 `{error, details?}`
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl GatewayError {
    /// 错误对应的 HTTP 状态码
    ///
    /// 上游错误保留上游状态码，让调用方能区分限流和请求非法。
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::NoCredential { .. }
            | GatewayError::NoEndpoint { .. }
            | GatewayError::NoApiPath { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::UpstreamParse(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            // 客户端已断开，使用 nginx 风格的 499
            GatewayError::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_GATEWAY),
            GatewayError::Http(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 稳定的错误种类名，写入信封的 `error` 字段
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Unauthenticated => "unauthenticated",
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::ModelNotFound { .. } => "model_not_found",
            GatewayError::NoCredential { .. } => "no_credential",
            GatewayError::NoEndpoint { .. } => "no_endpoint",
            GatewayError::NoApiPath { .. } => "no_api_path",
            GatewayError::Upstream { .. } => "upstream_error",
            GatewayError::UpstreamParse(_) => "upstream_parse_error",
            GatewayError::Timeout { .. } => "timeout",
            GatewayError::Cancelled => "cancelled",
            GatewayError::Http(_) => "http_error",
            GatewayError::Serialization(_) => "serialization_error",
        }
    }

    /// 转为错误信封
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: self.kind().to_string(),
            details: Some(self.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            GatewayError::Unauthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::ModelNotFound {
                model: "x".to_string()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::NoCredential {
                model: "x".to_string(),
                provider: "openai".to_string()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::Timeout { timeout_ms: 1000 }.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(GatewayError::Cancelled.status_code().as_u16(), 499);
    }

    #[test]
    fn test_upstream_status_passthrough() {
        // 上游 429 必须原样透传，调用方要能区分限流和内部错误
        let err = GatewayError::Upstream {
            status: 429,
            body: "rate limited".to_string(),
        };
        assert_eq!(err.status_code().as_u16(), 429);
        assert_eq!(err.kind(), "upstream_error");
    }

    #[test]
    fn test_envelope_shape() {
        let err = GatewayError::ModelNotFound {
            model: "gpt-9".to_string(),
        };
        let envelope = err.to_envelope();
        assert_eq!(envelope.error, "model_not_found");
        assert!(envelope.details.unwrap().contains("gpt-9"));
    }

    #[test]
    fn test_resolution_errors_name_model_and_provider() {
        // 错误信息要包含模型名和 Provider，方便运维修配置，
        // 但绝不能包含密钥材料
        let err = GatewayError::NoCredential {
            model: "claude-sonnet".to_string(),
            provider: "anthropic".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("claude-sonnet"));
        assert!(msg.contains("anthropic"));
    }
}
