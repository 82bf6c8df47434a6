//! HTTP 处理器
//!
//! 认证在每个处理器入口做一次：`Authorization: Bearer <虚拟key>`。
//! 认证失败在任何解析或上游调用之前返回 401。

use crate::credential::{self, CallerIdentity};
use crate::error::GatewayError;
use crate::gateway::{CancellationToken, Gateway, GatewayReply};
use crate::protocol::ChatRequest;
use crate::scoring::{self, QueryIntent, SelectionResult};
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::StreamExt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::debug!(kind = self.kind(), status = status.as_u16(), "request failed");
        (status, Json(self.to_envelope())).into_response()
    }
}

/// 从请求头提取 Bearer 凭证
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

fn authenticate(gateway: &Gateway, headers: &HeaderMap) -> Result<CallerIdentity, GatewayError> {
    gateway.authenticate(bearer_token(headers))
}

/// POST /v1/chat/completions
///
/// 认证先于请求体解析：未认证的调用方无论请求体长什么样都拿 401；
/// 请求体不是合法 JSON 时返回统一错误信封，不走 axum 默认拒绝。
pub async fn chat_completions(
    State(gateway): State<Gateway>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let caller = match authenticate(&gateway, &headers) {
        Ok(caller) => caller,
        Err(e) => return e.into_response(),
    };

    let Json(request) = match body {
        Ok(json) => json,
        Err(rejection) => {
            return GatewayError::InvalidRequest(rejection.body_text()).into_response();
        }
    };

    // 连接断开时响应流被丢弃，上游连接随之关闭；
    // 令牌覆盖显式取消路径
    let cancel = CancellationToken::new();

    match gateway.handle(&caller, request, cancel).await {
        Ok(GatewayReply::Buffered(response)) => Json(response).into_response(),
        Ok(GatewayReply::Streaming(frames)) => {
            let body_stream = frames.map(|frame| Ok::<_, Infallible>(Bytes::from(frame)));
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/event-stream")
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::CONNECTION, "keep-alive")
                .header("X-Accel-Buffering", "no")
                .body(Body::from_stream(body_stream))
                .unwrap_or_else(|_| {
                    GatewayError::InvalidRequest("failed to build stream response".to_string())
                        .into_response()
                })
        }
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SelectParams {
    pub query_type: QueryIntent,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    3
}

/// GET /v1/models/select?query_type=code&limit=3
///
/// 只在调用方有权访问的模型子集上打分选择。
pub async fn select_models(
    State(gateway): State<Gateway>,
    headers: HeaderMap,
    Query(params): Query<SelectParams>,
) -> Result<Json<SelectionResult>, GatewayError> {
    let caller = authenticate(&gateway, &headers)?;
    let entitled = crate::catalog::Catalog::new(
        gateway
            .config()
            .catalog
            .entitled(&caller.model_scopes)
            .into_iter()
            .cloned()
            .collect(),
    );
    let result = scoring::select_diverse(&entitled, params.query_type, params.limit);
    Ok(Json(result))
}

/// 单个模型的解析结果视图
#[derive(Debug, Serialize)]
pub struct ResolvedView {
    pub provider: String,
    pub upstream_model: String,
    pub api_key: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_header: Option<String>,
    pub auth_prefix: String,
}

#[derive(Debug, Serialize)]
pub struct ResolutionResponse {
    /// 以规范模型名为 key 的已解析凭证
    pub credentials: IndexMap<String, ResolvedView>,
    /// 调用方可见的目录条目
    pub models: Vec<crate::catalog::ModelCatalogEntry>,
}

/// GET /internal/resolution
///
/// 内部协作端点：对调用方可见的每个模型做一次完整解析，
/// 返回凭证与目录快照。解析失败的模型跳过（保持端点可用，
/// 配置缺口由网关请求路径上的错误暴露）。
pub async fn resolution(
    State(gateway): State<Gateway>,
    headers: HeaderMap,
) -> Result<Json<ResolutionResponse>, GatewayError> {
    let caller = authenticate(&gateway, &headers)?;
    let config = gateway.config();

    let mut credentials = IndexMap::new();
    let mut models = Vec::new();
    for entry in config.catalog.entitled(&caller.model_scopes) {
        models.push(entry.clone());
        match credential::resolve(
            &config.credentials,
            &config.catalog,
            &caller,
            &entry.name,
            false,
        ) {
            Ok(resolved) => {
                credentials.insert(
                    entry.name.clone(),
                    ResolvedView {
                        provider: resolved.provider.to_string(),
                        upstream_model: resolved.upstream_model,
                        api_key: resolved.api_key,
                        url: resolved.url,
                        auth_header: resolved.auth_header,
                        auth_prefix: resolved.auth_prefix,
                    },
                );
            }
            Err(e) => {
                tracing::debug!(model = %entry.name, kind = e.kind(), "skipping unresolvable model");
            }
        }
    }

    Ok(Json(ResolutionResponse {
        credentials,
        models,
    }))
}

/// GET /healthz
pub async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
