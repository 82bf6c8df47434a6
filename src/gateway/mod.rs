//! 单请求编排
//!
//! 每个请求走一条固定的状态链：
//!
//! ```text
//! Authenticating → Resolving → Dispatching → (Streaming | Buffering) → Closed
//! ```
//!
//! 任何非终态都可能跳到终态 `Errored`。本层不做重试：认证失败、
//! 解析失败、上游非 2xx 都直接终止，重试策略属于网关外层的调用方
//! （静默重试会对上游配额重复计费）。
//!
//! 取消信号会立刻关闭上游连接；已经发给客户端的部分输出视为最终
//! 结果，不回滚。

pub mod cancel;

pub use cancel::CancellationToken;

use crate::adapter::{adapter_for, ProviderRequest};
use crate::config::GatewayConfig;
use crate::credential::{self, mask_key, CallerIdentity};
use crate::error::GatewayError;
use crate::protocol::{ChatRequest, ChatResponse};
use crate::stream::{sse_frame, StreamTranscoder, SSE_DONE};
use futures::stream::BoxStream;
use futures::StreamExt;
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// 请求所处阶段，只用于日志与内省
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Authenticating,
    Resolving,
    Dispatching,
    Streaming,
    Buffering,
    Closed,
    Errored,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Authenticating => "authenticating",
            Phase::Resolving => "resolving",
            Phase::Dispatching => "dispatching",
            Phase::Streaming => "streaming",
            Phase::Buffering => "buffering",
            Phase::Closed => "closed",
            Phase::Errored => "errored",
        }
    }
}

/// 网关响应：缓冲的完整响应，或 SSE 帧流
pub enum GatewayReply {
    Buffered(ChatResponse),
    /// 每个元素是一条完整的对外 SSE 帧（含结尾空行）
    Streaming(BoxStream<'static, String>),
}

impl std::fmt::Debug for GatewayReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayReply::Buffered(resp) => f.debug_tuple("Buffered").field(resp).finish(),
            GatewayReply::Streaming(_) => f.debug_tuple("Streaming").field(&"..").finish(),
        }
    }
}

/// 共享 HTTP 客户端
///
/// 连接池跨请求复用；全局超时不在客户端层设置，
/// 由每个请求按配置自行控制。
static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// 请求编排器
///
/// 无跨请求可变状态，目录与凭证快照只读共享。
#[derive(Clone)]
pub struct Gateway {
    config: Arc<GatewayConfig>,
}

impl Gateway {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// 校验虚拟 key
    pub fn authenticate(&self, bearer: Option<&str>) -> Result<CallerIdentity, GatewayError> {
        tracing::debug!(phase = Phase::Authenticating.as_str(), "authenticating caller");
        bearer
            .and_then(|key| self.config.authenticate(key))
            .ok_or(GatewayError::Unauthenticated)
    }

    /// 处理一次聊天补全请求
    ///
    /// 调用方已通过认证；超时与取消贯穿上游调用全程。
    pub async fn handle(
        &self,
        caller: &CallerIdentity,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<GatewayReply, GatewayError> {
        request.validate().map_err(GatewayError::InvalidRequest)?;

        tracing::debug!(
            phase = Phase::Resolving.as_str(),
            caller = %caller.name,
            model = %request.model,
            stream = request.stream,
            "resolving credential"
        );
        let resolved = credential::resolve(
            &self.config.credentials,
            &self.config.catalog,
            caller,
            &request.model,
            request.stream,
        )?;
        tracing::debug!(
            provider = %resolved.provider,
            upstream_model = %resolved.upstream_model,
            key = %mask_key(&resolved.api_key),
            "credential resolved"
        );

        let adapter = adapter_for(resolved.provider);
        let provider_request = adapter.build_request(&request, &resolved)?;

        let timeout_ms = self.config.server.request_timeout_ms;
        let deadline = (timeout_ms > 0).then(|| Instant::now() + Duration::from_millis(timeout_ms));

        tracing::debug!(
            phase = Phase::Dispatching.as_str(),
            url = %provider_request.url,
            "dispatching upstream request"
        );
        let response = self
            .dispatch(&provider_request, deadline, timeout_ms, &cancel)
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                phase = Phase::Errored.as_str(),
                status = status.as_u16(),
                "upstream rejected request"
            );
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        if request.stream {
            tracing::debug!(phase = Phase::Streaming.as_str(), "transcoding upstream stream");
            let format = adapter.stream_format();
            let model = request.model.clone();
            Ok(GatewayReply::Streaming(
                transcode_stream(response, format, model, deadline, cancel).boxed(),
            ))
        } else {
            tracing::debug!(phase = Phase::Buffering.as_str(), "buffering upstream response");
            let bytes = run_until(response.bytes(), deadline, timeout_ms, &cancel).await??;
            let parsed = adapter.parse_response(&bytes, &request.model)?;
            tracing::debug!(phase = Phase::Closed.as_str(), "request complete");
            Ok(GatewayReply::Buffered(parsed))
        }
    }

    async fn dispatch(
        &self,
        provider_request: &ProviderRequest,
        deadline: Option<Instant>,
        timeout_ms: u64,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, GatewayError> {
        let mut builder = HTTP_CLIENT
            .post(&provider_request.url)
            .json(&provider_request.body);
        for (name, value) in &provider_request.headers {
            builder = builder.header(name, value);
        }
        run_until(builder.send(), deadline, timeout_ms, cancel)
            .await?
            .map_err(GatewayError::from)
    }
}

/// 在取消与截止时间的约束下运行一个上游操作
async fn run_until<F, T>(
    operation: F,
    deadline: Option<Instant>,
    timeout_ms: u64,
    cancel: &CancellationToken,
) -> Result<T, GatewayError>
where
    F: std::future::Future<Output = T>,
{
    if cancel.is_cancelled() {
        return Err(GatewayError::Cancelled);
    }
    tokio::select! {
        result = operation => Ok(result),
        _ = cancel.cancelled() => Err(GatewayError::Cancelled),
        _ = wait_deadline(deadline) => Err(GatewayError::Timeout { timeout_ms }),
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// 上游字节流 → 对外 SSE 帧流
///
/// 取消或超时会退出循环并随之丢弃上游响应（关闭连接）；
/// 已发出的块视为最终结果。收尾时补齐终止块并追加 `[DONE]`。
fn transcode_stream(
    response: reqwest::Response,
    format: crate::stream::StreamFormat,
    model: String,
    deadline: Option<Instant>,
    cancel: CancellationToken,
) -> impl futures::Stream<Item = String> {
    async_stream::stream! {
        let mut transcoder = StreamTranscoder::new(format, &model);
        let mut upstream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                chunk = upstream.next() => chunk,
                _ = cancel.cancelled() => {
                    tracing::debug!("client cancelled, closing upstream connection");
                    break;
                }
                _ = wait_deadline(deadline) => {
                    tracing::warn!("stream deadline reached, closing upstream connection");
                    break;
                }
            };
            match next {
                Some(Ok(bytes)) => {
                    for chunk in transcoder.push(&bytes) {
                        if let Ok(frame) = sse_frame(&chunk) {
                            yield frame;
                        }
                    }
                    if transcoder.is_finished() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "upstream read error, terminating stream");
                    break;
                }
                None => break,
            }
        }

        // 上游没有给出终止信号时补发终止块
        for chunk in transcoder.finish() {
            if let Ok(frame) = sse_frame(&chunk) {
                yield frame;
            }
        }
        yield SSE_DONE.to_string();
        tracing::debug!(phase = Phase::Closed.as_str(), "stream closed");
    }
}
