//! HTTP 服务入口
//!
//! axum 路由与启动；业务逻辑全部在 `gateway` 层，
//! 这里只做 HTTP 形状的进出转换。

pub mod handlers;

use crate::config::GatewayConfig;
use crate::gateway::Gateway;
use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

/// 构建路由
pub fn router(gateway: Gateway) -> Router {
    let body_limit = gateway.config().server.body_limit_bytes;
    Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/models/select", get(handlers::select_models))
        .route("/internal/resolution", get(handlers::resolution))
        .route("/healthz", get(handlers::healthz))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(gateway)
}

/// 启动 HTTP 服务，阻塞直到进程退出
pub async fn serve(config: GatewayConfig) -> anyhow::Result<()> {
    let listen_addr = config.server.listen_addr.clone();
    let gateway = Gateway::new(Arc::new(config));
    let app = router(gateway);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", listen_addr))?;
    tracing::info!(addr = %listen_addr, "modelgate listening");
    axum::serve(listener, app)
        .await
        .context("http server exited")?;
    Ok(())
}
