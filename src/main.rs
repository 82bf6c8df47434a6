//! modelgate 服务入口

use modelgate::config::GatewayConfig;
use modelgate::{logger, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 配置路径：第一个命令行参数 > MODELGATE_CONFIG > 默认文件名
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MODELGATE_CONFIG").ok())
        .unwrap_or_else(|| "modelgate.yaml".to_string());

    let config = GatewayConfig::load(&config_path)?;
    logger::init(&config.logging);
    tracing::info!(config = %config_path, "modelgate starting");

    server::serve(config).await
}
