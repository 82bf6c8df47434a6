//! 日志初始化
//!
//! tracing + EnvFilter：`RUST_LOG` 环境变量优先，
//! 其次配置文件里的级别。密钥类字段统一经 `credential::mask_key`
//! 脱敏后再进日志。

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// 初始化全局日志订阅器
///
/// 重复调用是幂等的（测试里多个用例可能都会触发初始化）。
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
