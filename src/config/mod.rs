//! 网关配置
//!
//! 单个 YAML 文件承载全部配置：监听地址、日志、虚拟 key、
//! 凭证仓库和模型目录。启动时加载一次，运行期间只读。

use crate::catalog::Catalog;
use crate::credential::{CallerIdentity, CredentialStore};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 网关配置根
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 对外发放的虚拟 key
    #[serde(default)]
    pub virtual_keys: Vec<VirtualKey>,
    /// 上游凭证仓库
    #[serde(default)]
    pub credentials: CredentialStore,
    /// 模型目录快照
    #[serde(default)]
    pub catalog: Catalog,
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// 请求体大小上限（字节）
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    /// 单请求超时（毫秒），覆盖上游调用与流式读取全程
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别：trace / debug / info / warn / error
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// 虚拟 key 条目
///
/// `key` 是调用方持有的 Bearer 凭证，`model_scopes` 限定可访问的模型。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualKey {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub model_scopes: Vec<String>,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_body_limit() -> usize {
    2 * 1024 * 1024
}

fn default_request_timeout_ms() -> u64 {
    300_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            body_limit_bytes: default_body_limit(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl GatewayConfig {
    /// 从 YAML 文件加载配置
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: GatewayConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// 校验虚拟 key，返回调用方身份
    ///
    /// key 比对失败返回 None，由上层映射为 401。
    pub fn authenticate(&self, key: &str) -> Option<CallerIdentity> {
        self.virtual_keys
            .iter()
            .find(|vk| vk.key == key)
            .map(|vk| CallerIdentity {
                name: vk.name.clone(),
                model_scopes: vk.model_scopes.clone(),
            })
    }
}
