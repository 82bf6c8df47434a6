//! 凭证模型与只读凭证仓库
//!
//! 凭证在每次网关请求开始时从只读仓库取出，请求期间不可变，
//! 绝不写入日志明文。

pub mod resolver;

use crate::Provider;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use resolver::{resolve, ResolvedCredential};

/// Provider 级凭证
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCredential {
    /// 所属 Provider
    pub provider: Provider,
    /// API key（不透明存储，日志中必须脱敏）
    #[serde(default)]
    pub api_key: Option<String>,
    /// 基础端点 URL
    #[serde(default)]
    pub base_url: Option<String>,
    /// 旧版端点字段（仅作为 base_url 缺失时的回退）
    #[serde(default)]
    pub endpoint: Option<String>,
    /// 默认 API 路径模板，可含 `{model}` 占位符
    #[serde(default)]
    pub api_path: Option<String>,
    /// 鉴权头名称，如 `Authorization` / `x-api-key`；
    /// 为 None 时 key 作为查询参数传递（Gemini）
    #[serde(default)]
    pub auth_header: Option<String>,
    /// 鉴权值前缀，如 `"Bearer "`，无前缀时为空
    #[serde(default)]
    pub auth_prefix: String,
    /// 额外静态请求头
    #[serde(default)]
    pub extra_headers: IndexMap<String, String>,
}

/// 模型级覆盖配置
///
/// 任一字段存在即覆盖 Provider 级的对应字段。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelOverride {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_path: Option<String>,
}

/// 只读凭证仓库
///
/// Provider 级凭证 + 以规范模型名为 key 的模型级覆盖。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialStore {
    /// Provider 级凭证
    #[serde(default)]
    pub providers: Vec<ProviderCredential>,
    /// 模型级覆盖（key 为规范模型名）
    #[serde(default)]
    pub model_overrides: IndexMap<String, ModelOverride>,
}

impl CredentialStore {
    /// 按 Provider 查找凭证
    pub fn provider_credential(&self, provider: Provider) -> Option<&ProviderCredential> {
        self.providers.iter().find(|c| c.provider == provider)
    }

    /// 按规范模型名查找覆盖
    pub fn model_override(&self, model: &str) -> Option<&ModelOverride> {
        self.model_overrides.get(model)
    }
}

/// 已认证的调用方身份
///
/// 网关消费的是认证层已经校验过的身份；发证与撤销不在本系统内。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// 虚拟 key 名称
    pub name: String,
    /// 授权的模型范围（通配符模式列表）
    #[serde(default)]
    pub model_scopes: Vec<String>,
}

impl CallerIdentity {
    /// 检查调用方是否有权访问某个规范模型名
    pub fn entitled_to(&self, model: &str) -> bool {
        self.model_scopes
            .iter()
            .any(|p| crate::pattern_matches(p, model))
    }
}

/// 日志脱敏：只保留 key 的前 4 个字符
///
/// 按字符截取而不是字节截取，key 含多字节字符时不会 panic。
pub fn mask_key(key: &str) -> String {
    if key.chars().count() <= 4 {
        "****".to_string()
    } else {
        let prefix: String = key.chars().take(4).collect();
        format!("{}****", prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_entitlement() {
        let caller = CallerIdentity {
            name: "team-a".to_string(),
            model_scopes: vec!["claude-*".to_string(), "gpt-4o".to_string()],
        };
        assert!(caller.entitled_to("claude-sonnet-4-5"));
        assert!(caller.entitled_to("gpt-4o"));
        assert!(!caller.entitled_to("gpt-4o-mini"));
        assert!(!caller.entitled_to("gemini-2.0-flash"));
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-abcdef123456"), "sk-a****");
        assert_eq!(mask_key("abc"), "****");
    }

    #[test]
    fn test_mask_key_multibyte() {
        // key 含多字节字符时按字符边界截取，不 panic
        assert_eq!(mask_key("密钥abcdef"), "密钥ab****");
        assert_eq!(mask_key("密钥ab"), "****");
        assert_eq!(mask_key("密钥密钥密"), "密钥密钥****");
    }

    #[test]
    fn test_store_lookup() {
        let store = CredentialStore {
            providers: vec![ProviderCredential {
                provider: Provider::OpenAi,
                api_key: Some("sk-test".to_string()),
                base_url: None,
                endpoint: None,
                api_path: Some("/v1/chat/completions".to_string()),
                auth_header: Some("Authorization".to_string()),
                auth_prefix: "Bearer ".to_string(),
                extra_headers: IndexMap::new(),
            }],
            model_overrides: IndexMap::new(),
        };
        assert!(store.provider_credential(Provider::OpenAi).is_some());
        assert!(store.provider_credential(Provider::Anthropic).is_none());
        assert!(store.model_override("gpt-4o").is_none());
    }
}
