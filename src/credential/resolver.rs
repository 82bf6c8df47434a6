//! 凭证与端点的多层回退解析
//!
//! 把「调用方 + 规范模型名」解析成一次上游调用所需的全部材料：
//! Provider、上游模型 ID、API key、完整 URL、鉴权方式。
//!
//! 回退顺序（每一层独立回退，互不影响）：
//!
//! 1. 目录查找 + 授权检查 → `ModelNotFound`
//! 2. Provider 由目录条目决定
//! 3. API key：模型级覆盖 → Provider 级凭证 → `NoCredential`
//! 4. 端点：模型级覆盖 → base_url → 旧版 endpoint → 静态默认表 → `NoEndpoint`
//! 5. API 路径：模型级覆盖 → Provider 默认路径 → `NoApiPath`
//! 6. 路径中的 `{model}` 替换为上游模型 ID
//! 7. Gemini 流式请求把 `:generateContent` 改写为 `:streamGenerateContent`

use crate::catalog::Catalog;
use crate::credential::{CallerIdentity, CredentialStore};
use crate::error::GatewayError;
use crate::Provider;
use indexmap::IndexMap;

/// 解析完成的上游调用材料
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    /// 上游 Provider
    pub provider: Provider,
    /// 发给上游的真实模型 ID
    pub upstream_model: String,
    /// API key
    pub api_key: String,
    /// 完整请求 URL（已完成 {model} 替换与流式路径改写）
    pub url: String,
    /// 鉴权头名称；None 表示 key 走查询参数（Gemini）
    pub auth_header: Option<String>,
    /// 鉴权值前缀
    pub auth_prefix: String,
    /// 额外静态请求头
    pub extra_headers: IndexMap<String, String>,
}

/// 静态默认端点表
///
/// 纯查找函数，无副作用。Cohere 没有默认端点，必须显式配置。
pub fn default_endpoint(provider: Provider) -> Option<&'static str> {
    match provider {
        Provider::OpenAi => Some("https://api.openai.com"),
        Provider::Anthropic => Some("https://api.anthropic.com"),
        Provider::Gemini => Some("https://generativelanguage.googleapis.com"),
        Provider::Internal => Some("http://127.0.0.1:8080"),
        Provider::Cohere => None,
    }
}

/// 解析一次上游调用的凭证与端点
///
/// `streaming` 只影响 Gemini 的路径改写，其余层级与流式无关。
pub fn resolve(
    store: &CredentialStore,
    catalog: &Catalog,
    caller: &CallerIdentity,
    model: &str,
    streaming: bool,
) -> Result<ResolvedCredential, GatewayError> {
    // 1. 目录查找 + 授权检查
    //    不存在和无权访问返回同一个错误，避免泄露目录内容
    let entry = catalog
        .find(model)
        .filter(|_| caller.entitled_to(model))
        .ok_or_else(|| GatewayError::ModelNotFound {
            model: model.to_string(),
        })?;

    // 2. Provider 由目录条目决定
    let provider = entry.provider;
    let credential = store.provider_credential(provider);
    let model_override = store.model_override(model);

    // 3. API key：模型级 → Provider 级
    let api_key = model_override
        .and_then(|o| o.api_key.clone())
        .or_else(|| credential.and_then(|c| c.api_key.clone()))
        .ok_or_else(|| GatewayError::NoCredential {
            model: model.to_string(),
            provider: provider.to_string(),
        })?;

    // 4. 端点：模型级 → base_url → 旧版 endpoint → 静态默认
    let base = model_override
        .and_then(|o| o.base_url.clone())
        .or_else(|| credential.and_then(|c| c.base_url.clone()))
        .or_else(|| credential.and_then(|c| c.endpoint.clone()))
        .or_else(|| default_endpoint(provider).map(str::to_string))
        .ok_or_else(|| GatewayError::NoEndpoint {
            provider: provider.to_string(),
        })?;

    // 5. API 路径：模型级 → Provider 默认
    let path = model_override
        .and_then(|o| o.api_path.clone())
        .or_else(|| credential.and_then(|c| c.api_path.clone()))
        .ok_or_else(|| GatewayError::NoApiPath {
            provider: provider.to_string(),
        })?;

    // 6. {model} 替换为上游模型 ID
    let mut path = path.replace("{model}", &entry.upstream_id);

    // 7. Gemini 流式路径改写
    if streaming && provider == Provider::Gemini {
        path = path.replace(":generateContent", ":streamGenerateContent");
    }

    let url = join_url(&base, &path);

    let (auth_header, auth_prefix, extra_headers) = match credential {
        Some(c) => (
            c.auth_header.clone(),
            c.auth_prefix.clone(),
            c.extra_headers.clone(),
        ),
        // key 来自模型级覆盖而 Provider 级凭证缺失时，按 Provider 惯例鉴权
        None => (
            default_auth_header(provider),
            default_auth_prefix(provider).to_string(),
            IndexMap::new(),
        ),
    };

    Ok(ResolvedCredential {
        provider,
        upstream_model: entry.upstream_id.clone(),
        api_key,
        url,
        auth_header,
        auth_prefix,
        extra_headers,
    })
}

fn default_auth_header(provider: Provider) -> Option<String> {
    match provider {
        Provider::OpenAi | Provider::Cohere | Provider::Internal => {
            Some("Authorization".to_string())
        }
        Provider::Anthropic => Some("x-api-key".to_string()),
        Provider::Gemini => None,
    }
}

fn default_auth_prefix(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi | Provider::Cohere | Provider::Internal => "Bearer ",
        Provider::Anthropic | Provider::Gemini => "",
    }
}

/// 拼接 base 与 path，规范化中间的斜杠
fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ModelCatalogEntry, ModelKind};
    use crate::credential::{ModelOverride, ProviderCredential};

    fn catalog() -> Catalog {
        Catalog::new(vec![
            ModelCatalogEntry {
                name: "gpt-4o".to_string(),
                provider: Provider::OpenAi,
                upstream_id: "gpt-4o-2024-11-20".to_string(),
                context_length: 128_000,
                max_output_tokens: 16_384,
                kind: ModelKind::Chat,
                available: true,
            },
            ModelCatalogEntry {
                name: "gemini-2.0-flash".to_string(),
                provider: Provider::Gemini,
                upstream_id: "gemini-2.0-flash".to_string(),
                context_length: 1_000_000,
                max_output_tokens: 8192,
                kind: ModelKind::Chat,
                available: true,
            },
            ModelCatalogEntry {
                name: "command-r".to_string(),
                provider: Provider::Cohere,
                upstream_id: "command-r-08-2024".to_string(),
                context_length: 128_000,
                max_output_tokens: 4096,
                kind: ModelKind::Chat,
                available: true,
            },
        ])
    }

    fn caller() -> CallerIdentity {
        CallerIdentity {
            name: "test".to_string(),
            model_scopes: vec!["*".to_string()],
        }
    }

    fn provider_cred(provider: Provider, path: &str) -> ProviderCredential {
        ProviderCredential {
            provider,
            api_key: Some(format!("{}-key", provider)),
            base_url: None,
            endpoint: None,
            api_path: Some(path.to_string()),
            auth_header: default_auth_header(provider),
            auth_prefix: default_auth_prefix(provider).to_string(),
            extra_headers: IndexMap::new(),
        }
    }

    #[test]
    fn test_default_endpoint_fallback() {
        // 未配置任何端点时回退到静态默认表
        let store = CredentialStore {
            providers: vec![provider_cred(Provider::OpenAi, "/v1/chat/completions")],
            model_overrides: IndexMap::new(),
        };
        let resolved = resolve(&store, &catalog(), &caller(), "gpt-4o", false).unwrap();
        assert_eq!(resolved.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(resolved.upstream_model, "gpt-4o-2024-11-20");
        assert_eq!(resolved.api_key, "openai-key");
    }

    #[test]
    fn test_legacy_endpoint_fallback() {
        // base_url 缺失时回退到旧版 endpoint 字段
        let mut cred = provider_cred(Provider::OpenAi, "/v1/chat/completions");
        cred.endpoint = Some("https://legacy.example.com/".to_string());
        let store = CredentialStore {
            providers: vec![cred],
            model_overrides: IndexMap::new(),
        };
        let resolved = resolve(&store, &catalog(), &caller(), "gpt-4o", false).unwrap();
        assert_eq!(
            resolved.url,
            "https://legacy.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_base_url_beats_legacy_endpoint() {
        let mut cred = provider_cred(Provider::OpenAi, "/v1/chat/completions");
        cred.base_url = Some("https://proxy.example.com".to_string());
        cred.endpoint = Some("https://legacy.example.com".to_string());
        let store = CredentialStore {
            providers: vec![cred],
            model_overrides: IndexMap::new(),
        };
        let resolved = resolve(&store, &catalog(), &caller(), "gpt-4o", false).unwrap();
        assert!(resolved.url.starts_with("https://proxy.example.com"));
    }

    #[test]
    fn test_model_override_beats_provider() {
        let mut overrides = IndexMap::new();
        overrides.insert(
            "gpt-4o".to_string(),
            ModelOverride {
                api_key: Some("model-key".to_string()),
                base_url: Some("https://dedicated.example.com".to_string()),
                api_path: Some("/custom/chat".to_string()),
            },
        );
        let store = CredentialStore {
            providers: vec![provider_cred(Provider::OpenAi, "/v1/chat/completions")],
            model_overrides: overrides,
        };
        let resolved = resolve(&store, &catalog(), &caller(), "gpt-4o", false).unwrap();
        assert_eq!(resolved.api_key, "model-key");
        assert_eq!(resolved.url, "https://dedicated.example.com/custom/chat");
    }

    #[test]
    fn test_model_placeholder_substitution() {
        let store = CredentialStore {
            providers: vec![provider_cred(
                Provider::Gemini,
                "/v1beta/models/{model}:generateContent",
            )],
            model_overrides: IndexMap::new(),
        };
        let resolved = resolve(&store, &catalog(), &caller(), "gemini-2.0-flash", false).unwrap();
        assert_eq!(
            resolved.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_gemini_streaming_path_rewrite() {
        let store = CredentialStore {
            providers: vec![provider_cred(
                Provider::Gemini,
                "/v1beta/models/{model}:generateContent",
            )],
            model_overrides: IndexMap::new(),
        };
        let resolved = resolve(&store, &catalog(), &caller(), "gemini-2.0-flash", true).unwrap();
        assert!(resolved.url.ends_with(":streamGenerateContent"));
        // 非流式不改写
        let buffered = resolve(&store, &catalog(), &caller(), "gemini-2.0-flash", false).unwrap();
        assert!(buffered.url.ends_with(":generateContent"));
    }

    #[test]
    fn test_cohere_has_no_default_endpoint() {
        let store = CredentialStore {
            providers: vec![provider_cred(Provider::Cohere, "/v2/chat")],
            model_overrides: IndexMap::new(),
        };
        let err = resolve(&store, &catalog(), &caller(), "command-r", false).unwrap_err();
        assert!(matches!(err, GatewayError::NoEndpoint { .. }));
    }

    #[test]
    fn test_no_credential() {
        let store = CredentialStore::default();
        let err = resolve(&store, &catalog(), &caller(), "gpt-4o", false).unwrap_err();
        assert!(matches!(err, GatewayError::NoCredential { .. }));
    }

    #[test]
    fn test_no_api_path() {
        let mut cred = provider_cred(Provider::OpenAi, "/ignored");
        cred.api_path = None;
        let store = CredentialStore {
            providers: vec![cred],
            model_overrides: IndexMap::new(),
        };
        let err = resolve(&store, &catalog(), &caller(), "gpt-4o", false).unwrap_err();
        assert!(matches!(err, GatewayError::NoApiPath { .. }));
    }

    #[test]
    fn test_unentitled_caller_sees_model_not_found() {
        let store = CredentialStore {
            providers: vec![provider_cred(Provider::OpenAi, "/v1/chat/completions")],
            model_overrides: IndexMap::new(),
        };
        let restricted = CallerIdentity {
            name: "restricted".to_string(),
            model_scopes: vec!["claude-*".to_string()],
        };
        let err = resolve(&store, &catalog(), &restricted, "gpt-4o", false).unwrap_err();
        assert!(matches!(err, GatewayError::ModelNotFound { .. }));
    }

    #[test]
    fn test_unknown_model() {
        let store = CredentialStore::default();
        let err = resolve(&store, &catalog(), &caller(), "gpt-9", false).unwrap_err();
        assert!(matches!(err, GatewayError::ModelNotFound { .. }));
    }
}
