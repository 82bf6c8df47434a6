//! 模型目录
//!
//! 目录由外部同步任务产出，网关只读消费。
//! 每次请求看到的都是同一份不可变快照，不存在跨请求的可变状态。

use crate::Provider;
use serde::{Deserialize, Serialize};

/// 模型能力类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// 通用对话
    Chat,
    /// 向量嵌入
    Embedding,
    /// 文字识别
    Ocr,
    /// 语音合成
    Tts,
    /// 图片生成
    ImageGeneration,
    /// 视觉理解
    Vision,
}

impl ModelKind {
    /// 非对话类的专用能力（OCR/嵌入/TTS/图片生成）
    pub fn is_specialized(&self) -> bool {
        matches!(
            self,
            ModelKind::Ocr | ModelKind::Embedding | ModelKind::Tts | ModelKind::ImageGeneration
        )
    }
}

/// 目录条目
///
/// `name` 是面向调用方的规范名，`upstream_id` 是发给 Provider 的真实模型 ID。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCatalogEntry {
    /// 规范模型名
    pub name: String,
    /// 所属 Provider
    pub provider: Provider,
    /// 上游模型 ID
    pub upstream_id: String,
    /// 上下文长度
    #[serde(default)]
    pub context_length: u32,
    /// 最大输出 token 数
    #[serde(default)]
    pub max_output_tokens: u32,
    /// 能力类型
    pub kind: ModelKind,
    /// 是否可用
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

/// 目录快照
///
/// 请求期间不可变；查找都是线性扫描，目录规模（几十到几百个模型）下足够。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub models: Vec<ModelCatalogEntry>,
}

impl Catalog {
    pub fn new(models: Vec<ModelCatalogEntry>) -> Self {
        Self { models }
    }

    /// 按规范名查找可用模型
    pub fn find(&self, name: &str) -> Option<&ModelCatalogEntry> {
        self.models
            .iter()
            .find(|m| m.available && m.name == name)
    }

    /// 所有可用模型
    pub fn available(&self) -> impl Iterator<Item = &ModelCatalogEntry> {
        self.models.iter().filter(|m| m.available)
    }

    /// 过滤出调用方有权访问的可用模型
    ///
    /// `scopes` 为空表示没有任何授权。
    pub fn entitled<'a>(&'a self, scopes: &'a [String]) -> Vec<&'a ModelCatalogEntry> {
        self.available()
            .filter(|m| scopes.iter().any(|p| crate::pattern_matches(p, &m.name)))
            .collect()
    }
}
