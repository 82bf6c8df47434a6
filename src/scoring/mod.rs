//! 按查询意图对模型打分并做多样性选择
//!
//! 打分从基准 50 分开始，按意图做加减分，最低截断到 0。
//! 具体权重是调优面而非正确性契约，但必须保持两条硬性规则：
//!
//! 1. 专用能力模型（OCR/嵌入/TTS/图片生成）在非对口意图下
//!    始终比通用对话模型低至少 40 分
//! 2. 图片意图只返回图片生成模型，没有时返回 `no_image_models`，
//!    绝不静默回退到对话模型

use crate::catalog::{Catalog, ModelCatalogEntry, ModelKind};
use serde::{Deserialize, Serialize};

/// 可接受分数线
///
/// 前两轮选择只收分数严格大于该值的模型。
/// 取值沿用线上系统的经验值，是调优面。
pub const MIN_ACCEPTABLE_SCORE: u32 = 30;

/// 基准分
const BASE_SCORE: i32 = 50;

/// 专用能力模型在非对口意图下的惩罚
const SPECIALIZED_PENALTY: i32 = -45;

/// 查询意图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    Chat,
    Code,
    Image,
    Analysis,
}

/// 带分数的目录条目，按请求计算，不持久化
#[derive(Debug, Clone, Serialize)]
pub struct ScoredModel {
    #[serde(flatten)]
    pub model: ModelCatalogEntry,
    pub score: u32,
}

/// 选择结果
///
/// `message` 仅在图片意图下没有任何可用图片生成模型时出现，
/// 调用方应把它当作「暂不可用」状态而不是错误。
#[derive(Debug, Clone, Serialize)]
pub struct SelectionResult {
    pub models: Vec<ScoredModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// 计算单个模型在给定意图下的分数
pub fn score(entry: &ModelCatalogEntry, intent: QueryIntent) -> u32 {
    let mut score = BASE_SCORE;

    match intent {
        QueryIntent::Chat => {
            if entry.kind.is_specialized() {
                score += SPECIALIZED_PENALTY;
            }
            score += family_bonus(&entry.name);
            if entry.context_length >= 200_000 {
                score += 5;
            }
        }
        QueryIntent::Code => {
            if entry.kind.is_specialized() {
                score += SPECIALIZED_PENALTY;
            }
            score += coding_bonus(&entry.name);
            if entry.context_length >= 128_000 {
                score += 5;
            }
        }
        QueryIntent::Analysis => {
            if entry.kind.is_specialized() {
                score += SPECIALIZED_PENALTY;
            }
            score += family_bonus(&entry.name);
            // 分析类任务更看重长上下文
            if entry.context_length >= 200_000 {
                score += 10;
            }
        }
        QueryIntent::Image => {
            // 图片意图的候选集在选择阶段已过滤为图片生成模型，
            // 这里只在同类之间区分
            if entry.kind == ModelKind::ImageGeneration {
                score += 30;
            } else {
                score += SPECIALIZED_PENALTY;
            }
        }
    }

    score.max(0) as u32
}

/// 通用对话能力较强的模型家族加分
fn family_bonus(name: &str) -> i32 {
    if name.contains("claude") || name.contains("gpt-4") {
        15
    } else if name.contains("gemini") || name.contains("command") {
        10
    } else {
        0
    }
}

/// 编码能力较强的模型家族加分
fn coding_bonus(name: &str) -> i32 {
    if name.contains("claude") {
        20
    } else if name.contains("gpt-4") || name.contains("deepseek") {
        15
    } else if name.contains("gemini") {
        10
    } else {
        0
    }
}

/// 三轮多样性选择
///
/// 1. 第一轮：按分数降序，每个 Provider 最多取一个，分数须大于分数线
/// 2. 第二轮：不足 `limit` 时补齐剩余高分模型，不限 Provider，仍守分数线
/// 3. 第三轮：仍不足时忽略分数线补齐（极小目录的兜底）
///
/// 目录非空时保证返回 `min(limit, 候选数)` 个模型。
pub fn select_diverse(catalog: &Catalog, intent: QueryIntent, limit: usize) -> SelectionResult {
    let candidates: Vec<&ModelCatalogEntry> = if intent == QueryIntent::Image {
        // 图片意图只看图片生成模型，绝不回退到对话模型
        catalog
            .available()
            .filter(|m| m.kind == ModelKind::ImageGeneration)
            .collect()
    } else {
        catalog.available().collect()
    };

    if intent == QueryIntent::Image && candidates.is_empty() {
        return SelectionResult {
            models: Vec::new(),
            message: Some("no_image_models".to_string()),
        };
    }

    let mut scored: Vec<ScoredModel> = candidates
        .into_iter()
        .map(|m| ScoredModel {
            model: m.clone(),
            score: score(m, intent),
        })
        .collect();

    // 分数降序，同分按名称升序保证确定性
    scored.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.model.name.cmp(&b.model.name))
    });

    let mut selected: Vec<ScoredModel> = Vec::new();
    let mut picked = vec![false; scored.len()];

    // 第一轮：每个 Provider 最多一个
    for (i, candidate) in scored.iter().enumerate() {
        if selected.len() >= limit {
            break;
        }
        if candidate.score <= MIN_ACCEPTABLE_SCORE {
            continue;
        }
        if selected
            .iter()
            .any(|s| s.model.provider == candidate.model.provider)
        {
            continue;
        }
        selected.push(candidate.clone());
        picked[i] = true;
    }

    // 第二轮：补齐高分模型，不限 Provider
    for (i, candidate) in scored.iter().enumerate() {
        if selected.len() >= limit {
            break;
        }
        if picked[i] || candidate.score <= MIN_ACCEPTABLE_SCORE {
            continue;
        }
        selected.push(candidate.clone());
        picked[i] = true;
    }

    // 第三轮：忽略分数线兜底
    for (i, candidate) in scored.iter().enumerate() {
        if selected.len() >= limit {
            break;
        }
        if picked[i] {
            continue;
        }
        selected.push(candidate.clone());
        picked[i] = true;
    }

    SelectionResult {
        models: selected,
        message: None,
    }
}
