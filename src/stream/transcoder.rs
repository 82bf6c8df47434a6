//! Provider 流式帧 → 规范化块的翻译
//!
//! 每个连接一个转码器实例，消费帧解码器产出的完整帧，
//! 翻译成 `StreamChunk` 序列。输出保证：
//!
//! - 非空 delta 的块没有 finish_reason
//! - 终止块 delta 为空，且每个流恰好一个
//! - 损坏的帧记日志后跳过，绝不中断整个流

use crate::protocol::{new_response_id, FinishReason, StreamChunk};
use crate::stream::frame::{Frame, FrameDecoder, FramingMode};
use serde::Deserialize;

/// 对外 SSE 终止哨兵
pub const SSE_DONE: &str = "data: [DONE]\n\n";

/// 上游流格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// OpenAI 兼容 SSE
    OpenAiSse,
    /// Anthropic 事件 SSE
    AnthropicSse,
    /// Gemini 换行分隔 JSON
    GeminiJsonLines,
}

impl StreamFormat {
    fn framing(&self) -> FramingMode {
        match self {
            StreamFormat::OpenAiSse | StreamFormat::AnthropicSse => FramingMode::Sse,
            StreamFormat::GeminiJsonLines => FramingMode::JsonLines,
        }
    }
}

/// 流式转码器
///
/// 单请求生命周期：`push` 喂入上游字节，`finish` 在上游结束时冲刷。
/// 终止块发出后进入终态，后续字节全部忽略。
#[derive(Debug)]
pub struct StreamTranscoder {
    format: StreamFormat,
    decoder: FrameDecoder,
    /// 对外响应 ID，整个流复用同一个
    id: String,
    /// 对外的规范模型名
    model: String,
    /// Anthropic message_delta 提前携带的结束原因
    pending_finish: Option<FinishReason>,
    finished: bool,
}

impl StreamTranscoder {
    pub fn new(format: StreamFormat, model: &str) -> Self {
        Self {
            format,
            decoder: FrameDecoder::new(format.framing()),
            id: new_response_id(),
            model: model.to_string(),
            pending_finish: None,
            finished: false,
        }
    }

    /// 终止块是否已发出
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// 喂入一段上游字节，返回翻译出的规范化块
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamChunk> {
        if self.finished {
            return Vec::new();
        }
        let frames = self.decoder.push(bytes);
        self.translate_frames(frames)
    }

    /// 上游流结束时调用
    ///
    /// 冲刷解码器的残余字节；若上游没有给出终止信号（连接被切断），
    /// 补发一个终止块，保证客户端总能看到完整的结束序列。
    pub fn finish(&mut self) -> Vec<StreamChunk> {
        if self.finished {
            return Vec::new();
        }
        let frames = self.decoder.finish();
        let mut chunks = self.translate_frames(frames);
        if !self.finished {
            chunks.push(self.finish_chunk(FinishReason::Stop));
        }
        chunks
    }

    fn translate_frames(&mut self, frames: Vec<Frame>) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();
        for frame in frames {
            if self.finished {
                break;
            }
            match frame {
                Frame::Done => {
                    // OpenAI 正常流在 [DONE] 之前已有 finish_reason 块；
                    // 没有时补发，保证终止块恰好一个
                    if !self.finished {
                        chunks.push(self.finish_chunk(FinishReason::Stop));
                    }
                }
                Frame::Data(payload) => match self.translate_payload(&payload) {
                    Ok(mut translated) => chunks.append(&mut translated),
                    Err(e) => {
                        // 单个损坏帧绝不中断健康的流
                        tracing::warn!(error = %e, "skipping malformed stream frame");
                    }
                },
            }
        }
        chunks
    }

    fn translate_payload(&mut self, payload: &[u8]) -> Result<Vec<StreamChunk>, serde_json::Error> {
        match self.format {
            StreamFormat::OpenAiSse => {
                let frame: OpenAiStreamFrame = serde_json::from_slice(payload)?;
                let mut chunks = Vec::new();
                if let Some(choice) = frame.choices.into_iter().next() {
                    if let Some(text) = choice.delta.content {
                        if !text.is_empty() {
                            chunks.push(self.delta_chunk(text));
                        }
                    }
                    if let Some(reason) = choice.finish_reason {
                        chunks.push(self.finish_chunk(FinishReason::from_provider_str(&reason)));
                    }
                }
                Ok(chunks)
            }
            StreamFormat::AnthropicSse => {
                let event: AnthropicStreamEvent = serde_json::from_slice(payload)?;
                let mut chunks = Vec::new();
                match event.event_type.as_str() {
                    "content_block_delta" => {
                        if let Some(text) = event.delta.and_then(|d| d.text) {
                            if !text.is_empty() {
                                chunks.push(self.delta_chunk(text));
                            }
                        }
                    }
                    "message_delta" => {
                        // 结束原因先到，message_stop 才真正终止
                        if let Some(reason) = event.delta.and_then(|d| d.stop_reason) {
                            self.pending_finish =
                                Some(FinishReason::from_provider_str(&reason));
                        }
                    }
                    "message_stop" => {
                        let reason = self.pending_finish.take().unwrap_or(FinishReason::Stop);
                        chunks.push(self.finish_chunk(reason));
                    }
                    // ping / message_start / content_block_start 等无内容事件
                    _ => {}
                }
                Ok(chunks)
            }
            StreamFormat::GeminiJsonLines => {
                let frame: GeminiStreamFrame = serde_json::from_slice(payload)?;
                let mut chunks = Vec::new();
                if let Some(candidate) = frame.candidates.into_iter().next() {
                    if let Some(text) = candidate
                        .content
                        .and_then(|c| c.parts.into_iter().next())
                        .and_then(|p| p.text)
                    {
                        if !text.is_empty() {
                            chunks.push(self.delta_chunk(text));
                        }
                    }
                    if let Some(reason) = candidate.finish_reason {
                        chunks.push(self.finish_chunk(FinishReason::from_provider_str(&reason)));
                    }
                }
                Ok(chunks)
            }
        }
    }

    fn delta_chunk(&self, text: String) -> StreamChunk {
        StreamChunk::delta(&self.id, &self.model, text)
    }

    fn finish_chunk(&mut self, reason: FinishReason) -> StreamChunk {
        self.finished = true;
        StreamChunk::finish(&self.id, &self.model, reason)
    }
}

/// 把规范化块序列化为对外 SSE 帧
pub fn sse_frame(chunk: &StreamChunk) -> Result<String, serde_json::Error> {
    Ok(format!("data: {}\n\n", serde_json::to_string(chunk)?))
}

// ==================== 上游流式帧的类型化结构 ====================

#[derive(Debug, Deserialize)]
struct OpenAiStreamFrame {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiStreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiStreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicStreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<AnthropicStreamDelta>,
}

#[derive(Debug, Deserialize)]
struct AnthropicStreamDelta {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiStreamFrame {
    #[serde(default)]
    candidates: Vec<GeminiStreamCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiStreamCandidate {
    #[serde(default)]
    content: Option<GeminiStreamContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiStreamContent {
    #[serde(default)]
    parts: Vec<GeminiStreamPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiStreamPart {
    #[serde(default)]
    text: Option<String>,
}
