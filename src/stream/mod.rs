//! 流式转码层
//!
//! 把上游字节流增量转成规范化的流式块，再序列化为对外的 SSE 帧：
//!
//! ```text
//! 上游字节流 ──> [FrameDecoder] ──> 完整协议帧 ──> [StreamTranscoder] ──> StreamChunk ──> SSE
//! ```
//!
//! # 模块结构
//!
//! - `frame`: 增量帧解码器，处理任意切分边界（包括 UTF-8 序列中间）
//! - `transcoder`: Provider 帧 → 规范化块的翻译，以及 SSE 序列化

pub mod frame;
pub mod transcoder;

pub use frame::{Frame, FrameDecoder, FramingMode};
pub use transcoder::{sse_frame, StreamFormat, StreamTranscoder, SSE_DONE};
