//! 增量帧解码器
//!
//! 上游字节流可能在任意位置被网络切开，包括多字节 UTF-8 序列
//! 和 JSON 对象的中间。解码器在字节层面维护缓冲区，只有凑齐
//! 一个完整协议帧之后才向上层交付，绝不对不完整的字节序列做
//! 文本解码。
//!
//! 支持两种帧格式：
//!
//! - SSE：以空行（`\n\n`）分隔的 `data: ...` 记录（OpenAI/Anthropic）
//! - JSON Lines：以换行分隔的完整 JSON 对象（Gemini）
//!
//! 缓冲区只会增长到一个完整帧的大小；帧被取出后对应字节立即丢弃。

/// 帧格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingMode {
    /// SSE `data: ...\n\n` 记录
    Sse,
    /// 换行分隔的 JSON 对象
    JsonLines,
}

/// 一个完整的协议帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// 数据载荷（完整帧的原始字节，尚未做 JSON 解析）
    Data(Vec<u8>),
    /// `[DONE]` 终止哨兵
    Done,
}

/// 增量帧解码器
///
/// 内部游标状态机，独立于任何网络传输，可单独测试。
#[derive(Debug)]
pub struct FrameDecoder {
    mode: FramingMode,
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new(mode: FramingMode) -> Self {
        Self {
            mode,
            buffer: Vec::new(),
        }
    }

    /// 追加一段字节并取出所有已完整的帧
    ///
    /// 不完整的尾部留在缓冲区等待后续字节。
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = self.extract_one() {
            frames.extend(frame);
        }
        frames
    }

    /// 流结束时冲刷缓冲区
    ///
    /// 处理缺少终结分隔符的最后一帧（上游断开时常见）。
    pub fn finish(&mut self) -> Vec<Frame> {
        let remainder = std::mem::take(&mut self.buffer);
        if remainder.iter().all(|b| b.is_ascii_whitespace()) {
            return Vec::new();
        }
        match self.mode {
            FramingMode::Sse => parse_sse_record(&remainder).into_iter().collect(),
            FramingMode::JsonLines => parse_json_line(&remainder).into_iter().collect(),
        }
    }

    /// 从缓冲区头部取出一个完整帧
    ///
    /// 返回 `None` 表示缓冲区里没有完整帧；返回 `Some(None)` 表示
    /// 消费了一个空记录（连续空行）。
    fn extract_one(&mut self) -> Option<Option<Frame>> {
        match self.mode {
            FramingMode::Sse => {
                // SSE 记录以空行结束，兼容 \r\n 行尾
                let end = find_subslice(&self.buffer, b"\n\n")
                    .map(|i| (i, 2))
                    .into_iter()
                    .chain(find_subslice(&self.buffer, b"\r\n\r\n").map(|i| (i, 4)))
                    .min_by_key(|(i, _)| *i)?;
                let record: Vec<u8> = self.buffer.drain(..end.0 + end.1).collect();
                Some(parse_sse_record(&record[..end.0]))
            }
            FramingMode::JsonLines => {
                let newline = self.buffer.iter().position(|&b| b == b'\n')?;
                let line: Vec<u8> = self.buffer.drain(..newline + 1).collect();
                Some(parse_json_line(&line[..newline]))
            }
        }
    }
}

/// 解析一条 SSE 记录，提取 `data:` 行的载荷
///
/// `event:`/`id:`/注释行按 SSE 规范忽略；多条 `data:` 行以换行拼接。
fn parse_sse_record(record: &[u8]) -> Option<Frame> {
    let mut payload: Vec<u8> = Vec::new();
    for line in record.split(|&b| b == b'\n') {
        let line = strip_trailing_cr(line);
        if let Some(rest) = line.strip_prefix(b"data:".as_slice()) {
            let rest = rest.strip_prefix(b" ".as_slice()).unwrap_or(rest);
            if !payload.is_empty() {
                payload.push(b'\n');
            }
            payload.extend_from_slice(rest);
        }
    }
    if payload.is_empty() {
        None
    } else if payload == b"[DONE]" {
        Some(Frame::Done)
    } else {
        Some(Frame::Data(payload))
    }
}

/// 解析一行 JSON Lines 载荷
fn parse_json_line(line: &[u8]) -> Option<Frame> {
    let trimmed = trim_ascii(line);
    // Gemini 偶尔把对象包在数组语法里逐行输出，剥掉行首尾的数组标点
    let trimmed = trim_array_punctuation(trimmed);
    if trimmed.is_empty() {
        None
    } else {
        Some(Frame::Data(trimmed.to_vec()))
    }
}

fn strip_trailing_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r".as_slice()).unwrap_or(line)
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(start);
    &bytes[start..end]
}

fn trim_array_punctuation(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_prefix(b"[".as_slice()).unwrap_or(bytes);
    let bytes = bytes.strip_prefix(b",".as_slice()).unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"]".as_slice()).unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b",".as_slice()).unwrap_or(bytes);
    trim_ascii(bytes)
}

/// 在 haystack 中查找子序列的起始位置
fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_single_record() {
        let mut decoder = FrameDecoder::new(FramingMode::Sse);
        let frames = decoder.push(b"data: {\"a\":1}\n\n");
        assert_eq!(frames, vec![Frame::Data(b"{\"a\":1}".to_vec())]);
    }

    #[test]
    fn test_sse_done_sentinel() {
        let mut decoder = FrameDecoder::new(FramingMode::Sse);
        let frames = decoder.push(b"data: [DONE]\n\n");
        assert_eq!(frames, vec![Frame::Done]);
    }

    #[test]
    fn test_sse_partial_record_waits() {
        let mut decoder = FrameDecoder::new(FramingMode::Sse);
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert!(decoder.push(b":1}").is_empty());
        let frames = decoder.push(b"\n\n");
        assert_eq!(frames, vec![Frame::Data(b"{\"a\":1}".to_vec())]);
    }

    #[test]
    fn test_sse_split_mid_utf8_sequence() {
        // "你好" 的 UTF-8 编码在字节中间切开，只有完整帧才交付
        let record = "data: {\"text\":\"你好\"}\n\n".as_bytes();
        let mut decoder = FrameDecoder::new(FramingMode::Sse);
        let mut frames = Vec::new();
        for b in record {
            frames.extend(decoder.push(&[*b]));
        }
        assert_eq!(
            frames,
            vec![Frame::Data("{\"text\":\"你好\"}".as_bytes().to_vec())]
        );
    }

    #[test]
    fn test_sse_ignores_event_and_comment_lines() {
        let mut decoder = FrameDecoder::new(FramingMode::Sse);
        let frames = decoder.push(b"event: message_start\ndata: {\"a\":1}\n\n: keepalive\n\n");
        assert_eq!(frames, vec![Frame::Data(b"{\"a\":1}".to_vec())]);
    }

    #[test]
    fn test_sse_crlf_line_endings() {
        let mut decoder = FrameDecoder::new(FramingMode::Sse);
        let frames = decoder.push(b"data: {\"a\":1}\r\n\r\n");
        assert_eq!(frames, vec![Frame::Data(b"{\"a\":1}".to_vec())]);
    }

    #[test]
    fn test_sse_multiple_records_one_push() {
        let mut decoder = FrameDecoder::new(FramingMode::Sse);
        let frames = decoder.push(b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\n");
        assert_eq!(
            frames,
            vec![
                Frame::Data(b"{\"a\":1}".to_vec()),
                Frame::Data(b"{\"b\":2}".to_vec()),
            ]
        );
    }

    #[test]
    fn test_json_lines() {
        let mut decoder = FrameDecoder::new(FramingMode::JsonLines);
        let frames = decoder.push(b"{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(
            frames,
            vec![
                Frame::Data(b"{\"a\":1}".to_vec()),
                Frame::Data(b"{\"b\":2}".to_vec()),
            ]
        );
    }

    #[test]
    fn test_json_lines_array_punctuation() {
        let mut decoder = FrameDecoder::new(FramingMode::JsonLines);
        let frames = decoder.push(b"[{\"a\":1}\n,{\"b\":2}\n]\n");
        assert_eq!(
            frames,
            vec![
                Frame::Data(b"{\"a\":1}".to_vec()),
                Frame::Data(b"{\"b\":2}".to_vec()),
            ]
        );
    }

    #[test]
    fn test_finish_flushes_trailing_line() {
        // 上游断开时最后一行可能没有换行
        let mut decoder = FrameDecoder::new(FramingMode::JsonLines);
        assert!(decoder.push(b"{\"a\":1}").is_empty());
        let frames = decoder.finish();
        assert_eq!(frames, vec![Frame::Data(b"{\"a\":1}".to_vec())]);
    }

    #[test]
    fn test_finish_on_whitespace_only() {
        let mut decoder = FrameDecoder::new(FramingMode::Sse);
        decoder.push(b"\n");
        assert!(decoder.finish().is_empty());
    }
}
