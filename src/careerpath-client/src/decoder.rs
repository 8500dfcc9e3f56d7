//! SSE frame decoding.
//!
//! Turns raw body chunks into discrete frames. Network chunk boundaries are
//! arbitrary: a chunk may end in the middle of a frame, a line, or a
//! multi-byte UTF-8 character, so both the text and the bytes are carried
//! over until a later chunk completes them.

/// Line prefix that marks a payload line.
pub const DATA_PREFIX: &str = "data: ";

/// Payload that terminates the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Blank line separating frames.
const FRAME_SEPARATOR: &str = "\n\n";

/// Payload of one `data: ` frame, not yet interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    pub raw_payload: String,
}

impl StreamFrame {
    pub fn new(raw_payload: impl Into<String>) -> Self {
        Self {
            raw_payload: raw_payload.into(),
        }
    }
}

/// Output of the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedFrame {
    /// A payload frame to be interpreted.
    Data(StreamFrame),
    /// The `[DONE]` sentinel.
    Done,
}

/// Incremental UTF-8 decoder.
///
/// Holds back the bytes of a multi-byte character split across chunks until
/// the rest arrives. Invalid sequences decode to U+FFFD instead of failing.
#[derive(Debug, Default)]
pub struct Utf8StreamBuffer {
    pending: Vec<u8>,
}

impl Utf8StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push raw bytes and return every character they complete.
    pub fn push(&mut self, data: &[u8]) -> String {
        self.pending.extend_from_slice(data);

        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&self.pending[..valid]) {
                        out.push_str(text);
                    }
                    match e.error_len() {
                        // Incomplete sequence at the end: keep it for the next chunk.
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }

    /// Number of bytes waiting for completion.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }
}

/// Splits a byte stream into SSE frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    utf8: Utf8StreamBuffer,
    buffer: String,
    frames_decoded: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk and return the frames it completes, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DecodedFrame> {
        let text = self.utf8.push(chunk);
        if text.is_empty() {
            return Vec::new();
        }
        self.buffer.push_str(&text);

        let mut frames = Vec::new();
        while let Some(end) = self.buffer.find(FRAME_SEPARATOR) {
            let block: String = self.buffer.drain(..end + FRAME_SEPARATOR.len()).collect();
            if let Some(frame) = parse_block(&block[..end]) {
                self.frames_decoded += 1;
                frames.push(frame);
            }
        }
        frames
    }

    /// Bytes and characters received but not yet part of a complete frame.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len() + self.utf8.pending_bytes()
    }

    /// Total frames produced so far.
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// End of stream. An unterminated tail is not a frame; its size is
    /// returned so the caller can log it.
    pub fn finish(self) -> usize {
        let discarded = self.pending_bytes();
        if discarded > 0 {
            tracing::debug!(discarded, "Discarding unterminated SSE data at end of stream");
        }
        discarded
    }
}

/// Extract the payload of one blank-line-delimited block.
///
/// Only `data: ` lines count; comments, keepalives and other SSE fields are
/// skipped. Several data lines are joined with a newline.
fn parse_block(block: &str) -> Option<DecodedFrame> {
    let mut payload: Option<String> = None;
    for line in block.split('\n') {
        if let Some(data) = line.strip_prefix(DATA_PREFIX) {
            match payload.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(data);
                }
                None => payload = Some(data.to_string()),
            }
        }
    }

    payload.map(|payload| {
        if payload == DONE_SENTINEL {
            DecodedFrame::Done
        } else {
            DecodedFrame::Data(StreamFrame::new(payload))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn data(payload: &str) -> DecodedFrame {
        DecodedFrame::Data(StreamFrame::new(payload))
    }

    fn decode_all(chunks: &[&[u8]]) -> Vec<DecodedFrame> {
        let mut decoder = FrameDecoder::new();
        chunks.iter().flat_map(|c| decoder.feed(c)).collect()
    }

    #[test]
    fn test_single_chunk_many_frames() {
        let frames = decode_all(&[b"data: one\n\ndata: two\n\ndata: [DONE]\n\n"]);
        assert_eq!(frames, vec![data("one"), data("two"), DecodedFrame::Done]);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"data: {\"type\":\"tok").is_empty());
        assert!(decoder.feed(b"en\"}\n").is_empty());
        assert_eq!(decoder.feed(b"\n"), vec![data("{\"type\":\"token\"}")]);
        assert_eq!(decoder.pending_bytes(), 0);
    }

    #[test]
    fn test_every_split_point_yields_same_frames() {
        let wire = "data: {\"content\":\"caf\u{e9} \u{1f600}\"}\n\n: keepalive\n\ndata: [DONE]\n\n";
        let bytes = wire.as_bytes();
        let expected = decode_all(&[bytes]);
        assert_eq!(expected.len(), 2);

        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(decode_all(&[a, b]), expected, "split at byte {split}");
        }
        let single_bytes: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_all(&single_bytes), expected);
    }

    #[test]
    fn test_non_data_lines_ignored() {
        let frames = decode_all(&[b": ping\n\nevent: message\nid: 7\ndata: x\n\nretry: 10\n\n"]);
        assert_eq!(frames, vec![data("x")]);
    }

    #[test]
    fn test_multiple_data_lines_joined() {
        let frames = decode_all(&[b"data: first\ndata: second\n\n"]);
        assert_eq!(frames, vec![data("first\nsecond")]);
    }

    #[test]
    fn test_done_only_when_exact() {
        let frames = decode_all(&[b"data: [DONE] \n\ndata: [DONE]\n\n"]);
        assert_eq!(frames, vec![data("[DONE] "), DecodedFrame::Done]);
    }

    #[test]
    fn test_unterminated_tail_discarded() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: complete\n\ndata: {\"type\":\"token\",\"content\":\"Hi");
        assert_eq!(frames, vec![data("complete")]);
        assert_eq!(decoder.frames_decoded(), 1);
        let discarded = decoder.finish();
        assert_eq!(discarded, "data: {\"type\":\"token\",\"content\":\"Hi".len());
    }

    #[test]
    fn test_utf8_buffer_holds_partial_character() {
        let mut buffer = Utf8StreamBuffer::new();
        let smile = "\u{1f600}".as_bytes();
        assert_eq!(buffer.push(&smile[..2]), "");
        assert_eq!(buffer.pending_bytes(), 2);
        assert_eq!(buffer.push(&smile[2..]), "\u{1f600}");
        assert_eq!(buffer.pending_bytes(), 0);
    }

    #[test]
    fn test_utf8_buffer_replaces_invalid_bytes() {
        let mut buffer = Utf8StreamBuffer::new();
        assert_eq!(buffer.push(b"a\xffb"), "a\u{fffd}b");
        assert_eq!(buffer.pending_bytes(), 0);
    }
}
