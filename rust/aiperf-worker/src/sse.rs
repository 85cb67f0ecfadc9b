//! Server-Sent Events framing (spec §6): `data: <json>\n\n`, tolerating
//! interleaved `:`-comments, `event:`/`id:`/`retry:` fields, partial chunks
//! spanning socket reads, and the `data: [DONE]` sentinel.

use bytes::BytesMut;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(Vec<u8>),
    Done,
}

/// Incremental SSE decoder. Feed it raw bytes as they arrive off the socket;
/// it returns every complete event the new bytes completed, buffering any
/// trailing partial event for the next call.
#[derive(Default)]
pub struct SseDecoder {
    buf: BytesMut,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();

        loop {
            let boundary = find_event_boundary(&self.buf);
            let Some(end) = boundary else { break };
            let raw = self.buf.split_to(end);
            // Skip the blank line separator itself.
            let sep_len = separator_len(&self.buf);
            let _ = self.buf.split_to(sep_len);

            if let Some(event) = parse_event(&raw) {
                events.push(event);
            }
        }

        events
    }
}

/// Finds the byte offset of the first `\n\n` or `\r\n\r\n` separator,
/// returning the length of the event body preceding it.
fn find_event_boundary(buf: &BytesMut) -> Option<usize> {
    let bytes = buf.as_ref();
    for i in 0..bytes.len() {
        if bytes[i..].starts_with(b"\n\n") {
            return Some(i);
        }
        if bytes[i..].starts_with(b"\r\n\r\n") {
            return Some(i);
        }
    }
    None
}

fn separator_len(buf: &BytesMut) -> usize {
    let bytes = buf.as_ref();
    if bytes.starts_with(b"\r\n\r\n") {
        4
    } else if bytes.starts_with(b"\n\n") {
        2
    } else {
        0
    }
}

fn parse_event(raw: &[u8]) -> Option<SseEvent> {
    let text = String::from_utf8_lossy(raw);
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.split(['\n']) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
        // event:/id:/retry: fields carry no information this engine needs.
    }

    if data_lines.is_empty() {
        return None;
    }
    let data = data_lines.join("\n");
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    Some(SseEvent::Data(data.into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_single_complete_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"token\":\"hi\"}\n\n");
        assert_eq!(events, vec![SseEvent::Data(br#"{"token":"hi"}"#.to_vec())]);
    }

    #[test]
    fn buffers_a_partial_chunk_across_two_pushes() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"to").is_empty());
        let events = decoder.push(b"ken\":\"hi\"}\n\n");
        assert_eq!(events, vec![SseEvent::Data(br#"{"token":"hi"}"#.to_vec())]);
    }

    #[test]
    fn ignores_comments_and_other_fields() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\nevent: message\nid: 1\ndata: {\"a\":1}\n\n");
        assert_eq!(events, vec![SseEvent::Data(br#"{"a":1}"#.to_vec())]);
    }

    #[test]
    fn recognizes_the_done_sentinel() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: [DONE]\n\n");
        assert_eq!(events, vec![SseEvent::Done]);
    }

    #[test]
    fn decodes_multiple_events_from_one_chunk() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"a\":1}\n\ndata: {\"a\":2}\n\ndata: [DONE]\n\n");
        assert_eq!(
            events,
            vec![
                SseEvent::Data(br#"{"a":1}"#.to_vec()),
                SseEvent::Data(br#"{"a":2}"#.to_vec()),
                SseEvent::Done,
            ]
        );
    }
}
