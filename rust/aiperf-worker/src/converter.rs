//! Request converters and response extractors: the two extension points
//! (spec §6) the core doesn't own. Each endpoint family the worker speaks
//! to gets one of each; only `chat` ships a real implementation, since
//! endpoint-specific bodies for the rest are out of scope.

use aiperf_core::{AiperfError, AiperfResult, ParsedResponse, ParsedResponseData, Tokenizer, Turn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointFamily {
    Chat,
    Completions,
    Embeddings,
    Responses,
    Generate,
    Other,
}

impl EndpointFamily {
    pub fn path(self) -> &'static str {
        match self {
            EndpointFamily::Chat => "/v1/chat/completions",
            EndpointFamily::Completions => "/v1/completions",
            EndpointFamily::Embeddings => "/v1/embeddings",
            EndpointFamily::Responses => "/v1/responses",
            EndpointFamily::Generate => "/",
            EndpointFamily::Other => "/",
        }
    }

    pub fn streams(self) -> bool {
        !matches!(self, EndpointFamily::Embeddings | EndpointFamily::Other)
    }
}

/// What the worker needs to know about the target endpoint to build a
/// request payload.
#[derive(Debug, Clone)]
pub struct ModelEndpointInfo {
    pub model: String,
    pub base_url: String,
    pub family: EndpointFamily,
    pub streaming: bool,
}

impl ModelEndpointInfo {
    pub fn request_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.family.path())
    }
}

/// `(ModelEndpointInfo, Turn) -> JSON payload`.
pub trait RequestConverter: Send + Sync {
    fn convert(&self, endpoint: &ModelEndpointInfo, turn: &Turn) -> AiperfResult<Value>;
}

/// `(raw response bytes, tokenizer) -> list<ParsedResponse>`. Fed one SSE
/// data frame (or, for non-streaming endpoints, the whole body) at a time.
pub trait ResponseExtractor: Send + Sync {
    fn extract(&self, perf_ns: aiperf_core::PerfNs, raw: &[u8], tokenizer: &dyn Tokenizer) -> AiperfResult<Option<ParsedResponse>>;

    /// Whether `raw` marks end-of-stream (e.g. the SSE `[DONE]` sentinel was
    /// already filtered upstream; this exists for non-SSE extractors that
    /// see their own terminal marker inline).
    fn is_terminal(&self, _raw: &[u8]) -> bool {
        false
    }
}

/// `/v1/chat/completions` reference implementation.
pub struct ChatConverter;

impl RequestConverter for ChatConverter {
    fn convert(&self, endpoint: &ModelEndpointInfo, turn: &Turn) -> AiperfResult<Value> {
        Ok(json!({
            "model": endpoint.model,
            "stream": endpoint.streaming,
            "messages": [
                { "role": role_str(turn.role), "content": turn.text }
            ],
        }))
    }
}

fn role_str(role: aiperf_core::TurnRole) -> &'static str {
    match role {
        aiperf_core::TurnRole::User => "user",
        aiperf_core::TurnRole::Assistant => "assistant",
        aiperf_core::TurnRole::System => "system",
    }
}

/// `/v1/chat/completions` streaming-delta reference extractor. Expects
/// OpenAI-shaped chunks: `{"choices":[{"delta":{"content": "..."}}]}`.
pub struct ChatExtractor;

#[derive(Deserialize)]
struct ChatChunk {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    delta: ChatDelta,
}

#[derive(Deserialize, Default)]
struct ChatDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
}

impl ResponseExtractor for ChatExtractor {
    fn extract(&self, perf_ns: aiperf_core::PerfNs, raw: &[u8], _tokenizer: &dyn Tokenizer) -> AiperfResult<Option<ParsedResponse>> {
        let chunk: ChatChunk = serde_json::from_slice(raw)
            .map_err(|err| AiperfError::Parse(format!("chat chunk decode failed: {err}")))?;
        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(None);
        };
        if choice.delta.content.is_none() && choice.delta.reasoning_content.is_none() {
            return Ok(None);
        }
        Ok(Some(ParsedResponse {
            perf_ns,
            data: ParsedResponseData::Text {
                text: choice.delta.content.unwrap_or_default(),
                reasoning: choice.delta.reasoning_content,
            },
        }))
    }
}

/// Placeholder for endpoint families this crate does not implement. Any
/// call fails with `ParseError`, matching spec.md §1's out-of-scope list
/// (TGI, Triton, NIM rankings, etc.).
pub struct UnsupportedExtractor {
    pub family: EndpointFamily,
}

impl ResponseExtractor for UnsupportedExtractor {
    fn extract(&self, _perf_ns: aiperf_core::PerfNs, _raw: &[u8], _tokenizer: &dyn Tokenizer) -> AiperfResult<Option<ParsedResponse>> {
        Err(AiperfError::Parse(format!(
            "no response extractor implemented for endpoint family {:?}",
            self.family
        )))
    }
}

/// Selects a [`ResponseExtractor`] for a family, per the registry-over-
/// reflection pattern used elsewhere in this workspace.
pub fn extractor_for(family: EndpointFamily) -> Box<dyn ResponseExtractor> {
    match family {
        EndpointFamily::Chat => Box::new(ChatExtractor),
        other => Box::new(UnsupportedExtractor { family: other }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_core::{TurnRole, WhitespaceTokenizer};

    #[test]
    fn chat_converter_builds_openai_shaped_payload() {
        let endpoint = ModelEndpointInfo {
            model: "llama".into(),
            base_url: "http://localhost:8000".into(),
            family: EndpointFamily::Chat,
            streaming: true,
        };
        let turn = Turn {
            role: TurnRole::User,
            text: "hello".into(),
            timestamp_ns: None,
        };
        let payload = ChatConverter.convert(&endpoint, &turn).unwrap();
        assert_eq!(payload["model"], "llama");
        assert_eq!(payload["messages"][0]["content"], "hello");
    }

    #[test]
    fn chat_extractor_pulls_delta_content() {
        let tokenizer = WhitespaceTokenizer;
        let raw = br#"{"choices":[{"delta":{"content":"hi"}}]}"#;
        let parsed = ChatExtractor
            .extract(aiperf_core::PerfNs(0), raw, &tokenizer)
            .unwrap()
            .unwrap();
        match parsed.data {
            ParsedResponseData::Text { text, .. } => assert_eq!(text, "hi"),
            _ => panic!("expected text data"),
        }
    }

    #[test]
    fn unsupported_family_returns_parse_error() {
        let tokenizer = WhitespaceTokenizer;
        let extractor = extractor_for(EndpointFamily::Generate);
        let result = extractor.extract(aiperf_core::PerfNs(0), b"{}", &tokenizer);
        assert!(result.is_err());
    }
}
