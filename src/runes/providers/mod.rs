//! Backend adapters. Each one shapes a request from the context and turn
//! history, and maps its backend's streamed units onto [`NormalizedEvent`]s.

pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod palm;
mod vertex;

use crate::error::GatewayError;
use crate::runes::context::{CaptureMethod, CapturedSnippet, ConversationContext};
use crate::runes::frame::{Frame, FrameReader, Framing};
use crate::runes::journal::{Role, Transcript};
use crate::runes::settings::{GatewayConfig, ProviderId, ProviderSettings};
use crate::runes::util::truncate_with_ellipsis;
use log::{debug, warn};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::time::Duration;

pub const SYSTEM_FRAMING: &str = "You are a helpful assistant.";
const STATUS_BODY_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedEvent {
    ContentDelta(String),
    ModelAnnounced(String),
    Done,
    MalformedChunk(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub url: String,
    pub bearer: Option<String>,
    pub body: Value,
    /// Effective model after any context-size upgrade.
    pub model: String,
    /// Treat any status other than 200 as a hard failure before streaming.
    pub require_ok_status: bool,
}

/// Live response body plus the events already normalized from it.
pub struct StreamHandle {
    frames: FrameReader<Box<dyn BufRead + Send>>,
    pending: VecDeque<NormalizedEvent>,
    announced: Option<String>,
    request_model: String,
}

impl StreamHandle {
    pub fn new(reader: Box<dyn BufRead + Send>, framing: Framing) -> Self {
        Self {
            frames: FrameReader::new(reader, framing),
            pending: VecDeque::new(),
            announced: None,
            request_model: String::new(),
        }
    }

    /// Model the request was sent for, for backends whose units omit it.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.request_model = model.into();
        self
    }

    pub fn request_model(&self) -> &str {
        &self.request_model
    }

    pub fn from_reader<R: BufRead + Send + 'static>(reader: R, framing: Framing) -> Self {
        Self::new(Box::new(reader), framing)
    }

    /// Announces `model` the first time it is seen (or when it changes), then
    /// queues `text` if non-empty.
    pub fn emit_content(&mut self, model: &str, text: &str) {
        if self.announced.as_deref() != Some(model) {
            self.announced = Some(model.to_string());
            self.pending
                .push_back(NormalizedEvent::ModelAnnounced(model.to_string()));
        }
        if !text.is_empty() {
            self.pending
                .push_back(NormalizedEvent::ContentDelta(text.to_string()));
        }
    }

    pub fn push(&mut self, event: NormalizedEvent) {
        self.pending.push_back(event);
    }

    pub fn pop(&mut self) -> Option<NormalizedEvent> {
        self.pending.pop_front()
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>, GatewayError> {
        match self.frames.next() {
            None => Ok(None),
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(err)) => Err(GatewayError::StreamRead(err)),
        }
    }

    /// Whatever the backend still has to say, used as error diagnostics.
    pub fn drain(&mut self) -> String {
        self.frames.drain()
    }
}

pub trait ProviderAdapter: Send {
    fn id(&self) -> ProviderId;

    fn framing(&self) -> Framing;

    /// `Ok(None)` when the history has no trailing prompt.
    fn build_request(
        &self,
        context: &ConversationContext,
        history: &Transcript,
        settings: &ProviderSettings,
    ) -> Result<Option<ProviderRequest>, GatewayError>;

    /// Maps one complete unit onto events queued on `stream`.
    fn normalize(&self, unit: Value, stream: &mut StreamHandle);

    fn execute(
        &self,
        request: &ProviderRequest,
        config: &GatewayConfig,
    ) -> Result<StreamHandle, GatewayError> {
        post_streaming(request, self.framing(), config)
    }

    fn read_frame(
        &self,
        stream: &mut StreamHandle,
    ) -> Result<Option<NormalizedEvent>, GatewayError> {
        loop {
            if let Some(event) = stream.pop() {
                return Ok(Some(event));
            }
            match stream.next_frame()? {
                None => return Ok(None),
                Some(Frame::Done) => return Ok(Some(NormalizedEvent::Done)),
                Some(Frame::Malformed(raw)) => {
                    warn!("{} sent an unparseable chunk", self.id());
                    return Ok(Some(NormalizedEvent::MalformedChunk(raw)));
                }
                Some(Frame::Unit(unit)) => self.normalize(unit, stream),
            }
        }
    }
}

pub fn select(provider: ProviderId) -> Box<dyn ProviderAdapter> {
    match provider {
        ProviderId::OpenAi => Box::new(openai::OpenAiAdapter),
        ProviderId::GeminiVertex => Box::new(gemini::GeminiAdapter),
        ProviderId::PalmVertex => Box::new(palm::PalmAdapter),
        ProviderId::Ollama => Box::new(ollama::OllamaAdapter),
    }
}

fn post_streaming(
    request: &ProviderRequest,
    framing: Framing,
    config: &GatewayConfig,
) -> Result<StreamHandle, GatewayError> {
    let client = reqwest::blocking::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.stream_timeout_secs))
        .build()?;

    debug!("POST {} (model {})", request.url, request.model);
    let mut builder = client
        .post(&request.url)
        .header(CONTENT_TYPE, "application/json")
        .json(&request.body);
    if let Some(token) = request.bearer.as_deref() {
        builder = builder.bearer_auth(token);
    }
    let response = builder.send()?;

    let status = response.status();
    if request.require_ok_status && status.as_u16() != 200 {
        let body = response.text().unwrap_or_default();
        let body = truncate_with_ellipsis(&body, STATUS_BODY_MAX_CHARS);
        return Err(GatewayError::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }
    Ok(StreamHandle::new(Box::new(BufReader::new(response)), framing).with_model(&request.model))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Voice {
    /// "the user's clipboard"
    ThirdPerson,
    /// "my clipboard"
    FirstPerson,
}

impl Voice {
    fn possessive(self) -> &'static str {
        match self {
            Voice::ThirdPerson => "the user's",
            Voice::FirstPerson => "my",
        }
    }
}

pub fn grounding_text(method: &CaptureMethod, text: &str, voice: Voice) -> String {
    let whose = voice.possessive();
    match method {
        CaptureMethod::Clipboard => {
            format!("The text content from a portion of {whose} clipboard is as follows: {text}")
        }
        CaptureMethod::RegionOcr => format!(
            "The text content captured by OCR from a portion of {whose} screen is as follows: {text}"
        ),
        CaptureMethod::ScrollOcr => format!(
            "The text content captured by OCR from a portion of {whose} screen is included below. It might have some redundant lines. \n{text}"
        ),
        CaptureMethod::LiveFile => format!("The content of a file is included below: \n{text}"),
        CaptureMethod::Other(label) => {
            format!("Some additional information labeled as {label} is included below: \n{text}")
        }
    }
}

pub fn snippet_grounding(snippet: &CapturedSnippet, voice: Voice) -> String {
    grounding_text(&snippet.method, &snippet.content(), voice)
}

/// Widens through the shortest decimal form so `0.8` stays `0.8` on the wire.
pub fn wire_temperature(temperature: f32) -> f64 {
    temperature
        .to_string()
        .parse()
        .unwrap_or(f64::from(temperature))
}

/// Maximal runs of alphanumeric or `_` characters.
pub fn count_words(text: &str) -> usize {
    let mut count = 0;
    let mut in_word = false;
    for c in text.chars() {
        let word_char = c.is_alphanumeric() || c == '_';
        if word_char && !in_word {
            count += 1;
        }
        in_word = word_char;
    }
    count
}

/// Swap to a larger-context model once the payload grows past `max_words`.
#[derive(Debug, Clone, Copy)]
pub struct ModelUpgrade {
    pub max_words: usize,
    pub upgraded: &'static str,
}

impl ModelUpgrade {
    pub fn apply(
        &self,
        model: &str,
        payload: &Value,
        applies_to: impl Fn(&str) -> bool,
    ) -> String {
        if model == self.upgraded || !applies_to(model) {
            return model.to_string();
        }
        let words = count_words(&payload.to_string());
        if words > self.max_words {
            debug!(
                "{words} words exceed {}; upgrading {model} to {}",
                self.max_words, self.upgraded
            );
            self.upgraded.to_string()
        } else {
            model.to_string()
        }
    }
}

/// Chat-style role for a turn. Unanswered prompts go out as user turns.
pub fn chat_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "assistant",
        Role::User | Role::Prompt => "user",
    }
}

pub fn has_pending_prompt(history: &Transcript) -> bool {
    history.pending_prompt().is_some()
}

/// `{role, content}` messages: system framing, one system message per
/// snippet, then the history.
pub fn chat_messages(context: &ConversationContext, history: &Transcript) -> Vec<Value> {
    let mut messages = vec![serde_json::json!({"role": "system", "content": SYSTEM_FRAMING})];
    for snippet in context.snippets() {
        messages.push(serde_json::json!({
            "role": "system",
            "content": snippet_grounding(snippet, Voice::ThirdPerson),
        }));
    }
    for turn in &history.turns {
        messages.push(serde_json::json!({
            "role": chat_role(turn.role),
            "content": turn.content,
        }));
    }
    messages
}


#[cfg(test)]
mod tests {
    use super::{
        ModelUpgrade, NormalizedEvent, StreamHandle, Voice, count_words, grounding_text, select,
    };
    use crate::runes::context::CaptureMethod;
    use crate::runes::frame::Framing;
    use crate::runes::settings::ProviderId;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn word_count_uses_word_character_runs() {
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("hello, world"), 2);
        assert_eq!(count_words("{\"role\":\"user\",\"content\":\"snake_case x1\"}"), 5);
    }

    #[test]
    fn grounding_voice_changes_possessive_only() {
        let third = grounding_text(&CaptureMethod::Clipboard, "abc", Voice::ThirdPerson);
        let first = grounding_text(&CaptureMethod::Clipboard, "abc", Voice::FirstPerson);
        assert_eq!(
            third,
            "The text content from a portion of the user's clipboard is as follows: abc"
        );
        assert_eq!(
            first,
            "The text content from a portion of my clipboard is as follows: abc"
        );
        assert_eq!(
            grounding_text(&CaptureMethod::Other("Notes".to_string()), "x", Voice::FirstPerson),
            "Some additional information labeled as Notes is included below: \nx"
        );
    }

    #[test]
    fn upgrade_triggers_only_above_threshold() {
        let upgrade = ModelUpgrade {
            max_words: 3,
            upgraded: "big",
        };
        let at = json!(["a", "b", "c"]);
        let above = json!(["a", "b", "c", "d"]);
        assert_eq!(upgrade.apply("small", &at, |_| true), "small");
        assert_eq!(upgrade.apply("small", &above, |_| true), "big");
        assert_eq!(upgrade.apply("other", &above, |m| m == "small"), "other");
    }

    #[test]
    fn emit_content_announces_model_once() {
        let mut stream = StreamHandle::from_reader(
            Cursor::new(""),
            Framing::Lines {
                data_prefix: None,
                done_sentinel: None,
            },
        );
        stream.emit_content("m", "a");
        stream.emit_content("m", "");
        stream.emit_content("m", "b");
        let events: Vec<NormalizedEvent> = std::iter::from_fn(|| stream.pop()).collect();
        assert_eq!(
            events,
            vec![
                NormalizedEvent::ModelAnnounced("m".to_string()),
                NormalizedEvent::ContentDelta("a".to_string()),
                NormalizedEvent::ContentDelta("b".to_string()),
            ]
        );
    }

    #[test]
    fn select_is_keyed_by_provider_id() {
        for id in [
            ProviderId::OpenAi,
            ProviderId::GeminiVertex,
            ProviderId::PalmVertex,
            ProviderId::Ollama,
        ] {
            assert_eq!(select(id).id(), id);
        }
    }
}
