use super::vertex::{VertexTarget, resolve_model};
use super::{
    NormalizedEvent, ProviderAdapter, ProviderRequest, StreamHandle, Voice, has_pending_prompt,
    snippet_grounding, wire_temperature,
};
use crate::error::GatewayError;
use crate::runes::context::ConversationContext;
use crate::runes::frame::Framing;
use crate::runes::journal::{Role, Transcript};
use crate::runes::settings::{ProviderId, ProviderSettings};
use log::debug;
use serde_json::{Value, json};

pub const DEFAULT_MODEL: &str = "gemini-pro";

const OPENING_USER: &str = "You are a helpful assistant!";
const OPENING_MODEL: &str = "Sure. How can I help?";
const ACKNOWLEDGE: &str = "Ok. got it.";

pub struct GeminiAdapter;

fn content(role: &str, text: &str) -> Value {
    json!({"role": role, "parts": {"text": text}})
}

impl ProviderAdapter for GeminiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::GeminiVertex
    }

    fn framing(&self) -> Framing {
        Framing::PrefixArray
    }

    fn build_request(
        &self,
        context: &ConversationContext,
        history: &Transcript,
        settings: &ProviderSettings,
    ) -> Result<Option<ProviderRequest>, GatewayError> {
        if !has_pending_prompt(history) {
            return Ok(None);
        }
        let target = VertexTarget::from_credentials(&settings.credentials)?;
        let model = resolve_model(settings.model_non_empty(), &settings.credentials, DEFAULT_MODEL);

        // Gemini has no system role; grounding is a user turn the model acknowledges.
        let mut contents = vec![content("USER", OPENING_USER), content("MODEL", OPENING_MODEL)];
        for snippet in context.snippets() {
            contents.push(content("USER", &snippet_grounding(snippet, Voice::FirstPerson)));
            contents.push(content("MODEL", ACKNOWLEDGE));
        }
        for turn in &history.turns {
            let role = match turn.role {
                Role::Assistant => "MODEL",
                Role::User | Role::Prompt => "USER",
            };
            contents.push(content(role, &turn.content));
        }

        let body = json!({
            "contents": contents,
            "generation_config": {
                "temperature": wire_temperature(settings.temperature),
                "topP": 0.8,
                "topK": 40,
            },
        });
        Ok(Some(ProviderRequest {
            url: target.url(model, "streamGenerateContent"),
            bearer: Some(target.token.clone()),
            body,
            model: model.to_string(),
            require_ok_status: false,
        }))
    }

    fn normalize(&self, unit: Value, stream: &mut StreamHandle) {
        if let Some(text) = unit
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
        {
            let model = stream.request_model().to_string();
            stream.emit_content(&model, text);
            return;
        }
        let trailer = unit.get("usageMetadata").is_some()
            || unit.pointer("/candidates/0/finishReason").is_some();
        if trailer {
            debug!("skipping gemini trailer unit");
            return;
        }
        stream.push(NormalizedEvent::MalformedChunk(unit.to_string()));
    }
}
