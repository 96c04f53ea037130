use super::vertex::{VertexTarget, resolve_model};
use super::{
    ModelUpgrade, NormalizedEvent, ProviderAdapter, ProviderRequest, StreamHandle, SYSTEM_FRAMING,
    Voice, chat_role, has_pending_prompt, snippet_grounding, wire_temperature,
};
use crate::error::GatewayError;
use crate::runes::context::ConversationContext;
use crate::runes::frame::Framing;
use crate::runes::journal::Transcript;
use crate::runes::settings::{ProviderId, ProviderSettings};
use serde_json::{Value, json};

pub const DEFAULT_MODEL: &str = "chat-bison";

const UPGRADE: ModelUpgrade = ModelUpgrade {
    max_words: 6000,
    upgraded: "chat-bison-32k",
};

const CONTENT_POINTER: &str = "/outputs/0/structVal/candidates/listVal/0/structVal/content/stringVal/0";

pub struct PalmAdapter;

fn string_val(text: &str) -> Value {
    json!({"string_val": [text]})
}

/// Grounding goes out as one string holding a JSON array of system messages.
fn context_string(context: &ConversationContext) -> String {
    let mut info = vec![json!({"role": "system", "content": SYSTEM_FRAMING})];
    for snippet in context.snippets() {
        info.push(json!({
            "role": "system",
            "content": snippet_grounding(snippet, Voice::ThirdPerson),
        }));
    }
    Value::Array(info).to_string()
}

impl ProviderAdapter for PalmAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::PalmVertex
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
        let requested =
            resolve_model(settings.model_non_empty(), &settings.credentials, DEFAULT_MODEL);

        let messages = Value::Array(
            history
                .turns
                .iter()
                .map(|turn| {
                    json!({"struct_val": {
                        "author": string_val(chat_role(turn.role)),
                        "content": string_val(&turn.content),
                    }})
                })
                .collect(),
        );
        let model = UPGRADE.apply(requested, &messages, |m| {
            m.contains("chat-bison") && !m.contains("-32k")
        });

        let body = json!({
            "inputs": [{"struct_val": {
                "context": string_val(&context_string(context)),
                "messages": {"list_val": messages},
            }}],
            "parameters": {"struct_val": {
                "temperature": {"float_val": wire_temperature(settings.temperature)},
                "topP": {"float_val": 0.8},
                "topK": {"int_val": 40},
            }},
        });
        Ok(Some(ProviderRequest {
            url: target.url(&model, "serverStreamingPredict"),
            bearer: Some(target.token.clone()),
            body,
            model,
            require_ok_status: false,
        }))
    }

    fn normalize(&self, unit: Value, stream: &mut StreamHandle) {
        match unit.pointer(CONTENT_POINTER).and_then(Value::as_str) {
            Some(text) => {
                let model = stream.request_model().to_string();
                stream.emit_content(&model, text);
            }
            None => stream.push(NormalizedEvent::MalformedChunk(unit.to_string())),
        }
    }
}
