use super::{
    ModelUpgrade, NormalizedEvent, ProviderAdapter, ProviderRequest, StreamHandle, chat_messages,
    has_pending_prompt, wire_temperature,
};
use crate::error::GatewayError;
use crate::runes::context::ConversationContext;
use crate::runes::frame::Framing;
use crate::runes::journal::Transcript;
use crate::runes::settings::{OPENAI_API_KEY_VAR, ProviderId, ProviderSettings};
use serde_json::{Value, json};

pub const API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

const UPGRADE: ModelUpgrade = ModelUpgrade {
    max_words: 2000,
    upgraded: "gpt-3.5-turbo-16k",
};

pub struct OpenAiAdapter;

impl ProviderAdapter for OpenAiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn framing(&self) -> Framing {
        Framing::Lines {
            data_prefix: Some("data:"),
            done_sentinel: Some("[DONE]"),
        }
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
        let api_key = settings.credentials.openai_api_key.clone().ok_or_else(|| {
            GatewayError::missing(
                OPENAI_API_KEY_VAR,
                "Set it to an API key from your OpenAI account.",
            )
        })?;

        let messages = Value::Array(chat_messages(context, history));
        let requested = settings.model_non_empty().unwrap_or(DEFAULT_MODEL);
        let model = UPGRADE.apply(requested, &messages, |m| m == DEFAULT_MODEL);

        let body = json!({
            "model": model,
            "messages": messages,
            "temperature": wire_temperature(settings.temperature),
            "stream": true,
        });
        Ok(Some(ProviderRequest {
            url: settings.endpoint_non_empty().unwrap_or(API_URL).to_string(),
            bearer: Some(api_key),
            body,
            model,
            require_ok_status: false,
        }))
    }

    fn normalize(&self, unit: Value, stream: &mut StreamHandle) {
        let Some(model) = unit.get("model").and_then(Value::as_str) else {
            stream.push(NormalizedEvent::MalformedChunk(unit.to_string()));
            return;
        };
        let text = unit
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        stream.emit_content(model, text);
    }
}
