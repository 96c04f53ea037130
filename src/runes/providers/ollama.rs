use super::{
    NormalizedEvent, ProviderAdapter, ProviderRequest, StreamHandle, chat_messages,
    has_pending_prompt,
};
use crate::error::GatewayError;
use crate::runes::context::ConversationContext;
use crate::runes::frame::Framing;
use crate::runes::journal::Transcript;
use crate::runes::settings::{ProviderId, ProviderSettings};
use serde_json::{Value, json};

const URI_SETTING: &str = "backend_uri";
const MODEL_SETTING: &str = "model";

pub struct OllamaAdapter;

impl ProviderAdapter for OllamaAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Ollama
    }

    fn framing(&self) -> Framing {
        Framing::Lines {
            data_prefix: None,
            done_sentinel: None,
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
        let url = settings.endpoint_non_empty().ok_or_else(|| {
            GatewayError::missing(
                URI_SETTING,
                "Point it at your Ollama chat endpoint, e.g. http://localhost:11434/api/chat.",
            )
        })?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(GatewayError::InvalidSetting(format!(
                "backend_uri `{url}` must be an http(s) URL"
            )));
        }
        let model = settings.model_non_empty().ok_or_else(|| {
            GatewayError::missing(MODEL_SETTING, "Name a model pulled into Ollama, e.g. llama2.")
        })?;

        // Ollama gets no temperature.
        let body = json!({
            "model": model,
            "messages": chat_messages(context, history),
            "stream": true,
        });
        Ok(Some(ProviderRequest {
            url: url.to_string(),
            bearer: None,
            body,
            model: model.to_string(),
            require_ok_status: true,
        }))
    }

    fn normalize(&self, unit: Value, stream: &mut StreamHandle) {
        if unit.get("done").and_then(Value::as_bool) == Some(true) {
            stream.push(NormalizedEvent::Done);
            return;
        }
        let Some(text) = unit.pointer("/message/content").and_then(Value::as_str) else {
            stream.push(NormalizedEvent::MalformedChunk(unit.to_string()));
            return;
        };
        let model = unit
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(stream.request_model())
            .to_string();
        stream.emit_content(&format!("Ollama-{model}"), text);
    }
}

#[cfg(test)]
mod tests {
    use super::OllamaAdapter;
    use crate::error::ErrorCode;
    use crate::runes::context::{CaptureMethod, ConversationContext};
    use crate::runes::journal::Role;
    use crate::runes::providers::test_support::transcript;
    use crate::runes::providers::{NormalizedEvent, ProviderAdapter, StreamHandle};
    use crate::runes::settings::{ProviderId, ProviderSettings};
    use std::io::Cursor;

    fn local_settings() -> ProviderSettings {
        ProviderSettings {
            provider: ProviderId::Ollama,
            model: Some("llama2".to_string()),
            backend_endpoint: Some("http://localhost:11434/api/chat".to_string()),
            ..ProviderSettings::default()
        }
    }

    #[test]
    fn no_prompt_means_no_request_even_when_unconfigured() {
        let history = transcript(&[(Role::User, "hi")]);
        let built = OllamaAdapter
            .build_request(&ConversationContext::new(), &history, &ProviderSettings::default())
            .expect("build");
        assert!(built.is_none());
    }

    #[test]
    fn uri_and_model_are_required() {
        let history = transcript(&[(Role::Prompt, "hi")]);
        let mut settings = local_settings();
        settings.model = None;
        let err = OllamaAdapter
            .build_request(&ConversationContext::new(), &history, &settings)
            .expect_err("missing model");
        assert_eq!(err.code(), ErrorCode::E001ConfigMissing);

        settings = local_settings();
        settings.backend_endpoint = Some("  ".to_string());
        let err = OllamaAdapter
            .build_request(&ConversationContext::new(), &history, &settings)
            .expect_err("missing uri");
        assert!(err.to_string().starts_with("backend_uri is not set."));

        settings = local_settings();
        settings.backend_endpoint = Some("localhost:11434".to_string());
        let err = OllamaAdapter
            .build_request(&ConversationContext::new(), &history, &settings)
            .expect_err("bad uri");
        assert_eq!(err.code(), ErrorCode::E002InvalidSetting);
    }

    #[test]
    fn request_has_no_temperature_and_checks_status() {
        let mut ctx = ConversationContext::new();
        ctx.add("Scroll text", CaptureMethod::ScrollOcr);
        let history = transcript(&[(Role::Prompt, "summarize")]);
        let request = OllamaAdapter
            .build_request(&ctx, &history, &local_settings())
            .expect("build")
            .expect("request");

        assert_eq!(request.url, "http://localhost:11434/api/chat");
        assert!(request.bearer.is_none());
        assert!(request.require_ok_status);
        assert_eq!(request.body["model"], "llama2");
        assert_eq!(request.body["stream"], true);
        assert!(request.body.get("temperature").is_none());
        assert_eq!(
            request.body["messages"][1]["content"],
            "The text content captured by OCR from a portion of the user's screen is included below. It might have some redundant lines. \nScroll text"
        );
    }

    #[test]
    fn done_flag_ends_stream() {
        let body = concat!(
            "{\"model\":\"llama2\",\"message\":{\"role\":\"assistant\",\"content\":\"Hi\"},\"done\":false}\n",
            "{\"model\":\"llama2\",\"message\":{\"role\":\"assistant\",\"content\":\"!\"},\"done\":false}\n",
            "{\"model\":\"llama2\",\"done\":true,\"total_duration\":12}\n",
        );
        let adapter = OllamaAdapter;
        let mut stream = StreamHandle::from_reader(Cursor::new(body), adapter.framing());
        let mut events = Vec::new();
        while let Some(event) = adapter.read_frame(&mut stream).expect("read") {
            let done = event == NormalizedEvent::Done;
            events.push(event);
            if done {
                break;
            }
        }
        assert_eq!(
            events,
            vec![
                NormalizedEvent::ModelAnnounced("Ollama-llama2".to_string()),
                NormalizedEvent::ContentDelta("Hi".to_string()),
                NormalizedEvent::ContentDelta("!".to_string()),
                NormalizedEvent::Done,
            ]
        );
    }
}
