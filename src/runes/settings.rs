use crate::runes::paths::resolve_paths;
use crate::runes::util::env_non_empty;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderId {
    OpenAi,
    GeminiVertex,
    PalmVertex,
    Ollama,
}

impl ProviderId {
    pub fn label(self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::GeminiVertex => "gemini",
            ProviderId::PalmVertex => "palm",
            ProviderId::Ollama => "ollama",
        }
    }

    /// Accepts the short ids plus the display names offered by the settings dialog.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        match trimmed {
            "OpenAI (gpt-3.5-turbo)" => return Some(ProviderId::OpenAi),
            "Google's VertexAI (gemini-pro)" => return Some(ProviderId::GeminiVertex),
            "Google's VertexAI (chat-bison)" => return Some(ProviderId::PalmVertex),
            _ => {}
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "openai" | "gpt" => Some(ProviderId::OpenAi),
            "gemini" | "gemini-vertex" | "gemini-pro" => Some(ProviderId::GeminiVertex),
            "palm" | "palm-vertex" | "chat-bison" => Some(ProviderId::PalmVertex),
            "ollama" | "local" => Some(ProviderId::Ollama),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Secrets and endpoints read from the environment once per invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub vertex_endpoint: Option<String>,
    pub vertex_project_id: Option<String>,
    pub vertex_model_id: Option<String>,
    pub vertex_access_token: Option<String>,
}

pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY_ODIN_FIRST";
pub const VERTEX_ENDPOINT_VAR: &str = "VERTEXAI_API_ENDPOINT";
pub const VERTEX_PROJECT_VAR: &str = "VERTEXAI_PROJECT_ID";
pub const VERTEX_MODEL_VAR: &str = "VERTEXAI_MODEL_ID";
pub const VERTEX_TOKEN_VAR: &str = "GCLOUD_VERTEX_AI_ACCESS_TOKEN";

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: env_non_empty(OPENAI_API_KEY_VAR),
            vertex_endpoint: env_non_empty(VERTEX_ENDPOINT_VAR),
            vertex_project_id: env_non_empty(VERTEX_PROJECT_VAR),
            vertex_model_id: env_non_empty(VERTEX_MODEL_VAR),
            vertex_access_token: env_non_empty(VERTEX_TOKEN_VAR),
        }
    }

    /// `(variable, present)` pairs for status reporting.
    pub fn presence(&self) -> Vec<(&'static str, bool)> {
        vec![
            (OPENAI_API_KEY_VAR, self.openai_api_key.is_some()),
            (VERTEX_ENDPOINT_VAR, self.vertex_endpoint.is_some()),
            (VERTEX_PROJECT_VAR, self.vertex_project_id.is_some()),
            (VERTEX_MODEL_VAR, self.vertex_model_id.is_some()),
            (VERTEX_TOKEN_VAR, self.vertex_access_token.is_some()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub provider: ProviderId,
    pub temperature: f32,
    pub model: Option<String>,
    pub backend_endpoint: Option<String>,
    pub credentials: Credentials,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            provider: ProviderId::OpenAi,
            temperature: 0.8,
            model: None,
            backend_endpoint: None,
            credentials: Credentials::default(),
        }
    }
}

impl ProviderSettings {
    pub fn model_non_empty(&self) -> Option<&str> {
        self.model.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }

    pub fn endpoint_non_empty(&self) -> Option<&str> {
        self.backend_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub settings: ProviderSettings,
    /// Streamed content is written to the journal once the buffer exceeds this.
    pub flush_threshold_chars: usize,
    pub connect_timeout_secs: u64,
    pub stream_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            settings: ProviderSettings::default(),
            flush_threshold_chars: 100,
            connect_timeout_secs: 15,
            stream_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PartialProviderSection {
    provider: Option<String>,
    temperature: Option<f32>,
    model: Option<String>,
    backend_uri: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PartialGatewaySection {
    flush_threshold_chars: Option<usize>,
    connect_timeout_secs: Option<u64>,
    stream_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PartialConfig {
    provider: Option<PartialProviderSection>,
    gateway: Option<PartialGatewaySection>,
}

fn env_or_f32(var: &str, fallback: f32) -> f32 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<f32>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn parse_provider(raw: &str) -> Result<ProviderId> {
    ProviderId::parse(raw).ok_or_else(|| {
        anyhow!("unknown provider `{raw}`; use `openai`, `gemini`, `palm`, or `ollama`")
    })
}

pub fn validate(cfg: &GatewayConfig) -> Result<()> {
    let t = cfg.settings.temperature;
    if !(0.0..=1.0).contains(&t) {
        return Err(anyhow!("invalid temperature {t}: require 0 <= temperature <= 1"));
    }
    if cfg.flush_threshold_chars == 0 {
        return Err(anyhow!("invalid flush threshold: must be >= 1 char"));
    }
    if cfg.connect_timeout_secs == 0 || cfg.stream_timeout_secs == 0 {
        return Err(anyhow!("invalid timeouts: must be >= 1 second"));
    }
    Ok(())
}

fn merge_file_config(base: &mut GatewayConfig, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: PartialConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse settings {}: {err}", path.display()))?;
    if let Some(provider) = parsed.provider {
        if let Some(id) = provider.provider.as_deref() {
            base.settings.provider = parse_provider(id)?;
        }
        if let Some(t) = provider.temperature {
            base.settings.temperature = t;
        }
        if provider.model.is_some() {
            base.settings.model = provider.model;
        }
        if provider.backend_uri.is_some() {
            base.settings.backend_endpoint = provider.backend_uri;
        }
    }
    if let Some(gateway) = parsed.gateway {
        if let Some(v) = gateway.flush_threshold_chars {
            base.flush_threshold_chars = v;
        }
        if let Some(v) = gateway.connect_timeout_secs {
            base.connect_timeout_secs = v;
        }
        if let Some(v) = gateway.stream_timeout_secs {
            base.stream_timeout_secs = v;
        }
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut GatewayConfig) -> Result<()> {
    if let Some(raw) = env_non_empty("ODIN_RUNES_PROVIDER") {
        cfg.settings.provider = parse_provider(&raw)?;
    }
    cfg.settings.temperature = env_or_f32("ODIN_RUNES_TEMPERATURE", cfg.settings.temperature);
    if let Some(model) = env_non_empty("ODIN_RUNES_MODEL") {
        cfg.settings.model = Some(model);
    }
    if let Some(uri) = env_non_empty("ODIN_RUNES_BACKEND_URI") {
        cfg.settings.backend_endpoint = Some(uri);
    }
    cfg.flush_threshold_chars = env_or_usize("ODIN_RUNES_FLUSH_CHARS", cfg.flush_threshold_chars);
    cfg.stream_timeout_secs =
        env_or_u64("ODIN_RUNES_STREAM_TIMEOUT_SECS", cfg.stream_timeout_secs);
    Ok(())
}

pub fn load_config_from(path: &Path) -> Result<GatewayConfig> {
    let mut cfg = GatewayConfig::default();
    merge_file_config(&mut cfg, path)?;
    apply_env_overrides(&mut cfg)?;
    cfg.settings.credentials = Credentials::from_env();
    validate(&cfg)?;
    Ok(cfg)
}

pub fn load_config() -> Result<GatewayConfig> {
    let paths = resolve_paths()?;
    load_config_from(&paths.settings_file)
}

#[cfg(test)]
mod tests {
    use super::{GatewayConfig, ProviderId, merge_file_config, validate};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn provider_parse_accepts_ids_and_display_names() {
        assert_eq!(ProviderId::parse("openai"), Some(ProviderId::OpenAi));
        assert_eq!(
            ProviderId::parse("OpenAI (gpt-3.5-turbo)"),
            Some(ProviderId::OpenAi)
        );
        assert_eq!(
            ProviderId::parse("Google's VertexAI (gemini-pro)"),
            Some(ProviderId::GeminiVertex)
        );
        assert_eq!(
            ProviderId::parse("Google's VertexAI (chat-bison)"),
            Some(ProviderId::PalmVertex)
        );
        assert_eq!(ProviderId::parse(" Ollama "), Some(ProviderId::Ollama));
        assert_eq!(ProviderId::parse("mystery"), None);
    }

    #[test]
    fn validate_rejects_out_of_range_temperature() {
        let mut cfg = GatewayConfig::default();
        assert!(validate(&cfg).is_ok());
        cfg.settings.temperature = 1.5;
        assert!(validate(&cfg).is_err());
        cfg.settings.temperature = 0.0;
        cfg.flush_threshold_chars = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn file_config_merges_over_defaults() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("settings.toml");
        fs::write(
            &path,
            "[provider]\nprovider = \"ollama\"\ntemperature = 0.3\nmodel = \"llama2\"\nbackend_uri = \"http://localhost:11434/api/chat\"\n\n[gateway]\nflush_threshold_chars = 42\n",
        )
        .expect("write");

        let mut cfg = GatewayConfig::default();
        merge_file_config(&mut cfg, &path).expect("merge");
        assert_eq!(cfg.settings.provider, ProviderId::Ollama);
        assert!((cfg.settings.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(cfg.settings.model.as_deref(), Some("llama2"));
        assert_eq!(
            cfg.settings.endpoint_non_empty(),
            Some("http://localhost:11434/api/chat")
        );
        assert_eq!(cfg.flush_threshold_chars, 42);
        assert_eq!(cfg.stream_timeout_secs, 300);
    }

    #[test]
    fn file_config_rejects_unknown_provider() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("settings.toml");
        fs::write(&path, "[provider]\nprovider = \"mystery\"\n").expect("write");
        let mut cfg = GatewayConfig::default();
        let err = merge_file_config(&mut cfg, &path).expect_err("should fail");
        assert!(err.to_string().contains("unknown provider"));
    }
}
