use anyhow::Result;

use crate::commands::CommandReport;
use odin_runes::runes::paths::resolve_paths;
use odin_runes::runes::settings::{
    Credentials, OPENAI_API_KEY_VAR, ProviderId, ProviderSettings, VERTEX_ENDPOINT_VAR,
    VERTEX_PROJECT_VAR, VERTEX_TOKEN_VAR, load_config_from,
};

/// What the provider still needs before a chat can go out.
pub fn missing_for(settings: &ProviderSettings) -> Vec<&'static str> {
    let creds: &Credentials = &settings.credentials;
    let mut missing = Vec::new();
    match settings.provider {
        ProviderId::OpenAi => {
            if creds.openai_api_key.is_none() {
                missing.push(OPENAI_API_KEY_VAR);
            }
        }
        ProviderId::GeminiVertex | ProviderId::PalmVertex => {
            if creds.vertex_endpoint.is_none() {
                missing.push(VERTEX_ENDPOINT_VAR);
            }
            if creds.vertex_project_id.is_none() {
                missing.push(VERTEX_PROJECT_VAR);
            }
            if creds.vertex_access_token.is_none() {
                missing.push(VERTEX_TOKEN_VAR);
            }
        }
        ProviderId::Ollama => {
            if settings.endpoint_non_empty().is_none() {
                missing.push("backend_uri");
            }
            if settings.model_non_empty().is_none() {
                missing.push("model");
            }
        }
    }
    missing
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("runes_home={}", paths.runes_home.display()));
    report.detail(format!(
        "settings_file={}{}",
        paths.settings_file.display(),
        if paths.settings_file.exists() {
            ""
        } else {
            " (absent, using defaults)"
        }
    ));
    report.detail(format!("context_snapshot={}", paths.context_snapshot.display()));

    let config = load_config_from(&paths.settings_file)?;
    let settings = &config.settings;
    report.detail(format!("provider={}", settings.provider));
    report.detail(format!("temperature={}", settings.temperature));
    report.detail(format!(
        "model={}",
        settings.model_non_empty().unwrap_or("<provider default>")
    ));
    if let Some(uri) = settings.endpoint_non_empty() {
        report.detail(format!("backend_uri={uri}"));
    }
    report.detail(format!("flush_threshold_chars={}", config.flush_threshold_chars));
    report.detail(format!("stream_timeout_secs={}", config.stream_timeout_secs));

    for (var, present) in settings.credentials.presence() {
        let state = if present { "set" } else { "unset" };
        report.detail(format!("{var}={state}"));
    }

    let missing = missing_for(settings);
    if !missing.is_empty() {
        report.issue(format!(
            "{} is not ready; missing: {}",
            settings.provider,
            missing.join(", ")
        ));
    }
    Ok(report)
}
