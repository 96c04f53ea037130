use anyhow::{Context, Result, anyhow};
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::commands::{CommandReport, ensure_valid_journal};
use odin_runes::runes::context::ConversationContext;
use odin_runes::runes::gateway::{ChatOutcome, spawn_chat_turn};
use odin_runes::runes::journal::Journal;
use odin_runes::runes::paths::resolve_paths;
use odin_runes::runes::settings::{GatewayConfig, ProviderId, load_config, validate};

#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub journal: PathBuf,
    pub context: Option<PathBuf>,
    pub provider: Option<String>,
    pub temperature: Option<f32>,
    pub model: Option<String>,
    pub backend_uri: Option<String>,
}

/// Exclusive advisory lock on `<journal>.lock`, released on drop.
struct JournalLock {
    file: File,
}

impl JournalLock {
    fn path_for(journal: &Path) -> PathBuf {
        let mut name = journal
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("journal"));
        name.push(".lock");
        journal.with_file_name(name)
    }

    /// `Ok(None)` when another invocation already holds the lock.
    fn try_acquire(journal: &Path) -> Result<Option<Self>> {
        let path = Self::path_for(journal);
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("failed to open lock {}", path.display()))?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file })),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for JournalLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn apply_overrides(config: &mut GatewayConfig, opts: &ChatOptions) -> Result<()> {
    if let Some(raw) = opts.provider.as_deref() {
        config.settings.provider = ProviderId::parse(raw).ok_or_else(|| {
            anyhow!("unknown provider `{raw}`; use `openai`, `gemini`, `palm`, or `ollama`")
        })?;
    }
    if let Some(t) = opts.temperature {
        config.settings.temperature = t;
    }
    if opts.model.is_some() {
        config.settings.model = opts.model.clone();
    }
    if opts.backend_uri.is_some() {
        config.settings.backend_endpoint = opts.backend_uri.clone();
    }
    validate(config)
}

pub fn run(opts: &ChatOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("chat");
    let path = &opts.journal;
    report.detail(format!("journal={}", path.display()));
    if !ensure_valid_journal(path, &mut report)? {
        return Ok(report);
    }

    let mut config = load_config()?;
    apply_overrides(&mut config, opts)?;
    report.detail(format!("provider={}", config.settings.provider));

    let snapshot = match opts.context.clone() {
        Some(p) => p,
        None => resolve_paths()?.context_snapshot,
    };
    let context = ConversationContext::load_snapshot(&snapshot)?;
    report.detail(format!("context_snippets={}", context.len()));

    let Some(_lock) = JournalLock::try_acquire(path)? else {
        report.issue(format!(
            "another chat is already writing to {}",
            path.display()
        ));
        return Ok(report);
    };

    let handle = spawn_chat_turn(Journal::new(path), context, config)
        .context("failed to spawn chat worker")?;
    let outcome = handle
        .join()
        .map_err(|_| anyhow!("chat worker panicked"))??;

    match outcome {
        ChatOutcome::NoNewPrompt => {
            report.detail("no new prompt; append one after the last user marker");
        }
        ChatOutcome::Completed { model, chars } => {
            report.detail(format!("model={model}"));
            report.detail(format!("answer_chars={chars}"));
        }
        ChatOutcome::Errored { code, message } => {
            report.issue(format!("{}: {message}", code.as_str()));
        }
    }
    Ok(report)
}
