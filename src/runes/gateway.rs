//! One chat invocation: build, execute, stream, journal.

use crate::error::{ErrorCode, GatewayError};
use crate::runes::context::ConversationContext;
use crate::runes::journal::Journal;
use crate::runes::providers::{self, NormalizedEvent, ProviderAdapter, StreamHandle};
use crate::runes::settings::GatewayConfig;
use crate::runes::util::{today_stamp, truncate_with_ellipsis};
use anyhow::Result;
use log::{debug, error, info, warn};
use std::io;
use std::thread::{self, JoinHandle};

pub const ERROR_MODEL: &str = "ERROR";
pub const MALFORMED_PREAMBLE: &str =
    "There was a problem processing the response from your specified GPT provider: \n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    NoNewPrompt,
    Completed { model: String, chars: usize },
    Errored { code: ErrorCode, message: String },
}

impl ChatOutcome {
    fn errored(err: &GatewayError) -> Self {
        ChatOutcome::Errored {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Runs one turn against the configured provider. Only journal write
/// failures are returned as `Err`; everything else ends up in the journal.
pub fn run_chat_turn(
    journal: &Journal,
    context: &ConversationContext,
    config: &GatewayConfig,
) -> Result<ChatOutcome> {
    let adapter = providers::select(config.settings.provider);
    info!(
        "chat turn for {} via {}",
        journal.path().display(),
        adapter.id()
    );
    run_chat_turn_with(adapter.as_ref(), journal, context, config)
}

pub fn spawn_chat_turn(
    journal: Journal,
    context: ConversationContext,
    config: GatewayConfig,
) -> io::Result<JoinHandle<Result<ChatOutcome>>> {
    thread::Builder::new()
        .name("odin-runes-chat".to_string())
        .spawn(move || run_chat_turn(&journal, &context, &config))
}

pub fn run_chat_turn_with(
    adapter: &dyn ProviderAdapter,
    journal: &Journal,
    context: &ConversationContext,
    config: &GatewayConfig,
) -> Result<ChatOutcome> {
    let transcript = journal.read_transcript()?;

    let request = match adapter.build_request(context, &transcript, &config.settings) {
        Ok(Some(request)) => request,
        Ok(None) => {
            info!("no new prompt in {}", journal.path().display());
            return Ok(ChatOutcome::NoNewPrompt);
        }
        Err(err) => {
            error!("failed to build {} request: {err}", adapter.id());
            close_prompt(journal)?;
            write_error_section(journal, &format!("An error occurred: {err}\n"))?;
            return Ok(ChatOutcome::errored(&err));
        }
    };

    close_prompt(journal)?;
    let mut stream = match adapter.execute(&request, config) {
        Ok(stream) => stream,
        Err(err) => {
            error!("{} request failed: {err}", adapter.id());
            if err.is_transport() {
                write_bare_error_end(journal)?;
            } else {
                write_error_section(journal, &format!("An error occurred: {err}\n"))?;
            }
            return Ok(ChatOutcome::errored(&err));
        }
    };

    stream_into_journal(adapter, &mut stream, journal, config, &request.model)
}

fn stream_into_journal(
    adapter: &dyn ProviderAdapter,
    stream: &mut StreamHandle,
    journal: &Journal,
    config: &GatewayConfig,
    requested_model: &str,
) -> Result<ChatOutcome> {
    let mut announced: Option<String> = None;
    let mut buffer = String::new();
    let mut buffered_chars = 0usize;
    let mut total_chars = 0usize;

    loop {
        let event = match adapter.read_frame(stream) {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(err) => {
                error!("stream from {} broke off: {err}", adapter.id());
                write_bare_error_end(journal)?;
                return Ok(ChatOutcome::errored(&err));
            }
        };

        match event {
            NormalizedEvent::ModelAnnounced(name) => {
                if announced.is_none() {
                    open_assistant_section(journal, &name)?;
                    announced = Some(name);
                } else {
                    debug!("ignoring model change to {name}");
                }
            }
            NormalizedEvent::ContentDelta(text) => {
                if announced.is_none() {
                    open_assistant_section(journal, requested_model)?;
                    announced = Some(requested_model.to_string());
                }
                let n = text.chars().count();
                buffered_chars += n;
                total_chars += n;
                buffer.push_str(&text);
                if buffered_chars > config.flush_threshold_chars {
                    journal.append_str(&buffer)?;
                    buffer.clear();
                    buffered_chars = 0;
                }
            }
            NormalizedEvent::Done => break,
            NormalizedEvent::MalformedChunk(raw) => {
                warn!(
                    "malformed chunk from {}: {}",
                    adapter.id(),
                    truncate_with_ellipsis(&raw, 200)
                );
                let rest = stream.drain();
                write_error_section(journal, &format!("{MALFORMED_PREAMBLE}{raw}{rest}\n"))?;
                let err = GatewayError::MalformedResponse(truncate_with_ellipsis(&raw, 200));
                return Ok(ChatOutcome::errored(&err));
            }
        }
    }

    if !buffer.is_empty() {
        journal.append_str(&buffer)?;
    }
    journal.append_str("\n")?;
    journal.append_turn_end()?;
    journal.append_user_start()?;

    let model = announced.unwrap_or_else(|| requested_model.to_string());
    info!("{model} answered with {total_chars} chars");
    Ok(ChatOutcome::Completed {
        model,
        chars: total_chars,
    })
}

/// Ends the prompt section so the prompt reads as an answered user turn.
fn close_prompt(journal: &Journal) -> Result<()> {
    journal.append_str("\n")?;
    journal.append_turn_end()
}

fn open_assistant_section(journal: &Journal, model: &str) -> Result<()> {
    journal.append_assistant_start(model, &today_stamp())?;
    journal.append_assistant_body()
}

/// An `ERROR` section carrying `diagnostic`, closed and followed by a fresh
/// user section.
fn write_error_section(journal: &Journal, diagnostic: &str) -> Result<()> {
    journal.append_assistant_start(ERROR_MODEL, &today_stamp())?;
    journal.append_str(diagnostic)?;
    journal.append_error_end()?;
    journal.append_user_start()
}

fn write_bare_error_end(journal: &Journal) -> Result<()> {
    journal.append_str("\n")?;
    journal.append_error_end()?;
    journal.append_user_start()
}
