use anyhow::Result;
use std::path::Path;

use crate::commands::{CommandReport, ensure_valid_journal};
use odin_runes::runes::journal::{Journal, Role};
use odin_runes::runes::util::truncate_with_ellipsis;

const PREVIEW_CHARS: usize = 72;

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Prompt => "prompt",
    }
}

pub fn run(path: &Path) -> Result<CommandReport> {
    let mut report = CommandReport::new("turns");
    if !ensure_valid_journal(path, &mut report)? {
        return Ok(report);
    }

    let transcript = Journal::new(path).read_transcript()?;
    report.detail(format!("turns={}", transcript.turns.len()));
    for (idx, turn) in transcript.turns.iter().enumerate() {
        let preview = truncate_with_ellipsis(&turn.content.replace('\n', " "), PREVIEW_CHARS);
        let line = match &turn.meta {
            Some(meta) => format!(
                "[{idx}] {} ({} {}): {preview}",
                role_label(turn.role),
                meta.model,
                meta.date
            ),
            None => format!("[{idx}] {}: {preview}", role_label(turn.role)),
        };
        report.detail(line);
    }
    let pending = if transcript.pending_prompt().is_some() {
        "yes"
    } else {
        "no"
    };
    report.detail(format!("pending_prompt={pending}"));
    Ok(report)
}
