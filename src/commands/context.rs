use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::commands::CommandReport;
use odin_runes::runes::context::{CaptureMethod, ConversationContext};
use odin_runes::runes::paths::resolve_paths;
use odin_runes::runes::util::truncate_with_ellipsis;

const PREVIEW_CHARS: usize = 60;

#[derive(Debug, Clone)]
pub enum Action {
    List,
    Add {
        method: Option<String>,
        text: Option<String>,
        file: Option<PathBuf>,
    },
    Remove(u64),
    Clear,
}

fn snapshot_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(p) => Ok(p.to_path_buf()),
        None => Ok(resolve_paths()?.context_snapshot),
    }
}

/// Text and method for a new snippet. A file given with a live method is kept
/// as a path; any other method captures the file's current text.
fn capture(
    method: Option<&str>,
    text: Option<String>,
    file: Option<&Path>,
) -> Result<(String, CaptureMethod)> {
    if let Some(file) = file {
        let method = method
            .map(CaptureMethod::from_label)
            .unwrap_or(CaptureMethod::LiveFile);
        if method == CaptureMethod::LiveFile {
            let absolute = fs::canonicalize(file)
                .with_context(|| format!("failed to resolve {}", file.display()))?;
            return Ok((absolute.display().to_string(), method));
        }
        let text = fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        return Ok((text, method));
    }

    let method = method
        .map(CaptureMethod::from_label)
        .unwrap_or(CaptureMethod::Clipboard);
    Ok((text.unwrap_or_default(), method))
}

pub fn run(snapshot: Option<&Path>, action: Action) -> Result<CommandReport> {
    let path = snapshot_path(snapshot)?;
    let mut ctx = ConversationContext::load_snapshot(&path)?;
    let mut report = CommandReport::new("context");
    report.detail(format!("snapshot={}", path.display()));

    match action {
        Action::List => {}
        Action::Add { method, text, file } => {
            let (text, method) = capture(method.as_deref(), text, file.as_deref())?;
            let id = ctx.add(text, method);
            ctx.save_snapshot(&path)?;
            report.detail(format!("added snippet {id}"));
        }
        Action::Remove(id) => match ctx.remove(id) {
            Some(_) => {
                ctx.save_snapshot(&path)?;
                report.detail(format!("removed snippet {id}"));
            }
            None => report.issue(format!("no snippet with id {id}")),
        },
        Action::Clear => {
            ctx.clear();
            ctx.save_snapshot(&path)?;
            report.detail("cleared all snippets");
        }
    }

    report.detail(format!("snippets={}", ctx.len()));
    for snippet in ctx.snippets() {
        let preview = truncate_with_ellipsis(&snippet.text.replace('\n', " "), PREVIEW_CHARS);
        report.detail(format!(
            "[{}] {}: {preview}",
            snippet.id,
            snippet.method.label()
        ));
    }
    Ok(report)
}
