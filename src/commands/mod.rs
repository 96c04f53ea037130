pub mod chat;
pub mod context;
pub mod init;
pub mod status;
pub mod turns;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

/// Shared guard for commands that read a journal: it must exist and carry
/// the leading marker.
pub fn ensure_valid_journal(
    path: &std::path::Path,
    report: &mut CommandReport,
) -> anyhow::Result<bool> {
    if !path.is_file() {
        report.issue(format!(
            "journal {} does not exist; run `odin-runes init {}` first",
            path.display(),
            path.display()
        ));
        return Ok(false);
    }
    if !odin_runes::runes::journal::Journal::is_valid(path)? {
        report.issue(format!(
            "{} is not an odin-runes journal (first line lacks the `<!-- =====[ Odin` marker)",
            path.display()
        ));
        return Ok(false);
    }
    Ok(true)
}
