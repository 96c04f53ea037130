use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::commands::CommandReport;
use odin_runes::runes::journal::Journal;
use odin_runes::runes::util::today_stamp;

pub fn run(path: &Path) -> Result<CommandReport> {
    let mut report = CommandReport::new("init");
    report.detail(format!("journal={}", path.display()));

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let journal = Journal::new(path);
    if journal.populate_if_empty(&today_stamp())? {
        report.detail("wrote greeting; append your prompt after the last user marker");
        return Ok(report);
    }

    if Journal::is_valid(path)? {
        report.detail("journal already initialized");
    } else {
        report.issue(format!(
            "{} already has content but is not an odin-runes journal",
            path.display()
        ));
    }
    Ok(report)
}
