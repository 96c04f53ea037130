use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Effective content of a live file snippet whose file cannot be read.
pub const LIVE_FILE_READ_ERROR: &str = "ERROR READING FROM FILE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CaptureMethod {
    Clipboard,
    RegionOcr,
    ScrollOcr,
    LiveFile,
    Other(String),
}

impl CaptureMethod {
    pub fn label(&self) -> &str {
        match self {
            CaptureMethod::Clipboard => "Clipboard",
            CaptureMethod::RegionOcr => "Regionshot (OCR)",
            CaptureMethod::ScrollOcr => "Scrollshot (OCR)",
            CaptureMethod::LiveFile => "File (Live)",
            CaptureMethod::Other(label) => label,
        }
    }

    /// Accepts the capture collaborator's labels plus short CLI aliases.
    pub fn from_label(raw: &str) -> Self {
        match raw.trim() {
            "Clipboard" | "clipboard" => CaptureMethod::Clipboard,
            "Regionshot (OCR)" | "region" | "region-ocr" => CaptureMethod::RegionOcr,
            "Scrollshot (OCR)" | "scroll" | "scroll-ocr" => CaptureMethod::ScrollOcr,
            "File (Live)" | "file" | "live-file" => CaptureMethod::LiveFile,
            other => CaptureMethod::Other(other.to_string()),
        }
    }
}

impl From<String> for CaptureMethod {
    fn from(value: String) -> Self {
        CaptureMethod::from_label(&value)
    }
}

impl From<CaptureMethod> for String {
    fn from(value: CaptureMethod) -> Self {
        value.label().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedSnippet {
    pub id: u64,
    pub text: String,
    pub method: CaptureMethod,
}

impl CapturedSnippet {
    /// The grounding text. Live file snippets hold a path and are re-read on
    /// every call.
    pub fn content(&self) -> String {
        match self.method {
            CaptureMethod::LiveFile => match fs::read_to_string(&self.text) {
                Ok(raw) => raw,
                Err(err) => {
                    log::warn!("failed to read live file {}: {err}", self.text);
                    LIVE_FILE_READ_ERROR.to_string()
                }
            },
            _ => self.text.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationContext {
    snippets: Vec<CapturedSnippet>,
    next_id: u64,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, text: impl Into<String>, method: CaptureMethod) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.snippets.push(CapturedSnippet {
            id,
            text: text.into(),
            method,
        });
        id
    }

    pub fn remove(&mut self, id: u64) -> Option<CapturedSnippet> {
        let idx = self.snippets.iter().position(|s| s.id == id)?;
        Some(self.snippets.remove(idx))
    }

    pub fn snippets(&self) -> &[CapturedSnippet] {
        &self.snippets
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    pub fn clear(&mut self) {
        self.snippets.clear();
    }

    /// A missing snapshot restores an empty context.
    pub fn load_snapshot(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut parsed: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        let max_id = parsed.snippets.iter().map(|s| s.id).max().unwrap_or(0);
        parsed.next_id = parsed.next_id.max(max_id);
        Ok(parsed)
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
        let data = serde_json::to_string_pretty(self)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("failed to stage snapshot in {}", parent.display()))?;
        tmp.write_all(format!("{data}\n").as_bytes())?;
        tmp.persist(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}
