//! Transcript journal: a human-editable text file holding the whole chat,
//! split into sections by literal marker lines.

use crate::runes::util::MARKER_DATE_FORMAT;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub const ASSISTANT_START_PREFIX: &str = "<!-- =====[ Odin Runes ]======[";
pub const ASSISTANT_START_SUFFIX: &str = "]======[ + ] -->";
pub const ASSISTANT_BODY_MARKER: &str = "<!-- =====[ Assistant ]=====[ : ] -->";
pub const USER_MARKER: &str = "<!-- =====[ User ]=====[ : ] -->";
pub const TURN_END_MARKER: &str = "<!-- =====[ OVER ]=====[ # ] -->";
pub const ERROR_END_MARKER: &str = "<!-- =====[ OVER ]=====[ ! ] -->";

/// First-line prefix a file must carry to be accepted as a journal.
pub const VALIDITY_PREFIX: &str = "<!-- =====[ Odin";

pub const BOOTSTRAP_MODEL: &str = "as-specified";
pub const BOOTSTRAP_GREETING: &str = "Hello, append your prompt to the end of this file. I will pass it on together with the relevant context to your GPT. ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// A user turn that has not been answered yet.
    Prompt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMeta {
    pub model: String,
    pub date: String,
}

impl TurnMeta {
    pub fn new(model: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            date: date.into(),
        }
    }

    /// Reads the `{model, date}` object embedded in an assistant-start line.
    fn from_marker_line(line: &str) -> Option<Self> {
        let start = line.find('{')?;
        let end = line.rfind('}')?;
        if end <= start {
            return None;
        }
        let meta: TurnMeta = serde_json::from_str(&line[start..=end]).ok()?;
        NaiveDate::parse_from_str(&meta.date, MARKER_DATE_FORMAT).ok()?;
        Some(meta)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<TurnMeta>,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            meta: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub turns: Vec<ChatTurn>,
}

impl Transcript {
    /// The trailing unanswered prompt, if any.
    pub fn pending_prompt(&self) -> Option<&ChatTurn> {
        self.turns.last().filter(|t| t.role == Role::Prompt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    InUser,
    InAssistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    UserStart,
    AssistantStart,
    AssistantBody,
    TurnEnd,
    ErrorEnd,
}

fn classify(line: &str) -> Option<Marker> {
    if line.contains(USER_MARKER) {
        Some(Marker::UserStart)
    } else if line.contains(ASSISTANT_START_PREFIX) && line.contains(ASSISTANT_START_SUFFIX) {
        Some(Marker::AssistantStart)
    } else if line.contains(ASSISTANT_BODY_MARKER) {
        Some(Marker::AssistantBody)
    } else if line.contains(TURN_END_MARKER) {
        Some(Marker::TurnEnd)
    } else if line.contains(ERROR_END_MARKER) {
        Some(Marker::ErrorEnd)
    } else {
        None
    }
}

/// Single forward pass over the journal text.
#[derive(Debug)]
struct Parser {
    section: Section,
    buffer: String,
    pending_meta: Option<TurnMeta>,
    turns: Vec<ChatTurn>,
}

impl Parser {
    fn new() -> Self {
        Self {
            section: Section::None,
            buffer: String::new(),
            pending_meta: None,
            turns: Vec::new(),
        }
    }

    fn feed(&mut self, line: &str) {
        match classify(line) {
            Some(Marker::UserStart) => {
                self.buffer.clear();
                self.section = Section::InUser;
            }
            Some(Marker::AssistantStart) => {
                self.buffer.clear();
                self.section = Section::None;
                self.pending_meta = TurnMeta::from_marker_line(line);
            }
            Some(Marker::AssistantBody) => {
                self.buffer.clear();
                self.section = Section::InAssistant;
            }
            Some(Marker::TurnEnd) => {
                let role = match self.section {
                    Section::InUser => Some(Role::User),
                    Section::InAssistant => Some(Role::Assistant),
                    Section::None => None,
                };
                let content = self.buffer.trim();
                if let Some(role) = role
                    && !content.is_empty()
                {
                    let meta = match role {
                        Role::Assistant => self.pending_meta.take(),
                        _ => None,
                    };
                    self.turns.push(ChatTurn {
                        role,
                        content: content.to_string(),
                        meta,
                    });
                }
                self.reset();
            }
            Some(Marker::ErrorEnd) => self.reset(),
            None => {
                if self.section != Section::None {
                    self.buffer.push_str(line);
                    self.buffer.push('\n');
                }
            }
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.section = Section::None;
        self.pending_meta = None;
    }

    fn finish(mut self) -> Transcript {
        if self.section == Section::InUser {
            let content = self.buffer.trim();
            if !content.is_empty() {
                self.turns.push(ChatTurn::new(Role::Prompt, content));
            }
        }
        Transcript { turns: self.turns }
    }
}

pub fn parse_transcript(text: &str) -> Transcript {
    let mut parser = Parser::new();
    for line in text.lines() {
        parser.feed(line);
    }
    parser.finish()
}

pub fn assistant_start_line(model: &str, date: &str) -> String {
    let model = serde_json::to_string(model).unwrap_or_else(|_| "\"\"".to_string());
    let date = serde_json::to_string(date).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        "{ASSISTANT_START_PREFIX} {{\"model\" : {model}, \"date\": {date}}} {ASSISTANT_START_SUFFIX}\n"
    )
}

/// Append-only handle on a journal file.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Only the first line is checked.
    pub fn is_valid(path: &Path) -> Result<bool> {
        let file =
            fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mut first = String::new();
        BufReader::new(file)
            .read_line(&mut first)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(first.contains(VALIDITY_PREFIX))
    }

    /// Writes the greeting section into an empty or missing file. Returns
    /// whether anything was written.
    pub fn populate_if_empty(&self, date: &str) -> Result<bool> {
        let empty = match fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => true,
            Err(err) => {
                return Err(err).with_context(|| format!("failed to stat {}", self.path.display()));
            }
        };
        if !empty {
            return Ok(false);
        }
        self.append_assistant_start(BOOTSTRAP_MODEL, date)?;
        self.append_str(&format!("{BOOTSTRAP_GREETING}\n"))?;
        self.append_turn_end()?;
        self.append_user_start()?;
        Ok(true)
    }

    pub fn read_transcript(&self) -> Result<Transcript> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        Ok(parse_transcript(&raw))
    }

    pub fn append_str(&self, content: &str) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        Ok(())
    }

    pub fn append_assistant_start(&self, model: &str, date: &str) -> Result<()> {
        self.append_str(&assistant_start_line(model, date))
    }

    pub fn append_assistant_body(&self) -> Result<()> {
        self.append_str(&format!("{ASSISTANT_BODY_MARKER}\n"))
    }

    pub fn append_user_start(&self) -> Result<()> {
        self.append_str(&format!("{USER_MARKER}\n"))
    }

    pub fn append_turn_end(&self) -> Result<()> {
        self.append_str(&format!("{TURN_END_MARKER}\n"))
    }

    pub fn append_error_end(&self) -> Result<()> {
        self.append_str(&format!("{ERROR_END_MARKER}\n"))
    }

    pub fn append_user_turn(&self, content: &str) -> Result<()> {
        self.append_user_start()?;
        self.append_str(&format!("{content}\n"))?;
        self.append_turn_end()
    }

    pub fn append_assistant_turn(&self, meta: &TurnMeta, content: &str) -> Result<()> {
        self.append_assistant_start(&meta.model, &meta.date)?;
        self.append_assistant_body()?;
        self.append_str(&format!("{content}\n"))?;
        self.append_turn_end()
    }
}
