//! Turns a line stream whose segmentation has nothing to do with message
//! boundaries into complete JSON units.

use log::debug;
use serde_json::Value;
use std::io::{self, BufRead};

/// Synthesized trailing element that lets a dangling `,` or an unterminated
/// array parse.
const ARRAY_FILLER: &str = "{}]";

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Unit(Value),
    Done,
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One self-contained JSON value per non-empty line.
    Lines {
        data_prefix: Option<&'static str>,
        done_sentinel: Option<&'static str>,
    },
    /// An unterminated top-level array whose elements arrive split across lines.
    PrefixArray,
}

impl Framing {
    pub fn framer(self) -> Framer {
        match self {
            Framing::Lines {
                data_prefix,
                done_sentinel,
            } => Framer::Lines(LineFramer::new(data_prefix, done_sentinel)),
            Framing::PrefixArray => Framer::Array(ArrayFramer::default()),
        }
    }
}

#[derive(Debug)]
pub enum Framer {
    Lines(LineFramer),
    Array(ArrayFramer),
}

impl Framer {
    pub fn push_line(&mut self, line: &str) -> Option<Frame> {
        match self {
            Framer::Lines(f) => f.push_line(line),
            Framer::Array(f) => f.push_line(line),
        }
    }

    pub fn finish(&mut self) -> Option<Frame> {
        match self {
            Framer::Lines(_) => None,
            Framer::Array(f) => f.finish(),
        }
    }

    /// Text buffered but not yet turned into a unit.
    pub fn take_pending(&mut self) -> String {
        match self {
            Framer::Lines(_) => String::new(),
            Framer::Array(f) => std::mem::take(&mut f.prefix),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LineFramer {
    data_prefix: Option<&'static str>,
    done_sentinel: Option<&'static str>,
}

impl LineFramer {
    pub fn new(data_prefix: Option<&'static str>, done_sentinel: Option<&'static str>) -> Self {
        Self {
            data_prefix,
            done_sentinel,
        }
    }

    pub fn push_line(&mut self, line: &str) -> Option<Frame> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let payload = match self.data_prefix {
            Some(prefix) => match trimmed.strip_prefix(prefix) {
                Some(rest) => rest.trim(),
                None => return Some(Frame::Malformed(trimmed.to_string())),
            },
            None => trimmed,
        };

        if self.done_sentinel == Some(payload) {
            return Some(Frame::Done);
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(value) => Some(Frame::Unit(value)),
            Err(_) => Some(Frame::Malformed(trimmed.to_string())),
        }
    }
}

/// Prefix-growing accumulator for streamed JSON arrays.
///
/// Each line is tried twice: once with a synthesized leading `[` and once
/// without, since the producer's array may or may not already carry its own
/// opening bracket. Only the first complete value of the candidate is parsed,
/// so text after the producer's closing `]` is ignored.
#[derive(Debug, Default, Clone)]
pub struct ArrayFramer {
    prefix: String,
    produced: bool,
}

impl ArrayFramer {
    pub fn push_line(&mut self, line: &str) -> Option<Frame> {
        let wrapped = format!("[{}{}{}", self.prefix, line, ARRAY_FILLER);
        let bare = format!("{}{}{}", self.prefix, line, ARRAY_FILLER);
        let unit = first_element(&wrapped).or_else(|| first_element(&bare));

        self.prefix.push_str(line);

        let unit = unit?;
        self.prefix.clear();
        self.produced = true;
        Some(Frame::Unit(unit))
    }

    /// Called at end of stream.
    pub fn finish(&mut self) -> Option<Frame> {
        let leftover = std::mem::take(&mut self.prefix);
        if self.produced || leftover.trim().is_empty() {
            return None;
        }
        Some(Frame::Malformed(leftover))
    }
}

fn first_element(candidate: &str) -> Option<Value> {
    let mut stream = serde_json::Deserializer::from_str(candidate).into_iter::<Value>();
    let Some(Ok(Value::Array(mut items))) = stream.next() else {
        return None;
    };
    if items.is_empty() {
        return None;
    }
    // A lone `{}` is the filler itself, not producer data.
    if items.len() == 1 && items[0].as_object().is_some_and(|o| o.is_empty()) {
        return None;
    }
    Some(items.swap_remove(0))
}

/// Lazy, non-restartable sequence of frames read from a blocking body.
pub struct FrameReader<R> {
    reader: R,
    framer: Framer,
    finished: bool,
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(reader: R, framing: Framing) -> Self {
        Self {
            reader,
            framer: framing.framer(),
            finished: false,
        }
    }

    /// Everything left in the stream, buffered text first. Read errors end
    /// the drain without failing it.
    pub fn drain(&mut self) -> String {
        let mut out = self.framer.take_pending();
        if self.finished {
            return out;
        }
        self.finished = true;
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => out.push_str(line.trim_end_matches(['\r', '\n'])),
            }
        }
        out
    }
}

impl<R: BufRead> Iterator for FrameReader<R> {
    type Item = io::Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    self.finished = true;
                    return self.framer.finish().map(Ok);
                }
                Ok(_) => {
                    let chunk = line.trim_end_matches(['\r', '\n']);
                    debug!("stream chunk: {chunk}");
                    if let Some(frame) = self.framer.push_line(chunk) {
                        return Some(Ok(frame));
                    }
                }
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ArrayFramer, Frame, FrameReader, Framing, LineFramer};
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn array_framer_waits_for_split_object() {
        let mut framer = ArrayFramer::default();
        assert_eq!(framer.push_line(r#"{"candidates":["#), None);
        let frame = framer.push_line(r#"{"text":"hi"}]}]"#);
        assert_eq!(
            frame,
            Some(Frame::Unit(json!({"candidates": [{"text": "hi"}]})))
        );
    }

    #[test]
    fn array_framer_handles_producer_opening_bracket_and_separators() {
        let lines = [
            "[{",
            r#"  "candidates": [{"content": {"parts": [{"text": "one"}]}}]"#,
            "}",
            ",",
            "{",
            r#"  "candidates": [{"content": {"parts": [{"text": "two"}]}}]"#,
            "}",
            "]",
        ];
        let mut framer = ArrayFramer::default();
        let units: Vec<Frame> = lines.iter().filter_map(|l| framer.push_line(l)).collect();
        assert_eq!(units.len(), 2);
        let Frame::Unit(first) = &units[0] else {
            panic!("expected unit");
        };
        assert_eq!(first["candidates"][0]["content"]["parts"][0]["text"], "one");
        let Frame::Unit(second) = &units[1] else {
            panic!("expected unit");
        };
        assert_eq!(second["candidates"][0]["content"]["parts"][0]["text"], "two");
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn array_framer_ignores_lone_bracket_lines() {
        let mut framer = ArrayFramer::default();
        assert_eq!(framer.push_line("["), None);
        assert_eq!(framer.push_line("]"), None);
    }

    #[test]
    fn array_framer_reports_malformed_when_nothing_parsed() {
        let mut framer = ArrayFramer::default();
        assert_eq!(framer.push_line("{\"error\": {"), None);
        assert_eq!(framer.push_line("\"code\": 401"), None);
        assert_eq!(
            framer.finish(),
            Some(Frame::Malformed("{\"error\": {\"code\": 401".to_string()))
        );
    }

    #[test]
    fn line_framer_strips_prefix_and_detects_sentinel() {
        let mut framer = LineFramer::new(Some("data:"), Some("[DONE]"));
        assert_eq!(framer.push_line(""), None);
        assert_eq!(
            framer.push_line(r#"data: {"model":"gpt"}"#),
            Some(Frame::Unit(json!({"model": "gpt"})))
        );
        assert_eq!(framer.push_line("data: [DONE]"), Some(Frame::Done));
        assert_eq!(
            framer.push_line("{"),
            Some(Frame::Malformed("{".to_string()))
        );
        assert_eq!(
            framer.push_line("data: {broken"),
            Some(Frame::Malformed("data: {broken".to_string()))
        );
    }

    #[test]
    fn frame_reader_is_lazy_and_drains_rest() {
        let body = "{\"a\":1}\n\n{\"b\":2}\n{\"c\":3}\n";
        let mut reader = FrameReader::new(
            Cursor::new(body),
            Framing::Lines {
                data_prefix: None,
                done_sentinel: None,
            },
        );
        let first = reader.next().expect("frame").expect("io");
        assert_eq!(first, Frame::Unit(json!({"a": 1})));
        assert_eq!(reader.drain(), "{\"b\":2}{\"c\":3}");
        assert!(reader.next().is_none());
    }

    #[test]
    fn frame_reader_flushes_array_leftover_at_end() {
        let mut reader = FrameReader::new(
            Cursor::new("{\"error\":\n\"denied\"\n"),
            Framing::PrefixArray,
        );
        let frame = reader.next().expect("frame").expect("io");
        assert_eq!(frame, Frame::Malformed("{\"error\":\"denied\"".to_string()));
        assert!(reader.next().is_none());
    }
}
