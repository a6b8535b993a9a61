// Parsing for the two hunk header grammars.
//
// Unified headers look like
// ```
// @@ -119,12 +119,7 @@ fn write_to_output_buffer(
// ```
// and carry both ranges on one line. Context hunks spread theirs over a
// separator and two section markers:
// ```
// *************** fn write_to_output_buffer(
// *** 119,130 ****
// --- 119,125 ----
// ```
// with the old range's body between the `****` and `----` lines.

use std::io::BufRead;

use lazy_static::lazy_static;
use regex::bytes::Regex;

use crate::events::{HunkHeader, HunkRange};
use crate::oldnew::OldNew;
use crate::scanner::{HunkPhase, Scanner, StashedEvent, State};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedUnifiedHunkHeader {
    pub ranges: OldNew<HunkRange>,
    pub context: Option<String>,
}

lazy_static! {
    static ref UNIFIED_HUNK_HEADER_REGEX: Regex =
        Regex::new(r"(?-u)^@@ -([0-9]+)(?:,([0-9]+))? \+([0-9]+)(?:,([0-9]+))? @@(.*)$").unwrap();
    static ref CONTEXT_SEPARATOR_REGEX: Regex = Regex::new(r"(?-u)^\*{4,}( .*)?$").unwrap();
    static ref CONTEXT_OLD_RANGE_REGEX: Regex =
        Regex::new(r"(?-u)^\*\*\* ([0-9]+)(?:,([0-9]+))? \*\*\*\*$").unwrap();
    static ref CONTEXT_NEW_RANGE_REGEX: Regex =
        Regex::new(r"(?-u)^--- ([0-9]+)(?:,([0-9]+))? ----$").unwrap();
}

pub(crate) fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

fn capture_number(caps: &regex::bytes::Captures, index: usize) -> Option<Option<u64>> {
    match caps.get(index) {
        None => Some(None),
        Some(m) => std::str::from_utf8(m.as_bytes())
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Some),
    }
}

/// Parse `@@ -A[,B] +C[,D] @@[ context]`, with absent counts defaulting
/// to 1. Returns `None` on malformed input or integer overflow; the caller
/// degrades the line to prose.
pub(crate) fn parse_unified_hunk_header(line: &[u8]) -> Option<ParsedUnifiedHunkHeader> {
    let caps = UNIFIED_HUNK_HEADER_REGEX.captures(line)?;
    let orig_offset = capture_number(&caps, 1)??;
    let orig_count = capture_number(&caps, 2)?.unwrap_or(1);
    let new_offset = capture_number(&caps, 3)??;
    let new_count = capture_number(&caps, 4)?.unwrap_or(1);
    let context = caps.get(5).and_then(|m| {
        m.as_bytes()
            .strip_prefix(b" ")
            .map(|rest| String::from_utf8_lossy(rest).into_owned())
    });
    Some(ParsedUnifiedHunkHeader {
        ranges: OldNew::new(
            HunkRange {
                offset: orig_offset,
                count: orig_count,
            },
            HunkRange {
                offset: new_offset,
                count: new_count,
            },
        ),
        context,
    })
}

/// The `***************` separator opening a context hunk. GNU diff -p puts
/// the function hint after the stars; it is returned when present.
pub(crate) fn parse_context_separator(line: &[u8]) -> Option<Option<String>> {
    let caps = CONTEXT_SEPARATOR_REGEX.captures(line)?;
    Some(caps.get(1).map(|m| {
        String::from_utf8_lossy(&m.as_bytes()[1..])
            .trim_end()
            .to_string()
    }))
}

pub(crate) fn parse_context_old_range(line: &[u8]) -> Option<HunkRange> {
    let caps = CONTEXT_OLD_RANGE_REGEX.captures(line)?;
    context_range(capture_number(&caps, 1)??, capture_number(&caps, 2)?)
}

pub(crate) fn parse_context_new_range(line: &[u8]) -> Option<HunkRange> {
    let caps = CONTEXT_NEW_RANGE_REGEX.captures(line)?;
    context_range(capture_number(&caps, 1)??, capture_number(&caps, 2)?)
}

// A count of zero is written as the single number `0`, or as a `lo,hi`
// range with `hi < lo`. A lone nonzero number means `lo == hi`.
fn context_range(lo: u64, hi: Option<u64>) -> Option<HunkRange> {
    let range = match hi {
        None if lo == 0 => HunkRange { offset: 0, count: 0 },
        None => HunkRange { offset: lo, count: 1 },
        Some(hi) if hi < lo || (lo == 0 && hi == 0) => HunkRange {
            offset: lo,
            count: 0,
        },
        Some(hi) => HunkRange {
            offset: lo,
            count: hi - lo + 1,
        },
    };
    Some(range)
}

/// True for any line of the context-hunk separator family.
pub(crate) fn is_context_hunk_line(line: &[u8]) -> bool {
    parse_context_separator(line).is_some()
        || parse_context_old_range(line).is_some()
        || parse_context_new_range(line).is_some()
}

impl<R: BufRead> Scanner<R> {
    /// Check for and handle a unified `@@ …` hunk header. An `@@` line that
    /// fails to parse is emitted as prose without leaving the patch.
    pub(crate) fn handle_hunk_header_line(&mut self) -> bool {
        if self.state != State::InPatch || !self.reader.line().starts_with(b"@@") {
            return false;
        }
        let parsed = parse_unified_hunk_header(trim_line_end(self.reader.line()));
        match parsed {
            Some(parsed) => {
                self.hunk_remaining =
                    OldNew::new(parsed.ranges.old.count, parsed.ranges.new.count);
                self.hunk_header = Some(HunkHeader {
                    ranges: parsed.ranges,
                    context: parsed.context,
                    line_number: self.reader.line_number(),
                    position: self.reader.position(),
                });
                self.stash(StashedEvent::HunkHeader);
                self.set_state(State::InHunk(HunkPhase::Unified));
            }
            None => self.stash(StashedEvent::ProseLine),
        }
        true
    }

    /// Check for and handle the two context-hunk opening lines. The hunk
    /// header event is deferred until the `--- lo,hi ----` marker arrives
    /// with the new side's range.
    pub(crate) fn handle_context_hunk_start_line(&mut self) -> bool {
        if self.state != State::InPatch {
            return false;
        }
        enum StartKind {
            Separator(Option<String>),
            OldRange(HunkRange),
        }
        let kind = {
            let trimmed = trim_line_end(self.reader.line());
            if let Some(hint) = parse_context_separator(trimmed) {
                Some(StartKind::Separator(hint))
            } else {
                parse_context_old_range(trimmed).map(StartKind::OldRange)
            }
        };
        match kind {
            None => false,
            Some(StartKind::Separator(hint)) => {
                let raw = self.current_raw_line();
                self.ctx_marker_lines.clear();
                self.ctx_old_lines.clear();
                self.ctx_marker_lines.push(raw);
                self.ctx_hint = hint;
                self.set_state(State::InHunk(HunkPhase::ContextAwaitRange));
                true
            }
            Some(StartKind::OldRange(range)) => {
                if range.count > self.config.max_context_hunk_lines {
                    // Reject the hunk outright; its opening line is prose.
                    self.stash(StashedEvent::ProseLine);
                    return true;
                }
                let raw = self.current_raw_line();
                self.ctx_marker_lines.clear();
                self.ctx_old_lines.clear();
                self.ctx_marker_lines.push(raw);
                self.ctx_hint = None;
                self.begin_context_old_body(range);
                true
            }
        }
    }

    /// Record the old side's range and start buffering its body.
    pub(crate) fn begin_context_old_body(&mut self, range: HunkRange) {
        self.ctx_old_range = range;
        self.ctx_header_line = self.reader.line_number();
        self.ctx_header_position = self.reader.position();
        self.hunk_remaining.old = range.count;
        self.set_state(State::InHunk(HunkPhase::ContextOldBody));
    }
}
