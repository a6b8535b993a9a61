use std::io::BufRead;

use tracing::trace;

use crate::events::{HunkHeader, HunkLineKind, HunkRange, Side};
use crate::handlers::hunk_header::{
    parse_context_new_range, parse_context_old_range, parse_context_separator, trim_line_end,
};
use crate::oldnew::OldNew;
use crate::scanner::{HunkPhase, Scanner, StashedEvent, State};

impl<R: BufRead> Scanner<R> {
    /// Handle a line while inside a hunk: body lines, `\ No newline`
    /// markers, the context section markers, and whatever ends the hunk.
    pub(crate) fn handle_hunk_body_line(&mut self) -> bool {
        let phase = match self.state {
            State::InHunk(phase) => phase,
            _ => return false,
        };
        match phase {
            HunkPhase::Unified => self.unified_hunk_body_line(),
            HunkPhase::ContextAwaitRange => self.context_await_range_line(),
            HunkPhase::ContextOldBody => self.context_old_body_line(),
            HunkPhase::ContextNewBody => self.context_new_body_line(),
        }
        true
    }

    // A unified hunk ends when both advertised counts are spent; a line
    // such as `--- World?` while they are not is a removed line, and the
    // same bytes afterwards are a fresh start marker.
    fn unified_hunk_body_line(&mut self) {
        if self.reader.line().first() == Some(&b'\\') {
            self.stash(StashedEvent::NoNewlineLine);
            return;
        }
        if self.reader.line().starts_with(b"@@") {
            self.set_state(State::InPatch);
            self.reprocess = true;
            return;
        }
        // Some producers strip trailing whitespace, leaving context lines
        // entirely empty.
        if trim_line_end(self.reader.line()).is_empty()
            && self.hunk_remaining.old > 0
            && self.hunk_remaining.new > 0
        {
            self.hunk_remaining.old -= 1;
            self.hunk_remaining.new -= 1;
            self.stash(StashedEvent::HunkBodyBlankLine);
            return;
        }
        let classified = match self.reader.line().first().copied() {
            Some(b' ') if self.hunk_remaining.old > 0 && self.hunk_remaining.new > 0 => {
                Some((HunkLineKind::Context, true, true))
            }
            Some(b'-') if self.hunk_remaining.old > 0 => Some((HunkLineKind::Removed, true, false)),
            Some(b'+') if self.hunk_remaining.new > 0 => Some((HunkLineKind::Added, false, true)),
            _ => None,
        };
        match classified {
            Some((kind, spend_old, spend_new)) => {
                if spend_old {
                    self.hunk_remaining.old -= 1;
                }
                if spend_new {
                    self.hunk_remaining.new -= 1;
                }
                self.stash(StashedEvent::HunkBodyLine {
                    kind,
                    side: Side::Both,
                });
            }
            None => {
                self.set_state(State::SeekingPatch);
                self.reprocess = true;
            }
        }
    }

    // After `***************`; only `*** lo,hi ****` may follow.
    fn context_await_range_line(&mut self) {
        let range = parse_context_old_range(trim_line_end(self.reader.line()));
        match range {
            Some(range) if range.count > self.config.max_context_hunk_lines => {
                self.flush_context_hunk_as_prose();
                self.stash(StashedEvent::ProseLine);
                self.set_state(State::InPatch);
            }
            Some(range) => {
                let raw = self.current_raw_line();
                self.ctx_marker_lines.push(raw);
                self.begin_context_old_body(range);
            }
            None => {
                self.flush_context_hunk_as_prose();
                self.set_state(State::InPatch);
                self.reprocess = true;
            }
        }
    }

    // Buffer old-side lines until the `--- lo,hi ----` marker announces the
    // new side. The marker recognizer runs before body classification so a
    // section marker is never taken for a removed line.
    fn context_old_body_line(&mut self) {
        enum Action {
            Finish(HunkRange),
            Buffer { newline_marker: bool },
            Malformed,
        }
        let action = {
            let line = self.reader.line();
            if let Some(range) = parse_context_new_range(trim_line_end(line)) {
                Action::Finish(range)
            } else {
                match line.first().copied() {
                    Some(b'\\')
                        if self.hunk_remaining.old == 0 && !self.last_buffered_is_no_newline() =>
                    {
                        Action::Buffer {
                            newline_marker: true,
                        }
                    }
                    Some(b' ') | Some(b'-') | Some(b'!') if self.hunk_remaining.old > 0 => {
                        Action::Buffer {
                            newline_marker: false,
                        }
                    }
                    _ => Action::Malformed,
                }
            }
        };
        match action {
            Action::Finish(range) => self.finish_context_old_side(range),
            Action::Buffer { newline_marker } => {
                let raw = self.current_raw_line();
                self.ctx_old_lines.push(raw);
                if !newline_marker {
                    self.hunk_remaining.old -= 1;
                }
            }
            Action::Malformed => {
                self.flush_context_hunk_as_prose();
                self.set_state(State::SeekingPatch);
                self.reprocess = true;
            }
        }
    }

    fn last_buffered_is_no_newline(&self) -> bool {
        self.ctx_old_lines
            .last()
            .map_or(false, |raw| raw.bytes.first() == Some(&b'\\'))
    }

    /// The new side's marker arrived: emit the hunk header (positioned at
    /// the `*** lo,hi ****` line), replay the buffered old side with its
    /// original provenance, then stream the new side. Every replayed line
    /// is a physical line of the old section, so each one counts against
    /// `orig_count` only — a shared line shows up again, separately, in
    /// the new section.
    fn finish_context_old_side(&mut self, new_range: HunkRange) {
        trace!(
            old = ?self.ctx_old_range,
            new = ?new_range,
            buffered = self.ctx_old_lines.len(),
            "context hunk header complete"
        );
        self.hunk_header = Some(HunkHeader {
            ranges: OldNew::new(self.ctx_old_range, new_range),
            context: self.ctx_hint.take(),
            line_number: self.ctx_header_line,
            position: self.ctx_header_position,
        });
        self.stash(StashedEvent::HunkHeader);
        for raw in std::mem::take(&mut self.ctx_old_lines) {
            let stashed = match raw.bytes.first().copied() {
                Some(b'\\') => StashedEvent::NoNewlineOwned(raw),
                Some(b' ') => StashedEvent::HunkBodyOwned {
                    kind: HunkLineKind::Context,
                    side: Side::OldOnly,
                    line: raw,
                },
                Some(b'-') => StashedEvent::HunkBodyOwned {
                    kind: HunkLineKind::Removed,
                    side: Side::OldOnly,
                    line: raw,
                },
                Some(b'!') => StashedEvent::HunkBodyOwned {
                    kind: HunkLineKind::Changed,
                    side: Side::OldOnly,
                    line: raw,
                },
                _ => StashedEvent::Prose(raw),
            };
            self.stash(stashed);
        }
        self.ctx_marker_lines.clear();
        self.hunk_remaining.new = new_range.count;
        self.set_state(State::InHunk(HunkPhase::ContextNewBody));
    }

    // The new side streams directly; a separator or `*** lo,hi ****`
    // begins the next hunk of the same file.
    fn context_new_body_line(&mut self) {
        enum Action {
            NoNewline,
            Body(HunkLineKind, Side),
            NextSeparator(Option<String>),
            NextOldRange(HunkRange),
            Close,
        }
        let action = {
            let line = self.reader.line();
            let trimmed = trim_line_end(line);
            if line.first() == Some(&b'\\') {
                Action::NoNewline
            } else if let Some(hint) = parse_context_separator(trimmed) {
                Action::NextSeparator(hint)
            } else if let Some(range) = parse_context_old_range(trimmed) {
                Action::NextOldRange(range)
            } else {
                match line.first().copied() {
                    Some(b' ') if self.hunk_remaining.new > 0 => {
                        Action::Body(HunkLineKind::Context, Side::NewOnly)
                    }
                    Some(b'+') if self.hunk_remaining.new > 0 => {
                        Action::Body(HunkLineKind::Added, Side::NewOnly)
                    }
                    Some(b'!') if self.hunk_remaining.new > 0 => {
                        Action::Body(HunkLineKind::Changed, Side::NewOnly)
                    }
                    _ => Action::Close,
                }
            }
        };
        match action {
            Action::NoNewline => self.stash(StashedEvent::NoNewlineLine),
            Action::Body(kind, side) => {
                self.hunk_remaining.new -= 1;
                self.stash(StashedEvent::HunkBodyLine { kind, side });
            }
            Action::NextSeparator(hint) => {
                let raw = self.current_raw_line();
                self.ctx_marker_lines.clear();
                self.ctx_old_lines.clear();
                self.ctx_marker_lines.push(raw);
                self.ctx_hint = hint;
                self.set_state(State::InHunk(HunkPhase::ContextAwaitRange));
            }
            Action::NextOldRange(range) => {
                if range.count > self.config.max_context_hunk_lines {
                    self.stash(StashedEvent::ProseLine);
                    self.set_state(State::InPatch);
                } else {
                    let raw = self.current_raw_line();
                    self.ctx_marker_lines.clear();
                    self.ctx_old_lines.clear();
                    self.ctx_marker_lines.push(raw);
                    self.ctx_hint = None;
                    self.begin_context_old_body(range);
                }
            }
            Action::Close => {
                self.set_state(State::SeekingPatch);
                self.reprocess = true;
            }
        }
    }
}
