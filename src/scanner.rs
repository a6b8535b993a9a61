use std::collections::VecDeque;
use std::io::BufRead;

use tracing::trace;

use crate::config::ScannerConfig;
use crate::error::ScanError;
use crate::events::{Event, HeaderBlock, HunkHeader, HunkLine, HunkLineKind, HunkRange, RawLine, Side};
use crate::handlers::diff_header::HeaderAccumulator;
use crate::oldnew::OldNew;
use crate::reader::LineReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    SeekingPatch,       // Between patches; unrecognized lines are prose
    AccumulatingHeaders, // Buffering candidate header lines
    InPatch,            // Headers emitted, before/between hunks
    InHunk(HunkPhase),
    Error,              // Terminal
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HunkPhase {
    Unified,
    ContextAwaitRange, // After `***************`, expecting `*** lo,hi ****`
    ContextOldBody,    // Buffering the old side until `--- lo,hi ----`
    ContextNewBody,    // Streaming the new side
}

/// Owned storage behind the borrowed [`Event`] most recently returned.
/// Variants without payload reference the scanner's line buffer or its
/// per-patch header/hunk-header slots.
#[derive(Debug)]
pub(crate) enum StashedEvent {
    Prose(RawLine),
    ProseLine,
    Headers,
    HunkHeader,
    HunkBodyLine { kind: HunkLineKind, side: Side },
    HunkBodyOwned { kind: HunkLineKind, side: Side, line: RawLine },
    // An empty unified context line from a producer that strips trailing
    // whitespace; there is no marker byte to remove.
    HunkBodyBlankLine,
    NoNewlineLine,
    NoNewlineOwned(RawLine),
    BinaryLine { git: bool },
}

// Transitions are driven by one handle_* method per line family; each
// returns whether it consumed the current line, and may request that the
// same line be examined again under the new state by setting `reprocess`
// (the explicit-continue rendering of "reprocess current line").
//
// | from                | line                      | to                  |
// |---------------------+---------------------------+---------------------|
// | SeekingPatch        | start marker              | AccumulatingHeaders |
// | SeekingPatch        | other                     | SeekingPatch        |
// | AccumulatingHeaders | continuation              | AccumulatingHeaders |
// | AccumulatingHeaders | closing continuation      | InPatch             |
// | AccumulatingHeaders | non-continuation          | SeekingPatch, redo  |
// | InPatch             | hunk header               | InHunk              |
// | InPatch             | binary marker             | InPatch             |
// | InPatch             | start marker              | AccumulatingHeaders |
// | InPatch             | other                     | SeekingPatch, redo  |
// | InHunk              | body / `\` / hunk header  | InHunk              |
// | InHunk              | other                     | SeekingPatch, redo  |

/// A streaming scanner turning a byte stream into patch events.
///
/// `Scanner` is single-threaded and not re-entrant; each event returned by
/// [`next`](Scanner::next) borrows scanner-internal buffers and is valid
/// only until the next call.
pub struct Scanner<R> {
    pub(crate) reader: LineReader<R>,
    pub(crate) config: ScannerConfig,
    pub(crate) state: State,
    pub(crate) reprocess: bool,
    pub(crate) acc: HeaderAccumulator,
    pub(crate) header_block: Option<HeaderBlock>,
    pub(crate) hunk_header: Option<HunkHeader>,
    pub(crate) hunk_remaining: OldNew<u64>,
    // Context-hunk engine: the separator and `*** lo,hi ****` lines of the
    // hunk being assembled, then the buffered old-side body. All of it is
    // re-emitted as prose if the hunk never materializes.
    pub(crate) ctx_marker_lines: Vec<RawLine>,
    pub(crate) ctx_old_lines: Vec<RawLine>,
    pub(crate) ctx_old_range: HunkRange,
    pub(crate) ctx_hint: Option<String>,
    pub(crate) ctx_header_line: u64,
    pub(crate) ctx_header_position: u64,
    pub(crate) pending: VecDeque<StashedEvent>,
    pub(crate) current: StashedEvent,
    pub(crate) consuming_binary: bool,
    pub(crate) failed: bool,
    pub(crate) eof: bool,
}

pub(crate) fn scan_unreachable(message: &str) -> ! {
    panic!("patchscan internal error: {}", message);
}

impl<R: BufRead> Scanner<R> {
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, ScannerConfig::default())
    }

    pub fn with_config(reader: R, config: ScannerConfig) -> Self {
        Self {
            reader: LineReader::new(reader),
            config,
            state: State::SeekingPatch,
            reprocess: false,
            acc: HeaderAccumulator::new(),
            header_block: None,
            hunk_header: None,
            hunk_remaining: OldNew::default(),
            ctx_marker_lines: Vec::new(),
            ctx_old_lines: Vec::new(),
            ctx_old_range: HunkRange::default(),
            ctx_hint: None,
            ctx_header_line: 0,
            ctx_header_position: 0,
            pending: VecDeque::new(),
            current: StashedEvent::Prose(RawLine::default()),
            consuming_binary: false,
            failed: false,
            eof: false,
        }
    }

    /// Return the next event, `Ok(None)` at end of input, or an error.
    ///
    /// Malformed patch regions are not errors: their lines come back as
    /// [`Event::Prose`] and scanning continues. After any `Err` every
    /// further call returns [`ScanError::Failed`].
    pub fn next(&mut self) -> Result<Option<Event<'_>>, ScanError> {
        if self.failed {
            return Err(ScanError::Failed);
        }
        loop {
            if let Some(stashed) = self.pending.pop_front() {
                self.current = stashed;
                return Ok(Some(self.current_event()));
            }
            if self.eof {
                return Ok(None);
            }
            match self.reader.read_next() {
                Ok(true) => {
                    if let Err(error) = self.process_line() {
                        self.fail();
                        return Err(error);
                    }
                }
                Ok(false) => self.handle_eof(),
                Err(error) => {
                    self.fail();
                    return Err(ScanError::Io(error));
                }
            }
        }
    }

    /// Byte offset of the line most recently read; 0 before the first read.
    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    /// 1-based number of the line most recently read; 0 before the first.
    pub fn line_number(&self) -> u64 {
        self.reader.line_number()
    }

    /// True while the scanner is inside a patch's header region, i.e.
    /// accumulating candidate headers or between the headers and the hunks.
    pub fn at_patch_start(&self) -> bool {
        matches!(self.state, State::AccumulatingHeaders | State::InPatch)
    }

    /// Consume and discard events until the scanner has left the current
    /// patch. A following patch's start marker is preserved: scanning
    /// resumes with its headers.
    pub fn skip_current_patch(&mut self) -> Result<(), ScanError> {
        if self.failed {
            return Err(ScanError::Failed);
        }
        while matches!(self.state, State::InPatch | State::InHunk(_)) {
            self.pending.clear();
            if self.eof {
                break;
            }
            match self.reader.read_next() {
                Ok(true) => {
                    if let Err(error) = self.process_line() {
                        self.fail();
                        return Err(error);
                    }
                }
                Ok(false) => self.handle_eof(),
                Err(error) => {
                    self.fail();
                    return Err(ScanError::Io(error));
                }
            }
        }
        Ok(())
    }

    fn fail(&mut self) {
        self.failed = true;
        self.set_state(State::Error);
    }

    /// Run the current line through the handler chain, re-running it when a
    /// handler moved to a new state and asked for the line to be seen again.
    fn process_line(&mut self) -> Result<(), ScanError> {
        loop {
            self.reprocess = false;
            let _handled = self.handle_header_accumulation_line()?
                || self.handle_hunk_body_line()
                || self.handle_hunk_header_line()
                || self.handle_context_hunk_start_line()
                || self.handle_binary_marker_line()
                || self.handle_patch_start_line()
                || self.handle_prose_line();
            if !self.reprocess {
                return Ok(());
            }
        }
    }

    /// Begin accumulating a new candidate header block on a start marker.
    pub(crate) fn handle_patch_start_line(&mut self) -> bool {
        if !matches!(self.state, State::SeekingPatch | State::InPatch) {
            return false;
        }
        let is_start = {
            let line = self.reader.line();
            line.starts_with(b"diff ") || line.starts_with(b"--- ") || line.starts_with(b"*** ")
        };
        if !is_start {
            return false;
        }
        let raw = self.current_raw_line();
        self.reset_patch_state();
        self.acc.start(raw);
        self.set_state(State::AccumulatingHeaders);
        true
    }

    /// Any line nothing else claimed. In `SeekingPatch` (and inside a git
    /// binary payload) it is prose; from `InPatch` the scanner first drops
    /// back to `SeekingPatch` and looks at the line again.
    pub(crate) fn handle_prose_line(&mut self) -> bool {
        match self.state {
            State::SeekingPatch => self.stash(StashedEvent::ProseLine),
            State::InPatch if self.consuming_binary => self.stash(StashedEvent::ProseLine),
            _ => {
                self.set_state(State::SeekingPatch);
                self.reprocess = true;
            }
        }
        true
    }

    fn handle_eof(&mut self) {
        match self.state {
            State::AccumulatingHeaders => {
                if self.acc.finalizable() {
                    self.finalize_header_block();
                } else {
                    self.flush_accumulated_as_prose();
                }
            }
            State::InHunk(HunkPhase::ContextAwaitRange)
            | State::InHunk(HunkPhase::ContextOldBody) => {
                self.flush_context_hunk_as_prose();
            }
            _ => {}
        }
        if self.state != State::Error {
            self.set_state(State::SeekingPatch);
        }
        self.eof = true;
    }

    pub(crate) fn set_state(&mut self, state: State) {
        if state != self.state {
            trace!(from = ?self.state, to = ?state, "state transition");
        }
        self.state = state;
    }

    /// Forget per-patch bookkeeping when a new patch begins.
    pub(crate) fn reset_patch_state(&mut self) {
        self.consuming_binary = false;
        self.hunk_remaining = OldNew::default();
        self.ctx_marker_lines.clear();
        self.ctx_old_lines.clear();
        self.ctx_hint = None;
    }

    pub(crate) fn stash(&mut self, event: StashedEvent) {
        self.pending.push_back(event);
    }

    pub(crate) fn current_raw_line(&self) -> RawLine {
        RawLine {
            bytes: self.reader.line().to_vec(),
            line_number: self.reader.line_number(),
            position: self.reader.position(),
        }
    }

    pub(crate) fn flush_accumulated_as_prose(&mut self) {
        for raw in self.acc.take_lines() {
            self.pending.push_back(StashedEvent::Prose(raw));
        }
    }

    pub(crate) fn flush_context_hunk_as_prose(&mut self) {
        let markers = std::mem::take(&mut self.ctx_marker_lines);
        let body = std::mem::take(&mut self.ctx_old_lines);
        for raw in markers.into_iter().chain(body) {
            self.pending.push_back(StashedEvent::Prose(raw));
        }
        self.ctx_hint = None;
    }

    fn current_event(&self) -> Event<'_> {
        match &self.current {
            StashedEvent::Prose(raw) => Event::Prose {
                line: &raw.bytes,
                line_number: raw.line_number,
                position: raw.position,
            },
            StashedEvent::ProseLine => Event::Prose {
                line: self.reader.line(),
                line_number: self.reader.line_number(),
                position: self.reader.position(),
            },
            StashedEvent::Headers => match &self.header_block {
                Some(block) => Event::Headers(block),
                None => scan_unreachable("headers event without a header block"),
            },
            StashedEvent::HunkHeader => match &self.hunk_header {
                Some(header) => Event::HunkHeader(header),
                None => scan_unreachable("hunk header event without a hunk header"),
            },
            StashedEvent::HunkBodyLine { kind, side } => {
                let line = self.reader.line();
                Event::HunkLine(HunkLine {
                    kind: *kind,
                    side: *side,
                    content: if line.is_empty() { line } else { &line[1..] },
                    line_number: self.reader.line_number(),
                    position: self.reader.position(),
                })
            }
            StashedEvent::HunkBodyBlankLine => Event::HunkLine(HunkLine {
                kind: HunkLineKind::Context,
                side: Side::Both,
                content: self.reader.line(),
                line_number: self.reader.line_number(),
                position: self.reader.position(),
            }),
            StashedEvent::HunkBodyOwned { kind, side, line } => Event::HunkLine(HunkLine {
                kind: *kind,
                side: *side,
                content: if line.bytes.is_empty() {
                    &line.bytes
                } else {
                    &line.bytes[1..]
                },
                line_number: line.line_number,
                position: line.position,
            }),
            StashedEvent::NoNewlineLine => Event::NoNewlineAtEof {
                line: self.reader.line(),
                line_number: self.reader.line_number(),
                position: self.reader.position(),
            },
            StashedEvent::NoNewlineOwned(raw) => Event::NoNewlineAtEof {
                line: &raw.bytes,
                line_number: raw.line_number,
                position: raw.position,
            },
            StashedEvent::BinaryLine { git } => Event::Binary {
                line: self.reader.line(),
                is_git_binary_patch: *git,
                line_number: self.reader.line_number(),
                position: self.reader.position(),
            },
        }
    }
}
