use std::io::BufRead;

use tracing::trace;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::ScanError;
use crate::events::{Dialect, GitKind, HeaderBlock, RawLine};
use crate::handlers::hunk_header::{is_context_hunk_line, trim_line_end};
use crate::oldnew::OldNew;
use crate::scanner::{Scanner, StashedEvent, State};

// https://git-scm.com/docs/git-config#Documentation/git-config.txt-diffmnemonicPrefix
const DIFF_PREFIXES: [&str; 6] = ["a/", "b/", "c/", "i/", "o/", "w/"];

/// What the accumulated prefix of a candidate block has committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Track {
    /// A classic `diff …` command line only; file lines decide the dialect.
    Classic,
    /// `diff --git` seen; collecting extended headers.
    GitExtended,
    /// Git block whose `--- ` file line arrived; only `+++ ` may follow.
    GitHaveMinus,
    /// A `--- ` old-file line; waiting for `+++ `.
    Unified,
    /// A `*** ` old-file line; waiting for the `--- ` new-file line.
    Context,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    /// Stored; the block may still grow.
    Accepted,
    /// Stored and the block just closed. `binary` carries the
    /// `is_git_binary_patch` flag when a binary marker did the closing.
    Completed { binary: Option<bool> },
    /// The line opens a different block. Finalize (valid git block) or
    /// flush the current one, then restart from this line.
    RestartBlock { finalize_first: bool },
    /// The line is no continuation. `finalize` distinguishes a git block
    /// that is complete as it stands from an accumulation that was never a
    /// patch and must be re-emitted as prose.
    Interrupted { finalize: bool },
    /// Storing the line would exceed the header-line cap.
    Overflow,
}

/// Buffers candidate header lines until they form a valid block or are
/// proven not to be one.
#[derive(Debug)]
pub(crate) struct HeaderAccumulator {
    lines: Vec<RawLine>,
    track: Track,
}

impl HeaderAccumulator {
    pub(crate) fn new() -> Self {
        Self {
            lines: Vec::new(),
            track: Track::Classic,
        }
    }

    /// Begin a new candidate block. `raw` must be a start marker line.
    pub(crate) fn start(&mut self, raw: RawLine) {
        self.track = if raw.bytes.starts_with(b"diff --git ") {
            Track::GitExtended
        } else if raw.bytes.starts_with(b"diff ") {
            Track::Classic
        } else if raw.bytes.starts_with(b"--- ") {
            Track::Unified
        } else {
            Track::Context
        };
        self.lines.clear();
        self.lines.push(raw);
    }

    /// A git block is a patch even without file lines; the other dialects
    /// only become one via their closing line.
    pub(crate) fn finalizable(&self) -> bool {
        self.track == Track::GitExtended && !self.lines.is_empty()
    }

    pub(crate) fn dialect(&self) -> Dialect {
        match self.track {
            Track::GitExtended | Track::GitHaveMinus => Dialect::GitExtended,
            Track::Context => Dialect::Context,
            Track::Classic | Track::Unified => Dialect::Unified,
        }
    }

    pub(crate) fn take_lines(&mut self) -> Vec<RawLine> {
        std::mem::take(&mut self.lines)
    }

    pub(crate) fn push(&mut self, raw: &RawLine, max_lines: usize) -> PushOutcome {
        let line = &raw.bytes[..];
        let (outcome, next_track) = match self.track {
            Track::GitExtended => {
                if line.starts_with(b"diff ") {
                    return PushOutcome::RestartBlock {
                        finalize_first: true,
                    };
                } else if line.starts_with(b"--- ") {
                    (PushOutcome::Accepted, Some(Track::GitHaveMinus))
                } else if line.starts_with(b"+++ ") {
                    // A `+++ ` with no `--- ` before it breaks the ordering
                    // rules; the whole block degrades to prose.
                    return PushOutcome::Interrupted { finalize: false };
                } else if line.starts_with(b"GIT binary patch") {
                    (PushOutcome::Completed { binary: Some(true) }, None)
                } else if line.starts_with(b"Binary files ") {
                    (PushOutcome::Completed { binary: Some(false) }, None)
                } else if is_git_extended_header(line) {
                    (PushOutcome::Accepted, None)
                } else {
                    return PushOutcome::Interrupted { finalize: true };
                }
            }
            Track::GitHaveMinus => {
                if line.starts_with(b"+++ ") {
                    (PushOutcome::Completed { binary: None }, None)
                } else {
                    return PushOutcome::Interrupted { finalize: false };
                }
            }
            Track::Unified => {
                if line.starts_with(b"+++ ") {
                    (PushOutcome::Completed { binary: None }, None)
                } else if line.starts_with(b"--- ") || line.starts_with(b"diff ") {
                    return PushOutcome::RestartBlock {
                        finalize_first: false,
                    };
                } else if looks_like_continuation(line) {
                    (PushOutcome::Accepted, None)
                } else {
                    return PushOutcome::Interrupted { finalize: false };
                }
            }
            Track::Context => {
                if line.starts_with(b"--- ") {
                    (PushOutcome::Completed { binary: None }, None)
                } else if line.starts_with(b"*** ") || line.starts_with(b"diff ") {
                    return PushOutcome::RestartBlock {
                        finalize_first: false,
                    };
                } else {
                    return PushOutcome::Interrupted { finalize: false };
                }
            }
            Track::Classic => {
                if line.starts_with(b"diff ") {
                    return PushOutcome::RestartBlock {
                        finalize_first: false,
                    };
                } else if line.starts_with(b"--- ") {
                    (PushOutcome::Accepted, Some(Track::Unified))
                } else if line.starts_with(b"*** ") {
                    (PushOutcome::Accepted, Some(Track::Context))
                } else if looks_like_continuation(line) {
                    (PushOutcome::Accepted, None)
                } else {
                    return PushOutcome::Interrupted { finalize: false };
                }
            }
        };
        if self.lines.len() >= max_lines {
            return PushOutcome::Overflow;
        }
        self.lines.push(raw.clone());
        if let Some(track) = next_track {
            self.track = track;
        }
        outcome
    }
}

/// True iff `line` is one of the recognized header continuation prefixes.
pub(crate) fn looks_like_continuation(line: &[u8]) -> bool {
    static PREFIXES: &[&[u8]] = &[
        b"+++ ",
        b"--- ",
        b"index ",
        b"new file mode ",
        b"deleted file mode ",
        b"old mode ",
        b"new mode ",
        b"similarity index ",
        b"dissimilarity index ",
        b"rename from ",
        b"rename to ",
        b"copy from ",
        b"copy to ",
        b"Binary files ",
        b"GIT binary patch",
    ];
    PREFIXES.iter().any(|prefix| line.starts_with(prefix))
        || is_context_hunk_line(trim_line_end(line))
}

fn is_git_extended_header(line: &[u8]) -> bool {
    static PREFIXES: &[&[u8]] = &[
        b"index ",
        b"old mode ",
        b"new mode ",
        b"new file mode ",
        b"deleted file mode ",
        b"similarity index ",
        b"dissimilarity index ",
        b"rename from ",
        b"rename to ",
        b"copy from ",
        b"copy to ",
    ];
    PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}

impl<R: BufRead> Scanner<R> {
    /// Feed the current line to the header accumulator and act on the
    /// verdict: keep accumulating, emit the finished block, restart on a
    /// fresh start marker, or re-emit a failed accumulation as prose.
    pub(crate) fn handle_header_accumulation_line(&mut self) -> Result<bool, ScanError> {
        if self.state != State::AccumulatingHeaders {
            return Ok(false);
        }
        let raw = self.current_raw_line();
        match self.acc.push(&raw, self.config.max_header_lines) {
            PushOutcome::Accepted => {}
            PushOutcome::Completed { binary } => {
                self.finalize_header_block();
                if let Some(git) = binary {
                    self.stash(StashedEvent::BinaryLine { git });
                    if git {
                        self.consuming_binary = true;
                    }
                }
                self.set_state(State::InPatch);
            }
            PushOutcome::RestartBlock { finalize_first } => {
                if finalize_first {
                    self.finalize_header_block();
                } else {
                    self.flush_accumulated_as_prose();
                }
                self.acc.start(raw);
            }
            PushOutcome::Interrupted { finalize } => {
                if finalize {
                    self.finalize_header_block();
                    self.set_state(State::InPatch);
                } else {
                    self.flush_accumulated_as_prose();
                    self.set_state(State::SeekingPatch);
                }
                self.reprocess = true;
            }
            PushOutcome::Overflow => return Err(ScanError::HeaderOverflow),
        }
        Ok(true)
    }

    /// Parse the accumulated lines into the current HeaderBlock and queue
    /// the Headers event. Storage for the previous patch is replaced here.
    pub(crate) fn finalize_header_block(&mut self) {
        let dialect = self.acc.dialect();
        let lines = self.acc.take_lines();
        let block = parse_header_block(lines, dialect);
        trace!(dialect = ?block.dialect, git_kind = ?block.git_kind, "header block finalized");
        self.reset_patch_state();
        self.header_block = Some(block);
        self.stash(StashedEvent::Headers);
    }
}

pub(crate) fn parse_header_block(lines: Vec<RawLine>, dialect: Dialect) -> HeaderBlock {
    let (start_line, start_position) = lines
        .first()
        .map(|raw| (raw.line_number, raw.position))
        .unwrap_or((0, 0));
    let mut block = HeaderBlock {
        dialect,
        git_kind: GitKind::Normal,
        names: OldNew::default(),
        git_names: OldNew::default(),
        modes: OldNew::default(),
        hashes: OldNew::default(),
        timestamps: OldNew::default(),
        similarity_index: None,
        dissimilarity_index: None,
        rename: OldNew::default(),
        copy: OldNew::default(),
        is_binary: false,
        raw_header_lines: Vec::new(),
        start_line,
        start_position,
    };
    let git_names_expected = dialect == Dialect::GitExtended;
    let mut old_value: Option<String> = None;
    let mut new_value: Option<String> = None;
    let mut index_mode: Option<u32> = None;
    let mut saw_new_file_mode = false;
    let mut saw_deleted_file_mode = false;

    for raw in &lines {
        let text = String::from_utf8_lossy(&raw.bytes);
        let line = text.trim_end_matches(|c| c == '\n' || c == '\r');
        if let Some(rest) = line.strip_prefix("diff --git ") {
            if let Some((old, new)) = parse_git_file_names(rest) {
                block.git_names = OldNew::new(Some(old), Some(new));
            }
        } else if line.starts_with("diff ") {
            // Classic diff command line; contributes no fields.
        } else if let Some(rest) = line.strip_prefix("--- ") {
            let (name, timestamp) = parse_file_line_value(rest, git_names_expected);
            if dialect == Dialect::Context {
                new_value = Some(name);
                block.timestamps.new = timestamp;
            } else {
                old_value = Some(name);
                block.timestamps.old = timestamp;
            }
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            let (name, timestamp) = parse_file_line_value(rest, git_names_expected);
            new_value = Some(name);
            block.timestamps.new = timestamp;
        } else if let Some(rest) = line.strip_prefix("*** ") {
            // The old-file line of a context diff; meaningless elsewhere.
            if dialect == Dialect::Context {
                let (name, timestamp) = parse_file_line_value(rest, false);
                old_value = Some(name);
                block.timestamps.old = timestamp;
            }
        } else if let Some(rest) = line.strip_prefix("index ") {
            index_mode = parse_index_line(rest, &mut block);
        } else if let Some(rest) = line.strip_prefix("old mode ") {
            block.modes.old = parse_octal_mode(rest);
        } else if let Some(rest) = line.strip_prefix("new file mode ") {
            saw_new_file_mode = true;
            block.modes.new = parse_octal_mode(rest);
        } else if let Some(rest) = line.strip_prefix("new mode ") {
            block.modes.new = parse_octal_mode(rest);
        } else if let Some(rest) = line.strip_prefix("deleted file mode ") {
            saw_deleted_file_mode = true;
            block.modes.old = parse_octal_mode(rest);
        } else if let Some(rest) = line.strip_prefix("similarity index ") {
            block.similarity_index = parse_percentage(rest);
        } else if let Some(rest) = line.strip_prefix("dissimilarity index ") {
            block.dissimilarity_index = parse_percentage(rest);
        } else if let Some(rest) = line.strip_prefix("rename from ") {
            block.rename.old = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("rename to ") {
            block.rename.new = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("copy from ") {
            block.copy.old = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("copy to ") {
            block.copy.new = Some(rest.to_string());
        } else if line.starts_with("Binary files ") || line.starts_with("GIT binary patch") {
            block.is_binary = true;
        }
    }

    // Git prints a mode on the index line only when it is unchanged, so an
    // explicit mode line always wins.
    if block.modes.old.is_none() && block.modes.new.is_none() {
        block.modes = OldNew::new(index_mode, index_mode);
    }

    let has_rename = block.rename.old.is_some() && block.rename.new.is_some();
    let has_copy = block.copy.old.is_some() && block.copy.new.is_some();
    if dialect == Dialect::GitExtended {
        block.git_kind = if has_rename && block.similarity_index == Some(100) {
            GitKind::PureRename
        } else if has_rename {
            GitKind::Rename
        } else if has_copy {
            GitKind::Copy
        } else if saw_new_file_mode {
            GitKind::NewFile
        } else if saw_deleted_file_mode {
            GitKind::DeletedFile
        } else if block.modes.old.is_some()
            && block.modes.new.is_some()
            && block.modes.old != block.modes.new
        {
            GitKind::ModeChange
        } else if block.is_binary {
            GitKind::Binary
        } else {
            GitKind::Normal
        };
    }

    block.names.old = select_side_name(
        old_value.as_deref(),
        block.rename.old.as_deref().or_else(|| block.copy.old.as_deref()),
        block.git_names.old.as_deref(),
    );
    block.names.new = select_side_name(
        new_value.as_deref(),
        block.rename.new.as_deref().or_else(|| block.copy.new.as_deref()),
        block.git_names.new.as_deref(),
    );
    match block.git_kind {
        GitKind::NewFile => block.names.old = Some("/dev/null".to_string()),
        GitKind::DeletedFile => block.names.new = Some("/dev/null".to_string()),
        _ => {}
    }

    block.raw_header_lines = lines;
    block
}

/// Given the text after a `--- `/`+++ `/`*** ` marker, split off the name
/// (which runs up to the first tab) and the trailing timestamp.
fn parse_file_line_value(rest: &str, git_diff_name: bool) -> (String, Option<String>) {
    let mut parts = rest.splitn(2, '\t');
    let name_part = parts.next().unwrap_or("");
    let timestamp = parts.next().map(|t| t.to_string());
    let path = remove_surrounding_quotes(name_part);
    let name = match path {
        "/dev/null" => "/dev/null",
        p if git_diff_name && DIFF_PREFIXES.iter().any(|s| p.starts_with(s)) => &p[2..],
        p => p,
    };
    (name.to_string(), timestamp)
}

/// Given input like "a/src/my file.rs b/src/my file.rs", return both names
/// with their ornaments kept. Equal-name lines are split at the midpoint
/// (the only reliable split when names contain spaces); renames fall back
/// to the rightmost ` b/`.
fn parse_git_file_names(rest: &str) -> Option<(String, String)> {
    let graphemes: Vec<&str> = rest.graphemes(true).collect();
    let midpoint = graphemes.len() / 2;
    if midpoint > 0 && graphemes.get(midpoint) == Some(&" ") {
        let first = remove_surrounding_quotes(&graphemes[..midpoint].join("")).to_string();
        let second = remove_surrounding_quotes(&graphemes[midpoint + 1..].join("")).to_string();
        if strip_git_prefix(&first) == strip_git_prefix(&second) {
            return Some((first, second));
        }
    }
    if let Some(i) = rest.rfind(" b/") {
        let first = remove_surrounding_quotes(&rest[..i]).to_string();
        let second = remove_surrounding_quotes(&rest[i + 1..]).to_string();
        if !first.is_empty() {
            return Some((first, second));
        }
    }
    let mut parts = rest.splitn(2, ' ');
    match (parts.next(), parts.next()) {
        (Some(first), Some(second)) if !first.is_empty() && !second.is_empty() => Some((
            remove_surrounding_quotes(first).to_string(),
            remove_surrounding_quotes(second).to_string(),
        )),
        _ => None,
    }
}

// When git config 'core.quotepath = true' (the default), and the path
// contains non-ASCII characters, a backslash, or a quote; then it is
// quoted. Characters escaped inside are left as-is.
fn remove_surrounding_quotes(path: &str) -> &str {
    if path.len() >= 2 && path.starts_with('"') && path.ends_with('"') {
        &path[1..path.len() - 1]
    } else {
        path
    }
}

fn strip_git_prefix(path: &str) -> &str {
    if path != "/dev/null" && DIFF_PREFIXES.iter().any(|s| path.starts_with(s)) {
        &path[2..]
    } else {
        path
    }
}

/// `index <hex>..<hex>[ <octal-mode>]`. Returns the trailing mode.
fn parse_index_line(rest: &str, block: &mut HeaderBlock) -> Option<u32> {
    let mut parts = rest.split_whitespace();
    if let Some(hashes) = parts.next() {
        if let Some(i) = hashes.find("..") {
            let (old, new) = (&hashes[..i], &hashes[i + 2..]);
            if !old.is_empty() {
                block.hashes.old = Some(old.to_string());
            }
            if !new.is_empty() {
                block.hashes.new = Some(new.to_string());
            }
        }
    }
    parts.next().and_then(parse_octal_mode)
}

fn parse_octal_mode(text: &str) -> Option<u32> {
    u32::from_str_radix(text.trim(), 8).ok()
}

/// `NN%` with NN in [0, 100]; anything else is recorded as absent, never
/// clamped or treated as fatal.
fn parse_percentage(text: &str) -> Option<u8> {
    let value: u64 = text.trim().strip_suffix('%')?.parse().ok()?;
    if value <= 100 {
        Some(value as u8)
    } else {
        None
    }
}

/// Pick the display name for one side from the marker-line value, the
/// rename/copy target, and the `diff --git` name, by (fewest path
/// components, shortest basename, shortest total length), first seen
/// winning ties. The `/dev/null` sentinel short-circuits.
fn select_side_name(
    marker: Option<&str>,
    rename_or_copy: Option<&str>,
    git_name: Option<&str>,
) -> Option<String> {
    if let Some("/dev/null") = marker {
        return Some("/dev/null".to_string());
    }
    let stripped_git = git_name.map(strip_git_prefix);
    let mut candidates: Vec<&str> = Vec::new();
    if let Some(name) = marker {
        candidates.push(name);
    }
    if let Some(name) = rename_or_copy {
        candidates.push(name);
    }
    if let Some(name) = stripped_git {
        candidates.push(name);
    }
    best_name(&candidates)
}

fn best_name(candidates: &[&str]) -> Option<String> {
    let mut best: Option<&str> = None;
    for candidate in candidates.iter().copied() {
        if candidate == "/dev/null" || candidate.is_empty() {
            continue;
        }
        best = match best {
            None => Some(candidate),
            Some(current) if name_rank(candidate) < name_rank(current) => Some(candidate),
            keep => keep,
        };
    }
    best.map(ToString::to_string)
}

fn name_rank(name: &str) -> (usize, usize, usize) {
    let components = name.split('/').filter(|c| !c.is_empty()).count();
    let basename = name.rsplit('/').next().unwrap_or("").len();
    (components, basename, name.len())
}
