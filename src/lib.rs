//! `patchscan` is a streaming, format-tolerant scanner for textual patch
//! streams: unified diffs, context diffs, and git's extended header format,
//! embedded in otherwise arbitrary text such as commit messages and mail.
//!
//! The scanner reads its input line by line and emits a typed [`Event`] per
//! recognized region — prose, header block, hunk header, hunk body line,
//! `\ No newline` marker, binary marker — each carrying the 1-based line
//! number and byte offset it came from. Malformed patch regions are never
//! fatal: their lines degrade to [`Event::Prose`] and scanning continues,
//! so concatenated patches with interleaved commentary stream through
//! cleanly.
//!
//! ```
//! use patchscan::{Event, Scanner};
//!
//! let input: &[u8] = b"--- a.txt\n+++ b.txt\n@@ -1 +1 @@\n-x\n+y\n";
//! let mut scanner = Scanner::new(input);
//! while let Some(event) = scanner.next()? {
//!     if let Event::Headers(block) = event {
//!         assert_eq!(block.names.new.as_deref(), Some("b.txt"));
//!     }
//! }
//! # Ok::<(), patchscan::ScanError>(())
//! ```
//!
//! Events borrow scanner-internal buffers and are valid only until the next
//! call; consumers that need to keep data copy it out. Encoding is
//! pass-through bytes end to end.
//!
//! A header block's display names are chosen per side from the candidates
//! available — the `---`/`+++`/`***` marker-line value, the rename/copy
//! target, and the ornament-stripped `diff --git` name — preferring fewest
//! path components, then shortest basename, then shortest total length,
//! with first-seen winning ties and `/dev/null` passed through as itself.

mod config;
mod error;
mod events;
mod handlers;
mod oldnew;
mod reader;
mod scanner;
#[cfg(test)]
mod tests;

pub use config::ScannerConfig;
pub use error::ScanError;
pub use events::{
    Dialect, Event, GitKind, HeaderBlock, HunkHeader, HunkLine, HunkLineKind, HunkRange, RawLine,
    Side,
};
pub use oldnew::{OldNew, PatchSideIndex};
pub use scanner::Scanner;
