use std::io;

use thiserror::Error;

/// An error returned by [`Scanner::next`](crate::Scanner::next).
///
/// Malformed patch content is never an error: unparseable regions degrade to
/// [`Event::Prose`](crate::Event::Prose) and scanning continues. Only
/// resource failures surface here. Normal end of input is `Ok(None)` from
/// `next`, not an error.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The underlying stream failed to read.
    #[error("error reading from the input stream")]
    Io(#[from] io::Error),
    /// A candidate header block grew past
    /// [`ScannerConfig::max_header_lines`](crate::ScannerConfig::max_header_lines).
    #[error("patch header block exceeded the configured line cap")]
    HeaderOverflow,
    /// A previous call already failed; the scanner is terminal.
    #[error("scanner is in a failed state from an earlier error")]
    Failed,
}
