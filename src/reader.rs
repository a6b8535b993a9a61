use std::io::BufRead;

/// Reads one logical line at a time into a reusable growable buffer,
/// tracking the 1-based line number and the byte offset at which each line
/// began. Content is not interpreted or trimmed; the trailing newline is
/// preserved where present (it may be absent on the last line).
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
    line_number: u64,
    position: u64,
    next_position: u64,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            line_number: 0,
            position: 0,
            next_position: 0,
        }
    }

    /// Read the next line. Returns `Ok(false)` at end of stream, in which
    /// case the previous line's content and provenance remain accessible.
    pub fn read_next(&mut self) -> std::io::Result<bool> {
        self.buf.clear();
        let n = self.inner.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(false);
        }
        self.position = self.next_position;
        self.next_position += n as u64;
        self.line_number += 1;
        Ok(true)
    }

    /// The current line, trailing newline included where present.
    pub fn line(&self) -> &[u8] {
        &self.buf
    }

    /// 1-based number of the most recently read line; 0 before any read.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// Byte offset at which the most recently read line began.
    pub fn position(&self) -> u64 {
        self.position
    }
}
