use std::io::BufRead;

use crate::scanner::{Scanner, StashedEvent, State};

impl<R: BufRead> Scanner<R> {
    /// Check for `Binary files … differ` and `GIT binary patch` markers.
    /// The git form opens an undecoded payload; the scanner stays in the
    /// patch and passes the payload lines through as prose until the next
    /// start marker.
    pub(crate) fn handle_binary_marker_line(&mut self) -> bool {
        if self.state != State::InPatch {
            return false;
        }
        let git = {
            let line = self.reader.line();
            if line.starts_with(b"GIT binary patch") {
                Some(true)
            } else if line.starts_with(b"Binary files ") {
                Some(false)
            } else {
                None
            }
        };
        match git {
            Some(git) => {
                self.stash(StashedEvent::BinaryLine { git });
                if git {
                    self.consuming_binary = true;
                }
                true
            }
            None => false,
        }
    }
}
