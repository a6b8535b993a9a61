/// This module contains functions handling input lines encountered during
/// the main `Scanner::next()` loop, one file per line family.
pub mod binary;
pub mod diff_header;
pub mod hunk;
pub mod hunk_header;
