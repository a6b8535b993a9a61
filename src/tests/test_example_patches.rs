#![cfg(test)]

use insta::assert_snapshot;
use pretty_assertions::assert_eq;

use crate::events::{Dialect, GitKind, HunkLineKind, Side};
use crate::tests::integration_test_utils::{render, scan, OwnedEvent};

const UNIFIED_SIMPLE_EDIT: &str = "\
--- old.txt\t2024-01-01
+++ new.txt\t2024-01-01
@@ -1,3 +1,3 @@
 line1
-old line
+new line
 line3
";

#[test]
fn test_unified_simple_edit() {
    assert_snapshot!(render(UNIFIED_SIMPLE_EDIT), @r###"
    1:0 headers dialect=Unified kind=Normal old=old.txt new=new.txt
    3:46 hunk-header -1,3 +1,3
    4:62 hunk-line Context/Both "line1\n"
    5:69 hunk-line Removed/Both "old line\n"
    6:79 hunk-line Added/Both "new line\n"
    7:89 hunk-line Context/Both "line3\n"
    "###);
}

#[test]
fn test_unified_timestamps_are_recorded() {
    let events = scan(UNIFIED_SIMPLE_EDIT);
    match &events[0] {
        OwnedEvent::Headers(block) => {
            assert_eq!(block.timestamps.old.as_deref(), Some("2024-01-01"));
            assert_eq!(block.timestamps.new.as_deref(), Some("2024-01-01"));
        }
        other => panic!("expected headers, got {:?}", other),
    }
}

#[test]
fn test_prose_before_and_after_a_patch() {
    let input = "\
Some header comment
--- old.txt
+++ new.txt
@@ -1,1 +1,1 @@
-old
+new
Some footer comment
";
    assert_snapshot!(render(input), @r###"
    1:0 prose "Some header comment\n"
    2:20 headers dialect=Unified kind=Normal old=old.txt new=new.txt
    4:44 hunk-header -1,1 +1,1
    5:60 hunk-line Removed/Both "old\n"
    6:65 hunk-line Added/Both "new\n"
    7:70 prose "Some footer comment\n"
    "###);
}

// Regression shape: the index line arrives after the rename pair and must
// land in the same single headers event.
#[test]
fn test_git_rename_with_index_after_rename_pair() {
    let input = "\
diff --git a/old.c b/new.c
similarity index 92%
rename from old.c
rename to new.c
index 1234567..abcdefg 100644
--- a/old.c
+++ b/new.c
@@ -1,1 +1,1 @@
-a
+b
";
    let events = scan(input);
    let headers: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            OwnedEvent::Headers(block) => Some(block),
            _ => None,
        })
        .collect();
    assert_eq!(headers.len(), 1);
    let block = headers[0];
    assert_eq!(block.dialect, Dialect::GitExtended);
    assert_eq!(block.git_kind, GitKind::Rename);
    assert_eq!(block.similarity_index, Some(92));
    assert_eq!(block.hashes.old.as_deref(), Some("1234567"));
    assert_eq!(block.hashes.new.as_deref(), Some("abcdefg"));
    assert_eq!(block.names.old.as_deref(), Some("old.c"));
    assert_eq!(block.names.new.as_deref(), Some("new.c"));
    assert_eq!(block.raw_header_lines.len(), 7);
}

// Two mode-change blocks, the second with no hunks and ended by EOF. Each
// `diff --git` block produces exactly one headers event.
#[test]
fn test_git_mode_change_blocks() {
    let input = "\
diff --git a/x b/x
old mode 100755
new mode 100644
index aa..bb
--- a/x
+++ b/x
@@ -1 +1 @@
-a
+b
diff --git a/y b/y
old mode 100755
new mode 100644
";
    assert_snapshot!(render(input), @r###"
    1:0 headers dialect=GitExtended kind=ModeChange old=x new=x
    7:80 hunk-header -1,1 +1,1
    8:92 hunk-line Removed/Both "a\n"
    9:95 hunk-line Added/Both "b\n"
    10:98 headers dialect=GitExtended kind=ModeChange old=y new=y
    "###);
}

#[test]
fn test_context_diff_empty_to_one_line() {
    let input = "\
*** file1
--- file1
***************
*** 0 ****
--- 1 ----
+ a
";
    assert_snapshot!(render(input), @r###"
    1:0 headers dialect=Context kind=Normal old=file1 new=file1
    4:36 hunk-header -0,0 +1,1
    6:58 hunk-line Added/NewOnly " a\n"
    "###);
}

#[test]
fn test_context_diff_changed_lines_on_both_sides() {
    let input = "\
*** f
--- f
***************
*** 1,1 ****
! a
--- 1,1 ----
! b
";
    assert_snapshot!(render(input), @r###"
    1:0 headers dialect=Context kind=Normal old=f new=f
    4:28 hunk-header -1,1 +1,1
    5:41 hunk-line Changed/OldOnly " a\n"
    7:58 hunk-line Changed/NewOnly " b\n"
    "###);
}

#[test]
fn test_context_diff_old_side_is_replayed_in_order() {
    let input = "\
*** f
--- f
***************
*** 1,3 ****
  keep
- drop
! was
--- 1,3 ----
  keep
+ add
! now
";
    let events = scan(input);
    let body: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            OwnedEvent::HunkLine {
                kind,
                side,
                content,
                ..
            } => Some((*kind, *side, String::from_utf8_lossy(content).into_owned())),
            _ => None,
        })
        .collect();
    assert_eq!(
        body,
        vec![
            (HunkLineKind::Context, Side::OldOnly, " keep\n".to_string()),
            (HunkLineKind::Removed, Side::OldOnly, " drop\n".to_string()),
            (HunkLineKind::Changed, Side::OldOnly, " was\n".to_string()),
            (HunkLineKind::Context, Side::NewOnly, " keep\n".to_string()),
            (HunkLineKind::Added, Side::NewOnly, " add\n".to_string()),
            (HunkLineKind::Changed, Side::NewOnly, " now\n".to_string()),
        ]
    );
}

#[test]
fn test_binary_file_marker_closes_the_header_block() {
    let input = "\
diff --git a/BIN b/BIN
new file mode 100644
index 0000000..a5d0c46
Binary files /dev/null and b/BIN differ
diff --git a/TXT b/TXT
new file mode 100644
index 0000000..323fae0
--- /dev/null
+++ b/TXT
@@ -0,0 +1 @@
+plain text";
    assert_snapshot!(render(input), @r###"
    1:0 headers dialect=GitExtended kind=NewFile old=/dev/null new=BIN binary
    4:67 binary git=false "Binary files /dev/null and b/BIN differ\n"
    5:107 headers dialect=GitExtended kind=NewFile old=/dev/null new=TXT
    10:198 hunk-header -0,0 +1,1
    11:212 hunk-line Added/Both "plain text"
    "###);
}

// The scanner does not decode a git binary payload; it stays in the patch
// and passes the payload through as prose until the next start marker.
#[test]
fn test_git_binary_patch_payload_is_consumed_as_prose() {
    let input = "\
diff --git a/BIN b/BIN
index aa..bb 100644
GIT binary patch
literal 10
Hc$@<O00001

diff --git a/x b/x
index cc..dd
--- a/x
+++ b/x
@@ -1 +1 @@
-a
+b
";
    assert_snapshot!(render(input), @r###"
    1:0 headers dialect=GitExtended kind=Binary old=BIN new=BIN binary
    3:43 binary git=true "GIT binary patch\n"
    4:60 prose "literal 10\n"
    5:71 prose "Hc$@<O00001\n"
    6:83 prose "\n"
    7:84 headers dialect=GitExtended kind=Normal old=x new=x
    11:132 hunk-header -1,1 +1,1
    12:144 hunk-line Removed/Both "a\n"
    13:147 hunk-line Added/Both "b\n"
    "###);
}

// `--- World?` inside a hunk whose counts are not yet spent is a removed
// line; the same bytes after the hunk would open a new header block.
#[test]
fn test_three_dashes_inside_hunk_is_a_removed_line() {
    let input = "\
--- a.lua
+++ b.lua
@@ -1,5 +1,4 @@
 #!/usr/bin/env lua

 print(\"Hello\")
--- World?
 print(\"..\")
";
    let events = scan(input);
    let removed: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            OwnedEvent::HunkLine {
                kind: HunkLineKind::Removed,
                content,
                ..
            } => Some(String::from_utf8_lossy(content).into_owned()),
            _ => None,
        })
        .collect();
    assert_eq!(removed, vec!["-- World?\n".to_string()]);
    assert!(!events
        .iter()
        .any(|event| matches!(event, OwnedEvent::Prose { .. })));
}

#[test]
fn test_concatenated_unified_patches() {
    let input = "\
--- a.lua
+++ b.lua
@@ -1,1 +1,1 @@
-x
+y
--- c.lua
+++ d.lua
@@ -1,1 +1,1 @@
-u
+v
";
    let headers: Vec<_> = scan(input)
        .into_iter()
        .filter_map(|event| match event {
            OwnedEvent::Headers(block) => {
                Some((block.names.old.unwrap_or_default(), block.start_line))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        headers,
        vec![("a.lua".to_string(), 1), ("c.lua".to_string(), 6)]
    );
}

#[test]
fn test_no_newline_at_end_of_file_marker() {
    let input = "\
--- a
+++ b
@@ -1 +1 @@
-x
+y
\\ No newline at end of file
";
    let events = scan(input);
    match events.last() {
        Some(OwnedEvent::NoNewlineAtEof {
            line, line_number, ..
        }) => {
            assert_eq!(line.as_slice(), b"\\ No newline at end of file\n");
            assert_eq!(*line_number, 6);
        }
        other => panic!("expected no-newline marker, got {:?}", other),
    }
}

#[test]
fn test_hunk_context_hint() {
    let input = "\
--- a.rs
+++ b.rs
@@ -74,15 +75,14 @@ pub fn scan(
 x
";
    let events = scan(input);
    match &events[1] {
        OwnedEvent::HunkHeader(header) => {
            assert_eq!(header.context.as_deref(), Some("pub fn scan("));
        }
        other => panic!("expected hunk header, got {:?}", other),
    }
}

#[test]
fn test_incomplete_header_block_degrades_to_prose() {
    let input = "\
--- looks like a header
but is not one
";
    assert_snapshot!(render(input), @r###"
    1:0 prose "--- looks like a header\n"
    2:24 prose "but is not one\n"
    "###);
}

#[test]
fn test_malformed_hunk_header_is_prose_inside_patch() {
    let input = "\
diff --git a/x b/x
--- a/x
+++ b/x
@@ not a hunk header @@
@@ -1 +1 @@
-a
+b
";
    let events = scan(input);
    assert!(matches!(&events[0], OwnedEvent::Headers(_)));
    match &events[1] {
        OwnedEvent::Prose { line, .. } => {
            assert_eq!(line.as_slice(), b"@@ not a hunk header @@\n")
        }
        other => panic!("expected prose, got {:?}", other),
    }
    assert!(matches!(&events[2], OwnedEvent::HunkHeader(_)));
}

#[test]
fn test_context_hunk_with_function_hint_on_separator() {
    let input = "\
*** a.c
--- b.c
*************** int main (void)
*** 1,2 ****
  x
! y
--- 1,2 ----
  x
! z
";
    let events = scan(input);
    match &events[1] {
        OwnedEvent::HunkHeader(header) => {
            assert_eq!(header.context.as_deref(), Some("int main (void)"));
        }
        other => panic!("expected hunk header, got {:?}", other),
    }
}

#[test]
fn test_pure_rename_without_file_lines() {
    let input = "\
diff --git a/old name.c b/new name.c
similarity index 100%
rename from old name.c
rename to new name.c
";
    let events = scan(input);
    assert_eq!(events.len(), 1);
    match &events[0] {
        OwnedEvent::Headers(block) => {
            assert_eq!(block.git_kind, GitKind::PureRename);
            assert_eq!(block.names.old.as_deref(), Some("old name.c"));
            assert_eq!(block.names.new.as_deref(), Some("new name.c"));
            assert_eq!(block.git_names.old.as_deref(), Some("a/old name.c"));
            assert_eq!(block.git_names.new.as_deref(), Some("b/new name.c"));
        }
        other => panic!("expected headers, got {:?}", other),
    }
}

#[test]
fn test_deleted_file() {
    let input = "\
diff --git a/gone.c b/gone.c
deleted file mode 100644
index abc1234..0000000
--- a/gone.c
+++ /dev/null
@@ -1,2 +0,0 @@
-int x;
-int y;
";
    let events = scan(input);
    match &events[0] {
        OwnedEvent::Headers(block) => {
            assert_eq!(block.git_kind, GitKind::DeletedFile);
            assert_eq!(block.names.old.as_deref(), Some("gone.c"));
            assert_eq!(block.names.new.as_deref(), Some("/dev/null"));
            assert_eq!(block.modes.old, Some(0o100644));
        }
        other => panic!("expected headers, got {:?}", other),
    }
    let removed = scan(input)
        .iter()
        .filter(|event| {
            matches!(
                event,
                OwnedEvent::HunkLine {
                    kind: HunkLineKind::Removed,
                    ..
                }
            )
        })
        .count();
    assert_eq!(removed, 2);
}

#[test]
fn test_classic_diff_command_line_joins_the_block() {
    let input = "\
diff -u a/x.txt b/x.txt
--- a/x.txt
+++ b/x.txt
@@ -1 +1 @@
-a
+b
";
    let events = scan(input);
    match &events[0] {
        OwnedEvent::Headers(block) => {
            assert_eq!(block.dialect, Dialect::Unified);
            assert_eq!(block.start_line, 1);
            assert_eq!(block.raw_header_lines.len(), 3);
        }
        other => panic!("expected headers, got {:?}", other),
    }
}
