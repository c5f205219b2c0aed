//! Unified-diff records and the patch engine that replays them.
//!
//! A [`FileDiff`] holds the hunks of one file, with each hunk line carrying
//! its unified-diff origin prefix (`' '`, `'+'`, `'-'`, or `'\'` for the
//! "No newline at end of file" marker). Diffs are stored against normalized
//! text, so callers pass bases through [`crate::normalize::normalize_text`]
//! before applying.

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, DiffTag, TextDiff};

use crate::error::PatchError;

const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";
const DEV_NULL: &str = "/dev/null";

/// Diff record for a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDiff {
    pub old_file_name: String,
    pub new_file_name: String,
    #[serde(default)]
    pub hunks: Vec<DiffHunk>,
}

/// One `@@ -old_start,old_lines +new_start,new_lines @@` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffHunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op<'a> {
    Context(&'a str),
    Remove(&'a str),
    Add(&'a str),
}

impl<'a> Op<'a> {
    fn old_side(self) -> Option<&'a str> {
        match self {
            Op::Context(s) | Op::Remove(s) => Some(s),
            Op::Add(_) => None,
        }
    }
}

/// Parsed hunk body plus whether the new side ends without a newline.
struct HunkOps<'a> {
    ops: Vec<Op<'a>>,
    new_missing_newline: bool,
}

impl DiffHunk {
    /// Zero-based index in the old file where this hunk begins.
    fn anchor(&self) -> usize {
        if self.old_lines == 0 {
            self.old_start as usize
        } else {
            self.old_start.saturating_sub(1) as usize
        }
    }

    fn ops(&self, hunk: usize) -> Result<HunkOps<'_>, PatchError> {
        let mut ops = Vec::with_capacity(self.lines.len());
        let mut new_missing_newline = false;
        for (i, line) in self.lines.iter().enumerate() {
            let (origin, rest) = match line.chars().next() {
                Some(c) => (c, &line[c.len_utf8()..]),
                None => (' ', ""),
            };
            match origin {
                ' ' => ops.push(Op::Context(rest)),
                '-' => ops.push(Op::Remove(rest)),
                '+' => ops.push(Op::Add(rest)),
                '\\' => {
                    if matches!(ops.last(), Some(Op::Add(_)) | Some(Op::Context(_))) {
                        new_missing_newline = true;
                    }
                }
                other => {
                    return Err(PatchError::Malformed {
                        line: i + 1,
                        reason: format!("hunk {hunk} has unknown line origin {other:?}"),
                    })
                }
            }
        }
        Ok(HunkOps { ops, new_missing_newline })
    }
}

/// Splits text into lines without terminators, reporting a trailing newline.
fn split_lines(text: &str) -> (Vec<&str>, bool) {
    if text.is_empty() {
        return (Vec::new(), false);
    }
    let trailing = text.ends_with('\n');
    let body = if trailing { &text[..text.len() - 1] } else { text };
    (body.split('\n').collect(), trailing)
}

fn matches_at(old: &[&str], expected: &[&str], pos: usize) -> bool {
    pos + expected.len() <= old.len() && old[pos..pos + expected.len()] == *expected
}

/// Finds where `expected` occurs, nearest to `wanted` first, never before `floor`.
fn locate(old: &[&str], expected: &[&str], floor: usize, wanted: usize) -> Option<usize> {
    let last = old.len().checked_sub(expected.len())?;
    if floor > last {
        return None;
    }
    let wanted = wanted.clamp(floor, last);
    if expected.is_empty() {
        return Some(wanted);
    }
    let span = (wanted - floor).max(last - wanted);
    for distance in 0..=span {
        if let Some(pos) = wanted.checked_add(distance).filter(|p| *p <= last) {
            if matches_at(old, expected, pos) {
                return Some(pos);
            }
        }
        if distance > 0 {
            if let Some(pos) = wanted.checked_sub(distance).filter(|p| *p >= floor) {
                if matches_at(old, expected, pos) {
                    return Some(pos);
                }
            }
        }
    }
    None
}

fn mismatch(hunk: usize, old: &[&str], expected: &[&str], at: usize) -> PatchError {
    let k = (0..expected.len())
        .find(|k| old.get(at + k) != expected.get(*k))
        .unwrap_or(0);
    PatchError::HunkMismatch {
        hunk,
        line: at + k + 1,
        expected: expected.get(k).map(|s| (*s).to_owned()).unwrap_or_default(),
        found: old.get(at + k).map(|s| (*s).to_owned()),
    }
}

impl FileDiff {
    /// Replays this diff on `base`.
    ///
    /// Each hunk is tried at its recorded position shifted by the offset the
    /// previous hunks landed at, then searched outward. Context and removed
    /// lines must match exactly.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError`] when a hunk cannot be placed on `base`.
    pub fn apply(&self, base: &str) -> Result<String, PatchError> {
        let (old, old_newline) = split_lines(base);
        let mut out: Vec<&str> = Vec::with_capacity(old.len());
        let mut cursor = 0usize;
        let mut offset: isize = 0;
        let mut newline = old_newline;

        for (i, hunk) in self.hunks.iter().enumerate() {
            let HunkOps { ops, new_missing_newline } = hunk.ops(i)?;
            let expected: Vec<&str> = ops.iter().filter_map(|op| op.old_side()).collect();
            let anchor = hunk.anchor();
            let wanted = (anchor as isize + offset).max(cursor as isize) as usize;

            if wanted > old.len() && expected.is_empty() {
                return Err(PatchError::HunkOutOfRange { hunk: i, len: old.len() });
            }
            let pos = locate(&old, &expected, cursor, wanted)
                .ok_or_else(|| mismatch(i, &old, &expected, wanted.min(old.len())))?;
            offset = pos as isize - anchor as isize;

            out.extend_from_slice(&old[cursor..pos]);
            for op in &ops {
                match *op {
                    Op::Context(s) | Op::Add(s) => out.push(s),
                    Op::Remove(_) => {}
                }
            }
            cursor = pos + expected.len();
            if cursor == old.len() {
                newline = !new_missing_newline;
            }
        }
        out.extend_from_slice(&old[cursor..]);

        if out.is_empty() {
            return Ok(String::new());
        }
        let mut text = out.join("\n");
        if newline {
            text.push('\n');
        }
        Ok(text)
    }

    /// Builds a diff record turning `old` into `new`, with three lines of context.
    pub fn between(old_name: &str, new_name: &str, old: &str, new: &str) -> FileDiff {
        let diff = TextDiff::from_lines(old, new);
        let mut hunks = Vec::new();
        for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
            let ops = hunk.ops();
            let (Some(first), Some(last)) = (ops.first(), ops.last()) else {
                continue;
            };
            if ops.iter().all(|op| op.tag() == DiffTag::Equal) {
                continue;
            }
            let old_range = first.old_range().start..last.old_range().end;
            let new_range = first.new_range().start..last.new_range().end;
            let mut lines = Vec::new();
            for change in hunk.iter_changes() {
                let origin = match change.tag() {
                    ChangeTag::Equal => ' ',
                    ChangeTag::Delete => '-',
                    ChangeTag::Insert => '+',
                };
                let value = change.to_string_lossy();
                lines.push(format!("{origin}{}", value.trim_end_matches('\n')));
                if change.missing_newline() {
                    lines.push(NO_NEWLINE_MARKER.to_owned());
                }
            }
            hunks.push(DiffHunk {
                old_start: unified_start(old_range.start, old_range.len()),
                old_lines: old_range.len() as u32,
                new_start: unified_start(new_range.start, new_range.len()),
                new_lines: new_range.len() as u32,
                lines,
            });
        }
        FileDiff {
            old_file_name: old_name.to_owned(),
            new_file_name: new_name.to_owned(),
            hunks,
        }
    }
}

fn unified_start(start: usize, len: usize) -> u32 {
    if len == 0 {
        start as u32
    } else {
        start as u32 + 1
    }
}

/// Applies `diff` to `base`, or returns `base` unchanged when there is no diff.
///
/// # Errors
///
/// Propagates [`PatchError`] from [`FileDiff::apply`].
pub fn apply_or_passthrough(base: &str, diff: Option<&FileDiff>) -> Result<String, PatchError> {
    match diff {
        Some(diff) => diff.apply(base),
        None => Ok(base.to_owned()),
    }
}

fn strip_name(raw: &str) -> &str {
    let name = raw.split('\t').next().unwrap_or(raw).trim_end();
    name.strip_prefix("a/")
        .or_else(|| name.strip_prefix("b/"))
        .unwrap_or(name)
}

fn parse_range(text: &str, line: usize) -> Result<(u32, u32), PatchError> {
    let malformed = || PatchError::Malformed { line, reason: format!("bad hunk range {text:?}") };
    let (start, count) = match text.split_once(',') {
        Some((s, c)) => (s, Some(c)),
        None => (text, None),
    };
    let start = start.parse::<u32>().map_err(|_| malformed())?;
    let count = match count {
        Some(c) => c.parse::<u32>().map_err(|_| malformed())?,
        None => 1,
    };
    Ok((start, count))
}

fn parse_hunk_header(header: &str, line: usize) -> Result<DiffHunk, PatchError> {
    let malformed = || PatchError::Malformed { line, reason: format!("bad hunk header {header:?}") };
    let inner = header
        .strip_prefix("@@ ")
        .and_then(|rest| rest.split(" @@").next())
        .ok_or_else(malformed)?;
    let mut parts = inner.split_whitespace();
    let old = parts.next().and_then(|p| p.strip_prefix('-')).ok_or_else(malformed)?;
    let new = parts.next().and_then(|p| p.strip_prefix('+')).ok_or_else(malformed)?;
    let (old_start, old_lines) = parse_range(old, line)?;
    let (new_start, new_lines) = parse_range(new, line)?;
    Ok(DiffHunk { old_start, old_lines, new_start, new_lines, lines: Vec::new() })
}

/// Parses unified diff text (as produced by `git diff`) into per-file records.
///
/// `a/` and `b/` prefixes are stripped. A `/dev/null` side takes the name of
/// the other side so added and deleted files match by either name.
///
/// # Errors
///
/// Returns [`PatchError::Malformed`] on a bad hunk header or a hunk line
/// appearing before any `---`/`+++` pair.
pub fn parse_unified(text: &str) -> Result<Vec<FileDiff>, PatchError> {
    let lines: Vec<&str> = text.lines().collect();
    let mut files: Vec<FileDiff> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if let (Some(old), Some(new)) = (
            line.strip_prefix("--- "),
            lines.get(i + 1).and_then(|next| next.strip_prefix("+++ ")),
        ) {
            let old = strip_name(old);
            let new = strip_name(new);
            let (old, new) = match (old == DEV_NULL, new == DEV_NULL) {
                (true, false) => (new, new),
                (false, true) => (old, old),
                _ => (old, new),
            };
            files.push(FileDiff {
                old_file_name: old.to_owned(),
                new_file_name: new.to_owned(),
                hunks: Vec::new(),
            });
            i += 2;
            continue;
        }

        if line.starts_with("@@ ") {
            let mut hunk = parse_hunk_header(line, i + 1)?;
            let file = files.last_mut().ok_or_else(|| PatchError::Malformed {
                line: i + 1,
                reason: "hunk before file header".to_owned(),
            })?;
            let mut old_left = hunk.old_lines;
            let mut new_left = hunk.new_lines;
            i += 1;
            while i < lines.len() {
                let body = lines[i];
                if body.starts_with('\\') {
                    hunk.lines.push(body.to_owned());
                    i += 1;
                    continue;
                }
                if old_left == 0 && new_left == 0 {
                    break;
                }
                match body.chars().next() {
                    Some('+') => new_left = new_left.saturating_sub(1),
                    Some('-') => old_left = old_left.saturating_sub(1),
                    Some(' ') | None => {
                        old_left = old_left.saturating_sub(1);
                        new_left = new_left.saturating_sub(1);
                    }
                    Some(_) => break,
                }
                hunk.lines.push(if body.is_empty() { " ".to_owned() } else { body.to_owned() });
                i += 1;
            }
            file.hunks.push(hunk);
            continue;
        }

        i += 1;
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hunk(old_start: u32, old_lines: u32, new_start: u32, new_lines: u32, lines: &[&str]) -> DiffHunk {
        DiffHunk {
            old_start,
            old_lines,
            new_start,
            new_lines,
            lines: lines.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    fn file_diff(hunks: Vec<DiffHunk>) -> FileDiff {
        FileDiff { old_file_name: "a.txt".into(), new_file_name: "a.txt".into(), hunks }
    }

    #[test]
    fn no_diff_passes_base_through() {
        assert_eq!(apply_or_passthrough("one\ntwo\n", None).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn creates_file_without_trailing_newline() {
        let diff = file_diff(vec![hunk(0, 0, 1, 1, &["+hello", NO_NEWLINE_MARKER])]);
        assert_eq!(diff.apply("").unwrap(), "hello");
    }

    #[test]
    fn replaces_last_line_without_newline() {
        let diff = file_diff(vec![hunk(
            1,
            1,
            1,
            1,
            &["-hello", NO_NEWLINE_MARKER, "+hello world", NO_NEWLINE_MARKER],
        )]);
        assert_eq!(diff.apply("hello").unwrap(), "hello world");
    }

    #[test]
    fn adds_trailing_newline_when_marker_only_on_old_side() {
        let diff = file_diff(vec![hunk(1, 1, 1, 2, &["-a", NO_NEWLINE_MARKER, "+a", "+b"])]);
        assert_eq!(diff.apply("a").unwrap(), "a\nb\n");
    }

    #[test]
    fn applies_hunk_at_shifted_position() {
        // Recorded at line 2, but the base has two extra lines on top.
        let diff = file_diff(vec![hunk(2, 2, 2, 2, &[" b", "-c", "+C"])]);
        let base = "x\ny\na\nb\nc\nd\n";
        assert_eq!(diff.apply(base).unwrap(), "x\ny\na\nb\nC\nd\n");
    }

    #[test]
    fn applies_multiple_hunks_in_order() {
        let base: String = (1..=12).map(|n| format!("l{n}\n")).collect();
        let diff = file_diff(vec![
            hunk(1, 2, 1, 2, &["-l1", "+L1", " l2"]),
            hunk(11, 2, 11, 3, &[" l11", "+inserted", " l12"]),
        ]);
        let out = diff.apply(&base).unwrap();
        assert!(out.starts_with("L1\nl2\nl3\n"));
        assert!(out.ends_with("l11\ninserted\nl12\n"));
    }

    #[test]
    fn deleting_everything_yields_empty_text() {
        let diff = file_diff(vec![hunk(1, 2, 0, 0, &["-a", "-b"])]);
        assert_eq!(diff.apply("a\nb\n").unwrap(), "");
    }

    #[test]
    fn mismatched_context_is_an_error() {
        let diff = file_diff(vec![hunk(1, 1, 1, 1, &["-expected", "+new"])]);
        let err = diff.apply("something else\n").unwrap_err();
        match err {
            PatchError::HunkMismatch { hunk, line, expected, found } => {
                assert_eq!(hunk, 0);
                assert_eq!(line, 1);
                assert_eq!(expected, "expected");
                assert_eq!(found.as_deref(), Some("something else"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn insertion_past_end_is_out_of_range() {
        let diff = file_diff(vec![hunk(10, 0, 11, 1, &["+late"])]);
        assert_eq!(
            diff.apply("a\n").unwrap_err(),
            PatchError::HunkOutOfRange { hunk: 0, len: 1 }
        );
    }

    #[test]
    fn between_reproduces_the_new_text() {
        let old = "fn main() {\n    println!(\"hi\");\n}\n";
        let new = "fn main() {\n    let x = 1;\n    println!(\"hi {x}\");\n}\n";
        let diff = FileDiff::between("src/main.rs", "src/main.rs", old, new);
        assert_eq!(diff.hunks.len(), 1);
        assert_eq!(diff.apply(old).unwrap(), new);
    }

    #[test]
    fn between_identical_texts_has_no_hunks() {
        let diff = FileDiff::between("a", "a", "same\n", "same\n");
        assert!(diff.hunks.is_empty());
        assert_eq!(diff.apply("same\n").unwrap(), "same\n");
    }

    #[test]
    fn parses_git_diff_output() {
        let text = r"diff --git a/src/lib.rs b/src/lib.rs
index 83db48f..bf269f4 100644
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,3 +1,3 @@
 one
-two
+TWO
 three
diff --git a/new.txt b/new.txt
new file mode 100644
--- /dev/null
+++ b/new.txt
@@ -0,0 +1 @@
+fresh
\ No newline at end of file
";
        let files = parse_unified(text).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].new_file_name, "src/lib.rs");
        assert_eq!(files[0].apply("one\ntwo\nthree\n").unwrap(), "one\nTWO\nthree\n");
        assert_eq!(files[1].old_file_name, "new.txt");
        assert_eq!(files[1].hunks[0].old_lines, 0);
        assert_eq!(files[1].apply("").unwrap(), "fresh");
    }

    #[test]
    fn hunk_before_header_is_malformed() {
        let err = parse_unified("@@ -1 +1 @@\n-a\n+b\n").unwrap_err();
        assert!(matches!(err, PatchError::Malformed { line: 1, .. }));
    }

    #[test]
    fn diff_records_use_camel_case_json() {
        let json = r#"{"oldFileName":"a","newFileName":"b","hunks":[
            {"oldStart":1,"oldLines":1,"newStart":1,"newLines":1,"lines":["-x","+y"]}]}"#;
        let diff: FileDiff = serde_json::from_str(json).unwrap();
        assert_eq!(diff.apply("x\n").unwrap(), "y\n");
    }
}
