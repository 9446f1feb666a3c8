//! Three-way text merge
//!
//! Applies the remote side's changes (base → remote) onto the local text.
//! Regions changed on only one side take that side's lines; regions both
//! sides changed identically collapse to one copy; regions that truly
//! diverge are bracketed with conflict markers instead of failing:
//!
//! ```text
//! <<<<<<< LOCAL
//! local lines
//! =======
//! remote lines
//! >>>>>>> REMOTE
//! ```
//!
//! With an empty base (no cached ancestor content) this degrades to a
//! two-way merge: any difference between the sides becomes one marked
//! region.

use similar::{DiffTag, TextDiff};

/// Result of a merge attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Every change applied cleanly
    Clean(String),
    /// At least one region carries conflict markers
    Conflicted(String),
}

impl MergeOutcome {
    /// The merged text, markers or not
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Clean(text) | Self::Conflicted(text) => text,
        }
    }

    /// Whether markers were emitted
    #[must_use]
    pub fn is_conflicted(&self) -> bool {
        matches!(self, Self::Conflicted(_))
    }
}

/// One side's replacement of a base line range
#[derive(Debug, Clone)]
struct Edit {
    old_start: usize,
    old_end: usize,
    lines: Vec<String>,
}

/// Merge `local` and `remote` against their common ancestor `base`.
#[must_use]
pub fn merge_three_way(base: &str, local: &str, remote: &str) -> MergeOutcome {
    if local == remote {
        return MergeOutcome::Clean(local.to_string());
    }

    let base_lines = split_lines(base);
    let local_edits = collect_edits(base, local);
    let remote_edits = collect_edits(base, remote);

    let mut out = String::new();
    let mut conflicted = false;
    let mut cursor = 0usize;
    let mut ai = 0usize;
    let mut bi = 0usize;

    loop {
        let a = local_edits.get(ai);
        let b = remote_edits.get(bi);

        match (a, b) {
            (None, None) => break,
            (Some(a), Some(b)) if overlaps(a, b) => {
                // Grow the region until no further edit from either side
                // reaches into it.
                let mut lo = a.old_start.min(b.old_start);
                let mut hi = a.old_end.max(b.old_end);
                let mut aj = ai + 1;
                let mut bj = bi + 1;
                loop {
                    let mut grew = false;
                    while let Some(e) = local_edits.get(aj) {
                        if e.old_start < hi {
                            hi = hi.max(e.old_end);
                            lo = lo.min(e.old_start);
                            aj += 1;
                            grew = true;
                        } else {
                            break;
                        }
                    }
                    while let Some(e) = remote_edits.get(bj) {
                        if e.old_start < hi {
                            hi = hi.max(e.old_end);
                            lo = lo.min(e.old_start);
                            bj += 1;
                            grew = true;
                        } else {
                            break;
                        }
                    }
                    if !grew {
                        break;
                    }
                }

                for line in &base_lines[cursor..lo] {
                    out.push_str(line);
                }

                let local_text = side_region(&base_lines, lo, hi, &local_edits[ai..aj]);
                let remote_text = side_region(&base_lines, lo, hi, &remote_edits[bi..bj]);

                if local_text == remote_text {
                    out.push_str(&local_text);
                } else {
                    conflicted = true;
                    ensure_newline(&mut out);
                    out.push_str("<<<<<<< LOCAL\n");
                    push_block(&mut out, &local_text);
                    out.push_str("=======\n");
                    push_block(&mut out, &remote_text);
                    out.push_str(">>>>>>> REMOTE\n");
                }

                cursor = hi;
                ai = aj;
                bi = bj;
            }
            (a, b) => {
                // Disjoint edits: apply whichever starts first. Pure
                // insertions at the same position sort before replacements.
                let take_local = match (a, b) {
                    (Some(a), Some(b)) => {
                        (a.old_start, a.old_end != a.old_start)
                            < (b.old_start, b.old_end != b.old_start)
                    }
                    (Some(_), None) => true,
                    (None, _) => false,
                };
                let edit = if take_local {
                    ai += 1;
                    a.unwrap()
                } else {
                    bi += 1;
                    b.unwrap()
                };

                for line in &base_lines[cursor..edit.old_start] {
                    out.push_str(line);
                }
                for line in &edit.lines {
                    out.push_str(line);
                }
                cursor = edit.old_end;
            }
        }
    }

    for line in &base_lines[cursor..] {
        out.push_str(line);
    }

    if conflicted {
        MergeOutcome::Conflicted(out)
    } else {
        MergeOutcome::Clean(out)
    }
}

/// Line-level edits transforming `base` into `side`, sorted by base
/// position, with touching ops coalesced.
fn collect_edits(base: &str, side: &str) -> Vec<Edit> {
    let diff = TextDiff::from_lines(base, side);
    let new_slices = diff.new_slices();

    let mut edits: Vec<Edit> = Vec::new();
    for op in diff.ops() {
        if op.tag() == DiffTag::Equal {
            continue;
        }
        let old = op.old_range();
        let lines: Vec<String> = new_slices[op.new_range()]
            .iter()
            .map(|s| (*s).to_string())
            .collect();

        if let Some(prev) = edits.last_mut() {
            if prev.old_end == old.start {
                prev.old_end = old.end;
                prev.lines.extend(lines);
                continue;
            }
        }
        edits.push(Edit {
            old_start: old.start,
            old_end: old.end,
            lines,
        });
    }
    edits
}

/// Whether two edits contend for the same base region.
///
/// Empty ranges (pure insertions) conflict only with an insertion at the
/// exact same point or a replacement that strictly surrounds them;
/// touching-but-disjoint edits stay independent.
fn overlaps(a: &Edit, b: &Edit) -> bool {
    if a.old_start == a.old_end && b.old_start == b.old_end {
        return a.old_start == b.old_start;
    }
    a.old_start < b.old_end && b.old_start < a.old_end
}

/// One side's text for base region `[lo, hi)`: base lines with that side's
/// edits applied.
fn side_region(base_lines: &[&str], lo: usize, hi: usize, edits: &[Edit]) -> String {
    let mut text = String::new();
    let mut cur = lo;
    for edit in edits {
        for line in &base_lines[cur..edit.old_start] {
            text.push_str(line);
        }
        for line in &edit.lines {
            text.push_str(line);
        }
        cur = edit.old_end;
    }
    for line in &base_lines[cur..hi] {
        text.push_str(line);
    }
    text
}

/// Split keeping line terminators, matching `TextDiff::from_lines` indexing.
fn split_lines(s: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if c == '\n' {
            lines.push(&s[start..=i]);
            start = i + 1;
        }
    }
    if start < s.len() {
        lines.push(&s[start..]);
    }
    lines
}

fn ensure_newline(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn push_block(out: &mut String, text: &str) {
    out.push_str(text);
    if !text.is_empty() && !text.ends_with('\n') {
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_overlapping_edits_merge_cleanly() {
        let base = "line1\nline2\nline3";
        let local = "LOCAL\nline2\nline3";
        let remote = "line1\nline2\nREMOTE";

        let outcome = merge_three_way(base, local, remote);
        assert_eq!(outcome, MergeOutcome::Clean("LOCAL\nline2\nREMOTE".to_string()));
    }

    #[test]
    fn test_identical_sides_are_clean() {
        let outcome = merge_three_way("a\nb\n", "a\nX\n", "a\nX\n");
        assert_eq!(outcome, MergeOutcome::Clean("a\nX\n".to_string()));
    }

    #[test]
    fn test_local_only_change_wins() {
        let outcome = merge_three_way("a\nb\nc\n", "a\nB\nc\n", "a\nb\nc\n");
        assert_eq!(outcome, MergeOutcome::Clean("a\nB\nc\n".to_string()));
    }

    #[test]
    fn test_remote_only_change_wins() {
        let outcome = merge_three_way("a\nb\nc\n", "a\nb\nc\n", "a\nB\nc\n");
        assert_eq!(outcome, MergeOutcome::Clean("a\nB\nc\n".to_string()));
    }

    #[test]
    fn test_same_region_divergence_is_marked() {
        let base = "a\nb\nc\n";
        let local = "a\nLOCAL\nc\n";
        let remote = "a\nREMOTE\nc\n";

        let outcome = merge_three_way(base, local, remote);
        assert!(outcome.is_conflicted());
        let text = outcome.text();
        assert!(text.starts_with("a\n"));
        assert!(text.contains("<<<<<<< LOCAL\nLOCAL\n=======\nREMOTE\n>>>>>>> REMOTE\n"));
        assert!(text.ends_with("c\n"));
    }

    #[test]
    fn test_converging_edits_collapse() {
        // Both sides made the identical change to the same region
        let outcome = merge_three_way("a\nb\n", "a\nX\n", "a\nX\n");
        assert!(!outcome.is_conflicted());
    }

    #[test]
    fn test_empty_base_degrades_to_two_way() {
        let outcome = merge_three_way("", "only local\n", "only remote\n");
        assert!(outcome.is_conflicted());
        let text = outcome.text();
        assert!(text.contains("only local"));
        assert!(text.contains("only remote"));
        assert!(text.contains("<<<<<<< LOCAL"));
        assert!(text.contains(">>>>>>> REMOTE"));
    }

    #[test]
    fn test_empty_base_equal_sides_clean() {
        let outcome = merge_three_way("", "same\n", "same\n");
        assert_eq!(outcome, MergeOutcome::Clean("same\n".to_string()));
    }

    #[test]
    fn test_adjacent_edits_do_not_conflict() {
        // Local edits line 2, remote edits line 3; the regions touch but
        // do not overlap.
        let base = "1\n2\n3\n4\n";
        let local = "1\nTWO\n3\n4\n";
        let remote = "1\n2\nTHREE\n4\n";

        let outcome = merge_three_way(base, local, remote);
        assert_eq!(
            outcome,
            MergeOutcome::Clean("1\nTWO\nTHREE\n4\n".to_string())
        );
    }

    #[test]
    fn test_remote_deletion_applies() {
        let base = "a\nb\nc\n";
        let local = "a\nb\nc\n";
        let remote = "a\nc\n";

        let outcome = merge_three_way(base, local, remote);
        assert_eq!(outcome, MergeOutcome::Clean("a\nc\n".to_string()));
    }

    #[test]
    fn test_deletion_vs_edit_conflicts() {
        let base = "a\nb\nc\n";
        let local = "a\nB\nc\n";
        let remote = "a\nc\n";

        let outcome = merge_three_way(base, local, remote);
        assert!(outcome.is_conflicted());
    }

    #[test]
    fn test_missing_trailing_newline_in_conflict_region() {
        let base = "a\nend";
        let local = "a\nlocal end";
        let remote = "a\nremote end";

        let outcome = merge_three_way(base, local, remote);
        assert!(outcome.is_conflicted());
        let text = outcome.text();
        // Marker lines stay on their own lines even when the region had no
        // trailing newline
        assert!(text.contains("local end\n=======\n"));
        assert!(text.contains("remote end\n>>>>>>> REMOTE\n"));
    }

    #[test]
    fn test_insertions_at_same_point_conflict() {
        let base = "a\nz\n";
        let local = "a\nlocal\nz\n";
        let remote = "a\nremote\nz\n";

        let outcome = merge_three_way(base, local, remote);
        assert!(outcome.is_conflicted());
    }

    #[test]
    fn test_split_lines_keeps_terminators() {
        assert_eq!(split_lines("a\nb\n"), vec!["a\n", "b\n"]);
        assert_eq!(split_lines("a\nb"), vec!["a\n", "b"]);
        assert!(split_lines("").is_empty());
    }
}
