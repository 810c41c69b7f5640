// Copyright 2023-2024 The pgit Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Three-way text merge with Git-style conflict markers.
//!
//! Both sides are diffed against the common base; the union of changed base
//! regions is walked in order. Regions changed by one side apply verbatim,
//! identical changes collapse, and genuinely conflicting regions are
//! materialized between `<<<<<<< local` and `>>>>>>> <remote>` markers.

use crate::diff::line_diff_ops;
use crate::diff::split_lines;

pub const CONFLICT_LOCAL_LABEL: &str = "local";

/// One region both sides changed incompatibly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictRegion {
    /// Line range in the base content the region replaces.
    pub base_range: std::ops::Range<usize>,
    pub local: Vec<u8>,
    pub remote: Vec<u8>,
}

/// Outcome of merging one file's text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedText {
    /// Merged bytes; contains inline markers when `conflict_regions` is
    /// non-empty.
    pub content: Vec<u8>,
    /// Regions where both sides changed but the merge resolved them.
    pub auto_resolved_count: usize,
    pub conflict_regions: Vec<ConflictRegion>,
}

impl MergedText {
    pub fn is_clean(&self) -> bool {
        self.conflict_regions.is_empty()
    }
}

/// A side's edit relative to the base: `lines` replaces base lines
/// `base_start..base_end` (empty range = insertion before `base_start`).
#[derive(Clone, Debug)]
struct Edit<'a> {
    base_start: usize,
    base_end: usize,
    lines: Vec<&'a [u8]>,
}

fn side_edits<'a>(base_lines: &[&'a [u8]], side_lines: &[&'a [u8]]) -> Vec<Edit<'a>> {
    line_diff_ops(base_lines, side_lines)
        .iter()
        .filter(|op| !matches!(op, similar::DiffOp::Equal { .. }))
        .map(|op| {
            let base_range = op.old_range();
            Edit {
                base_start: base_range.start,
                base_end: base_range.end,
                lines: side_lines[op.new_range()].to_vec(),
            }
        })
        .collect()
}

/// Unions the changed base intervals of both sides. Touching intervals merge,
/// so a zero-width insertion joins an adjacent change instead of splitting it.
fn union_regions(local: &[Edit<'_>], remote: &[Edit<'_>]) -> Vec<(usize, usize)> {
    let mut intervals: Vec<(usize, usize)> = local
        .iter()
        .chain(remote)
        .map(|edit| (edit.base_start, edit.base_end))
        .collect();
    intervals.sort_unstable();
    let mut merged: Vec<(usize, usize)> = vec![];
    for (start, end) in intervals {
        match merged.last_mut() {
            Some((_, last_end)) if start <= *last_end => *last_end = (*last_end).max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// The bytes one side produces for the base region `start..end`, and whether
/// that side changed anything in it.
fn side_region<'a>(
    base_lines: &[&'a [u8]],
    edits: &[Edit<'a>],
    start: usize,
    end: usize,
) -> (Vec<u8>, bool) {
    let mut out: Vec<u8> = vec![];
    let mut changed = false;
    let mut pos = start;
    for edit in edits {
        if edit.base_end < start || edit.base_start > end {
            continue;
        }
        changed = true;
        for line in &base_lines[pos..edit.base_start] {
            out.extend_from_slice(line);
        }
        for line in &edit.lines {
            out.extend_from_slice(line);
        }
        pos = edit.base_end;
    }
    for line in &base_lines[pos..end] {
        out.extend_from_slice(line);
    }
    (out, changed)
}

fn push_with_newline(out: &mut Vec<u8>, content: &[u8]) {
    out.extend_from_slice(content);
    if !content.is_empty() && !content.ends_with(b"\n") {
        out.push(b'\n');
    }
}

fn push_conflict_markers(out: &mut Vec<u8>, local: &[u8], remote: &[u8], remote_label: &str) {
    out.extend_from_slice(format!("<<<<<<< {CONFLICT_LOCAL_LABEL}\n").as_bytes());
    push_with_newline(out, local);
    out.extend_from_slice(b"=======\n");
    push_with_newline(out, remote);
    out.extend_from_slice(format!(">>>>>>> {remote_label}\n").as_bytes());
}

/// Merges `local` and `remote`, both derived from `base`. `remote_label`
/// names the right side of any conflict marker (typically the remote name).
pub fn merge_text(base: &[u8], local: &[u8], remote: &[u8], remote_label: &str) -> MergedText {
    let base_lines = split_lines(base);
    let local_lines = split_lines(local);
    let remote_lines = split_lines(remote);
    let local_edits = side_edits(&base_lines, &local_lines);
    let remote_edits = side_edits(&base_lines, &remote_lines);

    let mut content: Vec<u8> = vec![];
    let mut auto_resolved_count = 0;
    let mut conflict_regions = vec![];
    let mut pos = 0;
    for (start, end) in union_regions(&local_edits, &remote_edits) {
        for line in &base_lines[pos..start] {
            content.extend_from_slice(line);
        }
        pos = end;
        let (local_piece, local_changed) = side_region(&base_lines, &local_edits, start, end);
        let (remote_piece, remote_changed) = side_region(&base_lines, &remote_edits, start, end);
        match (local_changed, remote_changed) {
            (true, false) => content.extend_from_slice(&local_piece),
            (false, true) => content.extend_from_slice(&remote_piece),
            (true, true) if local_piece == remote_piece => {
                auto_resolved_count += 1;
                content.extend_from_slice(&remote_piece);
            }
            (true, true) => {
                push_conflict_markers(&mut content, &local_piece, &remote_piece, remote_label);
                conflict_regions.push(ConflictRegion {
                    base_range: start..end,
                    local: local_piece,
                    remote: remote_piece,
                });
            }
            (false, false) => unreachable!("region exists only where a side changed"),
        }
    }
    for line in &base_lines[pos..] {
        content.extend_from_slice(line);
    }

    MergedText {
        content,
        auto_resolved_count,
        conflict_regions,
    }
}

/// Whole-file conflict materialization for contents a line merge cannot
/// handle (binary data, symlink targets, delete-vs-edit).
pub fn materialize_whole_file_conflict(
    local: &[u8],
    remote: &[u8],
    remote_label: &str,
) -> Vec<u8> {
    let mut out = vec![];
    push_conflict_markers(&mut out, local, remote, remote_label);
    out
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;

    fn merge(base: &[u8], local: &[u8], remote: &[u8]) -> MergedText {
        merge_text(base, local, remote, "origin")
    }

    #[test]
    fn test_merge_of_identical_sides_is_identity() {
        for content in [&b""[..], b"a\n", b"a\nb\nc", b"\n\n"] {
            let result = merge(b"base\n", content, content);
            assert!(result.is_clean());
            assert_eq!(result.content, content);
        }
    }

    #[test]
    fn test_merge_one_side_unchanged_takes_other() {
        let base = b"a\nb\nc\n";
        let local = b"a\nB\nc\n";
        // merge(base, A, base) == A
        let result = merge(base, local, base);
        assert!(result.is_clean());
        assert_eq!(result.content, local);
        // merge(base, base, B) == B
        let result = merge(base, base, local);
        assert!(result.is_clean());
        assert_eq!(result.content, local);
    }

    #[test]
    fn test_merge_disjoint_changes() {
        let base = b"L1\nL2\nL3\n";
        let local = b"LOCAL\nL2\nL3\n";
        let remote = b"L1\nL2\nREMOTE\n";
        let result = merge(base, local, remote);
        assert!(result.is_clean());
        assert_eq!(result.content, b"LOCAL\nL2\nREMOTE\n");
    }

    #[test]
    fn test_merge_conflicting_single_line() {
        let result = merge(b"L1\n", b"A\n", b"B\n");
        assert_eq!(result.conflict_regions.len(), 1);
        assert_eq!(
            result.content,
            indoc! {b"
                <<<<<<< local
                A
                =======
                B
                >>>>>>> origin
            "}
        );
    }

    #[test]
    fn test_merge_same_change_auto_resolves() {
        let base = b"a\nb\nc\n";
        let both = b"a\nX\nc\n";
        let result = merge(base, both, both);
        assert!(result.is_clean());
        assert_eq!(result.auto_resolved_count, 1);
        assert_eq!(result.content, both);
    }

    #[test]
    fn test_merge_conflict_between_context() {
        let base = b"a\nb\nc\n";
        let result = merge(base, b"a\nB1\nc\n", b"a\nB2\nc\n");
        assert_eq!(result.conflict_regions.len(), 1);
        assert_eq!(
            result.content,
            indoc! {b"
                a
                <<<<<<< local
                B1
                =======
                B2
                >>>>>>> origin
                c
            "}
        );
        assert_eq!(result.conflict_regions[0].base_range, 1..2);
        assert_eq!(result.conflict_regions[0].local, b"B1\n");
        assert_eq!(result.conflict_regions[0].remote, b"B2\n");
    }

    #[test]
    fn test_merge_both_insert_at_different_points() {
        let base = b"a\nb\nc\n";
        let local = b"X\na\nb\nc\n";
        let remote = b"a\nb\nc\nY\n";
        let result = merge(base, local, remote);
        assert!(result.is_clean());
        assert_eq!(result.content, b"X\na\nb\nc\nY\n");
    }

    #[test]
    fn test_merge_both_insert_at_same_point_conflicts() {
        let base = b"a\nb\n";
        let local = b"a\nX\nb\n";
        let remote = b"a\nY\nb\n";
        let result = merge(base, local, remote);
        assert_eq!(result.conflict_regions.len(), 1);
        assert_eq!(
            result.content,
            indoc! {b"
                a
                <<<<<<< local
                X
                =======
                Y
                >>>>>>> origin
                b
            "}
        );
    }

    #[test]
    fn test_merge_delete_vs_keep() {
        let base = b"a\nb\nc\n";
        let local = b"a\nc\n";
        let result = merge(base, local, base);
        assert!(result.is_clean());
        assert_eq!(result.content, local);
    }

    #[test]
    fn test_merge_delete_vs_edit_conflicts() {
        let base = b"a\nb\nc\n";
        let local = b"a\nc\n";
        let remote = b"a\nB\nc\n";
        let result = merge(base, local, remote);
        assert_eq!(result.conflict_regions.len(), 1);
        // The deleted side contributes an empty alternative.
        assert_eq!(
            result.content,
            indoc! {b"
                a
                <<<<<<< local
                =======
                B
                >>>>>>> origin
                c
            "}
        );
    }

    #[test]
    fn test_merge_multiple_regions() {
        let base = b"1\n2\n3\n4\n5\n";
        let local = b"one\n2\n3\n4\nfive-l\n";
        let remote = b"1\n2\nthree\n4\nfive-r\n";
        let result = merge(base, local, remote);
        assert_eq!(result.conflict_regions.len(), 1);
        assert_eq!(
            result.content,
            indoc! {b"
                one
                2
                three
                4
                <<<<<<< local
                five-l
                =======
                five-r
                >>>>>>> origin
            "}
        );
    }

    #[test]
    fn test_merge_missing_final_newline_in_conflict() {
        let result = merge(b"x", b"A", b"B");
        // Marker lines stay well-formed even when inputs lack newlines.
        assert_eq!(
            result.content,
            indoc! {b"
                <<<<<<< local
                A
                =======
                B
                >>>>>>> origin
            "}
        );
    }

    #[test]
    fn test_whole_file_conflict() {
        let out = materialize_whole_file_conflict(b"old\n", b"new\n", "origin");
        assert_eq!(
            out,
            indoc! {b"
                <<<<<<< local
                old
                =======
                new
                >>>>>>> origin
            "}
        );
    }
}
