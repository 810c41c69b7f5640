// Copyright 2023 The pgit Authors
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

//! Line-level diffing shared by the merge engine and `pgit diff`.
//!
//! Content is split into newline-terminated line tokens (the final line may
//! lack its terminator); the tokens tile the input, so concatenating hunk
//! contents reproduces it exactly.

use similar::Algorithm;
use similar::DiffOp;
use similar::capture_diff_slices;

/// Splits content into lines, keeping the trailing `\n` on each.
pub fn split_lines(data: &[u8]) -> Vec<&[u8]> {
    data.split_inclusive(|b| *b == b'\n').collect()
}

/// Raw diff ops between two tokenized sides, in old-position order.
pub fn line_diff_ops(old: &[&[u8]], new: &[&[u8]]) -> Vec<DiffOp> {
    capture_diff_slices(Algorithm::Myers, old, new)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DiffHunkKind {
    Matching,
    Different,
}

/// A run of lines that either matches on both sides or differs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiffHunk<'a> {
    pub kind: DiffHunkKind,
    /// Line range in the left input (0-based, end exclusive).
    pub left_range: std::ops::Range<usize>,
    pub right_range: std::ops::Range<usize>,
    pub left: Vec<&'a [u8]>,
    pub right: Vec<&'a [u8]>,
}

/// Diffs two contents into line hunks.
pub fn diff_hunks<'a>(left: &'a [u8], right: &'a [u8]) -> Vec<DiffHunk<'a>> {
    let left_lines = split_lines(left);
    let right_lines = split_lines(right);
    line_diff_ops(&left_lines, &right_lines)
        .iter()
        .map(|op| {
            let left_range = op.old_range();
            let right_range = op.new_range();
            let kind = match op {
                DiffOp::Equal { .. } => DiffHunkKind::Matching,
                _ => DiffHunkKind::Different,
            };
            DiffHunk {
                kind,
                left: left_lines[left_range.clone()].to_vec(),
                right: right_lines[right_range.clone()].to_vec(),
                left_range,
                right_range,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concat(lines: &[&[u8]]) -> Vec<u8> {
        lines.concat()
    }

    #[test]
    fn test_split_lines_keeps_terminators() {
        assert_eq!(split_lines(b""), Vec::<&[u8]>::new());
        assert_eq!(split_lines(b"a\n"), vec![b"a\n" as &[u8]]);
        assert_eq!(
            split_lines(b"a\nb"),
            vec![b"a\n" as &[u8], b"b" as &[u8]]
        );
    }

    #[test]
    fn test_hunks_tile_both_inputs() {
        let left = b"a\nb\nc\nd\n";
        let right = b"a\nx\nc\nd\ne\n";
        let hunks = diff_hunks(left, right);
        let left_cat: Vec<u8> = hunks.iter().flat_map(|h| concat(&h.left)).collect();
        let right_cat: Vec<u8> = hunks.iter().flat_map(|h| concat(&h.right)).collect();
        assert_eq!(left_cat, left);
        assert_eq!(right_cat, right);
    }

    #[test]
    fn test_identical_inputs_are_one_matching_hunk() {
        let hunks = diff_hunks(b"a\nb\n", b"a\nb\n");
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].kind, DiffHunkKind::Matching);
    }

    #[test]
    fn test_change_in_the_middle() {
        let hunks = diff_hunks(b"a\nb\nc\n", b"a\nx\nc\n");
        let kinds: Vec<DiffHunkKind> = hunks.iter().map(|h| h.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DiffHunkKind::Matching,
                DiffHunkKind::Different,
                DiffHunkKind::Matching,
            ]
        );
        assert_eq!(hunks[1].left, vec![b"b\n" as &[u8]]);
        assert_eq!(hunks[1].right, vec![b"x\n" as &[u8]]);
    }

    #[test]
    fn test_missing_final_newline() {
        let hunks = diff_hunks(b"a\nb", b"a\nb\n");
        let left_cat: Vec<u8> = hunks.iter().flat_map(|h| concat(&h.left)).collect();
        assert_eq!(left_cat, b"a\nb");
    }
}
