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

use std::collections::BTreeMap;
use std::io::Write;

use pgit_lib::content_hash::detect_binary;
use pgit_lib::diff::DiffHunkKind;
use pgit_lib::diff::diff_hunks;
use pgit_lib::revparse;
use pgit_lib::store::Store;
use pgit_lib::store::TreeFile;
use pgit_lib::working_copy;
use pgit_lib::working_copy::to_fs_path;

use crate::cli_util::CommandHelper;
use crate::cli_util::path_matches_prefix;
use crate::cli_util::repo_relative_path;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Show changes between commits and the working tree
///
/// With no refs, compares the working tree against HEAD. One ref compares
/// the working tree against that commit; two refs compare the commits.
#[derive(clap::Args, Clone, Debug)]
pub struct DiffArgs {
    /// Commit refs to compare
    #[arg(value_name = "REF", num_args = 0..=2)]
    revisions: Vec<String>,

    /// Restrict the diff to these paths
    #[arg(long, value_name = "PATH")]
    path: Vec<String>,

    /// Only show the staged changes
    #[arg(long, conflicts_with = "revisions")]
    staged: bool,
}

struct DiffSide {
    content: Option<Vec<u8>>,
}

pub fn cmd_diff(ui: &mut Ui, command: &CommandHelper, args: &DiffArgs) -> Result<(), CommandError> {
    let (repo, store) = command.repo_and_store()?;
    let prefixes: Vec<String> = args
        .path
        .iter()
        .map(|arg| repo_relative_path(&repo, command.cwd(), arg))
        .collect::<Result<_, _>>()?;

    // Left side: first ref or HEAD. Right side: second ref or working tree.
    let left_tree = match args.revisions.first() {
        Some(reference) => {
            let commit = revparse::resolve(store.as_ref(), reference)?;
            tree_contents(store.as_ref(), &commit.id)?
        }
        None => match store.get_head().map_err(CommandError::from)? {
            Some(head) => tree_contents(store.as_ref(), &head)?,
            None => BTreeMap::new(),
        },
    };
    let right_tree = match args.revisions.get(1) {
        Some(reference) => {
            let commit = revparse::resolve(store.as_ref(), reference)?;
            tree_contents(store.as_ref(), &commit.id)?
        }
        None => working_tree_contents(&repo, &left_tree)?,
    };

    // With --staged, only paths in the index participate.
    let staged_paths: Option<std::collections::BTreeSet<String>> = if args.staged {
        let index = repo.load_index()?;
        Some(
            index
                .staged_changes()
                .map(|(path, _)| path.to_owned())
                .collect(),
        )
    } else {
        None
    };

    let all_paths: std::collections::BTreeSet<&String> =
        left_tree.keys().chain(right_tree.keys()).collect();
    let mut out = ui.stdout();
    for path in all_paths {
        if !prefixes.is_empty() && !prefixes.iter().any(|p| path_matches_prefix(path, p)) {
            continue;
        }
        if let Some(staged_paths) = &staged_paths
            && !staged_paths.contains(path.as_str())
        {
            continue;
        }
        let left = left_tree.get(path).and_then(|side| side.content.as_deref());
        let right = right_tree.get(path).and_then(|side| side.content.as_deref());
        if left == right {
            continue;
        }
        show_file_diff(&mut out, path, left, right)?;
    }
    Ok(())
}

fn tree_contents(
    store: &dyn Store,
    commit: &pgit_lib::ulid::CommitId,
) -> Result<BTreeMap<String, DiffSide>, CommandError> {
    let tree = store.get_tree_at_commit(commit)?;
    Ok(tree
        .into_iter()
        .map(|file: TreeFile| {
            let content = file.content.as_bytes().to_vec();
            (
                file.path,
                DiffSide {
                    content: Some(content),
                },
            )
        })
        .collect())
}

/// The working tree as a diff side: every scanned file plus explicit
/// absences for tracked files that were deleted on disk.
fn working_tree_contents(
    repo: &pgit_lib::repo::Repository,
    reference: &BTreeMap<String, DiffSide>,
) -> Result<BTreeMap<String, DiffSide>, CommandError> {
    let ignore = working_copy::load_ignore(repo.root())?;
    let snapshot = working_copy::snapshot(repo.root(), &ignore)?;
    let mut sides = BTreeMap::new();
    for (path, scanned) in snapshot.files() {
        let content = match &scanned.symlink_target {
            Some(target) => target.clone().into_bytes(),
            None => {
                let disk_path = to_fs_path(repo.root(), path)
                    .expect("scanned paths are safe by construction");
                std::fs::read(&disk_path)?
            }
        };
        sides.insert(
            path.to_owned(),
            DiffSide {
                content: Some(content),
            },
        );
    }
    for path in reference.keys() {
        sides
            .entry(path.clone())
            .or_insert(DiffSide { content: None });
    }
    Ok(sides)
}

fn show_file_diff(
    out: &mut impl Write,
    path: &str,
    left: Option<&[u8]>,
    right: Option<&[u8]>,
) -> Result<(), CommandError> {
    writeln!(out, "diff --pgit a/{path} b/{path}")?;
    let left_name = if left.is_some() {
        format!("a/{path}")
    } else {
        "/dev/null".to_owned()
    };
    let right_name = if right.is_some() {
        format!("b/{path}")
    } else {
        "/dev/null".to_owned()
    };
    let left_bytes = left.unwrap_or_default();
    let right_bytes = right.unwrap_or_default();
    if detect_binary(left_bytes) || detect_binary(right_bytes) {
        writeln!(out, "Binary files {left_name} and {right_name} differ")?;
        return Ok(());
    }
    writeln!(out, "--- {left_name}")?;
    writeln!(out, "+++ {right_name}")?;

    let hunks = diff_hunks(left_bytes, right_bytes);
    for (index, hunk) in hunks.iter().enumerate() {
        match hunk.kind {
            DiffHunkKind::Matching => {
                // Up to three context lines on each side of a change.
                let lines = &hunk.left;
                let head_count = if index > 0 { lines.len().min(3) } else { 0 };
                let tail_start = if index + 1 < hunks.len() {
                    lines.len().saturating_sub(3).max(head_count)
                } else {
                    lines.len()
                };
                for line in &lines[..head_count] {
                    write_line(out, ' ', line)?;
                }
                for line in &lines[tail_start..] {
                    write_line(out, ' ', line)?;
                }
            }
            DiffHunkKind::Different => {
                writeln!(
                    out,
                    "@@ -{},{} +{},{} @@",
                    hunk.left_range.start + 1,
                    hunk.left_range.len(),
                    hunk.right_range.start + 1,
                    hunk.right_range.len()
                )?;
                for line in &hunk.left {
                    write_line(out, '-', line)?;
                }
                for line in &hunk.right {
                    write_line(out, '+', line)?;
                }
            }
        }
    }
    Ok(())
}

fn write_line(out: &mut impl Write, sign: char, line: &[u8]) -> std::io::Result<()> {
    write!(out, "{sign}")?;
    out.write_all(line)?;
    if !line.ends_with(b"\n") {
        writeln!(out, "\n\\ No newline at end of file")?;
    }
    Ok(())
}
