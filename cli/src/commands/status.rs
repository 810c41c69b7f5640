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

use std::io::Write as _;

use pgit_lib::index::StagedStatus;
use pgit_lib::store::Store as _;
use pgit_lib::working_copy;
use pgit_lib::working_copy::FileStatus;

use crate::cli_util::CommandHelper;
use crate::cli_util::short_commit_hash;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Show the working tree status
///
/// Lists staged changes, unstaged changes, untracked files, and any
/// conflicts left by a diverged pull.
#[derive(clap::Args, Clone, Debug)]
pub struct StatusArgs {}

pub fn cmd_status(
    ui: &mut Ui,
    command: &CommandHelper,
    _args: &StatusArgs,
) -> Result<(), CommandError> {
    let (repo, store) = command.repo_and_store()?;
    let head = store.get_head().map_err(CommandError::from)?;
    let head_tree = match &head {
        Some(head) => store.get_tree_at_commit(head).map_err(CommandError::from)?,
        None => vec![],
    };
    let ignore = working_copy::load_ignore(repo.root())?;
    let snapshot = working_copy::snapshot(repo.root(), &ignore)?;
    let statuses = working_copy::status_against_tree(&snapshot, &head_tree);
    let index = repo.load_index()?;
    let merge_state = repo.load_merge_state()?;

    let mut out = ui.stdout();
    match &head {
        Some(head) => writeln!(out, "On commit {}", short_commit_hash(head))?,
        None => writeln!(out, "No commits yet")?,
    }

    if let Some(merge_state) = &merge_state {
        writeln!(out)?;
        writeln!(
            out,
            "You are merging remote {} ({})",
            merge_state.remote_name,
            short_commit_hash(&merge_state.remote_head)
        )?;
        writeln!(out, "Unresolved conflicts:")?;
        for path in &merge_state.conflicted_paths {
            writeln!(out, "  both modified: {path}")?;
        }
    }

    if !index.is_empty() {
        writeln!(out)?;
        writeln!(out, "Changes staged for commit:")?;
        for (path, change) in index.staged_changes() {
            let label = match change.status {
                StagedStatus::New => "new file",
                StagedStatus::Modified => "modified",
                StagedStatus::Deleted => "deleted",
            };
            writeln!(out, "  {label}: {path}")?;
        }
    }

    let mut unstaged: Vec<(&str, &str)> = vec![];
    let mut untracked: Vec<&str> = vec![];
    for (path, status) in &statuses {
        // Anything already staged with the same status is not re-listed.
        let staged = index.get(path);
        match status {
            FileStatus::New => {
                if staged.is_none() {
                    untracked.push(path);
                }
            }
            FileStatus::Modified => {
                let staged_same = staged.is_some_and(|change| {
                    change.content_hash.as_deref()
                        == snapshot.get(path).map(|f| f.hash.hex()).as_deref()
                });
                if !staged_same {
                    unstaged.push((path, "modified"));
                }
            }
            FileStatus::Deleted => {
                let staged_delete =
                    staged.is_some_and(|change| change.status == StagedStatus::Deleted);
                if !staged_delete {
                    unstaged.push((path, "deleted"));
                }
            }
        }
    }

    if !unstaged.is_empty() {
        writeln!(out)?;
        writeln!(out, "Changes not staged for commit:")?;
        for (path, label) in unstaged {
            writeln!(out, "  {label}: {path}")?;
        }
    }
    if !untracked.is_empty() {
        writeln!(out)?;
        writeln!(out, "Untracked files:")?;
        for path in untracked {
            writeln!(out, "  {path}")?;
        }
    }
    if index.is_empty() && statuses.is_empty() && merge_state.is_none() {
        writeln!(out, "Nothing to commit, working tree clean")?;
    }
    Ok(())
}
