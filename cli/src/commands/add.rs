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

use pgit_lib::index::StagedStatus;
use pgit_lib::store::Store as _;
use pgit_lib::working_copy;
use pgit_lib::working_copy::FileStatus;

use crate::cli_util::CommandHelper;
use crate::cli_util::path_matches_prefix;
use crate::cli_util::repo_relative_path;
use crate::command_error::CommandError;
use crate::command_error::exit_code;
use crate::ui::Ui;

/// Stage working-tree changes for the next commit
///
/// Directories stage every changed file underneath them; deletions of
/// tracked files are staged as deletions.
#[derive(clap::Args, Clone, Debug)]
pub struct AddArgs {
    /// Files or directories to stage
    #[arg(required = true, value_hint = clap::ValueHint::AnyPath)]
    paths: Vec<String>,
}

pub fn cmd_add(ui: &mut Ui, command: &CommandHelper, args: &AddArgs) -> Result<(), CommandError> {
    let (repo, store) = command.repo_and_store()?;
    let head_tree = match store.get_head().map_err(CommandError::from)? {
        Some(head) => store.get_tree_at_commit(&head).map_err(CommandError::from)?,
        None => vec![],
    };
    let ignore = working_copy::load_ignore(repo.root())?;
    let snapshot = working_copy::snapshot(repo.root(), &ignore)?;
    let statuses = working_copy::status_against_tree(&snapshot, &head_tree);

    let mut index = repo.load_index()?;
    let mut staged = 0;
    for arg in &args.paths {
        let prefix = repo_relative_path(&repo, command.cwd(), arg)?;
        let mut matched = false;
        for (path, status) in &statuses {
            if !path_matches_prefix(path, &prefix) {
                continue;
            }
            matched = true;
            match status {
                FileStatus::New => {
                    let hash = snapshot.get(path).map(|f| f.hash);
                    index.stage(path, StagedStatus::New, hash.as_ref());
                }
                FileStatus::Modified => {
                    let hash = snapshot.get(path).map(|f| f.hash);
                    index.stage(path, StagedStatus::Modified, hash.as_ref());
                }
                FileStatus::Deleted => index.stage_delete(path),
            }
            staged += 1;
        }
        // An unchanged-but-tracked or existing-on-disk path is fine to name;
        // only a path that is neither is an error.
        if !matched
            && snapshot.get(&prefix).is_none()
            && !snapshot.paths().any(|p| path_matches_prefix(p, &prefix))
            && !head_tree.iter().any(|f| path_matches_prefix(&f.path, &prefix))
        {
            return Err(CommandError::new(
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("pathspec {arg:?} did not match any files"),
                ),
                exit_code::FILE_NOT_FOUND,
            ));
        }
    }
    index.save()?;
    ui.status(format!("Staged {staged} change(s)"))?;
    Ok(())
}
