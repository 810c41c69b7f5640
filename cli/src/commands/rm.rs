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

use pgit_lib::store::Store as _;
use pgit_lib::working_copy::to_fs_path;

use crate::cli_util::CommandHelper;
use crate::cli_util::path_matches_prefix;
use crate::cli_util::repo_relative_path;
use crate::command_error::CommandError;
use crate::command_error::exit_code;
use crate::ui::Ui;

/// Stage file deletions and remove the files from the working tree
#[derive(clap::Args, Clone, Debug)]
pub struct RmArgs {
    /// Tracked files to delete
    #[arg(required = true, value_hint = clap::ValueHint::AnyPath)]
    paths: Vec<String>,

    /// Only stage the deletion, keep the file on disk
    #[arg(long)]
    cached: bool,
}

pub fn cmd_rm(ui: &mut Ui, command: &CommandHelper, args: &RmArgs) -> Result<(), CommandError> {
    let (repo, store) = command.repo_and_store()?;
    let head_tree = match store.get_head().map_err(CommandError::from)? {
        Some(head) => store.get_tree_at_commit(&head).map_err(CommandError::from)?,
        None => vec![],
    };

    let mut index = repo.load_index()?;
    let mut removed = 0;
    for arg in &args.paths {
        let prefix = repo_relative_path(&repo, command.cwd(), arg)?;
        let tracked: Vec<&str> = head_tree
            .iter()
            .map(|f| f.path.as_str())
            .filter(|path| path_matches_prefix(path, &prefix))
            .collect();
        if tracked.is_empty() {
            return Err(CommandError::new(
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("pathspec {arg:?} does not match any tracked files"),
                ),
                exit_code::FILE_NOT_FOUND,
            ));
        }
        for path in tracked {
            index.stage_delete(path);
            removed += 1;
            if !args.cached
                && let Some(disk_path) = to_fs_path(repo.root(), path)
                && disk_path.exists()
            {
                std::fs::remove_file(&disk_path)?;
            }
        }
    }
    index.save()?;
    ui.status(format!("Staged {removed} deletion(s)"))?;
    Ok(())
}
