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

use pgit_lib::store::Store as _;
use pgit_lib::working_copy;
use pgit_lib::working_copy::materialize_tree;
use pgit_lib::working_copy::write_tree_file;

use crate::cli_util::CommandHelper;
use crate::cli_util::repo_relative_path;
use crate::cli_util::short_commit_hash;
use crate::command_error::CommandError;
use crate::command_error::exit_code;
use crate::ui::Ui;

/// Restore the working tree from a commit
///
/// With paths, restores only those files and leaves HEAD alone. Without,
/// the whole tree is rewritten and HEAD moves to the target commit.
#[derive(clap::Args, Clone, Debug)]
pub struct CheckoutArgs {
    /// The commit to check out (`HEAD~2`, id prefix, ...)
    #[arg(value_name = "REF")]
    revision: String,

    /// Restore only these paths
    #[arg(value_name = "PATHS", value_hint = clap::ValueHint::AnyPath)]
    paths: Vec<String>,

    /// Proceed even when the working tree has uncommitted changes
    #[arg(long, short)]
    force: bool,
}

pub fn cmd_checkout(
    ui: &mut Ui,
    command: &CommandHelper,
    args: &CheckoutArgs,
) -> Result<(), CommandError> {
    let (repo, store) = command.repo_and_store()?;
    let target = pgit_lib::revparse::resolve(store.as_ref(), &args.revision)?;

    if let Some(merge_state) = repo.load_merge_state()? {
        return Err(CommandError::new(
            pgit_lib::sync::SyncError::UnresolvedConflicts {
                paths: merge_state.conflicted_paths,
            },
            exit_code::UNRESOLVED_CONFLICTS,
        )
        .with_hint("Resolve the conflicts and commit first"));
    }

    if !args.paths.is_empty() {
        // Per-path restore; HEAD stays put.
        let mut restored = 0;
        for arg in &args.paths {
            let path = repo_relative_path(&repo, command.cwd(), arg)?;
            let file = store
                .get_file_at_commit(&path, &target.id)
                .map_err(CommandError::from)?
                .ok_or_else(|| {
                    CommandError::new(
                        std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            format!("{path:?} does not exist at {}", short_commit_hash(&target.id)),
                        ),
                        exit_code::FILE_NOT_FOUND,
                    )
                })?;
            write_tree_file(repo.root(), &file)?;
            restored += 1;
        }
        ui.status(format!("Restored {restored} file(s)"))?;
        return Ok(());
    }

    let head = store.get_head().map_err(CommandError::from)?;
    let head_tree = match &head {
        Some(head) => store.get_tree_at_commit(head).map_err(CommandError::from)?,
        None => vec![],
    };
    if !args.force {
        let ignore = working_copy::load_ignore(repo.root())?;
        let snapshot = working_copy::snapshot(repo.root(), &ignore)?;
        let statuses = working_copy::status_against_tree(&snapshot, &head_tree);
        // Untracked files are left alone; tracked modifications block.
        let dirty = statuses
            .values()
            .any(|s| *s != working_copy::FileStatus::New);
        if dirty {
            return Err(CommandError::new(
                std::io::Error::other("Working tree has uncommitted changes"),
                exit_code::UNCOMMITTED_CHANGES,
            )
            .with_hint("Commit them, or pass --force to discard"));
        }
    }

    let target_tree = store
        .get_tree_at_commit(&target.id)
        .map_err(CommandError::from)?;
    let written = materialize_tree(
        repo.root(),
        &target_tree,
        head_tree.into_iter().map(|f| f.path),
    );
    // HEAD moves only after the tree is on disk.
    store
        .set_head(Some(&target.id))
        .map_err(CommandError::from)?;
    ui.status(format!(
        "Checked out {} ({written} files)",
        short_commit_hash(&target.id)
    ))?;
    Ok(())
}
