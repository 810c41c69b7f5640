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

use pgit_lib::index::StagedStatus;
use pgit_lib::revparse;
use pgit_lib::revparse::ResolveError;
use pgit_lib::store::Store as _;
use pgit_lib::store::TreeFile;
use pgit_lib::working_copy::materialize_tree;

use crate::cli_util::CommandHelper;
use crate::cli_util::short_commit_hash;
use crate::command_error::CommandError;
use crate::command_error::user_error_with_hint;
use crate::ui::Ui;

/// Move HEAD to another commit
///
/// `--soft` moves HEAD and stages the undone changes; `--mixed` (default)
/// moves HEAD and clears the index; `--hard` also rewrites the working tree.
#[derive(clap::Args, Clone, Debug)]
pub struct ResetArgs {
    /// Target commit (defaults to HEAD)
    #[arg(value_name = "REF", default_value = "HEAD")]
    revision: String,

    /// Move HEAD only; the undone changes appear staged
    #[arg(long, conflicts_with_all = ["mixed", "hard"])]
    soft: bool,

    /// Move HEAD and clear the index
    #[arg(long, conflicts_with = "hard")]
    mixed: bool,

    /// Move HEAD, clear the index, and rewrite the working tree
    #[arg(long)]
    hard: bool,
}

pub fn cmd_reset(
    ui: &mut Ui,
    command: &CommandHelper,
    args: &ResetArgs,
) -> Result<(), CommandError> {
    let (repo, store) = command.repo_and_store()?;
    let target = match revparse::resolve(store.as_ref(), &args.revision) {
        Ok(commit) => commit,
        Err(err @ (ResolveError::CommitNotFound(_) | ResolveError::InvalidReference(_))) => {
            // Not a commit: if it names a file, the user meant checkout.
            let on_disk = command.cwd().join(&args.revision).exists();
            if on_disk {
                return Err(user_error_with_hint(
                    format!("{:?} is a path, not a commit", args.revision),
                    format!("To restore the file, use `pgit checkout HEAD {}`", args.revision),
                ));
            }
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    let old_head = store.get_head().map_err(CommandError::from)?;
    let mut index = repo.load_index()?;

    if args.soft {
        // The changes between the target and the old head become the staged
        // set, so the working tree (still at the old state) commits back.
        if let Some(old_head) = &old_head
            && *old_head != target.id
        {
            let old_tree = tree_by_path(store.get_tree_at_commit(old_head)?);
            let target_tree = tree_by_path(store.get_tree_at_commit(&target.id)?);
            for (path, file) in &old_tree {
                match target_tree.get(path) {
                    None => index.stage(path, StagedStatus::New, Some(&file.content_hash)),
                    Some(target_file)
                        if target_file.content_hash != file.content_hash
                            || target_file.mode != file.mode =>
                    {
                        index.stage(path, StagedStatus::Modified, Some(&file.content_hash));
                    }
                    Some(_) => {}
                }
            }
            for path in target_tree.keys() {
                if !old_tree.contains_key(path) {
                    index.stage_delete(path);
                }
            }
        }
    } else {
        index.unstage_all();
    }
    index.save()?;

    if args.hard {
        let previous_paths = match &old_head {
            Some(old_head) => store
                .get_tree_at_commit(old_head)
                .map_err(CommandError::from)?
                .into_iter()
                .map(|f| f.path)
                .collect(),
            None => vec![],
        };
        let target_tree = store
            .get_tree_at_commit(&target.id)
            .map_err(CommandError::from)?;
        materialize_tree(repo.root(), &target_tree, previous_paths);
    }

    store
        .set_head(Some(&target.id))
        .map_err(CommandError::from)?;
    ui.status(format!("HEAD is now at {}", short_commit_hash(&target.id)))?;
    Ok(())
}

fn tree_by_path(tree: Vec<TreeFile>) -> BTreeMap<String, TreeFile> {
    tree.into_iter().map(|f| (f.path.clone(), f)).collect()
}
