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

use pgit_lib::sync;
use pgit_lib::sync::PullOutcome;

use crate::cli_util::CommandHelper;
use crate::command_error::CommandError;
use crate::command_error::exit_code;
use crate::ui::Ui;

/// Fetch and integrate commits from a remote repository
///
/// A diverged history is merged three-way by default; `--rebase` instead
/// replays the local commits on top of the remote history with fresh
/// identities.
#[derive(clap::Args, Clone, Debug)]
pub struct PullArgs {
    /// The remote to pull from
    #[arg(default_value = "origin")]
    remote: String,

    /// Replay local commits on top of the remote history
    #[arg(long)]
    rebase: bool,
}

pub fn cmd_pull(ui: &mut Ui, command: &CommandHelper, args: &PullArgs) -> Result<(), CommandError> {
    let repo = command.repo()?;
    // A typo'd remote name fails before anything is dialed.
    let remote = command.remote_store(&repo, &args.remote)?;
    let store = repo.open_store()?;
    let outcome = sync::pull(
        &repo,
        store.as_ref(),
        remote.as_ref(),
        &args.remote,
        args.rebase,
        command.cancel(),
    )?;
    match outcome {
        PullOutcome::UpToDate => ui.status("Already up to date")?,
        PullOutcome::LocalAhead => {
            ui.status("Local repository is ahead of the remote")?;
            ui.hint(format!("Publish your commits with `pgit push {}`", args.remote))?;
        }
        PullOutcome::FastForward { commits } => {
            ui.status(format!("Fast-forwarded {commits} commit(s)"))?;
        }
        PullOutcome::Merged {
            auto_merged,
            conflicted,
        } => {
            if conflicted.is_empty() {
                ui.status(format!(
                    "Merged diverged history ({auto_merged} file(s) auto-merged)"
                ))?;
                ui.hint("Review the working tree, then `pgit add` and `pgit commit`")?;
            } else {
                ui.status(format!(
                    "Merge produced {} conflict(s):",
                    conflicted.len()
                ))?;
                for path in &conflicted {
                    ui.status(format!("  both modified: {path}"))?;
                }
                ui.hint("Fix the conflict markers, `pgit add` the files, then `pgit commit`")?;
                return Err(CommandError::new(
                    sync::SyncError::UnresolvedConflicts { paths: conflicted },
                    exit_code::UNRESOLVED_CONFLICTS,
                ));
            }
        }
        PullOutcome::Rebased { pulled, replayed } => {
            ui.status(format!(
                "Pulled {pulled} commit(s) and replayed {replayed} local commit(s)"
            ))?;
        }
    }
    Ok(())
}
