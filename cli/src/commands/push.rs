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
use pgit_lib::sync::PushOutcome;

use crate::cli_util::CommandHelper;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Push local commits to a remote repository
#[derive(clap::Args, Clone, Debug)]
pub struct PushArgs {
    /// The remote to push to
    #[arg(default_value = "origin")]
    remote: String,

    /// Discard diverged remote commits and replace them with local history
    #[arg(long, short)]
    force: bool,
}

pub fn cmd_push(ui: &mut Ui, command: &CommandHelper, args: &PushArgs) -> Result<(), CommandError> {
    let repo = command.repo()?;
    // A typo'd remote name fails before anything is dialed.
    let remote = command.remote_store(&repo, &args.remote)?;
    let store = repo.open_store()?;
    let outcome = sync::push(
        store.as_ref(),
        remote.as_ref(),
        &args.remote,
        args.force,
        command.cancel(),
    )?;
    match outcome {
        PushOutcome::UpToDate => ui.status("Everything up to date")?,
        PushOutcome::Pushed { commits } => {
            ui.status(format!("Pushed {commits} commit(s) to {}", args.remote))?;
        }
        PushOutcome::ForcePushed { commits, discarded } => {
            ui.status(format!(
                "Force-pushed {commits} commit(s) to {}, discarding {discarded}",
                args.remote
            ))?;
        }
    }
    Ok(())
}
