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

use crate::cli_util::CommandHelper;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Manage the set of remote repositories
#[derive(clap::Subcommand, Clone, Debug)]
pub enum RemoteCommand {
    Add(RemoteAddArgs),
    Remove(RemoteRemoveArgs),
    SetUrl(RemoteSetUrlArgs),
    List(RemoteListArgs),
}

/// Add a remote
#[derive(clap::Args, Clone, Debug)]
pub struct RemoteAddArgs {
    /// The remote's name
    remote: String,
    /// Connection string of the remote repository database
    #[arg(value_hint = clap::ValueHint::Url)]
    url: String,
}

/// Remove a remote
#[derive(clap::Args, Clone, Debug)]
pub struct RemoteRemoveArgs {
    /// The remote's name
    remote: String,
}

/// Change a remote's URL
#[derive(clap::Args, Clone, Debug)]
pub struct RemoteSetUrlArgs {
    /// The remote's name
    remote: String,
    /// The new connection string
    #[arg(value_hint = clap::ValueHint::Url)]
    url: String,
}

/// List remotes with their URLs
#[derive(clap::Args, Clone, Debug)]
pub struct RemoteListArgs {}

pub fn cmd_remote(
    ui: &mut Ui,
    command: &CommandHelper,
    subcommand: &RemoteCommand,
) -> Result<(), CommandError> {
    let mut repo = command.repo()?;
    match subcommand {
        RemoteCommand::Add(args) => {
            repo.add_remote(&args.remote, &args.url)?;
            repo.save_config()?;
            ui.status(format!("Added remote {}", args.remote))?;
        }
        RemoteCommand::Remove(args) => {
            repo.remove_remote(&args.remote)?;
            repo.save_config()?;
            ui.status(format!("Removed remote {}", args.remote))?;
        }
        RemoteCommand::SetUrl(args) => {
            repo.set_remote_url(&args.remote, &args.url)?;
            repo.save_config()?;
            ui.status(format!("Updated remote {}", args.remote))?;
        }
        RemoteCommand::List(_) => {
            let mut out = ui.stdout();
            for (name, url) in &repo.config().remotes {
                writeln!(out, "{name}\t{url}")?;
            }
        }
    }
    Ok(())
}
