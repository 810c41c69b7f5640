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

use pgit_lib::revparse;
use pgit_lib::store::Store as _;

use crate::cli_util::CommandHelper;
use crate::cli_util::short_commit_hash;
use crate::command_error::CommandError;
use crate::text_util::format_timestamp;
use crate::ui::Ui;

/// Show the commit history
#[derive(clap::Args, Clone, Debug)]
pub struct LogArgs {
    /// Start from this commit instead of HEAD
    #[arg(value_name = "REF")]
    revision: Option<String>,

    /// Limit the number of commits shown
    #[arg(long, short = 'n', value_name = "COUNT", default_value_t = 25)]
    limit: usize,

    /// One line per commit
    #[arg(long)]
    oneline: bool,
}

pub fn cmd_log(ui: &mut Ui, command: &CommandHelper, args: &LogArgs) -> Result<(), CommandError> {
    let (_repo, store) = command.repo_and_store()?;
    let from = args.revision.as_deref().unwrap_or("HEAD");
    let start = revparse::resolve(store.as_ref(), from)?;
    let commits = store
        .get_commit_log_from(&start.id, args.limit)
        .map_err(CommandError::from)?;

    let mut out = ui.stdout();
    for (position, commit) in commits.iter().enumerate() {
        if args.oneline {
            writeln!(out, "{} {}", short_commit_hash(&commit.id), commit.summary())?;
            continue;
        }
        if position > 0 {
            writeln!(out)?;
        }
        writeln!(out, "commit {}", commit.id)?;
        writeln!(
            out,
            "Author: {} <{}>",
            commit.author.name, commit.author.email
        )?;
        writeln!(out, "Date:   {}", format_timestamp(commit.authored_at))?;
        writeln!(out)?;
        for line in commit.message.lines() {
            writeln!(out, "    {line}")?;
        }
    }
    Ok(())
}
