// Copyright 2024 The pgit Authors
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

use pgit_lib::annotate::annotate;
use pgit_lib::revparse;

use crate::cli_util::CommandHelper;
use crate::cli_util::repo_relative_path;
use crate::cli_util::short_commit_hash;
use crate::command_error::CommandError;
use crate::command_error::exit_code;
use crate::text_util::format_timestamp;
use crate::ui::Ui;

/// Show which commit last touched each line of a file
#[derive(clap::Args, Clone, Debug)]
pub struct BlameArgs {
    /// The file to annotate
    #[arg(value_hint = clap::ValueHint::FilePath)]
    path: String,

    /// Annotate at this commit instead of HEAD
    #[arg(long, value_name = "REF", default_value = "HEAD")]
    revision: String,
}

pub fn cmd_blame(
    ui: &mut Ui,
    command: &CommandHelper,
    args: &BlameArgs,
) -> Result<(), CommandError> {
    let (repo, store) = command.repo_and_store()?;
    let path = repo_relative_path(&repo, command.cwd(), &args.path)?;
    let at = revparse::resolve(store.as_ref(), &args.revision)?;
    let annotation = annotate(store.as_ref(), &path, &at.id)
        .map_err(CommandError::from)?
        .ok_or_else(|| {
            CommandError::new(
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{path:?} does not exist at {}", short_commit_hash(&at.id)),
                ),
                exit_code::FILE_NOT_FOUND,
            )
        })?;

    let author_width = annotation
        .lines()
        .map(|(commit, _)| commit.author.name.len())
        .max()
        .unwrap_or(0);
    let mut out = ui.stdout();
    for (line_number, (commit, line)) in annotation.lines().enumerate() {
        write!(
            out,
            "{} {:author_width$} {} {:>4}) ",
            short_commit_hash(&commit.id),
            commit.author.name,
            format_timestamp(commit.authored_at),
            line_number + 1,
        )?;
        out.write_all(line)?;
        if !line.ends_with(b"\n") {
            writeln!(out)?;
        }
    }
    Ok(())
}
