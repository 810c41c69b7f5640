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

use pgit_lib::store::Store as _;
use regex::bytes::Regex;

use crate::cli_util::CommandHelper;
use crate::command_error::CommandError;
use crate::command_error::user_error;
use crate::ui::Ui;

/// Search file contents at HEAD
///
/// Scans every text file of the current tree; binary files are skipped.
/// History-wide questions are better served by `pgit sql`.
#[derive(clap::Args, Clone, Debug)]
pub struct SearchArgs {
    /// Regular expression to search for
    pattern: String,

    /// Restrict matches to paths containing this substring
    #[arg(long, value_name = "TEXT")]
    path: Option<String>,
}

pub fn cmd_search(
    ui: &mut Ui,
    command: &CommandHelper,
    args: &SearchArgs,
) -> Result<(), CommandError> {
    let (_repo, store) = command.repo_and_store()?;
    let regex = Regex::new(&args.pattern)
        .map_err(|err| user_error(format!("Invalid pattern: {err}")))?;
    let Some(head) = store.get_head().map_err(CommandError::from)? else {
        ui.status("No commits yet")?;
        return Ok(());
    };
    let tree = store.get_tree_at_commit(&head).map_err(CommandError::from)?;

    let mut matches = 0usize;
    let mut out = ui.stdout();
    for file in &tree {
        if file.is_binary {
            continue;
        }
        if let Some(filter) = &args.path
            && !file.path.contains(filter.as_str())
        {
            continue;
        }
        for (line_number, line) in file
            .content
            .as_bytes()
            .split(|&b| b == b'\n')
            .enumerate()
        {
            if regex.is_match(line) {
                matches += 1;
                write!(out, "{}:{}:", file.path, line_number + 1)?;
                out.write_all(line)?;
                writeln!(out)?;
            }
        }
    }
    drop(out);
    if matches == 0 {
        ui.status("No matches")?;
    }
    Ok(())
}
