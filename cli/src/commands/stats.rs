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

use crate::cli_util::CommandHelper;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Show repository size and compression statistics
#[derive(clap::Args, Clone, Debug)]
pub struct StatsArgs {}

pub fn cmd_stats(
    ui: &mut Ui,
    command: &CommandHelper,
    _args: &StatsArgs,
) -> Result<(), CommandError> {
    let (_repo, store) = command.repo_and_store()?;
    let stats = store.get_repo_stats_fast().map_err(CommandError::from)?;

    let mut out = ui.stdout();
    writeln!(out, "Commits:        {}", stats.commit_count)?;
    writeln!(out, "Paths:          {}", stats.path_count)?;
    writeln!(out, "File versions:  {}", stats.file_ref_count)?;
    writeln!(out, "Content bytes:  {}", format_bytes(stats.content_bytes))?;
    writeln!(out)?;
    for table in ["pgit_commits", "pgit_content"] {
        let xpatch = store.get_xpatch_stats(table).map_err(CommandError::from)?;
        writeln!(
            out,
            "{table}: {} rows, {} logical, {} stored ({:.1}x)",
            xpatch.row_count,
            format_bytes(xpatch.logical_bytes),
            format_bytes(xpatch.stored_bytes),
            xpatch.compression_ratio()
        )?;
    }
    Ok(())
}

fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }
}
