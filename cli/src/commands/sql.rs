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

use pgit_lib::store::PgStore;
use pgit_lib::store::SqlOutput;

use crate::cli_util::CommandHelper;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Run a SQL statement against the repository database
///
/// The schema is documented under the `pgit_` table prefix. Writes are not
/// prevented; altering chain tables by hand can corrupt the repository.
#[derive(clap::Args, Clone, Debug)]
pub struct SqlArgs {
    /// The statement to run
    query: String,
}

pub fn cmd_sql(ui: &mut Ui, command: &CommandHelper, args: &SqlArgs) -> Result<(), CommandError> {
    let repo = command.repo()?;
    let store = PgStore::connect(&repo.database_url()?).map_err(CommandError::from)?;
    let output = store.run_sql(&args.query).map_err(CommandError::from)?;
    print_table(ui, &output)?;
    Ok(())
}

fn print_table(ui: &mut Ui, output: &SqlOutput) -> Result<(), CommandError> {
    if output.columns.is_empty() {
        if let Some(count) = output.rows_affected {
            ui.status(format!("{count} row(s) affected"))?;
        }
        return Ok(());
    }
    // Column widths sized to the widest cell.
    let mut widths: Vec<usize> = output.columns.iter().map(String::len).collect();
    for row in &output.rows {
        for (index, cell) in row.iter().enumerate() {
            let len = cell.as_deref().unwrap_or("NULL").len();
            widths[index] = widths[index].max(len);
        }
    }
    let mut out = ui.stdout();
    for (index, column) in output.columns.iter().enumerate() {
        write!(out, "{:width$}  ", column, width = widths[index])?;
    }
    writeln!(out)?;
    for (index, _) in output.columns.iter().enumerate() {
        write!(out, "{}  ", "-".repeat(widths[index]))?;
    }
    writeln!(out)?;
    for row in &output.rows {
        for (index, cell) in row.iter().enumerate() {
            write!(
                out,
                "{:width$}  ",
                cell.as_deref().unwrap_or("NULL"),
                width = widths[index]
            )?;
        }
        writeln!(out)?;
    }
    writeln!(out, "({} rows)", output.rows.len())?;
    Ok(())
}
