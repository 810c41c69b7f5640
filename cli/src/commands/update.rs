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

use crate::cli_util::CommandHelper;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Show the installed version and how to update
///
/// Replacing the binary is the installer's job; this command only reports.
#[derive(clap::Args, Clone, Debug)]
pub struct UpdateArgs {}

pub fn cmd_update(
    ui: &mut Ui,
    _command: &CommandHelper,
    _args: &UpdateArgs,
) -> Result<(), CommandError> {
    ui.status(format!("pgit {}", env!("CARGO_PKG_VERSION")))?;
    ui.hint("Update with your installer, e.g. `cargo install pgit-cli` or your package manager")?;
    Ok(())
}
