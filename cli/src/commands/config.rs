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
use crate::command_error::user_error;
use crate::ui::Ui;

/// Read or write repository configuration
///
/// Known keys: `user.name`, `user.email`, `core.local_db`,
/// `core.database_url`.
#[derive(clap::Args, Clone, Debug)]
pub struct ConfigArgs {
    /// The key to read or write
    #[arg(value_name = "KEY", required_unless_present = "list")]
    key: Option<String>,

    /// The value to set; omit to print the current value
    #[arg(value_name = "VALUE")]
    value: Option<String>,

    /// Print every configured key
    #[arg(long, short)]
    list: bool,
}

pub fn cmd_config(
    ui: &mut Ui,
    command: &CommandHelper,
    args: &ConfigArgs,
) -> Result<(), CommandError> {
    let mut repo = command.repo()?;
    if args.list {
        let mut out = ui.stdout();
        for (key, value) in repo.config().list_keys() {
            writeln!(out, "{key}={value}")?;
        }
        return Ok(());
    }
    let key = args.key.as_deref().expect("clap requires key without --list");
    match &args.value {
        Some(value) => {
            repo.config_mut().set_key(key, value)?;
            repo.save_config()?;
        }
        None => match repo.config().get_key(key)? {
            Some(value) => writeln!(ui.stdout(), "{value}")?,
            None => return Err(user_error(format!("Key {key} is not set"))),
        },
    }
    Ok(())
}
