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

use std::path::PathBuf;

use pgit_lib::config::RepoConfig;
use pgit_lib::repo::Repository;
use pgit_lib::store::Store as _;

use crate::cli_util::CommandHelper;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Create a new repository in the given directory
///
/// The working directory gets a `.pgit/` metadata directory; the versioned
/// data itself lives in the repository database.
#[derive(clap::Args, Clone, Debug)]
pub struct InitArgs {
    /// Where to create the repository
    #[arg(default_value = ".", value_hint = clap::ValueHint::DirPath)]
    destination: PathBuf,

    /// Database name for the local container (defaults to the directory
    /// name)
    #[arg(long, value_name = "NAME")]
    db: Option<String>,

    /// Full connection string instead of a local-container database
    #[arg(long, value_name = "URL", conflicts_with = "db")]
    database_url: Option<String>,
}

pub fn cmd_init(
    ui: &mut Ui,
    command: &CommandHelper,
    args: &InitArgs,
) -> Result<(), CommandError> {
    let destination = command.cwd().join(&args.destination);
    std::fs::create_dir_all(&destination)?;

    let mut config = RepoConfig::default();
    config.seed_identity();
    if let Some(url) = &args.database_url {
        config.core.database_url = Some(url.clone());
    } else {
        let db = match &args.db {
            Some(db) => db.clone(),
            None => default_db_name(&destination),
        };
        config.core.local_db = Some(db);
    }
    let repo = Repository::init(&destination, config)?;

    match repo.open_store() {
        Ok(store) => {
            if !store.schema_exists().map_err(CommandError::from)? {
                store.init_schema().map_err(CommandError::from)?;
            }
            ui.status(format!(
                "Initialized pgit repository in {}",
                repo.root().display()
            ))?;
        }
        Err(err) => {
            ui.status(format!(
                "Initialized pgit repository in {}",
                repo.root().display()
            ))?;
            ui.warning(format!("Could not reach the database yet: {err}"))?;
            ui.hint("Start one with `pgit local start`, then run any command to create the schema")?;
        }
    }
    Ok(())
}

/// A database identifier derived from the directory name: lowercased, with
/// anything outside `[a-z0-9_]` squashed to underscores.
pub(crate) fn default_db_name(path: &std::path::Path) -> String {
    let raw = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "repo".to_owned());
    let mut name: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if name.chars().next().is_none_or(|c| c.is_ascii_digit()) {
        name.insert(0, 'r');
    }
    format!("pgit_{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_db_name() {
        assert_eq!(default_db_name(std::path::Path::new("/x/My-Repo")), "pgit_my_repo");
        assert_eq!(default_db_name(std::path::Path::new("/x/2fast")), "pgit_r2fast");
    }
}
