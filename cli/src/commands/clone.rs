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
use pgit_lib::store::PgStore;
use pgit_lib::sync;

use crate::cli_util::CommandHelper;
use crate::command_error::CommandError;
use crate::command_error::user_error;
use crate::ui::Ui;

/// Clone a remote repository
///
/// Creates the directory, initializes a local repository database, pulls the
/// whole history, and checks out the working tree. The remote is registered
/// as `origin`.
#[derive(clap::Args, Clone, Debug)]
pub struct CloneArgs {
    /// Connection string of the remote repository database
    #[arg(value_hint = clap::ValueHint::Url)]
    url: String,

    /// Destination directory (defaults to the remote database name)
    #[arg(value_hint = clap::ValueHint::DirPath)]
    destination: Option<PathBuf>,
}

pub fn cmd_clone(
    ui: &mut Ui,
    command: &CommandHelper,
    args: &CloneArgs,
) -> Result<(), CommandError> {
    let name = args
        .destination
        .clone()
        .or_else(|| dir_from_url(&args.url).map(PathBuf::from))
        .ok_or_else(|| user_error("Cannot derive a directory name from the URL; pass one"))?;
    let destination = command.cwd().join(name);
    if destination.exists() && destination.read_dir()?.next().is_some() {
        return Err(user_error(format!(
            "Destination {} exists and is not empty",
            destination.display()
        )));
    }
    std::fs::create_dir_all(&destination)?;

    let remote = PgStore::connect(&args.url).map_err(CommandError::from)?;

    let mut config = RepoConfig::default();
    config.seed_identity();
    config.core.local_db = Some(super::init::default_db_name(&destination));
    config
        .remotes
        .insert("origin".to_owned(), args.url.clone());
    let repo = Repository::init(&destination, config)?;
    let local = repo.open_store()?;
    let pulled = sync::clone_into(&repo, local.as_ref(), &remote, "origin", command.cancel())?;
    ui.status(format!(
        "Cloned {pulled} commits into {}",
        repo.root().display()
    ))?;
    Ok(())
}

/// Last path segment of the connection string, if usable as a directory.
fn dir_from_url(url: &str) -> Option<&str> {
    let tail = url.rsplit('/').next()?;
    let tail = tail.split('?').next()?;
    (!tail.is_empty() && !tail.contains(':')).then_some(tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_from_url() {
        assert_eq!(
            dir_from_url("postgres://u:p@host:5432/myrepo"),
            Some("myrepo")
        );
        assert_eq!(
            dir_from_url("postgres://host/db?sslmode=disable"),
            Some("db")
        );
        assert_eq!(dir_from_url("postgres://host:5432"), None);
    }
}
