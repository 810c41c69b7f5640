// Copyright 2023-2024 The pgit Authors
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

//! Shared state handed to every command.

use std::path::Path;
use std::path::PathBuf;

use pgit_lib::cancel::CancellationToken;
use pgit_lib::repo::Repository;
use pgit_lib::store::PgStore;
use pgit_lib::store::Store;
use pgit_lib::ulid::CommitId;

use crate::command_error::CommandError;

pub struct CommandHelper {
    cwd: PathBuf,
    cancel: CancellationToken,
}

impl CommandHelper {
    pub fn new(cwd: PathBuf, cancel: CancellationToken) -> Self {
        Self { cwd, cancel }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Finds the repository containing the working directory.
    pub fn repo(&self) -> Result<Repository, CommandError> {
        Ok(Repository::find(&self.cwd)?)
    }

    /// Repository plus a connection to its own database.
    pub fn repo_and_store(&self) -> Result<(Repository, Box<dyn Store>), CommandError> {
        let repo = self.repo()?;
        let store = repo.open_store()?;
        Ok((repo, store))
    }

    /// Connects to a named remote of the repository.
    pub fn remote_store(
        &self,
        repo: &Repository,
        remote_name: &str,
    ) -> Result<Box<dyn Store>, CommandError> {
        let url = repo.remote_url(remote_name)?;
        Ok(Box::new(PgStore::connect(&url)?))
    }
}

/// Display form of a commit id in summaries.
pub fn short_commit_hash(id: &CommitId) -> String {
    id.short()
}

/// Converts a user-supplied path argument (relative to the invocation
/// directory) into the repo-relative slash form stored in the database.
pub fn repo_relative_path(
    repo: &Repository,
    cwd: &Path,
    arg: &str,
) -> Result<String, CommandError> {
    let absolute = pgit_lib::file_util::normalize_path(&cwd.join(arg));
    let relative = absolute.strip_prefix(repo.root()).map_err(|_| {
        crate::command_error::user_error(format!(
            "Path {arg:?} is outside the repository at {}",
            repo.root().display()
        ))
    })?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Whether `path` equals `prefix` or lives under it. An empty prefix (the
/// repository root) matches everything.
pub fn path_matches_prefix(path: &str, prefix: &str) -> bool {
    prefix.is_empty() || path == prefix || path.starts_with(&format!("{prefix}/"))
}
