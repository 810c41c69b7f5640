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

//! Error type carried out of every command, with user hints and the exit
//! code contract of the CLI.

use std::error;
use std::fmt;
use std::io;

use pgit_lib::commit::CommitError;
use pgit_lib::config::ConfigError;
use pgit_lib::file_util::PathError;
use pgit_lib::import::ImportError;
use pgit_lib::index::IndexError;
use pgit_lib::repo::RepoError;
use pgit_lib::revparse::ResolveError;
use pgit_lib::store::StoreError;
use pgit_lib::sync::SyncError;
use pgit_lib::working_copy::WorkingCopyError;

/// Exit codes promised by the CLI surface.
pub mod exit_code {
    pub const SUCCESS: u8 = 0;
    pub const GENERIC: u8 = 1;
    pub const NO_COMMITS: u8 = 2;
    pub const FILE_NOT_FOUND: u8 = 3;
    pub const AMBIGUOUS_REFERENCE: u8 = 4;
    pub const UNCOMMITTED_CHANGES: u8 = 5;
    pub const NON_FAST_FORWARD: u8 = 6;
    pub const UNRESOLVED_CONFLICTS: u8 = 7;
    pub const NO_CONTAINER_RUNTIME: u8 = 8;
}

type BoxedError = Box<dyn error::Error + Send + Sync>;

/// A command failure: the underlying error, up to a few suggested commands,
/// and the exit code to report.
#[derive(Debug)]
pub struct CommandError {
    err: BoxedError,
    hints: Vec<String>,
    exit_code: u8,
}

impl CommandError {
    pub fn new(err: impl Into<BoxedError>, exit_code: u8) -> Self {
        Self {
            err: err.into(),
            hints: vec![],
            exit_code,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    pub fn hints(&self) -> &[String] {
        &self.hints
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn error_chain(&self) -> impl Iterator<Item = &dyn error::Error> {
        let mut next = self.err.source();
        std::iter::from_fn(move || {
            let current = next?;
            next = current.source();
            Some(current)
        })
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.err.fmt(f)
    }
}

/// A plain user-facing error with the generic exit code.
pub fn user_error(err: impl Into<BoxedError>) -> CommandError {
    CommandError::new(err, exit_code::GENERIC)
}

pub fn user_error_with_hint(err: impl Into<BoxedError>, hint: impl Into<String>) -> CommandError {
    user_error(err).with_hint(hint)
}

impl From<io::Error> for CommandError {
    fn from(err: io::Error) -> Self {
        user_error(err)
    }
}

impl From<PathError> for CommandError {
    fn from(err: PathError) -> Self {
        user_error(err)
    }
}

impl From<ConfigError> for CommandError {
    fn from(err: ConfigError) -> Self {
        user_error(err)
    }
}

impl From<IndexError> for CommandError {
    fn from(err: IndexError) -> Self {
        user_error(err)
    }
}

impl From<WorkingCopyError> for CommandError {
    fn from(err: WorkingCopyError) -> Self {
        user_error(err)
    }
}

impl From<RepoError> for CommandError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Store(store_err) => store_err.into(),
            RepoError::NotARepository(_) => {
                user_error_with_hint(err, "Run `pgit init` to create a repository here")
            }
            RepoError::NoDatabase => user_error(err)
                .with_hint("Run `pgit local start` to launch a local database")
                .with_hint("Or set one explicitly: `pgit config core.database_url <url>`"),
            RepoError::RemoteNotFound(ref name) => {
                let hint = format!("Add it first: `pgit remote add {name} <url>`");
                user_error_with_hint(err, hint)
            }
            RepoError::RemoteAlreadyExists(ref name) => {
                let hint = format!("Change its URL instead: `pgit remote set-url {name} <url>`");
                user_error_with_hint(err, hint)
            }
            _ => user_error(err),
        }
    }
}

fn store_exit_code(err: &StoreError) -> u8 {
    match err {
        StoreError::CommitNotFound(_) => exit_code::FILE_NOT_FOUND,
        StoreError::AmbiguousCommitId { .. } => exit_code::AMBIGUOUS_REFERENCE,
        _ => exit_code::GENERIC,
    }
}

impl From<StoreError> for CommandError {
    fn from(err: StoreError) -> Self {
        let code = store_exit_code(&err);
        match &err {
            StoreError::Connection(_) => CommandError::new(err, code)
                .with_hint("Is the database running? Try `pgit local status`")
                .with_hint("Check the URL with `pgit config core.database_url`"),
            StoreError::SchemaMissing => {
                CommandError::new(err, code).with_hint("Run `pgit init` to create the schema")
            }
            _ => CommandError::new(err, code),
        }
    }
}

impl From<CommitError> for CommandError {
    fn from(err: CommitError) -> Self {
        match &err {
            CommitError::NothingToCommit => {
                user_error_with_hint(err, "Stage changes first: `pgit add <path>`")
            }
            CommitError::UnresolvedConflicts { .. } => {
                CommandError::new(err, exit_code::UNRESOLVED_CONFLICTS)
                    .with_hint("Edit the conflicted files, then `pgit add` them")
                    .with_hint("`pgit status` lists the remaining conflicts")
            }
            CommitError::FileMissing(_) => CommandError::new(err, exit_code::FILE_NOT_FOUND),
            _ => user_error(err),
        }
    }
}

impl From<SyncError> for CommandError {
    fn from(err: SyncError) -> Self {
        match &err {
            SyncError::NoCommits => CommandError::new(err, exit_code::NO_COMMITS),
            SyncError::NonFastForward => CommandError::new(err, exit_code::NON_FAST_FORWARD)
                .with_hint("Integrate the remote first: `pgit pull`")
                .with_hint("Or overwrite it: `pgit push --force`"),
            SyncError::UnresolvedConflicts { .. } => {
                CommandError::new(err, exit_code::UNRESOLVED_CONFLICTS)
                    .with_hint("Resolve the conflicts and commit before pulling again")
            }
            _ => user_error(err),
        }
    }
}

impl From<ResolveError> for CommandError {
    fn from(err: ResolveError) -> Self {
        match &err {
            ResolveError::NoCommits => CommandError::new(err, exit_code::NO_COMMITS),
            ResolveError::Ambiguous { .. } => {
                CommandError::new(err, exit_code::AMBIGUOUS_REFERENCE)
                    .with_hint("Give more characters of the id")
            }
            ResolveError::CommitNotFound(_) | ResolveError::InvalidReference(_) => {
                CommandError::new(err, exit_code::FILE_NOT_FOUND)
            }
            ResolveError::Store(_) => user_error(err),
        }
    }
}

impl From<ImportError> for CommandError {
    fn from(err: ImportError) -> Self {
        match &err {
            ImportError::RepositoryNotEmpty | ImportError::Incomplete(_) => user_error(err)
                .with_hint("Continue a stopped import: `pgit import --resume`")
                .with_hint("Or start over: `pgit import --force`"),
            ImportError::AlreadyComplete => {
                user_error_with_hint(err, "Reimport from scratch: `pgit import --force`")
            }
            _ => user_error(err),
        }
    }
}
