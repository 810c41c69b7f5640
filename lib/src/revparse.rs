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

//! Commit reference resolution.
//!
//! Accepted forms: `HEAD`, `HEAD~N`, `HEAD^` (with `^{N}`/`^N` counting the
//! same way in a linear history), a full 26-character id, an id prefix, or
//! the 7-character short suffix. Partial forms need at least four characters
//! to keep collisions rare.

use thiserror::Error;

use crate::store::Commit;
use crate::store::Store;
use crate::store::StoreError;
use crate::ulid::CommitId;
use crate::ulid::ULID_LEN;

/// Minimum length accepted for a partial id.
pub const MIN_PARTIAL_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No commits yet")]
    NoCommits,
    #[error("Invalid reference {0:?}")]
    InvalidReference(String),
    #[error("Reference {0:?} does not name a commit")]
    CommitNotFound(String),
    #[error("Reference {reference:?} is ambiguous; candidates: {}", candidates.join(", "))]
    Ambiguous {
        reference: String,
        candidates: Vec<String>,
    },
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ResolveError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AmbiguousCommitId { candidates } => Self::Ambiguous {
                reference: String::new(),
                candidates,
            },
            other => Self::Store(other),
        }
    }
}

/// Resolves `reference` against the store's history.
pub fn resolve(store: &dyn Store, reference: &str) -> Result<Commit, ResolveError> {
    // A reference starting with HEAD could in principle also be an id
    // prefix (H, E, A, D are all base32 digits), so an unparsable ancestry
    // suffix falls through to id resolution.
    if let Some(suffix) = reference.strip_prefix("HEAD")
        && let Some(steps) = parse_ancestry(suffix)
    {
        let head = store.get_head()?.ok_or(ResolveError::NoCommits)?;
        let mut commit = store.get_commit(&head)?;
        for _ in 0..steps {
            let parent = commit
                .parent_id
                .clone()
                .ok_or_else(|| ResolveError::CommitNotFound(reference.to_owned()))?;
            commit = store.get_commit(&parent)?;
        }
        return Ok(commit);
    }

    if reference.len() == ULID_LEN
        && let Some(id) = CommitId::try_from_string(reference)
    {
        return match store.get_commit(&id) {
            Ok(commit) => Ok(commit),
            Err(StoreError::CommitNotFound(_)) => {
                Err(ResolveError::CommitNotFound(reference.to_owned()))
            }
            Err(err) => Err(err.into()),
        };
    }

    if reference.len() >= MIN_PARTIAL_LEN && reference.len() <= ULID_LEN {
        return match store.find_commit_by_partial_id(reference) {
            Ok(Some(commit)) => Ok(commit),
            Ok(None) => Err(ResolveError::CommitNotFound(reference.to_owned())),
            Err(StoreError::AmbiguousCommitId { candidates }) => Err(ResolveError::Ambiguous {
                reference: reference.to_owned(),
                candidates,
            }),
            Err(err) => Err(err.into()),
        };
    }

    Err(ResolveError::InvalidReference(reference.to_owned()))
}

/// Parses the ancestry operators following `HEAD`: any sequence of `~`/`^`,
/// each optionally followed by a count (`^{N}` braces allowed). Returns the
/// total number of steps back, or `None` for malformed input.
fn parse_ancestry(suffix: &str) -> Option<u32> {
    let mut steps: u32 = 0;
    let mut rest = suffix;
    while !rest.is_empty() {
        let op = rest.chars().next().unwrap();
        if op != '~' && op != '^' {
            return None;
        }
        rest = &rest[1..];
        let braced = rest.starts_with('{');
        if braced {
            rest = &rest[1..];
        }
        let digits_len = rest.chars().take_while(char::is_ascii_digit).count();
        let count = if digits_len == 0 {
            1
        } else {
            rest[..digits_len].parse().ok()?
        };
        rest = &rest[digits_len..];
        if braced {
            rest = rest.strip_prefix('}')?;
        }
        steps = steps.checked_add(count)?;
    }
    Some(steps)
}
