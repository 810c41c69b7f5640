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

//! The commit engine: turns the staged set into a commit, its file_refs, and
//! content rows, then advances HEAD. Everything except the index clear
//! happens inside one database transaction, so a failure leaves the
//! repository exactly as it was.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::file_util::IoResultExt as _;
use crate::file_util::PathError;
use crate::index::Index;
use crate::index::IndexError;
use crate::index::StagedStatus;
use crate::repo::MergeState;
use crate::store::BlobPayload;
use crate::store::BlobWrite;
use crate::store::Commit;
use crate::store::FileMode;
use crate::store::Signature;
use crate::store::Store;
use crate::store::StoreError;
use crate::ulid::CommitId;
use crate::working_copy::to_fs_path;

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("Nothing to commit; stage changes with `pgit add` first")]
    NothingToCommit,
    #[error("Unresolved conflicts in: {}", paths.join(", "))]
    UnresolvedConflicts { paths: Vec<String> },
    #[error("Staged file {0} is missing from the working tree")]
    FileMissing(String),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Inputs for one commit beyond the staged set itself.
pub struct CommitParams {
    pub message: String,
    /// Author override (`--author`); the committer is always the configured
    /// identity.
    pub author: Option<Signature>,
    /// Pending merge to record; its conflicted paths must all be staged.
    pub merge_state: Option<MergeState>,
}

/// Creates a commit from the staged set, updates HEAD, and clears the index.
#[tracing::instrument(skip_all)]
pub fn commit_staged(
    store: &dyn Store,
    root: &Path,
    index: &mut Index,
    committer: Signature,
    params: CommitParams,
) -> Result<Commit, CommitError> {
    if index.is_empty() {
        return Err(CommitError::NothingToCommit);
    }
    if let Some(merge_state) = &params.merge_state {
        let unresolved: Vec<String> = merge_state
            .conflicted_paths
            .iter()
            .filter(|path| index.get(path).is_none())
            .cloned()
            .collect();
        if !unresolved.is_empty() {
            return Err(CommitError::UnresolvedConflicts { paths: unresolved });
        }
    }

    let parent_id = store.get_head()?;
    let now_ms = chrono::Utc::now().timestamp_millis();
    let id = next_commit_id(store, now_ms)?;

    let mut message = params.message;
    if let Some(merge_state) = &params.merge_state {
        // Linear history keeps a single parent pointer; the merged remote
        // head is recorded as a message trailer instead.
        if !message.ends_with('\n') {
            message.push('\n');
        }
        message.push_str(&format!(
            "\nMerged-remote: {} {}\n",
            merge_state.remote_name, merge_state.remote_head
        ));
    }

    let mut blobs: Vec<BlobWrite> = vec![];
    let mut changes: Vec<(String, FileMode, bool)> = vec![];
    for (path, change) in index.staged_changes() {
        let (mode, payload) = match change.status {
            StagedStatus::Deleted => (previous_mode(store, path, parent_id.as_ref())?, BlobPayload::Delete),
            _ => read_staged_file(root, path)?,
        };
        changes.push((path.to_owned(), mode, matches!(payload, BlobPayload::Delete)));
        blobs.push(BlobWrite {
            path: path.to_owned(),
            commit_id: id.clone(),
            mode,
            payload,
        });
    }

    let author = params.author.unwrap_or_else(|| committer.clone());
    let commit = Commit {
        id,
        parent_id,
        tree_hash: Commit::hash_changes(
            changes
                .iter()
                .map(|(path, mode, deleted)| (path.as_str(), *mode, *deleted)),
        ),
        message,
        author,
        authored_at: now_ms,
        committer,
        committed_at: now_ms,
    };

    store.in_transaction(&mut |store| {
        store.create_commit(&commit)?;
        store.create_blobs(&blobs)?;
        store.set_head(Some(&commit.id))
    })?;

    index.unstage_all();
    index.save()?;
    Ok(commit)
}

/// A fresh id for the current wall clock, nudged forward when the clock sits
/// at or behind the newest stored commit.
fn next_commit_id(store: &dyn Store, now_ms: i64) -> Result<CommitId, StoreError> {
    let id = CommitId::generate_with_time(now_ms.max(0) as u64);
    match store.max_commit_id()? {
        Some(max) if id <= max => Ok(CommitId::generate_with_time(max.timestamp_ms() + 1)),
        _ => Ok(id),
    }
}

fn previous_mode(
    store: &dyn Store,
    path: &str,
    parent: Option<&CommitId>,
) -> Result<FileMode, CommitError> {
    let Some(parent) = parent else {
        return Ok(FileMode::Normal);
    };
    Ok(store
        .get_file_at_commit(path, parent)?
        .map_or(FileMode::Normal, |f| f.mode))
}

fn read_staged_file(root: &Path, path: &str) -> Result<(FileMode, BlobPayload), CommitError> {
    let Some(disk_path) = to_fs_path(root, path) else {
        return Err(CommitError::FileMissing(path.to_owned()));
    };
    let metadata = match disk_path.symlink_metadata() {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(CommitError::FileMissing(path.to_owned()));
        }
        Err(err) => {
            return Err(PathError {
                path: disk_path,
                source: err,
            }
            .into());
        }
    };
    if metadata.file_type().is_symlink() {
        let target = fs::read_link(&disk_path).context(&disk_path)?;
        Ok((
            FileMode::Symlink,
            BlobPayload::Symlink(target.to_string_lossy().into_owned()),
        ))
    } else {
        let data = fs::read(&disk_path).context(&disk_path)?;
        Ok((staged_file_mode(&metadata), BlobPayload::Data(data)))
    }
}

#[cfg(unix)]
fn staged_file_mode(metadata: &fs::Metadata) -> FileMode {
    use std::os::unix::fs::PermissionsExt as _;
    if metadata.permissions().mode() & 0o111 != 0 {
        FileMode::Executable
    } else {
        FileMode::Normal
    }
}

#[cfg(windows)]
fn staged_file_mode(_metadata: &fs::Metadata) -> FileMode {
    FileMode::Normal
}
