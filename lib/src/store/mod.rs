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

//! The storage gateway: typed operations over the repository tables.
//!
//! Two chain tables (`pgit_commits`, `pgit_content`) live in the append-only
//! delta-compressed xpatch extension; rows must arrive in chain order and may
//! only be deleted as a suffix. The remaining tables are ordinary heap tables
//! serving as a secondary index into the chains. [`Store`] is the contract
//! every engine programs against; `PgStore` implements it over PostgreSQL and
//! `MemStore` implements it in memory with the same invariants for tests.

mod memory;
mod postgres;

use std::collections::HashMap;

use thiserror::Error;

pub use self::memory::MemStore;
pub use self::postgres::PgStore;
pub use self::postgres::SqlOutput;
use crate::content_hash::ContentHash;
use crate::ulid::CommitId;

/// Identifies one logical file history (one delta chain) in the content
/// table. Allocated on first reference of a path and never recycled.
pub type GroupId = i32;

/// Name and address of a commit participant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

/// An immutable commit record. `authored_at`/`committed_at` are milliseconds
/// since the Unix epoch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub id: CommitId,
    pub parent_id: Option<CommitId>,
    pub tree_hash: ContentHash,
    pub message: String,
    pub author: Signature,
    pub authored_at: i64,
    pub committer: Signature,
    pub committed_at: i64,
}

impl Commit {
    /// First line of the message, for one-line log formats.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    /// Digest of the change set recorded by a commit: the sorted list of
    /// touched paths with their modes and delete flags. Computable before any
    /// content is hashed, which the import engine requires.
    pub fn hash_changes<'a>(
        changes: impl IntoIterator<Item = (&'a str, FileMode, bool)>,
    ) -> ContentHash {
        let mut entries: Vec<String> = changes
            .into_iter()
            .map(|(path, mode, deleted)| {
                format!("{path}\0{:o}\0{}", mode.to_raw(), u8::from(deleted))
            })
            .collect();
        entries.sort_unstable();
        ContentHash::of_bytes(entries.join("\n").as_bytes())
    }
}

/// File kind and permission as stored per file_ref.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileMode {
    Normal,
    Executable,
    Symlink,
}

impl FileMode {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0o120000 => Self::Symlink,
            0o100755 => Self::Executable,
            _ => Self::Normal,
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            Self::Normal => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
        }
    }

    pub fn is_symlink(self) -> bool {
        self == Self::Symlink
    }
}

/// One row of the file_refs table: the membership of a path version in a
/// commit. An absent `content_hash` records a deletion at that commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRef {
    pub group_id: GroupId,
    pub commit_id: CommitId,
    pub version_id: i32,
    pub content_hash: Option<ContentHash>,
    pub mode: FileMode,
    pub is_binary: bool,
}

impl FileRef {
    pub fn is_deleted(&self) -> bool {
        self.content_hash.is_none()
    }
}

/// Payload of a new file version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlobPayload {
    /// Regular file content.
    Data(Vec<u8>),
    /// Symlink target path.
    Symlink(String),
    /// The path ceases to exist at this commit.
    Delete,
}

/// A file change to append: resolves to one file_ref plus, unless a delete,
/// one content (or symlink target) row.
#[derive(Clone, Debug)]
pub struct BlobWrite {
    pub path: String,
    pub commit_id: CommitId,
    pub mode: FileMode,
    pub payload: BlobPayload,
}

impl BlobWrite {
    pub fn content_hash(&self) -> Option<ContentHash> {
        match &self.payload {
            BlobPayload::Data(data) => Some(ContentHash::of_bytes(data)),
            BlobPayload::Symlink(target) => Some(ContentHash::of_bytes(target.as_bytes())),
            BlobPayload::Delete => None,
        }
    }
}

/// A live file in a materialized tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeFile {
    pub path: String,
    pub group_id: GroupId,
    pub version_id: i32,
    pub content_hash: ContentHash,
    pub mode: FileMode,
    pub is_binary: bool,
    pub content: TreeFileContent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeFileContent {
    Data(Vec<u8>),
    Symlink(String),
}

impl TreeFileContent {
    /// Bytes as compared and merged; a symlink contributes its target path.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Data(data) => data,
            Self::Symlink(target) => target.as_bytes(),
        }
    }
}

/// A file change recorded at one specific commit, with its content when the
/// change was not a deletion. This is what push/pull replicates.
#[derive(Clone, Debug)]
pub struct ChangedBlob {
    pub path: String,
    pub file_ref: FileRef,
    pub payload: BlobPayload,
}

/// Repository totals from the heap tables.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RepoStats {
    pub commit_count: i64,
    pub path_count: i64,
    pub file_ref_count: i64,
    pub content_bytes: i64,
}

/// Chain-table size and compression figures reported by the xpatch extension.
#[derive(Clone, Debug, PartialEq)]
pub struct XpatchStats {
    pub table: String,
    pub row_count: i64,
    pub logical_bytes: i64,
    pub stored_bytes: i64,
}

impl XpatchStats {
    pub fn compression_ratio(&self) -> f64 {
        if self.stored_bytes == 0 {
            1.0
        } else {
            self.logical_bytes as f64 / self.stored_bytes as f64
        }
    }
}

/// Import checkpoint recorded in the metadata table.
pub const META_IMPORT_STATE: &str = "import_state";
pub const META_IMPORT_BRANCH: &str = "import_branch";
pub const META_IMPORT_EXPECTED_COMMITS: &str = "import_expected_commits";

pub const IMPORT_STATE_COMMITS_DONE: &str = "commits_done";
pub const IMPORT_STATE_COMPLETE: &str = "complete";

/// Hard ceiling on parallel import workers, matching the xpatch insert-cache
/// slot count.
pub const MAX_INSERT_SESSIONS: usize = 16;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to connect to the repository database")]
    Connection(#[source] ::postgres::Error),
    #[error("Database request failed")]
    Database(#[from] ::postgres::Error),
    #[error("I/O failure during bulk append")]
    Io(#[from] std::io::Error),
    #[error("No pgit schema at this database (run `pgit init` or check the URL)")]
    SchemaMissing,
    #[error("Commit {0} already exists")]
    DuplicateCommitId(String),
    #[error("Commit id {id} does not sort after the current head {max}")]
    NonMonotonicCommitId { id: String, max: String },
    #[error("Out-of-order append for group {group_id}: got version {got}, expected {expected}")]
    OutOfOrderAppend {
        group_id: GroupId,
        got: i32,
        expected: i32,
    },
    #[error("Refusing to delete interior commits; only the newest commits can be removed")]
    InteriorDeletion,
    #[error("Commit {0} not found")]
    CommitNotFound(String),
    #[error("Ambiguous commit reference; candidates: {}", candidates.join(", "))]
    AmbiguousCommitId { candidates: Vec<String> },
    #[error("Unknown path {0}")]
    PathNotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The storage gateway. One handle wraps one database connection (or one
/// shared in-memory state); handles are `Send` so import workers can own one
/// each, but a single handle is not meant to be shared across threads.
pub trait Store: Send {
    /// Opens an independent handle onto the same endpoint. Import workers
    /// call this once each so the chain appends of different groups flow
    /// through separate connections.
    fn reopen(&self) -> StoreResult<Box<dyn Store>>;

    // Schema lifecycle.
    fn schema_exists(&self) -> StoreResult<bool>;
    fn init_schema(&self) -> StoreResult<()>;
    fn drop_schema(&self) -> StoreResult<()>;

    /// Runs `f` inside one database transaction; rolls back when it errors.
    fn in_transaction(
        &self,
        f: &mut dyn FnMut(&dyn Store) -> StoreResult<()>,
    ) -> StoreResult<()>;

    // Commit chain.
    fn create_commit(&self, commit: &Commit) -> StoreResult<()>;
    /// Bulk append; `commits` must be sorted ascending and contiguous with
    /// the existing chain head. Uses server-side COPY when available.
    fn create_commits_batch(&self, commits: &[Commit]) -> StoreResult<()>;
    fn get_commit(&self, id: &CommitId) -> StoreResult<Commit>;
    fn commit_exists(&self, id: &CommitId) -> StoreResult<bool>;
    /// All commits strictly after `id` in ascending chain order; all commits
    /// when `id` is `None`.
    fn get_commits_after(&self, id: Option<&CommitId>) -> StoreResult<Vec<Commit>>;
    /// Up to `limit` commits walking backwards from `from` (inclusive).
    fn get_commit_log_from(&self, from: &CommitId, limit: usize) -> StoreResult<Vec<Commit>>;
    fn get_all_commits(&self) -> StoreResult<Vec<Commit>>;
    fn max_commit_id(&self) -> StoreResult<Option<CommitId>>;
    /// Resolves a ULID prefix or last-7 suffix (uppercased before matching).
    fn find_commit_by_partial_id(&self, partial: &str) -> StoreResult<Option<Commit>>;
    /// Deletes a suffix of the commit chain. Fails with
    /// [`StoreError::InteriorDeletion`] unless `commits` is exactly the
    /// newest commits.
    fn delete_commits(&self, commits: &[CommitId]) -> StoreResult<()>;

    // Paths and groups.
    /// Allocates (or returns) a group id for every path, in one round trip.
    fn pre_register_paths(&self, paths: &[String]) -> StoreResult<HashMap<String, GroupId>>;
    fn group_for_path(&self, path: &str) -> StoreResult<Option<GroupId>>;
    fn all_paths(&self) -> StoreResult<Vec<(GroupId, String)>>;

    // Content chains.
    /// Appends file versions. Resolves groups itself and checks that each
    /// group's version continues at `previous + 1`.
    fn create_blobs(&self, blobs: &[BlobWrite]) -> StoreResult<()>;
    /// Import fast path: the caller owns the `path -> group` map and the
    /// per-group next-version counters, so no lookup round trips happen.
    fn create_blobs_batch_fast(
        &self,
        blobs: &[BlobWrite],
        group_map: &HashMap<String, GroupId>,
        version_counters: &mut HashMap<GroupId, i32>,
    ) -> StoreResult<()>;
    /// Removes every file_ref, content, and symlink row belonging to the
    /// given commits, truncating each touched chain to just below its lowest
    /// removed version. `commits` must be a suffix of the commit chain.
    fn delete_blobs_for_commits(&self, commits: &[CommitId]) -> StoreResult<()>;
    /// Highest version currently stored per group; groups with no file_refs
    /// are absent. The import resume protocol seeds its counters from this.
    fn max_versions_by_group(&self) -> StoreResult<HashMap<GroupId, i32>>;

    // Reads over the chains.
    /// Latest file_ref for `path` at or before `commit`, with its content.
    /// `Ok(None)` when the path never existed or was deleted at that point.
    fn get_file_at_commit(&self, path: &str, commit: &CommitId) -> StoreResult<Option<TreeFile>>;
    /// Every live file at `commit`, content included.
    fn get_tree_at_commit(&self, commit: &CommitId) -> StoreResult<Vec<TreeFile>>;
    /// The file changes recorded exactly at `commit` (deletes included).
    fn get_blobs_at_commit(&self, commit: &CommitId) -> StoreResult<Vec<ChangedBlob>>;
    /// All content versions of a group, ascending: the cheapest scan the
    /// chain supports.
    fn get_all_content_for_group(&self, group_id: GroupId) -> StoreResult<Vec<(i32, Vec<u8>)>>;
    /// All file_refs of a group, newest commit first.
    fn get_file_ref_history(&self, group_id: GroupId) -> StoreResult<Vec<FileRef>>;
    /// Every file_ref in the repository (heap scan; analysis uses this).
    fn all_file_refs(&self) -> StoreResult<Vec<FileRef>>;

    // Head, sync state, metadata.
    fn get_head(&self) -> StoreResult<Option<CommitId>>;
    fn set_head(&self, id: Option<&CommitId>) -> StoreResult<()>;
    fn get_sync_state(&self, remote: &str) -> StoreResult<Option<CommitId>>;
    fn set_sync_state(&self, remote: &str, id: &CommitId) -> StoreResult<()>;
    fn get_meta(&self, key: &str) -> StoreResult<Option<String>>;
    fn set_meta(&self, key: &str, value: &str) -> StoreResult<()>;
    fn delete_meta(&self, key: &str) -> StoreResult<()>;

    // Statistics.
    fn get_repo_stats_fast(&self) -> StoreResult<RepoStats>;
    fn get_xpatch_stats(&self, table: &str) -> StoreResult<XpatchStats>;
}

/// Validates that `commits` is a suffix of the ascending chain `all_ids`.
/// Shared by both store implementations before any truncation.
pub(crate) fn check_suffix(all_ids: &[CommitId], commits: &[CommitId]) -> StoreResult<()> {
    if commits.is_empty() {
        return Ok(());
    }
    let mut requested: Vec<&CommitId> = commits.iter().collect();
    requested.sort();
    requested.dedup();
    if requested.len() > all_ids.len() {
        return Err(StoreError::InteriorDeletion);
    }
    let tail = &all_ids[all_ids.len() - requested.len()..];
    if tail.iter().zip(&requested).all(|(a, &b)| a == b) {
        Ok(())
    } else {
        Err(StoreError::InteriorDeletion)
    }
}
