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

//! Synchronization between two repository databases.
//!
//! Both chains only append, so replication is a walk of whole commits with
//! their blobs, batched one transaction at a time. A diverged pull first
//! truncates the local chain back to the common ancestor (the merged content
//! is already in memory and the working directory is untouched), then pulls
//! the remote history fresh and writes the merged tree to disk.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use thiserror::Error;

use crate::cancel::CancellationToken;
use crate::cancel::Cancelled;
use crate::content_hash::ContentHash;
use crate::merge::materialize_whole_file_conflict;
use crate::merge::merge_text;
use crate::repo::MergeState;
use crate::repo::RepoError;
use crate::repo::Repository;
use crate::store::BlobWrite;
use crate::store::Commit;
use crate::store::FileMode;
use crate::store::Store;
use crate::store::StoreError;
use crate::store::TreeFile;
use crate::store::TreeFileContent;
use crate::ulid::CommitId;
use crate::working_copy::materialize_tree;
use crate::working_copy::to_fs_path;
use crate::working_copy::write_tree_file;

/// Commits per replication transaction.
const SYNC_BATCH_SIZE: usize = 100;
/// Page size of the newest-first ancestor search.
const ANCESTOR_PAGE_SIZE: usize = 500;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No commits to synchronize")]
    NoCommits,
    #[error("Remote has commits the local repository lacks; pull first or push with --force")]
    NonFastForward,
    #[error("Unresolved conflicts from a previous pull in: {}", paths.join(", "))]
    UnresolvedConflicts { paths: Vec<String> },
    #[error("Remote database has no pgit repository")]
    RemoteMissing,
    #[error("Remote repository is empty")]
    RemoteEmpty,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Per-path decision of a three-way tree merge. The set is closed: every
/// diverged pull resolves each touched path into exactly one of these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Only the local side changed; its version stands.
    LocalOnly,
    /// Only the remote side changed (or both made the same change).
    RemoteOnly,
    /// Both sides changed text and every region resolved.
    AutoMerged { content: Vec<u8> },
    /// Overlapping text changes; content carries inline markers.
    Conflicted { content: Vec<u8> },
    /// Local deleted what the remote changed; whole-file markers.
    DeleteLocal { content: Vec<u8> },
    /// Remote deleted what the local side changed; whole-file markers.
    DeleteRemote { content: Vec<u8> },
    /// Binary or symlink content changed on both sides; whole-file markers.
    BinaryConflict { content: Vec<u8> },
}

impl MergeOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Conflicted { .. }
                | Self::DeleteLocal { .. }
                | Self::DeleteRemote { .. }
                | Self::BinaryConflict { .. }
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    UpToDate,
    Pushed { commits: usize },
    /// A forced push that first truncated the remote's divergent suffix.
    ForcePushed { commits: usize, discarded: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PullOutcome {
    UpToDate,
    /// The local side is strictly ahead; nothing to do.
    LocalAhead,
    FastForward { commits: usize },
    Merged { auto_merged: usize, conflicted: Vec<String> },
    Rebased { pulled: usize, replayed: usize },
}

/// Copies `commits` (ascending, with their blobs) from `source` into
/// `target`, one transaction per batch.
fn copy_commits(
    source: &dyn Store,
    target: &dyn Store,
    commits: &[Commit],
    cancel: &CancellationToken,
) -> Result<usize, SyncError> {
    for batch in commits.chunks(SYNC_BATCH_SIZE) {
        cancel.check()?;
        target.in_transaction(&mut |txn| {
            txn.create_commits_batch(batch)?;
            for commit in batch {
                let blobs = source.get_blobs_at_commit(&commit.id)?;
                let writes: Vec<BlobWrite> = blobs
                    .into_iter()
                    .map(|blob| BlobWrite {
                        path: blob.path,
                        commit_id: commit.id.clone(),
                        mode: blob.file_ref.mode,
                        payload: blob.payload,
                    })
                    .collect();
                txn.create_blobs(&writes)?;
            }
            Ok(())
        })?;
    }
    Ok(commits.len())
}

/// Finds the newest remote commit that also exists locally, walking the
/// remote history newest-first in pages.
fn find_common_ancestor(
    local: &dyn Store,
    remote: &dyn Store,
    remote_head: &CommitId,
    cancel: &CancellationToken,
) -> Result<Option<CommitId>, SyncError> {
    let mut cursor = Some(remote_head.clone());
    while let Some(at) = cursor {
        cancel.check()?;
        let page = remote.get_commit_log_from(&at, ANCESTOR_PAGE_SIZE)?;
        for commit in &page {
            if local.commit_exists(&commit.id)? {
                return Ok(Some(commit.id.clone()));
            }
        }
        cursor = page.last().and_then(|c| c.parent_id.clone());
    }
    Ok(None)
}

#[tracing::instrument(skip_all, fields(remote = remote_name))]
pub fn push(
    local: &dyn Store,
    remote: &dyn Store,
    remote_name: &str,
    force: bool,
    cancel: &CancellationToken,
) -> Result<PushOutcome, SyncError> {
    if !remote.schema_exists()? {
        remote.init_schema()?;
    }
    let local_head = local.get_head()?.ok_or(SyncError::NoCommits)?;
    let remote_head = remote.get_head()?;

    match &remote_head {
        Some(remote_head) if *remote_head == local_head => Ok(PushOutcome::UpToDate),
        None => {
            let commits = local.get_all_commits()?;
            let pushed = copy_commits(local, remote, &commits, cancel)?;
            remote.set_head(Some(&local_head))?;
            local.set_sync_state(remote_name, &local_head)?;
            Ok(PushOutcome::Pushed { commits: pushed })
        }
        Some(remote_head) if local.commit_exists(remote_head)? => {
            let commits = local.get_commits_after(Some(remote_head))?;
            let pushed = copy_commits(local, remote, &commits, cancel)?;
            remote.set_head(Some(&local_head))?;
            local.set_sync_state(remote_name, &local_head)?;
            Ok(PushOutcome::Pushed { commits: pushed })
        }
        Some(remote_head) => {
            if !force {
                return Err(SyncError::NonFastForward);
            }
            // Truncate the remote's divergence, then push as if that range
            // had never existed.
            let ancestor = find_common_ancestor(local, remote, remote_head, cancel)?;
            let doomed: Vec<CommitId> = remote
                .get_commits_after(ancestor.as_ref())?
                .into_iter()
                .map(|c| c.id)
                .collect();
            remote.delete_blobs_for_commits(&doomed)?;
            remote.delete_commits(&doomed)?;
            let commits = local.get_commits_after(ancestor.as_ref())?;
            let pushed = copy_commits(local, remote, &commits, cancel)?;
            remote.set_head(Some(&local_head))?;
            local.set_sync_state(remote_name, &local_head)?;
            Ok(PushOutcome::ForcePushed {
                commits: pushed,
                discarded: doomed.len(),
            })
        }
    }
}

#[tracing::instrument(skip_all, fields(remote = remote_name))]
pub fn pull(
    repo: &Repository,
    local: &dyn Store,
    remote: &dyn Store,
    remote_name: &str,
    rebase: bool,
    cancel: &CancellationToken,
) -> Result<PullOutcome, SyncError> {
    if let Some(merge_state) = repo.load_merge_state()? {
        return Err(SyncError::UnresolvedConflicts {
            paths: merge_state.conflicted_paths,
        });
    }
    if !remote.schema_exists()? {
        return Err(SyncError::RemoteMissing);
    }
    let Some(remote_head) = remote.get_head()? else {
        return Ok(PullOutcome::UpToDate);
    };
    let local_head = local.get_head()?;

    match &local_head {
        Some(local_head) if *local_head == remote_head => Ok(PullOutcome::UpToDate),
        None => {
            let commits = remote.get_all_commits()?;
            let pulled = copy_commits(remote, local, &commits, cancel)?;
            local.set_head(Some(&remote_head))?;
            local.set_sync_state(remote_name, &remote_head)?;
            let tree = local.get_tree_at_commit(&remote_head)?;
            materialize_tree(repo.root(), &tree, std::iter::empty());
            Ok(PullOutcome::FastForward { commits: pulled })
        }
        Some(local_head) if remote.commit_exists(local_head)? => {
            let previous_tree = local.get_tree_at_commit(local_head)?;
            let commits = remote.get_commits_after(Some(local_head))?;
            let pulled = copy_commits(remote, local, &commits, cancel)?;
            local.set_head(Some(&remote_head))?;
            local.set_sync_state(remote_name, &remote_head)?;
            let tree = local.get_tree_at_commit(&remote_head)?;
            materialize_tree(
                repo.root(),
                &tree,
                previous_tree.into_iter().map(|f| f.path),
            );
            Ok(PullOutcome::FastForward { commits: pulled })
        }
        Some(_) if local.commit_exists(&remote_head)? => Ok(PullOutcome::LocalAhead),
        Some(local_head) => {
            let ancestor = find_common_ancestor(local, remote, &remote_head, cancel)?;
            if rebase {
                pull_rebase(
                    repo,
                    local,
                    remote,
                    remote_name,
                    local_head,
                    &remote_head,
                    ancestor.as_ref(),
                    cancel,
                )
            } else {
                pull_merge(
                    repo,
                    local,
                    remote,
                    remote_name,
                    local_head,
                    &remote_head,
                    ancestor.as_ref(),
                    cancel,
                )
            }
        }
    }
}

/// Classifies one path of a three-way tree merge. `None` means the path is
/// untouched on both sides.
pub fn classify_merge(
    base: Option<&TreeFile>,
    local: Option<&TreeFile>,
    remote: Option<&TreeFile>,
    remote_label: &str,
) -> Option<MergeOutcome> {
    fn fingerprint(file: Option<&TreeFile>) -> Option<(&ContentHash, FileMode)> {
        file.map(|f| (&f.content_hash, f.mode))
    }
    let local_changed = fingerprint(local) != fingerprint(base);
    let remote_changed = fingerprint(remote) != fingerprint(base);
    match (local_changed, remote_changed) {
        (false, false) => None,
        (true, false) => Some(MergeOutcome::LocalOnly),
        (false, true) => Some(MergeOutcome::RemoteOnly),
        (true, true) => {
            if fingerprint(local) == fingerprint(remote) {
                return Some(MergeOutcome::RemoteOnly);
            }
            match (local, remote) {
                (None, None) => Some(MergeOutcome::RemoteOnly),
                (None, Some(remote_file)) => Some(MergeOutcome::DeleteLocal {
                    content: materialize_whole_file_conflict(
                        b"",
                        remote_file.content.as_bytes(),
                        remote_label,
                    ),
                }),
                (Some(local_file), None) => Some(MergeOutcome::DeleteRemote {
                    content: materialize_whole_file_conflict(
                        local_file.content.as_bytes(),
                        b"",
                        remote_label,
                    ),
                }),
                (Some(local_file), Some(remote_file)) => {
                    let unmergeable = local_file.is_binary
                        || remote_file.is_binary
                        || local_file.mode.is_symlink()
                        || remote_file.mode.is_symlink();
                    if unmergeable {
                        return Some(MergeOutcome::BinaryConflict {
                            content: materialize_whole_file_conflict(
                                local_file.content.as_bytes(),
                                remote_file.content.as_bytes(),
                                remote_label,
                            ),
                        });
                    }
                    let base_bytes = base.map(|f| f.content.as_bytes()).unwrap_or_default();
                    let merged = merge_text(
                        base_bytes,
                        local_file.content.as_bytes(),
                        remote_file.content.as_bytes(),
                        remote_label,
                    );
                    if merged.is_clean() {
                        Some(MergeOutcome::AutoMerged {
                            content: merged.content,
                        })
                    } else {
                        Some(MergeOutcome::Conflicted {
                            content: merged.content,
                        })
                    }
                }
            }
        }
    }
}

#[expect(clippy::too_many_arguments)]
fn pull_merge(
    repo: &Repository,
    local: &dyn Store,
    remote: &dyn Store,
    remote_name: &str,
    local_head: &CommitId,
    remote_head: &CommitId,
    ancestor: Option<&CommitId>,
    cancel: &CancellationToken,
) -> Result<PullOutcome, SyncError> {
    let local_tree = tree_map(local.get_tree_at_commit(local_head)?);
    let base_tree = match ancestor {
        Some(ancestor) => tree_map(local.get_tree_at_commit(ancestor)?),
        None => BTreeMap::new(),
    };
    let remote_tree = tree_map(remote.get_tree_at_commit(remote_head)?);

    let all_paths: BTreeSet<&String> = local_tree
        .keys()
        .chain(base_tree.keys())
        .chain(remote_tree.keys())
        .collect();
    let mut outcomes: BTreeMap<String, MergeOutcome> = BTreeMap::new();
    for path in all_paths {
        if let Some(outcome) = classify_merge(
            base_tree.get(path),
            local_tree.get(path),
            remote_tree.get(path),
            remote_name,
        ) {
            outcomes.insert(path.clone(), outcome);
        }
    }

    // The chain can only append: drop everything after the ancestor
    // (previously-pulled remote commits included), then pull the remote
    // history fresh. The merged content is already in memory.
    truncate_after(local, ancestor)?;
    let commits = remote.get_commits_after(ancestor)?;
    let pulled = copy_commits(remote, local, &commits, cancel)?;
    local.set_head(Some(remote_head))?;
    local.set_sync_state(remote_name, remote_head)?;

    // Materialize the merge. Local-only files are re-written as a guard
    // against manual deletion; conflict files carry their markers.
    let mut auto_merged = 0;
    let mut conflicted: Vec<String> = vec![];
    for (path, outcome) in &outcomes {
        match outcome {
            MergeOutcome::LocalOnly => {
                if let Some(file) = local_tree.get(path) {
                    log_write_error(path, write_tree_file(repo.root(), file));
                }
            }
            MergeOutcome::RemoteOnly => match remote_tree.get(path) {
                Some(file) => log_write_error(path, write_tree_file(repo.root(), file)),
                None => remove_working_file(repo, path),
            },
            MergeOutcome::AutoMerged { content } => {
                auto_merged += 1;
                write_merged_bytes(repo, path, content);
            }
            MergeOutcome::Conflicted { content }
            | MergeOutcome::DeleteLocal { content }
            | MergeOutcome::DeleteRemote { content }
            | MergeOutcome::BinaryConflict { content } => {
                conflicted.push(path.clone());
                write_merged_bytes(repo, path, content);
            }
        }
    }

    if conflicted.is_empty() {
        repo.clear_merge_state()?;
    } else {
        repo.save_merge_state(&MergeState {
            remote_name: remote_name.to_owned(),
            local_head: local_head.clone(),
            remote_head: remote_head.clone(),
            conflicted_paths: conflicted.clone(),
        })?;
    }
    tracing::info!(pulled, auto_merged, conflicts = conflicted.len(), "merged diverged history");
    Ok(PullOutcome::Merged {
        auto_merged,
        conflicted,
    })
}

#[expect(clippy::too_many_arguments)]
fn pull_rebase(
    repo: &Repository,
    local: &dyn Store,
    remote: &dyn Store,
    remote_name: &str,
    local_head: &CommitId,
    remote_head: &CommitId,
    ancestor: Option<&CommitId>,
    cancel: &CancellationToken,
) -> Result<PullOutcome, SyncError> {
    // Capture the divergent local commits with their blobs before the
    // truncation removes them.
    let divergent = local.get_commits_after(ancestor)?;
    let mut captured: Vec<(Commit, Vec<BlobWrite>)> = vec![];
    for commit in &divergent {
        let blobs = local
            .get_blobs_at_commit(&commit.id)?
            .into_iter()
            .map(|blob| BlobWrite {
                path: blob.path,
                commit_id: commit.id.clone(),
                mode: blob.file_ref.mode,
                payload: blob.payload,
            })
            .collect();
        captured.push((commit.clone(), blobs));
    }

    truncate_after(local, ancestor)?;
    let commits = remote.get_commits_after(ancestor)?;
    let pulled = copy_commits(remote, local, &commits, cancel)?;
    local.set_head(Some(remote_head))?;

    // Replay each local commit with a fresh identity on top of the new
    // head: new id and committed_at, original author and authored_at.
    let mut head = remote_head.clone();
    let now_ms = chrono::Utc::now().timestamp_millis();
    let mut replayed = 0;
    for (original, blobs) in captured {
        cancel.check()?;
        let max = local.max_commit_id()?.expect("remote history was pulled");
        let id = CommitId::generate_with_time((now_ms.max(0) as u64).max(max.timestamp_ms() + 1));
        let commit = Commit {
            id: id.clone(),
            parent_id: Some(head.clone()),
            committer: original.committer.clone(),
            committed_at: now_ms,
            ..original
        };
        let writes: Vec<BlobWrite> = blobs
            .into_iter()
            .map(|blob| BlobWrite {
                commit_id: id.clone(),
                ..blob
            })
            .collect();
        local.in_transaction(&mut |txn| {
            txn.create_commit(&commit)?;
            txn.create_blobs(&writes)?;
            txn.set_head(Some(&commit.id))
        })?;
        head = id;
        replayed += 1;
    }
    local.set_sync_state(remote_name, remote_head)?;

    let final_tree = local.get_tree_at_commit(&head)?;
    let previous_tree = local.get_tree_at_commit(local_head).unwrap_or_default();
    materialize_tree(
        repo.root(),
        &final_tree,
        previous_tree.into_iter().map(|f| f.path),
    );
    Ok(PullOutcome::Rebased { pulled, replayed })
}

/// Clones `remote` into a freshly initialized local repository.
pub fn clone_into(
    repo: &Repository,
    local: &dyn Store,
    remote: &dyn Store,
    remote_name: &str,
    cancel: &CancellationToken,
) -> Result<usize, SyncError> {
    if !remote.schema_exists()? {
        return Err(SyncError::RemoteMissing);
    }
    let Some(remote_head) = remote.get_head()? else {
        return Err(SyncError::RemoteEmpty);
    };
    if !local.schema_exists()? {
        local.init_schema()?;
    }
    let commits = remote.get_all_commits()?;
    let pulled = copy_commits(remote, local, &commits, cancel)?;
    local.set_head(Some(&remote_head))?;
    local.set_sync_state(remote_name, &remote_head)?;
    let tree = local.get_tree_at_commit(&remote_head)?;
    materialize_tree(repo.root(), &tree, std::iter::empty());
    Ok(pulled)
}

fn truncate_after(store: &dyn Store, ancestor: Option<&CommitId>) -> Result<(), SyncError> {
    let doomed: Vec<CommitId> = store
        .get_commits_after(ancestor)?
        .into_iter()
        .map(|c| c.id)
        .collect();
    store.delete_blobs_for_commits(&doomed)?;
    store.delete_commits(&doomed)?;
    store.set_head(ancestor)?;
    Ok(())
}

fn tree_map(tree: Vec<TreeFile>) -> BTreeMap<String, TreeFile> {
    tree.into_iter().map(|f| (f.path.clone(), f)).collect()
}

fn write_merged_bytes(repo: &Repository, path: &str, content: &[u8]) {
    let file = TreeFile {
        path: path.to_owned(),
        group_id: 0,
        version_id: 0,
        content_hash: ContentHash::of_bytes(content),
        mode: FileMode::Normal,
        is_binary: false,
        content: TreeFileContent::Data(content.to_vec()),
    };
    log_write_error(path, write_tree_file(repo.root(), &file));
}

fn remove_working_file(repo: &Repository, path: &str) {
    if let Some(disk_path) = to_fs_path(repo.root(), path)
        && let Err(err) = std::fs::remove_file(&disk_path)
        && err.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path, error = %err, "failed to remove file");
    }
}

fn log_write_error(path: &str, result: Result<(), crate::file_util::PathError>) {
    if let Err(err) = result {
        tracing::warn!(path = %path, error = %err, "failed to write file");
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::RepoConfig;
    use crate::index::Index;
    use crate::index::StagedStatus;
    use crate::store::MemStore;
    use crate::store::Signature;

    struct TestWorld {
        _dir: tempfile::TempDir,
        repo: Repository,
        local: MemStore,
        remote: MemStore,
        cancel: CancellationToken,
    }

    impl TestWorld {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut config = RepoConfig::default();
            config.core.local_db = Some("test".to_owned());
            let repo = Repository::init(dir.path(), config).unwrap();
            Self {
                _dir: dir,
                repo,
                local: MemStore::new(),
                remote: MemStore::new(),
                cancel: CancellationToken::new(),
            }
        }

        fn commit_file(store: &MemStore, path: &str, content: Option<&[u8]>, message: &str) -> CommitId {
            let max = store.max_commit_id().unwrap();
            let ts = max
                .as_ref()
                .map_or(1_700_000_000_000, |id| id.timestamp_ms() + 1000);
            let signature = Signature {
                name: "T".to_owned(),
                email: "t@e.c".to_owned(),
            };
            let commit = Commit {
                id: CommitId::generate_with_time(ts),
                parent_id: store.get_head().unwrap(),
                tree_hash: Commit::hash_changes([]),
                message: message.to_owned(),
                author: signature.clone(),
                authored_at: ts as i64,
                committer: signature,
                committed_at: ts as i64,
            };
            store.create_commit(&commit).unwrap();
            store
                .create_blobs(&[BlobWrite {
                    path: path.to_owned(),
                    commit_id: commit.id.clone(),
                    mode: FileMode::Normal,
                    payload: match content {
                        Some(data) => crate::store::BlobPayload::Data(data.to_vec()),
                        None => crate::store::BlobPayload::Delete,
                    },
                }])
                .unwrap();
            store.set_head(Some(&commit.id)).unwrap();
            commit.id
        }

        fn pull(&self, rebase: bool) -> Result<PullOutcome, SyncError> {
            pull(
                &self.repo,
                &self.local,
                &self.remote,
                "origin",
                rebase,
                &self.cancel,
            )
        }
    }

    fn assert_same_history(a: &MemStore, b: &MemStore) {
        let commits_a = a.get_all_commits().unwrap();
        let commits_b = b.get_all_commits().unwrap();
        assert_eq!(commits_a, commits_b);
        if let Some(head) = a.get_head().unwrap() {
            let tree_a = a.get_tree_at_commit(&head).unwrap();
            let tree_b = b.get_tree_at_commit(&head).unwrap();
            assert_eq!(tree_a, tree_b);
        }
    }

    #[test]
    fn test_push_to_empty_remote() {
        let world = TestWorld::new();
        TestWorld::commit_file(&world.local, "a.txt", Some(b"1\n"), "one");
        let head = TestWorld::commit_file(&world.local, "a.txt", Some(b"2\n"), "two");

        let outcome = push(&world.local, &world.remote, "origin", false, &world.cancel).unwrap();
        assert_eq!(outcome, PushOutcome::Pushed { commits: 2 });
        assert_eq!(world.remote.get_head().unwrap(), Some(head.clone()));
        assert_same_history(&world.local, &world.remote);
        assert_eq!(world.local.get_sync_state("origin").unwrap(), Some(head));

        // Second push is a no-op.
        let outcome = push(&world.local, &world.remote, "origin", false, &world.cancel).unwrap();
        assert_eq!(outcome, PushOutcome::UpToDate);
    }

    #[test]
    fn test_push_incremental() {
        let world = TestWorld::new();
        TestWorld::commit_file(&world.local, "a.txt", Some(b"1\n"), "one");
        push(&world.local, &world.remote, "origin", false, &world.cancel).unwrap();
        TestWorld::commit_file(&world.local, "b.txt", Some(b"2\n"), "two");

        let outcome = push(&world.local, &world.remote, "origin", false, &world.cancel).unwrap();
        assert_eq!(outcome, PushOutcome::Pushed { commits: 1 });
        assert_same_history(&world.local, &world.remote);
    }

    #[test]
    fn test_push_diverged_requires_force() {
        let world = TestWorld::new();
        let base = TestWorld::commit_file(&world.local, "a.txt", Some(b"base\n"), "base");
        push(&world.local, &world.remote, "origin", false, &world.cancel).unwrap();
        TestWorld::commit_file(&world.local, "a.txt", Some(b"local\n"), "local");
        TestWorld::commit_file(&world.remote, "a.txt", Some(b"remote\n"), "remote");

        let err = push(&world.local, &world.remote, "origin", false, &world.cancel).unwrap_err();
        assert!(matches!(err, SyncError::NonFastForward));

        let outcome = push(&world.local, &world.remote, "origin", true, &world.cancel).unwrap();
        assert_eq!(
            outcome,
            PushOutcome::ForcePushed {
                commits: 1,
                discarded: 1,
            }
        );
        assert_same_history(&world.local, &world.remote);
        drop(base);
    }

    #[test]
    fn test_pull_fast_forward_is_bit_identical() {
        let world = TestWorld::new();
        TestWorld::commit_file(&world.remote, "a.txt", Some(b"1\n"), "one");
        TestWorld::commit_file(&world.remote, "dir/b.txt", Some(b"2\n"), "two");

        let outcome = world.pull(false).unwrap();
        assert_eq!(outcome, PullOutcome::FastForward { commits: 2 });
        assert_same_history(&world.local, &world.remote);
        // The working tree was materialized.
        assert_eq!(
            fs::read(world.repo.root().join("dir/b.txt")).unwrap(),
            b"2\n"
        );

        assert_eq!(world.pull(false).unwrap(), PullOutcome::UpToDate);
    }

    #[test]
    fn test_pull_local_ahead_is_noop() {
        let world = TestWorld::new();
        TestWorld::commit_file(&world.remote, "a.txt", Some(b"1\n"), "one");
        world.pull(false).unwrap();
        TestWorld::commit_file(&world.local, "b.txt", Some(b"2\n"), "two");
        assert_eq!(world.pull(false).unwrap(), PullOutcome::LocalAhead);
    }

    #[test]
    fn test_pull_diverged_auto_merge() {
        let world = TestWorld::new();
        // Base on both sides.
        TestWorld::commit_file(&world.remote, "a.txt", Some(b"L1\nL2\nL3\n"), "base");
        world.pull(false).unwrap();
        // Local edits L1, remote edits L3.
        TestWorld::commit_file(&world.local, "a.txt", Some(b"LOCAL\nL2\nL3\n"), "local");
        let remote_head =
            TestWorld::commit_file(&world.remote, "a.txt", Some(b"L1\nL2\nREMOTE\n"), "remote");

        let outcome = world.pull(false).unwrap();
        assert_eq!(
            outcome,
            PullOutcome::Merged {
                auto_merged: 1,
                conflicted: vec![],
            }
        );
        assert_eq!(
            fs::read(world.repo.root().join("a.txt")).unwrap(),
            b"LOCAL\nL2\nREMOTE\n"
        );
        assert_eq!(world.repo.load_merge_state().unwrap(), None);
        // The local chain now mirrors the remote exactly.
        assert_eq!(world.local.get_head().unwrap(), Some(remote_head));
        assert_same_history(&world.local, &world.remote);
    }

    #[test]
    fn test_pull_diverged_conflict() {
        let world = TestWorld::new();
        TestWorld::commit_file(&world.remote, "a.txt", Some(b"L1\n"), "base");
        world.pull(false).unwrap();
        let local_head =
            TestWorld::commit_file(&world.local, "a.txt", Some(b"A\n"), "local");
        let remote_head =
            TestWorld::commit_file(&world.remote, "a.txt", Some(b"B\n"), "remote");

        let outcome = world.pull(false).unwrap();
        assert_eq!(
            outcome,
            PullOutcome::Merged {
                auto_merged: 0,
                conflicted: vec!["a.txt".to_owned()],
            }
        );
        assert_eq!(
            fs::read(world.repo.root().join("a.txt")).unwrap(),
            indoc! {b"
                <<<<<<< local
                A
                =======
                B
                >>>>>>> origin
            "}
        );
        let merge_state = world.repo.load_merge_state().unwrap().unwrap();
        assert_eq!(merge_state.conflicted_paths, vec!["a.txt".to_owned()]);
        assert_eq!(merge_state.local_head, local_head);
        assert_eq!(merge_state.remote_head, remote_head);

        // Another pull refuses until the conflicts are resolved.
        assert!(matches!(
            world.pull(false),
            Err(SyncError::UnresolvedConflicts { .. })
        ));
    }

    #[test]
    fn test_pull_keeps_local_only_changes() {
        let world = TestWorld::new();
        TestWorld::commit_file(&world.remote, "shared.txt", Some(b"s\n"), "base");
        world.pull(false).unwrap();
        TestWorld::commit_file(&world.local, "local.txt", Some(b"mine\n"), "local");
        TestWorld::commit_file(&world.remote, "remote.txt", Some(b"theirs\n"), "remote");

        let outcome = world.pull(false).unwrap();
        assert_eq!(
            outcome,
            PullOutcome::Merged {
                auto_merged: 0,
                conflicted: vec![],
            }
        );
        // Both sides' files are on disk; the local-only file survives even
        // though its commit was truncated.
        assert_eq!(fs::read(world.repo.root().join("local.txt")).unwrap(), b"mine\n");
        assert_eq!(
            fs::read(world.repo.root().join("remote.txt")).unwrap(),
            b"theirs\n"
        );
        // The local-only commit is gone from the chain (its content lives in
        // the working tree, ready to be committed on top).
        assert_same_history(&world.local, &world.remote);
    }

    #[test]
    fn test_pull_rebase_replays_local_commits() {
        let world = TestWorld::new();
        TestWorld::commit_file(&world.remote, "base.txt", Some(b"b\n"), "base");
        world.pull(false).unwrap();
        TestWorld::commit_file(&world.local, "mine.txt", Some(b"mine\n"), "local work");
        TestWorld::commit_file(&world.remote, "theirs.txt", Some(b"theirs\n"), "remote work");

        let outcome = world.pull(true).unwrap();
        assert_eq!(
            outcome,
            PullOutcome::Rebased {
                pulled: 1,
                replayed: 1,
            }
        );
        let commits = world.local.get_all_commits().unwrap();
        assert_eq!(commits.len(), 3);
        let replayed = commits.last().unwrap();
        assert_eq!(replayed.message, "local work");
        // New identity, preserved author timestamp.
        assert_eq!(replayed.author.name, "T");
        assert!(replayed.committed_at >= replayed.authored_at);
        let head = world.local.get_head().unwrap().unwrap();
        assert_eq!(head, replayed.id);
        let tree = world.local.get_tree_at_commit(&head).unwrap();
        let paths: Vec<&str> = tree.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["base.txt", "mine.txt", "theirs.txt"]);
        assert_eq!(fs::read(world.repo.root().join("mine.txt")).unwrap(), b"mine\n");
    }

    #[test]
    fn test_clone_into_empty_local() {
        let world = TestWorld::new();
        TestWorld::commit_file(&world.remote, "a.txt", Some(b"data\n"), "one");
        let pulled = clone_into(
            &world.repo,
            &world.local,
            &world.remote,
            "origin",
            &world.cancel,
        )
        .unwrap();
        assert_eq!(pulled, 1);
        assert_same_history(&world.local, &world.remote);
        assert_eq!(fs::read(world.repo.root().join("a.txt")).unwrap(), b"data\n");

        // Cloning from an empty remote refuses.
        let world2 = TestWorld::new();
        assert!(matches!(
            clone_into(
                &world2.repo,
                &world2.local,
                &world2.remote,
                "origin",
                &world2.cancel,
            ),
            Err(SyncError::RemoteEmpty)
        ));
    }

    #[test]
    fn test_classify_merge_categories() {
        let file = |data: &[u8], binary: bool| TreeFile {
            path: "f".to_owned(),
            group_id: 1,
            version_id: 1,
            content_hash: ContentHash::of_bytes(data),
            mode: FileMode::Normal,
            is_binary: binary,
            content: TreeFileContent::Data(data.to_vec()),
        };
        let base = file(b"base\n", false);
        let local = file(b"local\n", false);
        let remote = file(b"remote\n", false);

        assert_eq!(classify_merge(Some(&base), Some(&base), Some(&base), "r"), None);
        assert_eq!(
            classify_merge(Some(&base), Some(&local), Some(&base), "r"),
            Some(MergeOutcome::LocalOnly)
        );
        assert_eq!(
            classify_merge(Some(&base), Some(&base), Some(&remote), "r"),
            Some(MergeOutcome::RemoteOnly)
        );
        // Identical edits take the remote side.
        assert_eq!(
            classify_merge(Some(&base), Some(&local), Some(&local), "r"),
            Some(MergeOutcome::RemoteOnly)
        );
        // Delete vs edit conflicts.
        assert_matches::assert_matches!(
            classify_merge(Some(&base), None, Some(&remote), "r"),
            Some(MergeOutcome::DeleteLocal { .. })
        );
        assert_matches::assert_matches!(
            classify_merge(Some(&base), Some(&local), None, "r"),
            Some(MergeOutcome::DeleteRemote { .. })
        );
        // Binary on either side conflicts whole-file.
        let binary = file(b"\x00bin", true);
        assert_matches::assert_matches!(
            classify_merge(Some(&base), Some(&binary), Some(&remote), "r"),
            Some(MergeOutcome::BinaryConflict { .. })
        );
        // Both-new identical files resolve; both-new different conflict.
        assert_eq!(
            classify_merge(None, Some(&local), Some(&local), "r"),
            Some(MergeOutcome::RemoteOnly)
        );
        assert_matches::assert_matches!(
            classify_merge(None, Some(&local), Some(&remote), "r"),
            Some(MergeOutcome::Conflicted { .. })
        );
    }

    #[test]
    fn test_merge_commit_after_conflicted_pull() {
        let world = TestWorld::new();
        TestWorld::commit_file(&world.remote, "a.txt", Some(b"L1\n"), "base");
        world.pull(false).unwrap();
        TestWorld::commit_file(&world.local, "a.txt", Some(b"A\n"), "local");
        TestWorld::commit_file(&world.remote, "a.txt", Some(b"B\n"), "remote");
        world.pull(false).unwrap();

        // Resolve on disk, stage, and commit with the merge state.
        fs::write(world.repo.root().join("a.txt"), b"resolved\n").unwrap();
        let merge_state = world.repo.load_merge_state().unwrap().unwrap();
        let mut index = world.repo.load_index().unwrap();
        index.stage("a.txt", StagedStatus::Modified, None);
        let commit = crate::commit::commit_staged(
            &world.local,
            world.repo.root(),
            &mut index,
            Signature {
                name: "T".to_owned(),
                email: "t@e.c".to_owned(),
            },
            crate::commit::CommitParams {
                message: "merge remote".to_owned(),
                author: None,
                merge_state: Some(merge_state),
            },
        )
        .unwrap();
        world.repo.clear_merge_state().unwrap();
        assert!(commit.message.contains("Merged-remote: origin"));
        let file = world
            .local
            .get_file_at_commit("a.txt", &commit.id)
            .unwrap()
            .unwrap();
        assert_eq!(file.content, TreeFileContent::Data(b"resolved\n".to_vec()));
    }
}
