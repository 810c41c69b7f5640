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

//! In-memory [`Store`] with the same append and truncation invariants as the
//! PostgreSQL gateway. Engines are tested against this without a server.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use super::BlobPayload;
use super::BlobWrite;
use super::ChangedBlob;
use super::Commit;
use super::FileRef;
use super::GroupId;
use super::RepoStats;
use super::Store;
use super::StoreError;
use super::StoreResult;
use super::TreeFile;
use super::TreeFileContent;
use super::XpatchStats;
use super::check_suffix;
use crate::content_hash::detect_binary;
use crate::ulid::CommitId;

#[derive(Clone, Default)]
struct State {
    schema: bool,
    commits: Vec<Commit>,
    paths: BTreeMap<String, GroupId>,
    next_group: GroupId,
    file_refs: Vec<FileRef>,
    content: BTreeMap<(GroupId, i32), Vec<u8>>,
    symlink_targets: BTreeMap<(GroupId, i32), String>,
    head: Option<CommitId>,
    sync_state: BTreeMap<String, CommitId>,
    meta: BTreeMap<String, String>,
}

impl State {
    fn path_of_group(&self, group_id: GroupId) -> Option<&str> {
        self.paths
            .iter()
            .find(|&(_, &g)| g == group_id)
            .map(|(path, _)| path.as_str())
    }

    fn max_version(&self, group_id: GroupId) -> i32 {
        self.file_refs
            .iter()
            .filter(|r| r.group_id == group_id)
            .map(|r| r.version_id)
            .max()
            .unwrap_or(0)
    }

    fn latest_ref_at(&self, group_id: GroupId, commit: &CommitId) -> Option<&FileRef> {
        self.file_refs
            .iter()
            .filter(|r| r.group_id == group_id && r.commit_id <= *commit)
            .max_by(|a, b| a.commit_id.cmp(&b.commit_id))
    }

    fn tree_file_for(&self, file_ref: &FileRef, path: String) -> TreeFile {
        let key = (file_ref.group_id, file_ref.version_id);
        let content = if file_ref.mode.is_symlink() {
            TreeFileContent::Symlink(self.symlink_targets[&key].clone())
        } else {
            TreeFileContent::Data(self.content[&key].clone())
        };
        TreeFile {
            path,
            group_id: file_ref.group_id,
            version_id: file_ref.version_id,
            content_hash: file_ref.content_hash.unwrap(),
            mode: file_ref.mode,
            is_binary: file_ref.is_binary,
            content,
        }
    }

    fn append_blob(
        &mut self,
        blob: &BlobWrite,
        group_id: GroupId,
        version_id: i32,
    ) -> StoreResult<()> {
        let expected = self.max_version(group_id) + 1;
        if version_id != expected {
            return Err(StoreError::OutOfOrderAppend {
                group_id,
                got: version_id,
                expected,
            });
        }
        let is_binary = match &blob.payload {
            BlobPayload::Data(data) => detect_binary(data),
            _ => false,
        };
        self.file_refs.push(FileRef {
            group_id,
            commit_id: blob.commit_id.clone(),
            version_id,
            content_hash: blob.content_hash(),
            mode: blob.mode,
            is_binary,
        });
        match &blob.payload {
            BlobPayload::Data(data) => {
                self.content.insert((group_id, version_id), data.clone());
            }
            BlobPayload::Symlink(target) => {
                self.symlink_targets
                    .insert((group_id, version_id), target.clone());
            }
            BlobPayload::Delete => {}
        }
        Ok(())
    }
}

/// Shared-state in-memory store. Cloning or [`Store::reopen`]-ing yields a
/// handle onto the same repository.
#[derive(Clone)]
pub struct MemStore {
    state: Arc<Mutex<State>>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    /// A fresh store with an initialized (empty) schema.
    pub fn new() -> Self {
        let state = State {
            schema: true,
            next_group: 1,
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// A store whose schema has not been initialized, as a remote URL
    /// pointing at a blank database would be.
    pub fn uninitialized() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

impl Store for MemStore {
    fn reopen(&self) -> StoreResult<Box<dyn Store>> {
        Ok(Box::new(self.clone()))
    }

    fn schema_exists(&self) -> StoreResult<bool> {
        Ok(self.lock().schema)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let mut state = self.lock();
        state.schema = true;
        if state.next_group == 0 {
            state.next_group = 1;
        }
        Ok(())
    }

    fn drop_schema(&self) -> StoreResult<()> {
        let mut state = self.lock();
        *state = State::default();
        Ok(())
    }

    fn in_transaction(
        &self,
        f: &mut dyn FnMut(&dyn Store) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let snapshot = self.lock().clone();
        match f(self) {
            Ok(()) => Ok(()),
            Err(err) => {
                *self.lock() = snapshot;
                Err(err)
            }
        }
    }

    fn create_commit(&self, commit: &Commit) -> StoreResult<()> {
        self.create_commits_batch(std::slice::from_ref(commit))
    }

    fn create_commits_batch(&self, commits: &[Commit]) -> StoreResult<()> {
        let mut state = self.lock();
        let mut max = state.commits.last().map(|c| c.id.clone());
        for commit in commits {
            if state.commits.iter().any(|c| c.id == commit.id) {
                return Err(StoreError::DuplicateCommitId(commit.id.to_string()));
            }
            if let Some(max) = &max
                && commit.id <= *max
            {
                return Err(StoreError::NonMonotonicCommitId {
                    id: commit.id.to_string(),
                    max: max.to_string(),
                });
            }
            max = Some(commit.id.clone());
            state.commits.push(commit.clone());
        }
        Ok(())
    }

    fn get_commit(&self, id: &CommitId) -> StoreResult<Commit> {
        self.lock()
            .commits
            .iter()
            .find(|c| c.id == *id)
            .cloned()
            .ok_or_else(|| StoreError::CommitNotFound(id.to_string()))
    }

    fn commit_exists(&self, id: &CommitId) -> StoreResult<bool> {
        Ok(self.lock().commits.iter().any(|c| c.id == *id))
    }

    fn get_commits_after(&self, id: Option<&CommitId>) -> StoreResult<Vec<Commit>> {
        let state = self.lock();
        Ok(state
            .commits
            .iter()
            .filter(|c| id.is_none_or(|id| c.id > *id))
            .cloned()
            .collect())
    }

    fn get_commit_log_from(&self, from: &CommitId, limit: usize) -> StoreResult<Vec<Commit>> {
        let state = self.lock();
        let pos = state
            .commits
            .iter()
            .position(|c| c.id == *from)
            .ok_or_else(|| StoreError::CommitNotFound(from.to_string()))?;
        Ok(state.commits[..=pos]
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    fn get_all_commits(&self) -> StoreResult<Vec<Commit>> {
        Ok(self.lock().commits.clone())
    }

    fn max_commit_id(&self) -> StoreResult<Option<CommitId>> {
        Ok(self.lock().commits.last().map(|c| c.id.clone()))
    }

    fn find_commit_by_partial_id(&self, partial: &str) -> StoreResult<Option<Commit>> {
        let needle = partial.to_ascii_uppercase();
        let state = self.lock();
        let matches: Vec<&Commit> = state
            .commits
            .iter()
            .filter(|c| {
                c.id.as_str().starts_with(&needle) || c.id.short() == needle
            })
            .collect();
        match matches.as_slice() {
            [] => Ok(None),
            [commit] => Ok(Some((*commit).clone())),
            many => Err(StoreError::AmbiguousCommitId {
                candidates: many.iter().map(|c| c.id.to_string()).collect(),
            }),
        }
    }

    fn delete_commits(&self, commits: &[CommitId]) -> StoreResult<()> {
        let mut state = self.lock();
        let all_ids: Vec<CommitId> = state.commits.iter().map(|c| c.id.clone()).collect();
        check_suffix(&all_ids, commits)?;
        state.commits.retain(|c| !commits.contains(&c.id));
        if let Some(head) = state.head.clone()
            && commits.contains(&head)
        {
            state.head = state.commits.last().map(|c| c.id.clone());
        }
        Ok(())
    }

    fn pre_register_paths(&self, paths: &[String]) -> StoreResult<HashMap<String, GroupId>> {
        let mut state = self.lock();
        let mut result = HashMap::new();
        for path in paths {
            let group_id = match state.paths.get(path) {
                Some(&g) => g,
                None => {
                    let g = state.next_group;
                    state.next_group += 1;
                    state.paths.insert(path.clone(), g);
                    g
                }
            };
            result.insert(path.clone(), group_id);
        }
        Ok(result)
    }

    fn group_for_path(&self, path: &str) -> StoreResult<Option<GroupId>> {
        Ok(self.lock().paths.get(path).copied())
    }

    fn all_paths(&self) -> StoreResult<Vec<(GroupId, String)>> {
        Ok(self
            .lock()
            .paths
            .iter()
            .map(|(path, &g)| (g, path.clone()))
            .collect())
    }

    fn create_blobs(&self, blobs: &[BlobWrite]) -> StoreResult<()> {
        let mut state = self.lock();
        for blob in blobs {
            let group_id = match state.paths.get(&blob.path) {
                Some(&g) => g,
                None => {
                    let g = state.next_group;
                    state.next_group += 1;
                    state.paths.insert(blob.path.clone(), g);
                    g
                }
            };
            let version_id = state.max_version(group_id) + 1;
            state.append_blob(blob, group_id, version_id)?;
        }
        Ok(())
    }

    fn create_blobs_batch_fast(
        &self,
        blobs: &[BlobWrite],
        group_map: &HashMap<String, GroupId>,
        version_counters: &mut HashMap<GroupId, i32>,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        for blob in blobs {
            let group_id = *group_map
                .get(&blob.path)
                .ok_or_else(|| StoreError::PathNotFound(blob.path.clone()))?;
            let counter = version_counters.entry(group_id).or_insert(0);
            *counter += 1;
            state.append_blob(blob, group_id, *counter)?;
        }
        Ok(())
    }

    fn delete_blobs_for_commits(&self, commits: &[CommitId]) -> StoreResult<()> {
        let mut state = self.lock();
        let all_ids: Vec<CommitId> = state.commits.iter().map(|c| c.id.clone()).collect();
        check_suffix(&all_ids, commits)?;
        // Lowest version removed per group; the chain is truncated there so
        // no interior hole can remain.
        let mut cut_at: HashMap<GroupId, i32> = HashMap::new();
        for file_ref in &state.file_refs {
            if commits.contains(&file_ref.commit_id) {
                let entry = cut_at.entry(file_ref.group_id).or_insert(i32::MAX);
                *entry = (*entry).min(file_ref.version_id);
            }
        }
        state.file_refs.retain(|r| {
            cut_at
                .get(&r.group_id)
                .is_none_or(|&cut| r.version_id < cut)
        });
        state
            .content
            .retain(|(g, v), _| cut_at.get(g).is_none_or(|&cut| *v < cut));
        state
            .symlink_targets
            .retain(|(g, v), _| cut_at.get(g).is_none_or(|&cut| *v < cut));
        Ok(())
    }

    fn max_versions_by_group(&self) -> StoreResult<HashMap<GroupId, i32>> {
        let state = self.lock();
        let mut result = HashMap::new();
        for file_ref in &state.file_refs {
            let entry = result.entry(file_ref.group_id).or_insert(0);
            *entry = (*entry).max(file_ref.version_id);
        }
        Ok(result)
    }

    fn get_file_at_commit(&self, path: &str, commit: &CommitId) -> StoreResult<Option<TreeFile>> {
        let state = self.lock();
        let Some(&group_id) = state.paths.get(path) else {
            return Ok(None);
        };
        let Some(file_ref) = state.latest_ref_at(group_id, commit) else {
            return Ok(None);
        };
        if file_ref.is_deleted() {
            return Ok(None);
        }
        Ok(Some(state.tree_file_for(&file_ref.clone(), path.to_owned())))
    }

    fn get_tree_at_commit(&self, commit: &CommitId) -> StoreResult<Vec<TreeFile>> {
        let state = self.lock();
        let mut tree = vec![];
        for (path, &group_id) in &state.paths {
            if let Some(file_ref) = state.latest_ref_at(group_id, commit)
                && !file_ref.is_deleted()
            {
                tree.push(state.tree_file_for(&file_ref.clone(), path.clone()));
            }
        }
        Ok(tree)
    }

    fn get_blobs_at_commit(&self, commit: &CommitId) -> StoreResult<Vec<ChangedBlob>> {
        let state = self.lock();
        let mut changed = vec![];
        for file_ref in &state.file_refs {
            if file_ref.commit_id != *commit {
                continue;
            }
            let key = (file_ref.group_id, file_ref.version_id);
            let payload = if file_ref.is_deleted() {
                BlobPayload::Delete
            } else if file_ref.mode.is_symlink() {
                BlobPayload::Symlink(state.symlink_targets[&key].clone())
            } else {
                BlobPayload::Data(state.content[&key].clone())
            };
            changed.push(ChangedBlob {
                path: state.path_of_group(file_ref.group_id).unwrap().to_owned(),
                file_ref: file_ref.clone(),
                payload,
            });
        }
        Ok(changed)
    }

    fn get_all_content_for_group(&self, group_id: GroupId) -> StoreResult<Vec<(i32, Vec<u8>)>> {
        let state = self.lock();
        Ok(state
            .content
            .range((group_id, 0)..(group_id, i32::MAX))
            .map(|(&(_, v), data)| (v, data.clone()))
            .collect())
    }

    fn get_file_ref_history(&self, group_id: GroupId) -> StoreResult<Vec<FileRef>> {
        let state = self.lock();
        let mut history: Vec<FileRef> = state
            .file_refs
            .iter()
            .filter(|r| r.group_id == group_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.commit_id.cmp(&a.commit_id));
        Ok(history)
    }

    fn all_file_refs(&self) -> StoreResult<Vec<FileRef>> {
        Ok(self.lock().file_refs.clone())
    }

    fn get_head(&self) -> StoreResult<Option<CommitId>> {
        Ok(self.lock().head.clone())
    }

    fn set_head(&self, id: Option<&CommitId>) -> StoreResult<()> {
        self.lock().head = id.cloned();
        Ok(())
    }

    fn get_sync_state(&self, remote: &str) -> StoreResult<Option<CommitId>> {
        Ok(self.lock().sync_state.get(remote).cloned())
    }

    fn set_sync_state(&self, remote: &str, id: &CommitId) -> StoreResult<()> {
        self.lock().sync_state.insert(remote.to_owned(), id.clone());
        Ok(())
    }

    fn get_meta(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock().meta.get(key).cloned())
    }

    fn set_meta(&self, key: &str, value: &str) -> StoreResult<()> {
        self.lock().meta.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn delete_meta(&self, key: &str) -> StoreResult<()> {
        self.lock().meta.remove(key);
        Ok(())
    }

    fn get_repo_stats_fast(&self) -> StoreResult<RepoStats> {
        let state = self.lock();
        Ok(RepoStats {
            commit_count: state.commits.len() as i64,
            path_count: state.paths.len() as i64,
            file_ref_count: state.file_refs.len() as i64,
            content_bytes: state.content.values().map(|c| c.len() as i64).sum(),
        })
    }

    fn get_xpatch_stats(&self, table: &str) -> StoreResult<XpatchStats> {
        let state = self.lock();
        let logical_bytes = match table {
            "pgit_commits" => state
                .commits
                .iter()
                .map(|c| c.message.len() as i64 + 128)
                .sum(),
            _ => state.content.values().map(|c| c.len() as i64).sum(),
        };
        let row_count = match table {
            "pgit_commits" => state.commits.len() as i64,
            _ => state.content.len() as i64,
        };
        Ok(XpatchStats {
            table: table.to_owned(),
            row_count,
            logical_bytes,
            // No compression in memory.
            stored_bytes: logical_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::store::FileMode;
    use crate::store::Signature;

    fn make_commit(n: u64) -> Commit {
        let id = CommitId::generate_with_time(1_700_000_000_000 + n);
        let signature = Signature {
            name: "Test User".to_owned(),
            email: "test@example.com".to_owned(),
        };
        Commit {
            id,
            parent_id: None,
            tree_hash: Commit::hash_changes([]),
            message: format!("commit {n}"),
            author: signature.clone(),
            authored_at: 1_700_000_000_000 + n as i64,
            committer: signature,
            committed_at: 1_700_000_000_000 + n as i64,
        }
    }

    fn write(store: &MemStore, commit: &CommitId, path: &str, data: &[u8]) {
        store
            .create_blobs(&[BlobWrite {
                path: path.to_owned(),
                commit_id: commit.clone(),
                mode: FileMode::Normal,
                payload: BlobPayload::Data(data.to_vec()),
            }])
            .unwrap();
    }

    #[test]
    fn test_commit_append_requires_monotonic_ids() {
        let store = MemStore::new();
        let c1 = make_commit(10);
        let c2 = make_commit(20);
        store.create_commit(&c2).unwrap();
        assert_matches!(
            store.create_commit(&c1),
            Err(StoreError::NonMonotonicCommitId { .. })
        );
        assert_matches!(
            store.create_commit(&c2),
            Err(StoreError::DuplicateCommitId(_))
        );
    }

    #[test]
    fn test_version_ids_are_dense_per_group() {
        let store = MemStore::new();
        let commits: Vec<Commit> = (0..3).map(make_commit).collect();
        store.create_commits_batch(&commits).unwrap();
        for commit in &commits {
            write(&store, &commit.id, "a.txt", b"a");
            write(&store, &commit.id, "b.txt", b"b");
        }
        let versions = store.max_versions_by_group().unwrap();
        assert_eq!(versions.len(), 2);
        for (&group_id, &max) in &versions {
            assert_eq!(max, 3);
            let history = store.get_file_ref_history(group_id).unwrap();
            let mut ids: Vec<i32> = history.iter().map(|r| r.version_id).collect();
            ids.sort_unstable();
            assert_eq!(ids, vec![1, 2, 3]);
        }
    }

    #[test]
    fn test_fast_append_rejects_stale_counters() {
        let store = MemStore::new();
        let commit = make_commit(0);
        store.create_commit(&commit).unwrap();
        write(&store, &commit.id, "a.txt", b"one");

        let group_map = store.pre_register_paths(&["a.txt".to_owned()]).unwrap();
        // A counter starting at zero replays version 1, which is taken.
        let mut counters = HashMap::new();
        let blob = BlobWrite {
            path: "a.txt".to_owned(),
            commit_id: commit.id.clone(),
            mode: FileMode::Normal,
            payload: BlobPayload::Data(b"two".to_vec()),
        };
        assert_matches!(
            store.create_blobs_batch_fast(std::slice::from_ref(&blob), &group_map, &mut counters),
            Err(StoreError::OutOfOrderAppend { got: 1, expected: 2, .. })
        );
        // Seeded from the stored maximum it continues the chain.
        let mut counters = store.max_versions_by_group().unwrap();
        store
            .create_blobs_batch_fast(&[blob], &group_map, &mut counters)
            .unwrap();
    }

    #[test]
    fn test_delete_commits_suffix_only() {
        let store = MemStore::new();
        let commits: Vec<Commit> = (0..3).map(make_commit).collect();
        store.create_commits_batch(&commits).unwrap();

        assert_matches!(
            store.delete_commits(&[commits[0].id.clone()]),
            Err(StoreError::InteriorDeletion)
        );
        store.delete_commits(&[commits[2].id.clone()]).unwrap();
        let remaining = store.get_all_commits().unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|c| c.id < commits[2].id));
    }

    #[test]
    fn test_delete_blobs_truncates_chain_suffix() {
        let store = MemStore::new();
        let commits: Vec<Commit> = (0..3).map(make_commit).collect();
        store.create_commits_batch(&commits).unwrap();
        for (i, commit) in commits.iter().enumerate() {
            write(&store, &commit.id, "a.txt", format!("v{i}").as_bytes());
        }

        store
            .delete_blobs_for_commits(&[commits[1].id.clone(), commits[2].id.clone()])
            .unwrap();
        let group_id = store.group_for_path("a.txt").unwrap().unwrap();
        let content = store.get_all_content_for_group(group_id).unwrap();
        assert_eq!(content, vec![(1, b"v0".to_vec())]);
        // The group mapping survives the truncation.
        assert_eq!(store.all_paths().unwrap().len(), 1);
    }

    #[test]
    fn test_file_at_commit_sees_latest_version() {
        let store = MemStore::new();
        let commits: Vec<Commit> = (0..3).map(make_commit).collect();
        store.create_commits_batch(&commits).unwrap();
        write(&store, &commits[0].id, "a.txt", b"old");
        write(&store, &commits[2].id, "a.txt", b"new");

        let at_mid = store
            .get_file_at_commit("a.txt", &commits[1].id)
            .unwrap()
            .unwrap();
        assert_eq!(at_mid.content, TreeFileContent::Data(b"old".to_vec()));
        let at_tip = store
            .get_file_at_commit("a.txt", &commits[2].id)
            .unwrap()
            .unwrap();
        assert_eq!(at_tip.content, TreeFileContent::Data(b"new".to_vec()));
        assert_eq!(at_tip.version_id, 2);
    }

    #[test]
    fn test_deleted_file_disappears_from_tree() {
        let store = MemStore::new();
        let commits: Vec<Commit> = (0..2).map(make_commit).collect();
        store.create_commits_batch(&commits).unwrap();
        write(&store, &commits[0].id, "a.txt", b"data");
        store
            .create_blobs(&[BlobWrite {
                path: "a.txt".to_owned(),
                commit_id: commits[1].id.clone(),
                mode: FileMode::Normal,
                payload: BlobPayload::Delete,
            }])
            .unwrap();

        assert_eq!(
            store.get_tree_at_commit(&commits[0].id).unwrap().len(),
            1
        );
        assert_eq!(
            store.get_tree_at_commit(&commits[1].id).unwrap().len(),
            0
        );
        assert!(
            store
                .get_file_at_commit("a.txt", &commits[1].id)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_partial_id_prefix_and_suffix() {
        let store = MemStore::new();
        let commits: Vec<Commit> = (0..2).map(make_commit).collect();
        store.create_commits_batch(&commits).unwrap();
        let full = commits[0].id.as_str().to_owned();

        let by_prefix = store
            .find_commit_by_partial_id(&full[..8].to_ascii_lowercase())
            .unwrap();
        assert_eq!(by_prefix.map(|c| c.id), Some(commits[0].id.clone()));
        let by_suffix = store
            .find_commit_by_partial_id(&commits[1].id.short())
            .unwrap();
        assert_eq!(by_suffix.map(|c| c.id), Some(commits[1].id.clone()));
        assert_eq!(store.find_commit_by_partial_id("0000000").unwrap().map(|c| c.id), None);
        // The common timestamp prefix matches both commits.
        assert_matches!(
            store.find_commit_by_partial_id(&full[..4]),
            Err(StoreError::AmbiguousCommitId { .. }) | Ok(None)
        );
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let store = MemStore::new();
        let commit = make_commit(0);
        let result = store.in_transaction(&mut |store| {
            store.create_commit(&make_commit(5))?;
            store.set_head(Some(&commit.id))?;
            Err(StoreError::CommitNotFound("boom".to_owned()))
        });
        assert!(result.is_err());
        assert_eq!(store.get_all_commits().unwrap().len(), 0);
        assert_eq!(store.get_head().unwrap(), None);
    }

    #[test]
    fn test_symlink_round_trip() {
        let store = MemStore::new();
        let commit = make_commit(0);
        store.create_commit(&commit).unwrap();
        store
            .create_blobs(&[BlobWrite {
                path: "link".to_owned(),
                commit_id: commit.id.clone(),
                mode: FileMode::Symlink,
                payload: BlobPayload::Symlink("a/b.txt".to_owned()),
            }])
            .unwrap();

        let tree = store.get_tree_at_commit(&commit.id).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(
            tree[0].content,
            TreeFileContent::Symlink("a/b.txt".to_owned())
        );
        assert!(tree[0].mode.is_symlink());
    }
}
