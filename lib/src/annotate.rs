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

//! Per-line attribution (blame) for a file.
//!
//! The walk goes newest-to-oldest over the path's file_refs while all content
//! versions are loaded in one ascending chain scan, which is the access
//! pattern the delta storage decompresses cheapest. Each line carries the
//! commit it was last seen unchanged in; once a version no longer holds the
//! line at its position (or the path was deleted there), the line is pinned
//! at the attribution it already has.

use std::collections::HashMap;

use crate::store::Commit;
use crate::store::Store;
use crate::store::StoreResult;
use crate::ulid::CommitId;

/// Annotation result: the file's lines at the starting commit, each with the
/// commit that introduced it.
#[derive(Clone, Debug)]
pub struct FileAnnotation {
    lines: Vec<(CommitId, Vec<u8>)>,
    commits: HashMap<CommitId, Commit>,
}

impl FileAnnotation {
    /// Iterates `(originating commit, line)` pairs. Lines include their
    /// newline terminator.
    pub fn lines(&self) -> impl Iterator<Item = (&Commit, &[u8])> {
        self.lines
            .iter()
            .map(|(id, line)| (&self.commits[id], line.as_slice()))
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

/// Annotates `path` as of `at_commit`. Returns `None` when the file does not
/// exist (or is deleted) there.
pub fn annotate(
    store: &dyn Store,
    path: &str,
    at_commit: &CommitId,
) -> StoreResult<Option<FileAnnotation>> {
    let Some(file) = store.get_file_at_commit(path, at_commit)? else {
        return Ok(None);
    };
    let current = file.content.as_bytes().to_vec();
    let current_lines: Vec<Vec<u8>> = current
        .split_inclusive(|b| *b == b'\n')
        .map(<[u8]>::to_vec)
        .collect();

    let history = store.get_file_ref_history(file.group_id)?;
    let contents: HashMap<i32, Vec<u8>> = store
        .get_all_content_for_group(file.group_id)?
        .into_iter()
        .collect();

    // Only history at or before the starting commit participates.
    let mut relevant = history.into_iter().filter(|r| r.commit_id <= *at_commit);

    let mut attribution: Vec<Option<CommitId>> = vec![None; current_lines.len()];
    let mut pinned: Vec<bool> = vec![false; current_lines.len()];
    let mut remaining = current_lines.len();

    while remaining > 0 {
        let Some(file_ref) = relevant.next() else {
            break;
        };
        if file_ref.is_deleted() {
            // The path stopped existing here; everything still unpinned was
            // introduced by a later version.
            break;
        }
        let version_lines: Vec<&[u8]> = contents
            .get(&file_ref.version_id)
            .map(|data| data.split_inclusive(|b| *b == b'\n').collect())
            .unwrap_or_default();
        for (index, line) in current_lines.iter().enumerate() {
            if pinned[index] {
                continue;
            }
            if version_lines.get(index) == Some(&line.as_slice()) {
                attribution[index] = Some(file_ref.commit_id.clone());
            } else {
                pinned[index] = true;
                remaining -= 1;
            }
        }
    }

    let line_commits: Vec<CommitId> = attribution
        .into_iter()
        .map(|id| id.expect("every line matches at least the starting version"))
        .collect();
    let mut commits = HashMap::new();
    for id in &line_commits {
        if !commits.contains_key(id) {
            commits.insert(id.clone(), store.get_commit(id)?);
        }
    }
    let lines = line_commits.into_iter().zip(current_lines).collect();
    Ok(Some(FileAnnotation { lines, commits }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BlobPayload;
    use crate::store::BlobWrite;
    use crate::store::Commit;
    use crate::store::FileMode;
    use crate::store::MemStore;
    use crate::store::Signature;

    struct TestRepo {
        store: MemStore,
        clock: u64,
    }

    impl TestRepo {
        fn new() -> Self {
            Self {
                store: MemStore::new(),
                clock: 1_700_000_000_000,
            }
        }

        fn commit_file(&mut self, path: &str, content: Option<&[u8]>) -> CommitId {
            self.clock += 1000;
            let signature = Signature {
                name: "Test".to_owned(),
                email: "t@example.com".to_owned(),
            };
            let commit = Commit {
                id: CommitId::generate_with_time(self.clock),
                parent_id: self.store.get_head().unwrap(),
                tree_hash: Commit::hash_changes([(path, FileMode::Normal, content.is_none())]),
                message: format!("touch {path}"),
                author: signature.clone(),
                authored_at: self.clock as i64,
                committer: signature,
                committed_at: self.clock as i64,
            };
            self.store.create_commit(&commit).unwrap();
            self.store
                .create_blobs(&[BlobWrite {
                    path: path.to_owned(),
                    commit_id: commit.id.clone(),
                    mode: FileMode::Normal,
                    payload: match content {
                        Some(data) => BlobPayload::Data(data.to_vec()),
                        None => BlobPayload::Delete,
                    },
                }])
                .unwrap();
            self.store.set_head(Some(&commit.id)).unwrap();
            commit.id
        }
    }

    fn attributions(annotation: &FileAnnotation) -> Vec<(CommitId, Vec<u8>)> {
        annotation
            .lines()
            .map(|(commit, line)| (commit.id.clone(), line.to_vec()))
            .collect()
    }

    #[test]
    fn test_annotate_single_commit() {
        let mut repo = TestRepo::new();
        let c1 = repo.commit_file("a.txt", Some(b"x\ny\n"));
        let annotation = annotate(&repo.store, "a.txt", &c1).unwrap().unwrap();
        assert_eq!(
            attributions(&annotation),
            vec![(c1.clone(), b"x\n".to_vec()), (c1, b"y\n".to_vec())]
        );
    }

    #[test]
    fn test_annotate_attributes_changed_line_to_newer_commit() {
        let mut repo = TestRepo::new();
        let c1 = repo.commit_file("a.txt", Some(b"one\ntwo\n"));
        let c2 = repo.commit_file("a.txt", Some(b"one\nTWO\n"));
        let annotation = annotate(&repo.store, "a.txt", &c2).unwrap().unwrap();
        assert_eq!(
            attributions(&annotation),
            vec![(c1, b"one\n".to_vec()), (c2, b"TWO\n".to_vec())]
        );
    }

    #[test]
    fn test_annotate_deletion_pins_later_attribution() {
        // C1 adds the line, C2 deletes the file, C3 re-adds identical
        // content. The deletion breaks the chain, so the line belongs to C3.
        let mut repo = TestRepo::new();
        repo.commit_file("a.txt", Some(b"x\n"));
        repo.commit_file("a.txt", None);
        let c3 = repo.commit_file("a.txt", Some(b"x\n"));
        let annotation = annotate(&repo.store, "a.txt", &c3).unwrap().unwrap();
        assert_eq!(attributions(&annotation), vec![(c3, b"x\n".to_vec())]);
    }

    #[test]
    fn test_annotate_missing_file_is_none() {
        let mut repo = TestRepo::new();
        let c1 = repo.commit_file("a.txt", Some(b"x\n"));
        assert!(annotate(&repo.store, "nope.txt", &c1).unwrap().is_none());
        let c2 = repo.commit_file("a.txt", None);
        assert!(annotate(&repo.store, "a.txt", &c2).unwrap().is_none());
    }

    #[test]
    fn test_annotate_insertion_shifts_pin_following_lines() {
        let mut repo = TestRepo::new();
        let c1 = repo.commit_file("a.txt", Some(b"a\nb\n"));
        let c2 = repo.commit_file("a.txt", Some(b"new\na\nb\n"));
        let annotation = annotate(&repo.store, "a.txt", &c2).unwrap().unwrap();
        // Index-based matching: the shifted lines no longer match their old
        // positions, so they stay with the inserting commit.
        assert_eq!(
            attributions(&annotation),
            vec![
                (c2.clone(), b"new\n".to_vec()),
                (c2.clone(), b"a\n".to_vec()),
                (c2, b"b\n".to_vec()),
            ]
        );
        drop(c1);
    }

    #[test]
    fn test_annotate_every_line_has_exactly_one_commit() {
        let mut repo = TestRepo::new();
        repo.commit_file("a.txt", Some(b"1\n2\n3\n"));
        repo.commit_file("a.txt", Some(b"1\ntwo\n3\n"));
        let c3 = repo.commit_file("a.txt", Some(b"1\ntwo\n3\n4\n"));
        let annotation = annotate(&repo.store, "a.txt", &c3).unwrap().unwrap();
        assert_eq!(annotation.line_count(), 4);
        for (commit, _) in annotation.lines() {
            assert!(repo.store.commit_exists(&commit.id).unwrap());
        }
    }
}
