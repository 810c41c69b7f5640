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

//! The staging area: the set of path changes the next commit will record.
//!
//! Persisted as JSON in `.pgit/index`. The stored hash is what the file
//! looked like when staged; the commit engine re-reads the working tree, so
//! the hash serves status display rather than content storage.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::content_hash::ContentHash;
use crate::file_util::IoResultExt as _;
use crate::file_util::PathError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagedStatus {
    New,
    Modified,
    Deleted,
}

impl std::fmt::Display for StagedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::New => "new",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        };
        f.pad(label)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedChange {
    pub status: StagedStatus,
    /// Hex hash of the staged content; absent for deletions.
    pub content_hash: Option<String>,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("Corrupt index file {path}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The staging set, loaded from and saved to `.pgit/index`.
#[derive(Clone, Debug)]
pub struct Index {
    path: PathBuf,
    entries: BTreeMap<String, StagedChange>,
}

impl Index {
    /// Loads the index; a missing file is an empty index.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let entries = match fs::read(path) {
            Ok(data) => serde_json::from_slice(&data).map_err(|source| IndexError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(PathError {
                    path: path.to_path_buf(),
                    source: err,
                }
                .into());
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn save(&self) -> Result<(), IndexError> {
        let data = serde_json::to_vec_pretty(&self.entries).expect("index serializes");
        fs::write(&self.path, data).context(&self.path)?;
        Ok(())
    }

    pub fn stage(&mut self, path: &str, status: StagedStatus, hash: Option<&ContentHash>) {
        self.entries.insert(
            path.to_owned(),
            StagedChange {
                status,
                content_hash: hash.map(ContentHash::hex),
            },
        );
    }

    pub fn stage_delete(&mut self, path: &str) {
        self.entries.insert(
            path.to_owned(),
            StagedChange {
                status: StagedStatus::Deleted,
                content_hash: None,
            },
        );
    }

    /// Returns whether the path was staged.
    pub fn unstage(&mut self, path: &str) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn unstage_all(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, path: &str) -> Option<&StagedChange> {
        self.entries.get(path)
    }

    /// Exactly the set the next commit will include, in path order.
    pub fn staged_changes(&self) -> impl Iterator<Item = (&str, &StagedChange)> {
        self.entries.iter().map(|(path, change)| (path.as_str(), change))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_index(dir: &tempfile::TempDir) -> Index {
        Index::load(&dir.path().join("index")).unwrap()
    }

    #[test]
    fn test_missing_file_is_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = temp_index(&dir);
        assert!(index.is_empty());
    }

    #[test]
    fn test_stage_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = temp_index(&dir);
        let hash = ContentHash::of_bytes(b"hello\n");
        index.stage("a.txt", StagedStatus::New, Some(&hash));
        index.stage_delete("b.txt");
        index.save().unwrap();

        let reloaded = temp_index(&dir);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(
            reloaded.get("a.txt"),
            Some(&StagedChange {
                status: StagedStatus::New,
                content_hash: Some(hash.hex()),
            })
        );
        assert_eq!(
            reloaded.get("b.txt"),
            Some(&StagedChange {
                status: StagedStatus::Deleted,
                content_hash: None,
            })
        );
    }

    #[test]
    fn test_unstage() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = temp_index(&dir);
        index.stage("a.txt", StagedStatus::Modified, None);
        assert!(index.unstage("a.txt"));
        assert!(!index.unstage("a.txt"));
        index.stage("b.txt", StagedStatus::New, None);
        index.stage("c.txt", StagedStatus::New, None);
        index.unstage_all();
        assert!(index.is_empty());
    }

    #[test]
    fn test_corrupt_index_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index");
        fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            Index::load(&path),
            Err(IndexError::Corrupt { .. })
        ));
    }
}
