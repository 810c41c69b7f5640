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

//! Repository discovery and the `.pgit/` metadata directory.
//!
//! The versioned data lives in the database; `.pgit/` holds only the config,
//! the staging index, the optional ignore file, and the merge state left
//! behind by a conflicted pull.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::config::RepoConfig;
use crate::file_util::IoResultExt as _;
use crate::file_util::PathError;
use crate::file_util::create_or_reuse_dir;
use crate::index::Index;
use crate::index::IndexError;
use crate::store::PgStore;
use crate::store::Store;
use crate::store::StoreError;
use crate::ulid::CommitId;
use crate::working_copy::REPO_DIR;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("There is no pgit repository in {0} or any parent directory")]
    NotARepository(PathBuf),
    #[error("{0} is already a pgit repository")]
    AlreadyInitialized(PathBuf),
    #[error("No database configured; set core.local_db or core.database_url")]
    NoDatabase,
    #[error("Remote {0} does not exist")]
    RemoteNotFound(String),
    #[error("Remote {0} already exists")]
    RemoteAlreadyExists(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Corrupt merge state file {path}")]
    CorruptMergeState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Conflicts left behind by a diverged pull, pending resolution. The next
/// commit consumes this and records the merged remote head in its message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeState {
    pub remote_name: String,
    pub local_head: CommitId,
    pub remote_head: CommitId,
    pub conflicted_paths: Vec<String>,
}

/// An opened repository: the working-copy root plus its `.pgit/` contents.
#[derive(Debug)]
pub struct Repository {
    root: PathBuf,
    config: RepoConfig,
}

impl Repository {
    /// Walks upward from `start` until a `.pgit` directory is found.
    pub fn find(start: &Path) -> Result<Self, RepoError> {
        let mut dir = start;
        loop {
            if dir.join(REPO_DIR).is_dir() {
                return Self::open(dir);
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => return Err(RepoError::NotARepository(start.to_path_buf())),
            }
        }
    }

    pub fn open(root: &Path) -> Result<Self, RepoError> {
        let config = RepoConfig::load(&root.join(REPO_DIR).join("config"))?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    /// Creates `.pgit/` with a seeded config. Fails if one exists already.
    pub fn init(root: &Path, config: RepoConfig) -> Result<Self, RepoError> {
        let pgit_dir = root.join(REPO_DIR);
        if pgit_dir.exists() {
            return Err(RepoError::AlreadyInitialized(root.to_path_buf()));
        }
        create_or_reuse_dir(&pgit_dir).context(&pgit_dir)?;
        config.save(&pgit_dir.join("config"))?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pgit_dir(&self) -> PathBuf {
        self.root.join(REPO_DIR)
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RepoConfig {
        &mut self.config
    }

    pub fn save_config(&self) -> Result<(), RepoError> {
        self.config.save(&self.pgit_dir().join("config"))?;
        Ok(())
    }

    pub fn load_index(&self) -> Result<Index, RepoError> {
        Ok(Index::load(&self.pgit_dir().join("index"))?)
    }

    pub fn database_url(&self) -> Result<String, RepoError> {
        self.config.database_url().ok_or(RepoError::NoDatabase)
    }

    /// Connects to this repository's own database.
    pub fn open_store(&self) -> Result<Box<dyn Store>, RepoError> {
        let store = PgStore::connect(&self.database_url()?)?;
        Ok(Box::new(store))
    }

    pub fn remote_url(&self, name: &str) -> Result<String, RepoError> {
        self.config
            .remotes
            .get(name)
            .cloned()
            .ok_or_else(|| RepoError::RemoteNotFound(name.to_owned()))
    }

    pub fn add_remote(&mut self, name: &str, url: &str) -> Result<(), RepoError> {
        if self.config.remotes.contains_key(name) {
            return Err(RepoError::RemoteAlreadyExists(name.to_owned()));
        }
        self.config.remotes.insert(name.to_owned(), url.to_owned());
        Ok(())
    }

    pub fn remove_remote(&mut self, name: &str) -> Result<(), RepoError> {
        if self.config.remotes.remove(name).is_none() {
            return Err(RepoError::RemoteNotFound(name.to_owned()));
        }
        Ok(())
    }

    pub fn set_remote_url(&mut self, name: &str, url: &str) -> Result<(), RepoError> {
        match self.config.remotes.get_mut(name) {
            Some(existing) => {
                *existing = url.to_owned();
                Ok(())
            }
            None => Err(RepoError::RemoteNotFound(name.to_owned())),
        }
    }

    fn merge_state_path(&self) -> PathBuf {
        self.pgit_dir().join("merge_state.json")
    }

    pub fn load_merge_state(&self) -> Result<Option<MergeState>, RepoError> {
        let path = self.merge_state_path();
        match fs::read(&path) {
            Ok(data) => {
                let state = serde_json::from_slice(&data)
                    .map_err(|source| RepoError::CorruptMergeState { path, source })?;
                Ok(Some(state))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PathError { path, source: err }.into()),
        }
    }

    pub fn save_merge_state(&self, state: &MergeState) -> Result<(), RepoError> {
        let path = self.merge_state_path();
        let data = serde_json::to_vec_pretty(state).expect("merge state serializes");
        fs::write(&path, data).context(&path)?;
        Ok(())
    }

    pub fn clear_merge_state(&self) -> Result<(), RepoError> {
        let path = self.merge_state_path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(PathError { path, source: err }.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn init_repo(dir: &Path) -> Repository {
        let mut config = RepoConfig::default();
        config.core.local_db = Some("test".to_owned());
        Repository::init(dir, config).unwrap()
    }

    #[test]
    fn test_init_and_find_from_subdir() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        let found = Repository::find(&nested).unwrap();
        assert_eq!(found.root(), dir.path());
    }

    #[test]
    fn test_init_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        assert_matches!(
            Repository::init(dir.path(), RepoConfig::default()),
            Err(RepoError::AlreadyInitialized(_))
        );
    }

    #[test]
    fn test_find_outside_repo_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(
            Repository::find(dir.path()),
            Err(RepoError::NotARepository(_))
        );
    }

    #[test]
    fn test_remote_management() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = init_repo(dir.path());
        repo.add_remote("origin", "postgres://db/one").unwrap();
        assert_matches!(
            repo.add_remote("origin", "postgres://db/two"),
            Err(RepoError::RemoteAlreadyExists(_))
        );
        repo.set_remote_url("origin", "postgres://db/two").unwrap();
        assert_eq!(repo.remote_url("origin").unwrap(), "postgres://db/two");
        repo.remove_remote("origin").unwrap();
        assert_matches!(
            repo.remote_url("origin"),
            Err(RepoError::RemoteNotFound(_))
        );
    }

    #[test]
    fn test_merge_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        assert_eq!(repo.load_merge_state().unwrap(), None);
        let state = MergeState {
            remote_name: "origin".to_owned(),
            local_head: CommitId::generate_with_time(1),
            remote_head: CommitId::generate_with_time(2),
            conflicted_paths: vec!["a.txt".to_owned()],
        };
        repo.save_merge_state(&state).unwrap();
        assert_eq!(repo.load_merge_state().unwrap(), Some(state));
        repo.clear_merge_state().unwrap();
        assert_eq!(repo.load_merge_state().unwrap(), None);
    }
}
