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

//! Working-tree scanning and materialization.
//!
//! The scanner walks the working directory into a `path -> (hash, mode)`
//! snapshot honoring `.pgit/ignore` (Git ignore semantics). Materialization
//! writes a stored tree back to disk; per-file I/O failures are logged and
//! skipped so one unwritable path does not abort a checkout or pull.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;

use ignore::gitignore::Gitignore;
use ignore::gitignore::GitignoreBuilder;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::content_hash::ContentHash;
use crate::file_util::IoResultExt as _;
use crate::file_util::PathError;
use crate::file_util::persist_temp_file;
use crate::file_util::remove_empty_parents;
use crate::file_util::replace_symlink;
use crate::store::FileMode;
use crate::store::TreeFile;
use crate::store::TreeFileContent;

/// Files at or above this size are hashed through a streaming reader instead
/// of being buffered whole.
const STREAMING_THRESHOLD: u64 = 1 << 20;

/// Name of the repository metadata directory, never scanned.
pub const REPO_DIR: &str = ".pgit";

#[derive(Debug, Error)]
pub enum WorkingCopyError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("Invalid ignore rules")]
    Ignore(#[from] ignore::Error),
}

/// One scanned working-tree entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScannedFile {
    pub hash: ContentHash,
    pub mode: FileMode,
    pub symlink_target: Option<String>,
}

/// Snapshot of the working tree, keyed by repo-relative slash path.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    files: BTreeMap<String, ScannedFile>,
}

impl Snapshot {
    pub fn files(&self) -> impl Iterator<Item = (&str, &ScannedFile)> {
        self.files.iter().map(|(path, file)| (path.as_str(), file))
    }

    pub fn get(&self, path: &str) -> Option<&ScannedFile> {
        self.files.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// How a working-tree path differs from the reference tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileStatus {
    New,
    Modified,
    Deleted,
}

/// Compiles the repository ignore file (if any) into a matcher.
pub fn load_ignore(root: &Path) -> Result<Gitignore, WorkingCopyError> {
    let mut builder = GitignoreBuilder::new(root);
    let ignore_file = root.join(REPO_DIR).join("ignore");
    if ignore_file.is_file()
        && let Some(err) = builder.add(&ignore_file)
    {
        return Err(err.into());
    }
    Ok(builder.build()?)
}

/// Walks the working directory under `root` into a snapshot.
pub fn snapshot(root: &Path, ignore: &Gitignore) -> Result<Snapshot, WorkingCopyError> {
    let mut files = BTreeMap::new();
    scan_dir(root, root, ignore, &mut files)?;
    Ok(Snapshot { files })
}

fn scan_dir(
    root: &Path,
    dir: &Path,
    ignore: &Gitignore,
    files: &mut BTreeMap<String, ScannedFile>,
) -> Result<(), WorkingCopyError> {
    for entry in dir.read_dir().context(dir)? {
        let entry = entry.context(dir)?;
        let disk_path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            tracing::warn!(path = %disk_path.display(), "skipping non-UTF-8 file name");
            continue;
        };
        if dir == root && name == REPO_DIR {
            continue;
        }
        let metadata = disk_path.symlink_metadata().context(&disk_path)?;
        let file_type = metadata.file_type();
        let repo_path = to_repo_path(root, &disk_path);
        if ignore
            .matched_path_or_any_parents(&disk_path, file_type.is_dir())
            .is_ignore()
        {
            continue;
        }
        if file_type.is_dir() {
            scan_dir(root, &disk_path, ignore, files)?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(&disk_path).context(&disk_path)?;
            let target = target.to_string_lossy().into_owned();
            files.insert(
                repo_path,
                ScannedFile {
                    hash: ContentHash::of_bytes(target.as_bytes()),
                    mode: FileMode::Symlink,
                    symlink_target: Some(target),
                },
            );
        } else if file_type.is_file() {
            let hash = if metadata.len() >= STREAMING_THRESHOLD {
                let mut file = fs::File::open(&disk_path).context(&disk_path)?;
                ContentHash::of_reader(&mut file).context(&disk_path)?
            } else {
                ContentHash::of_bytes(&fs::read(&disk_path).context(&disk_path)?)
            };
            files.insert(
                repo_path,
                ScannedFile {
                    hash,
                    mode: file_mode_of(&metadata),
                    symlink_target: None,
                },
            );
        }
        // Sockets, fifos and the like are not versioned.
    }
    Ok(())
}

#[cfg(unix)]
fn file_mode_of(metadata: &fs::Metadata) -> FileMode {
    use std::os::unix::fs::PermissionsExt as _;
    if metadata.permissions().mode() & 0o111 != 0 {
        FileMode::Executable
    } else {
        FileMode::Normal
    }
}

#[cfg(windows)]
fn file_mode_of(_metadata: &fs::Metadata) -> FileMode {
    FileMode::Normal
}

fn to_repo_path(root: &Path, disk_path: &Path) -> String {
    let relative = disk_path.strip_prefix(root).expect("scanned under root");
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Converts a stored repo path to an on-disk path under `root`. Rejects
/// traversal components; stored histories are not trusted to be benign.
pub fn to_fs_path(root: &Path, repo_path: &str) -> Option<PathBuf> {
    if repo_path.is_empty() {
        return None;
    }
    let mut result = root.to_path_buf();
    for component in repo_path.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return None;
        }
        result.push(component);
    }
    Some(result)
}

/// Diffs a snapshot against a reference tree into per-path statuses.
pub fn status_against_tree(
    snapshot: &Snapshot,
    tree: &[TreeFile],
) -> BTreeMap<String, FileStatus> {
    let tree_by_path: BTreeMap<&str, &TreeFile> =
        tree.iter().map(|f| (f.path.as_str(), f)).collect();
    let mut statuses = BTreeMap::new();
    for (path, scanned) in snapshot.files() {
        match tree_by_path.get(path) {
            None => {
                statuses.insert(path.to_owned(), FileStatus::New);
            }
            Some(stored) => {
                if stored.content_hash != scanned.hash || stored.mode != scanned.mode {
                    statuses.insert(path.to_owned(), FileStatus::Modified);
                }
            }
        }
    }
    for path in tree_by_path.keys() {
        if snapshot.get(path).is_none() {
            statuses.insert((*path).to_owned(), FileStatus::Deleted);
        }
    }
    statuses
}

/// Writes one stored file to the working tree, creating parent directories.
pub fn write_tree_file(root: &Path, file: &TreeFile) -> Result<(), PathError> {
    let Some(disk_path) = to_fs_path(root, &file.path) else {
        tracing::warn!(path = %file.path, "refusing to materialize unsafe path");
        return Ok(());
    };
    let parent = disk_path.parent().unwrap_or(root);
    fs::create_dir_all(parent).context(parent)?;
    match &file.content {
        TreeFileContent::Symlink(target) => {
            replace_symlink(Path::new(target), &disk_path)?;
        }
        TreeFileContent::Data(data) => {
            // Write-then-rename: a crash mid-checkout leaves either the old
            // content or the new, never a torn file. The rename also
            // replaces any symlink at the destination instead of writing
            // through it.
            let mut temp = NamedTempFile::new_in(parent).context(parent)?;
            temp.write_all(data).context(&disk_path)?;
            persist_temp_file(temp, &disk_path).context(&disk_path)?;
            set_file_mode(&disk_path, file.mode)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_file_mode(path: &Path, mode: FileMode) -> Result<(), PathError> {
    use std::os::unix::fs::PermissionsExt as _;
    let raw = match mode {
        FileMode::Executable => 0o755,
        _ => 0o644,
    };
    fs::set_permissions(path, fs::Permissions::from_mode(raw)).context(path)
}

#[cfg(windows)]
fn set_file_mode(_path: &Path, _mode: FileMode) -> Result<(), PathError> {
    Ok(())
}

/// Materializes `target` files and removes paths present in `previous` but
/// absent from `target`, pruning newly-empty directories. Per-path I/O
/// failures are logged and skipped; returns how many paths were written.
pub fn materialize_tree(
    root: &Path,
    target: &[TreeFile],
    previous: impl IntoIterator<Item = String>,
) -> usize {
    let target_paths: BTreeSet<&str> = target.iter().map(|f| f.path.as_str()).collect();
    for path in previous {
        if target_paths.contains(path.as_str()) {
            continue;
        }
        let Some(disk_path) = to_fs_path(root, &path) else {
            continue;
        };
        match fs::remove_file(&disk_path) {
            Ok(()) => {
                remove_empty_parents(&disk_path, root).ok();
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "failed to remove file");
            }
        }
    }
    let mut written = 0;
    for file in target {
        match write_tree_file(root, file) {
            Ok(()) => written += 1,
            Err(err) => {
                tracing::warn!(path = %file.path, error = %err, "failed to write file");
            }
        }
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(root: &Path) -> Snapshot {
        let ignore = load_ignore(root).unwrap();
        snapshot(root, &ignore).unwrap()
    }

    fn tree_file(path: &str, data: &[u8]) -> TreeFile {
        TreeFile {
            path: path.to_owned(),
            group_id: 1,
            version_id: 1,
            content_hash: ContentHash::of_bytes(data),
            mode: FileMode::Normal,
            is_binary: false,
            content: TreeFileContent::Data(data.to_vec()),
        }
    }

    #[test]
    fn test_snapshot_walks_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("top.txt"), b"top").unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/b/deep.txt"), b"deep").unwrap();

        let snapshot = scan(dir.path());
        let paths: Vec<&str> = snapshot.paths().collect();
        assert_eq!(paths, vec!["a/b/deep.txt", "top.txt"]);
        assert_eq!(
            snapshot.get("a/b/deep.txt").unwrap().hash,
            ContentHash::of_bytes(b"deep")
        );
    }

    #[test]
    fn test_snapshot_skips_repo_dir_and_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(REPO_DIR)).unwrap();
        fs::write(dir.path().join(REPO_DIR).join("ignore"), b"*.log\ntarget/\n").unwrap();
        fs::write(dir.path().join(REPO_DIR).join("config"), b"").unwrap();
        fs::write(dir.path().join("kept.txt"), b"x").unwrap();
        fs::write(dir.path().join("noise.log"), b"x").unwrap();
        fs::create_dir(dir.path().join("target")).unwrap();
        fs::write(dir.path().join("target/out"), b"x").unwrap();

        let snapshot = scan(dir.path());
        let paths: Vec<&str> = snapshot.paths().collect();
        assert_eq!(paths, vec!["kept.txt"]);
    }

    #[test]
    fn test_ignore_negation() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(REPO_DIR)).unwrap();
        fs::write(
            dir.path().join(REPO_DIR).join("ignore"),
            b"*.log\n!keep.log\n",
        )
        .unwrap();
        fs::write(dir.path().join("drop.log"), b"x").unwrap();
        fs::write(dir.path().join("keep.log"), b"x").unwrap();

        let snapshot = scan(dir.path());
        let paths: Vec<&str> = snapshot.paths().collect();
        assert_eq!(paths, vec!["keep.log"]);
    }

    #[test]
    #[cfg(unix)]
    fn test_snapshot_records_symlinks_and_exec_bit() {
        use std::os::unix::fs::PermissionsExt as _;
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("script.sh"), b"#!/bin/sh\n").unwrap();
        fs::set_permissions(
            dir.path().join("script.sh"),
            fs::Permissions::from_mode(0o755),
        )
        .unwrap();
        std::os::unix::fs::symlink("script.sh", dir.path().join("link")).unwrap();

        let snapshot = scan(dir.path());
        assert_eq!(snapshot.get("script.sh").unwrap().mode, FileMode::Executable);
        let link = snapshot.get("link").unwrap();
        assert_eq!(link.mode, FileMode::Symlink);
        assert_eq!(link.symlink_target.as_deref(), Some("script.sh"));
    }

    #[test]
    fn test_status_against_tree() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("same.txt"), b"same").unwrap();
        fs::write(dir.path().join("changed.txt"), b"new content").unwrap();
        fs::write(dir.path().join("untracked.txt"), b"x").unwrap();
        let tree = vec![
            tree_file("same.txt", b"same"),
            tree_file("changed.txt", b"old content"),
            tree_file("removed.txt", b"gone"),
        ];

        let statuses = status_against_tree(&scan(dir.path()), &tree);
        assert_eq!(statuses["changed.txt"], FileStatus::Modified);
        assert_eq!(statuses["untracked.txt"], FileStatus::New);
        assert_eq!(statuses["removed.txt"], FileStatus::Deleted);
        assert!(!statuses.contains_key("same.txt"));
    }

    #[test]
    fn test_to_fs_path_rejects_traversal() {
        let root = Path::new("/repo");
        assert!(to_fs_path(root, "a/b.txt").is_some());
        assert!(to_fs_path(root, "../escape").is_none());
        assert!(to_fs_path(root, "a/../../escape").is_none());
        assert!(to_fs_path(root, "").is_none());
        assert!(to_fs_path(root, "a//b").is_none());
    }

    #[test]
    fn test_materialize_tree_writes_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("old")).unwrap();
        fs::write(dir.path().join("old/stale.txt"), b"stale").unwrap();

        let target = vec![tree_file("new/fresh.txt", b"fresh")];
        let written = materialize_tree(dir.path(), &target, vec!["old/stale.txt".to_owned()]);
        assert_eq!(written, 1);
        assert_eq!(
            fs::read(dir.path().join("new/fresh.txt")).unwrap(),
            b"fresh"
        );
        assert!(!dir.path().join("old").exists());
    }

    #[test]
    fn test_materialize_overwrites_and_keeps_shared_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"old").unwrap();
        let target = vec![tree_file("a.txt", b"new")];
        materialize_tree(dir.path(), &target, vec!["a.txt".to_owned()]);
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"new");
    }

    #[test]
    #[cfg(unix)]
    fn test_write_replaces_symlink_without_following_it() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("victim.txt"), b"untouched").unwrap();
        std::os::unix::fs::symlink("victim.txt", dir.path().join("a.txt")).unwrap();

        write_tree_file(dir.path(), &tree_file("a.txt", b"new")).unwrap();
        let metadata = dir.path().join("a.txt").symlink_metadata().unwrap();
        assert!(metadata.file_type().is_file());
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"new");
        // The rename replaced the link itself, not what it pointed at.
        assert_eq!(fs::read(dir.path().join("victim.txt")).unwrap(), b"untouched");
    }
}
