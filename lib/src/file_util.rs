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

#![expect(missing_docs)]

use std::fs;
use std::fs::File;
use std::io;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tempfile::PersistError;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Cannot access {path}")]
pub struct PathError {
    pub path: PathBuf,
    pub source: io::Error,
}

pub trait IoResultExt<T> {
    fn context(self, path: impl AsRef<Path>) -> Result<T, PathError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn context(self, path: impl AsRef<Path>) -> Result<T, PathError> {
        self.map_err(|error| PathError {
            path: path.as_ref().to_path_buf(),
            source: error,
        })
    }
}

/// Creates a directory or does nothing if the directory already exists.
///
/// Fails if intermediate directories on the path do not already exist.
pub fn create_or_reuse_dir(dirname: &Path) -> io::Result<()> {
    match fs::create_dir(dirname) {
        Ok(()) => Ok(()),
        Err(_) if dirname.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Consumes as much `..` and `.` as possible without considering symlinks.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for c in path.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir
                if matches!(result.components().next_back(), Some(Component::Normal(_))) =>
            {
                // Do not pop ".."
                let popped = result.pop();
                assert!(popped);
            }
            _ => {
                result.push(c);
            }
        }
    }

    if result.as_os_str().is_empty() {
        ".".into()
    } else {
        result
    }
}

/// Replaces whatever is at `link` with a symlink to `target`.
///
/// Removal and creation are two separate syscalls; a crash in between leaves
/// no entry rather than a stale one.
pub fn replace_symlink(target: &Path, link: &Path) -> Result<(), PathError> {
    match fs::symlink_metadata(link) {
        Ok(_) => fs::remove_file(link).context(link)?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err).context(link),
    }
    try_symlink(target, link).context(link)
}

#[cfg(unix)]
pub fn try_symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
pub fn try_symlink(original: &Path, link: &Path) -> io::Result<()> {
    // Requires Developer Mode; the error surfaces to the caller otherwise.
    std::os::windows::fs::symlink_file(original, link)
}

/// Removes now-empty parent directories of `path`, walking upward until
/// `stop_at` (exclusive) or the first non-empty directory.
pub fn remove_empty_parents(path: &Path, stop_at: &Path) -> Result<(), PathError> {
    for parent in path.ancestors().skip(1) {
        if parent == stop_at || !parent.starts_with(stop_at) {
            break;
        }
        match fs::remove_dir(parent) {
            Ok(()) => {}
            // Non-empty or already gone; either way stop climbing.
            Err(_) => break,
        }
    }
    Ok(())
}

/// Persists the temporary file after synchronizing the content.
///
/// After a system crash the persisted file has valid content if it exists at
/// all. The directory entry itself is the caller's problem.
pub fn persist_temp_file<P: AsRef<Path>>(
    temp_file: NamedTempFile,
    new_path: P,
) -> io::Result<File> {
    temp_file.as_file().sync_data()?;
    temp_file
        .persist(new_path)
        .map_err(|PersistError { error, file: _ }| error)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn test_normalize_too_many_dot_dot() {
        assert_eq!(normalize_path(Path::new("foo/..")), Path::new("."));
        assert_eq!(normalize_path(Path::new("foo/../..")), Path::new(".."));
        assert_eq!(
            normalize_path(Path::new("foo/../../../bar/baz/..")),
            Path::new("../../bar")
        );
    }

    #[test]
    fn test_persist_no_existing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let target = temp_dir.path().join("file");
        let mut temp_file = NamedTempFile::new_in(&temp_dir).unwrap();
        temp_file.write_all(b"contents").unwrap();
        assert!(persist_temp_file(temp_file, target).is_ok());
    }

    #[test]
    #[cfg(unix)]
    fn test_replace_symlink_over_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let link = temp_dir.path().join("link");
        fs::write(&link, b"regular file").unwrap();
        replace_symlink(Path::new("target"), &link).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), Path::new("target"));
        // Replacing an existing symlink also works.
        replace_symlink(Path::new("elsewhere"), &link).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), Path::new("elsewhere"));
    }

    #[test]
    fn test_remove_empty_parents() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        let nested = root.join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        let file = nested.join("f");
        fs::write(&file, b"x").unwrap();
        fs::remove_file(&file).unwrap();

        remove_empty_parents(&file, root).unwrap();
        assert!(!root.join("a").exists());
        assert!(root.exists());
    }

    #[test]
    fn test_remove_empty_parents_stops_at_non_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("a/keep"), b"x").unwrap();

        remove_empty_parents(&root.join("a/b/f"), root).unwrap();
        assert!(!root.join("a/b").exists());
        assert!(root.join("a").exists());
    }
}
