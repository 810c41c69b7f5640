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

//! Commit-message editing through an external editor.

use std::env;
use std::fs;
use std::io;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::Command;
use std::process::ExitStatus;

use itertools::Itertools as _;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextEditError {
    #[error("Failed to run editor '{name}'")]
    FailedToRun { name: String, source: io::Error },
    #[error("Editor '{name}' exited with {status}")]
    ExitStatus { name: String, status: ExitStatus },
    #[error("Failed to prepare message file")]
    Io(#[from] io::Error),
}

/// The commit-message editor, resolved from `PGIT_EDITOR`, `VISUAL`, then
/// `EDITOR`, in that order.
#[derive(Clone, Debug)]
pub struct TextEditor {
    name: String,
    dir: Option<PathBuf>,
}

impl TextEditor {
    pub fn from_env() -> Self {
        let name = ["PGIT_EDITOR", "VISUAL", "EDITOR"]
            .iter()
            .find_map(|var| env::var(var).ok().filter(|value| !value.is_empty()))
            .unwrap_or_else(|| default_editor().to_owned());
        Self { name, dir: None }
    }

    /// Keeps the temp message file inside `dir` (the `.pgit` directory) so a
    /// crashed editor session leaves it somewhere discoverable.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Writes `content` to a temp file, opens it in the editor, and returns
    /// the edited text.
    pub fn edit_str(&self, content: &str) -> Result<String, TextEditError> {
        let dir = self.dir.clone().unwrap_or_else(env::temp_dir);
        let mut file = tempfile::Builder::new()
            .prefix("COMMIT_EDITMSG-")
            .suffix(".txt")
            .tempfile_in(dir)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        let path = file.path().to_path_buf();

        // The editor is a shell word plus optional arguments.
        let mut words = self.name.split_whitespace();
        let program = words.next().unwrap_or("vi");
        tracing::info!(editor = %self.name, "running editor");
        let status = Command::new(program)
            .args(words)
            .arg(&path)
            .status()
            .map_err(|source| TextEditError::FailedToRun {
                name: self.name.clone(),
                source,
            })?;
        if !status.success() {
            return Err(TextEditError::ExitStatus {
                name: self.name.clone(),
                status,
            });
        }
        Ok(fs::read_to_string(&path)?)
    }
}

#[cfg(unix)]
fn default_editor() -> &'static str {
    "vi"
}

#[cfg(windows)]
fn default_editor() -> &'static str {
    "notepad"
}

/// Strips `#` comment lines and surrounding blank lines; the result is empty
/// when the user wrote nothing.
pub fn cleanup_description(text: &str) -> String {
    let mut description = text
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(str::trim_end)
        .skip_while(|line| line.is_empty())
        .join("\n");
    while description.ends_with('\n') {
        description.pop();
    }
    let trimmed = description.trim_end_matches('\n');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

/// The `-m` flags joined into one message, each flag a paragraph.
pub fn join_message_paragraphs(paragraphs: &[String]) -> String {
    if paragraphs.is_empty() {
        String::new()
    } else {
        format!("{}\n", paragraphs.iter().map(|p| p.trim_end()).join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_strips_comments_and_blanks() {
        let edited = "\n\nSummary line\n\nBody text\n# this is stripped\ntrailing   \n# end\n\n";
        assert_eq!(cleanup_description(edited), "Summary line\n\nBody text\ntrailing\n");
    }

    #[test]
    fn test_cleanup_all_comments_is_empty() {
        assert_eq!(cleanup_description("# nothing\n# here\n"), "");
        assert_eq!(cleanup_description("   \n\n"), "");
    }

    #[test]
    fn test_join_message_paragraphs() {
        assert_eq!(join_message_paragraphs(&[]), "");
        assert_eq!(join_message_paragraphs(&["one".to_owned()]), "one\n");
        assert_eq!(
            join_message_paragraphs(&["one".to_owned(), "two".to_owned()]),
            "one\n\ntwo\n"
        );
    }
}
