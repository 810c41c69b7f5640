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

use std::fmt::Write as _;

use pgit_lib::commit::CommitParams;
use pgit_lib::commit::commit_staged;
use pgit_lib::store::Signature;

use crate::cli_util::CommandHelper;
use crate::cli_util::short_commit_hash;
use crate::command_error::CommandError;
use crate::command_error::user_error;
use crate::description_util::TextEditor;
use crate::description_util::cleanup_description;
use crate::description_util::join_message_paragraphs;
use crate::text_util::parse_author;
use crate::ui::Ui;

/// Record the staged changes as a new commit
///
/// Without `-m` the configured editor opens with a template; lines starting
/// with `#` are stripped and an empty message aborts the commit.
#[derive(clap::Args, Clone, Debug)]
pub struct CommitArgs {
    /// The commit message (repeatable; each use adds a paragraph)
    #[arg(long = "message", short, value_name = "MESSAGE")]
    message_paragraphs: Vec<String>,

    /// Record a different author, as "Name <email>"
    #[arg(long, value_name = "AUTHOR")]
    author: Option<String>,
}

pub fn cmd_commit(
    ui: &mut Ui,
    command: &CommandHelper,
    args: &CommitArgs,
) -> Result<(), CommandError> {
    let (repo, store) = command.repo_and_store()?;
    let mut index = repo.load_index()?;
    let merge_state = repo.load_merge_state()?;
    let author: Option<Signature> = args
        .author
        .as_deref()
        .map(|author| parse_author(author).map_err(user_error))
        .transpose()?;

    let message = if args.message_paragraphs.is_empty() {
        let template = commit_message_template(&index, merge_state.as_ref());
        let editor = TextEditor::from_env().with_temp_dir(repo.pgit_dir());
        let edited = editor.edit_str(&template).map_err(user_error)?;
        let message = cleanup_description(&edited);
        if message.is_empty() {
            return Err(user_error("Aborting commit due to empty commit message"));
        }
        message
    } else {
        let message = join_message_paragraphs(&args.message_paragraphs);
        if cleanup_description(&message).is_empty() {
            return Err(user_error("Aborting commit due to empty commit message"));
        }
        message
    };

    let commit = commit_staged(
        store.as_ref(),
        repo.root(),
        &mut index,
        repo.config().signature(),
        CommitParams {
            message,
            author,
            merge_state: merge_state.clone(),
        },
    )?;
    if merge_state.is_some() {
        repo.clear_merge_state()?;
    }
    ui.status(format!(
        "[{}] {}",
        short_commit_hash(&commit.id),
        commit.summary()
    ))?;
    Ok(())
}

fn commit_message_template(
    index: &pgit_lib::index::Index,
    merge_state: Option<&pgit_lib::repo::MergeState>,
) -> String {
    let mut template = String::new();
    if let Some(merge_state) = merge_state {
        let _ = writeln!(
            template,
            "Merge remote {} ({})",
            merge_state.remote_name,
            merge_state.remote_head.short()
        );
    }
    template.push('\n');
    template.push_str("# Please enter the commit message for your changes.\n");
    template.push_str("# Lines starting with '#' will be ignored; an empty\n");
    template.push_str("# message aborts the commit.\n");
    template.push_str("#\n# Changes to be committed:\n");
    for (path, change) in index.staged_changes() {
        let _ = writeln!(template, "#   {}: {path}", change.status);
    }
    template
}
