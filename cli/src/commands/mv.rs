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

use pgit_lib::content_hash::ContentHash;
use pgit_lib::index::StagedStatus;
use pgit_lib::working_copy::to_fs_path;

use crate::cli_util::CommandHelper;
use crate::cli_util::repo_relative_path;
use crate::command_error::CommandError;
use crate::command_error::exit_code;
use crate::command_error::user_error;
use crate::ui::Ui;

/// Move or rename a tracked file
///
/// Stages a deletion at the old path and an addition at the new one. The
/// new path gets a fresh file history; histories never follow renames.
#[derive(clap::Args, Clone, Debug)]
pub struct MvArgs {
    /// Current path
    #[arg(value_hint = clap::ValueHint::FilePath)]
    source: String,

    /// New path
    #[arg(value_hint = clap::ValueHint::AnyPath)]
    destination: String,
}

pub fn cmd_mv(ui: &mut Ui, command: &CommandHelper, args: &MvArgs) -> Result<(), CommandError> {
    let repo = command.repo()?;
    let source = repo_relative_path(&repo, command.cwd(), &args.source)?;
    let destination = repo_relative_path(&repo, command.cwd(), &args.destination)?;

    let source_disk = to_fs_path(repo.root(), &source)
        .ok_or_else(|| user_error(format!("Invalid path {source:?}")))?;
    let destination_disk = to_fs_path(repo.root(), &destination)
        .ok_or_else(|| user_error(format!("Invalid path {destination:?}")))?;
    if !source_disk.exists() {
        return Err(CommandError::new(
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{source:?} does not exist"),
            ),
            exit_code::FILE_NOT_FOUND,
        ));
    }
    if destination_disk.exists() {
        return Err(user_error(format!("{destination:?} already exists")));
    }
    if let Some(parent) = destination_disk.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(&source_disk, &destination_disk)?;

    let mut index = repo.load_index()?;
    index.stage_delete(&source);
    let hash = std::fs::read(&destination_disk)
        .ok()
        .map(|data| ContentHash::of_bytes(&data));
    index.stage(&destination, StagedStatus::New, hash.as_ref());
    index.save()?;
    ui.status(format!("Renamed {source} to {destination}"))?;
    Ok(())
}
