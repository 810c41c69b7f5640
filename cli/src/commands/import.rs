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

use std::fs::File;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use pgit_lib::import::ImportOptions;
use pgit_lib::import::ImportProgress;
use pgit_lib::import::import_fast_export;
use pgit_lib::store::Store as _;
use pgit_lib::working_copy::materialize_tree;

use crate::cli_util::CommandHelper;
use crate::command_error::CommandError;
use crate::command_error::user_error;
use crate::command_error::user_error_with_hint;
use crate::progress::ProgressPrinter;
use crate::ui::Ui;

/// Import a Git history
///
/// Runs `git fast-export` on the source repository (or reads a previously
/// exported stream), then loads commits and file contents into the
/// repository database with parallel workers. A stopped import continues
/// with `--resume`.
#[derive(clap::Args, Clone, Debug)]
pub struct ImportArgs {
    /// Path of the Git repository to export
    #[arg(default_value = ".", value_hint = clap::ValueHint::DirPath)]
    source: PathBuf,

    /// Use an existing fast-export stream file instead of exporting
    #[arg(long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    fastexport: Option<PathBuf>,

    /// Continue an interrupted import
    #[arg(long)]
    resume: bool,

    /// Wipe the repository and import from scratch
    #[arg(long, conflicts_with = "resume")]
    force: bool,

    /// Branch to import (defaults to HEAD)
    #[arg(long, value_name = "BRANCH")]
    branch: Option<String>,

    /// Parallel blob workers (clamped to the storage insert-session limit)
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Skip checking out the working tree afterwards
    #[arg(long)]
    no_checkout: bool,
}

pub fn cmd_import(
    ui: &mut Ui,
    command: &CommandHelper,
    args: &ImportArgs,
) -> Result<(), CommandError> {
    let (repo, store) = command.repo_and_store()?;

    // Phase 1: get the stream onto disk. The file is kept on failure so a
    // later run can pick it up without re-exporting.
    let stream_path = match &args.fastexport {
        Some(path) => command.cwd().join(path),
        None => {
            let source = command.cwd().join(&args.source);
            let path = repo.pgit_dir().join("import.fastexport");
            ui.status(format!("Exporting {}", source.display()))?;
            export_git_stream(&source, args.branch.as_deref(), &path)?;
            path
        }
    };

    let options = ImportOptions {
        workers: args.workers,
        resume: args.resume,
        force: args.force,
        branch: args.branch.as_ref().map(|b| format!("refs/heads/{b}")),
    };
    let progress = Arc::new(ImportProgress::default());
    let printer_stop = Arc::new(AtomicBool::new(false));
    let printer = spawn_progress_printer(Arc::clone(&progress), Arc::clone(&printer_stop));

    let result = import_fast_export(
        store.as_ref(),
        &stream_path,
        &options,
        &progress,
        command.cancel(),
    );
    printer_stop.store(true, Ordering::Relaxed);
    printer.join().ok();

    let report = result.map_err(|err| {
        CommandError::from(err).with_hint(format!(
            "The exported stream is kept at {}; resume with `pgit import --resume --fastexport {0}`",
            stream_path.display()
        ))
    })?;

    ui.status(format!(
        "Imported {} commits, {} file versions across {} paths",
        report.commit_count, report.blob_count, report.path_count
    ))?;
    if report.resumed_commits > 0 || report.skipped_paths > 0 {
        ui.status(format!(
            "Resumed: {} commits and {} paths were already present",
            report.resumed_commits, report.skipped_paths
        ))?;
    }

    if !args.no_checkout
        && let Some(head) = store.get_head().map_err(CommandError::from)?
    {
        let tree = store.get_tree_at_commit(&head).map_err(CommandError::from)?;
        let written = materialize_tree(repo.root(), &tree, std::iter::empty());
        ui.status(format!("Checked out {written} files"))?;
    }

    // The stream served its purpose.
    std::fs::remove_file(&stream_path).ok();
    Ok(())
}

/// Streams `git fast-export` output into `target`.
fn export_git_stream(
    source: &Path,
    branch: Option<&str>,
    target: &Path,
) -> Result<(), CommandError> {
    if !source.join(".git").exists() {
        return Err(user_error_with_hint(
            format!("{} is not a Git repository", source.display()),
            "Pass an exported stream instead: `pgit import --fastexport <file>`",
        ));
    }
    let out = File::create(target)?;
    let status = Command::new("git")
        .arg("-C")
        .arg(source)
        .args([
            "fast-export",
            "--signed-tags=strip",
            "--tag-of-filtered-object=drop",
            "--reencode=yes",
        ])
        .arg(branch.unwrap_or("HEAD"))
        .stdout(Stdio::from(out))
        .status()
        .map_err(|err| {
            user_error_with_hint(
                format!("Failed to run git: {err}"),
                "Is git installed and on PATH?",
            )
        })?;
    if !status.success() {
        return Err(user_error(format!("git fast-export exited with {status}")));
    }
    Ok(())
}

fn spawn_progress_printer(
    progress: Arc<ImportProgress>,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut ui = Ui::new(false);
        let mut printer = ProgressPrinter::new();
        while !stop.load(Ordering::Relaxed) {
            let commits_total = progress.commits_total.load(Ordering::Relaxed);
            let blobs_total = progress.blobs_total.load(Ordering::Relaxed);
            if blobs_total > 0 {
                printer.update(
                    &mut ui,
                    "Importing file versions",
                    progress.blobs_done.load(Ordering::Relaxed),
                    blobs_total,
                );
            } else if commits_total > 0 {
                printer.update(
                    &mut ui,
                    "Importing commits",
                    progress.commits_done.load(Ordering::Relaxed),
                    commits_total,
                );
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        printer.finish(&mut ui);
    })
}
