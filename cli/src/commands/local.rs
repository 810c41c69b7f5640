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

//! Lifecycle of the local database container.
//!
//! One PostgreSQL-with-xpatch container serves all local repositories on
//! this machine; each repository uses its own database inside it. The
//! container engine is chosen by `PGIT_CONTAINER_RUNTIME`, else the first of
//! `podman`/`docker` found on PATH.

use std::io::Write as _;
use std::process::Command;
use std::process::Stdio;

use pgit_lib::config::LOCAL_DB_PORT;
use pgit_lib::store::PgStore;

use crate::cli_util::CommandHelper;
use crate::command_error::CommandError;
use crate::command_error::exit_code;
use crate::command_error::user_error;
use crate::ui::Ui;

const CONTAINER_NAME: &str = "pgit-local-db";
const VOLUME_NAME: &str = "pgit-local-data";
const IMAGE: &str = "ghcr.io/pgit-vcs/postgres-xpatch:16";

/// Manage the local database container
#[derive(clap::Subcommand, Clone, Debug)]
pub enum LocalCommand {
    Start(LocalStartArgs),
    Stop(LocalStopArgs),
    Status(LocalStatusArgs),
    Logs(LocalLogsArgs),
    Destroy(LocalDestroyArgs),
    Migrate(LocalMigrateArgs),
    Update(LocalUpdateArgs),
}

/// Start (or create) the database container
#[derive(clap::Args, Clone, Debug)]
pub struct LocalStartArgs {}

/// Stop the database container
#[derive(clap::Args, Clone, Debug)]
pub struct LocalStopArgs {}

/// Show whether the container is running
#[derive(clap::Args, Clone, Debug)]
pub struct LocalStatusArgs {}

/// Show the container's recent logs
#[derive(clap::Args, Clone, Debug)]
pub struct LocalLogsArgs {
    /// Number of log lines
    #[arg(long, short = 'n', default_value_t = 100)]
    tail: usize,
}

/// Remove the container and its data volume
#[derive(clap::Args, Clone, Debug)]
pub struct LocalDestroyArgs {
    /// Required; destroying deletes every local repository database
    #[arg(long)]
    force: bool,
}

/// Upgrade the xpatch extension in this repository's database
#[derive(clap::Args, Clone, Debug)]
pub struct LocalMigrateArgs {}

/// Pull the latest database image
#[derive(clap::Args, Clone, Debug)]
pub struct LocalUpdateArgs {}

pub fn cmd_local(
    ui: &mut Ui,
    command: &CommandHelper,
    subcommand: &LocalCommand,
) -> Result<(), CommandError> {
    match subcommand {
        LocalCommand::Start(_) => start(ui),
        LocalCommand::Stop(_) => stop(ui),
        LocalCommand::Status(_) => status(ui),
        LocalCommand::Logs(args) => logs(ui, args.tail),
        LocalCommand::Destroy(args) => destroy(ui, args.force),
        LocalCommand::Migrate(_) => migrate(ui, command),
        LocalCommand::Update(_) => update(ui),
    }
}

/// The container engine, honoring `PGIT_CONTAINER_RUNTIME`.
fn runtime() -> Result<String, CommandError> {
    if let Ok(runtime) = std::env::var("PGIT_CONTAINER_RUNTIME")
        && !runtime.is_empty()
    {
        return Ok(runtime);
    }
    for candidate in ["podman", "docker"] {
        let found = Command::new(candidate)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success());
        if found {
            return Ok(candidate.to_owned());
        }
    }
    Err(CommandError::new(
        std::io::Error::other("No container runtime found"),
        exit_code::NO_CONTAINER_RUNTIME,
    )
    .with_hint("Install podman or docker")
    .with_hint("Or point PGIT_CONTAINER_RUNTIME at one"))
}

fn run(runtime: &str, args: &[&str]) -> Result<String, CommandError> {
    let output = Command::new(runtime).args(args).output()?;
    if !output.status.success() {
        return Err(user_error(format!(
            "{runtime} {} failed: {}",
            args.first().unwrap_or(&""),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn container_exists(runtime: &str) -> Result<bool, CommandError> {
    let listing = run(
        runtime,
        &[
            "ps",
            "--all",
            "--filter",
            &format!("name={CONTAINER_NAME}"),
            "--format",
            "{{.Names}}",
        ],
    )?;
    Ok(listing.lines().any(|line| line.trim() == CONTAINER_NAME))
}

fn container_running(runtime: &str) -> Result<bool, CommandError> {
    let listing = run(
        runtime,
        &[
            "ps",
            "--filter",
            &format!("name={CONTAINER_NAME}"),
            "--format",
            "{{.Names}}",
        ],
    )?;
    Ok(listing.lines().any(|line| line.trim() == CONTAINER_NAME))
}

fn start(ui: &mut Ui) -> Result<(), CommandError> {
    let runtime = runtime()?;
    if container_running(&runtime)? {
        ui.status("Database container is already running")?;
        return Ok(());
    }
    if container_exists(&runtime)? {
        run(&runtime, &["start", CONTAINER_NAME])?;
    } else {
        let port = format!("{LOCAL_DB_PORT}:5432");
        run(
            &runtime,
            &[
                "run",
                "--detach",
                "--name",
                CONTAINER_NAME,
                "--publish",
                &port,
                "--env",
                "POSTGRES_USER=pgit",
                "--env",
                "POSTGRES_PASSWORD=pgit",
                "--volume",
                &format!("{VOLUME_NAME}:/var/lib/postgresql/data"),
                IMAGE,
            ],
        )?;
    }
    ui.status(format!(
        "Database container started on port {LOCAL_DB_PORT}"
    ))?;
    Ok(())
}

fn stop(ui: &mut Ui) -> Result<(), CommandError> {
    let runtime = runtime()?;
    if !container_running(&runtime)? {
        ui.status("Database container is not running")?;
        return Ok(());
    }
    run(&runtime, &["stop", CONTAINER_NAME])?;
    ui.status("Database container stopped")?;
    Ok(())
}

fn status(ui: &mut Ui) -> Result<(), CommandError> {
    let runtime = runtime()?;
    if container_running(&runtime)? {
        ui.status(format!(
            "Database container is running (port {LOCAL_DB_PORT}, runtime {runtime})"
        ))?;
    } else if container_exists(&runtime)? {
        ui.status("Database container exists but is stopped")?;
        ui.hint("Start it with `pgit local start`")?;
    } else {
        ui.status("No database container")?;
        ui.hint("Create one with `pgit local start`")?;
    }
    Ok(())
}

fn logs(ui: &mut Ui, tail: usize) -> Result<(), CommandError> {
    let runtime = runtime()?;
    let output = run(
        &runtime,
        &["logs", "--tail", &tail.to_string(), CONTAINER_NAME],
    )?;
    write!(ui.stdout(), "{output}")?;
    Ok(())
}

fn destroy(ui: &mut Ui, force: bool) -> Result<(), CommandError> {
    if !force {
        return Err(user_error(
            "Destroying removes every local repository database",
        )
        .with_hint("Pass --force if that is what you want"));
    }
    let runtime = runtime()?;
    if container_running(&runtime)? {
        run(&runtime, &["stop", CONTAINER_NAME])?;
    }
    if container_exists(&runtime)? {
        run(&runtime, &["rm", CONTAINER_NAME])?;
    }
    run(&runtime, &["volume", "rm", "--force", VOLUME_NAME]).ok();
    ui.status("Database container and volume removed")?;
    Ok(())
}

fn migrate(ui: &mut Ui, command: &CommandHelper) -> Result<(), CommandError> {
    let repo = command.repo()?;
    let store = PgStore::connect(&repo.database_url()?).map_err(CommandError::from)?;
    store
        .run_sql("ALTER EXTENSION xpatch UPDATE")
        .map_err(CommandError::from)?;
    ui.status("xpatch extension is up to date")?;
    Ok(())
}

fn update(ui: &mut Ui) -> Result<(), CommandError> {
    let runtime = runtime()?;
    run(&runtime, &["pull", IMAGE])?;
    ui.status("Database image updated; restart with `pgit local stop && pgit local start`")?;
    Ok(())
}
