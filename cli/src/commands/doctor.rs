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

use std::io::Write as _;

use pgit_lib::repo::Repository;
use pgit_lib::store::META_IMPORT_STATE;
use pgit_lib::store::Store as _;

use crate::cli_util::CommandHelper;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Check the environment and repository health
#[derive(clap::Args, Clone, Debug)]
pub struct DoctorArgs {}

pub fn cmd_doctor(
    ui: &mut Ui,
    command: &CommandHelper,
    _args: &DoctorArgs,
) -> Result<(), CommandError> {
    let mut out = ui.stdout();
    let mut report = |label: &str, ok: bool, detail: String| {
        let mark = if ok { "ok" } else { "FAIL" };
        writeln!(out, "[{mark:>4}] {label}: {detail}")
    };

    let repo = match Repository::find(command.cwd()) {
        Ok(repo) => {
            report("repository", true, repo.root().display().to_string())?;
            repo
        }
        Err(err) => {
            report("repository", false, err.to_string())?;
            return Ok(());
        }
    };

    let identity = repo.config().user.name.is_some() && repo.config().user.email.is_some();
    report(
        "identity",
        identity,
        if identity {
            format!(
                "{} <{}>",
                repo.config().signature().name,
                repo.config().signature().email
            )
        } else {
            "set user.name and user.email with `pgit config`".to_owned()
        },
    )?;

    match repo.database_url() {
        Ok(url) => report("database url", true, url)?,
        Err(err) => {
            report("database url", false, err.to_string())?;
            return Ok(());
        }
    }

    let store = match repo.open_store() {
        Ok(store) => {
            report("connection", true, "reachable".to_owned())?;
            store
        }
        Err(err) => {
            report("connection", false, err.to_string())?;
            report_runtime(&mut report)?;
            return Ok(());
        }
    };

    match store.schema_exists() {
        Ok(true) => report("schema", true, "pgit tables present".to_owned())?,
        Ok(false) => {
            report("schema", false, "missing; run `pgit init`".to_owned())?;
            return Ok(());
        }
        Err(err) => {
            report("schema", false, err.to_string())?;
            return Ok(());
        }
    }

    match store.get_head() {
        Ok(Some(head)) => {
            let consistent = store.commit_exists(&head).unwrap_or(false);
            report(
                "head",
                consistent,
                if consistent {
                    head.to_string()
                } else {
                    format!("{head} points at a missing commit")
                },
            )?;
        }
        Ok(None) => report("head", true, "no commits yet".to_owned())?,
        Err(err) => report("head", false, err.to_string())?,
    }

    match store.get_meta(META_IMPORT_STATE) {
        Ok(Some(state)) if state != "complete" => {
            report(
                "import",
                false,
                format!("stopped in state {state}; `pgit import --resume`"),
            )?;
        }
        Ok(_) => {}
        Err(err) => report("import", false, err.to_string())?,
    }

    report_runtime(&mut report)?;
    Ok(())
}

fn report_runtime(
    report: &mut impl FnMut(&str, bool, String) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let runtime = std::env::var("PGIT_CONTAINER_RUNTIME")
        .ok()
        .filter(|r| !r.is_empty())
        .or_else(|| {
            ["podman", "docker"]
                .iter()
                .find(|candidate| {
                    std::process::Command::new(candidate)
                        .arg("--version")
                        .stdout(std::process::Stdio::null())
                        .stderr(std::process::Stdio::null())
                        .status()
                        .is_ok_and(|status| status.success())
                })
                .map(|s| (*s).to_owned())
        });
    match runtime {
        Some(runtime) => report("container runtime", true, runtime),
        None => report(
            "container runtime",
            false,
            "neither podman nor docker found".to_owned(),
        ),
    }
}
