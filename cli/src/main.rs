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

mod cli_util;
mod command_error;
mod commands;
mod description_util;
mod progress;
mod text_util;
mod ui;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::FromArgMatches as _;
use pgit_lib::cancel::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::cli_util::CommandHelper;
use crate::ui::Ui;

/// Global options, available before any subcommand.
#[derive(clap::Parser, Clone, Debug)]
#[command(name = "pgit", version)]
#[command(about = "A version control system that stores history in PostgreSQL")]
pub(crate) struct Args {
    /// Run as if started in this directory
    #[arg(long, short = 'C', global = true, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Suppress status output
    #[arg(long, global = true)]
    quiet: bool,

    /// Verbose internal logging
    #[arg(long, global = true)]
    debug: bool,
}

fn main() -> ExitCode {
    let matches = commands::default_app().get_matches();
    let args = Args::from_arg_matches(&matches).expect("global args parse");

    let default_filter = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel()).expect("install Ctrl-C handler");
    }

    let cwd = match &args.directory {
        Some(dir) => dir.clone(),
        None => match std::env::current_dir() {
            Ok(cwd) => cwd,
            Err(err) => {
                eprintln!("Error: cannot determine the working directory: {err}");
                return ExitCode::FAILURE;
            }
        },
    };
    let helper = CommandHelper::new(cwd, cancel);
    let mut ui = Ui::new(args.quiet);

    match commands::run_command(&mut ui, &helper, &matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            ui.error(err.to_string()).ok();
            for cause in err.error_chain() {
                ui.error(format!("Caused by: {cause}")).ok();
            }
            for hint in err.hints() {
                ui.hint(hint).ok();
            }
            ExitCode::from(err.exit_code())
        }
    }
}
