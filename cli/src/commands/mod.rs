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

mod add;
mod analyze;
mod blame;
mod checkout;
mod clone;
mod commit;
mod config;
mod diff;
mod doctor;
mod import;
mod init;
mod local;
mod log;
mod mv;
mod pull;
mod push;
mod remote;
mod reset;
mod rm;
mod search;
mod sql;
mod stats;
mod status;
mod update;

use clap::CommandFactory as _;
use clap::FromArgMatches as _;
use clap::Subcommand as _;
use tracing::instrument;

use crate::cli_util::CommandHelper;
use crate::command_error::CommandError;
use crate::ui::Ui;

#[derive(clap::Parser, Clone, Debug)]
#[command(disable_help_subcommand = true)]
enum Command {
    Add(add::AddArgs),
    #[command(subcommand)]
    Analyze(analyze::AnalyzeCommand),
    Blame(blame::BlameArgs),
    Checkout(checkout::CheckoutArgs),
    Clone(clone::CloneArgs),
    Commit(commit::CommitArgs),
    Config(config::ConfigArgs),
    Diff(diff::DiffArgs),
    Doctor(doctor::DoctorArgs),
    Import(import::ImportArgs),
    Init(init::InitArgs),
    #[command(subcommand)]
    Local(local::LocalCommand),
    Log(log::LogArgs),
    Mv(mv::MvArgs),
    Pull(pull::PullArgs),
    Push(push::PushArgs),
    #[command(subcommand)]
    Remote(remote::RemoteCommand),
    Reset(reset::ResetArgs),
    Rm(rm::RmArgs),
    Search(search::SearchArgs),
    Sql(sql::SqlArgs),
    Stats(stats::StatsArgs),
    Status(status::StatusArgs),
    Update(update::UpdateArgs),
}

pub fn default_app() -> clap::Command {
    Command::augment_subcommands(crate::Args::command())
        .subcommand_required(true)
        .arg_required_else_help(true)
}

#[instrument(skip_all)]
pub fn run_command(
    ui: &mut Ui,
    command_helper: &CommandHelper,
    matches: &clap::ArgMatches,
) -> Result<(), CommandError> {
    let subcommand = Command::from_arg_matches(matches).unwrap();
    match &subcommand {
        Command::Add(args) => add::cmd_add(ui, command_helper, args),
        Command::Analyze(args) => analyze::cmd_analyze(ui, command_helper, args),
        Command::Blame(args) => blame::cmd_blame(ui, command_helper, args),
        Command::Checkout(args) => checkout::cmd_checkout(ui, command_helper, args),
        Command::Clone(args) => clone::cmd_clone(ui, command_helper, args),
        Command::Commit(args) => commit::cmd_commit(ui, command_helper, args),
        Command::Config(args) => config::cmd_config(ui, command_helper, args),
        Command::Diff(args) => diff::cmd_diff(ui, command_helper, args),
        Command::Doctor(args) => doctor::cmd_doctor(ui, command_helper, args),
        Command::Import(args) => import::cmd_import(ui, command_helper, args),
        Command::Init(args) => init::cmd_init(ui, command_helper, args),
        Command::Local(args) => local::cmd_local(ui, command_helper, args),
        Command::Log(args) => log::cmd_log(ui, command_helper, args),
        Command::Mv(args) => mv::cmd_mv(ui, command_helper, args),
        Command::Pull(args) => pull::cmd_pull(ui, command_helper, args),
        Command::Push(args) => push::cmd_push(ui, command_helper, args),
        Command::Remote(args) => remote::cmd_remote(ui, command_helper, args),
        Command::Reset(args) => reset::cmd_reset(ui, command_helper, args),
        Command::Rm(args) => rm::cmd_rm(ui, command_helper, args),
        Command::Search(args) => search::cmd_search(ui, command_helper, args),
        Command::Sql(args) => sql::cmd_sql(ui, command_helper, args),
        Command::Stats(args) => stats::cmd_stats(ui, command_helper, args),
        Command::Status(args) => status::cmd_status(ui, command_helper, args),
        Command::Update(args) => update::cmd_update(ui, command_helper, args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_app() {
        default_app().debug_assert();
    }
}
