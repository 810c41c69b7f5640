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

use pgit_lib::analyze;
use pgit_lib::analyze::ActivityPeriod;
use pgit_lib::analyze::CouplingOptions;

use crate::cli_util::CommandHelper;
use crate::command_error::CommandError;
use crate::text_util::format_timestamp;
use crate::ui::Ui;

/// Repository analysis reports
#[derive(clap::Subcommand, Clone, Debug)]
pub enum AnalyzeCommand {
    Churn(ChurnArgs),
    Coupling(CouplingArgs),
    Hotspots(HotspotsArgs),
    Authors(AuthorsArgs),
    Activity(ActivityArgs),
    BusFactor(BusFactorArgs),
}

/// Most frequently changed files
#[derive(clap::Args, Clone, Debug)]
pub struct ChurnArgs {
    /// Number of entries to show
    #[arg(long, short = 'n', default_value_t = 20)]
    limit: usize,
}

/// Files that tend to change together
#[derive(clap::Args, Clone, Debug)]
pub struct CouplingArgs {
    /// Number of entries to show
    #[arg(long, short = 'n', default_value_t = 20)]
    limit: usize,

    /// Skip commits touching more than this many files (bulk reformats)
    #[arg(long, default_value_t = 100)]
    max_files: usize,

    /// Minimum co-change count to report
    #[arg(long, default_value_t = 3)]
    min_count: usize,
}

/// Churn aggregated by directory
#[derive(clap::Args, Clone, Debug)]
pub struct HotspotsArgs {
    /// Directory depth to aggregate at
    #[arg(long, default_value_t = 2)]
    depth: usize,

    /// Number of entries to show
    #[arg(long, short = 'n', default_value_t = 20)]
    limit: usize,
}

/// Commit counts and activity span per author
#[derive(clap::Args, Clone, Debug)]
pub struct AuthorsArgs {}

/// Commit volume over time
#[derive(clap::Args, Clone, Debug)]
pub struct ActivityArgs {
    /// Bucket size
    #[arg(long, value_enum, default_value = "month")]
    period: PeriodArg,
}

/// Files whose knowledge rests on the fewest people
#[derive(clap::Args, Clone, Debug)]
pub struct BusFactorArgs {
    /// Number of entries to show
    #[arg(long, short = 'n', default_value_t = 20)]
    limit: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum PeriodArg {
    Week,
    Month,
    Quarter,
    Year,
}

impl From<PeriodArg> for ActivityPeriod {
    fn from(period: PeriodArg) -> Self {
        match period {
            PeriodArg::Week => Self::Week,
            PeriodArg::Month => Self::Month,
            PeriodArg::Quarter => Self::Quarter,
            PeriodArg::Year => Self::Year,
        }
    }
}

pub fn cmd_analyze(
    ui: &mut Ui,
    command: &CommandHelper,
    subcommand: &AnalyzeCommand,
) -> Result<(), CommandError> {
    let (_repo, store) = command.repo_and_store()?;
    let store = store.as_ref();
    let mut out = ui.stdout();
    match subcommand {
        AnalyzeCommand::Churn(args) => {
            for entry in analyze::churn(store)?.into_iter().take(args.limit) {
                writeln!(out, "{:>6}  {}", entry.changes, entry.path)?;
            }
        }
        AnalyzeCommand::Coupling(args) => {
            let options = CouplingOptions {
                max_files: args.max_files,
                min_count: args.min_count,
            };
            for entry in analyze::coupling(store, &options)?.into_iter().take(args.limit) {
                writeln!(out, "{:>6}  {} <-> {}", entry.count, entry.path_a, entry.path_b)?;
            }
        }
        AnalyzeCommand::Hotspots(args) => {
            for entry in analyze::hotspots(store, args.depth)?
                .into_iter()
                .take(args.limit)
            {
                writeln!(out, "{:>6}  {}", entry.changes, entry.directory)?;
            }
        }
        AnalyzeCommand::Authors(_) => {
            for entry in analyze::authors(store)? {
                writeln!(
                    out,
                    "{:>6}  {} <{}>  {} .. {}",
                    entry.commits,
                    entry.name,
                    entry.email,
                    format_timestamp(entry.first_at),
                    format_timestamp(entry.last_at)
                )?;
            }
        }
        AnalyzeCommand::Activity(args) => {
            let entries = analyze::activity(store, args.period.into())?;
            let peak = entries.iter().map(|e| e.commits).max().unwrap_or(0).max(1);
            for entry in entries {
                let bar_width = entry.commits * 50 / peak;
                writeln!(
                    out,
                    "{:10} {:>6}  {}",
                    entry.bucket,
                    entry.commits,
                    "#".repeat(bar_width)
                )?;
            }
        }
        AnalyzeCommand::BusFactor(args) => {
            for entry in analyze::bus_factor(store)?.into_iter().take(args.limit) {
                writeln!(out, "{:>3} author(s)  {}", entry.distinct_authors, entry.path)?;
            }
        }
    }
    Ok(())
}
