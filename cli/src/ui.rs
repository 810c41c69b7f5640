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

//! Terminal output plumbing.
//!
//! Data goes to stdout; status, warnings, hints, and progress go to stderr.
//! Progress lines are emitted only when stderr is a terminal.

use std::io;
use std::io::IsTerminal as _;
use std::io::Write;

pub struct Ui {
    stderr_is_tty: bool,
    quiet: bool,
}

impl Ui {
    pub fn new(quiet: bool) -> Self {
        Self {
            stderr_is_tty: io::stderr().is_terminal(),
            quiet,
        }
    }

    /// Primary output stream for command data (log, diff, blame, ...).
    pub fn stdout(&mut self) -> impl Write + '_ {
        io::stdout().lock()
    }

    /// One status line on stderr, suppressed by `--quiet`.
    pub fn status(&mut self, message: impl AsRef<str>) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.clear_progress()?;
        writeln!(io::stderr(), "{}", message.as_ref())
    }

    pub fn warning(&mut self, message: impl AsRef<str>) -> io::Result<()> {
        self.clear_progress()?;
        writeln!(io::stderr(), "Warning: {}", message.as_ref())
    }

    pub fn hint(&mut self, message: impl AsRef<str>) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.clear_progress()?;
        writeln!(io::stderr(), "Hint: {}", message.as_ref())
    }

    pub fn error(&mut self, message: impl AsRef<str>) -> io::Result<()> {
        self.clear_progress()?;
        writeln!(io::stderr(), "Error: {}", message.as_ref())
    }

    /// Whether a `\r`-overwritten progress line makes sense here.
    pub fn progress_enabled(&self) -> bool {
        self.stderr_is_tty && !self.quiet
    }

    /// Rewrites the current progress line in place.
    pub fn progress(&mut self, line: &str) -> io::Result<()> {
        if !self.progress_enabled() {
            return Ok(());
        }
        let mut stderr = io::stderr().lock();
        write!(stderr, "\r\x1b[K{line}")?;
        stderr.flush()
    }

    /// Erases any pending progress line before regular output.
    pub fn clear_progress(&mut self) -> io::Result<()> {
        if self.progress_enabled() {
            let mut stderr = io::stderr().lock();
            write!(stderr, "\r\x1b[K")?;
            stderr.flush()?;
        }
        Ok(())
    }
}
