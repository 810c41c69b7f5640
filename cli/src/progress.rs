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

//! Rate-limited progress line for long operations.

use std::time::Duration;
use std::time::Instant;

use crate::ui::Ui;

pub const UPDATE_HZ: u32 = 30;
pub const INITIAL_DELAY: Duration = Duration::from_millis(250);

/// Throttles progress rendering: nothing for the first quarter second (fast
/// operations stay silent), then at most [`UPDATE_HZ`] redraws per second.
pub struct ProgressPrinter {
    next_display_time: Instant,
    drew_anything: bool,
}

impl Default for ProgressPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressPrinter {
    pub fn new() -> Self {
        Self {
            next_display_time: Instant::now() + INITIAL_DELAY,
            drew_anything: false,
        }
    }

    pub fn update(&mut self, ui: &mut Ui, label: &str, done: u64, total: u64) {
        let now = Instant::now();
        if now < self.next_display_time {
            return;
        }
        self.next_display_time = now + Duration::from_secs(1) / UPDATE_HZ;
        self.drew_anything = true;
        let line = if total > 0 {
            format!("{label} {done}/{total}")
        } else {
            format!("{label} {done}")
        };
        ui.progress(&line).ok();
    }

    /// Clears the line so following output starts clean.
    pub fn finish(&mut self, ui: &mut Ui) {
        if self.drew_anything {
            ui.clear_progress().ok();
        }
    }
}
