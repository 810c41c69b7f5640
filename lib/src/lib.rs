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

//! Library for pgit: a Git-like version control system whose repositories
//! live in a PostgreSQL database under the xpatch append-only
//! delta-compressed extension.
//!
//! The [`store`] module is the seam everything else programs against; the
//! engines above it ([`commit`], [`import`], [`sync`], [`annotate`],
//! [`analyze`]) never touch SQL directly.

pub mod analyze;
pub mod annotate;
pub mod cancel;
pub mod commit;
pub mod config;
pub mod content_hash;
pub mod diff;
pub mod file_util;
pub mod import;
pub mod index;
pub mod merge;
pub mod repo;
pub mod revparse;
pub mod store;
pub mod sync;
pub mod ulid;
pub mod working_copy;
