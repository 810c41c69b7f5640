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

//! Pre-built repository analyses.
//!
//! Everything here reads the heap tables (file_refs, paths) or the commit
//! chain in ascending order, the scan pattern the delta storage serves
//! cheapest, and aggregates in memory.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;

use chrono::DateTime;
use chrono::Datelike as _;
use itertools::Itertools as _;

use crate::store::GroupId;
use crate::store::Store;
use crate::store::StoreResult;

/// Change count per path, most-changed first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChurnEntry {
    pub path: String,
    pub changes: usize,
}

pub fn churn(store: &dyn Store) -> StoreResult<Vec<ChurnEntry>> {
    let paths: HashMap<GroupId, String> = store.all_paths()?.into_iter().collect();
    let mut counts: HashMap<GroupId, usize> = HashMap::new();
    for file_ref in store.all_file_refs()? {
        *counts.entry(file_ref.group_id).or_default() += 1;
    }
    Ok(counts
        .into_iter()
        .filter_map(|(group_id, changes)| {
            paths.get(&group_id).map(|path| ChurnEntry {
                path: path.clone(),
                changes,
            })
        })
        .sorted_by(|a, b| b.changes.cmp(&a.changes).then(a.path.cmp(&b.path)))
        .collect())
}

#[derive(Clone, Copy, Debug)]
pub struct CouplingOptions {
    /// Commits touching more than this many files are treated as bulk
    /// reformats and skipped.
    pub max_files: usize,
    /// Minimum co-change count to report.
    pub min_count: usize,
}

impl Default for CouplingOptions {
    fn default() -> Self {
        Self {
            max_files: 100,
            min_count: 3,
        }
    }
}

/// Two paths that repeatedly change in the same commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CouplingEntry {
    pub path_a: String,
    pub path_b: String,
    pub count: usize,
}

pub fn coupling(store: &dyn Store, options: &CouplingOptions) -> StoreResult<Vec<CouplingEntry>> {
    let paths: HashMap<GroupId, String> = store.all_paths()?.into_iter().collect();
    let mut by_commit: HashMap<_, Vec<GroupId>> = HashMap::new();
    for file_ref in store.all_file_refs()? {
        by_commit
            .entry(file_ref.commit_id)
            .or_default()
            .push(file_ref.group_id);
    }
    let mut pair_counts: HashMap<(GroupId, GroupId), usize> = HashMap::new();
    for groups in by_commit.into_values() {
        if groups.len() > options.max_files {
            continue;
        }
        for pair in groups.into_iter().sorted().combinations(2) {
            *pair_counts.entry((pair[0], pair[1])).or_default() += 1;
        }
    }
    Ok(pair_counts
        .into_iter()
        .filter(|(_, count)| *count >= options.min_count)
        .filter_map(|((a, b), count)| {
            Some(CouplingEntry {
                path_a: paths.get(&a)?.clone(),
                path_b: paths.get(&b)?.clone(),
                count,
            })
        })
        .sorted_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(a.path_a.cmp(&b.path_a))
                .then(a.path_b.cmp(&b.path_b))
        })
        .collect())
}

/// Churn rolled up by directory prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HotspotEntry {
    pub directory: String,
    pub changes: usize,
}

pub fn hotspots(store: &dyn Store, depth: usize) -> StoreResult<Vec<HotspotEntry>> {
    let depth = depth.max(1);
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for entry in churn(store)? {
        let directory = directory_prefix(&entry.path, depth);
        *counts.entry(directory).or_default() += entry.changes;
    }
    Ok(counts
        .into_iter()
        .map(|(directory, changes)| HotspotEntry { directory, changes })
        .sorted_by(|a, b| b.changes.cmp(&a.changes).then(a.directory.cmp(&b.directory)))
        .collect())
}

fn directory_prefix(path: &str, depth: usize) -> String {
    let components: Vec<&str> = path.split('/').collect();
    if components.len() <= 1 {
        ".".to_owned()
    } else {
        components[..depth.min(components.len() - 1)].join("/")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorEntry {
    pub name: String,
    pub email: String,
    pub commits: usize,
    pub first_at: i64,
    pub last_at: i64,
}

/// Per-author activity, from one ascending commit scan.
pub fn authors(store: &dyn Store) -> StoreResult<Vec<AuthorEntry>> {
    let mut entries: HashMap<String, AuthorEntry> = HashMap::new();
    for commit in store.get_all_commits()? {
        let entry = entries
            .entry(commit.author.email.clone())
            .or_insert_with(|| AuthorEntry {
                name: commit.author.name.clone(),
                email: commit.author.email.clone(),
                commits: 0,
                first_at: commit.authored_at,
                last_at: commit.authored_at,
            });
        entry.commits += 1;
        entry.first_at = entry.first_at.min(commit.authored_at);
        entry.last_at = entry.last_at.max(commit.authored_at);
    }
    Ok(entries
        .into_values()
        .sorted_by(|a, b| b.commits.cmp(&a.commits).then(a.email.cmp(&b.email)))
        .collect())
}

/// Paths with the fewest distinct authors first: the knowledge that is lost
/// when its one or two owners disappear.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusFactorEntry {
    pub path: String,
    pub distinct_authors: usize,
}

pub fn bus_factor(store: &dyn Store) -> StoreResult<Vec<BusFactorEntry>> {
    let commit_authors: HashMap<_, String> = store
        .get_all_commits()?
        .into_iter()
        .map(|c| (c.id, c.author.email))
        .collect();
    let paths: HashMap<GroupId, String> = store.all_paths()?.into_iter().collect();
    let mut authors_by_group: HashMap<GroupId, HashSet<String>> = HashMap::new();
    for file_ref in store.all_file_refs()? {
        if let Some(author) = commit_authors.get(&file_ref.commit_id) {
            authors_by_group
                .entry(file_ref.group_id)
                .or_default()
                .insert(author.clone());
        }
    }
    Ok(authors_by_group
        .into_iter()
        .filter_map(|(group_id, authors)| {
            Some(BusFactorEntry {
                path: paths.get(&group_id)?.clone(),
                distinct_authors: authors.len(),
            })
        })
        .sorted_by(|a, b| {
            a.distinct_authors
                .cmp(&b.distinct_authors)
                .then(a.path.cmp(&b.path))
        })
        .collect())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityPeriod {
    Week,
    Month,
    Quarter,
    Year,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityEntry {
    pub bucket: String,
    pub commits: usize,
}

/// Commit counts bucketed by calendar period, empty buckets included.
pub fn activity(store: &dyn Store, period: ActivityPeriod) -> StoreResult<Vec<ActivityEntry>> {
    let commits = store.get_all_commits()?;
    if commits.is_empty() {
        return Ok(vec![]);
    }
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut first = i64::MAX;
    let mut last = i64::MIN;
    for commit in &commits {
        first = first.min(commit.authored_at);
        last = last.max(commit.authored_at);
        *counts.entry(bucket_label(commit.authored_at, period)).or_default() += 1;
    }
    // Fill the gaps so quiet periods are visible as zeros.
    let mut entries = vec![];
    for label in bucket_range(first, last, period) {
        let commits = counts.get(&label).copied().unwrap_or(0);
        entries.push(ActivityEntry {
            bucket: label,
            commits,
        });
    }
    Ok(entries)
}

fn bucket_label(timestamp_ms: i64, period: ActivityPeriod) -> String {
    let date = DateTime::from_timestamp_millis(timestamp_ms)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .date_naive();
    match period {
        ActivityPeriod::Week => {
            let week = date.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        ActivityPeriod::Month => format!("{}-{:02}", date.year(), date.month()),
        ActivityPeriod::Quarter => format!("{}-Q{}", date.year(), (date.month() - 1) / 3 + 1),
        ActivityPeriod::Year => format!("{}", date.year()),
    }
}

/// All bucket labels from `first` to `last` inclusive.
fn bucket_range(first: i64, last: i64, period: ActivityPeriod) -> Vec<String> {
    let mut labels = vec![];
    match period {
        ActivityPeriod::Week => {
            let week_ms = 7 * 24 * 3600 * 1000;
            let mut at = first;
            let last_label = bucket_label(last, period);
            loop {
                let label = bucket_label(at, period);
                if labels.last() != Some(&label) {
                    labels.push(label.clone());
                }
                if label == last_label {
                    break;
                }
                at += week_ms;
            }
        }
        ActivityPeriod::Month => {
            let (mut year, mut month) = year_sub(first, period);
            let (last_year, last_month) = year_sub(last, period);
            while (year, month) <= (last_year, last_month) {
                labels.push(format!("{year}-{month:02}"));
                month += 1;
                if month > 12 {
                    month = 1;
                    year += 1;
                }
            }
        }
        ActivityPeriod::Quarter => {
            let (mut year, mut quarter) = year_sub(first, period);
            let (last_year, last_quarter) = year_sub(last, period);
            while (year, quarter) <= (last_year, last_quarter) {
                labels.push(format!("{year}-Q{quarter}"));
                quarter += 1;
                if quarter > 4 {
                    quarter = 1;
                    year += 1;
                }
            }
        }
        ActivityPeriod::Year => {
            let (mut year, _) = year_sub(first, period);
            let (last_year, _) = year_sub(last, period);
            while year <= last_year {
                labels.push(format!("{year}"));
                year += 1;
            }
        }
    }
    labels
}

fn year_sub(timestamp_ms: i64, period: ActivityPeriod) -> (i32, u32) {
    let date = DateTime::from_timestamp_millis(timestamp_ms)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .date_naive();
    match period {
        ActivityPeriod::Week | ActivityPeriod::Year => (date.year(), 0),
        ActivityPeriod::Month => (date.year(), date.month()),
        ActivityPeriod::Quarter => (date.year(), (date.month() - 1) / 3 + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BlobPayload;
    use crate::store::BlobWrite;
    use crate::store::Commit;
    use crate::store::FileMode;
    use crate::store::MemStore;
    use crate::store::Signature;
    use crate::ulid::CommitId;

    fn commit_paths(store: &MemStore, author: &str, ts: i64, paths: &[&str]) -> CommitId {
        let signature = Signature {
            name: author.to_owned(),
            email: format!("{author}@example.com"),
        };
        let commit = Commit {
            id: CommitId::generate_with_time(ts as u64),
            parent_id: store.get_head().unwrap(),
            tree_hash: Commit::hash_changes([]),
            message: "m".to_owned(),
            author: signature.clone(),
            authored_at: ts,
            committer: signature,
            committed_at: ts,
        };
        store.create_commit(&commit).unwrap();
        let blobs: Vec<BlobWrite> = paths
            .iter()
            .map(|path| BlobWrite {
                path: (*path).to_owned(),
                commit_id: commit.id.clone(),
                mode: FileMode::Normal,
                payload: BlobPayload::Data(format!("{ts}").into_bytes()),
            })
            .collect();
        store.create_blobs(&blobs).unwrap();
        store.set_head(Some(&commit.id)).unwrap();
        commit.id
    }

    // 2024-01-15, then one-day steps.
    const BASE_TS: i64 = 1_705_300_000_000;
    const DAY: i64 = 24 * 3600 * 1000;

    #[test]
    fn test_churn_ranks_by_change_count() {
        let store = MemStore::new();
        commit_paths(&store, "a", BASE_TS, &["hot.rs", "cold.rs"]);
        commit_paths(&store, "a", BASE_TS + DAY, &["hot.rs"]);
        commit_paths(&store, "a", BASE_TS + 2 * DAY, &["hot.rs"]);
        let entries = churn(&store).unwrap();
        assert_eq!(
            entries,
            vec![
                ChurnEntry {
                    path: "hot.rs".to_owned(),
                    changes: 3,
                },
                ChurnEntry {
                    path: "cold.rs".to_owned(),
                    changes: 1,
                },
            ]
        );
    }

    #[test]
    fn test_coupling_counts_pairs_and_skips_bulk_commits() {
        let store = MemStore::new();
        for i in 0..3 {
            commit_paths(&store, "a", BASE_TS + i * DAY, &["x.rs", "y.rs"]);
        }
        // A bulk commit touching many files is excluded.
        let bulk: Vec<String> = (0..10).map(|i| format!("bulk{i}.rs")).collect();
        let bulk_refs: Vec<&str> = bulk.iter().map(String::as_str).collect();
        commit_paths(&store, "a", BASE_TS + 10 * DAY, &bulk_refs);

        let entries = coupling(
            &store,
            &CouplingOptions {
                max_files: 5,
                min_count: 3,
            },
        )
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].count, 3);
        let pair = [entries[0].path_a.as_str(), entries[0].path_b.as_str()];
        assert!(pair.contains(&"x.rs") && pair.contains(&"y.rs"));
    }

    #[test]
    fn test_hotspots_aggregate_by_directory() {
        let store = MemStore::new();
        commit_paths(&store, "a", BASE_TS, &["src/core/a.rs", "src/core/b.rs", "docs/x.md"]);
        commit_paths(&store, "a", BASE_TS + DAY, &["src/core/a.rs", "top.txt"]);
        let entries = hotspots(&store, 2).unwrap();
        assert_eq!(entries[0].directory, "src/core");
        assert_eq!(entries[0].changes, 3);
        assert!(entries.iter().any(|e| e.directory == "." && e.changes == 1));
        // Depth 1 collapses to the first component.
        let shallow = hotspots(&store, 1).unwrap();
        assert_eq!(shallow[0].directory, "src");
    }

    #[test]
    fn test_authors_aggregate_counts_and_span() {
        let store = MemStore::new();
        commit_paths(&store, "alice", BASE_TS, &["a.rs"]);
        commit_paths(&store, "bob", BASE_TS + DAY, &["a.rs"]);
        commit_paths(&store, "alice", BASE_TS + 2 * DAY, &["a.rs"]);
        let entries = authors(&store).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].email, "alice@example.com");
        assert_eq!(entries[0].commits, 2);
        assert_eq!(entries[0].first_at, BASE_TS);
        assert_eq!(entries[0].last_at, BASE_TS + 2 * DAY);
    }

    #[test]
    fn test_bus_factor_orders_riskiest_first() {
        let store = MemStore::new();
        commit_paths(&store, "alice", BASE_TS, &["solo.rs", "shared.rs"]);
        commit_paths(&store, "bob", BASE_TS + DAY, &["shared.rs"]);
        let entries = bus_factor(&store).unwrap();
        assert_eq!(
            entries,
            vec![
                BusFactorEntry {
                    path: "solo.rs".to_owned(),
                    distinct_authors: 1,
                },
                BusFactorEntry {
                    path: "shared.rs".to_owned(),
                    distinct_authors: 2,
                },
            ]
        );
    }

    #[test]
    fn test_activity_fills_empty_buckets() {
        let store = MemStore::new();
        // January and March 2024; February must appear with zero commits.
        commit_paths(&store, "a", 1_705_300_000_000, &["a.rs"]);
        commit_paths(&store, "a", 1_710_500_000_000, &["a.rs"]);
        let entries = activity(&store, ActivityPeriod::Month).unwrap();
        assert_eq!(
            entries,
            vec![
                ActivityEntry {
                    bucket: "2024-01".to_owned(),
                    commits: 1,
                },
                ActivityEntry {
                    bucket: "2024-02".to_owned(),
                    commits: 0,
                },
                ActivityEntry {
                    bucket: "2024-03".to_owned(),
                    commits: 1,
                },
            ]
        );
    }

    #[test]
    fn test_activity_quarter_and_year_labels() {
        assert_eq!(bucket_label(1_705_300_000_000, ActivityPeriod::Quarter), "2024-Q1");
        assert_eq!(bucket_label(1_705_300_000_000, ActivityPeriod::Year), "2024");
        assert_eq!(bucket_label(1_705_300_000_000, ActivityPeriod::Month), "2024-01");
    }

    #[test]
    fn test_activity_empty_store() {
        let store = MemStore::new();
        assert_eq!(activity(&store, ActivityPeriod::Week).unwrap(), vec![]);
    }
}
