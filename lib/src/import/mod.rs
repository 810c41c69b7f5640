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

//! The import engine: ingests a `git fast-export` stream.
//!
//! Commits are prepared in stream order with strictly increasing author
//! timestamps (collisions bumped by one millisecond) and bulk-appended.
//! File content then flows through a fixed worker pool: all versions of one
//! path must append to its chain in order, so work is parceled by path, with
//! heavy and light paths interleaved across batches so no worker is left
//! draining a single monster file at the end. A metadata checkpoint after
//! the commit phase makes the whole run resumable.

pub mod fast_export;

use std::collections::HashMap;
use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use itertools::Itertools as _;
use thiserror::Error;

use self::fast_export::FastExportError;
use self::fast_export::FileOp;
use self::fast_export::Span;
use self::fast_export::StreamIndex;
use crate::cancel::CancellationToken;
use crate::cancel::Cancelled;
use crate::file_util::IoResultExt as _;
use crate::file_util::PathError;
use crate::store::BlobPayload;
use crate::store::BlobWrite;
use crate::store::Commit;
use crate::store::FileMode;
use crate::store::GroupId;
use crate::store::IMPORT_STATE_COMMITS_DONE;
use crate::store::IMPORT_STATE_COMPLETE;
use crate::store::MAX_INSERT_SESSIONS;
use crate::store::META_IMPORT_BRANCH;
use crate::store::META_IMPORT_EXPECTED_COMMITS;
use crate::store::META_IMPORT_STATE;
use crate::store::Signature;
use crate::store::Store;
use crate::store::StoreError;
use crate::ulid::CommitId;

pub const DEFAULT_WORKERS: usize = 4;
const COMMIT_BATCH_SIZE: usize = 1000;
/// Maximum total versions packed into one worker batch.
const BATCH_VERSION_LIMIT: usize = 100;
/// Rows per database insert inside a batch.
const INSERT_SUB_BATCH: usize = 200;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Repository already contains commits (use --resume to continue, --force to wipe)")]
    RepositoryNotEmpty,
    #[error("A previous import stopped in state {0:?} (use --resume to continue)")]
    Incomplete(String),
    #[error("Import is already complete (use --force to wipe and reimport)")]
    AlreadyComplete,
    #[error("Stream does not match the repository: {0}")]
    ResumeMismatch(String),
    #[error("File op references blob mark :{0} absent from the stream")]
    MissingBlob(u64),
    #[error(transparent)]
    Parse(#[from] FastExportError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

#[derive(Clone, Debug, Default)]
pub struct ImportOptions {
    /// Parallel blob workers; clamped to the xpatch insert-session ceiling.
    pub workers: Option<usize>,
    pub resume: bool,
    pub force: bool,
    /// Only import commits of this branch ref (e.g. `refs/heads/main`).
    pub branch: Option<String>,
}

/// Shared progress counters, readable from a display thread.
#[derive(Debug, Default)]
pub struct ImportProgress {
    pub commits_total: AtomicU64,
    pub commits_done: AtomicU64,
    pub blobs_total: AtomicU64,
    pub blobs_done: AtomicU64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportReport {
    pub commit_count: usize,
    pub blob_count: usize,
    pub path_count: usize,
    pub resumed_commits: usize,
    pub skipped_paths: usize,
}

/// One file change prepared for the blob phase.
#[derive(Clone, Debug)]
struct PathOp {
    commit_id: CommitId,
    blob: Option<Span>,
    mode: u32,
}

struct Prepared {
    commits: Vec<Commit>,
    path_ops: HashMap<String, Vec<PathOp>>,
}

/// Appends an op to a path's chain. A path touched twice within one commit
/// (a modify followed by a rename away, say) keeps only the last op, since a
/// file_ref is unique per (group, commit).
fn push_path_op(path_ops: &mut HashMap<String, Vec<PathOp>>, path: &str, op: PathOp) {
    let ops = path_ops.entry(path.to_owned()).or_default();
    if let Some(last) = ops.last_mut()
        && last.commit_id == op.commit_id
    {
        *last = op;
    } else {
        ops.push(op);
    }
}

/// Imports `stream_path` (a saved fast-export stream) into the store.
#[tracing::instrument(skip_all, fields(stream = %stream_path.display()))]
pub fn import_fast_export(
    store: &dyn Store,
    stream_path: &Path,
    options: &ImportOptions,
    progress: &Arc<ImportProgress>,
    cancel: &CancellationToken,
) -> Result<ImportReport, ImportError> {
    if !store.schema_exists()? {
        store.init_schema()?;
    }
    let state = store.get_meta(META_IMPORT_STATE)?;
    let has_commits = store.max_commit_id()?.is_some();
    if options.force {
        store.drop_schema()?;
        store.init_schema()?;
    } else if state.as_deref() == Some(IMPORT_STATE_COMPLETE) {
        return Err(ImportError::AlreadyComplete);
    } else if !options.resume
        && let Some(state) = state
    {
        return Err(ImportError::Incomplete(state));
    } else if has_commits && !options.resume {
        return Err(ImportError::RepositoryNotEmpty);
    }

    tracing::info!(path = %stream_path.display(), "indexing fast-export stream");
    let file = File::open(stream_path).context(stream_path)?;
    let index = fast_export::index_stream(BufReader::new(file))?;

    let stored_ids: Vec<CommitId> = if options.resume {
        store
            .get_all_commits()?
            .into_iter()
            .map(|c| c.id)
            .collect()
    } else {
        vec![]
    };

    let mut message_file = File::open(stream_path).context(stream_path)?;
    let prepared = prepare_commits(&index, &mut message_file, options, &stored_ids)?;
    drop(message_file);
    progress
        .commits_total
        .store(prepared.commits.len() as u64, Ordering::Relaxed);
    progress
        .commits_done
        .store(stored_ids.len() as u64, Ordering::Relaxed);

    // Phase: persist the commit suffix, then checkpoint.
    if let Some(branch) = &options.branch {
        store.set_meta(META_IMPORT_BRANCH, branch)?;
    }
    store.set_meta(
        META_IMPORT_EXPECTED_COMMITS,
        &prepared.commits.len().to_string(),
    )?;
    for batch in prepared.commits[stored_ids.len()..].chunks(COMMIT_BATCH_SIZE) {
        cancel.check()?;
        store.create_commits_batch(batch)?;
        progress
            .commits_done
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
    }
    store.set_meta(META_IMPORT_STATE, IMPORT_STATE_COMMITS_DONE)?;

    // Phase: parallel blob import.
    let path_count = prepared.path_ops.len();
    let all_paths: Vec<String> = prepared.path_ops.keys().cloned().sorted().collect();
    let group_map = Arc::new(store.pre_register_paths(&all_paths)?);
    let existing_versions = store.max_versions_by_group()?;

    // A path with any stored version completed in a previous run; batches
    // are transactional, so partially-imported paths cannot exist.
    let mut pending: Vec<(String, Vec<PathOp>)> = vec![];
    let mut skipped_paths = 0;
    for (path, ops) in prepared.path_ops {
        let group_id = group_map[&path];
        if existing_versions.get(&group_id).copied().unwrap_or(0) > 0 {
            skipped_paths += 1;
            continue;
        }
        pending.push((path, ops));
    }
    let blob_count: usize = pending.iter().map(|(_, ops)| ops.len()).sum();
    progress
        .blobs_total
        .store(blob_count as u64, Ordering::Relaxed);

    pending.sort_by_key(|(_, ops)| std::cmp::Reverse(ops.len()));
    let interleaved = interleave(pending);
    let batches = pack_batches(interleaved, BATCH_VERSION_LIMIT);

    let worker_count = options
        .workers
        .unwrap_or(DEFAULT_WORKERS)
        .clamp(1, MAX_INSERT_SESSIONS);
    run_workers(
        store,
        stream_path,
        batches,
        &group_map,
        worker_count,
        progress,
        cancel,
    )?;

    // Phase: finalize.
    store.set_meta(META_IMPORT_STATE, IMPORT_STATE_COMPLETE)?;
    if let Some(last) = prepared.commits.last() {
        store.set_head(Some(&last.id))?;
    }
    Ok(ImportReport {
        commit_count: prepared.commits.len(),
        blob_count,
        path_count,
        resumed_commits: stored_ids.len(),
        skipped_paths,
    })
}

/// Assigns ids and parent links in stream order and flattens file ops into
/// per-path chains. On resume, the already-stored prefix keeps its ids.
fn prepare_commits(
    index: &StreamIndex,
    message_file: &mut File,
    options: &ImportOptions,
    stored_ids: &[CommitId],
) -> Result<Prepared, ImportError> {
    let entries: Vec<&fast_export::CommitEntry> = index
        .commits
        .iter()
        .filter(|entry| {
            options
                .branch
                .as_ref()
                .is_none_or(|branch| entry.branch == *branch || entry.branch.ends_with(&format!("/{branch}")))
        })
        .collect();
    if stored_ids.len() > entries.len() {
        return Err(ImportError::ResumeMismatch(format!(
            "repository has {} commits but the stream provides {}",
            stored_ids.len(),
            entries.len()
        )));
    }

    let mut commits = Vec::with_capacity(entries.len());
    let mut path_ops: HashMap<String, Vec<PathOp>> = HashMap::new();
    let mut mark_to_id: HashMap<u64, CommitId> = HashMap::new();
    // Last content each live path points at, for rename decomposition.
    let mut head_blobs: HashMap<String, (u64, u32)> = HashMap::new();
    let mut last_ts: i64 = i64::MIN;

    for (position, entry) in entries.iter().enumerate() {
        let mut authored_at = entry.author.when_ms;
        if authored_at <= last_ts {
            authored_at = last_ts + 1;
        }
        last_ts = authored_at;

        let id = match stored_ids.get(position) {
            Some(id) => id.clone(),
            None => CommitId::generate_with_time(authored_at.max(0) as u64),
        };
        if let Some(mark) = entry.mark {
            mark_to_id.insert(mark, id.clone());
        }
        let parent_id = match entry.from_mark {
            Some(from) => Some(mark_to_id.get(&from).cloned().ok_or_else(|| {
                ImportError::ResumeMismatch(format!("commit references unknown mark :{from}"))
            })?),
            None => commits.last().map(|c: &Commit| c.id.clone()),
        };

        let mut changes: Vec<(String, FileMode, bool)> = vec![];
        for op in &entry.file_ops {
            match op {
                FileOp::Modify { mode, mark, path } => {
                    if *mode == 0o160000 {
                        tracing::warn!(path = %path, "skipping submodule entry");
                        continue;
                    }
                    let span = index
                        .blobs
                        .get(mark)
                        .copied()
                        .ok_or(ImportError::MissingBlob(*mark))?;
                    head_blobs.insert(path.clone(), (*mark, *mode));
                    changes.push((path.clone(), FileMode::from_raw(*mode), false));
                    push_path_op(&mut path_ops, path, PathOp {
                        commit_id: id.clone(),
                        blob: Some(span),
                        mode: *mode,
                    });
                }
                FileOp::Delete { path } => {
                    head_blobs.remove(path);
                    changes.push((path.clone(), FileMode::Normal, true));
                    push_path_op(&mut path_ops, path, PathOp {
                        commit_id: id.clone(),
                        blob: None,
                        mode: 0o100644,
                    });
                }
                FileOp::Rename { old, new } => {
                    // D old + M new with the old path's current blob.
                    let Some((mark, mode)) = head_blobs.remove(old) else {
                        tracing::warn!(old = %old, new = %new, "rename of unknown path");
                        continue;
                    };
                    let span = index
                        .blobs
                        .get(&mark)
                        .copied()
                        .ok_or(ImportError::MissingBlob(mark))?;
                    changes.push((old.clone(), FileMode::Normal, true));
                    push_path_op(&mut path_ops, old, PathOp {
                        commit_id: id.clone(),
                        blob: None,
                        mode: 0o100644,
                    });
                    head_blobs.insert(new.clone(), (mark, mode));
                    changes.push((new.clone(), FileMode::from_raw(mode), false));
                    push_path_op(&mut path_ops, new, PathOp {
                        commit_id: id.clone(),
                        blob: Some(span),
                        mode,
                    });
                }
            }
        }

        let message = read_span(message_file, entry.message)?;
        commits.push(Commit {
            id,
            parent_id,
            tree_hash: Commit::hash_changes(
                changes
                    .iter()
                    .map(|(path, mode, deleted)| (path.as_str(), *mode, *deleted)),
            ),
            message: String::from_utf8_lossy(&message).into_owned(),
            author: Signature {
                name: entry.author.name.clone(),
                email: entry.author.email.clone(),
            },
            authored_at,
            committer: Signature {
                name: entry.committer.name.clone(),
                email: entry.committer.email.clone(),
            },
            committed_at: entry.committer.when_ms,
        });
    }

    Ok(Prepared { commits, path_ops })
}

fn read_span(file: &mut File, span: Span) -> Result<Vec<u8>, ImportError> {
    let mut buf = vec![0; span.size as usize];
    file.seek(SeekFrom::Start(span.offset))
        .and_then(|_| file.read_exact(&mut buf))
        .map_err(|source| PathError {
            path: "<fast-export stream>".into(),
            source,
        })?;
    Ok(buf)
}

/// Interleaves a descending-weight list: even positions reversed and zipped
/// with the odd positions. Heavy paths spread across the batch sequence
/// instead of clustering at the front.
fn interleave<T>(sorted: Vec<T>) -> Vec<T> {
    let mut evens = vec![];
    let mut odds = vec![];
    for (i, item) in sorted.into_iter().enumerate() {
        if i % 2 == 0 {
            evens.push(item);
        } else {
            odds.push(item);
        }
    }
    evens.reverse();
    evens.into_iter().interleave(odds).collect()
}

/// Packs paths into batches whose total version count stays at or under
/// `limit`; a single oversized path becomes its own batch.
fn pack_batches(
    paths: Vec<(String, Vec<PathOp>)>,
    limit: usize,
) -> Vec<Vec<(String, Vec<PathOp>)>> {
    let mut batches = vec![];
    let mut current: Vec<(String, Vec<PathOp>)> = vec![];
    let mut current_size = 0;
    for (path, ops) in paths {
        let size = ops.len();
        if size >= limit {
            batches.push(vec![(path, ops)]);
            continue;
        }
        if current_size + size > limit && !current.is_empty() {
            batches.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current_size += size;
        current.push((path, ops));
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn run_workers(
    store: &dyn Store,
    stream_path: &Path,
    batches: Vec<Vec<(String, Vec<PathOp>)>>,
    group_map: &Arc<HashMap<String, GroupId>>,
    worker_count: usize,
    progress: &Arc<ImportProgress>,
    cancel: &CancellationToken,
) -> Result<(), ImportError> {
    if batches.is_empty() {
        return Ok(());
    }
    let queue = Arc::new(Mutex::new(VecDeque::from(batches)));
    let worker_count = worker_count.min(queue.lock().unwrap().len()).max(1);

    let mut connections = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        connections.push(store.reopen()?);
    }

    std::thread::scope(|scope| {
        let mut handles = vec![];
        for connection in connections {
            let queue = Arc::clone(&queue);
            let group_map = Arc::clone(group_map);
            let progress = Arc::clone(progress);
            let cancel = cancel.clone();
            let stream_path = stream_path.to_path_buf();
            handles.push(scope.spawn(move || {
                worker_loop(
                    connection,
                    &stream_path,
                    &queue,
                    &group_map,
                    &progress,
                    &cancel,
                )
            }));
        }
        let mut first_error = None;
        for handle in handles {
            let result = handle.join().expect("import worker panicked");
            if let Err(err) = result
                && first_error.is_none()
            {
                // Stop the remaining workers promptly.
                cancel.cancel();
                first_error = Some(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => cancel.check().map_err(ImportError::from),
        }
    })
}

fn worker_loop(
    store: Box<dyn Store>,
    stream_path: &Path,
    queue: &Mutex<VecDeque<Vec<(String, Vec<PathOp>)>>>,
    group_map: &HashMap<String, GroupId>,
    progress: &ImportProgress,
    cancel: &CancellationToken,
) -> Result<(), ImportError> {
    // Each worker reads the stream through its own descriptor; positioned
    // reads need no coordination.
    let mut file = File::open(stream_path).context(stream_path)?;
    let mut counters: HashMap<GroupId, i32> = HashMap::new();
    loop {
        cancel.check()?;
        let Some(batch) = queue.lock().unwrap().pop_front() else {
            return Ok(());
        };
        let batch_size: usize = batch.iter().map(|(_, ops)| ops.len()).sum();
        // One transaction per batch: a crash leaves every path in it either
        // fully present or fully absent, which the resume scan relies on.
        store.in_transaction(&mut |txn| {
            let mut pending: Vec<BlobWrite> = Vec::with_capacity(INSERT_SUB_BATCH);
            for (path, ops) in &batch {
                for op in ops {
                    let payload = match op.blob {
                        None => BlobPayload::Delete,
                        Some(span) => {
                            let bytes = read_blob(&mut file, span)?;
                            if FileMode::from_raw(op.mode).is_symlink() {
                                BlobPayload::Symlink(
                                    String::from_utf8_lossy(&bytes).into_owned(),
                                )
                            } else {
                                BlobPayload::Data(bytes)
                            }
                        }
                    };
                    pending.push(BlobWrite {
                        path: path.clone(),
                        commit_id: op.commit_id.clone(),
                        mode: FileMode::from_raw(op.mode),
                        payload,
                    });
                    if pending.len() >= INSERT_SUB_BATCH {
                        txn.create_blobs_batch_fast(&pending, group_map, &mut counters)?;
                        pending.clear();
                    }
                }
            }
            if !pending.is_empty() {
                txn.create_blobs_batch_fast(&pending, group_map, &mut counters)?;
            }
            Ok(())
        })?;
        progress
            .blobs_done
            .fetch_add(batch_size as u64, Ordering::Relaxed);
    }
}

fn read_blob(file: &mut File, span: Span) -> Result<Vec<u8>, StoreError> {
    let mut buf = vec![0; span.size as usize];
    file.seek(SeekFrom::Start(span.offset))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use indoc::indoc;

    use super::*;
    use crate::store::MemStore;
    use crate::store::TreeFileContent;

    fn write_stream(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn small_stream() -> &'static str {
        indoc! {"
            blob
            mark :1
            data 4
            one

            blob
            mark :2
            data 4
            two

            commit refs/heads/main
            mark :3
            author A <a@x.y> 1700000000 +0000
            committer A <a@x.y> 1700000000 +0000
            data 6
            first
            M 100644 :1 a.txt

            commit refs/heads/main
            mark :4
            author A <a@x.y> 1700000100 +0000
            committer A <a@x.y> 1700000100 +0000
            data 7
            second
            from :3
            M 100644 :2 a.txt
            M 100644 :1 b.txt
        "}
    }

    fn run_import(store: &MemStore, stream: &str, options: &ImportOptions) -> ImportReport {
        let file = write_stream(stream);
        import_fast_export(
            store,
            file.path(),
            options,
            &Arc::new(ImportProgress::default()),
            &CancellationToken::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_import_small_stream() {
        let store = MemStore::new();
        let report = run_import(&store, small_stream(), &ImportOptions::default());
        assert_eq!(report.commit_count, 2);
        assert_eq!(report.blob_count, 3);
        assert_eq!(report.path_count, 2);

        let commits = store.get_all_commits().unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].message, "first\n");
        assert_eq!(commits[1].parent_id, Some(commits[0].id.clone()));
        assert_eq!(commits[0].authored_at, 1_700_000_000_000);
        assert_eq!(store.get_head().unwrap(), Some(commits[1].id.clone()));
        assert_eq!(
            store.get_meta(META_IMPORT_STATE).unwrap().as_deref(),
            Some(IMPORT_STATE_COMPLETE)
        );

        let tree = store.get_tree_at_commit(&commits[1].id).unwrap();
        assert_eq!(tree.len(), 2);
        let a = tree.iter().find(|f| f.path == "a.txt").unwrap();
        assert_eq!(a.content, TreeFileContent::Data(b"two\n".to_vec()));
        assert_eq!(a.version_id, 2);
        let b = tree.iter().find(|f| f.path == "b.txt").unwrap();
        assert_eq!(b.content, TreeFileContent::Data(b"one\n".to_vec()));
    }

    #[test]
    fn test_import_refuses_non_empty_without_flags() {
        let store = MemStore::new();
        run_import(&store, small_stream(), &ImportOptions::default());
        let file = write_stream(small_stream());
        // Completed import refuses outright.
        let err = import_fast_export(
            &store,
            file.path(),
            &ImportOptions::default(),
            &Arc::new(ImportProgress::default()),
            &CancellationToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ImportError::AlreadyComplete));
    }

    #[test]
    fn test_import_force_reimports() {
        let store = MemStore::new();
        run_import(&store, small_stream(), &ImportOptions::default());
        let report = run_import(
            &store,
            small_stream(),
            &ImportOptions {
                force: true,
                ..ImportOptions::default()
            },
        );
        assert_eq!(report.commit_count, 2);
        assert_eq!(store.get_all_commits().unwrap().len(), 2);
    }

    #[test]
    fn test_import_resume_after_commits_done() {
        // Simulate a crash right after the commit phase: commits stored,
        // checkpoint written, no blobs.
        let store = MemStore::new();
        let file = write_stream(small_stream());
        let index =
            fast_export::index_stream(BufReader::new(File::open(file.path()).unwrap())).unwrap();
        let mut message_file = File::open(file.path()).unwrap();
        let prepared =
            prepare_commits(&index, &mut message_file, &ImportOptions::default(), &[]).unwrap();
        store.create_commits_batch(&prepared.commits).unwrap();
        store
            .set_meta(META_IMPORT_STATE, IMPORT_STATE_COMMITS_DONE)
            .unwrap();

        let report = run_import(
            &store,
            small_stream(),
            &ImportOptions {
                resume: true,
                ..ImportOptions::default()
            },
        );
        assert_eq!(report.resumed_commits, 2);
        assert_eq!(report.blob_count, 3);
        let commits = store.get_all_commits().unwrap();
        // The stored prefix kept its ids.
        assert_eq!(commits, prepared.commits);
        let tree = store.get_tree_at_commit(&commits[1].id).unwrap();
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_import_resume_skips_completed_paths() {
        let store = MemStore::new();
        let file = write_stream(small_stream());
        let index =
            fast_export::index_stream(BufReader::new(File::open(file.path()).unwrap())).unwrap();
        let mut message_file = File::open(file.path()).unwrap();
        let prepared =
            prepare_commits(&index, &mut message_file, &ImportOptions::default(), &[]).unwrap();
        store.create_commits_batch(&prepared.commits).unwrap();
        // b.txt was fully imported before the crash.
        store
            .create_blobs(&[BlobWrite {
                path: "b.txt".to_owned(),
                commit_id: prepared.commits[1].id.clone(),
                mode: FileMode::Normal,
                payload: BlobPayload::Data(b"one\n".to_vec()),
            }])
            .unwrap();
        store
            .set_meta(META_IMPORT_STATE, IMPORT_STATE_COMMITS_DONE)
            .unwrap();

        let report = run_import(
            &store,
            small_stream(),
            &ImportOptions {
                resume: true,
                ..ImportOptions::default()
            },
        );
        assert_eq!(report.skipped_paths, 1);
        // a.txt still imported both its versions.
        let group = store.group_for_path("a.txt").unwrap().unwrap();
        assert_eq!(store.get_all_content_for_group(group).unwrap().len(), 2);
    }

    #[test]
    fn test_timestamp_collisions_bump_by_one_ms() {
        let stream = indoc! {"
            commit refs/heads/main
            mark :1
            committer A <a@x.y> 1700000000 +0000
            data 2
            a

            commit refs/heads/main
            mark :2
            committer A <a@x.y> 1700000000 +0000
            data 2
            b
            from :1

            commit refs/heads/main
            mark :3
            committer A <a@x.y> 1699999999 +0000
            data 2
            c
            from :2
        "};
        let store = MemStore::new();
        run_import(&store, stream, &ImportOptions::default());
        let commits = store.get_all_commits().unwrap();
        assert_eq!(commits.len(), 3);
        assert_eq!(commits[0].authored_at, 1_700_000_000_000);
        assert_eq!(commits[1].authored_at, 1_700_000_000_001);
        // Descending input timestamp still moves forward.
        assert_eq!(commits[2].authored_at, 1_700_000_000_002);
        assert!(commits[0].id < commits[1].id && commits[1].id < commits[2].id);
    }

    #[test]
    fn test_rename_decomposes_to_delete_plus_add() {
        let stream = indoc! {"
            blob
            mark :1
            data 2
            x

            commit refs/heads/main
            mark :2
            committer A <a@x.y> 1700000000 +0000
            data 2
            a
            M 100644 :1 old.txt

            commit refs/heads/main
            mark :3
            committer A <a@x.y> 1700000100 +0000
            data 2
            b
            from :2
            R old.txt new.txt
        "};
        let store = MemStore::new();
        run_import(&store, stream, &ImportOptions::default());
        let commits = store.get_all_commits().unwrap();
        let tree = store.get_tree_at_commit(&commits[1].id).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].path, "new.txt");
        assert_eq!(tree[0].content, TreeFileContent::Data(b"x\n".to_vec()));
        // The old path's group survives with its delete row.
        let old_group = store.group_for_path("old.txt").unwrap().unwrap();
        let history = store.get_file_ref_history(old_group).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].is_deleted());
        // Renames never reuse the old group.
        assert_ne!(store.group_for_path("new.txt").unwrap().unwrap(), old_group);
    }

    #[test]
    fn test_interleave_spreads_heavy_paths() {
        let interleaved = interleave(vec![10, 8, 6, 4, 2]);
        // evens [10, 6, 2] reversed -> [2, 6, 10]; odds [8, 4].
        assert_eq!(interleaved, vec![2, 8, 6, 4, 10]);
        assert_eq!(interleave(Vec::<i32>::new()), Vec::<i32>::new());
        assert_eq!(interleave(vec![1]), vec![1]);
    }

    #[test]
    fn test_pack_batches_respects_limit() {
        let path = |name: &str, n: usize| {
            let ops = vec![
                PathOp {
                    commit_id: CommitId::generate_with_time(1),
                    blob: None,
                    mode: 0o100644,
                };
                n
            ];
            (name.to_owned(), ops)
        };
        let batches = pack_batches(
            vec![path("a", 60), path("b", 50), path("c", 150), path("d", 10)],
            100,
        );
        // a starts a batch; b does not fit next to it; c is oversized and
        // stands alone; d joins b.
        let sizes: Vec<Vec<(&str, usize)>> = batches
            .iter()
            .map(|batch| {
                batch
                    .iter()
                    .map(|(name, ops)| (name.as_str(), ops.len()))
                    .collect()
            })
            .collect();
        assert_eq!(
            sizes,
            vec![
                vec![("a", 60)],
                vec![("c", 150)],
                vec![("b", 50), ("d", 10)],
            ]
        );
    }

    #[test]
    fn test_parallel_workers_import_consistently() {
        // Many paths with several versions each, shuffled through 4 workers.
        let mut stream = String::new();
        let mut mark = 1;
        let mut blob_marks = vec![];
        for version in 0..3 {
            for path in 0..8 {
                stream.push_str(&format!(
                    "blob\nmark :{mark}\ndata 8\nv{version}-p{path:03}\n"
                ));
                blob_marks.push(mark);
                mark += 1;
            }
        }
        let mut parent: Option<u64> = None;
        let mut blob_iter = blob_marks.into_iter();
        for version in 0..3 {
            let commit_mark = mark;
            mark += 1;
            stream.push_str(&format!(
                "commit refs/heads/main\nmark :{commit_mark}\ncommitter A <a@x.y> {} +0000\ndata 3\nc{version}\n",
                1_700_000_000 + version
            ));
            if let Some(parent) = parent {
                stream.push_str(&format!("from :{parent}\n"));
            }
            for path in 0..8 {
                let blob = blob_iter.next().unwrap();
                stream.push_str(&format!("M 100644 :{blob} p{path:03}.txt\n"));
            }
            stream.push('\n');
            parent = Some(commit_mark);
        }

        let store = MemStore::new();
        let progress = Arc::new(ImportProgress::default());
        let file = write_stream(&stream);
        let report = import_fast_export(
            &store,
            file.path(),
            &ImportOptions {
                workers: Some(4),
                ..ImportOptions::default()
            },
            &progress,
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(report.commit_count, 3);
        assert_eq!(report.blob_count, 24);
        assert_eq!(progress.blobs_done.load(Ordering::Relaxed), 24);

        let head = store.get_head().unwrap().unwrap();
        let tree = store.get_tree_at_commit(&head).unwrap();
        assert_eq!(tree.len(), 8);
        for file in tree {
            assert_eq!(file.version_id, 3);
            let text = match &file.content {
                TreeFileContent::Data(data) => String::from_utf8_lossy(data).into_owned(),
                TreeFileContent::Symlink(_) => unreachable!(),
            };
            assert!(text.starts_with("v2-"));
        }
    }
}
