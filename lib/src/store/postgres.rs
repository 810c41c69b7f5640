// Copyright 2023-2024 The pgit Authors
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

//! PostgreSQL implementation of the storage gateway.
//!
//! `pgit_commits` and `pgit_content` are created `USING xpatch`, the
//! append-only delta-compressed table access method. The extension caches
//! per-chain encoder state keyed by insert session, so appends must arrive in
//! chain order on one connection; ascending full scans decompress each row
//! against the previous one and are the cheapest access pattern.

use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::io::Write as _;

use itertools::Itertools as _;
use postgres::Row;
use postgres::error::SqlState;

use super::BlobPayload;
use super::BlobWrite;
use super::ChangedBlob;
use super::Commit;
use super::FileMode;
use super::FileRef;
use super::GroupId;
use super::RepoStats;
use super::Signature;
use super::Store;
use super::StoreError;
use super::StoreResult;
use super::TreeFile;
use super::TreeFileContent;
use super::XpatchStats;
use super::check_suffix;
use crate::content_hash::ContentHash;
use crate::content_hash::detect_binary;
use crate::ulid::CommitId;

const SCHEMA: &str = r#"
CREATE EXTENSION IF NOT EXISTS xpatch;

CREATE TABLE pgit_commits (
    -- Ids sort lexicographically = chronologically; byte-order collation
    -- keeps range scans honest regardless of database locale.
    id TEXT COLLATE "C" PRIMARY KEY,
    parent_id TEXT COLLATE "C",
    tree_hash BYTEA NOT NULL,
    message TEXT NOT NULL,
    author_name TEXT NOT NULL,
    author_email TEXT NOT NULL,
    authored_at BIGINT NOT NULL,
    committer_name TEXT NOT NULL,
    committer_email TEXT NOT NULL,
    committed_at BIGINT NOT NULL
) USING xpatch;

CREATE TABLE pgit_paths (
    group_id SERIAL PRIMARY KEY,
    path TEXT NOT NULL UNIQUE
);

CREATE TABLE pgit_file_refs (
    group_id INTEGER NOT NULL,
    commit_id TEXT COLLATE "C" NOT NULL,
    version_id INTEGER NOT NULL,
    content_hash BYTEA,
    mode INTEGER NOT NULL,
    is_symlink BOOLEAN NOT NULL,
    is_binary BOOLEAN NOT NULL,
    PRIMARY KEY (group_id, commit_id),
    UNIQUE (group_id, version_id)
);
CREATE INDEX pgit_file_refs_commit_idx ON pgit_file_refs (commit_id);

CREATE TABLE pgit_content (
    group_id INTEGER NOT NULL,
    version_id INTEGER NOT NULL,
    content BYTEA NOT NULL,
    PRIMARY KEY (group_id, version_id)
) USING xpatch;

CREATE TABLE pgit_symlink_targets (
    group_id INTEGER NOT NULL,
    version_id INTEGER NOT NULL,
    target TEXT NOT NULL,
    PRIMARY KEY (group_id, version_id)
);

CREATE TABLE pgit_head (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    commit_id TEXT
);
INSERT INTO pgit_head (id, commit_id) VALUES (1, NULL);

CREATE TABLE pgit_sync_state (
    remote TEXT PRIMARY KEY,
    last_synced_commit_id TEXT NOT NULL
);

CREATE TABLE pgit_metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const ALL_TABLES: &[&str] = &[
    "pgit_metadata",
    "pgit_sync_state",
    "pgit_head",
    "pgit_symlink_targets",
    "pgit_content",
    "pgit_file_refs",
    "pgit_paths",
    "pgit_commits",
];

const COMMIT_COLUMNS: &str = "id, parent_id, tree_hash, message, author_name, author_email, \
     authored_at, committer_name, committer_email, committed_at";

/// Result of a raw `pgit sql` statement.
#[derive(Clone, Debug, Default)]
pub struct SqlOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    pub rows_affected: Option<u64>,
}

/// Storage gateway over one PostgreSQL connection.
pub struct PgStore {
    url: String,
    client: RefCell<postgres::Client>,
    /// Groups whose stored chain head was verified against the caller's
    /// counters during this connection's lifetime.
    verified_groups: RefCell<HashSet<GroupId>>,
}

impl PgStore {
    /// Connects to the database at `url` (a `postgres://` connection string).
    pub fn connect(url: &str) -> StoreResult<Self> {
        let client =
            postgres::Client::connect(url, postgres::NoTls).map_err(StoreError::Connection)?;
        Ok(Self {
            url: url.to_owned(),
            client: RefCell::new(client),
            verified_groups: RefCell::new(HashSet::new()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Raw SQL escape hatch for `pgit sql`. Uses the simple-query protocol,
    /// so every value comes back as text.
    pub fn run_sql(&self, sql: &str) -> StoreResult<SqlOutput> {
        let messages = self.client.borrow_mut().simple_query(sql)?;
        let mut output = SqlOutput::default();
        for message in messages {
            match message {
                postgres::SimpleQueryMessage::Row(row) => {
                    if output.columns.is_empty() {
                        output.columns = row
                            .columns()
                            .iter()
                            .map(|c| c.name().to_owned())
                            .collect();
                    }
                    output.rows.push(
                        (0..row.len())
                            .map(|i| row.get(i).map(str::to_owned))
                            .collect(),
                    );
                }
                postgres::SimpleQueryMessage::CommandComplete(count) => {
                    output.rows_affected = Some(count);
                }
                _ => {}
            }
        }
        Ok(output)
    }

    fn row_to_commit(row: &Row) -> Commit {
        let id: String = row.get(0);
        let parent_id: Option<String> = row.get(1);
        let tree_hash: Vec<u8> = row.get(2);
        Commit {
            id: CommitId::try_from_string(&id).expect("stored commit id is a valid ULID"),
            parent_id: parent_id
                .map(|p| CommitId::try_from_string(&p).expect("stored parent id is a valid ULID")),
            tree_hash: ContentHash::from_bytes(&tree_hash)
                .expect("stored tree hash has 16 bytes"),
            message: row.get(3),
            author: Signature {
                name: row.get(4),
                email: row.get(5),
            },
            authored_at: row.get(6),
            committer: Signature {
                name: row.get(7),
                email: row.get(8),
            },
            committed_at: row.get(9),
        }
    }

    fn check_appendable(&self, commits: &[Commit]) -> StoreResult<()> {
        let mut max = self.max_commit_id()?;
        for commit in commits {
            if let Some(max) = &max {
                if commit.id == *max {
                    return Err(StoreError::DuplicateCommitId(commit.id.to_string()));
                }
                if commit.id < *max {
                    return Err(StoreError::NonMonotonicCommitId {
                        id: commit.id.to_string(),
                        max: max.to_string(),
                    });
                }
            }
            max = Some(commit.id.clone());
        }
        Ok(())
    }

    /// Ensures the caller-held version counter for each group continues the
    /// stored chain. Checked once per group per connection.
    fn check_counters(
        &self,
        blobs: &[BlobWrite],
        group_map: &HashMap<String, GroupId>,
        version_counters: &HashMap<GroupId, i32>,
    ) -> StoreResult<()> {
        let unverified: Vec<GroupId> = blobs
            .iter()
            .filter_map(|b| group_map.get(&b.path).copied())
            .filter(|g| !self.verified_groups.borrow().contains(g))
            .unique()
            .collect();
        if unverified.is_empty() {
            return Ok(());
        }
        let rows = self.client.borrow_mut().query(
            "SELECT group_id, MAX(version_id) FROM pgit_file_refs
             WHERE group_id = ANY($1) GROUP BY group_id",
            &[&unverified],
        )?;
        let stored: HashMap<GroupId, i32> = rows
            .iter()
            .map(|row| (row.get::<_, i32>(0), row.get::<_, i32>(1)))
            .collect();
        for group_id in unverified {
            let counter = version_counters.get(&group_id).copied().unwrap_or(0);
            let max = stored.get(&group_id).copied().unwrap_or(0);
            if counter != max {
                return Err(StoreError::OutOfOrderAppend {
                    group_id,
                    got: counter + 1,
                    expected: max + 1,
                });
            }
            self.verified_groups.borrow_mut().insert(group_id);
        }
        Ok(())
    }

    fn insert_blob_rows(&self, rows: &[(GroupId, i32, &BlobWrite)]) -> StoreResult<()> {
        let mut group_ids: Vec<GroupId> = vec![];
        let mut commit_ids: Vec<String> = vec![];
        let mut version_ids: Vec<i32> = vec![];
        let mut hashes: Vec<Option<Vec<u8>>> = vec![];
        let mut modes: Vec<i32> = vec![];
        let mut symlink_flags: Vec<bool> = vec![];
        let mut binary_flags: Vec<bool> = vec![];
        for (group_id, version_id, blob) in rows {
            group_ids.push(*group_id);
            commit_ids.push(blob.commit_id.to_string());
            version_ids.push(*version_id);
            hashes.push(blob.content_hash().map(|h| h.as_bytes().to_vec()));
            modes.push(blob.mode.to_raw() as i32);
            symlink_flags.push(blob.mode.is_symlink());
            binary_flags.push(match &blob.payload {
                BlobPayload::Data(data) => detect_binary(data),
                _ => false,
            });
        }
        let mut client = self.client.borrow_mut();
        client.execute(
            "INSERT INTO pgit_file_refs
                 (group_id, commit_id, version_id, content_hash, mode, is_symlink, is_binary)
             SELECT * FROM unnest($1::int[], $2::text[], $3::int[], $4::bytea[],
                                  $5::int[], $6::bool[], $7::bool[])",
            &[
                &group_ids,
                &commit_ids,
                &version_ids,
                &hashes,
                &modes,
                &symlink_flags,
                &binary_flags,
            ],
        )?;

        // Content rows must reach the chain in (group, version) order.
        let mut content_groups: Vec<GroupId> = vec![];
        let mut content_versions: Vec<i32> = vec![];
        let mut contents: Vec<&[u8]> = vec![];
        let mut symlink_rows: Vec<(GroupId, i32, &str)> = vec![];
        for (group_id, version_id, blob) in rows
            .iter()
            .sorted_by_key(|(group_id, version_id, _)| (*group_id, *version_id))
        {
            match &blob.payload {
                BlobPayload::Data(data) => {
                    content_groups.push(*group_id);
                    content_versions.push(*version_id);
                    contents.push(data);
                }
                BlobPayload::Symlink(target) => {
                    symlink_rows.push((*group_id, *version_id, target));
                }
                BlobPayload::Delete => {}
            }
        }
        if !contents.is_empty() {
            client.execute(
                "INSERT INTO pgit_content (group_id, version_id, content)
                 SELECT * FROM unnest($1::int[], $2::int[], $3::bytea[])",
                &[&content_groups, &content_versions, &contents],
            )?;
        }
        for (group_id, version_id, target) in symlink_rows {
            client.execute(
                "INSERT INTO pgit_symlink_targets (group_id, version_id, target)
                 VALUES ($1, $2, $3)",
                &[&group_id, &version_id, &target],
            )?;
        }
        Ok(())
    }

    fn tree_query(&self, commit: &CommitId) -> StoreResult<Vec<Row>> {
        // Latest file_ref per group from the heap index, contents joined in
        // ascending chain order.
        let sql = "SELECT r.group_id, p.path, r.version_id, r.content_hash, r.mode,
                    r.is_symlink, r.is_binary, c.content, s.target
             FROM (
                 SELECT DISTINCT ON (group_id)
                        group_id, version_id, content_hash, mode, is_symlink, is_binary
                 FROM pgit_file_refs
                 WHERE commit_id <= $1
                 ORDER BY group_id, commit_id DESC
             ) r
             JOIN pgit_paths p USING (group_id)
             LEFT JOIN pgit_content c
                 ON c.group_id = r.group_id AND c.version_id = r.version_id
             LEFT JOIN pgit_symlink_targets s
                 ON s.group_id = r.group_id AND s.version_id = r.version_id
             WHERE r.content_hash IS NOT NULL
             ORDER BY r.group_id, r.version_id";
        Ok(self.client.borrow_mut().query(sql, &[&commit.as_str()])?)
    }

    fn row_to_tree_file(row: &Row) -> TreeFile {
        let mode = FileMode::from_raw(row.get::<_, i32>(4) as u32);
        let content = if mode.is_symlink() {
            TreeFileContent::Symlink(row.get::<_, String>(8))
        } else {
            TreeFileContent::Data(row.get::<_, Vec<u8>>(7))
        };
        TreeFile {
            group_id: row.get(0),
            path: row.get(1),
            version_id: row.get(2),
            content_hash: ContentHash::from_bytes(&row.get::<_, Vec<u8>>(3))
                .expect("stored content hash has 16 bytes"),
            mode,
            is_binary: row.get(6),
            content,
        }
    }
}

/// Escapes one value for the text format of `COPY FROM STDIN`.
fn copy_escape(value: &str, out: &mut Vec<u8>) {
    for byte in value.bytes() {
        match byte {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\t' => out.extend_from_slice(b"\\t"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(byte),
        }
    }
}

fn copy_commit_row(commit: &Commit, out: &mut Vec<u8>) {
    let mut push_field = |field: Option<&str>, out: &mut Vec<u8>| {
        match field {
            Some(value) => copy_escape(value, out),
            None => out.extend_from_slice(b"\\N"),
        }
        out.push(b'\t');
    };
    push_field(Some(commit.id.as_str()), out);
    push_field(commit.parent_id.as_ref().map(|id| id.as_str()), out);
    push_field(Some(&format!("\\x{}", commit.tree_hash.hex())), out);
    push_field(Some(&commit.message), out);
    push_field(Some(&commit.author.name), out);
    push_field(Some(&commit.author.email), out);
    push_field(Some(&commit.authored_at.to_string()), out);
    push_field(Some(&commit.committer.name), out);
    push_field(Some(&commit.committer.email), out);
    // Last column has no trailing tab.
    copy_escape(&commit.committed_at.to_string(), out);
    out.push(b'\n');
}

impl Store for PgStore {
    fn reopen(&self) -> StoreResult<Box<dyn Store>> {
        Ok(Box::new(Self::connect(&self.url)?))
    }

    fn schema_exists(&self) -> StoreResult<bool> {
        let row = self.client.borrow_mut().query_one(
            "SELECT EXISTS (
                 SELECT 1 FROM information_schema.tables
                 WHERE table_schema = current_schema() AND table_name = 'pgit_commits'
             )",
            &[],
        )?;
        Ok(row.get(0))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let mut client = self.client.borrow_mut();
        client.batch_execute("BEGIN")?;
        match client.batch_execute(SCHEMA) {
            Ok(()) => {
                client.batch_execute("COMMIT")?;
                Ok(())
            }
            Err(err) => {
                client.batch_execute("ROLLBACK").ok();
                Err(err.into())
            }
        }
    }

    fn drop_schema(&self) -> StoreResult<()> {
        let drops = ALL_TABLES
            .iter()
            .map(|table| format!("DROP TABLE IF EXISTS {table} CASCADE;"))
            .join("\n");
        self.client.borrow_mut().batch_execute(&drops)?;
        self.verified_groups.borrow_mut().clear();
        Ok(())
    }

    fn in_transaction(
        &self,
        f: &mut dyn FnMut(&dyn Store) -> StoreResult<()>,
    ) -> StoreResult<()> {
        self.client.borrow_mut().batch_execute("BEGIN")?;
        match f(self) {
            Ok(()) => {
                self.client.borrow_mut().batch_execute("COMMIT")?;
                Ok(())
            }
            Err(err) => {
                self.client.borrow_mut().batch_execute("ROLLBACK").ok();
                Err(err)
            }
        }
    }

    fn create_commit(&self, commit: &Commit) -> StoreResult<()> {
        self.check_appendable(std::slice::from_ref(commit))?;
        let result = self.client.borrow_mut().execute(
            &format!(
                "INSERT INTO pgit_commits ({COMMIT_COLUMNS})
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
            ),
            &[
                &commit.id.as_str(),
                &commit.parent_id.as_ref().map(|id| id.as_str()),
                &commit.tree_hash.as_bytes(),
                &commit.message,
                &commit.author.name,
                &commit.author.email,
                &commit.authored_at,
                &commit.committer.name,
                &commit.committer.email,
                &commit.committed_at,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(err) if err.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Err(StoreError::DuplicateCommitId(commit.id.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn create_commits_batch(&self, commits: &[Commit]) -> StoreResult<()> {
        if commits.is_empty() {
            return Ok(());
        }
        self.check_appendable(commits)?;
        let mut buf = Vec::with_capacity(commits.len() * 256);
        for commit in commits {
            copy_commit_row(commit, &mut buf);
        }
        let mut client = self.client.borrow_mut();
        let mut writer = client.copy_in(&format!(
            "COPY pgit_commits ({COMMIT_COLUMNS}) FROM STDIN"
        ))?;
        writer.write_all(&buf)?;
        writer.finish()?;
        Ok(())
    }

    fn get_commit(&self, id: &CommitId) -> StoreResult<Commit> {
        let rows = self.client.borrow_mut().query(
            &format!("SELECT {COMMIT_COLUMNS} FROM pgit_commits WHERE id = $1"),
            &[&id.as_str()],
        )?;
        rows.first()
            .map(Self::row_to_commit)
            .ok_or_else(|| StoreError::CommitNotFound(id.to_string()))
    }

    fn commit_exists(&self, id: &CommitId) -> StoreResult<bool> {
        let row = self.client.borrow_mut().query_one(
            "SELECT EXISTS (SELECT 1 FROM pgit_commits WHERE id = $1)",
            &[&id.as_str()],
        )?;
        Ok(row.get(0))
    }

    fn get_commits_after(&self, id: Option<&CommitId>) -> StoreResult<Vec<Commit>> {
        let rows = match id {
            Some(id) => self.client.borrow_mut().query(
                &format!(
                    "SELECT {COMMIT_COLUMNS} FROM pgit_commits WHERE id > $1 ORDER BY id"
                ),
                &[&id.as_str()],
            )?,
            None => self.client.borrow_mut().query(
                &format!("SELECT {COMMIT_COLUMNS} FROM pgit_commits ORDER BY id"),
                &[],
            )?,
        };
        Ok(rows.iter().map(Self::row_to_commit).collect())
    }

    fn get_commit_log_from(&self, from: &CommitId, limit: usize) -> StoreResult<Vec<Commit>> {
        if !self.commit_exists(from)? {
            return Err(StoreError::CommitNotFound(from.to_string()));
        }
        // Ascending scan with a ring buffer: the chain decompresses forward,
        // so reading front-to-back and keeping the tail beats a reverse scan.
        let rows = self.client.borrow_mut().query(
            &format!("SELECT {COMMIT_COLUMNS} FROM pgit_commits WHERE id <= $1 ORDER BY id"),
            &[&from.as_str()],
        )?;
        let mut tail: VecDeque<Commit> = VecDeque::with_capacity(limit + 1);
        for row in &rows {
            tail.push_back(Self::row_to_commit(row));
            if tail.len() > limit {
                tail.pop_front();
            }
        }
        Ok(tail.into_iter().rev().collect())
    }

    fn get_all_commits(&self) -> StoreResult<Vec<Commit>> {
        self.get_commits_after(None)
    }

    fn max_commit_id(&self) -> StoreResult<Option<CommitId>> {
        let rows = self
            .client
            .borrow_mut()
            .query("SELECT MAX(id) FROM pgit_commits", &[])?;
        let id: Option<String> = rows[0].get(0);
        Ok(id.map(|id| CommitId::try_from_string(&id).expect("stored commit id is a valid ULID")))
    }

    fn find_commit_by_partial_id(&self, partial: &str) -> StoreResult<Option<Commit>> {
        let needle = partial.to_ascii_uppercase();
        let prefix_pattern = format!("{}%", needle.replace('\\', "\\\\").replace('%', "\\%"));
        let rows = self.client.borrow_mut().query(
            &format!(
                "SELECT {COMMIT_COLUMNS} FROM pgit_commits
                 WHERE id LIKE $1 OR RIGHT(id, 7) = $2
                 ORDER BY id LIMIT 10"
            ),
            &[&prefix_pattern, &needle],
        )?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(Some(Self::row_to_commit(&rows[0]))),
            _ => Err(StoreError::AmbiguousCommitId {
                candidates: rows
                    .iter()
                    .map(|row| row.get::<_, String>(0))
                    .collect(),
            }),
        }
    }

    fn delete_commits(&self, commits: &[CommitId]) -> StoreResult<()> {
        if commits.is_empty() {
            return Ok(());
        }
        let all = self
            .client
            .borrow_mut()
            .query("SELECT id FROM pgit_commits ORDER BY id", &[])?;
        let all_ids: Vec<CommitId> = all
            .iter()
            .map(|row| {
                CommitId::try_from_string(&row.get::<_, String>(0))
                    .expect("stored commit id is a valid ULID")
            })
            .collect();
        check_suffix(&all_ids, commits)?;
        let ids: Vec<String> = commits.iter().map(|id| id.to_string()).collect();
        self.client
            .borrow_mut()
            .execute("DELETE FROM pgit_commits WHERE id = ANY($1)", &[&ids])?;
        Ok(())
    }

    fn pre_register_paths(&self, paths: &[String]) -> StoreResult<HashMap<String, GroupId>> {
        if paths.is_empty() {
            return Ok(HashMap::new());
        }
        let mut client = self.client.borrow_mut();
        client.execute(
            "INSERT INTO pgit_paths (path)
             SELECT DISTINCT path FROM unnest($1::text[]) AS u(path)
             ON CONFLICT (path) DO NOTHING",
            &[&paths],
        )?;
        let rows = client.query(
            "SELECT path, group_id FROM pgit_paths WHERE path = ANY($1)",
            &[&paths],
        )?;
        Ok(rows
            .iter()
            .map(|row| (row.get::<_, String>(0), row.get::<_, GroupId>(1)))
            .collect())
    }

    fn group_for_path(&self, path: &str) -> StoreResult<Option<GroupId>> {
        let rows = self.client.borrow_mut().query(
            "SELECT group_id FROM pgit_paths WHERE path = $1",
            &[&path],
        )?;
        Ok(rows.first().map(|row| row.get(0)))
    }

    fn all_paths(&self) -> StoreResult<Vec<(GroupId, String)>> {
        let rows = self
            .client
            .borrow_mut()
            .query("SELECT group_id, path FROM pgit_paths ORDER BY group_id", &[])?;
        Ok(rows
            .iter()
            .map(|row| (row.get(0), row.get(1)))
            .collect())
    }

    fn create_blobs(&self, blobs: &[BlobWrite]) -> StoreResult<()> {
        if blobs.is_empty() {
            return Ok(());
        }
        let paths: Vec<String> = blobs.iter().map(|b| b.path.clone()).unique().collect();
        let group_map = self.pre_register_paths(&paths)?;
        let group_ids: Vec<GroupId> = group_map.values().copied().collect();
        let rows = self.client.borrow_mut().query(
            "SELECT group_id, MAX(version_id) FROM pgit_file_refs
             WHERE group_id = ANY($1) GROUP BY group_id",
            &[&group_ids],
        )?;
        let mut counters: HashMap<GroupId, i32> = rows
            .iter()
            .map(|row| (row.get(0), row.get(1)))
            .collect();
        let mut resolved = vec![];
        for blob in blobs {
            let group_id = group_map[&blob.path];
            let counter = counters.entry(group_id).or_insert(0);
            *counter += 1;
            resolved.push((group_id, *counter, blob));
        }
        self.insert_blob_rows(&resolved)
    }

    fn create_blobs_batch_fast(
        &self,
        blobs: &[BlobWrite],
        group_map: &HashMap<String, GroupId>,
        version_counters: &mut HashMap<GroupId, i32>,
    ) -> StoreResult<()> {
        if blobs.is_empty() {
            return Ok(());
        }
        self.check_counters(blobs, group_map, version_counters)?;
        let mut resolved = vec![];
        for blob in blobs {
            let group_id = *group_map
                .get(&blob.path)
                .ok_or_else(|| StoreError::PathNotFound(blob.path.clone()))?;
            let counter = version_counters.entry(group_id).or_insert(0);
            *counter += 1;
            resolved.push((group_id, *counter, blob));
        }
        self.insert_blob_rows(&resolved)
    }

    fn delete_blobs_for_commits(&self, commits: &[CommitId]) -> StoreResult<()> {
        if commits.is_empty() {
            return Ok(());
        }
        let all = self
            .client
            .borrow_mut()
            .query("SELECT id FROM pgit_commits ORDER BY id", &[])?;
        let all_ids: Vec<CommitId> = all
            .iter()
            .map(|row| {
                CommitId::try_from_string(&row.get::<_, String>(0))
                    .expect("stored commit id is a valid ULID")
            })
            .collect();
        check_suffix(&all_ids, commits)?;
        let ids: Vec<String> = commits.iter().map(|id| id.to_string()).collect();
        let mut client = self.client.borrow_mut();
        // Truncate each touched chain at its lowest removed version so the
        // extension never sees an interior hole.
        let cuts = client.query(
            "SELECT group_id, MIN(version_id) FROM pgit_file_refs
             WHERE commit_id = ANY($1) GROUP BY group_id",
            &[&ids],
        )?;
        for row in &cuts {
            let group_id: GroupId = row.get(0);
            let cut: i32 = row.get(1);
            client.execute(
                "DELETE FROM pgit_content WHERE group_id = $1 AND version_id >= $2",
                &[&group_id, &cut],
            )?;
            client.execute(
                "DELETE FROM pgit_symlink_targets WHERE group_id = $1 AND version_id >= $2",
                &[&group_id, &cut],
            )?;
            client.execute(
                "DELETE FROM pgit_file_refs WHERE group_id = $1 AND version_id >= $2",
                &[&group_id, &cut],
            )?;
        }
        self.verified_groups.borrow_mut().clear();
        Ok(())
    }

    fn max_versions_by_group(&self) -> StoreResult<HashMap<GroupId, i32>> {
        let rows = self.client.borrow_mut().query(
            "SELECT group_id, MAX(version_id) FROM pgit_file_refs GROUP BY group_id",
            &[],
        )?;
        Ok(rows.iter().map(|row| (row.get(0), row.get(1))).collect())
    }

    fn get_file_at_commit(&self, path: &str, commit: &CommitId) -> StoreResult<Option<TreeFile>> {
        let Some(group_id) = self.group_for_path(path)? else {
            return Ok(None);
        };
        let rows = self.client.borrow_mut().query(
            "SELECT r.group_id, p.path, r.version_id, r.content_hash, r.mode,
                    r.is_symlink, r.is_binary, c.content, s.target
             FROM pgit_file_refs r
             JOIN pgit_paths p USING (group_id)
             LEFT JOIN pgit_content c
                 ON c.group_id = r.group_id AND c.version_id = r.version_id
             LEFT JOIN pgit_symlink_targets s
                 ON s.group_id = r.group_id AND s.version_id = r.version_id
             WHERE r.group_id = $1 AND r.commit_id <= $2
             ORDER BY r.commit_id DESC LIMIT 1",
            &[&group_id, &commit.as_str()],
        )?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let hash: Option<Vec<u8>> = row.get(3);
        if hash.is_none() {
            // Deleted at or before this commit.
            return Ok(None);
        }
        Ok(Some(Self::row_to_tree_file(row)))
    }

    fn get_tree_at_commit(&self, commit: &CommitId) -> StoreResult<Vec<TreeFile>> {
        let rows = self.tree_query(commit)?;
        Ok(rows.iter().map(Self::row_to_tree_file).collect())
    }

    fn get_blobs_at_commit(&self, commit: &CommitId) -> StoreResult<Vec<ChangedBlob>> {
        let rows = self.client.borrow_mut().query(
            "SELECT r.group_id, p.path, r.version_id, r.content_hash, r.mode,
                    r.is_symlink, r.is_binary, c.content, s.target, r.commit_id
             FROM pgit_file_refs r
             JOIN pgit_paths p USING (group_id)
             LEFT JOIN pgit_content c
                 ON c.group_id = r.group_id AND c.version_id = r.version_id
             LEFT JOIN pgit_symlink_targets s
                 ON s.group_id = r.group_id AND s.version_id = r.version_id
             WHERE r.commit_id = $1
             ORDER BY r.group_id, r.version_id",
            &[&commit.as_str()],
        )?;
        Ok(rows
            .iter()
            .map(|row| {
                let mode = FileMode::from_raw(row.get::<_, i32>(4) as u32);
                let hash: Option<Vec<u8>> = row.get(3);
                let payload = match &hash {
                    None => BlobPayload::Delete,
                    Some(_) if mode.is_symlink() => {
                        BlobPayload::Symlink(row.get::<_, String>(8))
                    }
                    Some(_) => BlobPayload::Data(row.get::<_, Vec<u8>>(7)),
                };
                ChangedBlob {
                    path: row.get(1),
                    file_ref: FileRef {
                        group_id: row.get(0),
                        commit_id: commit.clone(),
                        version_id: row.get(2),
                        content_hash: hash
                            .as_deref()
                            .map(|h| ContentHash::from_bytes(h).expect("16-byte hash")),
                        mode,
                        is_binary: row.get(6),
                    },
                    payload,
                }
            })
            .collect())
    }

    fn get_all_content_for_group(&self, group_id: GroupId) -> StoreResult<Vec<(i32, Vec<u8>)>> {
        let rows = self.client.borrow_mut().query(
            "SELECT version_id, content FROM pgit_content
             WHERE group_id = $1 ORDER BY version_id",
            &[&group_id],
        )?;
        Ok(rows.iter().map(|row| (row.get(0), row.get(1))).collect())
    }

    fn get_file_ref_history(&self, group_id: GroupId) -> StoreResult<Vec<FileRef>> {
        let rows = self.client.borrow_mut().query(
            "SELECT group_id, commit_id, version_id, content_hash, mode, is_binary
             FROM pgit_file_refs WHERE group_id = $1 ORDER BY commit_id DESC",
            &[&group_id],
        )?;
        Ok(rows
            .iter()
            .map(|row| FileRef {
                group_id: row.get(0),
                commit_id: CommitId::try_from_string(&row.get::<_, String>(1))
                    .expect("stored commit id is a valid ULID"),
                version_id: row.get(2),
                content_hash: row
                    .get::<_, Option<Vec<u8>>>(3)
                    .as_deref()
                    .map(|h| ContentHash::from_bytes(h).expect("16-byte hash")),
                mode: FileMode::from_raw(row.get::<_, i32>(4) as u32),
                is_binary: row.get(5),
            })
            .collect())
    }

    fn all_file_refs(&self) -> StoreResult<Vec<FileRef>> {
        let rows = self.client.borrow_mut().query(
            "SELECT group_id, commit_id, version_id, content_hash, mode, is_binary
             FROM pgit_file_refs",
            &[],
        )?;
        Ok(rows
            .iter()
            .map(|row| FileRef {
                group_id: row.get(0),
                commit_id: CommitId::try_from_string(&row.get::<_, String>(1))
                    .expect("stored commit id is a valid ULID"),
                version_id: row.get(2),
                content_hash: row
                    .get::<_, Option<Vec<u8>>>(3)
                    .as_deref()
                    .map(|h| ContentHash::from_bytes(h).expect("16-byte hash")),
                mode: FileMode::from_raw(row.get::<_, i32>(4) as u32),
                is_binary: row.get(5),
            })
            .collect())
    }

    fn get_head(&self) -> StoreResult<Option<CommitId>> {
        let rows = self
            .client
            .borrow_mut()
            .query("SELECT commit_id FROM pgit_head WHERE id = 1", &[])?;
        match rows.first() {
            None => Err(StoreError::SchemaMissing),
            Some(row) => {
                let id: Option<String> = row.get(0);
                Ok(id.map(|id| {
                    CommitId::try_from_string(&id).expect("stored commit id is a valid ULID")
                }))
            }
        }
    }

    fn set_head(&self, id: Option<&CommitId>) -> StoreResult<()> {
        self.client.borrow_mut().execute(
            "UPDATE pgit_head SET commit_id = $1 WHERE id = 1",
            &[&id.map(|id| id.as_str())],
        )?;
        Ok(())
    }

    fn get_sync_state(&self, remote: &str) -> StoreResult<Option<CommitId>> {
        let rows = self.client.borrow_mut().query(
            "SELECT last_synced_commit_id FROM pgit_sync_state WHERE remote = $1",
            &[&remote],
        )?;
        Ok(rows.first().map(|row| {
            CommitId::try_from_string(&row.get::<_, String>(0))
                .expect("stored commit id is a valid ULID")
        }))
    }

    fn set_sync_state(&self, remote: &str, id: &CommitId) -> StoreResult<()> {
        self.client.borrow_mut().execute(
            "INSERT INTO pgit_sync_state (remote, last_synced_commit_id) VALUES ($1, $2)
             ON CONFLICT (remote) DO UPDATE SET last_synced_commit_id = $2",
            &[&remote, &id.as_str()],
        )?;
        Ok(())
    }

    fn get_meta(&self, key: &str) -> StoreResult<Option<String>> {
        let rows = self.client.borrow_mut().query(
            "SELECT value FROM pgit_metadata WHERE key = $1",
            &[&key],
        )?;
        Ok(rows.first().map(|row| row.get(0)))
    }

    fn set_meta(&self, key: &str, value: &str) -> StoreResult<()> {
        self.client.borrow_mut().execute(
            "INSERT INTO pgit_metadata (key, value) VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET value = $2",
            &[&key, &value],
        )?;
        Ok(())
    }

    fn delete_meta(&self, key: &str) -> StoreResult<()> {
        self.client
            .borrow_mut()
            .execute("DELETE FROM pgit_metadata WHERE key = $1", &[&key])?;
        Ok(())
    }

    fn get_repo_stats_fast(&self) -> StoreResult<RepoStats> {
        let row = self.client.borrow_mut().query_one(
            "SELECT (SELECT COUNT(*) FROM pgit_commits),
                    (SELECT COUNT(*) FROM pgit_paths),
                    (SELECT COUNT(*) FROM pgit_file_refs),
                    (SELECT COALESCE(SUM(LENGTH(content)), 0) FROM pgit_content)",
            &[],
        )?;
        Ok(RepoStats {
            commit_count: row.get(0),
            path_count: row.get(1),
            file_ref_count: row.get(2),
            content_bytes: row.get(3),
        })
    }

    fn get_xpatch_stats(&self, table: &str) -> StoreResult<XpatchStats> {
        let row = self.client.borrow_mut().query_one(
            "SELECT row_count, logical_bytes, stored_bytes FROM xpatch_stats($1::regclass)",
            &[&table],
        )?;
        Ok(XpatchStats {
            table: table.to_owned(),
            row_count: row.get(0),
            logical_bytes: row.get(1),
            stored_bytes: row.get(2),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Signature;

    fn make_commit(message: &str) -> Commit {
        let signature = Signature {
            name: "A".to_owned(),
            email: "a@b.c".to_owned(),
        };
        Commit {
            id: CommitId::generate_with_time(1_700_000_000_000),
            parent_id: None,
            tree_hash: Commit::hash_changes([]),
            message: message.to_owned(),
            author: signature.clone(),
            authored_at: 1_700_000_000_000,
            committer: signature,
            committed_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_copy_escape_special_bytes() {
        let mut out = vec![];
        copy_escape("a\tb\nc\\d", &mut out);
        assert_eq!(out, b"a\\tb\\nc\\\\d");
    }

    #[test]
    fn test_copy_commit_row_shape() {
        let commit = make_commit("multi\nline");
        let mut out = vec![];
        copy_commit_row(&commit, &mut out);
        let line = String::from_utf8(out).unwrap();
        assert!(line.ends_with('\n'));
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        assert_eq!(fields.len(), 10);
        assert_eq!(fields[0], commit.id.as_str());
        // No parent serializes as COPY NULL.
        assert_eq!(fields[1], "\\N");
        assert!(fields[2].starts_with("\\\\x"));
        assert_eq!(fields[3], "multi\\nline");
    }
}
