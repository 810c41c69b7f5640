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

//! Single-pass indexer for `git fast-export` streams.
//!
//! The scan records where every blob body and commit message lives in the
//! stream file (`{offset, size}`) instead of copying content into memory;
//! import workers later read the bodies with positioned reads. Unrecognized
//! lines (`reset`, `progress`, blanks) are skipped.

use std::collections::HashMap;
use std::io;
use std::io::BufRead;
use std::io::Read;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FastExportError {
    #[error("Failed to read fast-export stream")]
    Io(#[from] io::Error),
    #[error("Malformed fast-export stream at line {line}: {reason}")]
    Malformed { line: u64, reason: String },
}

/// Byte range of a body inside the stream file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub offset: u64,
    pub size: u64,
}

/// `author`/`committer` identity with its epoch timestamp in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawSignature {
    pub name: String,
    pub email: String,
    pub when_ms: i64,
}

/// One file operation of a commit, in stream order. A rename keeps its two
/// paths; the prepare phase decomposes it into a delete plus a re-add of the
/// old path's current blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileOp {
    Modify { mode: u32, mark: u64, path: String },
    Delete { path: String },
    Rename { old: String, new: String },
}

#[derive(Clone, Debug)]
pub struct CommitEntry {
    pub mark: Option<u64>,
    pub branch: String,
    pub author: RawSignature,
    pub committer: RawSignature,
    pub message: Span,
    pub from_mark: Option<u64>,
    /// Extra parents of a merge commit; pgit is strictly linear and follows
    /// only `from_mark`.
    pub merge_marks: Vec<u64>,
    pub file_ops: Vec<FileOp>,
}

/// Result of the indexing pass.
#[derive(Debug, Default)]
pub struct StreamIndex {
    pub blobs: HashMap<u64, Span>,
    pub commits: Vec<CommitEntry>,
}

/// Line reader that tracks the byte offset of the stream. The buffer grows
/// to fit the longest line seen; bulk content arrives through `data` blocks
/// which are skipped, not buffered.
struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
    offset: u64,
    line_no: u64,
    peeked: bool,
}

impl<R: BufRead> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(256),
            offset: 0,
            line_no: 0,
            peeked: false,
        }
    }

    /// Reads the next line without its terminator into an owned buffer.
    /// Returns `None` at EOF.
    fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.peeked {
            self.peeked = false;
            return Ok(Some(self.buf.clone()));
        }
        self.buf.clear();
        let read = self.inner.read_until(b'\n', &mut self.buf)?;
        if read == 0 {
            return Ok(None);
        }
        self.offset += read as u64;
        self.line_no += 1;
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        }
        Ok(Some(self.buf.clone()))
    }

    /// Pushes the current line back so the next `next_line` returns it again.
    fn unread(&mut self) {
        self.peeked = true;
    }

    /// Skips `n` body bytes.
    fn skip(&mut self, n: u64) -> io::Result<()> {
        let mut limited = self.inner.by_ref().take(n);
        let copied = io::copy(&mut limited, &mut io::sink())?;
        if copied < n {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream body truncated",
            ));
        }
        self.offset += n;
        Ok(())
    }

    fn malformed(&self, reason: impl Into<String>) -> FastExportError {
        FastExportError::Malformed {
            line: self.line_no,
            reason: reason.into(),
        }
    }
}

/// Scans a whole stream into a [`StreamIndex`].
pub fn index_stream(reader: impl BufRead) -> Result<StreamIndex, FastExportError> {
    let mut lines = LineReader::new(reader);
    let mut index = StreamIndex::default();
    while let Some(line) = lines.next_line()? {
        if line.is_empty() {
            continue;
        }
        if line == b"blob" {
            parse_blob(&mut lines, &mut index)?;
        } else if let Some(branch) = line.strip_prefix(b"commit ") {
            let branch = String::from_utf8_lossy(branch).into_owned();
            let entry = parse_commit(&mut lines, branch)?;
            index.commits.push(entry);
        }
        // reset, progress, tag, checkpoint, feature: ignored.
    }
    Ok(index)
}

fn parse_blob<R: BufRead>(
    lines: &mut LineReader<R>,
    index: &mut StreamIndex,
) -> Result<(), FastExportError> {
    let mut mark = None;
    loop {
        let Some(line) = lines.next_line()? else {
            return Err(lines.malformed("blob without data"));
        };
        if let Some(rest) = line.strip_prefix(b"mark :") {
            mark = Some(parse_u64(rest).ok_or_else(|| lines.malformed("bad mark"))?);
        } else if line.starts_with(b"original-oid ") {
            // Informational only.
        } else if let Some(rest) = line.strip_prefix(b"data ") {
            let size = parse_u64(rest).ok_or_else(|| lines.malformed("bad data size"))?;
            let span = Span {
                offset: lines.offset,
                size,
            };
            lines.skip(size)?;
            if let Some(mark) = mark {
                index.blobs.insert(mark, span);
            }
            return Ok(());
        } else {
            return Err(lines.malformed("unexpected line in blob"));
        }
    }
}

fn parse_commit<R: BufRead>(
    lines: &mut LineReader<R>,
    branch: String,
) -> Result<CommitEntry, FastExportError> {
    let mut mark = None;
    let mut author = None;
    let mut committer = None;
    let mut message = None;
    let mut from_mark = None;
    let mut merge_marks = vec![];
    let mut file_ops = vec![];

    while let Some(line) = lines.next_line()? {
        if line.is_empty() {
            // fast-export terminates each commit with a blank line.
            break;
        }
        if let Some(rest) = line.strip_prefix(b"mark :") {
            mark = Some(parse_u64(rest).ok_or_else(|| lines.malformed("bad mark"))?);
        } else if line.starts_with(b"original-oid ") || line.starts_with(b"encoding ") {
            // Informational only.
        } else if let Some(rest) = line.strip_prefix(b"author ") {
            author = Some(parse_signature(rest).ok_or_else(|| lines.malformed("bad author"))?);
        } else if let Some(rest) = line.strip_prefix(b"committer ") {
            committer =
                Some(parse_signature(rest).ok_or_else(|| lines.malformed("bad committer"))?);
        } else if let Some(rest) = line.strip_prefix(b"data ") {
            let size = parse_u64(rest).ok_or_else(|| lines.malformed("bad data size"))?;
            message = Some(Span {
                offset: lines.offset,
                size,
            });
            lines.skip(size)?;
        } else if let Some(rest) = line.strip_prefix(b"from :") {
            from_mark = Some(parse_u64(rest).ok_or_else(|| lines.malformed("bad from"))?);
        } else if line.starts_with(b"from ") {
            // A `from` naming a ref or raw oid roots this commit on history
            // outside the stream; with one linear branch there is nothing to
            // link to.
        } else if let Some(rest) = line.strip_prefix(b"merge :") {
            merge_marks.push(parse_u64(rest).ok_or_else(|| lines.malformed("bad merge"))?);
        } else if line.starts_with(b"M ") || line.starts_with(b"D ") || line.starts_with(b"R ") {
            parse_file_op(&line, &mut file_ops).map_err(|reason| lines.malformed(reason))?;
        } else if line == b"deleteall" {
            // Emitted by --full-tree exports; tolerated and meaningless for
            // an incremental stream.
        } else {
            // The next record began without a separating blank line.
            lines.unread();
            break;
        }
    }

    let committer = committer.ok_or_else(|| lines.malformed("commit without committer"))?;
    let author = author.unwrap_or_else(|| committer.clone());
    let message = message.ok_or_else(|| lines.malformed("commit without message"))?;
    Ok(CommitEntry {
        mark,
        branch,
        author,
        committer,
        message,
        from_mark,
        merge_marks,
        file_ops,
    })
}

fn parse_u64(bytes: &[u8]) -> Option<u64> {
    str::from_utf8(bytes).ok()?.trim().parse().ok()
}

/// Parses `NAME <EMAIL> TS TZ`. The timezone shifts only the rendering; the
/// timestamp itself is epoch-based.
fn parse_signature(bytes: &[u8]) -> Option<RawSignature> {
    let text = String::from_utf8_lossy(bytes);
    let open = text.find('<')?;
    let close = text[open..].find('>')? + open;
    let name = text[..open].trim().to_owned();
    let email = text[open + 1..close].to_owned();
    let mut rest = text[close + 1..].split_whitespace();
    let seconds: i64 = rest.next()?.parse().ok()?;
    Some(RawSignature {
        name,
        email,
        when_ms: seconds * 1000,
    })
}

fn parse_file_op(line: &[u8], ops: &mut Vec<FileOp>) -> Result<(), String> {
    match line[0] {
        b'M' => {
            // M <mode> :<mark> <path-to-eol>
            let rest = &line[2..];
            let space = rest
                .iter()
                .position(|&b| b == b' ')
                .ok_or("truncated M op")?;
            let mode =
                u32::from_str_radix(str::from_utf8(&rest[..space]).map_err(|_| "bad mode")?, 8)
                    .map_err(|_| "bad mode")?;
            let rest = &rest[space + 1..];
            let space = rest
                .iter()
                .position(|&b| b == b' ')
                .ok_or("truncated M op")?;
            let mark_field = &rest[..space];
            let mark = mark_field
                .strip_prefix(b":")
                .and_then(parse_u64)
                .ok_or("M op without mark reference")?;
            let path = parse_path_to_eol(&rest[space + 1..]).ok_or("bad M path")?;
            ops.push(FileOp::Modify { mode, mark, path });
        }
        b'D' => {
            let path = parse_path_to_eol(&line[2..]).ok_or("bad D path")?;
            ops.push(FileOp::Delete { path });
        }
        b'R' => {
            // R <old> <new>; the old path is quoted whenever it contains a
            // space, so the unquoted form ends at the separator.
            let rest = &line[2..];
            let (old, rest) = if rest.first() == Some(&b'"') {
                let (path, consumed) = unquote_path(rest).ok_or("bad R old path")?;
                (path, &rest[consumed..])
            } else {
                let space = rest
                    .iter()
                    .position(|&b| b == b' ')
                    .ok_or("truncated R op")?;
                (
                    String::from_utf8_lossy(&rest[..space]).into_owned(),
                    &rest[space..],
                )
            };
            let rest = rest.strip_prefix(b" ").ok_or("bad R separator")?;
            let new = parse_path_to_eol(rest).ok_or("bad R new path")?;
            ops.push(FileOp::Rename { old, new });
        }
        _ => unreachable!("caller dispatches on the opcode"),
    }
    Ok(())
}

/// Parses a path that runs to end of line, unquoting when necessary.
fn parse_path_to_eol(bytes: &[u8]) -> Option<String> {
    if bytes.first() == Some(&b'"') {
        let (path, consumed) = unquote_path(bytes)?;
        if consumed != bytes.len() {
            return None;
        }
        Some(path)
    } else if bytes.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Decodes a C-style quoted path: `\\`, `\"`, `\n`, `\t`, `\a`, `\b`, `\f`,
/// `\r`, `\v`, and 1-3 digit octal escapes. Returns the decoded path and the
/// number of input bytes consumed including both quotes.
fn unquote_path(bytes: &[u8]) -> Option<(String, usize)> {
    debug_assert_eq!(bytes.first(), Some(&b'"'));
    let mut out: Vec<u8> = vec![];
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => return Some((String::from_utf8_lossy(&out).into_owned(), i + 1)),
            b'\\' => {
                i += 1;
                let escape = *bytes.get(i)?;
                match escape {
                    b'\\' => {
                        out.push(b'\\');
                        i += 1;
                    }
                    b'"' => {
                        out.push(b'"');
                        i += 1;
                    }
                    b'n' => {
                        out.push(b'\n');
                        i += 1;
                    }
                    b't' => {
                        out.push(b'\t');
                        i += 1;
                    }
                    b'a' => {
                        out.push(0x07);
                        i += 1;
                    }
                    b'b' => {
                        out.push(0x08);
                        i += 1;
                    }
                    b'f' => {
                        out.push(0x0c);
                        i += 1;
                    }
                    b'r' => {
                        out.push(b'\r');
                        i += 1;
                    }
                    b'v' => {
                        out.push(0x0b);
                        i += 1;
                    }
                    b'0'..=b'7' => {
                        let mut value = 0u32;
                        let mut digits = 0;
                        while digits < 3 {
                            match bytes.get(i) {
                                Some(&d @ b'0'..=b'7') => {
                                    value = value * 8 + u32::from(d - b'0');
                                    i += 1;
                                    digits += 1;
                                }
                                _ => break,
                            }
                        }
                        out.push(value as u8);
                    }
                    _ => return None,
                }
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    None
}
