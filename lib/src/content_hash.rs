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

//! Content addressing for file blobs.

use std::fmt;
use std::io;
use std::io::Read;

/// Number of hash bytes kept. BLAKE3 output truncated to 128 bits is plenty
/// for content equality within one repository.
pub const HASH_LEN: usize = 16;

/// How much of a blob the binary heuristic samples.
const BINARY_SAMPLE_LEN: usize = 8 * 1024;

/// Fraction of non-text bytes in the sample above which a blob is binary.
const BINARY_RATIO: f64 = 0.30;

/// Truncated BLAKE3 hash of a blob's content.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; HASH_LEN]);

impl ContentHash {
    pub fn of_bytes(data: &[u8]) -> Self {
        let full = blake3::hash(data);
        let mut truncated = [0; HASH_LEN];
        truncated.copy_from_slice(&full.as_bytes()[..HASH_LEN]);
        Self(truncated)
    }

    /// Hashes a reader without buffering the whole content, for files above
    /// the working-copy streaming threshold.
    pub fn of_reader(reader: &mut impl Read) -> io::Result<Self> {
        let mut hasher = blake3::Hasher::new();
        let mut buf = [0; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let full = hasher.finalize();
        let mut truncated = [0; HASH_LEN];
        truncated.copy_from_slice(&full.as_bytes()[..HASH_LEN]);
        Ok(Self(truncated))
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let truncated: [u8; HASH_LEN] = bytes.try_into().ok()?;
        Some(Self(truncated))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_tuple("ContentHash").field(&self.hex()).finish()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.pad(&self.hex())
    }
}

/// Guesses whether a blob holds binary data.
///
/// A NUL byte in the first 8 KiB flags the blob immediately. Otherwise the
/// blob is binary when too large a share of the sample falls outside
/// printable ASCII plus common whitespace. The NUL rule alone would
/// misclassify UTF-16 text, hence the distribution test. This is a heuristic:
/// nothing downstream may assume the classification is stable.
pub fn detect_binary(data: &[u8]) -> bool {
    let sample = &data[..data.len().min(BINARY_SAMPLE_LEN)];
    if sample.is_empty() {
        return false;
    }
    if sample.contains(&0) {
        return true;
    }
    let suspicious = sample
        .iter()
        .filter(|&&b| !(b == b'\t' || b == b'\n' || b == b'\r' || (0x20..0x7f).contains(&b)))
        .count();
    suspicious as f64 / sample.len() as f64 > BINARY_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_truncated_blake3() {
        let hash = ContentHash::of_bytes(b"hello\n");
        assert_eq!(hash.as_bytes().len(), HASH_LEN);
        assert_eq!(
            hash.as_bytes(),
            &blake3::hash(b"hello\n").as_bytes()[..HASH_LEN]
        );
    }

    #[test]
    fn test_hash_reader_matches_bytes() {
        let data = vec![42u8; 200 * 1024];
        let streamed = ContentHash::of_reader(&mut &data[..]).unwrap();
        assert_eq!(streamed, ContentHash::of_bytes(&data));
    }

    #[test]
    fn test_hex_round_trip() {
        let hash = ContentHash::of_bytes(b"x");
        assert_eq!(hash.hex().len(), HASH_LEN * 2);
        assert_eq!(ContentHash::from_bytes(hash.as_bytes()), Some(hash));
        assert_eq!(ContentHash::from_bytes(b"too short"), None);
    }

    #[test]
    fn test_detect_binary_empty_is_text() {
        assert!(!detect_binary(b""));
    }

    #[test]
    fn test_detect_binary_nul_byte() {
        assert!(detect_binary(b"ELF\0header"));
    }

    #[test]
    fn test_detect_binary_plain_text() {
        assert!(!detect_binary(b"fn main() {\n\tprintln!(\"hi\");\n}\n"));
    }

    #[test]
    fn test_detect_binary_high_bit_noise() {
        let noise: Vec<u8> = (0..1024).map(|i| 0x80 | (i % 64) as u8).collect();
        assert!(detect_binary(&noise));
    }

    #[test]
    fn test_detect_binary_mostly_utf8_text() {
        // Accented text has some high bytes but stays under the threshold.
        let text = "déjà vu, café, naïve\n".repeat(100);
        assert!(!detect_binary(text.as_bytes()));
    }

    #[test]
    fn test_detect_binary_samples_only_prefix() {
        let mut data = vec![b'a'; BINARY_SAMPLE_LEN];
        data.push(0);
        assert!(!detect_binary(&data));
    }
}
