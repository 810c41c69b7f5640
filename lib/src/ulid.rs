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

//! Commit identifiers.
//!
//! A commit id is a 26-character Crockford-base32 ULID: the first 10
//! characters encode milliseconds since the Unix epoch, the remaining 16 are
//! random. Sorting ids as strings therefore sorts them by creation time,
//! which is what the append-only commit chain relies on.

use std::fmt;

use rand::Rng as _;

/// Crockford base32, canonical uppercase form. Excludes I, L, O, U.
const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

const TIME_LEN: usize = 10;
const RANDOM_LEN: usize = 16;

/// Total length of an encoded id.
pub const ULID_LEN: usize = TIME_LEN + RANDOM_LEN;

/// How many characters a short form keeps (the tail of the random part).
pub const SHORT_LEN: usize = 7;

fn decode_char(c: u8) -> Option<u64> {
    let c = c.to_ascii_uppercase();
    let value = match c {
        b'0'..=b'9' => c - b'0',
        b'A'..=b'H' => c - b'A' + 10,
        b'J' | b'K' => c - b'J' + 18,
        b'M' | b'N' => c - b'M' + 20,
        b'P'..=b'T' => c - b'P' + 22,
        b'V'..=b'Z' => c - b'V' + 27,
        _ => return None,
    };
    Some(u64::from(value))
}

/// A commit id. Always holds exactly [`ULID_LEN`] canonical Crockford-base32
/// characters.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    /// Generates a fresh id stamped with the current wall-clock time.
    pub fn generate() -> Self {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        Self::generate_with_time(now)
    }

    /// Generates a fresh id with the given millisecond timestamp. The import
    /// engine uses this to keep ids ordered by the foreign history's
    /// author dates.
    pub fn generate_with_time(timestamp_ms: u64) -> Self {
        let mut rng = rand::rng();
        let random: u128 = rng.random::<u128>() & ((1u128 << 80) - 1);
        Self::from_parts(timestamp_ms, random)
    }

    fn from_parts(timestamp_ms: u64, random: u128) -> Self {
        let mut buf = [0u8; ULID_LEN];
        let mut time = timestamp_ms & ((1 << 48) - 1);
        for slot in buf[..TIME_LEN].iter_mut().rev() {
            *slot = ALPHABET[(time & 0x1f) as usize];
            time >>= 5;
        }
        let mut random = random;
        for slot in buf[TIME_LEN..].iter_mut().rev() {
            *slot = ALPHABET[(random & 0x1f) as usize];
            random >>= 5;
        }
        Self(String::from_utf8(buf.to_vec()).unwrap())
    }

    /// Parses a full id. Lowercase input is canonicalized.
    pub fn try_from_string(s: &str) -> Option<Self> {
        if s.len() != ULID_LEN {
            return None;
        }
        let canonical: String = s.to_ascii_uppercase();
        if !canonical.bytes().all(|c| decode_char(c).is_some()) {
            return None;
        }
        Some(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Milliseconds since epoch encoded in the id prefix.
    pub fn timestamp_ms(&self) -> u64 {
        self.0
            .bytes()
            .take(TIME_LEN)
            .fold(0, |acc, c| acc << 5 | decode_char(c).unwrap())
    }

    /// The abbreviated form shown in logs and accepted back as a reference:
    /// the last [`SHORT_LEN`] characters, uppercased.
    pub fn short(&self) -> String {
        self.0[ULID_LEN - SHORT_LEN..].to_ascii_uppercase()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.pad(&self.0)
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_tuple("CommitId").field(&self.0).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_and_alphabet() {
        let id = CommitId::generate();
        assert_eq!(id.as_str().len(), ULID_LEN);
        assert!(id.as_str().bytes().all(|c| ALPHABET.contains(&c)));
    }

    #[test]
    fn test_timestamp_round_trip() {
        for ts in [0, 1, 1_700_000_000_000, (1 << 48) - 1] {
            let id = CommitId::generate_with_time(ts);
            assert_eq!(id.timestamp_ms(), ts);
        }
    }

    #[test]
    fn test_time_ordering_is_lexicographic() {
        let earlier = CommitId::generate_with_time(1_700_000_000_000);
        let later = CommitId::generate_with_time(1_700_000_000_001);
        assert!(earlier < later);
        assert!(earlier.as_str() < later.as_str());
    }

    #[test]
    fn test_short_is_tail() {
        let id = CommitId::try_from_string("01HV3N7M8PQRSTVWXYZ0123456").unwrap();
        assert_eq!(id.short(), "0123456");
        assert_eq!(id.short().len(), SHORT_LEN);
    }

    #[test]
    fn test_parse_canonicalizes_case() {
        let id = CommitId::try_from_string("01hv3n7m8pqrstvwxyz0123456").unwrap();
        assert_eq!(id.as_str(), "01HV3N7M8PQRSTVWXYZ0123456");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        // Wrong length
        assert_eq!(CommitId::try_from_string("01HV"), None);
        // 'U' is not in the Crockford alphabet
        assert_eq!(CommitId::try_from_string("U1HV3N7M8PQRSTVWXYZ0123456"), None);
    }

    #[test]
    fn test_decode_char_table() {
        assert_eq!(decode_char(b'0'), Some(0));
        assert_eq!(decode_char(b'9'), Some(9));
        assert_eq!(decode_char(b'A'), Some(10));
        assert_eq!(decode_char(b'Z'), Some(31));
        assert_eq!(decode_char(b'z'), Some(31));
        assert_eq!(decode_char(b'U'), None);
        assert_eq!(decode_char(b'I'), None);
        assert_eq!(decode_char(b'L'), None);
        assert_eq!(decode_char(b'O'), None);
    }
}
