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

//! Small text helpers shared by the command modules.

use chrono::DateTime;
use chrono::Local;
use pgit_lib::store::Signature;

/// Parses `--author "Name <email>"`.
pub fn parse_author(author: &str) -> Result<Signature, String> {
    let open = author
        .find('<')
        .ok_or_else(|| "expected \"Name <email>\" format".to_owned())?;
    let close = author
        .rfind('>')
        .filter(|&close| close == author.len() - 1 && close > open)
        .ok_or_else(|| "expected \"Name <email>\" format".to_owned())?;
    let name = author[..open].trim();
    let email = author[open + 1..close].trim();
    if name.is_empty() || email.is_empty() {
        return Err("expected \"Name <email>\" format".to_owned());
    }
    Ok(Signature {
        name: name.to_owned(),
        email: email.to_owned(),
    })
}

/// Renders a stored millisecond timestamp in the local timezone.
pub fn format_timestamp(timestamp_ms: i64) -> String {
    match DateTime::from_timestamp_millis(timestamp_ms) {
        Some(utc) => utc
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => "<invalid date>".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_author() {
        let signature = parse_author("Ada Lovelace <ada@example.com>").unwrap();
        assert_eq!(signature.name, "Ada Lovelace");
        assert_eq!(signature.email, "ada@example.com");

        assert!(parse_author("no email here").is_err());
        assert!(parse_author("<only@email.com>").is_err());
        assert!(parse_author("Name <>").is_err());
        assert!(parse_author("Name <a@b.c> trailing").is_err());
    }
}
