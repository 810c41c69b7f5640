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

mod common;

use common::TestEnvironment;

#[test]
fn test_remote_add_and_list() {
    let env = TestEnvironment::new();
    env.init_repo();
    insta::assert_snapshot!(
        env.run("repo", &["remote", "add", "origin", "postgres://db.example.com/one"]), @r"
    exit: 0
    ----- stderr -----
    Added remote origin
    ");
    insta::assert_snapshot!(env.run("repo", &["remote", "list"]), @r"
    exit: 0
    ----- stdout -----
    origin	postgres://db.example.com/one
    ");
}

#[test]
fn test_remote_add_twice_refuses() {
    let env = TestEnvironment::new();
    env.init_repo();
    env.run("repo", &["remote", "add", "origin", "postgres://db.example.com/one"]);
    insta::assert_snapshot!(
        env.run("repo", &["remote", "add", "origin", "postgres://db.example.com/two"]), @r"
    exit: 1
    ----- stderr -----
    Error: Remote origin already exists
    Hint: Change its URL instead: `pgit remote set-url origin <url>`
    ");
}

#[test]
fn test_remote_set_url_and_remove() {
    let env = TestEnvironment::new();
    env.init_repo();
    env.run("repo", &["remote", "add", "origin", "postgres://db.example.com/one"]);
    insta::assert_snapshot!(
        env.run("repo", &["remote", "set-url", "origin", "postgres://db.example.com/two"]), @r"
    exit: 0
    ----- stderr -----
    Updated remote origin
    ");
    insta::assert_snapshot!(env.run("repo", &["remote", "remove", "origin"]), @r"
    exit: 0
    ----- stderr -----
    Removed remote origin
    ");
    insta::assert_snapshot!(env.run("repo", &["remote", "remove", "origin"]), @r"
    exit: 1
    ----- stderr -----
    Error: Remote origin does not exist
    Hint: Add it first: `pgit remote add origin <url>`
    ");
}

#[test]
fn test_push_to_unknown_remote() {
    let env = TestEnvironment::new();
    env.init_repo();
    insta::assert_snapshot!(env.run("repo", &["push", "upstream"]), @r"
    exit: 1
    ----- stderr -----
    Error: Remote upstream does not exist
    Hint: Add it first: `pgit remote add upstream <url>`
    ");
}
