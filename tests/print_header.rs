use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const FIXTURE: &str = r#"{
    "post_view": {
        "post": {
            "id": 7,
            "name": "Cover art",
            "url": "https://example.com/story",
            "body": "Some **bold** words and [a link](https://docs.rs)."
        },
        "creator": {"id": 1, "name": "alice", "actor_id": "https://lemmy.ml/u/alice", "local": true},
        "community": {"id": 2, "name": "pics", "actor_id": "https://beehaw.org/c/pics", "local": false},
        "counts": {"comments": 2, "score": 40}
    },
    "comments": [
        {"comment": {"id": 11, "post_id": 7, "content": "first", "path": "0.11"},
         "creator": {"id": 3, "name": "bob"}}
    ]
}"#;

fn setup() -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("post.json");
    fs::write(&path, FIXTURE).unwrap();
    (dir, path)
}

fn threadview(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("threadview").unwrap();
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"));
    cmd
}

#[test]
fn prints_expanded_header_from_file() {
    let (dir, path) = setup();
    threadview(&dir)
        .arg("--print")
        .arg("--file")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Cover art"))
        .stdout(predicate::str::contains("pics@beehaw.org · by alice"))
        .stdout(predicate::str::contains("↑ 40 · 2 comments"))
        .stdout(predicate::str::contains("https://example.com/story"))
        .stdout(predicate::str::contains("Some bold words"));
}

#[test]
fn comment_url_prints_collapsed_header() {
    let (dir, path) = setup();
    threadview(&dir)
        .args(["--print", "--file"])
        .arg(&path)
        .arg("https://lemmy.ml/comment/11")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cover art"))
        .stdout(predicate::str::contains("Some bold words").not())
        .stdout(predicate::str::contains("Enter expands the post"));
}

#[test]
fn unknown_post_in_file_fails() {
    let (dir, path) = setup();
    threadview(&dir)
        .args(["--print", "--file"])
        .arg(&path)
        .arg("99")
        .assert()
        .failure();
}
