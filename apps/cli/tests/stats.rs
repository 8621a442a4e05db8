use std::error::Error;
use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn cli(workspace: &Path) -> Result<Command, Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("novelist-cli")?;
    cmd.arg("--workspace").arg(workspace);
    Ok(cmd)
}

fn setup(workspace: &Path) -> Result<(), Box<dyn Error>> {
    cli(workspace)?
        .args(["init", "novel.json", "--name", "Foo"])
        .assert()
        .success();
    cli(workspace)?
        .args(["add", "novel.json", "chapter", "0", "One"])
        .assert()
        .success();
    cli(workspace)?
        .args([
            "add",
            "novel.json",
            "scene",
            "0/0",
            "Dawn",
            "--content",
            "The dog barked.",
        ])
        .assert()
        .success();
    cli(workspace)?
        .args(["add", "novel.json", "scene", "1", "Idea", "--content", "cats"])
        .assert()
        .success();
    Ok(())
}

#[test]
fn stats_count_the_manuscript_or_a_subtree() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    setup(dir.path())?;

    cli(dir.path())?
        .args(["stats", "novel.json"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Words: 5")
                .and(predicate::str::contains("Letters: 22")),
        );

    cli(dir.path())?
        .args(["stats", "novel.json", "--path", "0/0/0"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Words: 4")
                .and(predicate::str::contains("Letters: 19")),
        );

    cli(dir.path())?
        .args(["stats", "novel.json", "--path", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Words: 2"));

    Ok(())
}

#[test]
fn snapshots_respect_the_configured_interval() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    setup(dir.path())?;
    let history = dir.path().join(".novelist").join("novel.stats.json");

    cli(dir.path())?
        .args(["stats", "novel.json", "--snapshot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Snapshot recorded at"));
    cli(dir.path())?
        .args(["stats", "novel.json", "--snapshot", "--history"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Snapshot skipped")
                .and(predicate::str::contains("Snapshots:")),
        );
    let document: serde_json::Value = serde_json::from_str(&fs::read_to_string(&history)?)?;
    assert_eq!(document["snapshots"].as_array().map(Vec::len), Some(1));
    assert_eq!(document["snapshots"][0]["words"], 5);
    assert_eq!(document["snapshots"][0]["chars"], 22);

    fs::write(
        dir.path().join(".novelist").join("preferences.json"),
        r#"{ "stats": { "snapshot_interval_minutes": 0 } }"#,
    )?;
    cli(dir.path())?
        .args(["stats", "novel.json", "--snapshot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Snapshot recorded at"));
    let document: serde_json::Value = serde_json::from_str(&fs::read_to_string(&history)?)?;
    assert_eq!(document["snapshots"].as_array().map(Vec::len), Some(2));

    Ok(())
}

#[test]
fn stats_labels_follow_the_preferred_locale() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    setup(dir.path())?;
    fs::create_dir_all(dir.path().join(".novelist"))?;
    fs::write(
        dir.path().join(".novelist").join("preferences.json"),
        r#"{ "ui": { "locale": "de-DE" } }"#,
    )?;

    cli(dir.path())?
        .args(["stats", "novel.json"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Worte: 5")
                .and(predicate::str::contains("Buchstaben: 22")),
        );

    Ok(())
}
