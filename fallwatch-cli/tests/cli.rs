#![allow(clippy::expect_used)]

use insta::assert_snapshot;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn fallwatch_cli(db_path: &Path, args: &[&str]) -> Output {
    Command::new(assert_cmd::cargo::cargo_bin!("fallwatch-cli"))
        .arg("--database")
        .arg(db_path)
        .args(args)
        .output()
        .expect("run fallwatch-cli")
}

fn stdout(output: &Output) -> String {
    if !output.status.success() {
        eprintln!("stderr: {}", String::from_utf8_lossy(&output.stderr));
    }
    assert!(output.status.success());
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_stats_on_empty_store() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempdir()?;
    let db_path = temp_dir.path().join("clients.redb");

    let output = fallwatch_cli(&db_path, &["stats"]);
    assert_snapshot!(stdout(&output), @r"
    FallWatch Datastore Statistics
    ==============================
    Patients: 0
    Allergies: 0
    Emergency contacts: 0
    ");
    Ok(())
}

#[test]
fn test_register_and_show_patient() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempdir()?;
    let db_path = temp_dir.path().join("clients.redb");

    let added = fallwatch_cli(
        &db_path,
        &[
            "add-patient",
            "--firstname",
            "Daisy",
            "--lastname",
            "Riley",
            "--address",
            "6 Jedburgh Road",
            "--postcode",
            "EH46 7AD",
            "--format",
            "json",
        ],
    );
    let created: serde_json::Value = serde_json::from_str(&stdout(&added))?;
    assert_eq!(created["id"], 1);

    stdout(&fallwatch_cli(&db_path, &["add-allergy", "1", "Penicillin"]));
    stdout(&fallwatch_cli(
        &db_path,
        &[
            "add-contact",
            "1",
            "--firstname",
            "Tom",
            "--lastname",
            "Riley",
            "--relationship",
            "Son",
            "--phone",
            "07700 900456",
        ],
    ));

    let shown = fallwatch_cli(&db_path, &["show", "1"]);
    assert_snapshot!(stdout(&shown), @r"
    Patient 1: Daisy Riley
    Address: 6 Jedburgh Road, EH46 7AD
    Heartrate: - BPM
    Latitude: -
    Longitude: -
    Allergies:
      Penicillin
    Emergency contacts:
      [Son] - Tom Riley - 07700 900456
    ");

    let record: serde_json::Value =
        serde_json::from_str(&stdout(&fallwatch_cli(&db_path, &["show", "1", "-f", "json"])))?;
    assert_eq!(record["firstname"], "Daisy");
    assert_eq!(record["allergies"][0], "Penicillin");
    assert!(record["heartrate"].is_null());

    let listed = fallwatch_cli(&db_path, &["list", "--format", "json"]);
    let list: serde_json::Value = serde_json::from_str(&stdout(&listed))?;
    assert_eq!(list[0]["name"], "Daisy Riley");
    Ok(())
}

#[test]
fn test_missing_patient_fails() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempdir()?;
    let db_path = temp_dir.path().join("clients.redb");

    let output = fallwatch_cli(&db_path, &["show", "7"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("patient 7 not found"), "stderr: {stderr}");

    let output = fallwatch_cli(&db_path, &["add-allergy", "7", "Latex"]);
    assert!(!output.status.success());
    Ok(())
}
