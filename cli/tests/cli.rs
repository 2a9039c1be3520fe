use assert_cmd::Command;
use selftest::SCENARIO_CATALOG;
use serde_json::Value;
use std::io::Write;
use tempfile::NamedTempFile;

fn catalog_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(SCENARIO_CATALOG.as_bytes()).unwrap();
    file
}

fn provsys(catalog: &NamedTempFile, args: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("provsys").unwrap();
    cmd.args(&["--conf", catalog.path().to_str().unwrap()]);
    cmd.args(args);
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "{:?}", output);
    serde_json::from_str(&String::from_utf8_lossy(&output.stdout)).unwrap()
}

fn string_field(rows: &Value, field: &str) -> Vec<String> {
    rows.as_array()
        .unwrap()
        .iter()
        .map(|row| row.get(field).unwrap().as_str().unwrap().to_string())
        .collect()
}

#[test]
fn list_all_providers() {
    let catalog = catalog_file();
    let rows = json_stdout(&mut provsys(&catalog, &["list", "--json"]));
    let mut keys = string_field(&rows, "key");
    keys.sort();
    assert_eq!(keys, vec!["rhv1", "vc1", "vc2"]);
}

#[test]
fn list_latest_of_a_type() {
    let catalog = catalog_file();
    let rows = json_stdout(&mut provsys(
        &catalog,
        &["list", "--class", "vmware", "--selector", "LATEST", "--json"],
    ));
    assert_eq!(string_field(&rows, "key"), vec!["vc2"]);
}

#[test]
fn collect_one_per_type() {
    let catalog = catalog_file();
    let rows = json_stdout(&mut provsys(
        &catalog,
        &[
            "collect",
            "--marker",
            "{classes: [infra], selector: ONE_PER_TYPE}",
            "--json",
        ],
    ));
    let mut tests = string_field(&rows, "test");
    tests.sort();
    assert_eq!(
        tests,
        vec!["test_preview[rhevm]", "test_preview[virtualcenter]"]
    );
    assert!(string_field(&rows, "scope").iter().all(|s| s == "function"));
}

#[test]
fn collect_without_matching_providers_uncollects() {
    let catalog = catalog_file();
    let output = provsys(&catalog, &["collect", "--marker", "{classes: [ec2]}"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("Uncollected: "));
}

#[test]
fn collect_rejects_malformed_marker() {
    let catalog = catalog_file();
    provsys(&catalog, &["collect", "--marker", "{selector: SOME}"])
        .assert()
        .failure();
}

#[test]
fn missing_catalog_fails() {
    let mut cmd = Command::cargo_bin("provsys").unwrap();
    cmd.args(&["--conf", "/nonexistent/provsys.yaml", "list"]);
    cmd.assert().failure();
}
