use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

const BASE: &str = r#"
[daq]
check_interval_ms = 1
timeout_multiplier = 1.5

[scan]
galvo_um_per_volt_x = 613.0
galvo_um_per_volt_y = 748.0
mirror_recovery_us = 1094.0
z_nm_per_unit = 100000.0

[lut]
points = [[0.0, 0.0], [0.5, 0.4], [1.0, 1.0]]
voltage_range = [0.0, 1.0]

[print]
z_step_um = 1.5
dwell_us = 5.0

[stage]
backend = "simulated"
axis = "Z"

[limits.Z]
min_nm = -5000000.0
max_nm = 5000000.0

[settling.simulated]
poll_ms = 1
duration_ms = 10
tolerance_nm = 50.0
timeout_ms = 2000
"#;

fn write_config(dir: &tempfile::TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("irradiant.toml");
    fs::write(&path, text).unwrap();
    path
}

fn irradiant(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("irradiant").unwrap();
    cmd.arg("--config").arg(cfg).arg("--log-level").arg("warn");
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "OK:", "stdout")]
#[case(&["print", "--dense", "0.5", "--shape", "2,3,2", "--dry-run"], 0, "Print completed", "stdout")]
#[case(&["print", "--dense", "0.5", "--shape", "2,3,3", "--z-step-um", "10000"], 5, "outside the allowed range", "stderr")]
#[case(&["print", "--dense", "0.5"], 2, "--shape", "stderr")]
#[case(&["print"], 5, "--matrix", "stderr")]
#[case(&["move", "--to", "1000", "--settle"], 0, "settled", "stdout")]
#[case(&["move", "--to", "9000000000"], 5, "outside the allowed range", "stderr")]
#[case(&["laser", "--volts", "5.0"], 5, "outside ±3", "stderr")]
#[case(&["laser", "--volts", "1.0", "--for-ms", "30"], 0, "released", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, BASE);

    let mut cmd = irradiant(&cfg);
    for a in args {
        cmd.arg(a);
    }
    let out = cmd.output().unwrap();
    assert_eq!(
        out.status.code(),
        Some(exit_code),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    let text = if stream == "stdout" { &out.stdout } else { &out.stderr };
    assert!(
        String::from_utf8_lossy(text).contains(needle),
        "{stream} did not contain {needle:?}: {}",
        String::from_utf8_lossy(text)
    );
}

#[test]
fn print_json_summary_reports_layers() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, BASE);

    let out = irradiant(&cfg)
        .args(["--json", "print", "--dense", "0.5", "--shape", "2,3,2"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let line = String::from_utf8_lossy(&out.stdout);
    let v: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(v["outcome"], "completed");
    assert_eq!(v["total_layers"], 2);
    assert_eq!(v["layers_done"], 2);
    assert_eq!(v["dry_run"], false);
    assert!(v["samples_streamed"].as_u64().unwrap() > 0);
}

#[test]
fn empty_layers_are_skipped() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, BASE);
    let matrix = dir.path().join("dose.json");
    // 1x2x2, layer index fastest: layer 0 = [1, 1], layer 1 = [0, 0]
    fs::write(&matrix, r#"{"shape": [1, 2, 2], "data": [1.0, 0.0, 1.0, 0.0]}"#).unwrap();

    let out = irradiant(&cfg)
        .arg("--json")
        .arg("print")
        .arg("--matrix")
        .arg(&matrix)
        .arg("--dry-run")
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_str(String::from_utf8_lossy(&out.stdout).trim()).unwrap();
    assert_eq!(v["dropped_layers"], 1);
    assert_eq!(v["layers_done"], 1);
    assert_eq!(v["dry_run"], true);
}

#[test]
fn invalid_config_is_a_validation_error() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, &BASE.replace("check_interval_ms = 1", "check_interval_ms = 0"));

    irradiant(&cfg)
        .arg("self-check")
        .assert()
        .code(5)
        .stderr(predicate::str::contains("check_interval_ms"));
}

#[test]
fn json_errors_are_structured() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, BASE);

    let out = irradiant(&cfg)
        .args(["--json", "move", "--to", "-9000000000"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(5));
    let stderr = String::from_utf8_lossy(&out.stderr);
    let last = stderr.lines().last().unwrap();
    let v: serde_json::Value = serde_json::from_str(last).unwrap();
    assert_eq!(v["reason"], "OutOfRange");
    assert_eq!(v["details"]["axis"], "Z");
}

#[test]
fn missing_config_file_fails_generically() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("nope.toml");

    Command::cargo_bin("irradiant")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("could not be loaded"));
}

#[test]
fn lut_csv_with_bad_headers_is_rejected() {
    let dir = tempdir().unwrap();
    let text = BASE.replace(
        "points = [[0.0, 0.0], [0.5, 0.4], [1.0, 1.0]]",
        "csv = \"lut.csv\"",
    );
    let cfg = write_config(&dir, &text);

    let mut f = fs::File::create(dir.path().join("lut.csv")).unwrap();
    writeln!(f, "dose,volts").unwrap();
    writeln!(f, "0.0,0.0").unwrap();
    writeln!(f, "1.0,1.0").unwrap();

    irradiant(&cfg)
        .arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid headers in LUT CSV"));
}
