use irradiant_config::{StageBackendName, load_toml};
use rstest::rstest;

const BASE: &str = r#"
[scan]
galvo_um_per_volt_x = 613.0
galvo_um_per_volt_y = 748.0
mirror_recovery_us = 1094.0

[lut]
points = [[0.0, 0.0], [0.5, 1.5], [1.0, 3.0]]
voltage_range = [0.0, 3.0]

[limits.Z]
min_nm = -5000000.0
max_nm = 5000000.0
"#;

fn with(extra: &str) -> String {
    format!("{BASE}\n{extra}")
}

#[test]
fn minimal_config_fills_defaults() {
    let cfg = load_toml(BASE).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.daq.check_interval_ms, 1);
    assert!((cfg.daq.timeout_multiplier - 1.5).abs() < 1e-12);
    assert!((cfg.daq.amplitudes.aom - 3.0).abs() < 1e-12);
    assert_eq!(cfg.stage.backend, StageBackendName::Simulated);
    assert_eq!(cfg.stage.axis, "Z");
    assert_eq!(cfg.threading.position_monitor_ms, 50);
    assert!((cfg.jog.deadzone - 0.1).abs() < 1e-12);
    assert!(!cfg.lut.map_edges);
}

#[test]
fn points_accept_tables_and_tuples() {
    let toml = BASE.replace(
        "points = [[0.0, 0.0], [0.5, 1.5], [1.0, 3.0]]",
        "points = [{ power = 0.0, voltage = 0.0 }, [1.0, 3.0]]",
    );
    let cfg = load_toml(&toml).expect("parse TOML");
    assert_eq!(cfg.lut.points, vec![(0.0, 0.0), (1.0, 3.0)]);
}

#[rstest]
#[case("[daq]\ncheck_interval_ms = 0", "daq.check_interval_ms must be >= 1")]
#[case("[daq]\ntimeout_multiplier = 0.5", "daq.timeout_multiplier must be >= 1.0")]
#[case("[daq.amplitudes]\naom = 0.0", "daq.amplitudes.aom must be > 0")]
#[case("[print]\ndwell_us = 0.0", "print.dwell_us must be > 0")]
#[case("[jog]\ndeadzone = 1.5", "jog.deadzone must be in")]
#[case("[jog]\nfine_multiplier = 2.0", "jog.fine_multiplier must be in")]
#[case(
    "[settling.xeryon]\npoll_ms = 10\nduration_ms = 5\ntolerance_nm = 50.0\ntimeout_ms = 1000",
    "settling.xeryon.duration_ms must be >= poll_ms"
)]
#[case(
    "[limits.X]\nmin_nm = 10.0\nmax_nm = -10.0",
    "limits.x: min_nm must be < max_nm"
)]
fn rejects_bad_values(#[case] extra: &str, #[case] needle: &str) {
    let cfg = load_toml(&with(extra)).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").to_lowercase().contains(&needle.to_lowercase()),
        "unexpected error: {err}"
    );
}

#[test]
fn stage_axis_requires_limits() {
    let cfg = load_toml(&with("[stage]\naxis = \"ZAXIS\"")).expect("parse TOML");
    let err = cfg.validate().expect_err("missing limits");
    assert!(format!("{err}").contains("limits.ZAXIS missing"));
}

#[test]
fn limits_lookup_is_case_insensitive() {
    let cfg = load_toml(BASE).expect("parse TOML");
    let l = cfg.limits_for("z").expect("limits");
    assert_eq!(l.max_nm, 5_000_000.0);
}

#[test]
fn rejects_descending_inline_lut() {
    let toml = BASE.replace(
        "points = [[0.0, 0.0], [0.5, 1.5], [1.0, 3.0]]",
        "points = [[0.5, 0.0], [0.2, 1.0]]",
    );
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("descending power");
    assert!(format!("{err}").contains("strictly ascending"));
}

#[test]
fn settling_falls_back_to_backend_defaults() {
    let cfg = load_toml(&with("[stage]\nbackend = \"dover\"")).expect("parse TOML");
    let s = cfg.settling_for_stage();
    assert_eq!(s.poll_ms, 15);
    assert_eq!(s.duration_ms, 800);
    assert_eq!(s.tolerance_nm, 30.0);

    let cfg = load_toml(&with(
        "[stage]\nbackend = \"xeryon\"\n[settling.xeryon]\npoll_ms = 5\nduration_ms = 100\ntolerance_nm = 20.0\ntimeout_ms = 3000",
    ))
    .expect("parse TOML");
    assert_eq!(cfg.settling_for_stage().poll_ms, 5);
}

#[test]
fn unknown_backend_fails_to_parse() {
    assert!(load_toml(&with("[stage]\nbackend = \"piezo9000\"")).is_err());
}

#[test]
fn shipped_sample_config_is_valid() {
    let text = include_str!("../../etc/irradiant.toml");
    let cfg = load_toml(text).expect("parse sample config");
    cfg.validate().expect("sample config should validate");
}
