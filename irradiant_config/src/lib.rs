#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas, LUT parsing and dose-matrix loading for the exposure system.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The LUT CSV loader enforces headers and a strictly ascending power column.
//! - Dose matrices are read from a small JSON document (`shape` + flat `data`).
use serde::Deserialize;
use serde::de::Deserializer;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// LUT CSV schema.
///
/// Expected headers:
/// power,voltage
///
/// Example:
/// power,voltage
/// 0.0,0.0
/// 0.5,0.42
/// 1.0,1.0
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct LutRow {
    pub power: f64,
    pub voltage: f64,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Amplitudes {
    pub x_galvo: f64,
    pub y_galvo: f64,
    pub aom: f64,
    pub z_piezo: f64,
}

impl Default for Amplitudes {
    fn default() -> Self {
        Self {
            x_galvo: 1.4,
            y_galvo: 1.4,
            aom: 3.0,
            z_piezo: 1.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DaqCfg {
    /// Interval between stop-flag / completion checks while streaming (ms)
    pub check_interval_ms: u64,
    /// Completion wait cap as a multiple of the nominal buffer duration
    pub timeout_multiplier: f64,
    /// Per-channel output amplitude (V); buffers are scaled by and clipped to it
    pub amplitudes: Amplitudes,
}

impl Default for DaqCfg {
    fn default() -> Self {
        Self {
            check_interval_ms: 1,
            timeout_multiplier: 1.5,
            amplitudes: Amplitudes::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScanCfg {
    /// Galvo scaling (µm per volt), fast axis
    pub galvo_um_per_volt_x: f64,
    /// Galvo scaling (µm per volt), slow axis
    pub galvo_um_per_volt_y: f64,
    /// Mirror flyback time inserted before each line (µs)
    pub mirror_recovery_us: f64,
    /// Z travel (nm) per unit of normalized drive level
    #[serde(default = "default_z_nm_per_unit")]
    pub z_nm_per_unit: f64,
}

fn default_z_nm_per_unit() -> f64 {
    100_000.0
}

#[derive(Debug, Deserialize)]
pub struct LutCfg {
    /// Path to a `power,voltage` CSV; relative paths resolve against the config file
    #[serde(default)]
    pub csv: Option<PathBuf>,
    /// Inline breakpoints. Accepts either:
    /// - array of tuples: [[0.0, 0.0], [1.0, 1.0]]
    /// - array of tables: [{ power = 0.0, voltage = 0.0 }, ...]
    #[serde(default, deserialize_with = "de_points")]
    pub points: Vec<(f64, f64)>,
    /// Clamp range for interpolated voltages
    #[serde(default = "default_voltage_range")]
    pub voltage_range: (f64, f64),
    /// Values within this distance of 0 or 1 are treated as edges
    #[serde(default = "default_mask_tolerance")]
    pub mask_tolerance: f64,
    /// Map edge values through the table too (default: pass them through)
    #[serde(default)]
    pub map_edges: bool,
}

fn default_voltage_range() -> (f64, f64) {
    (0.0, 1.0)
}

fn default_mask_tolerance() -> f64 {
    1e-10
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PointToml {
    Tuple((f64, f64)),
    Table { power: f64, voltage: f64 },
}

fn de_points<'de, D>(deserializer: D) -> Result<Vec<(f64, f64)>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Vec<PointToml>> = Option::deserialize(deserializer)?;
    let mut out = Vec::new();
    if let Some(items) = opt {
        for p in items {
            match p {
                PointToml::Tuple(t) => out.push(t),
                PointToml::Table { power, voltage } => out.push((power, voltage)),
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PrintCfg {
    /// Z step between layers (µm)
    pub z_step_um: f64,
    /// Dwell time per sample (µs)
    pub dwell_us: f64,
    /// Field of view, fast axis (µm)
    pub fov_x_um: f64,
    /// Field of view, slow axis (µm)
    pub fov_y_um: f64,
    /// Execute layers last-to-first
    pub invert_layer_order: bool,
}

impl Default for PrintCfg {
    fn default() -> Self {
        Self {
            z_step_um: 1.5,
            dwell_us: 5.0,
            fov_x_um: 650.0,
            fov_y_um: 650.0,
            invert_layer_order: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StageBackendName {
    #[default]
    Simulated,
    Xeryon,
    Dover,
    Pdxc2,
}

impl StageBackendName {
    pub fn as_str(self) -> &'static str {
        match self {
            StageBackendName::Simulated => "simulated",
            StageBackendName::Xeryon => "xeryon",
            StageBackendName::Dover => "dover",
            StageBackendName::Pdxc2 => "pdxc2",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StageCfg {
    pub backend: StageBackendName,
    /// Axis name used for limits lookup and logging
    pub axis: String,
    /// Substitute a simulated axis when the backend is unavailable
    pub fallback_to_simulated: bool,
}

impl Default for StageCfg {
    fn default() -> Self {
        Self {
            backend: StageBackendName::Simulated,
            axis: "Z".to_string(),
            fallback_to_simulated: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct AxisLimitsCfg {
    pub min_nm: f64,
    pub max_nm: f64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct SettlingCfg {
    /// Time between position checks (ms)
    pub poll_ms: u64,
    /// Time of stability required (ms)
    pub duration_ms: u64,
    /// Allowed distance from target and allowed position range (nm)
    pub tolerance_nm: f64,
    /// Maximum time to wait for settling (ms)
    pub timeout_ms: u64,
}

impl SettlingCfg {
    /// Factory defaults for a backend that has no `[settling.<backend>]` table.
    pub fn default_for(backend: StageBackendName) -> Self {
        match backend {
            StageBackendName::Xeryon => Self {
                poll_ms: 2,
                duration_ms: 1500,
                tolerance_nm: 50.0,
                timeout_ms: 15_000,
            },
            StageBackendName::Dover => Self {
                poll_ms: 15,
                duration_ms: 800,
                tolerance_nm: 30.0,
                timeout_ms: 10_000,
            },
            StageBackendName::Pdxc2 => Self {
                poll_ms: 25,
                duration_ms: 250,
                tolerance_nm: 10_000.0,
                timeout_ms: 10_000,
            },
            StageBackendName::Simulated => Self {
                poll_ms: 1,
                duration_ms: 20,
                tolerance_nm: 50.0,
                timeout_ms: 2_000,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ThreadingCfg {
    /// Display refresh interval for the position monitor (ms)
    pub position_monitor_ms: u64,
    /// Jog input poll interval (ms)
    pub jog_poll_ms: u64,
    /// How long shutdown waits for a worker thread (ms)
    pub join_timeout_ms: u64,
}

impl Default for ThreadingCfg {
    fn default() -> Self {
        Self {
            position_monitor_ms: 50,
            jog_poll_ms: 100,
            join_timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct JogCfg {
    /// Deflection below which an input axis is ignored (0..1)
    pub deadzone: f64,
    /// nm per unit deflection per tick, X/Y
    pub scale_xy_nm: f64,
    /// nm per unit deflection per tick, Z
    pub scale_z_nm: f64,
    /// Scale multiplier while fine mode is held
    pub fine_multiplier: f64,
}

impl Default for JogCfg {
    fn default() -> Self {
        Self {
            deadzone: 0.1,
            scale_xy_nm: 500_000.0,
            scale_z_nm: 50_000.0,
            fine_multiplier: 0.1,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daq: DaqCfg,
    pub scan: ScanCfg,
    pub lut: LutCfg,
    #[serde(default)]
    pub print: PrintCfg,
    #[serde(default)]
    pub stage: StageCfg,
    /// Per-axis position limits keyed by axis name
    #[serde(default)]
    pub limits: BTreeMap<String, AxisLimitsCfg>,
    /// Per-backend settling parameters keyed by backend name
    #[serde(default)]
    pub settling: BTreeMap<String, SettlingCfg>,
    #[serde(default)]
    pub threading: ThreadingCfg,
    #[serde(default)]
    pub jog: JogCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    /// Settling parameters for the configured backend.
    pub fn settling_for_stage(&self) -> SettlingCfg {
        let backend = self.stage.backend;
        self.settling
            .get(backend.as_str())
            .copied()
            .unwrap_or_else(|| SettlingCfg::default_for(backend))
    }

    /// Limits for `axis`, matched case-insensitively.
    pub fn limits_for(&self, axis: &str) -> Option<AxisLimitsCfg> {
        self.limits
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(axis))
            .map(|(_, v)| *v)
    }

    /// Resolve LUT breakpoints from the inline table or the CSV file.
    /// `base_dir` anchors a relative CSV path (normally the config file's directory).
    pub fn lut_rows(&self, base_dir: &Path) -> eyre::Result<Vec<LutRow>> {
        if let Some(csv) = &self.lut.csv {
            let path = if csv.is_absolute() {
                csv.clone()
            } else {
                base_dir.join(csv)
            };
            return load_lut_csv(&path);
        }
        let rows: Vec<LutRow> = self
            .lut
            .points
            .iter()
            .map(|&(power, voltage)| LutRow { power, voltage })
            .collect();
        check_lut_rows(&rows)?;
        Ok(rows)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // DAQ
        if self.daq.check_interval_ms == 0 {
            eyre::bail!("daq.check_interval_ms must be >= 1");
        }
        if !(self.daq.timeout_multiplier.is_finite() && self.daq.timeout_multiplier >= 1.0) {
            eyre::bail!("daq.timeout_multiplier must be >= 1.0");
        }
        let a = &self.daq.amplitudes;
        for (name, v) in [
            ("x_galvo", a.x_galvo),
            ("y_galvo", a.y_galvo),
            ("aom", a.aom),
            ("z_piezo", a.z_piezo),
        ] {
            if !(v.is_finite() && v > 0.0) {
                eyre::bail!("daq.amplitudes.{name} must be > 0");
            }
        }

        // Scan
        if !(self.scan.galvo_um_per_volt_x > 0.0 && self.scan.galvo_um_per_volt_y > 0.0) {
            eyre::bail!("scan.galvo_um_per_volt_x/y must be > 0");
        }
        if !(self.scan.mirror_recovery_us.is_finite() && self.scan.mirror_recovery_us >= 0.0) {
            eyre::bail!("scan.mirror_recovery_us must be >= 0");
        }
        if !(self.scan.z_nm_per_unit.is_finite() && self.scan.z_nm_per_unit > 0.0) {
            eyre::bail!("scan.z_nm_per_unit must be > 0");
        }

        // LUT
        if self.lut.csv.is_some() && !self.lut.points.is_empty() {
            eyre::bail!("lut: set either csv or points, not both");
        }
        if self.lut.csv.is_none() {
            check_lut_rows(
                &self
                    .lut
                    .points
                    .iter()
                    .map(|&(power, voltage)| LutRow { power, voltage })
                    .collect::<Vec<_>>(),
            )?;
        }
        let (lo, hi) = self.lut.voltage_range;
        if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
            eyre::bail!("lut.voltage_range must be [min, max] with min <= max");
        }
        if !(0.0..0.5).contains(&self.lut.mask_tolerance) {
            eyre::bail!("lut.mask_tolerance must be in [0.0, 0.5)");
        }

        // Print defaults
        if !(self.print.dwell_us.is_finite() && self.print.dwell_us > 0.0) {
            eyre::bail!("print.dwell_us must be > 0");
        }
        if !(self.print.z_step_um.is_finite() && self.print.z_step_um >= 0.0) {
            eyre::bail!("print.z_step_um must be >= 0");
        }
        if !(self.print.fov_x_um > 0.0 && self.print.fov_y_um > 0.0) {
            eyre::bail!("print.fov_x_um/fov_y_um must be > 0");
        }

        // Stage and limits
        if self.stage.axis.trim().is_empty() {
            eyre::bail!("stage.axis must not be empty");
        }
        for (axis, l) in &self.limits {
            if !(l.min_nm.is_finite() && l.max_nm.is_finite() && l.min_nm < l.max_nm) {
                eyre::bail!("limits.{axis}: min_nm must be < max_nm");
            }
        }
        if self.limits_for(&self.stage.axis).is_none() {
            eyre::bail!(
                "limits.{} missing: position limits are required for the stage axis",
                self.stage.axis
            );
        }

        // Settling
        for (backend, s) in &self.settling {
            if s.poll_ms == 0 {
                eyre::bail!("settling.{backend}.poll_ms must be >= 1");
            }
            if s.duration_ms < s.poll_ms {
                eyre::bail!("settling.{backend}.duration_ms must be >= poll_ms");
            }
            if !(s.tolerance_nm.is_finite() && s.tolerance_nm > 0.0) {
                eyre::bail!("settling.{backend}.tolerance_nm must be > 0");
            }
            if s.timeout_ms == 0 {
                eyre::bail!("settling.{backend}.timeout_ms must be >= 1");
            }
        }

        // Threading
        if self.threading.position_monitor_ms == 0 || self.threading.jog_poll_ms == 0 {
            eyre::bail!("threading intervals must be >= 1 ms");
        }

        // Jog
        if !(0.0..1.0).contains(&self.jog.deadzone) {
            eyre::bail!("jog.deadzone must be in [0.0, 1.0)");
        }
        if !(self.jog.scale_xy_nm > 0.0 && self.jog.scale_z_nm > 0.0) {
            eyre::bail!("jog.scale_xy_nm/scale_z_nm must be > 0");
        }
        if !(self.jog.fine_multiplier > 0.0 && self.jog.fine_multiplier <= 1.0) {
            eyre::bail!("jog.fine_multiplier must be in (0.0, 1.0]");
        }

        Ok(())
    }
}

/// Check LUT breakpoints: at least two, finite, power strictly ascending.
/// Voltage ordering is deliberately not checked.
pub fn check_lut_rows(rows: &[LutRow]) -> eyre::Result<()> {
    if rows.len() < 2 {
        eyre::bail!("lut requires at least two rows, got {}", rows.len());
    }
    for (i, r) in rows.iter().enumerate() {
        if !(r.power.is_finite() && r.voltage.is_finite()) {
            eyre::bail!("lut row {i} is not finite");
        }
    }
    for i in 1..rows.len() {
        if rows[i].power <= rows[i - 1].power {
            eyre::bail!(
                "lut power values must be strictly ascending (rows {} and {})",
                i - 1,
                i
            );
        }
    }
    Ok(())
}

pub fn load_lut_csv(path: &Path) -> eyre::Result<Vec<LutRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open LUT CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["power", "voltage"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "LUT CSV must have headers 'power,voltage', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<LutRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    check_lut_rows(&rows)?;
    Ok(rows)
}

/// Dose matrix file: `shape` is `[rows, cols, layers]`, `data` is row-major
/// with the layer index varying fastest.
#[derive(Debug, Deserialize, Clone)]
pub struct DoseFile {
    pub shape: [usize; 3],
    pub data: Vec<f64>,
}

pub fn load_dose_matrix_json(path: &Path) -> eyre::Result<DoseFile> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read dose matrix {:?}: {}", path, e))?;
    parse_dose_matrix_json(&text).map_err(|e| e.wrap_err(format!("dose matrix {path:?}")))
}

/// Parse a dose matrix document and check `data` against `shape`.
pub fn parse_dose_matrix_json(text: &str) -> eyre::Result<DoseFile> {
    let file: DoseFile =
        serde_json::from_str(text).map_err(|e| eyre::eyre!("parse dose matrix: {}", e))?;
    let [r, c, l] = file.shape;
    let expected = r
        .checked_mul(c)
        .and_then(|v| v.checked_mul(l))
        .ok_or_else(|| eyre::eyre!("dose matrix shape overflows: {:?}", file.shape))?;
    if file.data.len() != expected {
        eyre::bail!(
            "dose matrix data has {} values, shape {:?} needs {}",
            file.data.len(),
            file.shape,
            expected
        );
    }
    Ok(file)
}
