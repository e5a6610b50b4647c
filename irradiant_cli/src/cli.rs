//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand};
use irradiant_traits::Channel;
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "irradiant", version, about = "Laser exposure print-job CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/irradiant.toml")]
    pub config: PathBuf,

    /// Log as JSON lines and print results as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging].level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Expose a dose matrix layer by layer
    Print(PrintArgs),
    /// Move the configured axis (absolute or relative, in nm)
    Move {
        /// Absolute target (nm)
        #[arg(long, value_name = "NM", allow_hyphen_values = true, conflicts_with = "by")]
        to: Option<f64>,
        /// Relative step from the last commanded position (nm)
        #[arg(long, value_name = "NM", allow_hyphen_values = true)]
        by: Option<f64>,
        /// Wait until the stage reports a settled position
        #[arg(long, action = ArgAction::SetTrue)]
        settle: bool,
    },
    /// Hold a constant voltage on one channel until Ctrl-C
    Laser {
        /// Channel: x_galvo | y_galvo | aom | z_piezo
        #[arg(long, value_parser = parse_channel, default_value = "aom")]
        channel: Channel,
        /// Output voltage (V), limited to the channel amplitude
        #[arg(long, allow_hyphen_values = true)]
        volts: f64,
        /// Release automatically after this many milliseconds
        #[arg(long, value_name = "MS")]
        for_ms: Option<u64>,
    },
    /// Load config and LUT, open the stage, and report what would be used
    SelfCheck,
}

#[derive(Args, Debug, Clone)]
pub struct PrintArgs {
    /// Fill the whole matrix with one dose value (needs --shape)
    #[arg(long, value_name = "V", conflicts_with = "matrix", requires = "shape")]
    pub dense: Option<f64>,
    /// Matrix shape for --dense, as ROWS,COLS,LAYERS
    #[arg(long, value_name = "R,C,L", value_parser = parse_shape)]
    pub shape: Option<[usize; 3]>,
    /// Dose matrix JSON file ({"shape": [r, c, l], "data": [...]})
    #[arg(long, value_name = "FILE")]
    pub matrix: Option<PathBuf>,
    /// Override [print].z_step_um
    #[arg(long, value_name = "UM")]
    pub z_step_um: Option<f64>,
    /// Override [print].dwell_us
    #[arg(long, value_name = "US")]
    pub dwell_us: Option<f64>,
    /// Override [print].fov_x_um
    #[arg(long, value_name = "UM")]
    pub fov_x_um: Option<f64>,
    /// Override [print].fov_y_um
    #[arg(long, value_name = "UM")]
    pub fov_y_um: Option<f64>,
    /// Expose layers last-to-first
    #[arg(long, action = ArgAction::SetTrue)]
    pub invert: bool,
    /// Move through the layers without streaming any output
    #[arg(long, action = ArgAction::SetTrue)]
    pub dry_run: bool,
    /// Stay at the last layer instead of returning to the start position
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_return: bool,
}

fn parse_channel(s: &str) -> Result<Channel, String> {
    Channel::from_name(s).ok_or_else(|| format!("unknown channel '{s}'"))
}

/// Parse `R,C,L` into a matrix shape.
pub fn parse_shape(s: &str) -> Result<[usize; 3], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected ROWS,COLS,LAYERS, got '{s}'"));
    }
    let mut out = [0usize; 3];
    for (slot, p) in out.iter_mut().zip(&parts) {
        *slot = p
            .parse::<usize>()
            .map_err(|e| format!("invalid dimension '{p}': {e}"))?;
    }
    Ok(out)
}
