//! Runtime configuration types for the exposure engine.
//!
//! These are separate from the TOML-deserialized config in `irradiant_config`;
//! `conversions` bridges the two.
use std::time::Duration;

use irradiant_traits::Channel;

/// How values near the 0/1 edges of the dose range are treated by the LUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgePolicy {
    /// Values within the mask tolerance of 0 or 1 are emitted unconverted.
    #[default]
    PassThrough,
    /// Every value is mapped through the table.
    Interpolate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LutSettings {
    /// Clamp range applied after interpolation.
    pub voltage_range: (f64, f64),
    pub mask_tolerance: f64,
    pub edge_policy: EdgePolicy,
}

impl Default for LutSettings {
    fn default() -> Self {
        Self {
            voltage_range: (0.0, 1.0),
            mask_tolerance: 1e-10,
            edge_policy: EdgePolicy::PassThrough,
        }
    }
}

/// Scan-head geometry: mirror scaling, flyback time and Z unit conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanGeometry {
    pub galvo_um_per_volt_x: f64,
    pub galvo_um_per_volt_y: f64,
    pub mirror_recovery_us: f64,
    pub z_nm_per_unit: f64,
}

impl Default for ScanGeometry {
    fn default() -> Self {
        Self {
            galvo_um_per_volt_x: 613.0,
            galvo_um_per_volt_y: 748.0,
            mirror_recovery_us: 1094.0,
            z_nm_per_unit: 100_000.0,
        }
    }
}

/// Per-job exposure parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrintParams {
    pub z_step_nm: f64,
    pub dwell_us: f64,
    pub fov_x_um: f64,
    pub fov_y_um: f64,
    /// Execute layers last-to-first; each layer keeps its own Z target.
    pub invert_layer_order: bool,
}

impl Default for PrintParams {
    fn default() -> Self {
        Self {
            z_step_nm: 1500.0,
            dwell_us: 5.0,
            fov_x_um: 650.0,
            fov_y_um: 650.0,
            invert_layer_order: false,
        }
    }
}

/// Analog output stage settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputCfg {
    /// Stop-flag / completion poll interval while streaming.
    pub check_interval: Duration,
    /// Completion wait cap as a multiple of the nominal buffer duration.
    pub timeout_multiplier: f64,
    /// Output amplitude per channel, indexed by `Channel::index()`.
    pub amplitudes: [f64; 4],
}

impl OutputCfg {
    #[inline]
    pub fn amplitude(&self, ch: Channel) -> f64 {
        self.amplitudes[ch.index()]
    }
}

impl Default for OutputCfg {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_millis(1),
            timeout_multiplier: 1.5,
            amplitudes: [1.4, 1.4, 3.0, 1.0],
        }
    }
}

/// Settle detection parameters for one motion backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettleCfg {
    /// Time between position reads.
    pub poll: Duration,
    /// Stability time required; the window holds `duration / poll` samples.
    pub duration: Duration,
    /// Allowed distance from target and allowed spread within the window (nm).
    pub tolerance_nm: f64,
    /// Give up after this long.
    pub timeout: Duration,
}

impl SettleCfg {
    /// Number of consecutive accepted samples needed to declare success.
    pub fn window_len(&self) -> usize {
        let poll = self.poll.as_nanos().max(1);
        usize::try_from(self.duration.as_nanos() / poll)
            .unwrap_or(usize::MAX)
            .max(1)
    }
}

impl Default for SettleCfg {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(2),
            duration: Duration::from_millis(1500),
            tolerance_nm: 50.0,
            timeout: Duration::from_secs(15),
        }
    }
}

/// Inclusive travel range of one axis (nm).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisLimits {
    pub min_nm: f64,
    pub max_nm: f64,
}

impl AxisLimits {
    pub fn contains(&self, target_nm: f64) -> bool {
        target_nm.is_finite() && target_nm >= self.min_nm && target_nm <= self.max_nm
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JogCfg {
    pub deadzone: f64,
    pub scale_xy_nm: f64,
    pub scale_z_nm: f64,
    pub fine_multiplier: f64,
    pub poll: Duration,
}

impl Default for JogCfg {
    fn default() -> Self {
        Self {
            deadzone: 0.1,
            scale_xy_nm: 500_000.0,
            scale_z_nm: 50_000.0,
            fine_multiplier: 0.1,
            poll: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThreadingCfg {
    pub position_monitor: Duration,
    pub join_timeout: Duration,
}

impl Default for ThreadingCfg {
    fn default() -> Self {
        Self {
            position_monitor: Duration::from_millis(50),
            join_timeout: Duration::from_secs(15),
        }
    }
}
