//! `From` implementations bridging `irradiant_config` types to `irradiant_core` types.

use std::time::Duration;

use crate::config::{
    AxisLimits, EdgePolicy, JogCfg, LutSettings, OutputCfg, PrintParams, ScanGeometry, SettleCfg,
    ThreadingCfg,
};

// ── OutputCfg ────────────────────────────────────────────────────────────────

impl From<&irradiant_config::DaqCfg> for OutputCfg {
    fn from(c: &irradiant_config::DaqCfg) -> Self {
        let a = &c.amplitudes;
        Self {
            check_interval: Duration::from_millis(c.check_interval_ms.max(1)),
            timeout_multiplier: c.timeout_multiplier,
            amplitudes: [a.x_galvo, a.y_galvo, a.aom, a.z_piezo],
        }
    }
}

// ── ScanGeometry ─────────────────────────────────────────────────────────────

impl From<&irradiant_config::ScanCfg> for ScanGeometry {
    fn from(c: &irradiant_config::ScanCfg) -> Self {
        Self {
            galvo_um_per_volt_x: c.galvo_um_per_volt_x,
            galvo_um_per_volt_y: c.galvo_um_per_volt_y,
            mirror_recovery_us: c.mirror_recovery_us,
            z_nm_per_unit: c.z_nm_per_unit,
        }
    }
}

// ── LutSettings ──────────────────────────────────────────────────────────────

impl From<&irradiant_config::LutCfg> for LutSettings {
    fn from(c: &irradiant_config::LutCfg) -> Self {
        Self {
            voltage_range: c.voltage_range,
            mask_tolerance: c.mask_tolerance,
            edge_policy: if c.map_edges {
                EdgePolicy::Interpolate
            } else {
                EdgePolicy::PassThrough
            },
        }
    }
}

// ── PrintParams ──────────────────────────────────────────────────────────────

impl From<&irradiant_config::PrintCfg> for PrintParams {
    fn from(c: &irradiant_config::PrintCfg) -> Self {
        Self {
            z_step_nm: c.z_step_um * 1000.0,
            dwell_us: c.dwell_us,
            fov_x_um: c.fov_x_um,
            fov_y_um: c.fov_y_um,
            invert_layer_order: c.invert_layer_order,
        }
    }
}

// ── SettleCfg ────────────────────────────────────────────────────────────────

impl From<&irradiant_config::SettlingCfg> for SettleCfg {
    fn from(c: &irradiant_config::SettlingCfg) -> Self {
        Self {
            poll: Duration::from_millis(c.poll_ms.max(1)),
            duration: Duration::from_millis(c.duration_ms),
            tolerance_nm: c.tolerance_nm,
            timeout: Duration::from_millis(c.timeout_ms),
        }
    }
}

// ── AxisLimits ───────────────────────────────────────────────────────────────

impl From<&irradiant_config::AxisLimitsCfg> for AxisLimits {
    fn from(c: &irradiant_config::AxisLimitsCfg) -> Self {
        Self {
            min_nm: c.min_nm,
            max_nm: c.max_nm,
        }
    }
}

// ── Jog / threading ──────────────────────────────────────────────────────────

impl From<&irradiant_config::Config> for JogCfg {
    fn from(c: &irradiant_config::Config) -> Self {
        Self {
            deadzone: c.jog.deadzone,
            scale_xy_nm: c.jog.scale_xy_nm,
            scale_z_nm: c.jog.scale_z_nm,
            fine_multiplier: c.jog.fine_multiplier,
            poll: Duration::from_millis(c.threading.jog_poll_ms.max(1)),
        }
    }
}

impl From<&irradiant_config::ThreadingCfg> for ThreadingCfg {
    fn from(c: &irradiant_config::ThreadingCfg) -> Self {
        Self {
            position_monitor: Duration::from_millis(c.position_monitor_ms.max(1)),
            join_timeout: Duration::from_millis(c.join_timeout_ms),
        }
    }
}
