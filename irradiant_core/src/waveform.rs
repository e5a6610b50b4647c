//! Scan and Z waveform synthesis.
//!
//! X sweeps the field of view once per line after a flyback segment held at
//! the low extreme; Y steps once per line; Z holds one level per layer.
//! All values are normalized drive levels, scaled to volts by the output stage.
use irradiant_traits::AxisDirection;

use crate::config::{PrintParams, ScanGeometry};
use crate::util::linspace;

/// Samples per line and line count of one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineLayout {
    pub rows: usize,
    pub cols: usize,
    pub blanking: usize,
}

impl LineLayout {
    #[inline]
    pub fn samples_per_line(&self) -> usize {
        self.blanking + self.cols
    }

    #[inline]
    pub fn samples_per_layer(&self) -> usize {
        self.rows * self.samples_per_line()
    }
}

/// One fast-axis line: `blanking` samples at the low extreme, then a linear
/// sweep across `cols` samples, all scaled by `amplitude`.
pub fn x_line(layout: LineLayout, amplitude: f64) -> Vec<f64> {
    let mut line = Vec::with_capacity(layout.samples_per_line());
    line.extend(std::iter::repeat_n(-amplitude, layout.blanking));
    line.extend(linspace(-1.0, 1.0, layout.cols).into_iter().map(|v| v * amplitude));
    line
}

/// Slow-axis level of each line.
pub fn y_levels(rows: usize, amplitude: f64) -> Vec<f64> {
    linspace(-1.0, 1.0, rows)
        .into_iter()
        .map(|v| v * amplitude)
        .collect()
}

/// Mirror drive amplitude needed to cover a field of view.
#[inline]
pub fn galvo_amplitude(fov_um: f64, um_per_volt: f64) -> f64 {
    fov_um / um_per_volt
}

/// Full-layer X and Y buffers for a layout.
pub fn scan_xy(layout: LineLayout, geometry: &ScanGeometry, params: &PrintParams) -> (Vec<f64>, Vec<f64>) {
    let ax = galvo_amplitude(params.fov_x_um, geometry.galvo_um_per_volt_x);
    let ay = galvo_amplitude(params.fov_y_um, geometry.galvo_um_per_volt_y);
    let line = x_line(layout, ax);
    let spl = layout.samples_per_line();

    let mut x = Vec::with_capacity(layout.samples_per_layer());
    let mut y = Vec::with_capacity(layout.samples_per_layer());
    for level in y_levels(layout.rows, ay) {
        x.extend_from_slice(&line);
        y.extend(std::iter::repeat_n(level, spl));
    }
    (x, y)
}

/// Signed Z offset of the `ordinal`-th exposed layer relative to the start position.
#[inline]
pub fn layer_offset_nm(ordinal: usize, z_step_nm: f64, direction: AxisDirection) -> f64 {
    direction.sign() * ordinal as f64 * z_step_nm
}

/// Drive level for a Z offset.
#[inline]
pub fn z_level(offset_nm: f64, nm_per_unit: f64) -> f64 {
    offset_nm / nm_per_unit
}
