//! Dose matrix handling and per-layer frame extraction.
//!
//! A frame is the four aligned channel buffers for one exposed layer. Layers
//! with no modulator activity are dropped, and within a layer every scan line
//! without activity is removed from all four channels at once. Planning keeps
//! only a line mask per layer; frames are built one at a time while a job
//! streams.
use irradiant_traits::{AxisDirection, Channel};

use crate::config::{PrintParams, ScanGeometry};
use crate::error::PrintError;
use crate::lut::Lut;
use crate::util::{blanking_samples, sample_rate_hz};
use crate::waveform::{LineLayout, layer_offset_nm, scan_xy, z_level};

/// Acquisition latency of the output hardware, in samples. The modulator
/// buffer is advanced by this much so exposure lines up with mirror motion.
pub const LATENCY_SAMPLES: usize = 1;

/// Exposure fractions indexed `(row, col, layer)`; rows are slow-scan lines,
/// columns fast-scan samples, layers depth slices. Stored row-major with the
/// layer index varying fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct DoseMatrix {
    rows: usize,
    cols: usize,
    layers: usize,
    data: Vec<f64>,
}

impl DoseMatrix {
    pub fn new(shape: [usize; 3], data: Vec<f64>) -> Result<Self, PrintError> {
        let [rows, cols, layers] = shape;
        if rows == 0 || cols == 0 || layers == 0 {
            return Err(PrintError::Validation(format!(
                "dose matrix shape {shape:?} has an empty dimension"
            )));
        }
        let expected = rows
            .checked_mul(cols)
            .and_then(|v| v.checked_mul(layers))
            .ok_or_else(|| PrintError::Validation(format!("dose matrix shape {shape:?} overflows")))?;
        if data.len() != expected {
            return Err(PrintError::Validation(format!(
                "dose matrix has {} values, shape {shape:?} needs {expected}",
                data.len()
            )));
        }
        if let Some(i) = data.iter().position(|v| !(0.0..=1.0).contains(v)) {
            return Err(PrintError::Validation(format!(
                "dose value {} at index {i} outside [0, 1]",
                data[i]
            )));
        }
        Ok(Self {
            rows,
            cols,
            layers,
            data,
        })
    }

    /// Matrix with every voxel set to `value`.
    pub fn filled(shape: [usize; 3], value: f64) -> Result<Self, PrintError> {
        let n = shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d));
        let n = n.ok_or_else(|| PrintError::Validation(format!("dose matrix shape {shape:?} overflows")))?;
        Self::new(shape, vec![value; n])
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.rows, self.cols, self.layers]
    }

    #[inline]
    fn index(&self, row: usize, col: usize, layer: usize) -> usize {
        (row * self.cols + col) * self.layers + layer
    }

    pub fn get(&self, row: usize, col: usize, layer: usize) -> Option<f64> {
        if row < self.rows && col < self.cols && layer < self.layers {
            self.data.get(self.index(row, col, layer)).copied()
        } else {
            None
        }
    }

    pub fn set(&mut self, row: usize, col: usize, layer: usize, value: f64) -> Result<(), PrintError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(PrintError::Validation(format!("dose value {value} outside [0, 1]")));
        }
        if row >= self.rows || col >= self.cols || layer >= self.layers {
            return Err(PrintError::Validation(format!(
                "voxel ({row}, {col}, {layer}) outside shape {:?}",
                self.shape()
            )));
        }
        let i = self.index(row, col, layer);
        self.data[i] = value;
        Ok(())
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

impl TryFrom<irradiant_config::DoseFile> for DoseMatrix {
    type Error = PrintError;

    fn try_from(f: irradiant_config::DoseFile) -> Result<Self, Self::Error> {
        Self::new(f.shape, f.data)
    }
}

/// Flatten one layer through the LUT: each row is left-padded with
/// `blanking` zeros, rows are concatenated, and the result is advanced by
/// `LATENCY_SAMPLES` (trailing samples become zero).
pub fn flatten_layer(matrix: &DoseMatrix, lut: &Lut, layer: usize, blanking: usize) -> Vec<f64> {
    let [rows, cols, _] = matrix.shape();
    let spl = blanking + cols;
    let mut out = vec![0.0f64; rows * spl];
    for (r, line) in out.chunks_mut(spl).enumerate() {
        for (c, slot) in line[blanking..].iter_mut().enumerate() {
            let dose = matrix.data[matrix.index(r, c, layer)];
            *slot = f64::from(lut.convert(dose));
        }
    }
    let shift = LATENCY_SAMPLES.min(out.len());
    out.rotate_left(shift);
    let n = out.len();
    out[n - shift..].fill(0.0);
    out
}

/// Per-line keep mask: a line is kept when any sample in it is nonzero.
pub fn line_mask(aom: &[f64], samples_per_line: usize) -> Vec<bool> {
    if samples_per_line == 0 {
        return Vec::new();
    }
    aom.chunks(samples_per_line)
        .map(|line| line.iter().any(|&v| v != 0.0))
        .collect()
}

/// Aligned channel buffers for one exposed layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Layer index in the dose matrix.
    pub layer: usize,
    /// Position among exposed layers; determines the Z offset.
    pub ordinal: usize,
    /// Signed stage offset from the start position (nm).
    pub z_offset_nm: f64,
    pub samples_per_line: usize,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub aom: Vec<f64>,
    pub z: Vec<f64>,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.aom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aom.is_empty()
    }

    pub fn lines(&self) -> usize {
        if self.samples_per_line == 0 {
            0
        } else {
            self.len() / self.samples_per_line
        }
    }

    pub fn channel(&self, ch: Channel) -> &[f64] {
        match ch {
            Channel::XGalvo => &self.x,
            Channel::YGalvo => &self.y,
            Channel::Aom => &self.aom,
            Channel::ZPiezo => &self.z,
        }
    }

    /// Buffers in `Channel::ALL` order.
    pub fn channels(&self) -> [&[f64]; 4] {
        [&self.x, &self.y, &self.aom, &self.z]
    }
}

/// An exposed layer before its buffers exist: which lines carry exposure
/// and where the stage goes.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerPlan {
    pub layer: usize,
    pub ordinal: usize,
    pub z_offset_nm: f64,
    /// One entry per matrix row; `true` for lines that are streamed.
    pub line_mask: Vec<bool>,
}

impl LayerPlan {
    pub fn lines(&self) -> usize {
        self.line_mask.iter().filter(|k| **k).count()
    }
}

/// Per-layer plans plus the X/Y scan shared by every layer. Channel buffers
/// are built one layer at a time with [`FrameSet::build_frame`].
#[derive(Debug, Clone)]
pub struct FrameSet {
    pub layers: Vec<LayerPlan>,
    pub total_layers: usize,
    pub dropped_layers: usize,
    pub layout: LineLayout,
    pub sample_rate_hz: f64,
    pub z_nm_per_unit: f64,
    scan_x: Vec<f64>,
    scan_y: Vec<f64>,
}

impl FrameSet {
    /// Samples streamed for one planned layer.
    pub fn layer_samples(&self, plan: &LayerPlan) -> usize {
        plan.lines() * self.layout.samples_per_line()
    }

    pub fn total_samples(&self) -> usize {
        self.layers.iter().map(|p| self.layer_samples(p)).sum()
    }

    /// Materialize the four channel buffers of `plan`, keeping only its
    /// masked lines. `matrix` and `lut` must be the ones the set was
    /// extracted from.
    pub fn build_frame(&self, plan: &LayerPlan, matrix: &DoseMatrix, lut: &Lut) -> Frame {
        let spl = self.layout.samples_per_line();
        let n = self.layer_samples(plan);
        let full = flatten_layer(matrix, lut, plan.layer, self.layout.blanking);
        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        let mut aom = Vec::with_capacity(n);
        let lines = full
            .chunks(spl)
            .zip(self.scan_x.chunks(spl))
            .zip(self.scan_y.chunks(spl))
            .zip(&plan.line_mask);
        for (((a, sx), sy), keep) in lines {
            if *keep {
                aom.extend_from_slice(a);
                x.extend_from_slice(sx);
                y.extend_from_slice(sy);
            }
        }
        let z = vec![z_level(plan.z_offset_nm, self.z_nm_per_unit); aom.len()];
        Frame {
            layer: plan.layer,
            ordinal: plan.ordinal,
            z_offset_nm: plan.z_offset_nm,
            samples_per_line: spl,
            x,
            y,
            aom,
            z,
        }
    }
}

pub fn validate_params(geometry: &ScanGeometry, params: &PrintParams) -> Result<(), PrintError> {
    let positive = |v: f64| v.is_finite() && v > 0.0;
    if !positive(params.dwell_us) {
        return Err(PrintError::Validation(format!(
            "dwell time must be > 0 us, got {}",
            params.dwell_us
        )));
    }
    if !(params.z_step_nm.is_finite() && params.z_step_nm >= 0.0) {
        return Err(PrintError::Validation(format!(
            "z step must be >= 0 nm, got {}",
            params.z_step_nm
        )));
    }
    if !(positive(params.fov_x_um) && positive(params.fov_y_um)) {
        return Err(PrintError::Validation("field of view must be > 0 um".into()));
    }
    if !(positive(geometry.galvo_um_per_volt_x) && positive(geometry.galvo_um_per_volt_y)) {
        return Err(PrintError::Validation("galvo scaling must be > 0 um/V".into()));
    }
    if !positive(geometry.z_nm_per_unit) {
        return Err(PrintError::Validation("z_nm_per_unit must be > 0".into()));
    }
    Ok(())
}

/// Plan the exposed layers of a dose matrix.
///
/// Exposed layers are numbered consecutively from zero in matrix order; with
/// `invert_layer_order` the plans are returned last-first, each keeping its
/// own Z offset. Only line masks are kept; no channel buffer outlives this
/// call.
pub fn extract_frames(
    matrix: &DoseMatrix,
    lut: &Lut,
    geometry: &ScanGeometry,
    params: &PrintParams,
    direction: AxisDirection,
) -> Result<FrameSet, PrintError> {
    validate_params(geometry, params)?;
    let [rows, cols, layers] = matrix.shape();
    let layout = LineLayout {
        rows,
        cols,
        blanking: blanking_samples(geometry.mirror_recovery_us, params.dwell_us),
    };
    let spl = layout.samples_per_line();

    let mut plans = Vec::new();
    for layer in 0..layers {
        let aom = flatten_layer(matrix, lut, layer, layout.blanking);
        let mask = line_mask(&aom, spl);
        if !mask.iter().any(|k| *k) {
            tracing::debug!(layer, "dropping layer with no exposure");
            continue;
        }
        let ordinal = plans.len();
        let plan = LayerPlan {
            layer,
            ordinal,
            z_offset_nm: layer_offset_nm(ordinal, params.z_step_nm, direction),
            line_mask: mask,
        };
        tracing::trace!(layer, ordinal, lines = plan.lines(), "layer planned");
        plans.push(plan);
    }
    if params.invert_layer_order {
        plans.reverse();
    }

    let (scan_x, scan_y) = scan_xy(layout, geometry, params);
    let dropped_layers = layers - plans.len();
    Ok(FrameSet {
        layers: plans,
        total_layers: layers,
        dropped_layers,
        layout,
        sample_rate_hz: sample_rate_hz(params.dwell_us),
        z_nm_per_unit: geometry.z_nm_per_unit,
        scan_x,
        scan_y,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LutSettings;

    fn identity_lut() -> Lut {
        Lut::new(&[(0.0, 0.0), (1.0, 1.0)], LutSettings::default()).unwrap()
    }

    #[test]
    fn flatten_pads_rows_and_applies_latency() {
        // 2 rows x 2 cols x 1 layer
        let m = DoseMatrix::new([2, 2, 1], vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        let out = flatten_layer(&m, &identity_lut(), 0, 1);
        // padded: [0, .1, .2, 0, .3, .4], then advanced one sample
        let expect = [0.1f32, 0.2, 0.0, 0.3, 0.4, 0.0].map(f64::from);
        assert_eq!(out, expect.to_vec());
    }

    #[test]
    fn line_mask_marks_active_lines() {
        let aom = [0.0, 0.0, 0.0, 0.5, 0.0, 0.0];
        assert_eq!(line_mask(&aom, 3), vec![false, true]);
    }

    #[test]
    fn built_frame_drops_dark_lines_from_every_channel() {
        // 3 rows x 2 cols, no flyback; one voxel in the middle row
        let mut m = DoseMatrix::filled([3, 2, 1], 0.0).unwrap();
        m.set(1, 1, 0, 0.7).unwrap();
        let set = extract_frames(
            &m,
            &identity_lut(),
            &ScanGeometry {
                mirror_recovery_us: 0.0,
                ..ScanGeometry::default()
            },
            &PrintParams::default(),
            AxisDirection::Negative,
        )
        .unwrap();
        let plan = &set.layers[0];
        assert_eq!(plan.line_mask, vec![false, true, false]);
        assert_eq!(set.layer_samples(plan), 2);

        let frame = set.build_frame(plan, &m, &identity_lut());
        assert_eq!(frame.lines(), 1);
        // the latency shift moves the exposed sample one place earlier
        assert_eq!(frame.aom, vec![f64::from(0.7f32), 0.0]);
        // middle row of the Y ramp is the centre level
        assert_eq!(frame.y, vec![0.0, 0.0]);
        assert_eq!(frame.x.len(), 2);
        assert_eq!(frame.z, vec![0.0; 2]);
    }

    #[test]
    fn plans_hold_masks_not_buffers() {
        let m = DoseMatrix::filled([4, 8, 3], 0.5).unwrap();
        let lut = identity_lut();
        let set = extract_frames(
            &m,
            &lut,
            &ScanGeometry::default(),
            &PrintParams {
                z_step_nm: 100.0,
                ..PrintParams::default()
            },
            AxisDirection::Positive,
        )
        .unwrap();
        // one shared scan layer, however many layers are planned
        assert_eq!(set.scan_x.len(), set.layout.samples_per_layer());
        assert_eq!(set.scan_y.len(), set.layout.samples_per_layer());
        assert!(set.layers.iter().all(|p| p.line_mask.len() == 4));
        for plan in &set.layers {
            let f = set.build_frame(plan, &m, &lut);
            assert_eq!(f.len(), set.layer_samples(plan));
            assert_eq!(f.x, set.scan_x);
            assert_eq!(f.y, set.scan_y);
            assert!(f.z.iter().all(|z| *z == plan.z_offset_nm / set.z_nm_per_unit));
        }
    }

    #[test]
    fn dose_matrix_rejects_values_outside_unit_range() {
        let err = DoseMatrix::new([1, 1, 2], vec![0.5, 1.5]).unwrap_err();
        assert!(err.to_string().contains("outside [0, 1]"));
        assert!(DoseMatrix::new([1, 0, 1], vec![]).is_err());
    }

    #[test]
    fn empty_layers_are_dropped_and_survivors_renumbered() {
        let mut m = DoseMatrix::filled([1, 2, 3], 0.0).unwrap();
        m.set(0, 0, 0, 0.5).unwrap();
        m.set(0, 1, 2, 0.5).unwrap();
        let set = extract_frames(
            &m,
            &identity_lut(),
            &ScanGeometry {
                mirror_recovery_us: 10.0,
                ..ScanGeometry::default()
            },
            &PrintParams {
                z_step_nm: 100.0,
                ..PrintParams::default()
            },
            AxisDirection::Negative,
        )
        .unwrap();
        assert_eq!(set.total_layers, 3);
        assert_eq!(set.dropped_layers, 1);
        let layers: Vec<_> = set.layers.iter().map(|p| p.layer).collect();
        assert_eq!(layers, vec![0, 2]);
        assert_eq!(set.layers[1].ordinal, 1);
        assert_eq!(set.layers[1].z_offset_nm, -100.0);
    }

    #[test]
    fn inverted_order_keeps_offsets() {
        let m = DoseMatrix::filled([1, 2, 2], 0.5).unwrap();
        let set = extract_frames(
            &m,
            &identity_lut(),
            &ScanGeometry::default(),
            &PrintParams {
                z_step_nm: 100.0,
                invert_layer_order: true,
                ..PrintParams::default()
            },
            AxisDirection::Positive,
        )
        .unwrap();
        assert_eq!(set.layers[0].layer, 1);
        assert_eq!(set.layers[0].z_offset_nm, 100.0);
        assert_eq!(set.layers[1].z_offset_nm, 0.0);
    }
}
