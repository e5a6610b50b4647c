//! Dose-to-voltage lookup table.
//!
//! Linear interpolation between ascending `(power, voltage)` breakpoints.
//! Voltage monotonicity is assumed and never checked; a non-monotonic table
//! interpolates segment by segment without complaint.
use crate::config::{EdgePolicy, LutSettings};
use crate::error::PrintError;

#[derive(Debug, Clone)]
pub struct Lut {
    power: Vec<f64>,
    voltage: Vec<f64>,
    settings: LutSettings,
}

impl Lut {
    pub fn new(points: &[(f64, f64)], settings: LutSettings) -> Result<Self, PrintError> {
        if points.len() < 2 {
            return Err(PrintError::Validation(format!(
                "lookup table needs at least two breakpoints, got {}",
                points.len()
            )));
        }
        if points
            .iter()
            .any(|(p, v)| !(p.is_finite() && v.is_finite()))
        {
            return Err(PrintError::Validation(
                "lookup table contains non-finite values".into(),
            ));
        }
        if points.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err(PrintError::Validation(
                "lookup table power values must be strictly ascending".into(),
            ));
        }
        let (lo, hi) = settings.voltage_range;
        if !(lo <= hi) {
            return Err(PrintError::Validation(format!(
                "voltage range [{lo}, {hi}] is empty"
            )));
        }
        Ok(Self {
            power: points.iter().map(|p| p.0).collect(),
            voltage: points.iter().map(|p| p.1).collect(),
            settings,
        })
    }

    pub fn from_rows(
        rows: &[irradiant_config::LutRow],
        settings: LutSettings,
    ) -> Result<Self, PrintError> {
        let points: Vec<(f64, f64)> = rows.iter().map(|r| (r.power, r.voltage)).collect();
        Self::new(&points, settings)
    }

    pub fn settings(&self) -> &LutSettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.power.len()
    }

    pub fn is_empty(&self) -> bool {
        self.power.is_empty()
    }

    /// Interpolate unconditionally, clamped to the voltage range.
    ///
    /// The bracket is the segment ending at the first breakpoint `>= p`;
    /// values outside the table extend the nearest edge segment.
    pub fn interpolate(&self, p: f64) -> f64 {
        let n = self.power.len();
        let i = self
            .power
            .partition_point(|&x| x < p)
            .saturating_sub(1)
            .min(n - 2);
        let (p0, p1) = (self.power[i], self.power[i + 1]);
        let (v0, v1) = (self.voltage[i], self.voltage[i + 1]);
        let t = (p - p0) / (p1 - p0);
        let v = v0 * (1.0 - t) + v1 * t;
        let (lo, hi) = self.settings.voltage_range;
        v.clamp(lo, hi)
    }

    /// Whether `p` lies strictly inside the edge mask.
    #[inline]
    pub fn is_interior(&self, p: f64) -> bool {
        let tol = self.settings.mask_tolerance;
        p > tol && p < 1.0 - tol
    }

    /// Convert one dose value under the configured edge policy.
    pub fn convert(&self, p: f64) -> f32 {
        match self.settings.edge_policy {
            EdgePolicy::Interpolate => self.interpolate(p) as f32,
            EdgePolicy::PassThrough if self.is_interior(p) => self.interpolate(p) as f32,
            EdgePolicy::PassThrough => p as f32,
        }
    }

    pub fn convert_all(&self, doses: &[f64]) -> Vec<f32> {
        doses.iter().map(|&p| self.convert(p)).collect()
    }
}
