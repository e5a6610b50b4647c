pub mod clock;

pub use clock::{Clock, MonotonicClock};
#[cfg(any(test, feature = "testing"))]
pub use clock::test_clock;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Analog output channels of the exposure head, in device order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Fast-axis scan mirror.
    XGalvo,
    /// Slow-axis scan mirror.
    YGalvo,
    /// Light-intensity modulator.
    Aom,
    /// Vertical-positioning actuator.
    ZPiezo,
}

impl Channel {
    /// All channels in the order the output device expects them.
    pub const ALL: [Channel; 4] = [
        Channel::XGalvo,
        Channel::YGalvo,
        Channel::Aom,
        Channel::ZPiezo,
    ];

    pub fn index(self) -> usize {
        match self {
            Channel::XGalvo => 0,
            Channel::YGalvo => 1,
            Channel::Aom => 2,
            Channel::ZPiezo => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::XGalvo => "x_galvo",
            Channel::YGalvo => "y_galvo",
            Channel::Aom => "aom",
            Channel::ZPiezo => "z_piezo",
        }
    }

    /// Parse the configuration/CLI name of a channel.
    pub fn from_name(name: &str) -> Option<Self> {
        Channel::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which way a stage travels as exposure layers progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisDirection {
    /// Layer targets are added to the start position.
    Positive,
    /// Layer targets are subtracted from the start position.
    #[default]
    Negative,
}

impl AxisDirection {
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            AxisDirection::Positive => 1.0,
            AxisDirection::Negative => -1.0,
        }
    }
}

/// Shared cooperative cancellation token.
///
/// Settable from any thread, polled by worker loops. There is no reset: a
/// new job gets a new flag.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One motorized stage axis. Positions are in nanometres.
///
/// Methods take `&self` because a stage is shared between the job thread, the
/// jog producer and the display refresh; implementations serialize their own
/// transport access.
pub trait Stage {
    /// Short human-readable axis name ("Z", "ZAXIS", ...).
    fn axis(&self) -> &str;
    /// Travel direction convention of this backend.
    fn direction(&self) -> AxisDirection {
        AxisDirection::Negative
    }
    /// Measured position, or `None` when the device could not be read.
    fn position(&self) -> Option<f64>;
    /// Last commanded position.
    fn desired_position(&self) -> f64;
    /// Issue an absolute move. Returns once the command is accepted.
    fn command_move(&self, target_nm: f64) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn home(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn close(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// A finite, sample-clocked analog output task plus static writes.
pub trait AnalogOutput {
    /// Load one buffer per channel (`data[i]` drives `channels[i]`, equal lengths)
    /// for clocked playback at `sample_rate_hz`. Does not start playback.
    fn load(
        &mut self,
        sample_rate_hz: f64,
        channels: &[Channel],
        data: &[&[f64]],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn start(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Whether the loaded buffer has been fully generated.
    fn is_done(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Immediately drive static voltages on the given channels.
    fn write_static(
        &mut self,
        channels: &[Channel],
        volts: &[f64],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
