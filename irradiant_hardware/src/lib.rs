//! Stage and analog-output backends.
//!
//! Vendor SDK bindings are not bundled; the factory builds the simulated
//! backends and falls back to them when a vendor backend is requested.
pub mod error;
pub mod sim_daq;
pub mod sim_stage;
pub mod util;

use std::sync::Arc;

use irradiant_traits::{AxisDirection, Stage};

pub use error::HwError;
pub use sim_daq::{DaqFault, DaqLog, DaqLogHandle, LoadedBuffer, SimulatedDaq};
pub use sim_stage::SimulatedStage;

/// Known motion backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageBackend {
    Simulated,
    Xeryon,
    Dover,
    Pdxc2,
}

impl StageBackend {
    pub fn name(self) -> &'static str {
        match self {
            StageBackend::Simulated => "simulated",
            StageBackend::Xeryon => "xeryon",
            StageBackend::Dover => "dover",
            StageBackend::Pdxc2 => "pdxc2",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "simulated" | "mock" => Some(StageBackend::Simulated),
            "xeryon" => Some(StageBackend::Xeryon),
            "dover" => Some(StageBackend::Dover),
            "pdxc2" => Some(StageBackend::Pdxc2),
            _ => None,
        }
    }

    /// Dover raises the objective as layers progress; the others lower it.
    pub fn direction(self) -> AxisDirection {
        match self {
            StageBackend::Dover => AxisDirection::Positive,
            _ => AxisDirection::Negative,
        }
    }
}

/// Open one stage axis on the requested backend.
///
/// With `fallback` set, an unavailable backend is replaced by a simulated
/// axis (logged at warn) instead of failing.
pub fn open_stage(
    backend: StageBackend,
    axis: &str,
    fallback: bool,
) -> error::Result<Arc<dyn Stage + Send + Sync>> {
    match backend {
        StageBackend::Simulated => {
            tracing::info!(axis, "using simulated stage");
            Ok(Arc::new(SimulatedStage::new(axis)))
        }
        other if fallback => {
            tracing::warn!(
                axis,
                backend = other.name(),
                "backend not available in this build; using simulated stage"
            );
            Ok(Arc::new(
                SimulatedStage::new(axis).with_direction(other.direction()),
            ))
        }
        other => Err(HwError::Unsupported(other.name().to_string())),
    }
}
