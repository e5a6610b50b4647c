use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum PrintError {
    /// Bad job parameters; rejected before any hardware action.
    #[error("invalid parameters: {0}")]
    Validation(String),
    #[error("{axis} target {target_nm} nm outside [{min_nm}, {max_nm}] nm")]
    OutOfRange {
        axis: String,
        target_nm: f64,
        min_nm: f64,
        max_nm: f64,
    },
    #[error("device error: {0}")]
    Device(String),
    #[error("device fault: {0}")]
    DeviceFault(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("device busy: movement lock is held")]
    Busy,
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing stage")]
    MissingStage,
    #[error("missing axis limits")]
    MissingLimits,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
